//! Local campaign operations.
//!
//! Reads are served straight from the mirror. Creates and updates are pushed
//! to Megaphone first; the record Megaphone answers with is then folded into
//! the mirror through [`sync_campaign`], so a proxied write ends up exactly
//! like a synced one.

use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{Advertiser, AdvertiserView, CampaignQuery, CampaignView, Page, MAX_PER_PAGE};
use crate::remote::CampaignPayload;
use crate::traits::{MirrorSession, MirrorStore, RemoteMutator};
use crate::upsert::{sync_campaign, CAMPAIGN};
use crate::validation::{validate_budget_cents, validate_currency_code, validate_title};

/// Body of a local create. `advertiser_id` is the local advertiser id.
#[derive(Debug, Clone, Deserialize)]
pub struct NewCampaign {
    pub title: String,
    pub advertiser_id: String,
    pub total_budget_cents: Option<i64>,
    pub total_budget_currency: Option<String>,
}

/// Body of a local update. At least one field must be set.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CampaignChanges {
    pub title: Option<String>,
    pub advertiser_id: Option<String>,
    pub total_budget_cents: Option<i64>,
    pub total_budget_currency: Option<String>,
}

impl CampaignChanges {
    fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.advertiser_id.is_none()
            && self.total_budget_cents.is_none()
            && self.total_budget_currency.is_none()
    }
}

pub async fn list_advertisers<S: MirrorStore>(store: &S) -> Result<Vec<AdvertiserView>, AppError> {
    store.advertisers().await
}

pub async fn list_campaigns<S: MirrorStore>(
    store: &S,
    query: &CampaignQuery,
) -> Result<Page<CampaignView>, AppError> {
    if query.page < 1 {
        return Err(AppError::Validation("page must be at least 1".to_string()));
    }
    if query.per_page < 1 || query.per_page > MAX_PER_PAGE {
        return Err(AppError::Validation(format!(
            "per_page must be between 1 and {}",
            MAX_PER_PAGE
        )));
    }
    store.campaigns(query).await
}

pub async fn get_campaign<S: MirrorStore>(store: &S, id: Uuid) -> Result<CampaignView, AppError> {
    store.campaign(id).await?.ok_or(AppError::CampaignNotFound)
}

/// Creates the campaign on Megaphone, then mirrors the result.
pub async fn create_campaign<S, R>(
    store: &S,
    remote: &R,
    input: NewCampaign,
) -> Result<CampaignView, AppError>
where
    S: MirrorStore,
    R: RemoteMutator,
{
    let title = validate_title(Some(&input.title), "title")?;
    let total_budget_cents = validate_budget_cents(input.total_budget_cents, "total_budget_cents")?;
    let total_budget_currency =
        validate_currency_code(input.total_budget_currency.as_deref(), "total_budget_currency")?;
    let advertiser = local_advertiser(store, &input.advertiser_id).await?;

    let payload = CampaignPayload {
        title: Some(title),
        advertiser_id: Some(advertiser.megaphone_id),
        total_budget_cents,
        total_budget_currency,
    };
    let record = remote.create_campaign(&payload).await?;
    let campaign = fold_into_mirror(store, &record).await?;
    info!(id = %campaign.id, megaphone_id = %campaign.megaphone_id, "Campaign created");
    Ok(campaign)
}

/// Updates the campaign on Megaphone, then mirrors the result.
pub async fn update_campaign<S, R>(
    store: &S,
    remote: &R,
    id: Uuid,
    changes: CampaignChanges,
) -> Result<CampaignView, AppError>
where
    S: MirrorStore,
    R: RemoteMutator,
{
    if changes.is_empty() {
        return Err(AppError::Validation(
            "At least one of title, advertiser_id, total_budget_cents or total_budget_currency must be provided"
                .to_string(),
        ));
    }
    let title = match changes.title.as_deref() {
        Some(title) => Some(validate_title(Some(title), "title")?),
        None => None,
    };
    let total_budget_cents =
        validate_budget_cents(changes.total_budget_cents, "total_budget_cents")?;
    let total_budget_currency = validate_currency_code(
        changes.total_budget_currency.as_deref(),
        "total_budget_currency",
    )?;

    let existing = get_campaign(store, id).await?;
    let advertiser_id = match changes.advertiser_id.as_deref() {
        Some(local_id) => Some(local_advertiser(store, local_id).await?.megaphone_id),
        None => None,
    };

    let payload = CampaignPayload {
        title,
        advertiser_id,
        total_budget_cents,
        total_budget_currency,
    };
    let record = remote
        .update_campaign(&existing.megaphone_id, &payload)
        .await?;
    let campaign = fold_into_mirror(store, &record).await?;
    info!(id = %campaign.id, megaphone_id = %campaign.megaphone_id, "Campaign updated");
    Ok(campaign)
}

/// Sets the local-only archive flag.
pub async fn set_archived<S: MirrorStore>(
    store: &S,
    id: Uuid,
    archived: bool,
) -> Result<CampaignView, AppError> {
    if !store.set_campaign_archived(id, archived).await? {
        return Err(AppError::CampaignNotFound);
    }
    get_campaign(store, id).await
}

async fn local_advertiser<S: MirrorStore>(store: &S, local_id: &str) -> Result<Advertiser, AppError> {
    let id = Uuid::parse_str(local_id.trim()).map_err(|_| AppError::AdvertiserNotFound)?;
    store
        .advertiser(id)
        .await?
        .ok_or(AppError::AdvertiserNotFound)
}

async fn fold_into_mirror<S: MirrorStore>(store: &S, record: &Value) -> Result<CampaignView, AppError> {
    let mut session = store.begin().await?;
    let campaign = match sync_campaign(&mut session, Some(record)).await {
        Ok(Some(campaign)) => campaign,
        Ok(None) => {
            discard(session).await;
            return Err(AppError::invalid_record(
                CAMPAIGN,
                "remote returned an empty campaign",
            ));
        }
        Err(e) => {
            discard(session).await;
            return Err(e);
        }
    };
    session.commit().await?;
    get_campaign(store, campaign.id).await
}

async fn discard<T: MirrorSession>(session: T) {
    if let Err(e) = session.rollback().await {
        warn!(error = %e, "Rollback failed");
    }
}
