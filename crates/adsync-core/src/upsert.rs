//! Per-record upserts keyed by remote key.
//!
//! Each `sync_*` function writes one remote record into an open
//! [`MirrorSession`] inside its own savepoint: released when the record is
//! mirrored, rolled back when it fails. A failing record is logged with its
//! full payload and returned as `Err`; it never poisons the surrounding
//! transaction, so the caller can keep going with the next record.

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{Advertiser, Agency, Campaign};
use crate::remote::{
    decode_record, display_name, is_empty_payload, remote_key, RemoteAdvertiser, RemoteAgency,
    RemoteCampaign,
};
use crate::traits::MirrorSession;

pub const AGENCY: &str = "agency";
pub const ADVERTISER: &str = "advertiser";
pub const CAMPAIGN: &str = "campaign";

/// Upserts one agency. `None` or an empty payload yields `Ok(None)`.
pub async fn sync_agency<S: MirrorSession>(
    session: &mut S,
    record: Option<&Value>,
) -> Result<Option<Agency>, AppError> {
    let Some(record) = record.filter(|r| !is_empty_payload(r)) else {
        return Ok(None);
    };
    if let Err(e) = session.savepoint().await {
        report_failure(AGENCY, record, &e);
        return Err(e);
    }
    let result = upsert_agency(session, record).await;
    finish_record(session, AGENCY, record, result).await.map(Some)
}

/// Upserts one advertiser, resolving its nested agency first.
///
/// An agency that fails to sync is logged and leaves the advertiser without
/// an agency reference; the advertiser itself is still mirrored.
pub async fn sync_advertiser<S: MirrorSession>(
    session: &mut S,
    record: Option<&Value>,
) -> Result<Option<Advertiser>, AppError> {
    let Some(record) = record.filter(|r| !is_empty_payload(r)) else {
        return Ok(None);
    };
    if let Err(e) = session.savepoint().await {
        report_failure(ADVERTISER, record, &e);
        return Err(e);
    }
    let result = upsert_advertiser(session, record).await;
    finish_record(session, ADVERTISER, record, result)
        .await
        .map(Some)
}

/// Upserts one campaign, resolving its advertiser first.
///
/// Advertiser resolution:
/// - nested `advertiser` payload present: it is synced first, and if that
///   fails the campaign fails too
/// - otherwise the flat `advertiserId` is looked up among mirrored
///   advertisers, falling back to no reference
///
/// `synced_at` is stamped on every successful call.
pub async fn sync_campaign<S: MirrorSession>(
    session: &mut S,
    record: Option<&Value>,
) -> Result<Option<Campaign>, AppError> {
    let Some(record) = record.filter(|r| !is_empty_payload(r)) else {
        return Ok(None);
    };
    if let Err(e) = session.savepoint().await {
        report_failure(CAMPAIGN, record, &e);
        return Err(e);
    }
    let result = upsert_campaign(session, record).await;
    finish_record(session, CAMPAIGN, record, result).await.map(Some)
}

/// Releases the savepoint on success, rolls it back and logs on failure.
async fn finish_record<S: MirrorSession, T>(
    session: &mut S,
    kind: &'static str,
    record: &Value,
    result: Result<T, AppError>,
) -> Result<T, AppError> {
    match result {
        Ok(entity) => match session.release_savepoint().await {
            Ok(()) => Ok(entity),
            Err(e) => {
                report_failure(kind, record, &e);
                if let Err(rollback_err) = session.rollback_to_savepoint().await {
                    warn!(entity = kind, error = %rollback_err, "Failed to roll back savepoint");
                }
                Err(e)
            }
        },
        Err(e) => {
            report_failure(kind, record, &e);
            if let Err(rollback_err) = session.rollback_to_savepoint().await {
                warn!(entity = kind, error = %rollback_err, "Failed to roll back savepoint");
            }
            Err(e)
        }
    }
}

fn report_failure(kind: &'static str, record: &Value, error: &AppError) {
    warn!(
        entity = kind,
        remote_id = remote_key(record).unwrap_or("<missing>"),
        name = display_name(record).unwrap_or(""),
        payload = %record,
        error = %error,
        "[SYNC ERROR] Failed to sync {}",
        kind
    );
}

async fn upsert_agency<S: MirrorSession>(
    session: &mut S,
    record: &Value,
) -> Result<Agency, AppError> {
    let remote: RemoteAgency = decode_record(AGENCY, record)?;

    match session.find_agency(&remote.id).await? {
        Some(mut agency) => {
            agency.name = remote.name;
            session.update_agency(&agency).await?;
            Ok(agency)
        }
        None => {
            let agency = Agency {
                id: Uuid::new_v4(),
                megaphone_id: Some(remote.id),
                name: remote.name,
            };
            session.insert_agency(&agency).await?;
            Ok(agency)
        }
    }
}

async fn upsert_advertiser<S: MirrorSession>(
    session: &mut S,
    record: &Value,
) -> Result<Advertiser, AppError> {
    let remote: RemoteAdvertiser = decode_record(ADVERTISER, record)?;

    // A failed agency is already logged by sync_agency.
    let agency = sync_agency(session, remote.agency.as_ref())
        .await
        .ok()
        .flatten();

    let existing = session.find_advertiser(&remote.id).await?;
    let advertiser = match &existing {
        Some(current) => {
            advertiser_from_remote(current.id, current.created_at, remote, agency.map(|a| a.id))
        }
        None => {
            let created_at = remote.created_at;
            advertiser_from_remote(Uuid::new_v4(), created_at, remote, agency.map(|a| a.id))
        }
    };

    if existing.is_some() {
        session.update_advertiser(&advertiser).await?;
    } else {
        session.insert_advertiser(&advertiser).await?;
    }
    Ok(advertiser)
}

fn advertiser_from_remote(
    id: Uuid,
    created_at: Option<DateTime<Utc>>,
    remote: RemoteAdvertiser,
    agency_id: Option<Uuid>,
) -> Advertiser {
    let competitive_categories = remote.competitive_categories_text();
    Advertiser {
        id,
        megaphone_id: remote.id,
        name: remote.name,
        agency_id,
        created_at,
        updated_at: remote.updated_at,
        competitive_categories,
    }
}

async fn upsert_campaign<S: MirrorSession>(
    session: &mut S,
    record: &Value,
) -> Result<Campaign, AppError> {
    let remote: RemoteCampaign = decode_record(CAMPAIGN, record)?;
    let advertiser_id = resolve_advertiser(session, &remote).await?;
    let now = Utc::now();

    let existing = session.find_campaign(&remote.id).await?;
    let campaign = match &existing {
        Some(current) => campaign_from_remote(
            current.id,
            current.created_at,
            current.archived,
            remote,
            advertiser_id,
            now,
        ),
        None => {
            let created_at = remote.created_at;
            campaign_from_remote(Uuid::new_v4(), created_at, false, remote, advertiser_id, now)
        }
    };

    if existing.is_some() {
        session.update_campaign(&campaign).await?;
    } else {
        session.insert_campaign(&campaign).await?;
    }
    Ok(campaign)
}

async fn resolve_advertiser<S: MirrorSession>(
    session: &mut S,
    remote: &RemoteCampaign,
) -> Result<Option<Uuid>, AppError> {
    if let Some(payload) = remote.advertiser.as_ref().filter(|p| !is_empty_payload(p)) {
        return match sync_advertiser(session, Some(payload)).await {
            Ok(advertiser) => Ok(advertiser.map(|a| a.id)),
            Err(_) => Err(AppError::UnresolvedAdvertiser {
                campaign: remote.id.clone(),
                advertiser: remote_key(payload).unwrap_or("<missing>").to_string(),
            }),
        };
    }

    let Some(key) = remote.advertiser_id.as_deref() else {
        return Ok(None);
    };
    let advertiser = session.find_advertiser(key).await?;
    if advertiser.is_none() {
        debug!(
            campaign = %remote.id,
            advertiser = key,
            "Campaign references an advertiser that is not mirrored"
        );
    }
    Ok(advertiser.map(|a| a.id))
}

fn campaign_from_remote(
    id: Uuid,
    created_at: Option<DateTime<Utc>>,
    archived: bool,
    remote: RemoteCampaign,
    advertiser_id: Option<Uuid>,
    synced_at: DateTime<Utc>,
) -> Campaign {
    Campaign {
        id,
        megaphone_id: remote.id,
        external_id: remote.external_id,
        title: remote.title,
        advertiser_id,
        organization_id: remote.organization_id,
        total_budget_cents: remote.total_budget_cents,
        total_budget_currency: remote.total_budget_currency,
        total_revenue_cents: remote.total_revenue_cents,
        total_revenue_currency: remote.total_revenue_currency,
        duration_in_seconds: remote.duration_in_seconds,
        copy_needed: remote.copy_needed.unwrap_or(false),
        booking_source: remote.booking_source,
        created_at,
        updated_at: remote.updated_at,
        synced_at,
        archived,
    }
}
