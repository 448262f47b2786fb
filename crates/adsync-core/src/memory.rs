//! In-process mirror store.
//!
//! Mirrors the PostgreSQL repository's semantics closely enough to run the
//! reconciliation engine and the HTTP layer without a database: unique
//! remote keys, foreign keys with `ON DELETE SET NULL`, savepoints as a
//! stack, and nothing visible outside a session until it commits.

use std::cmp::Ordering;
use std::sync::{Arc, Mutex, MutexGuard};

use uuid::Uuid;

use crate::error::AppError;
use crate::models::{
    Advertiser, AdvertiserView, Agency, Campaign, CampaignQuery, CampaignView, MirrorStats, Page,
    PageMeta, SortField, SortOrder,
};
use crate::traits::{MirrorSession, MirrorStore};

#[derive(Debug, Clone, Default)]
struct Tables {
    agencies: Vec<Agency>,
    advertisers: Vec<Advertiser>,
    campaigns: Vec<Campaign>,
}

impl Tables {
    fn agency(&self, id: Uuid) -> Option<&Agency> {
        self.agencies.iter().find(|a| a.id == id)
    }

    fn advertiser_view(&self, advertiser: &Advertiser) -> AdvertiserView {
        let agency = advertiser
            .agency_id
            .and_then(|id| self.agency(id))
            .cloned();
        AdvertiserView::new(advertiser.clone(), agency)
    }

    fn campaign_view(&self, campaign: &Campaign) -> CampaignView {
        let advertiser = campaign
            .advertiser_id
            .and_then(|id| self.advertisers.iter().find(|a| a.id == id))
            .map(|a| self.advertiser_view(a));
        CampaignView::new(campaign.clone(), advertiser)
    }
}

/// Shared handle; clones see the same committed data.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    committed: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>, AppError> {
        lock_tables(&self.committed)
    }

    /// Committed agencies, in insertion order.
    pub fn agency_rows(&self) -> Vec<Agency> {
        self.lock().map(|t| t.agencies.clone()).unwrap_or_default()
    }

    /// Committed advertisers, in insertion order.
    pub fn advertiser_rows(&self) -> Vec<Advertiser> {
        self.lock()
            .map(|t| t.advertisers.clone())
            .unwrap_or_default()
    }

    /// Committed campaigns, in insertion order.
    pub fn campaign_rows(&self) -> Vec<Campaign> {
        self.lock().map(|t| t.campaigns.clone()).unwrap_or_default()
    }
}

fn lock_tables(tables: &Mutex<Tables>) -> Result<MutexGuard<'_, Tables>, AppError> {
    tables
        .lock()
        .map_err(|_| AppError::Storage("memory store lock poisoned".to_string()))
}

/// Working copy of the tables plus a stack of savepoint snapshots.
#[derive(Debug)]
pub struct MemorySession {
    committed: Arc<Mutex<Tables>>,
    working: Tables,
    savepoints: Vec<Tables>,
}

impl MemorySession {
    fn check_agency_ref(&self, agency_id: Option<Uuid>) -> Result<(), AppError> {
        match agency_id {
            Some(id) if self.working.agency(id).is_none() => Err(fk_violation("advertisers_agency_id_fkey")),
            _ => Ok(()),
        }
    }

    fn check_advertiser_ref(&self, advertiser_id: Option<Uuid>) -> Result<(), AppError> {
        match advertiser_id {
            Some(id) if !self.working.advertisers.iter().any(|a| a.id == id) => {
                Err(fk_violation("campaigns_advertiser_id_fkey"))
            }
            _ => Ok(()),
        }
    }
}

fn unique_violation(constraint: &str) -> AppError {
    AppError::Storage(format!(
        "duplicate key value violates unique constraint \"{}\"",
        constraint
    ))
}

fn fk_violation(constraint: &str) -> AppError {
    AppError::Storage(format!(
        "insert or update violates foreign key constraint \"{}\"",
        constraint
    ))
}

fn missing_row(table: &str, id: Uuid) -> AppError {
    AppError::Storage(format!("no row in {} with id {}", table, id))
}

impl MirrorSession for MemorySession {
    async fn savepoint(&mut self) -> Result<(), AppError> {
        self.savepoints.push(self.working.clone());
        Ok(())
    }

    async fn release_savepoint(&mut self) -> Result<(), AppError> {
        self.savepoints
            .pop()
            .map(|_| ())
            .ok_or_else(|| AppError::Storage("no savepoint to release".to_string()))
    }

    async fn rollback_to_savepoint(&mut self) -> Result<(), AppError> {
        let snapshot = self
            .savepoints
            .pop()
            .ok_or_else(|| AppError::Storage("no savepoint to roll back to".to_string()))?;
        self.working = snapshot;
        Ok(())
    }

    async fn find_agency(&mut self, megaphone_id: &str) -> Result<Option<Agency>, AppError> {
        Ok(self
            .working
            .agencies
            .iter()
            .find(|a| a.megaphone_id.as_deref() == Some(megaphone_id))
            .cloned())
    }

    async fn insert_agency(&mut self, agency: &Agency) -> Result<(), AppError> {
        if agency.megaphone_id.is_some()
            && self
                .working
                .agencies
                .iter()
                .any(|a| a.megaphone_id == agency.megaphone_id)
        {
            return Err(unique_violation("agencies_megaphone_id_key"));
        }
        self.working.agencies.push(agency.clone());
        Ok(())
    }

    async fn update_agency(&mut self, agency: &Agency) -> Result<(), AppError> {
        let row = self
            .working
            .agencies
            .iter_mut()
            .find(|a| a.id == agency.id)
            .ok_or_else(|| missing_row("agencies", agency.id))?;
        *row = agency.clone();
        Ok(())
    }

    async fn find_advertiser(&mut self, megaphone_id: &str) -> Result<Option<Advertiser>, AppError> {
        Ok(self
            .working
            .advertisers
            .iter()
            .find(|a| a.megaphone_id == megaphone_id)
            .cloned())
    }

    async fn insert_advertiser(&mut self, advertiser: &Advertiser) -> Result<(), AppError> {
        if self
            .working
            .advertisers
            .iter()
            .any(|a| a.megaphone_id == advertiser.megaphone_id)
        {
            return Err(unique_violation("advertisers_megaphone_id_key"));
        }
        self.check_agency_ref(advertiser.agency_id)?;
        self.working.advertisers.push(advertiser.clone());
        Ok(())
    }

    async fn update_advertiser(&mut self, advertiser: &Advertiser) -> Result<(), AppError> {
        self.check_agency_ref(advertiser.agency_id)?;
        let row = self
            .working
            .advertisers
            .iter_mut()
            .find(|a| a.id == advertiser.id)
            .ok_or_else(|| missing_row("advertisers", advertiser.id))?;
        *row = advertiser.clone();
        Ok(())
    }

    async fn list_advertisers(&mut self) -> Result<Vec<Advertiser>, AppError> {
        Ok(self.working.advertisers.clone())
    }

    async fn delete_advertiser(&mut self, id: Uuid) -> Result<(), AppError> {
        self.working.advertisers.retain(|a| a.id != id);
        for campaign in &mut self.working.campaigns {
            if campaign.advertiser_id == Some(id) {
                campaign.advertiser_id = None;
            }
        }
        Ok(())
    }

    async fn find_campaign(&mut self, megaphone_id: &str) -> Result<Option<Campaign>, AppError> {
        Ok(self
            .working
            .campaigns
            .iter()
            .find(|c| c.megaphone_id == megaphone_id)
            .cloned())
    }

    async fn insert_campaign(&mut self, campaign: &Campaign) -> Result<(), AppError> {
        if self
            .working
            .campaigns
            .iter()
            .any(|c| c.megaphone_id == campaign.megaphone_id)
        {
            return Err(unique_violation("campaigns_megaphone_id_key"));
        }
        self.check_advertiser_ref(campaign.advertiser_id)?;
        self.working.campaigns.push(campaign.clone());
        Ok(())
    }

    async fn update_campaign(&mut self, campaign: &Campaign) -> Result<(), AppError> {
        self.check_advertiser_ref(campaign.advertiser_id)?;
        let row = self
            .working
            .campaigns
            .iter_mut()
            .find(|c| c.id == campaign.id)
            .ok_or_else(|| missing_row("campaigns", campaign.id))?;
        *row = campaign.clone();
        Ok(())
    }

    async fn list_campaigns(&mut self) -> Result<Vec<Campaign>, AppError> {
        Ok(self.working.campaigns.clone())
    }

    async fn delete_campaign(&mut self, id: Uuid) -> Result<(), AppError> {
        self.working.campaigns.retain(|c| c.id != id);
        Ok(())
    }

    async fn commit(self) -> Result<(), AppError> {
        let mut committed = lock_tables(&self.committed)?;
        *committed = self.working;
        Ok(())
    }

    async fn rollback(self) -> Result<(), AppError> {
        Ok(())
    }
}

impl MirrorStore for MemoryStore {
    type Session = MemorySession;

    async fn begin(&self) -> Result<MemorySession, AppError> {
        let working = self.lock()?.clone();
        Ok(MemorySession {
            committed: Arc::clone(&self.committed),
            working,
            savepoints: Vec::new(),
        })
    }

    async fn advertisers(&self) -> Result<Vec<AdvertiserView>, AppError> {
        let tables = self.lock()?;
        let mut views: Vec<AdvertiserView> = tables
            .advertisers
            .iter()
            .map(|a| tables.advertiser_view(a))
            .collect();
        views.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(views)
    }

    async fn advertiser(&self, id: Uuid) -> Result<Option<Advertiser>, AppError> {
        let tables = self.lock()?;
        Ok(tables.advertisers.iter().find(|a| a.id == id).cloned())
    }

    async fn campaign(&self, id: Uuid) -> Result<Option<CampaignView>, AppError> {
        let tables = self.lock()?;
        Ok(tables
            .campaigns
            .iter()
            .find(|c| c.id == id)
            .map(|c| tables.campaign_view(c)))
    }

    async fn campaigns(&self, query: &CampaignQuery) -> Result<Page<CampaignView>, AppError> {
        let tables = self.lock()?;
        let needle = query.search_term().map(str::to_lowercase);

        let mut matching: Vec<&Campaign> = tables
            .campaigns
            .iter()
            .filter(|c| {
                needle
                    .as_deref()
                    .is_none_or(|n| c.title.to_lowercase().contains(n))
            })
            .filter(|c| query.advertiser_id.is_none_or(|id| c.advertiser_id == Some(id)))
            .filter(|c| query.archived.is_none_or(|flag| c.archived == flag))
            .collect();

        matching.sort_by(|a, b| {
            let primary = compare_by(a, b, query.sort_by);
            let primary = match query.sort_order {
                SortOrder::Asc => primary,
                SortOrder::Desc => primary.reverse(),
            };
            primary.then_with(|| a.id.cmp(&b.id))
        });

        let total = matching.len() as u64;
        let items = matching
            .into_iter()
            .skip(usize::try_from(query.offset()).unwrap_or(usize::MAX))
            .take(query.per_page as usize)
            .map(|c| tables.campaign_view(c))
            .collect();

        Ok(Page {
            items,
            meta: PageMeta {
                page: query.page,
                per_page: query.per_page,
                total,
            },
        })
    }

    async fn set_campaign_archived(&self, id: Uuid, archived: bool) -> Result<bool, AppError> {
        let mut tables = self.lock()?;
        match tables.campaigns.iter_mut().find(|c| c.id == id) {
            Some(campaign) => {
                campaign.archived = archived;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn stats(&self) -> Result<MirrorStats, AppError> {
        let tables = self.lock()?;
        Ok(MirrorStats {
            agencies: tables.agencies.len() as i64,
            advertisers: tables.advertisers.len() as i64,
            campaigns: tables.campaigns.len() as i64,
            archived_campaigns: tables.campaigns.iter().filter(|c| c.archived).count() as i64,
            last_synced_at: tables.campaigns.iter().map(|c| c.synced_at).max(),
        })
    }
}

/// Orders like PostgreSQL: NULLs sort after every value in ascending order.
fn nulls_last<T: Ord>(a: &Option<T>, b: &Option<T>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(b),
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
    }
}

fn compare_by(a: &Campaign, b: &Campaign, field: SortField) -> Ordering {
    match field {
        SortField::Title => a.title.cmp(&b.title),
        SortField::CreatedAt => nulls_last(&a.created_at, &b.created_at),
        SortField::UpdatedAt => nulls_last(&a.updated_at, &b.updated_at),
        SortField::OrganizationId => a.organization_id.cmp(&b.organization_id),
        SortField::TotalBudgetCents => nulls_last(&a.total_budget_cents, &b.total_budget_cents),
        SortField::TotalBudgetCurrency => {
            nulls_last(&a.total_budget_currency, &b.total_budget_currency)
        }
        SortField::TotalRevenueCents => nulls_last(&a.total_revenue_cents, &b.total_revenue_cents),
        SortField::TotalRevenueCurrency => {
            nulls_last(&a.total_revenue_currency, &b.total_revenue_currency)
        }
        SortField::DurationInSeconds => nulls_last(&a.duration_in_seconds, &b.duration_in_seconds),
        SortField::CopyNeeded => a.copy_needed.cmp(&b.copy_needed),
        SortField::BookingSource => nulls_last(&a.booking_source, &b.booking_source),
        SortField::SyncedAt => a.synced_at.cmp(&b.synced_at),
        SortField::Archived => a.archived.cmp(&b.archived),
    }
}
