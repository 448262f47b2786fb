//! Full-listing reconciliation passes.
//!
//! A pass fetches the complete remote listing for one entity kind, upserts
//! every record in listing order, deletes local rows whose remote key is no
//! longer listed and commits once. Per-record failures are counted and the
//! pass keeps going; anything that breaks the pass itself (listing fetch,
//! store errors outside a record's savepoint) aborts it with nothing
//! committed.

use std::collections::HashSet;
use std::time::Instant;

use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::error::AppError;
use crate::remote::remote_key;
use crate::sync::{FullSyncReport, SyncOutcome, SyncReport, SyncStats};
use crate::traits::{MirrorSession, MirrorStore, RemoteCatalog};
use crate::upsert::{sync_advertiser, sync_campaign};

/// Reconciles every local advertiser against the remote listing.
pub async fn sync_all_advertisers<S, C>(store: &S, catalog: &C) -> Result<SyncStats, AppError>
where
    S: MirrorStore,
    C: RemoteCatalog,
{
    let start = Instant::now();
    info!("Starting advertiser sync");

    let records = catalog.list_advertisers().await?;
    info!(count = records.len(), "Fetched remote advertisers");

    let mut session = store.begin().await?;
    let stats = match reconcile_advertisers(&mut session, &records).await {
        Ok(stats) => stats,
        Err(e) => return Err(abort(session, "advertiser", e).await),
    };
    session.commit().await?;

    info!(
        upserted = stats.upserted,
        failed = stats.failed,
        deleted = stats.deleted,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Advertiser sync finished"
    );
    Ok(stats)
}

/// Reconciles every local campaign against the remote listing.
pub async fn sync_all_campaigns<S, C>(store: &S, catalog: &C) -> Result<SyncStats, AppError>
where
    S: MirrorStore,
    C: RemoteCatalog,
{
    let start = Instant::now();
    info!("Starting campaign sync");

    let records = catalog.list_campaigns().await?;
    info!(count = records.len(), "Fetched remote campaigns");

    let mut session = store.begin().await?;
    let stats = match reconcile_campaigns(&mut session, &records).await {
        Ok(stats) => stats,
        Err(e) => return Err(abort(session, "campaign", e).await),
    };
    session.commit().await?;

    info!(
        upserted = stats.upserted,
        failed = stats.failed,
        deleted = stats.deleted,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Campaign sync finished"
    );
    Ok(stats)
}

async fn reconcile_advertisers<T: MirrorSession>(
    session: &mut T,
    records: &[Value],
) -> Result<SyncStats, AppError> {
    let remote_keys = collect_remote_keys(records);
    let mut stats = SyncStats::new();

    for record in records {
        match sync_advertiser(session, Some(record)).await {
            Ok(Some(_)) => stats.record(SyncOutcome::Upserted),
            Ok(None) => {
                warn!("Empty advertiser record in remote listing");
                stats.record(SyncOutcome::Failed);
            }
            Err(_) => stats.record(SyncOutcome::Failed),
        }
    }

    for advertiser in session.list_advertisers().await? {
        if remote_keys.contains(advertiser.megaphone_id.as_str()) {
            continue;
        }
        session.delete_advertiser(advertiser.id).await?;
        stats.record(SyncOutcome::Deleted);
        info!(
            id = %advertiser.id,
            megaphone_id = %advertiser.megaphone_id,
            name = %advertiser.name,
            "[SYNC] Advertiser deleted"
        );
    }

    Ok(stats)
}

async fn reconcile_campaigns<T: MirrorSession>(
    session: &mut T,
    records: &[Value],
) -> Result<SyncStats, AppError> {
    let remote_keys = collect_remote_keys(records);
    let mut stats = SyncStats::new();

    for record in records {
        match sync_campaign(session, Some(record)).await {
            Ok(Some(_)) => stats.record(SyncOutcome::Upserted),
            Ok(None) => {
                warn!("Empty campaign record in remote listing");
                stats.record(SyncOutcome::Failed);
            }
            Err(_) => stats.record(SyncOutcome::Failed),
        }
    }

    for campaign in session.list_campaigns().await? {
        if remote_keys.contains(campaign.megaphone_id.as_str()) {
            continue;
        }
        session.delete_campaign(campaign.id).await?;
        stats.record(SyncOutcome::Deleted);
        info!(
            id = %campaign.id,
            megaphone_id = %campaign.megaphone_id,
            title = %campaign.title,
            "[SYNC] Campaign deleted"
        );
    }

    Ok(stats)
}

fn collect_remote_keys(records: &[Value]) -> HashSet<String> {
    records
        .iter()
        .filter_map(remote_key)
        .map(str::to_string)
        .collect()
}

async fn abort<T: MirrorSession>(session: T, kind: &str, error: AppError) -> AppError {
    warn!(entity = kind, error = %error, "Sync pass aborted, rolling back");
    if let Err(rollback_err) = session.rollback().await {
        warn!(entity = kind, error = %rollback_err, "Rollback failed");
    }
    error
}

/// Runs passes one at a time.
///
/// Scheduled and manually triggered passes share one `Reconciler`, so a
/// pass requested while another is running waits for it to finish.
pub struct Reconciler<S, C> {
    store: S,
    catalog: C,
    guard: Mutex<()>,
}

impl<S, C> Reconciler<S, C>
where
    S: MirrorStore,
    C: RemoteCatalog,
{
    pub fn new(store: S, catalog: C) -> Self {
        Self {
            store,
            catalog,
            guard: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn catalog(&self) -> &C {
        &self.catalog
    }

    /// True while a pass holds the guard.
    pub fn is_busy(&self) -> bool {
        self.guard.try_lock().is_err()
    }

    pub async fn sync_advertisers(&self) -> Result<SyncReport, AppError> {
        let _pass = self.guard.lock().await;
        let stats = sync_all_advertisers(&self.store, &self.catalog).await?;
        Ok(SyncReport::new("Advertisers", &stats))
    }

    pub async fn sync_campaigns(&self) -> Result<SyncReport, AppError> {
        let _pass = self.guard.lock().await;
        let stats = sync_all_campaigns(&self.store, &self.catalog).await?;
        Ok(SyncReport::new("Campaigns", &stats))
    }

    /// Advertisers, then campaigns, without letting another pass in between.
    pub async fn sync_all(&self) -> Result<FullSyncReport, AppError> {
        let _pass = self.guard.lock().await;
        let advertisers = sync_all_advertisers(&self.store, &self.catalog).await?;
        let campaigns = sync_all_campaigns(&self.store, &self.catalog).await?;
        Ok(FullSyncReport {
            advertisers: SyncReport::new("Advertisers", &advertisers),
            campaigns: SyncReport::new("Campaigns", &campaigns),
        })
    }
}
