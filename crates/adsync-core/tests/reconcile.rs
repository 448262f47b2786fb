//! Reconciliation passes against the in-process store and a scripted catalog.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use adsync_core::memory::MemoryStore;
use adsync_core::{
    sync_all_advertisers, sync_all_campaigns, AppError, MirrorStore, Reconciler, RemoteCatalog,
    SyncStats, SyncStatus,
};
use serde_json::{json, Value};

/// Serves whatever listings the test puts in it.
#[derive(Default)]
struct ScriptedCatalog {
    advertisers: Mutex<Vec<Value>>,
    campaigns: Mutex<Vec<Value>>,
    fail: Mutex<bool>,
}

impl ScriptedCatalog {
    fn with_campaigns(campaigns: Vec<Value>) -> Self {
        let catalog = Self::default();
        catalog.set_campaigns(campaigns);
        catalog
    }

    fn set_campaigns(&self, campaigns: Vec<Value>) {
        *self.campaigns.lock().unwrap() = campaigns;
    }

    fn set_advertisers(&self, advertisers: Vec<Value>) {
        *self.advertisers.lock().unwrap() = advertisers;
    }

    fn fail_listings(&self) {
        *self.fail.lock().unwrap() = true;
    }
}

impl RemoteCatalog for ScriptedCatalog {
    async fn list_advertisers(&self) -> Result<Vec<Value>, AppError> {
        if *self.fail.lock().unwrap() {
            return Err(AppError::NetworkError("connection refused".to_string()));
        }
        Ok(self.advertisers.lock().unwrap().clone())
    }

    async fn list_campaigns(&self) -> Result<Vec<Value>, AppError> {
        if *self.fail.lock().unwrap() {
            return Err(AppError::NetworkError("connection refused".to_string()));
        }
        Ok(self.campaigns.lock().unwrap().clone())
    }
}

fn campaign(id: &str, title: &str) -> Value {
    json!({
        "id": id,
        "title": title,
        "organizationId": "org-1",
        "totalBudgetCents": 1000,
        "totalBudgetCurrency": "USD",
        "createdAt": "2024-01-01T00:00:00Z"
    })
}

fn stats(upserted: usize, failed: usize, deleted: usize) -> SyncStats {
    SyncStats {
        upserted,
        failed,
        deleted,
    }
}

#[tokio::test]
async fn second_pass_with_unchanged_data_is_idempotent() {
    let store = MemoryStore::new();
    let catalog = ScriptedCatalog::with_campaigns(vec![
        campaign("A", "Alpha"),
        campaign("B", "Beta"),
        campaign("C", "Gamma"),
    ]);

    let first = sync_all_campaigns(&store, &catalog).await.unwrap();
    let ids: Vec<_> = store.campaign_rows().iter().map(|c| c.id).collect();
    let second = sync_all_campaigns(&store, &catalog).await.unwrap();

    assert_eq!(first, stats(3, 0, 0));
    assert_eq!(second, stats(3, 0, 0));
    let after: Vec<_> = store.campaign_rows().iter().map(|c| c.id).collect();
    assert_eq!(ids, after);
}

#[tokio::test]
async fn rows_missing_remotely_are_deleted() {
    let store = MemoryStore::new();
    let catalog = ScriptedCatalog::with_campaigns(vec![
        campaign("A", "Alpha"),
        campaign("B", "Beta"),
        campaign("C", "Gamma"),
    ]);
    sync_all_campaigns(&store, &catalog).await.unwrap();

    catalog.set_campaigns(vec![campaign("A", "Alpha"), campaign("C", "Gamma")]);
    let result = sync_all_campaigns(&store, &catalog).await.unwrap();

    assert_eq!(result, stats(2, 0, 1));
    let mut keys: Vec<_> = store
        .campaign_rows()
        .into_iter()
        .map(|c| c.megaphone_id)
        .collect();
    keys.sort();
    assert_eq!(keys, ["A", "C"]);
}

#[tokio::test]
async fn archived_flag_survives_a_full_pass() {
    let store = MemoryStore::new();
    let catalog = ScriptedCatalog::with_campaigns(vec![campaign("A", "Alpha")]);
    sync_all_campaigns(&store, &catalog).await.unwrap();
    let id = store.campaign_rows()[0].id;
    store.set_campaign_archived(id, true).await.unwrap();

    catalog.set_campaigns(vec![json!({
        "id": "A",
        "title": "Renamed",
        "organizationId": "org-2",
        "totalBudgetCents": 1,
        "totalBudgetCurrency": "EUR",
        "copyNeeded": true
    })]);
    sync_all_campaigns(&store, &catalog).await.unwrap();

    let row = &store.campaign_rows()[0];
    assert_eq!(row.title, "Renamed");
    assert_eq!(row.organization_id, "org-2");
    assert!(row.copy_needed);
    assert!(row.archived);
}

#[tokio::test]
async fn campaign_without_advertiser_is_persisted() {
    let store = MemoryStore::new();
    let mut record = campaign("A", "Alpha");
    record["advertiser"] = Value::Null;
    let catalog = ScriptedCatalog::with_campaigns(vec![record]);

    let result = sync_all_campaigns(&store, &catalog).await.unwrap();

    assert_eq!(result, stats(1, 0, 0));
    let row = &store.campaign_rows()[0];
    assert_eq!(row.advertiser_id, None);
    assert_eq!(row.total_budget_cents, Some(1000));
    assert_eq!(row.total_budget_currency.as_deref(), Some("USD"));
}

#[tokio::test]
async fn malformed_nested_advertiser_fails_only_its_campaign() {
    let store = MemoryStore::new();
    let mut broken = campaign("B", "Beta");
    broken["advertiser"] = json!({"id": "adv-9", "name": 42});
    let mut linked = campaign("C", "Gamma");
    linked["advertiser"] = json!({"id": "adv-1", "name": "Acme", "agency": {"id": "ag-1", "name": "Ag"}});
    let catalog = ScriptedCatalog::with_campaigns(vec![campaign("A", "Alpha"), broken, linked]);

    let result = sync_all_campaigns(&store, &catalog).await.unwrap();

    assert_eq!(result, stats(2, 1, 0));
    let keys: Vec<_> = store
        .campaign_rows()
        .into_iter()
        .map(|c| c.megaphone_id)
        .collect();
    assert_eq!(keys, ["A", "C"]);
    let advertisers = store.advertiser_rows();
    assert_eq!(advertisers.len(), 1);
    assert_eq!(advertisers[0].megaphone_id, "adv-1");
    assert_eq!(store.agency_rows().len(), 1);
}

#[tokio::test]
async fn failed_record_keeps_its_previous_row() {
    let store = MemoryStore::new();
    let catalog = ScriptedCatalog::with_campaigns(vec![campaign("A", "Alpha")]);
    sync_all_campaigns(&store, &catalog).await.unwrap();

    // Still listed, so not deleted, but the new payload is unusable.
    catalog.set_campaigns(vec![json!({"id": "A", "title": null, "organizationId": "org-1"})]);
    let result = sync_all_campaigns(&store, &catalog).await.unwrap();

    assert_eq!(result, stats(0, 1, 0));
    assert_eq!(store.campaign_rows()[0].title, "Alpha");
}

#[tokio::test]
async fn transport_failure_aborts_before_writing() {
    let store = MemoryStore::new();
    let catalog = ScriptedCatalog::with_campaigns(vec![campaign("A", "Alpha")]);
    sync_all_campaigns(&store, &catalog).await.unwrap();

    catalog.fail_listings();
    let err = sync_all_campaigns(&store, &catalog).await.unwrap_err();

    assert!(matches!(err, AppError::NetworkError(_)));
    assert_eq!(store.campaign_rows().len(), 1);
}

#[tokio::test]
async fn deleting_advertiser_nulls_campaign_reference() {
    let store = MemoryStore::new();
    let catalog = ScriptedCatalog::default();
    catalog.set_advertisers(vec![json!({"id": "adv-1", "name": "Acme"})]);
    catalog.set_campaigns(vec![json!({
        "id": "A",
        "title": "Alpha",
        "organizationId": "org-1",
        "advertiserId": "adv-1"
    })]);
    let reconciler = Reconciler::new(store.clone(), catalog);

    let report = reconciler.sync_all().await.unwrap();
    assert_eq!(report.overall_status(), SyncStatus::Success);
    assert!(store.campaign_rows()[0].advertiser_id.is_some());

    reconciler.catalog().set_advertisers(vec![]);
    let report = reconciler.sync_advertisers().await.unwrap();

    assert_eq!(report.deleted, 1);
    assert_eq!(report.message, "Advertisers sync completed successfully");
    assert!(store.advertiser_rows().is_empty());
    assert_eq!(store.campaign_rows()[0].advertiser_id, None);
}

#[tokio::test]
async fn advertiser_pass_reports_failures() {
    let store = MemoryStore::new();
    let catalog = ScriptedCatalog::default();
    catalog.set_advertisers(vec![json!({"id": "adv-1"}), json!({"name": "no id"})]);

    let result = sync_all_advertisers(&store, &catalog).await.unwrap();

    assert_eq!(result, stats(0, 2, 0));
    let reconciler = Reconciler::new(store, catalog);
    let report = reconciler.sync_advertisers().await.unwrap();
    assert_eq!(report.status, SyncStatus::CompleteFailure);
    assert!(!reconciler.is_busy());
}

/// Counts how many listings are in flight at once.
#[derive(Default)]
struct SlowCatalog {
    active: AtomicUsize,
    peak: AtomicUsize,
    calls: AtomicUsize,
}

impl SlowCatalog {
    async fn listing(&self) -> Result<Vec<Value>, AppError> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        self.active.fetch_sub(1, Ordering::SeqCst);
        Ok(Vec::new())
    }
}

impl RemoteCatalog for SlowCatalog {
    async fn list_advertisers(&self) -> Result<Vec<Value>, AppError> {
        self.listing().await
    }

    async fn list_campaigns(&self) -> Result<Vec<Value>, AppError> {
        self.listing().await
    }
}

#[tokio::test(start_paused = true)]
async fn concurrent_passes_run_one_at_a_time() {
    let reconciler = Arc::new(Reconciler::new(MemoryStore::new(), SlowCatalog::default()));

    let single = tokio::spawn({
        let reconciler = Arc::clone(&reconciler);
        async move { reconciler.sync_advertisers().await }
    });
    let full = tokio::spawn({
        let reconciler = Arc::clone(&reconciler);
        async move { reconciler.sync_all().await }
    });
    let campaigns = tokio::spawn({
        let reconciler = Arc::clone(&reconciler);
        async move { reconciler.sync_campaigns().await }
    });

    single.await.unwrap().unwrap();
    full.await.unwrap().unwrap();
    campaigns.await.unwrap().unwrap();

    let catalog = reconciler.catalog();
    assert_eq!(catalog.calls.load(Ordering::SeqCst), 4);
    assert_eq!(catalog.peak.load(Ordering::SeqCst), 1);
    assert!(!reconciler.is_busy());
}
