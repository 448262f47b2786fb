//! Reconciliation against a live PostgreSQL.
//!
//! Ignored by default. Run with a disposable database:
//!
//! ```text
//! DATABASE_URL=postgres://localhost/adsync_test cargo test -p adsync-db -- --ignored
//! ```

use adsync_core::{
    sync_advertiser, sync_all_campaigns, sync_campaign, AppError, CampaignQuery, MirrorSession,
    MirrorStore, RemoteCatalog,
};
use adsync_db::PgStore;
use serde_json::{json, Value};
use sqlx::postgres::PgPoolOptions;

struct FixedCatalog(Vec<Value>);

impl RemoteCatalog for FixedCatalog {
    async fn list_advertisers(&self) -> Result<Vec<Value>, AppError> {
        Ok(Vec::new())
    }

    async fn list_campaigns(&self) -> Result<Vec<Value>, AppError> {
        Ok(self.0.clone())
    }
}

async fn fresh_store() -> PgStore {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&url)
        .await
        .expect("connect");
    let store = PgStore::new(pool);
    store.migrate().await.expect("migrate");
    sqlx::query("TRUNCATE campaigns, advertisers, agencies")
        .execute(store.pool())
        .await
        .expect("truncate");
    store
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn failed_record_does_not_abort_the_transaction() {
    let store = fresh_store().await;
    let catalog = FixedCatalog(vec![
        json!({"id": "A", "title": "Alpha", "organizationId": "o"}),
        json!({"id": "B", "title": "Beta", "organizationId": "o", "advertiser": {"id": "x"}}),
        json!({"id": "C", "title": "Gamma", "organizationId": "o"}),
    ]);

    let stats = sync_all_campaigns(&store, &catalog).await.unwrap();

    assert_eq!((stats.upserted, stats.failed, stats.deleted), (2, 1, 0));
    let page = store.campaigns(&CampaignQuery::default()).await.unwrap();
    assert_eq!(page.meta.total, 2);
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn duplicate_insert_is_rolled_back_to_savepoint() {
    let store = fresh_store().await;
    let mut session = store.begin().await.unwrap();

    let advertiser = sync_advertiser(&mut session, Some(&json!({"id": "adv", "name": "Acme"})))
        .await
        .unwrap()
        .unwrap();
    session.savepoint().await.unwrap();
    assert!(session.insert_advertiser(&advertiser).await.is_err());
    session.rollback_to_savepoint().await.unwrap();

    let campaign = json!({"id": "C", "title": "T", "organizationId": "o", "advertiserId": "adv"});
    let campaign = sync_campaign(&mut session, Some(&campaign)).await.unwrap().unwrap();
    session.commit().await.unwrap();

    let view = store.campaign(campaign.id).await.unwrap().unwrap();
    assert_eq!(view.advertiser.map(|a| a.megaphone_id).as_deref(), Some("adv"));
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn archive_flag_and_stats() {
    let store = fresh_store().await;
    let catalog = FixedCatalog(vec![json!({"id": "A", "title": "Alpha", "organizationId": "o"})]);
    sync_all_campaigns(&store, &catalog).await.unwrap();

    let page = store.campaigns(&CampaignQuery::default()).await.unwrap();
    let id = page.items[0].id;
    assert!(store.set_campaign_archived(id, true).await.unwrap());
    sync_all_campaigns(&store, &catalog).await.unwrap();

    let stats = store.stats().await.unwrap();
    assert_eq!(stats.campaigns, 1);
    assert_eq!(stats.archived_campaigns, 1);
    assert!(stats.last_synced_at.is_some());
}
