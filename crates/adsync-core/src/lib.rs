//! adsync Core - Domain types, reconciliation engine, error handling, and configuration.

pub mod campaigns;
pub mod config;
pub mod datetime;
pub mod error;
#[cfg(any(test, feature = "test-util"))]
pub mod memory;
pub mod models;
pub mod reconcile;
pub mod remote;
pub mod sync;
pub mod traits;
pub mod upsert;
pub mod validation;

pub use config::{
    default_config_path, load_settings, DbConfig, HttpConfig, RateLimitConfig, ServerConfig,
    Settings, SyncConfig,
};
pub use error::AppError;
pub use models::{
    Advertiser, AdvertiserView, Agency, Campaign, CampaignQuery, CampaignView, MirrorStats, Page,
    PageMeta, SortField, SortOrder,
};
pub use reconcile::{sync_all_advertisers, sync_all_campaigns, Reconciler};
pub use remote::CampaignPayload;
pub use sync::{FullSyncReport, SyncOutcome, SyncReport, SyncStats, SyncStatus};
pub use traits::{MirrorSession, MirrorStore, RemoteCatalog, RemoteMutator};
pub use upsert::{sync_advertiser, sync_agency, sync_campaign};
