//! Trait seams between the reconciliation engine and its collaborators.
//!
//! - [`RemoteCatalog`] / [`RemoteMutator`]: the Megaphone API
//! - [`MirrorStore`] / [`MirrorSession`]: the local relational mirror
//!
//! The engine is generic over these, so tests run against in-process fakes
//! (`memory::MemoryStore`, behind the `test-util` feature) and production
//! wires in the HTTP client and the PostgreSQL repository.

use std::future::Future;

use serde_json::Value;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{
    Advertiser, AdvertiserView, Agency, Campaign, CampaignQuery, CampaignView, MirrorStats, Page,
};
use crate::remote::CampaignPayload;

/// Full remote listings, already paginated.
pub trait RemoteCatalog: Send + Sync {
    /// Every advertiser of the organization, as raw records.
    fn list_advertisers(&self) -> impl Future<Output = Result<Vec<Value>, AppError>> + Send;

    /// Every campaign of the organization, as raw records.
    fn list_campaigns(&self) -> impl Future<Output = Result<Vec<Value>, AppError>> + Send;
}

/// Remote writes used by the proxy path.
pub trait RemoteMutator: Send + Sync {
    fn create_campaign(
        &self,
        payload: &CampaignPayload,
    ) -> impl Future<Output = Result<Value, AppError>> + Send;

    fn update_campaign(
        &self,
        remote_id: &str,
        payload: &CampaignPayload,
    ) -> impl Future<Output = Result<Value, AppError>> + Send;

    fn get_campaign(&self, remote_id: &str) -> impl Future<Output = Result<Value, AppError>> + Send;
}

/// One open transaction on the mirror.
///
/// Writes are visible to later lookups in the same session before
/// [`commit`](MirrorSession::commit). Dropping a session without committing
/// discards its writes.
pub trait MirrorSession: Send {
    /// Opens the per-record savepoint.
    fn savepoint(&mut self) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Keeps the writes made since [`savepoint`](MirrorSession::savepoint).
    fn release_savepoint(&mut self) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Undoes the writes made since [`savepoint`](MirrorSession::savepoint).
    fn rollback_to_savepoint(&mut self) -> impl Future<Output = Result<(), AppError>> + Send;

    fn find_agency(
        &mut self,
        megaphone_id: &str,
    ) -> impl Future<Output = Result<Option<Agency>, AppError>> + Send;

    fn insert_agency(&mut self, agency: &Agency) -> impl Future<Output = Result<(), AppError>> + Send;

    fn update_agency(&mut self, agency: &Agency) -> impl Future<Output = Result<(), AppError>> + Send;

    fn find_advertiser(
        &mut self,
        megaphone_id: &str,
    ) -> impl Future<Output = Result<Option<Advertiser>, AppError>> + Send;

    fn insert_advertiser(
        &mut self,
        advertiser: &Advertiser,
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    fn update_advertiser(
        &mut self,
        advertiser: &Advertiser,
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    fn list_advertisers(&mut self) -> impl Future<Output = Result<Vec<Advertiser>, AppError>> + Send;

    /// Deletes by local id. Campaigns referencing it keep a null reference.
    fn delete_advertiser(&mut self, id: Uuid) -> impl Future<Output = Result<(), AppError>> + Send;

    fn find_campaign(
        &mut self,
        megaphone_id: &str,
    ) -> impl Future<Output = Result<Option<Campaign>, AppError>> + Send;

    fn insert_campaign(
        &mut self,
        campaign: &Campaign,
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    fn update_campaign(
        &mut self,
        campaign: &Campaign,
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    fn list_campaigns(&mut self) -> impl Future<Output = Result<Vec<Campaign>, AppError>> + Send;

    fn delete_campaign(&mut self, id: Uuid) -> impl Future<Output = Result<(), AppError>> + Send;

    fn commit(self) -> impl Future<Output = Result<(), AppError>> + Send;

    fn rollback(self) -> impl Future<Output = Result<(), AppError>> + Send;
}

/// Handle on the mirror: opens sessions and serves the read side of the API.
pub trait MirrorStore: Send + Sync {
    type Session: MirrorSession;

    fn begin(&self) -> impl Future<Output = Result<Self::Session, AppError>> + Send;

    /// All advertisers, agency nested, ordered by name.
    fn advertisers(&self) -> impl Future<Output = Result<Vec<AdvertiserView>, AppError>> + Send;

    fn advertiser(&self, id: Uuid) -> impl Future<Output = Result<Option<Advertiser>, AppError>> + Send;

    fn campaign(&self, id: Uuid) -> impl Future<Output = Result<Option<CampaignView>, AppError>> + Send;

    fn campaigns(
        &self,
        query: &CampaignQuery,
    ) -> impl Future<Output = Result<Page<CampaignView>, AppError>> + Send;

    /// Sets the local-only archive flag. Returns `false` if no such campaign.
    fn set_campaign_archived(
        &self,
        id: Uuid,
        archived: bool,
    ) -> impl Future<Output = Result<bool, AppError>> + Send;

    fn stats(&self) -> impl Future<Output = Result<MirrorStats, AppError>> + Send;
}
