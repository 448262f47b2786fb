//! HTTP API over the mirror.
//!
//! Local routes read from the mirror and proxy writes through
//! [`adsync_core::campaigns`]. The `/remote/*` routes pass straight through
//! to Megaphone without touching the mirror.

use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;
use tracing::error;
use uuid::Uuid;

use adsync_core::campaigns::{self, CampaignChanges, NewCampaign};
use adsync_core::models::{
    AdvertiserView, CampaignQuery, CampaignView, Page, SortField, SortOrder, DEFAULT_PER_PAGE,
};
use adsync_core::{
    AppError, CampaignPayload, FullSyncReport, MirrorStore, Reconciler, RemoteCatalog,
    RemoteMutator, SyncReport,
};

/// Shared state: one reconciler, whose catalog doubles as the remote for
/// proxied writes.
pub struct AppState<S, R> {
    reconciler: Arc<Reconciler<S, R>>,
}

impl<S, R> Clone for AppState<S, R> {
    fn clone(&self) -> Self {
        Self {
            reconciler: Arc::clone(&self.reconciler),
        }
    }
}

impl<S, R> AppState<S, R>
where
    S: MirrorStore,
    R: RemoteCatalog + RemoteMutator,
{
    pub fn new(reconciler: Arc<Reconciler<S, R>>) -> Self {
        Self { reconciler }
    }

    fn store(&self) -> &S {
        self.reconciler.store()
    }

    fn remote(&self) -> &R {
        self.reconciler.catalog()
    }
}

pub fn app_router<S, R>(state: AppState<S, R>) -> Router
where
    S: MirrorStore + 'static,
    R: RemoteCatalog + RemoteMutator + 'static,
{
    Router::new()
        .route("/", get(welcome))
        .route("/healthz", get(healthz::<S, R>))
        .route("/advertisers", get(list_advertisers::<S, R>))
        .route("/advertisers/sync", post(sync_advertisers::<S, R>))
        .route(
            "/campaigns",
            get(list_campaigns::<S, R>).post(create_campaign::<S, R>),
        )
        .route("/campaigns/sync", post(sync_campaigns::<S, R>))
        .route(
            "/campaigns/{id}",
            get(get_campaign::<S, R>).put(update_campaign::<S, R>),
        )
        .route("/campaigns/{id}/archive", put(set_archived::<S, R>))
        .route("/sync", post(sync_all::<S, R>))
        .route("/remote/advertisers", get(remote_advertisers::<S, R>))
        .route(
            "/remote/campaigns",
            get(remote_campaigns::<S, R>).post(remote_create_campaign::<S, R>),
        )
        .route(
            "/remote/campaigns/{id}",
            get(remote_campaign::<S, R>).put(remote_update_campaign::<S, R>),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Error response wrapper around [`AppError`].
#[derive(Debug)]
pub struct ApiError(pub AppError);

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        ApiError(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError(AppError::Validation(rejection.body_text()))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError(AppError::Validation(rejection.body_text()))
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            AppError::Validation(_) | AppError::AdvertiserNotFound => StatusCode::BAD_REQUEST,
            AppError::CampaignNotFound => StatusCode::NOT_FOUND,
            AppError::RemoteRejected { status, body } => {
                let status = StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY);
                let body = json!({ "error": "Remote API failed", "reason": body });
                return (status, Json(body)).into_response();
            }
            AppError::ClientError(_)
            | AppError::NetworkError(_)
            | AppError::Timeout(_)
            | AppError::RateLimitExceeded => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!(error = %self.0, "Request failed");
        }
        let body = ErrorBody {
            error: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// Path ids that are not UUIDs cannot name a mirrored campaign.
fn campaign_id(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|_| AppError::CampaignNotFound)
}

async fn welcome() -> Json<Value> {
    Json(json!({ "message": "Welcome to the adsync Megaphone mirror" }))
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: i64,
    syncing: bool,
}

async fn healthz<S, R>(State(state): State<AppState<S, R>>) -> Json<HealthResponse>
where
    S: MirrorStore,
    R: RemoteCatalog + RemoteMutator,
{
    Json(HealthResponse {
        status: "ok",
        timestamp: Utc::now().timestamp(),
        syncing: state.reconciler.is_busy(),
    })
}

async fn list_advertisers<S, R>(
    State(state): State<AppState<S, R>>,
) -> ApiResult<Json<Vec<AdvertiserView>>>
where
    S: MirrorStore,
    R: RemoteCatalog + RemoteMutator,
{
    Ok(Json(campaigns::list_advertisers(state.store()).await?))
}

/// Query string of `GET /campaigns`.
#[derive(Debug, Default, Deserialize)]
struct ListParams {
    search: Option<String>,
    advertiser_id: Option<String>,
    archived: Option<bool>,
    sort_by: Option<SortField>,
    sort_order: Option<SortOrder>,
    page: Option<u32>,
    per_page: Option<u32>,
}

impl ListParams {
    fn into_query(self) -> Result<CampaignQuery, AppError> {
        let advertiser_id = match self.advertiser_id.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => Some(Uuid::parse_str(raw).map_err(|_| {
                AppError::Validation("advertiser_id must be a UUID".to_string())
            })?),
        };
        Ok(CampaignQuery {
            search: self.search,
            advertiser_id,
            archived: self.archived,
            sort_by: self.sort_by.unwrap_or_default(),
            sort_order: self.sort_order.unwrap_or_default(),
            page: self.page.unwrap_or(1),
            per_page: self.per_page.unwrap_or(DEFAULT_PER_PAGE),
        })
    }
}

async fn list_campaigns<S, R>(
    State(state): State<AppState<S, R>>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> ApiResult<Json<Page<CampaignView>>>
where
    S: MirrorStore,
    R: RemoteCatalog + RemoteMutator,
{
    let Query(params) = params?;
    let query = params.into_query()?;
    Ok(Json(campaigns::list_campaigns(state.store(), &query).await?))
}

async fn get_campaign<S, R>(
    State(state): State<AppState<S, R>>,
    Path(id): Path<String>,
) -> ApiResult<Json<CampaignView>>
where
    S: MirrorStore,
    R: RemoteCatalog + RemoteMutator,
{
    let id = campaign_id(&id)?;
    Ok(Json(campaigns::get_campaign(state.store(), id).await?))
}

async fn create_campaign<S, R>(
    State(state): State<AppState<S, R>>,
    body: Result<Json<NewCampaign>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<CampaignView>)>
where
    S: MirrorStore,
    R: RemoteCatalog + RemoteMutator,
{
    let Json(input) = body?;
    let campaign = campaigns::create_campaign(state.store(), state.remote(), input).await?;
    Ok((StatusCode::CREATED, Json(campaign)))
}

async fn update_campaign<S, R>(
    State(state): State<AppState<S, R>>,
    Path(id): Path<String>,
    body: Result<Json<CampaignChanges>, JsonRejection>,
) -> ApiResult<Json<CampaignView>>
where
    S: MirrorStore,
    R: RemoteCatalog + RemoteMutator,
{
    let id = campaign_id(&id)?;
    let Json(changes) = body?;
    let campaign = campaigns::update_campaign(state.store(), state.remote(), id, changes).await?;
    Ok(Json(campaign))
}

#[derive(Debug, Deserialize)]
struct ArchiveBody {
    archived: bool,
}

async fn set_archived<S, R>(
    State(state): State<AppState<S, R>>,
    Path(id): Path<String>,
    body: Result<Json<ArchiveBody>, JsonRejection>,
) -> ApiResult<Json<CampaignView>>
where
    S: MirrorStore,
    R: RemoteCatalog + RemoteMutator,
{
    let id = campaign_id(&id)?;
    let Json(body) = body?;
    Ok(Json(
        campaigns::set_archived(state.store(), id, body.archived).await?,
    ))
}

async fn sync_advertisers<S, R>(State(state): State<AppState<S, R>>) -> ApiResult<Json<SyncReport>>
where
    S: MirrorStore,
    R: RemoteCatalog + RemoteMutator,
{
    Ok(Json(state.reconciler.sync_advertisers().await?))
}

async fn sync_campaigns<S, R>(State(state): State<AppState<S, R>>) -> ApiResult<Json<SyncReport>>
where
    S: MirrorStore,
    R: RemoteCatalog + RemoteMutator,
{
    Ok(Json(state.reconciler.sync_campaigns().await?))
}

async fn sync_all<S, R>(State(state): State<AppState<S, R>>) -> ApiResult<Json<FullSyncReport>>
where
    S: MirrorStore,
    R: RemoteCatalog + RemoteMutator,
{
    Ok(Json(state.reconciler.sync_all().await?))
}

async fn remote_advertisers<S, R>(State(state): State<AppState<S, R>>) -> ApiResult<Json<Vec<Value>>>
where
    S: MirrorStore,
    R: RemoteCatalog + RemoteMutator,
{
    Ok(Json(state.remote().list_advertisers().await?))
}

async fn remote_campaigns<S, R>(State(state): State<AppState<S, R>>) -> ApiResult<Json<Vec<Value>>>
where
    S: MirrorStore,
    R: RemoteCatalog + RemoteMutator,
{
    Ok(Json(state.remote().list_campaigns().await?))
}

async fn remote_campaign<S, R>(
    State(state): State<AppState<S, R>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>>
where
    S: MirrorStore,
    R: RemoteCatalog + RemoteMutator,
{
    Ok(Json(state.remote().get_campaign(&id).await?))
}

async fn remote_create_campaign<S, R>(
    State(state): State<AppState<S, R>>,
    body: Result<Json<CampaignPayload>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Value>)>
where
    S: MirrorStore,
    R: RemoteCatalog + RemoteMutator,
{
    let Json(payload) = body?;
    let payload = payload.validated_for_create()?;
    let record = state.remote().create_campaign(&payload).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

async fn remote_update_campaign<S, R>(
    State(state): State<AppState<S, R>>,
    Path(id): Path<String>,
    body: Result<Json<CampaignPayload>, JsonRejection>,
) -> ApiResult<Json<Value>>
where
    S: MirrorStore,
    R: RemoteCatalog + RemoteMutator,
{
    let Json(payload) = body?;
    let payload = payload.validated_for_update()?;
    Ok(Json(state.remote().update_campaign(&id, &payload).await?))
}
