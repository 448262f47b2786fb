//! Mirror store for PostgreSQL.
//!
//! [`PgStore`] serves the read side of the API straight from the pool.
//! [`PgSession`] wraps one transaction for a reconciliation pass or a proxied
//! write; per-record isolation uses the `mirror_record` savepoint, which
//! PostgreSQL stacks when it is re-declared by a nested record.

use adsync_core::error::AppError;
use adsync_core::models::{
    Advertiser, AdvertiserView, Agency, Campaign, CampaignQuery, CampaignView, MirrorStats, Page,
    PageMeta,
};
use adsync_core::traits::{MirrorSession, MirrorStore};
use chrono::{DateTime, Utc};
use sqlx::migrate::Migrator;
use sqlx::{Executor, PgPool, Pool, Postgres, QueryBuilder, Transaction};
use uuid::Uuid;

/// Embedded schema migrations.
pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Column lists for SELECT queries. Must remain const literals to ensure SQL
/// safety since format!() bypasses sqlx compile-time validation.
const AGENCY_COLUMNS: &str = "id, megaphone_id, name";
const ADVERTISER_COLUMNS: &str =
    "id, megaphone_id, name, agency_id, created_at, updated_at, competitive_categories";
const CAMPAIGN_COLUMNS: &str = "id, megaphone_id, external_id, title, advertiser_id, organization_id, total_budget_cents, total_budget_currency, total_revenue_cents, total_revenue_currency, duration_in_seconds, copy_needed, booking_source, created_at, updated_at, synced_at, archived";

/// Campaign joined with its advertiser and that advertiser's agency.
const CAMPAIGN_VIEW_SELECT: &str = "SELECT c.id, c.megaphone_id, c.external_id, c.title, c.advertiser_id, c.organization_id, c.total_budget_cents, c.total_budget_currency, c.total_revenue_cents, c.total_revenue_currency, c.duration_in_seconds, c.copy_needed, c.booking_source, c.created_at, c.updated_at, c.synced_at, c.archived, adv.megaphone_id AS adv_megaphone_id, adv.name AS adv_name, adv.agency_id AS adv_agency_id, ag.megaphone_id AS ag_megaphone_id, ag.name AS ag_name FROM campaigns c LEFT JOIN advertisers adv ON adv.id = c.advertiser_id LEFT JOIN agencies ag ON ag.id = adv.agency_id";

const ADVERTISER_VIEW_SELECT: &str = "SELECT adv.id, adv.megaphone_id, adv.name, adv.agency_id, adv.created_at, adv.updated_at, adv.competitive_categories, ag.megaphone_id AS ag_megaphone_id, ag.name AS ag_name FROM advertisers adv LEFT JOIN agencies ag ON ag.id = adv.agency_id";

const SAVEPOINT: &str = "SAVEPOINT mirror_record";
const RELEASE_SAVEPOINT: &str = "RELEASE SAVEPOINT mirror_record";
const ROLLBACK_TO_SAVEPOINT: &str = "ROLLBACK TO SAVEPOINT mirror_record";

/// Mirror store backed by a PostgreSQL pool.
///
/// # Examples
///
/// ```no_run
/// use sqlx::postgres::PgPoolOptions;
/// use adsync_db::PgStore;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let pool = PgPoolOptions::new()
///     .max_connections(5)
///     .connect("postgresql://localhost/adsync")
///     .await?;
///
/// let store = PgStore::new(pool);
/// store.migrate().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct PgStore {
    pool: Pool<Postgres>,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Applies pending schema migrations.
    pub async fn migrate(&self) -> Result<(), AppError> {
        MIGRATOR
            .run(&self.pool)
            .await
            .map_err(|e| AppError::Storage(format!("migration failed: {}", e)))?;
        tracing::info!("Database migrations applied");
        Ok(())
    }
}

/// One open transaction on the mirror.
pub struct PgSession {
    tx: Transaction<'static, Postgres>,
}

impl MirrorSession for PgSession {
    async fn savepoint(&mut self) -> Result<(), AppError> {
        (&mut *self.tx).execute(SAVEPOINT).await?;
        Ok(())
    }

    async fn release_savepoint(&mut self) -> Result<(), AppError> {
        (&mut *self.tx).execute(RELEASE_SAVEPOINT).await?;
        Ok(())
    }

    async fn rollback_to_savepoint(&mut self) -> Result<(), AppError> {
        (&mut *self.tx).execute(ROLLBACK_TO_SAVEPOINT).await?;
        // ROLLBACK TO keeps the savepoint; drop it so the stack stays balanced.
        (&mut *self.tx).execute(RELEASE_SAVEPOINT).await?;
        Ok(())
    }

    async fn find_agency(&mut self, megaphone_id: &str) -> Result<Option<Agency>, AppError> {
        let query = format!(
            "SELECT {} FROM agencies WHERE megaphone_id = $1",
            AGENCY_COLUMNS
        );
        let agency = sqlx::query_as::<_, Agency>(&query)
            .bind(megaphone_id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(agency)
    }

    async fn insert_agency(&mut self, agency: &Agency) -> Result<(), AppError> {
        sqlx::query("INSERT INTO agencies (id, megaphone_id, name) VALUES ($1, $2, $3)")
            .bind(agency.id)
            .bind(&agency.megaphone_id)
            .bind(&agency.name)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn update_agency(&mut self, agency: &Agency) -> Result<(), AppError> {
        sqlx::query("UPDATE agencies SET name = $2 WHERE id = $1")
            .bind(agency.id)
            .bind(&agency.name)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn find_advertiser(&mut self, megaphone_id: &str) -> Result<Option<Advertiser>, AppError> {
        let query = format!(
            "SELECT {} FROM advertisers WHERE megaphone_id = $1",
            ADVERTISER_COLUMNS
        );
        let advertiser = sqlx::query_as::<_, Advertiser>(&query)
            .bind(megaphone_id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(advertiser)
    }

    async fn insert_advertiser(&mut self, advertiser: &Advertiser) -> Result<(), AppError> {
        let query = format!(
            "INSERT INTO advertisers ({}) VALUES ($1, $2, $3, $4, $5, $6, $7)",
            ADVERTISER_COLUMNS
        );
        sqlx::query(&query)
            .bind(advertiser.id)
            .bind(&advertiser.megaphone_id)
            .bind(&advertiser.name)
            .bind(advertiser.agency_id)
            .bind(advertiser.created_at)
            .bind(advertiser.updated_at)
            .bind(&advertiser.competitive_categories)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn update_advertiser(&mut self, advertiser: &Advertiser) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE advertisers
            SET name = $2,
                agency_id = $3,
                created_at = $4,
                updated_at = $5,
                competitive_categories = $6
            WHERE id = $1
            "#,
        )
        .bind(advertiser.id)
        .bind(&advertiser.name)
        .bind(advertiser.agency_id)
        .bind(advertiser.created_at)
        .bind(advertiser.updated_at)
        .bind(&advertiser.competitive_categories)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn list_advertisers(&mut self) -> Result<Vec<Advertiser>, AppError> {
        let query = format!("SELECT {} FROM advertisers", ADVERTISER_COLUMNS);
        let advertisers = sqlx::query_as::<_, Advertiser>(&query)
            .fetch_all(&mut *self.tx)
            .await?;
        Ok(advertisers)
    }

    async fn delete_advertiser(&mut self, id: Uuid) -> Result<(), AppError> {
        sqlx::query("DELETE FROM advertisers WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn find_campaign(&mut self, megaphone_id: &str) -> Result<Option<Campaign>, AppError> {
        let query = format!(
            "SELECT {} FROM campaigns WHERE megaphone_id = $1",
            CAMPAIGN_COLUMNS
        );
        let campaign = sqlx::query_as::<_, Campaign>(&query)
            .bind(megaphone_id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(campaign)
    }

    async fn insert_campaign(&mut self, campaign: &Campaign) -> Result<(), AppError> {
        let query = format!(
            "INSERT INTO campaigns ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)",
            CAMPAIGN_COLUMNS
        );
        sqlx::query(&query)
            .bind(campaign.id)
            .bind(&campaign.megaphone_id)
            .bind(&campaign.external_id)
            .bind(&campaign.title)
            .bind(campaign.advertiser_id)
            .bind(&campaign.organization_id)
            .bind(campaign.total_budget_cents)
            .bind(&campaign.total_budget_currency)
            .bind(campaign.total_revenue_cents)
            .bind(&campaign.total_revenue_currency)
            .bind(campaign.duration_in_seconds)
            .bind(campaign.copy_needed)
            .bind(&campaign.booking_source)
            .bind(campaign.created_at)
            .bind(campaign.updated_at)
            .bind(campaign.synced_at)
            .bind(campaign.archived)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    /// Writes every mirrored field. `archived` is local-only and left alone.
    async fn update_campaign(&mut self, campaign: &Campaign) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE campaigns
            SET external_id = $2,
                title = $3,
                advertiser_id = $4,
                organization_id = $5,
                total_budget_cents = $6,
                total_budget_currency = $7,
                total_revenue_cents = $8,
                total_revenue_currency = $9,
                duration_in_seconds = $10,
                copy_needed = $11,
                booking_source = $12,
                created_at = $13,
                updated_at = $14,
                synced_at = $15
            WHERE id = $1
            "#,
        )
        .bind(campaign.id)
        .bind(&campaign.external_id)
        .bind(&campaign.title)
        .bind(campaign.advertiser_id)
        .bind(&campaign.organization_id)
        .bind(campaign.total_budget_cents)
        .bind(&campaign.total_budget_currency)
        .bind(campaign.total_revenue_cents)
        .bind(&campaign.total_revenue_currency)
        .bind(campaign.duration_in_seconds)
        .bind(campaign.copy_needed)
        .bind(&campaign.booking_source)
        .bind(campaign.created_at)
        .bind(campaign.updated_at)
        .bind(campaign.synced_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn list_campaigns(&mut self) -> Result<Vec<Campaign>, AppError> {
        let query = format!("SELECT {} FROM campaigns", CAMPAIGN_COLUMNS);
        let campaigns = sqlx::query_as::<_, Campaign>(&query)
            .fetch_all(&mut *self.tx)
            .await?;
        Ok(campaigns)
    }

    async fn delete_campaign(&mut self, id: Uuid) -> Result<(), AppError> {
        sqlx::query("DELETE FROM campaigns WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn commit(self) -> Result<(), AppError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self) -> Result<(), AppError> {
        self.tx.rollback().await?;
        Ok(())
    }
}

impl MirrorStore for PgStore {
    type Session = PgSession;

    async fn begin(&self) -> Result<PgSession, AppError> {
        let tx = self.pool.begin().await?;
        Ok(PgSession { tx })
    }

    async fn advertisers(&self) -> Result<Vec<AdvertiserView>, AppError> {
        let query = format!("{} ORDER BY adv.name, adv.id", ADVERTISER_VIEW_SELECT);
        let rows = sqlx::query_as::<_, AdvertiserViewRow>(&query)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(AdvertiserViewRow::into_view).collect())
    }

    async fn advertiser(&self, id: Uuid) -> Result<Option<Advertiser>, AppError> {
        let query = format!("SELECT {} FROM advertisers WHERE id = $1", ADVERTISER_COLUMNS);
        let advertiser = sqlx::query_as::<_, Advertiser>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(advertiser)
    }

    async fn campaign(&self, id: Uuid) -> Result<Option<CampaignView>, AppError> {
        let query = format!("{} WHERE c.id = $1", CAMPAIGN_VIEW_SELECT);
        let row = sqlx::query_as::<_, CampaignViewRow>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(CampaignViewRow::into_view))
    }

    async fn campaigns(&self, query: &CampaignQuery) -> Result<Page<CampaignView>, AppError> {
        let total: i64 = count_query(query)
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await?;
        let rows: Vec<CampaignViewRow> = listing_query(query)
            .build_query_as()
            .fetch_all(&self.pool)
            .await?;

        Ok(Page {
            items: rows.into_iter().map(CampaignViewRow::into_view).collect(),
            meta: PageMeta {
                page: query.page,
                per_page: query.per_page,
                total: total.max(0) as u64,
            },
        })
    }

    async fn set_campaign_archived(&self, id: Uuid, archived: bool) -> Result<bool, AppError> {
        let result = sqlx::query("UPDATE campaigns SET archived = $2 WHERE id = $1")
            .bind(id)
            .bind(archived)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn stats(&self) -> Result<MirrorStats, AppError> {
        let row: StatsRow = sqlx::query_as(
            r#"
            SELECT
                (SELECT COUNT(*) FROM agencies) as agencies,
                (SELECT COUNT(*) FROM advertisers) as advertisers,
                COUNT(*) as campaigns,
                COUNT(*) FILTER (WHERE archived) as archived_campaigns,
                MAX(synced_at) as last_synced_at
            FROM campaigns
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(MirrorStats {
            agencies: row.agencies.unwrap_or(0),
            advertisers: row.advertisers.unwrap_or(0),
            campaigns: row.campaigns.unwrap_or(0),
            archived_campaigns: row.archived_campaigns.unwrap_or(0),
            last_synced_at: row.last_synced_at,
        })
    }
}

/// Escapes `LIKE` wildcards so a search term matches literally.
fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for ch in term.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

fn push_filters(builder: &mut QueryBuilder<'static, Postgres>, query: &CampaignQuery) {
    let mut separator = " WHERE ";
    if let Some(term) = query.search_term() {
        builder
            .push(separator)
            .push("c.title ILIKE ")
            .push_bind(format!("%{}%", escape_like(term)));
        separator = " AND ";
    }
    if let Some(advertiser_id) = query.advertiser_id {
        builder
            .push(separator)
            .push("c.advertiser_id = ")
            .push_bind(advertiser_id);
        separator = " AND ";
    }
    if let Some(archived) = query.archived {
        builder
            .push(separator)
            .push("c.archived = ")
            .push_bind(archived);
    }
}

fn count_query(query: &CampaignQuery) -> QueryBuilder<'static, Postgres> {
    let mut builder = QueryBuilder::new("SELECT COUNT(*) FROM campaigns c");
    push_filters(&mut builder, query);
    builder
}

fn listing_query(query: &CampaignQuery) -> QueryBuilder<'static, Postgres> {
    let mut builder = QueryBuilder::new(CAMPAIGN_VIEW_SELECT);
    push_filters(&mut builder, query);
    // Sort column and direction come from closed enums, never from input text.
    builder.push(format!(
        " ORDER BY c.{} {}, c.id ASC LIMIT ",
        query.sort_by.column(),
        query.sort_order.keyword()
    ));
    builder.push_bind(i64::from(query.per_page));
    builder.push(" OFFSET ");
    builder.push_bind(i64::try_from(query.offset()).unwrap_or(i64::MAX));
    builder
}

/// Helper struct for deserializing campaign listing rows
#[derive(sqlx::FromRow)]
struct CampaignViewRow {
    #[sqlx(flatten)]
    campaign: Campaign,
    adv_megaphone_id: Option<String>,
    adv_name: Option<String>,
    adv_agency_id: Option<Uuid>,
    ag_megaphone_id: Option<String>,
    ag_name: Option<String>,
}

impl CampaignViewRow {
    fn into_view(self) -> CampaignView {
        let advertiser = match (self.campaign.advertiser_id, self.adv_megaphone_id, self.adv_name) {
            (Some(id), Some(megaphone_id), Some(name)) => {
                let agency = agency_from_join(self.adv_agency_id, self.ag_megaphone_id, self.ag_name);
                let advertiser = Advertiser {
                    id,
                    megaphone_id,
                    name,
                    agency_id: self.adv_agency_id,
                    created_at: None,
                    updated_at: None,
                    competitive_categories: None,
                };
                Some(AdvertiserView::new(advertiser, agency))
            }
            _ => None,
        };
        CampaignView::new(self.campaign, advertiser)
    }
}

/// Helper struct for deserializing advertiser listing rows
#[derive(sqlx::FromRow)]
struct AdvertiserViewRow {
    #[sqlx(flatten)]
    advertiser: Advertiser,
    ag_megaphone_id: Option<String>,
    ag_name: Option<String>,
}

impl AdvertiserViewRow {
    fn into_view(self) -> AdvertiserView {
        let agency = agency_from_join(self.advertiser.agency_id, self.ag_megaphone_id, self.ag_name);
        AdvertiserView::new(self.advertiser, agency)
    }
}

fn agency_from_join(
    id: Option<Uuid>,
    megaphone_id: Option<String>,
    name: Option<String>,
) -> Option<Agency> {
    match (id, name) {
        (Some(id), Some(name)) => Some(Agency {
            id,
            megaphone_id,
            name,
        }),
        _ => None,
    }
}

/// Helper struct for deserializing stats query results
#[derive(sqlx::FromRow)]
struct StatsRow {
    agencies: Option<i64>,
    advertisers: Option<i64>,
    campaigns: Option<i64>,
    archived_campaigns: Option<i64>,
    last_synced_at: Option<DateTime<Utc>>,
}
