//! Local mirror rows and the read-side views built from them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Full representation of a row in the `agencies` table.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct Agency {
    pub id: Uuid,
    /// Remote key. Nullable in storage; agencies mirrored from Megaphone always have one.
    pub megaphone_id: Option<String>,
    pub name: String,
}

/// Full representation of a row in the `advertisers` table.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct Advertiser {
    pub id: Uuid,
    pub megaphone_id: String,
    pub name: String,
    pub agency_id: Option<Uuid>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub competitive_categories: Option<String>,
}

/// Full representation of a row in the `campaigns` table.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct Campaign {
    pub id: Uuid,
    pub megaphone_id: String,
    pub external_id: Option<String>,
    pub title: String,
    pub advertiser_id: Option<Uuid>,
    pub organization_id: String,
    pub total_budget_cents: Option<i64>,
    pub total_budget_currency: Option<String>,
    pub total_revenue_cents: Option<i64>,
    pub total_revenue_currency: Option<String>,
    pub duration_in_seconds: Option<i64>,
    pub copy_needed: bool,
    pub booking_source: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub synced_at: DateTime<Utc>,
    /// Local-only flag; reconciliation never writes it.
    pub archived: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgencyView {
    pub id: Uuid,
    pub megaphone_id: Option<String>,
    pub name: String,
}

impl From<Agency> for AgencyView {
    fn from(agency: Agency) -> Self {
        Self {
            id: agency.id,
            megaphone_id: agency.megaphone_id,
            name: agency.name,
        }
    }
}

/// Advertiser as returned by the local API, agency nested.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdvertiserView {
    pub id: Uuid,
    pub megaphone_id: String,
    pub name: String,
    pub agency: Option<AgencyView>,
}

impl AdvertiserView {
    pub fn new(advertiser: Advertiser, agency: Option<Agency>) -> Self {
        Self {
            id: advertiser.id,
            megaphone_id: advertiser.megaphone_id,
            name: advertiser.name,
            agency: agency.map(AgencyView::from),
        }
    }
}

/// Campaign as returned by the local API, advertiser and agency nested.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CampaignView {
    pub id: Uuid,
    pub megaphone_id: String,
    pub external_id: Option<String>,
    pub title: String,
    pub organization_id: String,
    pub advertiser: Option<AdvertiserView>,
    pub total_budget_cents: Option<i64>,
    pub total_budget_currency: Option<String>,
    pub total_revenue_cents: Option<i64>,
    pub total_revenue_currency: Option<String>,
    pub duration_in_seconds: Option<i64>,
    pub copy_needed: bool,
    pub booking_source: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub synced_at: DateTime<Utc>,
    pub archived: bool,
}

impl CampaignView {
    pub fn new(campaign: Campaign, advertiser: Option<AdvertiserView>) -> Self {
        Self {
            id: campaign.id,
            megaphone_id: campaign.megaphone_id,
            external_id: campaign.external_id,
            title: campaign.title,
            organization_id: campaign.organization_id,
            advertiser,
            total_budget_cents: campaign.total_budget_cents,
            total_budget_currency: campaign.total_budget_currency,
            total_revenue_cents: campaign.total_revenue_cents,
            total_revenue_currency: campaign.total_revenue_currency,
            duration_in_seconds: campaign.duration_in_seconds,
            copy_needed: campaign.copy_needed,
            booking_source: campaign.booking_source,
            created_at: campaign.created_at,
            updated_at: campaign.updated_at,
            synced_at: campaign.synced_at,
            archived: campaign.archived,
        }
    }
}

/// Columns the campaign listing can be sorted by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    Title,
    #[default]
    CreatedAt,
    UpdatedAt,
    OrganizationId,
    TotalBudgetCents,
    TotalBudgetCurrency,
    TotalRevenueCents,
    TotalRevenueCurrency,
    DurationInSeconds,
    CopyNeeded,
    BookingSource,
    SyncedAt,
    Archived,
}

impl SortField {
    /// Column name in the `campaigns` table. Always a static literal so it
    /// can be spliced into SQL.
    pub fn column(self) -> &'static str {
        match self {
            SortField::Title => "title",
            SortField::CreatedAt => "created_at",
            SortField::UpdatedAt => "updated_at",
            SortField::OrganizationId => "organization_id",
            SortField::TotalBudgetCents => "total_budget_cents",
            SortField::TotalBudgetCurrency => "total_budget_currency",
            SortField::TotalRevenueCents => "total_revenue_cents",
            SortField::TotalRevenueCurrency => "total_revenue_currency",
            SortField::DurationInSeconds => "duration_in_seconds",
            SortField::CopyNeeded => "copy_needed",
            SortField::BookingSource => "booking_source",
            SortField::SyncedAt => "synced_at",
            SortField::Archived => "archived",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn keyword(self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

pub const DEFAULT_PER_PAGE: u32 = 20;
pub const MAX_PER_PAGE: u32 = 100;

/// Filters, sort and page for the local campaign listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CampaignQuery {
    pub search: Option<String>,
    pub advertiser_id: Option<Uuid>,
    pub archived: Option<bool>,
    pub sort_by: SortField,
    pub sort_order: SortOrder,
    pub page: u32,
    pub per_page: u32,
}

impl Default for CampaignQuery {
    fn default() -> Self {
        Self {
            search: None,
            advertiser_id: None,
            archived: None,
            sort_by: SortField::default(),
            sort_order: SortOrder::default(),
            page: 1,
            per_page: DEFAULT_PER_PAGE,
        }
    }
}

impl CampaignQuery {
    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.per_page)
    }

    /// The trimmed search term, if any is left after trimming.
    pub fn search_term(&self) -> Option<&str> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageMeta {
    pub page: u32,
    pub per_page: u32,
    pub total: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub meta: PageMeta,
}

/// Row counts for the `stats` command.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MirrorStats {
    pub agencies: i64,
    pub advertisers: i64,
    pub campaigns: i64,
    pub archived_campaigns: i64,
    pub last_synced_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sort_field_serde_names_match_columns() {
        let fields = [
            SortField::Title,
            SortField::CreatedAt,
            SortField::TotalBudgetCents,
            SortField::CopyNeeded,
            SortField::Archived,
        ];
        for field in fields {
            let name = serde_json::to_value(field).unwrap();
            assert_eq!(name, field.column());
        }
    }

    #[test]
    fn test_query_offset() {
        let query = CampaignQuery {
            page: 3,
            per_page: 20,
            ..Default::default()
        };
        assert_eq!(query.offset(), 40);
        assert_eq!(CampaignQuery::default().offset(), 0);
    }

    #[test]
    fn test_search_term_trims_blank() {
        let mut query = CampaignQuery {
            search: Some("   ".to_string()),
            ..Default::default()
        };
        assert_eq!(query.search_term(), None);
        query.search = Some("  Spring ".to_string());
        assert_eq!(query.search_term(), Some("Spring"));
    }

    #[test]
    fn test_campaign_view_nests_agency() {
        let agency = Agency {
            id: Uuid::new_v4(),
            megaphone_id: Some("ag-1".to_string()),
            name: "Agency".to_string(),
        };
        let advertiser = Advertiser {
            id: Uuid::new_v4(),
            megaphone_id: "adv-1".to_string(),
            name: "Advertiser".to_string(),
            agency_id: Some(agency.id),
            created_at: None,
            updated_at: None,
            competitive_categories: None,
        };
        let view = AdvertiserView::new(advertiser, Some(agency));
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["agency"]["megaphone_id"], "ag-1");
    }
}
