//! Megaphone wire types.
//!
//! The `#[serde(rename_all = "camelCase")]` structs below are the field
//! mapping between Megaphone's camelCase keys and the snake_case columns of
//! the mirror: each field maps one-to-one onto the column of the same
//! snake_case name, except `id`, which is stored as `megaphone_id`.
//!
//! Listings are fetched as raw [`serde_json::Value`]s and only mapped onto
//! these types one record at a time, so a malformed record fails alone
//! instead of failing the whole listing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::datetime::deserialize_lenient;
use crate::error::AppError;
use crate::validation::{validate_budget_cents, validate_currency_code, validate_title};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteAgency {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteAdvertiser {
    pub id: String,
    pub name: String,
    /// Nested agency payload, resolved separately.
    pub agency: Option<Value>,
    #[serde(default, deserialize_with = "deserialize_lenient")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "deserialize_lenient")]
    pub updated_at: Option<DateTime<Utc>>,
    pub competitive_categories: Option<Value>,
}

impl RemoteAdvertiser {
    /// Competitive categories as stored locally: strings verbatim, any other
    /// JSON value as its JSON text.
    pub fn competitive_categories_text(&self) -> Option<String> {
        match &self.competitive_categories {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(other) => Some(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteCampaign {
    pub id: String,
    pub external_id: Option<String>,
    pub title: String,
    /// Nested advertiser payload, resolved separately.
    pub advertiser: Option<Value>,
    /// Flat advertiser remote key, used when no nested payload is present.
    pub advertiser_id: Option<String>,
    pub organization_id: String,
    pub total_budget_cents: Option<i64>,
    pub total_budget_currency: Option<String>,
    pub total_revenue_cents: Option<i64>,
    pub total_revenue_currency: Option<String>,
    pub duration_in_seconds: Option<i64>,
    pub copy_needed: Option<bool>,
    pub booking_source: Option<String>,
    #[serde(default, deserialize_with = "deserialize_lenient")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "deserialize_lenient")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Maps one raw record onto a typed remote record.
pub fn decode_record<T>(kind: &'static str, record: &Value) -> Result<T, AppError>
where
    T: for<'de> Deserialize<'de>,
{
    T::deserialize(record).map_err(|e| AppError::invalid_record(kind, e.to_string()))
}

/// True for `null`, `{}` and other "nothing here" payloads.
pub fn is_empty_payload(record: &Value) -> bool {
    match record {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

/// Remote key of a raw record, when it carries a string `id`.
pub fn remote_key(record: &Value) -> Option<&str> {
    record.get("id").and_then(Value::as_str)
}

/// Title or name of a raw record, for log lines.
pub fn display_name(record: &Value) -> Option<&str> {
    record
        .get("title")
        .or_else(|| record.get("name"))
        .and_then(Value::as_str)
}

/// Body of `POST`/`PUT campaigns` sent to Megaphone.
///
/// Also accepted as-is by the `/remote/campaigns` pass-through routes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Remote key of the advertiser.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub advertiser_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_budget_cents: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_budget_currency: Option<String>,
}

impl CampaignPayload {
    /// Validates a create payload: title and advertiser are required.
    pub fn validated_for_create(self) -> Result<Self, AppError> {
        let title = validate_title(self.title.as_deref(), "title")?;
        let advertiser_id = self
            .advertiser_id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .ok_or_else(|| {
                AppError::Validation("Missing required fields: 'title' and 'advertiserId'".to_string())
            })?;
        Ok(Self {
            title: Some(title),
            advertiser_id: Some(advertiser_id),
            total_budget_cents: validate_budget_cents(self.total_budget_cents, "totalBudgetCents")?,
            total_budget_currency: validate_currency_code(
                self.total_budget_currency.as_deref(),
                "totalBudgetCurrency",
            )?,
        })
    }

    /// Validates an update payload: at least one field must be present.
    pub fn validated_for_update(self) -> Result<Self, AppError> {
        if self.title.is_none()
            && self.advertiser_id.is_none()
            && self.total_budget_cents.is_none()
            && self.total_budget_currency.is_none()
        {
            return Err(AppError::Validation(
                "At least one of 'title', 'advertiserId', 'totalBudgetCents', or 'totalBudgetCurrency' must be provided"
                    .to_string(),
            ));
        }
        let title = match self.title.as_deref() {
            Some(title) => Some(validate_title(Some(title), "title")?),
            None => None,
        };
        Ok(Self {
            title,
            advertiser_id: self.advertiser_id,
            total_budget_cents: validate_budget_cents(self.total_budget_cents, "totalBudgetCents")?,
            total_budget_currency: validate_currency_code(
                self.total_budget_currency.as_deref(),
                "totalBudgetCurrency",
            )?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_campaign_field_mapping() {
        let record = json!({
            "id": "m-camp-1",
            "externalId": "ext-9",
            "title": "Spring Launch",
            "advertiserId": "m-adv-1",
            "organizationId": "org-1",
            "totalBudgetCents": 125000,
            "totalBudgetCurrency": "USD",
            "totalRevenueCents": 5000,
            "totalRevenueCurrency": "USD",
            "durationInSeconds": 30,
            "copyNeeded": true,
            "bookingSource": "direct",
            "createdAt": "2024-01-01T00:00:00Z",
            "updatedAt": "garbage",
            "someNewField": {"ignored": true}
        });

        let campaign: RemoteCampaign = decode_record("campaign", &record).unwrap();
        assert_eq!(campaign.id, "m-camp-1");
        assert_eq!(campaign.external_id.as_deref(), Some("ext-9"));
        assert_eq!(campaign.advertiser_id.as_deref(), Some("m-adv-1"));
        assert_eq!(campaign.total_budget_cents, Some(125000));
        assert_eq!(campaign.duration_in_seconds, Some(30));
        assert_eq!(campaign.copy_needed, Some(true));
        assert!(campaign.created_at.is_some());
        assert!(campaign.updated_at.is_none());
        assert!(campaign.advertiser.is_none());
    }

    #[test]
    fn test_missing_required_field_is_invalid_record() {
        let record = json!({"id": "m-camp-1", "organizationId": "org-1"});
        let err = decode_record::<RemoteCampaign>("campaign", &record).unwrap_err();
        assert!(matches!(err, AppError::InvalidRecord { kind: "campaign", .. }));
        assert!(err.to_string().contains("title"));
    }

    #[test]
    fn test_competitive_categories_text() {
        let record = json!({"id": "a", "name": "n", "competitiveCategories": ["auto", "retail"]});
        let adv: RemoteAdvertiser = decode_record("advertiser", &record).unwrap();
        assert_eq!(
            adv.competitive_categories_text().as_deref(),
            Some(r#"["auto","retail"]"#)
        );

        let record = json!({"id": "a", "name": "n", "competitiveCategories": "auto"});
        let adv: RemoteAdvertiser = decode_record("advertiser", &record).unwrap();
        assert_eq!(adv.competitive_categories_text().as_deref(), Some("auto"));
    }

    #[test]
    fn test_empty_payloads() {
        assert!(is_empty_payload(&json!(null)));
        assert!(is_empty_payload(&json!({})));
        assert!(!is_empty_payload(&json!({"id": "x"})));
    }

    #[test]
    fn test_payload_serializes_camel_case_without_nulls() {
        let payload = CampaignPayload {
            title: Some("T".to_string()),
            advertiser_id: Some("m-adv-1".to_string()),
            total_budget_cents: None,
            total_budget_currency: Some("USD".to_string()),
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(
            json,
            json!({"title": "T", "advertiserId": "m-adv-1", "totalBudgetCurrency": "USD"})
        );
    }

    #[test]
    fn test_create_payload_requires_advertiser() {
        let payload = CampaignPayload {
            title: Some("T".to_string()),
            ..Default::default()
        };
        let err = payload.validated_for_create().unwrap_err();
        assert!(err.to_string().contains("advertiserId"));
    }

    #[test]
    fn test_update_payload_requires_a_field() {
        assert!(CampaignPayload::default().validated_for_update().is_err());
        let payload = CampaignPayload {
            total_budget_cents: Some(0),
            ..Default::default()
        };
        assert!(payload.validated_for_update().is_ok());
    }
}
