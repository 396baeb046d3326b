use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde::de::Deserializer;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::approvals::options::RecommendationOption;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BcrId(pub u64);

impl fmt::Display for BcrId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Intermediate sign-off filed by a creator role (QS, SITE).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RecommendationRecord {
    pub id: u64,
    #[serde(default)]
    pub budget_change_id: Option<u64>,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub reviewer_name: Option<String>,
    #[serde(default)]
    pub recommendation_type: Option<String>,
    #[serde(default)]
    pub remark: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub attachment: Option<AttachmentField>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default, rename = "recommendation_items")]
    pub recommendation_items: Vec<RecommendationItem>,
}

/// Final decision filed by PD, MGM and occasionally other levels.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ReviewRecord {
    pub id: u64,
    #[serde(default)]
    pub budget_change_id: Option<u64>,
    #[serde(default)]
    pub approval_level: Option<String>,
    #[serde(default)]
    pub reviewer_role: Option<String>,
    #[serde(default)]
    pub reviewer_name: Option<String>,
    #[serde(default)]
    pub review_type: Option<String>,
    #[serde(default)]
    pub remark: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default, rename = "review_items")]
    pub review_items: Vec<ReviewItem>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RecommendationItem {
    pub budget_change_item_id: u64,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub recommended_qty: Option<Decimal>,
    #[serde(default, rename = "budget_change_item")]
    pub budget_change_item: Option<BudgetChangeItemDetails>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ReviewItem {
    pub budget_change_item_id: u64,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub recommended_qty: Option<Decimal>,
    #[serde(default, rename = "budget_change_item")]
    pub budget_change_item: Option<BudgetChangeItemDetails>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BudgetChangeItemDetails {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub item_code: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub new_order: Option<Decimal>,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub ordered_qty: Option<Decimal>,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub qs_qty: Option<Decimal>,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub site_qty: Option<Decimal>,
    #[serde(default)]
    pub uom: Option<String>,
}

/// The backend stores attachments as a JSON-encoded string; some payloads inline the list.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttachmentField {
    Encoded(String),
    List(Vec<AttachmentRef>),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentRef {
    pub filename: String,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

impl RecommendationRecord {
    pub fn attachments(&self) -> Vec<AttachmentRef> {
        match &self.attachment {
            None => Vec::new(),
            Some(AttachmentField::List(list)) => list.clone(),
            Some(AttachmentField::Encoded(raw)) if raw.trim().is_empty() => Vec::new(),
            Some(AttachmentField::Encoded(raw)) => {
                serde_json::from_str::<Vec<AttachmentRef>>(raw).unwrap_or_else(|error| {
                    warn!(
                        event_name = "bcr.recommendation.attachment_unparseable",
                        recommendation_id = self.id,
                        error = %error,
                        "ignoring malformed recommendation attachment list"
                    );
                    Vec::new()
                })
            }
        }
    }
}

/// Accepts RFC 3339 or `YYYY-MM-DD HH:MM:SS` (taken as UTC).
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }

    ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .into_iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .map(|naive| naive.and_utc())
}

/// Response wrapper used by most backend endpoints.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ApiEnvelope<T> {
    #[serde(default = "default_success")]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub data: Option<T>,
}

fn default_success() -> bool {
    true
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct RecommendedItem {
    pub budget_change_item_id: u64,
    #[serde(with = "rust_decimal::serde::float")]
    pub recommended_qty: Decimal,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct RecommendationPayload {
    pub recommendation_type: String,
    pub recommended_items: Vec<RecommendedItem>,
    pub remark: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(rename = "files")]
    pub files: Vec<String>,
}

impl RecommendationPayload {
    pub fn new(
        option: RecommendationOption,
        remark: Option<String>,
        items: Vec<RecommendedItem>,
    ) -> Self {
        Self {
            recommendation_type: option.wire_value().to_string(),
            recommended_items: items,
            remark,
            reason: None,
            files: Vec::new(),
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ReviewedItem {
    pub budget_change_item_id: u64,
    #[serde(with = "rust_decimal::serde::float")]
    pub approved_qty: Decimal,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct FinalDecisionPayload {
    pub review_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reviewed_items: Option<Vec<ReviewedItem>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remark: Option<String>,
}

impl FinalDecisionPayload {
    /// Item quantities are only sent for options that carry them.
    pub fn new(
        option: RecommendationOption,
        remark: Option<String>,
        items: Vec<ReviewedItem>,
    ) -> Self {
        Self {
            review_type: option.wire_value().to_string(),
            reviewed_items: option.requires_quantities().then_some(items),
            remark,
        }
    }
}

/// Quantities the backend cannot express as a number degrade to `None`.
fn lenient_decimal<'de, D>(deserializer: D) -> Result<Option<Decimal>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    let parsed = match &raw {
        None | Some(serde_json::Value::Null) => return Ok(None),
        Some(serde_json::Value::String(text)) if text.trim().is_empty() => return Ok(None),
        Some(serde_json::Value::String(text)) => Decimal::from_str(text.trim()).ok(),
        Some(serde_json::Value::Number(number)) => {
            let text = number.to_string();
            Decimal::from_str(&text).or_else(|_| Decimal::from_scientific(&text)).ok()
        }
        Some(_) => None,
    };

    if parsed.is_none() {
        warn!(
            event_name = "bcr.quantity_unparseable",
            raw = %raw.unwrap_or_default(),
            "ignoring quantity that is not a number"
        );
    }
    Ok(parsed)
}
