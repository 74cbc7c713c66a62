use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Free-plan default: 600 generation-seconds per monthly period.
pub const DEFAULT_QUOTA_SECONDS: i64 = 600;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Plan {
    Free,
    Pro,
    Team,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    /// Subject id issued by the external identity provider.
    pub external_id: String,
    pub email: String,
    pub name: Option<String>,
    pub plan: Plan,
    /// Quota budget in generation-seconds for the current period.
    pub quota_limit: i64,
    pub quota_used: i64,
    pub quota_reset_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn quota_remaining(&self) -> i64 {
        (self.quota_limit - self.quota_used).max(0)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaResponse {
    pub plan: Plan,
    pub quota: QuotaDetail,
    pub usage: UsageSummaryWindow,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaDetail {
    pub limit: i64,
    pub used: i64,
    pub remaining: i64,
    pub reset_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageSummaryWindow {
    pub today: i64,
    pub this_month: i64,
}
