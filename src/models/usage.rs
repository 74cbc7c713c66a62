use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Append-only record of one chargeable generation, written on the success
/// path of both the sync and async modes.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct UsageLogEntry {
    pub id: String,
    pub user_id: String,
    pub kind: String,
    pub chars_used: i64,
    pub duration_used: f64,
    pub audio_id: Option<String>,
    pub provider: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageHistoryQuery {
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_page_size")]
    pub page_size: i64,
    pub start_date: Option<DateTime<Utc>>,
}

fn default_page() -> i64 {
    1
}

fn default_page_size() -> i64 {
    20
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageHistoryItem {
    pub id: String,
    pub kind: String,
    pub audio_id: Option<String>,
    pub characters: i64,
    pub duration: f64,
    /// Cost in generation-seconds, which is what the quota is billed in.
    pub cost: i64,
    pub provider: String,
    pub created_at: DateTime<Utc>,
}

impl From<UsageLogEntry> for UsageHistoryItem {
    fn from(e: UsageLogEntry) -> Self {
        UsageHistoryItem {
            id: e.id,
            kind: e.kind,
            audio_id: e.audio_id,
            characters: e.chars_used,
            cost: e.duration_used.ceil() as i64,
            duration: e.duration_used,
            provider: e.provider,
            created_at: e.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageHistoryResponse {
    pub items: Vec<UsageHistoryItem>,
    pub summary: UsageTotals,
    pub total: i64,
    pub page: i64,
    pub page_size: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageTotals {
    pub total_characters: i64,
    pub total_duration: i64,
}
