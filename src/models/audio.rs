use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::AudioFormat;

/// Persisted audio artifact, created once per successfully completed job.
/// Immutable after creation apart from the soft-delete flag.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Audio {
    pub id: String,
    pub user_id: String,
    pub title: Option<String>,
    pub text: String,
    pub text_length: i64,
    pub voice_id: String,
    pub audio_url: String,
    pub audio_format: AudioFormat,
    /// Duration estimate in seconds.
    pub duration: f64,
    pub file_size: Option<i64>,
    pub speed: f64,
    pub pitch: f64,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioListItem {
    pub id: String,
    pub title: Option<String>,
    /// First 100 characters of the source text.
    pub text: String,
    pub voice_id: String,
    pub duration: f64,
    pub size: i64,
    pub url: String,
    pub created_at: DateTime<Utc>,
}

impl From<Audio> for AudioListItem {
    fn from(a: Audio) -> Self {
        AudioListItem {
            id: a.id,
            title: a.title,
            text: truncate_chars(&a.text, 100),
            voice_id: a.voice_id,
            duration: a.duration,
            size: a.file_size.unwrap_or(0),
            url: a.audio_url,
            created_at: a.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioListResponse {
    pub items: Vec<AudioListItem>,
    pub total: i64,
    pub page: i64,
    pub page_size: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageQuery {
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_page_size")]
    pub page_size: i64,
}

fn default_page() -> i64 {
    1
}

fn default_page_size() -> i64 {
    20
}

impl PageQuery {
    pub fn clamped(&self) -> (i64, i64) {
        let page = self.page.max(1);
        let page_size = self.page_size.clamp(1, 100);
        (page, page_size)
    }

    pub fn offset(&self) -> i64 {
        let (page, page_size) = self.clamped();
        (page - 1) * page_size
    }
}

pub fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let mut out: String = text.chars().take(max).collect();
        out.push_str("...");
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncation_preserves_short_text() {
        assert_eq!(truncate_chars("hello", 100), "hello");
    }

    #[test]
    fn truncation_appends_ellipsis() {
        let long = "a".repeat(150);
        let out = truncate_chars(&long, 100);
        assert_eq!(out.chars().count(), 103);
        assert!(out.ends_with("..."));
    }

    #[test]
    fn page_query_clamps_page_size() {
        let q = PageQuery {
            page: 0,
            page_size: 500,
        };
        assert_eq!(q.clamped(), (1, 100));
        assert_eq!(q.offset(), 0);
    }
}
