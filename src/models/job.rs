use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::errors::{AppError, Result};

/// Hard cap on input text, matching the validation applied before any
/// quota or job interaction.
pub const MAX_TEXT_CHARS: usize = 5000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum AudioFormat {
    #[default]
    Mp3,
    Wav,
}

impl AudioFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "mp3",
            AudioFormat::Wav => "wav",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "audio/mpeg",
            AudioFormat::Wav => "audio/wav",
        }
    }

    pub fn response_format(&self) -> &'static str {
        self.extension()
    }
}

/// One durable generation request and its lifecycle state. Rows are never
/// deleted; terminal jobs are kept for history.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub user_id: String,
    pub audio_id: Option<String>,
    pub text: String,
    pub voice_id: String,
    pub speed: f64,
    pub pitch: f64,
    pub format: AudioFormat,
    pub status: JobStatus,
    pub progress: i64,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    pub text: String,
    pub voice_id: String,
    #[serde(default = "default_speed")]
    pub speed: f64,
    #[serde(default)]
    pub pitch: f64,
    #[serde(default)]
    pub format: AudioFormat,
}

fn default_speed() -> f64 {
    1.0
}

impl GenerateRequest {
    pub fn validate(&self) -> Result<()> {
        let chars = self.text.chars().count();
        if chars == 0 {
            return Err(AppError::Validation("Text must not be empty".to_string()));
        }
        if chars > MAX_TEXT_CHARS {
            return Err(AppError::Validation(format!(
                "Text must not exceed {} characters",
                MAX_TEXT_CHARS
            )));
        }
        if self.voice_id.is_empty() {
            return Err(AppError::Validation("A voice must be selected".to_string()));
        }
        if !(0.5..=2.0).contains(&self.speed) {
            return Err(AppError::Validation(
                "Speed must be between 0.5 and 2.0".to_string(),
            ));
        }
        if !(-10.0..=10.0).contains(&self.pitch) {
            return Err(AppError::Validation(
                "Pitch must be between -10 and 10".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSubmission {
    pub job_id: String,
    pub status: JobStatus,
    /// Rough wall-clock estimate in seconds, shown by polling clients.
    pub estimated_time: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusResponse {
    pub job_id: String,
    pub status: JobStatus,
    pub progress: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio: Option<JobAudioRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JobErrorInfo>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobAudioRef {
    pub id: String,
    pub url: String,
    pub duration: f64,
    pub size: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobErrorInfo {
    pub code: String,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(text: String) -> GenerateRequest {
        GenerateRequest {
            text,
            voice_id: "sf-alex".to_string(),
            speed: 1.0,
            pitch: 0.0,
            format: AudioFormat::Mp3,
        }
    }

    #[test]
    fn only_completed_and_failed_are_terminal() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Processing.is_terminal());
    }

    #[test]
    fn text_at_limit_is_accepted() {
        assert!(request("x".repeat(5000)).validate().is_ok());
    }

    #[test]
    fn text_over_limit_is_rejected() {
        let err = request("x".repeat(5001)).validate().unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }

    #[test]
    fn empty_text_is_rejected() {
        assert!(request(String::new()).validate().is_err());
    }

    #[test]
    fn speed_and_pitch_ranges() {
        let mut req = request("hello".to_string());
        req.speed = 2.5;
        assert!(req.validate().is_err());
        req.speed = 0.5;
        req.pitch = -10.0;
        assert!(req.validate().is_ok());
        req.pitch = 10.5;
        assert!(req.validate().is_err());
    }

    #[test]
    fn defaults_apply_when_fields_missing() {
        let req: GenerateRequest =
            serde_json::from_str(r#"{"text":"hi","voiceId":"openai-alloy"}"#).unwrap();
        assert_eq!(req.speed, 1.0);
        assert_eq!(req.pitch, 0.0);
        assert_eq!(req.format, AudioFormat::Mp3);
    }
}
