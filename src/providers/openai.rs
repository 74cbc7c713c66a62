use serde_json::json;

use crate::errors::{AppError, Result};
use crate::models::AudioFormat;
use crate::providers::truncate_vendor_error;

const MODEL: &str = "tts-1";

/// OpenAI `/v1/audio/speech` adapter. Voice ids carry an `openai-` prefix
/// which is stripped before the call (the vendor wants the bare voice name,
/// e.g. `alloy`).
#[derive(Clone)]
pub struct OpenAiTts {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl OpenAiTts {
    pub fn new(client: reqwest::Client, base_url: String, api_key: Option<String>) -> Self {
        Self {
            client,
            base_url,
            api_key,
        }
    }

    pub async fn synthesize(
        &self,
        text: &str,
        voice_id: &str,
        speed: f64,
        format: AudioFormat,
    ) -> Result<Vec<u8>> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            AppError::Configuration("OpenAI API key not configured".to_string())
        })?;

        let voice = voice_id.strip_prefix("openai-").unwrap_or(voice_id);

        let response = self
            .client
            .post(&self.base_url)
            .bearer_auth(api_key)
            .json(&json!({
                "model": MODEL,
                "input": text,
                "voice": voice,
                "speed": speed,
                "response_format": format.response_format(),
            }))
            .send()
            .await
            .map_err(|e| AppError::Provider(format!("OpenAI request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Provider(format!(
                "OpenAI TTS error {}: {}",
                status,
                truncate_vendor_error(&body)
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| AppError::Provider(format!("OpenAI response read failed: {}", e)))?;

        Ok(bytes.to_vec())
    }
}
