use serde_json::json;

use crate::errors::{AppError, Result};
use crate::models::AudioFormat;
use crate::providers::truncate_vendor_error;

const MODEL: &str = "fishaudio/fish-speech-1.5";

/// SiliconFlow (FishAudio) adapter. Voice ids arrive as short aliases
/// (`sf-alex`, `fish-bella`, ...) and must be translated to the vendor's
/// fully-qualified `model:voice` reference.
#[derive(Clone)]
pub struct SiliconFlowTts {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl SiliconFlowTts {
    pub fn new(client: reqwest::Client, base_url: String, api_key: Option<String>) -> Self {
        Self {
            client,
            base_url,
            api_key,
        }
    }

    /// Maps a short alias to the vendor voice reference, falling back to
    /// the bare model for unknown aliases.
    pub fn voice_reference(voice_id: &str) -> String {
        let alias = voice_id
            .strip_prefix("sf-")
            .or_else(|| voice_id.strip_prefix("siliconflow-"))
            .or_else(|| voice_id.strip_prefix("fish-"))
            .unwrap_or(voice_id);

        match alias {
            "alex" | "benjamin" | "charles" | "david" | "anna" | "bella" | "claire" | "diana" => {
                format!("{}:{}", MODEL, alias)
            }
            _ => MODEL.to_string(),
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
            AppError::Configuration("SiliconFlow API key not configured".to_string())
        })?;

        let response = self
            .client
            .post(&self.base_url)
            .bearer_auth(api_key)
            .json(&json!({
                "model": MODEL,
                "input": text,
                "voice": Self::voice_reference(voice_id),
                "response_format": format.response_format(),
                "speed": speed,
            }))
            .send()
            .await
            .map_err(|e| AppError::Provider(format!("SiliconFlow request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Provider(format!(
                "SiliconFlow TTS error {}: {}",
                status,
                truncate_vendor_error(&body)
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| AppError::Provider(format!("SiliconFlow response read failed: {}", e)))?;

        Ok(bytes.to_vec())
    }
}
