use std::time::Duration;

use crate::config::Config;
use crate::errors::{AppError, Result};
use crate::models::AudioFormat;

pub mod openai;
pub mod siliconflow;

pub use openai::OpenAiTts;
pub use siliconflow::SiliconFlowTts;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    OpenAi,
    SiliconFlow,
}

impl Provider {
    /// Name recorded in usage-log entries.
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::OpenAi => "openai",
            Provider::SiliconFlow => "siliconflow",
        }
    }
}

/// Routes a voice identifier to a vendor by namespace prefix. The
/// `sf-`/`siliconflow-`/`fish-` namespaces and every unmatched one
/// (including historical `tencent-`/`eleven-` voices) collapse to the
/// default vendor.
pub fn select_provider(voice_id: &str) -> Provider {
    if voice_id.starts_with("openai-") {
        Provider::OpenAi
    } else {
        Provider::SiliconFlow
    }
}

/// Vendor error text gets truncated before landing in a job row.
pub(crate) fn truncate_vendor_error(text: &str) -> String {
    const MAX: usize = 500;
    if text.chars().count() <= MAX {
        text.to_string()
    } else {
        text.chars().take(MAX).collect()
    }
}

/// Holds one adapter per vendor plus the shared call timeout.
#[derive(Clone)]
pub struct ProviderRegistry {
    openai: OpenAiTts,
    siliconflow: SiliconFlowTts,
    timeout: Duration,
}

impl ProviderRegistry {
    pub fn new(config: &Config) -> Self {
        let client = reqwest::Client::new();
        Self {
            openai: OpenAiTts::new(
                client.clone(),
                config.openai_base_url.clone(),
                config.openai_api_key.clone(),
            ),
            siliconflow: SiliconFlowTts::new(
                client,
                config.siliconflow_base_url.clone(),
                config.siliconflow_api_key.clone(),
            ),
            timeout: Duration::from_secs(config.provider_timeout_secs),
        }
    }

    /// Dispatches to the selected vendor with a bounded timeout so a hung
    /// vendor call cannot leave a job in `processing` forever.
    pub async fn synthesize(
        &self,
        provider: Provider,
        text: &str,
        voice_id: &str,
        speed: f64,
        format: AudioFormat,
    ) -> Result<Vec<u8>> {
        let call = async {
            match provider {
                Provider::OpenAi => self.openai.synthesize(text, voice_id, speed, format).await,
                Provider::SiliconFlow => {
                    self.siliconflow
                        .synthesize(text, voice_id, speed, format)
                        .await
                }
            }
        };

        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(AppError::Provider(format!(
                "{} call timed out after {}s",
                provider.as_str(),
                self.timeout.as_secs()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openai_prefix_selects_openai() {
        assert_eq!(select_provider("openai-alloy"), Provider::OpenAi);
    }

    #[test]
    fn siliconflow_prefixes_select_siliconflow() {
        assert_eq!(select_provider("sf-alex"), Provider::SiliconFlow);
        assert_eq!(select_provider("siliconflow-anna"), Provider::SiliconFlow);
        assert_eq!(select_provider("fish-bella"), Provider::SiliconFlow);
    }

    #[test]
    fn unmatched_prefix_falls_back_to_default() {
        assert_eq!(select_provider("tencent-xiaoyun"), Provider::SiliconFlow);
        assert_eq!(select_provider("eleven-rachel"), Provider::SiliconFlow);
        assert_eq!(select_provider("plain-voice"), Provider::SiliconFlow);
    }

    #[test]
    fn selection_is_deterministic() {
        for voice in ["openai-nova", "sf-david", "whatever"] {
            assert_eq!(select_provider(voice), select_provider(voice));
        }
    }

    #[test]
    fn vendor_errors_are_truncated() {
        let long = "e".repeat(2000);
        assert_eq!(truncate_vendor_error(&long).chars().count(), 500);
        assert_eq!(truncate_vendor_error("short"), "short");
    }
}
