use anyhow::Result;
use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub redis_url: Option<String>,
    pub port: u16,

    /// Userinfo endpoint of the external identity provider. Token
    /// verification is fully delegated; this service only forwards the
    /// bearer token and trusts the returned subject.
    pub identity_userinfo_url: String,

    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    pub siliconflow_api_key: Option<String>,
    pub siliconflow_base_url: String,
    pub provider_timeout_secs: u64,

    /// Directory for durable audio storage. Unset means object storage is
    /// not configured and the redis cache fallback is used instead.
    pub audio_storage_dir: Option<String>,
    /// Public base URL under which stored audio files are reachable.
    pub audio_public_base_url: String,
    pub audio_cache_ttl_secs: u64,

    pub rate_limit_requests: u32,
    pub rate_limit_window_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Config {
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://tts.db".to_string()),
            redis_url: env::var("REDIS_URL").ok(),
            port: env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()?,
            identity_userinfo_url: env::var("IDENTITY_USERINFO_URL")
                .unwrap_or_else(|_| "https://api.clerk.com/v1/me".to_string()),
            openai_api_key: env::var("OPENAI_API_KEY").ok(),
            openai_base_url: env::var("OPENAI_BASE_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1/audio/speech".to_string()),
            siliconflow_api_key: env::var("SILICONFLOW_API_KEY").ok(),
            siliconflow_base_url: env::var("SILICONFLOW_BASE_URL")
                .unwrap_or_else(|_| "https://api.siliconflow.cn/v1/audio/speech".to_string()),
            provider_timeout_secs: env::var("PROVIDER_TIMEOUT_SECS")
                .unwrap_or_else(|_| "60".to_string())
                .parse()?,
            audio_storage_dir: env::var("AUDIO_STORAGE_DIR").ok(),
            audio_public_base_url: env::var("AUDIO_PUBLIC_BASE_URL")
                .unwrap_or_else(|_| "/files".to_string()),
            audio_cache_ttl_secs: env::var("AUDIO_CACHE_TTL_SECS")
                .unwrap_or_else(|_| "604800".to_string()) // 7 days
                .parse()?,
            rate_limit_requests: env::var("RATE_LIMIT_REQUESTS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()?,
            rate_limit_window_secs: env::var("RATE_LIMIT_WINDOW_SECS")
                .unwrap_or_else(|_| "60".to_string())
                .parse()?,
        })
    }
}
