pub mod quota;
pub mod rate_limiter;
pub mod redis;
pub mod tts;
