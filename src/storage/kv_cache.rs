use async_trait::async_trait;

use crate::errors::Result;
use crate::models::AudioFormat;
use crate::services::redis::RedisService;
use crate::storage::{AudioStore, StoredAudio};

/// Low-durability fallback: audio bytes live in redis with an expiry and
/// are proxy-streamed through `/api/audios/stream/:id` instead of a stable
/// object URL.
pub struct KvCacheStorage {
    redis: RedisService,
    ttl_secs: u64,
}

impl KvCacheStorage {
    pub fn new(redis: RedisService, ttl_secs: u64) -> Self {
        Self { redis, ttl_secs }
    }

    fn data_key(audio_id: &str) -> String {
        format!("audio:{}", audio_id)
    }

    fn format_key(audio_id: &str) -> String {
        format!("audio:{}:format", audio_id)
    }

    pub async fn retrieve(&self, audio_id: &str) -> Result<Option<(Vec<u8>, AudioFormat)>> {
        let mut conn = self.redis.connection_manager();

        let bytes: Option<Vec<u8>> = redis::cmd("GET")
            .arg(Self::data_key(audio_id))
            .query_async(&mut conn)
            .await?;

        let Some(bytes) = bytes else {
            return Ok(None);
        };

        let format: Option<String> = redis::cmd("GET")
            .arg(Self::format_key(audio_id))
            .query_async(&mut conn)
            .await?;

        let format = match format.as_deref() {
            Some("wav") => AudioFormat::Wav,
            _ => AudioFormat::Mp3,
        };

        Ok(Some((bytes, format)))
    }
}

#[async_trait]
impl AudioStore for KvCacheStorage {
    async fn store(
        &self,
        _user_id: &str,
        audio_id: &str,
        bytes: &[u8],
        format: AudioFormat,
    ) -> Result<StoredAudio> {
        let mut conn = self.redis.connection_manager();

        redis::cmd("SET")
            .arg(Self::data_key(audio_id))
            .arg(bytes)
            .arg("EX")
            .arg(self.ttl_secs)
            .query_async::<_, ()>(&mut conn)
            .await?;

        redis::cmd("SET")
            .arg(Self::format_key(audio_id))
            .arg(format.extension())
            .arg("EX")
            .arg(self.ttl_secs)
            .query_async::<_, ()>(&mut conn)
            .await?;

        Ok(StoredAudio {
            url: format!("/api/audios/stream/{}", audio_id),
            size: bytes.len() as i64,
        })
    }
}
