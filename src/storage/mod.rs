use async_trait::async_trait;

use crate::errors::{AppError, Result};
use crate::models::AudioFormat;

pub mod kv_cache;
pub mod object;

pub use kv_cache::KvCacheStorage;
pub use object::ObjectStorage;

/// Where a stored artifact ended up and how clients reach it.
#[derive(Debug, Clone)]
pub struct StoredAudio {
    pub url: String,
    pub size: i64,
}

#[async_trait]
pub trait AudioStore: Send + Sync {
    async fn store(
        &self,
        user_id: &str,
        audio_id: &str,
        bytes: &[u8],
        format: AudioFormat,
    ) -> Result<StoredAudio>;
}

/// Tries backends in a fixed preference order: durable object storage
/// first, then the expiring key-value cache. Neither configured is a
/// configuration error, never a silent drop.
pub struct StorageRouter {
    object: Option<ObjectStorage>,
    cache: Option<KvCacheStorage>,
}

impl StorageRouter {
    pub fn new(object: Option<ObjectStorage>, cache: Option<KvCacheStorage>) -> Self {
        Self { object, cache }
    }

    pub async fn store(
        &self,
        user_id: &str,
        audio_id: &str,
        bytes: &[u8],
        format: AudioFormat,
    ) -> Result<StoredAudio> {
        if let Some(object) = &self.object {
            return object.store(user_id, audio_id, bytes, format).await;
        }
        if let Some(cache) = &self.cache {
            return cache.store(user_id, audio_id, bytes, format).await;
        }
        Err(AppError::Configuration(
            "No audio storage backend configured".to_string(),
        ))
    }

    /// Reads back a cache-stored artifact for proxy streaming. Object-store
    /// artifacts are served directly from their public URL and never pass
    /// through here.
    pub async fn open_cached(&self, audio_id: &str) -> Result<Option<(Vec<u8>, AudioFormat)>> {
        match &self.cache {
            Some(cache) => cache.retrieve(audio_id).await,
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unconfigured_router_reports_distinct_error() {
        let router = StorageRouter::new(None, None);
        let err = router
            .store("user", "audio", b"bytes", AudioFormat::Mp3)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "CONFIG_ERROR");
    }

    #[tokio::test]
    async fn open_cached_without_cache_is_none() {
        let router = StorageRouter::new(None, None);
        assert!(router.open_cached("missing").await.unwrap().is_none());
    }
}
