use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::errors::{AppError, Result};
use crate::models::AudioFormat;
use crate::storage::{AudioStore, StoredAudio};

/// Durable filesystem-backed object storage. Produces stable public URLs
/// under the configured base; the files themselves are served by a static
/// file route.
pub struct ObjectStorage {
    base_path: PathBuf,
    public_base_url: String,
}

impl ObjectStorage {
    pub fn new<P: AsRef<Path>>(base_path: P, public_base_url: &str) -> Result<Self> {
        let base_path = base_path.as_ref().to_path_buf();

        std::fs::create_dir_all(&base_path)
            .map_err(|e| AppError::Storage(format!("Failed to create storage directory: {}", e)))?;

        Ok(Self {
            base_path,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        })
    }

    fn object_key(user_id: &str, audio_id: &str, format: AudioFormat) -> String {
        format!("{}/{}.{}", user_id, audio_id, format.extension())
    }
}

#[async_trait]
impl AudioStore for ObjectStorage {
    async fn store(
        &self,
        user_id: &str,
        audio_id: &str,
        bytes: &[u8],
        format: AudioFormat,
    ) -> Result<StoredAudio> {
        let key = Self::object_key(user_id, audio_id, format);
        let full_path = self.base_path.join(&key);

        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| AppError::Storage(format!("Failed to create directory: {}", e)))?;
        }

        fs::write(&full_path, bytes)
            .await
            .map_err(|e| AppError::Storage(format!("Failed to write audio file: {}", e)))?;

        Ok(StoredAudio {
            url: format!("{}/{}", self.public_base_url, key),
            size: bytes.len() as i64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn stores_bytes_and_returns_stable_url() {
        let dir = tempdir().unwrap();
        let storage = ObjectStorage::new(dir.path(), "https://audio.example.com/").unwrap();

        let stored = storage
            .store("user-1", "audio-1", b"fake mp3 bytes", AudioFormat::Mp3)
            .await
            .unwrap();

        assert_eq!(stored.url, "https://audio.example.com/user-1/audio-1.mp3");
        assert_eq!(stored.size, 14);

        let on_disk = std::fs::read(dir.path().join("user-1/audio-1.mp3")).unwrap();
        assert_eq!(on_disk, b"fake mp3 bytes");
    }

    #[tokio::test]
    async fn wav_extension_follows_format() {
        let dir = tempdir().unwrap();
        let storage = ObjectStorage::new(dir.path(), "/files").unwrap();

        let stored = storage
            .store("u", "a", b"riff", AudioFormat::Wav)
            .await
            .unwrap();

        assert_eq!(stored.url, "/files/u/a.wav");
    }
}
