use chrono::Utc;
use std::sync::Arc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::database::{
    queries::{AudioQueries, JobQueries, UsageQueries},
    Database,
};
use crate::errors::{AppError, Result};
use crate::models::{
    truncate_chars, Audio, GenerateRequest, Job, JobAudioRef, JobErrorInfo, JobStatus,
    JobStatusResponse, JobSubmission, UsageLogEntry, User,
};
use crate::providers::{select_provider, ProviderRegistry};
use crate::services::quota::{QuotaLedger, CHARS_PER_SECOND};
use crate::storage::StorageRouter;

// Coarse milestones polled and displayed by clients; not a continuous
// measure.
const PROGRESS_PROVIDER_CALLED: i64 = 30;
const PROGRESS_AUDIO_RECEIVED: i64 = 70;

const TITLE_MAX_CHARS: usize = 50;

/// Orchestrates quota check -> persist job -> invoke provider -> persist
/// artifact -> commit quota and usage -> finalize status.
#[derive(Clone)]
pub struct TtsService {
    db: Database,
    storage: Arc<StorageRouter>,
    providers: ProviderRegistry,
    quota: QuotaLedger,
}

impl TtsService {
    pub fn new(db: Database, storage: Arc<StorageRouter>, providers: ProviderRegistry) -> Self {
        let quota = QuotaLedger::new(db.clone());
        Self {
            db,
            storage,
            providers,
            quota,
        }
    }

    /// Sync mode: generate and return raw bytes without creating a durable
    /// Job or Artifact record. Quota is charged with the estimate since no
    /// artifact row carries a duration.
    pub async fn generate_direct(&self, user: &User, request: &GenerateRequest) -> Result<Vec<u8>> {
        request.validate()?;

        let user = self.quota.ensure_current_period(user).await?;
        let required = QuotaLedger::estimate_seconds(&request.text);
        QuotaLedger::check(&user, required)?;

        let provider = select_provider(&request.voice_id);
        let bytes = self
            .providers
            .synthesize(
                provider,
                &request.text,
                &request.voice_id,
                request.speed,
                request.format,
            )
            .await?;

        self.quota.commit(&user.id, required).await?;
        UsageQueries::append(
            self.db.pool(),
            &UsageLogEntry {
                id: Uuid::new_v4().to_string(),
                user_id: user.id.clone(),
                kind: "tts".to_string(),
                chars_used: request.text.chars().count() as i64,
                duration_used: required as f64,
                audio_id: None,
                provider: provider.as_str().to_string(),
                created_at: Utc::now(),
            },
        )
        .await?;

        tracing::info!(user_id = %user.id, provider = provider.as_str(), "direct generation served");
        Ok(bytes)
    }

    /// Async mode: persist a pending job and return immediately; the state
    /// machine runs on a detached task.
    pub async fn create_job(&self, user: &User, request: GenerateRequest) -> Result<JobSubmission> {
        request.validate()?;

        let user = self.quota.ensure_current_period(user).await?;
        let required = QuotaLedger::estimate_seconds(&request.text);
        QuotaLedger::check(&user, required)?;

        let job = Job {
            id: Uuid::new_v4().to_string(),
            user_id: user.id.clone(),
            audio_id: None,
            text: request.text,
            voice_id: request.voice_id,
            speed: request.speed,
            pitch: request.pitch,
            format: request.format,
            status: JobStatus::Pending,
            progress: 0,
            error_code: None,
            error_message: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        };
        JobQueries::create(self.db.pool(), &job).await?;

        let service = self.clone();
        let job_id = job.id.clone();
        let user_id = user.id.clone();
        tokio::spawn(async move {
            service.process_job(&job_id, &user_id).await;
        });

        Ok(JobSubmission {
            job_id: job.id,
            status: JobStatus::Pending,
            // Rough wall-clock guess for the polling client.
            estimated_time: (required + 9) / 10 + 2,
        })
    }

    /// Scoped by owner: a job that exists but belongs to someone else is
    /// reported as missing.
    pub async fn get_job_status(&self, job_id: &str, user_id: &str) -> Result<JobStatusResponse> {
        let job = JobQueries::find_for_user(self.db.pool(), job_id, user_id)
            .await?
            .ok_or(AppError::NotFound)?;

        let mut response = JobStatusResponse {
            job_id: job.id,
            status: job.status,
            progress: job.progress,
            audio: None,
            error: None,
        };

        if !job.status.is_terminal() {
            return Ok(response);
        }

        if job.status == JobStatus::Completed {
            if let Some(audio_id) = &job.audio_id {
                if let Some(audio) = AudioQueries::find_by_id(self.db.pool(), audio_id).await? {
                    response.audio = Some(JobAudioRef {
                        id: audio.id,
                        url: audio.audio_url,
                        duration: audio.duration,
                        size: audio.file_size.unwrap_or(0),
                    });
                }
            }
        } else {
            response.error = Some(JobErrorInfo {
                code: job.error_code.unwrap_or_else(|| "TTS_ERROR".to_string()),
                message: job
                    .error_message
                    .unwrap_or_else(|| "Generation failed".to_string()),
            });
        }

        Ok(response)
    }

    /// Supervised boundary for the detached task: whatever the pipeline
    /// does, including panicking, the job ends in a terminal state.
    pub async fn process_job(&self, job_id: &str, user_id: &str) {
        let pipeline = tokio::spawn({
            let service = self.clone();
            let job_id = job_id.to_string();
            let user_id = user_id.to_string();
            async move { service.run_pipeline(&job_id, &user_id).await }
        });

        if let Err(err) = run_supervised(pipeline).await {
            tracing::error!(job_id, error = %err, "TTS job failed");
            if let Err(db_err) =
                JobQueries::mark_failed(self.db.pool(), job_id, err.code(), &err.to_string()).await
            {
                tracing::error!(job_id, error = %db_err, "failed to record job failure");
            }
        }
    }

    async fn run_pipeline(&self, job_id: &str, user_id: &str) -> Result<()> {
        JobQueries::mark_processing(self.db.pool(), job_id).await?;

        let job = JobQueries::find_by_id(self.db.pool(), job_id)
            .await?
            .ok_or(AppError::NotFound)?;

        let provider = select_provider(&job.voice_id);
        JobQueries::set_progress(self.db.pool(), job_id, PROGRESS_PROVIDER_CALLED).await?;

        let bytes = self
            .providers
            .synthesize(provider, &job.text, &job.voice_id, job.speed, job.format)
            .await?;

        JobQueries::set_progress(self.db.pool(), job_id, PROGRESS_AUDIO_RECEIVED).await?;

        // The vendors report no duration, so derive it from text length.
        let chars = job.text.chars().count() as i64;
        let duration = chars as f64 / CHARS_PER_SECOND as f64;

        let audio_id = Uuid::new_v4().to_string();
        let stored = self
            .storage
            .store(user_id, &audio_id, &bytes, job.format)
            .await?;

        let now = Utc::now();
        let audio = Audio {
            id: audio_id.clone(),
            user_id: user_id.to_string(),
            title: Some(truncate_chars(&job.text, TITLE_MAX_CHARS)),
            text: job.text.clone(),
            text_length: chars,
            voice_id: job.voice_id.clone(),
            audio_url: stored.url,
            audio_format: job.format,
            duration,
            file_size: Some(stored.size),
            speed: job.speed,
            pitch: job.pitch,
            is_deleted: false,
            created_at: now,
            updated_at: now,
        };
        AudioQueries::create(self.db.pool(), &audio).await?;

        self.quota.commit(user_id, duration.ceil() as i64).await?;
        UsageQueries::append(
            self.db.pool(),
            &UsageLogEntry {
                id: Uuid::new_v4().to_string(),
                user_id: user_id.to_string(),
                kind: "tts".to_string(),
                chars_used: chars,
                duration_used: duration,
                audio_id: Some(audio_id.clone()),
                provider: provider.as_str().to_string(),
                created_at: now,
            },
        )
        .await?;

        JobQueries::mark_completed(self.db.pool(), job_id, &audio_id).await?;

        tracing::info!(job_id, audio_id = %audio_id, provider = provider.as_str(), "TTS job completed");
        Ok(())
    }
}

/// Flattens a join failure (panic or cancellation) into the pipeline's
/// error type so the caller can mark the job failed either way.
async fn run_supervised(handle: JoinHandle<Result<()>>) -> Result<()> {
    match handle.await {
        Ok(result) => result,
        Err(join_err) => Err(AppError::Internal(anyhow::anyhow!(
            "TTS pipeline task died: {join_err}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn supervision_flattens_a_panic_into_an_internal_error() {
        let handle = tokio::spawn(async { panic!("pipeline blew up") });
        let err = run_supervised(handle).await.unwrap_err();
        assert_eq!(err.code(), "INTERNAL_ERROR");
    }

    #[tokio::test]
    async fn supervision_passes_pipeline_errors_through() {
        let handle = tokio::spawn(async { Err(AppError::Provider("vendor down".to_string())) });
        let err = run_supervised(handle).await.unwrap_err();
        assert_eq!(err.code(), "PROVIDER_ERROR");
    }

    #[tokio::test]
    async fn supervision_passes_success_through() {
        let handle = tokio::spawn(async { Ok(()) });
        assert!(run_supervised(handle).await.is_ok());
    }
}
