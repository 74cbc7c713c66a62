use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::errors::Result;
use crate::models::{Audio, Job, Plan, UsageLogEntry, User};

const USER_COLUMNS: &str = "id, external_id, email, name, plan, quota_limit, quota_used, \
     quota_reset_at, created_at, updated_at";

const JOB_COLUMNS: &str = "id, user_id, audio_id, text, voice_id, speed, pitch, format, \
     status, progress, error_code, error_message, created_at, started_at, completed_at";

const AUDIO_COLUMNS: &str = "id, user_id, title, text, text_length, voice_id, audio_url, \
     audio_format, duration, file_size, speed, pitch, is_deleted, created_at, updated_at";

pub struct UserQueries;

impl UserQueries {
    pub async fn create(
        pool: &SqlitePool,
        external_id: &str,
        email: &str,
        name: Option<&str>,
        quota_limit: i64,
        quota_reset_at: DateTime<Utc>,
    ) -> Result<User> {
        let now = Utc::now();
        let user = User {
            id: uuid::Uuid::new_v4().to_string(),
            external_id: external_id.to_string(),
            email: email.to_string(),
            name: name.map(|n| n.to_string()),
            plan: Plan::Free,
            quota_limit,
            quota_used: 0,
            quota_reset_at: Some(quota_reset_at),
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            "INSERT INTO users (id, external_id, email, name, plan, quota_limit, quota_used, \
             quota_reset_at, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&user.id)
        .bind(&user.external_id)
        .bind(&user.email)
        .bind(&user.name)
        .bind(user.plan)
        .bind(user.quota_limit)
        .bind(user.quota_used)
        .bind(user.quota_reset_at)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(pool)
        .await?;

        Ok(user)
    }

    pub async fn find_by_id(pool: &SqlitePool, id: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE id = ?",
            USER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(pool)
        .await?;

        Ok(user)
    }

    pub async fn find_by_external_id(pool: &SqlitePool, external_id: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE external_id = ?",
            USER_COLUMNS
        ))
        .bind(external_id)
        .fetch_optional(pool)
        .await?;

        Ok(user)
    }

    /// Additive quota commit as a single atomic increment. The advisory
    /// check in the quota ledger reads first; this write never loses a
    /// concurrent update.
    pub async fn add_quota_used(pool: &SqlitePool, user_id: &str, seconds: i64) -> Result<()> {
        sqlx::query("UPDATE users SET quota_used = quota_used + ?, updated_at = ? WHERE id = ?")
            .bind(seconds)
            .bind(Utc::now())
            .bind(user_id)
            .execute(pool)
            .await?;

        Ok(())
    }

    pub async fn reset_quota(
        pool: &SqlitePool,
        user_id: &str,
        next_reset: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE users SET quota_used = 0, quota_reset_at = ?, updated_at = ? WHERE id = ?",
        )
        .bind(next_reset)
        .bind(Utc::now())
        .bind(user_id)
        .execute(pool)
        .await?;

        Ok(())
    }
}

pub struct JobQueries;

impl JobQueries {
    pub async fn create(pool: &SqlitePool, job: &Job) -> Result<()> {
        sqlx::query(
            "INSERT INTO tts_jobs (id, user_id, audio_id, text, voice_id, speed, pitch, format, \
             status, progress, error_code, error_message, created_at, started_at, completed_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&job.id)
        .bind(&job.user_id)
        .bind(&job.audio_id)
        .bind(&job.text)
        .bind(&job.voice_id)
        .bind(job.speed)
        .bind(job.pitch)
        .bind(job.format)
        .bind(job.status)
        .bind(job.progress)
        .bind(&job.error_code)
        .bind(&job.error_message)
        .bind(job.created_at)
        .bind(job.started_at)
        .bind(job.completed_at)
        .execute(pool)
        .await?;

        Ok(())
    }

    pub async fn find_by_id(pool: &SqlitePool, id: &str) -> Result<Option<Job>> {
        let job = sqlx::query_as::<_, Job>(&format!(
            "SELECT {} FROM tts_jobs WHERE id = ?",
            JOB_COLUMNS
        ))
        .bind(id)
        .fetch_optional(pool)
        .await?;

        Ok(job)
    }

    /// Scoped by owner so a job id belonging to another user is
    /// indistinguishable from a missing one.
    pub async fn find_for_user(
        pool: &SqlitePool,
        id: &str,
        user_id: &str,
    ) -> Result<Option<Job>> {
        let job = sqlx::query_as::<_, Job>(&format!(
            "SELECT {} FROM tts_jobs WHERE id = ? AND user_id = ?",
            JOB_COLUMNS
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(pool)
        .await?;

        Ok(job)
    }

    pub async fn mark_processing(pool: &SqlitePool, id: &str) -> Result<()> {
        sqlx::query(
            "UPDATE tts_jobs SET status = 'processing', progress = 10, started_at = ? \
             WHERE id = ? AND status = 'pending'",
        )
        .bind(Utc::now())
        .bind(id)
        .execute(pool)
        .await?;

        Ok(())
    }

    pub async fn set_progress(pool: &SqlitePool, id: &str, progress: i64) -> Result<()> {
        sqlx::query("UPDATE tts_jobs SET progress = ? WHERE id = ? AND status = 'processing'")
            .bind(progress)
            .bind(id)
            .execute(pool)
            .await?;

        Ok(())
    }

    pub async fn mark_completed(pool: &SqlitePool, id: &str, audio_id: &str) -> Result<()> {
        sqlx::query(
            "UPDATE tts_jobs SET status = 'completed', progress = 100, audio_id = ?, \
             completed_at = ? WHERE id = ? AND status = 'processing'",
        )
        .bind(audio_id)
        .bind(Utc::now())
        .bind(id)
        .execute(pool)
        .await?;

        Ok(())
    }

    pub async fn mark_failed(
        pool: &SqlitePool,
        id: &str,
        error_code: &str,
        error_message: &str,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE tts_jobs SET status = 'failed', error_code = ?, error_message = ?, \
             completed_at = ? WHERE id = ? AND status IN ('pending', 'processing')",
        )
        .bind(error_code)
        .bind(error_message)
        .bind(Utc::now())
        .bind(id)
        .execute(pool)
        .await?;

        Ok(())
    }
}

pub struct AudioQueries;

impl AudioQueries {
    pub async fn create(pool: &SqlitePool, audio: &Audio) -> Result<()> {
        sqlx::query(
            "INSERT INTO audios (id, user_id, title, text, text_length, voice_id, audio_url, \
             audio_format, duration, file_size, speed, pitch, is_deleted, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&audio.id)
        .bind(&audio.user_id)
        .bind(&audio.title)
        .bind(&audio.text)
        .bind(audio.text_length)
        .bind(&audio.voice_id)
        .bind(&audio.audio_url)
        .bind(audio.audio_format)
        .bind(audio.duration)
        .bind(audio.file_size)
        .bind(audio.speed)
        .bind(audio.pitch)
        .bind(audio.is_deleted)
        .bind(audio.created_at)
        .bind(audio.updated_at)
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Unfiltered lookup. Job status responses resolve their artifact
    /// through here, so a soft-deleted audio still shows up for its job;
    /// the library endpoints go through the owner-scoped, filtered queries.
    pub async fn find_by_id(pool: &SqlitePool, id: &str) -> Result<Option<Audio>> {
        let audio = sqlx::query_as::<_, Audio>(&format!(
            "SELECT {} FROM audios WHERE id = ?",
            AUDIO_COLUMNS
        ))
        .bind(id)
        .fetch_optional(pool)
        .await?;

        Ok(audio)
    }

    pub async fn find_for_user(
        pool: &SqlitePool,
        id: &str,
        user_id: &str,
    ) -> Result<Option<Audio>> {
        let audio = sqlx::query_as::<_, Audio>(&format!(
            "SELECT {} FROM audios WHERE id = ? AND user_id = ? AND is_deleted = 0",
            AUDIO_COLUMNS
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(pool)
        .await?;

        Ok(audio)
    }

    pub async fn list_for_user(
        pool: &SqlitePool,
        user_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Audio>> {
        let audios = sqlx::query_as::<_, Audio>(&format!(
            "SELECT {} FROM audios WHERE user_id = ? AND is_deleted = 0 \
             ORDER BY created_at DESC LIMIT ? OFFSET ?",
            AUDIO_COLUMNS
        ))
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await?;

        Ok(audios)
    }

    pub async fn count_for_user(pool: &SqlitePool, user_id: &str) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM audios WHERE user_id = ? AND is_deleted = 0",
        )
        .bind(user_id)
        .fetch_one(pool)
        .await?;

        Ok(count)
    }

    /// Soft delete; returns false when the audio is absent or owned by
    /// someone else.
    pub async fn soft_delete(pool: &SqlitePool, id: &str, user_id: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE audios SET is_deleted = 1, updated_at = ? \
             WHERE id = ? AND user_id = ? AND is_deleted = 0",
        )
        .bind(Utc::now())
        .bind(id)
        .bind(user_id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

pub struct UsageQueries;

impl UsageQueries {
    pub async fn append(pool: &SqlitePool, entry: &UsageLogEntry) -> Result<()> {
        sqlx::query(
            "INSERT INTO usage_logs (id, user_id, kind, chars_used, duration_used, audio_id, \
             provider, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&entry.id)
        .bind(&entry.user_id)
        .bind(&entry.kind)
        .bind(entry.chars_used)
        .bind(entry.duration_used)
        .bind(&entry.audio_id)
        .bind(&entry.provider)
        .bind(entry.created_at)
        .execute(pool)
        .await?;

        Ok(())
    }

    pub async fn sum_duration_since(
        pool: &SqlitePool,
        user_id: &str,
        since: DateTime<Utc>,
    ) -> Result<f64> {
        let total = sqlx::query_scalar::<_, f64>(
            "SELECT CAST(COALESCE(SUM(duration_used), 0) AS REAL) FROM usage_logs \
             WHERE user_id = ? AND created_at >= ?",
        )
        .bind(user_id)
        .bind(since)
        .fetch_one(pool)
        .await?;

        Ok(total)
    }

    pub async fn page_for_user(
        pool: &SqlitePool,
        user_id: &str,
        start_date: Option<DateTime<Utc>>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<UsageLogEntry>> {
        let entries = match start_date {
            Some(start) => {
                sqlx::query_as::<_, UsageLogEntry>(
                    "SELECT id, user_id, kind, chars_used, duration_used, audio_id, provider, \
                     created_at FROM usage_logs WHERE user_id = ? AND created_at >= ? \
                     ORDER BY created_at DESC LIMIT ? OFFSET ?",
                )
                .bind(user_id)
                .bind(start)
                .bind(limit)
                .bind(offset)
                .fetch_all(pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, UsageLogEntry>(
                    "SELECT id, user_id, kind, chars_used, duration_used, audio_id, provider, \
                     created_at FROM usage_logs WHERE user_id = ? \
                     ORDER BY created_at DESC LIMIT ? OFFSET ?",
                )
                .bind(user_id)
                .bind(limit)
                .bind(offset)
                .fetch_all(pool)
                .await?
            }
        };

        Ok(entries)
    }

    pub async fn totals_for_user(
        pool: &SqlitePool,
        user_id: &str,
        start_date: Option<DateTime<Utc>>,
    ) -> Result<(i64, i64, f64)> {
        let (count, chars, duration) = match start_date {
            Some(start) => {
                sqlx::query_as::<_, (i64, i64, f64)>(
                    "SELECT COUNT(*), COALESCE(SUM(chars_used), 0), \
                     CAST(COALESCE(SUM(duration_used), 0) AS REAL) \
                     FROM usage_logs WHERE user_id = ? AND created_at >= ?",
                )
                .bind(user_id)
                .bind(start)
                .fetch_one(pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, (i64, i64, f64)>(
                    "SELECT COUNT(*), COALESCE(SUM(chars_used), 0), \
                     CAST(COALESCE(SUM(duration_used), 0) AS REAL) \
                     FROM usage_logs WHERE user_id = ?",
                )
                .bind(user_id)
                .fetch_one(pool)
                .await?
            }
        };

        Ok((count, chars, duration))
    }
}
