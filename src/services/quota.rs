use chrono::{DateTime, Datelike, Months, Utc};

use crate::database::{queries::UserQueries, Database};
use crate::errors::{AppError, Result};
use crate::models::User;

/// Crude linear proxy for spoken duration: ~150 characters per second.
pub const CHARS_PER_SECOND: i64 = 150;

/// Per-user budget of generation-seconds. The check is advisory (no hold is
/// taken); the commit is an atomic additive increment, so concurrent jobs
/// can jointly overdraw by at most (N-1) x the max single-job cost but a
/// commit is never lost.
#[derive(Clone)]
pub struct QuotaLedger {
    db: Database,
}

impl QuotaLedger {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn estimate_seconds(text: &str) -> i64 {
        let chars = text.chars().count() as i64;
        (chars + CHARS_PER_SECOND - 1) / CHARS_PER_SECOND
    }

    pub fn first_of_next_month(now: DateTime<Utc>) -> DateTime<Utc> {
        let first = now
            .date_naive()
            .with_day(1)
            .expect("day 1 always valid")
            + Months::new(1);
        DateTime::from_naive_utc_and_offset(
            first.and_hms_opt(0, 0, 0).expect("midnight always valid"),
            Utc,
        )
    }

    /// Lazy monthly reset: a reset timestamp in the past zeroes the used
    /// counter and advances the timestamp to the start of the next period.
    pub async fn ensure_current_period(&self, user: &User) -> Result<User> {
        let now = Utc::now();
        let needs_reset = match user.quota_reset_at {
            Some(reset_at) => reset_at <= now,
            None => true,
        };

        if !needs_reset {
            return Ok(user.clone());
        }

        let next_reset = Self::first_of_next_month(now);
        UserQueries::reset_quota(self.db.pool(), &user.id, next_reset).await?;

        let mut refreshed = user.clone();
        refreshed.quota_used = 0;
        refreshed.quota_reset_at = Some(next_reset);
        Ok(refreshed)
    }

    /// Advisory check only; nothing is mutated or held.
    pub fn check(user: &User, required: i64) -> Result<()> {
        let remaining = user.quota_limit - user.quota_used;
        if remaining < required {
            return Err(AppError::QuotaExceeded {
                remaining: remaining.max(0),
                required,
            });
        }
        Ok(())
    }

    /// Charges actual consumption after a generation succeeds. Only ever
    /// called on the success path, so failures never need a refund.
    pub async fn commit(&self, user_id: &str, seconds: i64) -> Result<()> {
        UserQueries::add_quota_used(self.db.pool(), user_id, seconds).await
    }
}
