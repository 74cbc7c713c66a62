use chrono::Utc;

use crate::errors::Result;
use crate::services::redis::RedisService;

/// Fixed-window request counter for the generate endpoints, keyed per user.
/// Without redis the limiter admits everything; quota still bounds total
/// consumption.
pub struct RateLimiter;

impl RateLimiter {
    /// Bucket index for a fixed window. A zero-length window is treated as
    /// one second instead of dividing by zero.
    fn window_index(now_ts: i64, window_secs: u64) -> i64 {
        now_ts / window_secs.max(1) as i64
    }

    pub async fn check_generate_limit(
        redis: Option<&RedisService>,
        user_id: &str,
        max_requests: u32,
        window_secs: u64,
    ) -> Result<bool> {
        let Some(redis) = redis else {
            return Ok(true);
        };

        let window_secs = window_secs.max(1);
        let window = Self::window_index(Utc::now().timestamp(), window_secs);
        let key = format!("rate:tts:{}:{}", user_id, window);
        let mut conn = redis.connection_manager();

        let count: u64 = redis::cmd("INCR").arg(&key).query_async(&mut conn).await?;

        if count == 1 {
            redis::cmd("EXPIRE")
                .arg(&key)
                .arg(window_secs)
                .query_async::<_, ()>(&mut conn)
                .await?;
        }

        Ok(count <= max_requests as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_index_buckets_by_duration() {
        assert_eq!(RateLimiter::window_index(120, 60), 2);
        assert_eq!(RateLimiter::window_index(179, 60), 2);
        assert_eq!(RateLimiter::window_index(180, 60), 3);
    }

    #[test]
    fn zero_window_does_not_divide_by_zero() {
        assert_eq!(RateLimiter::window_index(1000, 0), 1000);
    }

    #[tokio::test]
    async fn absent_redis_admits_everything() {
        for _ in 0..100 {
            assert!(
                RateLimiter::check_generate_limit(None, "user", 10, 60)
                    .await
                    .unwrap()
            );
        }
    }
}
