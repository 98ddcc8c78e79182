use crate::config::RateLimitSettings;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub window_size: Duration,
    pub max_requests: u32,
    pub auth_max_requests: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_size: Duration::minutes(15),
            max_requests: 300,
            auth_max_requests: 30,
        }
    }
}

impl From<&RateLimitSettings> for RateLimitConfig {
    fn from(settings: &RateLimitSettings) -> Self {
        Self {
            window_size: Duration::seconds(settings.window_seconds),
            max_requests: settings.max_requests,
            auth_max_requests: settings.auth_max_requests,
        }
    }
}

/// Which budget a request draws from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bucket {
    General,
    Auth,
}

impl Bucket {
    pub fn for_path(path: &str) -> Self {
        if path.starts_with("/api/auth") {
            Bucket::Auth
        } else {
            Bucket::General
        }
    }
}

#[derive(Debug)]
struct RequestWindow {
    timestamps: Vec<DateTime<Utc>>,
}

impl RequestWindow {
    fn new() -> Self {
        Self {
            timestamps: Vec::new(),
        }
    }

    fn cleanup_old_requests(&mut self, window_size: Duration) {
        let cutoff = Utc::now() - window_size;
        self.timestamps.retain(|ts| *ts > cutoff);
    }
}

/// Sliding-window limiter keyed by client address.
pub struct RateLimiter {
    windows: Arc<RwLock<HashMap<(Bucket, String), RequestWindow>>>,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            windows: Arc::new(RwLock::new(HashMap::new())),
            config,
        }
    }

    fn limit_for(&self, bucket: Bucket) -> u32 {
        match bucket {
            Bucket::General => self.config.max_requests,
            Bucket::Auth => self.config.auth_max_requests,
        }
    }

    /// Records the request and returns `false` once the key is over budget.
    pub async fn check_rate_limit(&self, key: &str, bucket: Bucket) -> bool {
        let mut windows = self.windows.write().await;
        let window = windows
            .entry((bucket, key.to_string()))
            .or_insert_with(RequestWindow::new);

        window.cleanup_old_requests(self.config.window_size);

        if window.timestamps.len() < self.limit_for(bucket) as usize {
            window.timestamps.push(Utc::now());
            true
        } else {
            false
        }
    }

    pub async fn cleanup(&self) {
        let mut windows = self.windows.write().await;
        windows.retain(|_, window| {
            window.cleanup_old_requests(self.config.window_size);
            !window.timestamps.is_empty()
        });
    }

    pub async fn tracked_keys(&self) -> usize {
        self.windows.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{sleep, Duration as TokioDuration};

    fn limiter(window_ms: i64) -> RateLimiter {
        RateLimiter::new(RateLimitConfig {
            window_size: Duration::milliseconds(window_ms),
            max_requests: 5,
            auth_max_requests: 2,
        })
    }

    #[tokio::test]
    async fn test_rate_limiter() {
        let limiter = limiter(1000);

        for _ in 0..5 {
            assert!(limiter.check_rate_limit("10.0.0.1", Bucket::General).await);
        }
        assert!(!limiter.check_rate_limit("10.0.0.1", Bucket::General).await);

        // Other clients are unaffected
        assert!(limiter.check_rate_limit("10.0.0.2", Bucket::General).await);

        sleep(TokioDuration::from_millis(1100)).await;
        assert!(limiter.check_rate_limit("10.0.0.1", Bucket::General).await);
    }

    #[tokio::test]
    async fn test_auth_bucket_is_stricter_and_separate() {
        let limiter = limiter(60_000);

        assert!(limiter.check_rate_limit("10.0.0.1", Bucket::Auth).await);
        assert!(limiter.check_rate_limit("10.0.0.1", Bucket::Auth).await);
        assert!(!limiter.check_rate_limit("10.0.0.1", Bucket::Auth).await);

        assert!(limiter.check_rate_limit("10.0.0.1", Bucket::General).await);
    }

    #[tokio::test]
    async fn test_cleanup_drops_idle_keys() {
        let limiter = limiter(50);
        limiter.check_rate_limit("10.0.0.1", Bucket::General).await;
        assert_eq!(limiter.tracked_keys().await, 1);

        sleep(TokioDuration::from_millis(100)).await;
        limiter.cleanup().await;
        assert_eq!(limiter.tracked_keys().await, 0);
    }

    #[test]
    fn test_bucket_for_path() {
        assert_eq!(Bucket::for_path("/api/auth/login"), Bucket::Auth);
        assert_eq!(Bucket::for_path("/api/properties"), Bucket::General);
    }
}
