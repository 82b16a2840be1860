use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{debug, instrument};

use crate::error::Result;

/// Token bucket shared by every E-utilities call made through one client.
///
/// NCBI allows 3 requests/second without an API key and 10 with one;
/// exceeding that gets the caller's IP throttled or blocked.
#[derive(Clone)]
pub struct RateLimiter {
    bucket: Arc<Mutex<Bucket>>,
}

struct Bucket {
    tokens: f64,
    capacity: f64,
    per_second: f64,
    updated_at: Instant,
}

impl Bucket {
    fn top_up(&mut self) {
        let now = Instant::now();
        let gained = now.duration_since(self.updated_at).as_secs_f64() * self.per_second;
        self.tokens = (self.tokens + gained).min(self.capacity);
        self.updated_at = now;
    }

    fn try_take(&mut self) -> bool {
        self.top_up();
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

impl RateLimiter {
    /// Limiter allowing `per_second` requests, with a burst of the same size (at least 1)
    pub fn new(per_second: f64) -> Self {
        let per_second = per_second.max(f64::MIN_POSITIVE);
        let capacity = per_second.max(1.0);
        Self {
            bucket: Arc::new(Mutex::new(Bucket {
                tokens: capacity,
                capacity,
                per_second,
                updated_at: Instant::now(),
            })),
        }
    }

    /// 3 requests/second, the anonymous E-utilities allowance
    pub fn ncbi_default() -> Self {
        Self::new(3.0)
    }

    /// 10 requests/second, the allowance with an API key
    pub fn ncbi_with_key() -> Self {
        Self::new(10.0)
    }

    /// Wait until a token is available and take it.
    ///
    /// Never fails: callers that lose a refilled token to another task go
    /// back to waiting. The lock is not held while sleeping.
    #[instrument(skip(self))]
    pub async fn acquire(&self) -> Result<()> {
        loop {
            let wait = {
                let mut bucket = self.bucket.lock().await;
                if bucket.try_take() {
                    debug!(remaining = bucket.tokens, "Token acquired");
                    return Ok(());
                }
                let missing = (1.0 - bucket.tokens).max(0.0);
                Duration::from_secs_f64(missing / bucket.per_second)
                    .max(Duration::from_millis(1))
            };

            debug!(wait_ms = wait.as_millis() as u64, "Waiting for rate limit token");
            sleep(wait).await;
        }
    }

    /// `true` if a token could be taken right now (does not take it)
    pub async fn check_available(&self) -> bool {
        let mut bucket = self.bucket.lock().await;
        bucket.top_up();
        bucket.tokens >= 1.0
    }

    pub async fn token_count(&self) -> f64 {
        let mut bucket = self.bucket.lock().await;
        bucket.top_up();
        bucket.tokens
    }

    /// Configured requests per second
    pub async fn rate(&self) -> f64 {
        self.bucket.lock().await.per_second
    }
}
