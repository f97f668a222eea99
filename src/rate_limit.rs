//! Sliding-window rate limiting
//!
//! Counters are keyed by `(endpoint, client_id)`. `check` only inspects;
//! `record` appends a timestamp. The handler checks before doing any
//! work and records after schema validation, so malformed or abusive
//! traffic never reaches the crypto path for free.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;
use tokio::task::JoinHandle;
use tracing::debug;

/// Default request cap per window
pub const DEFAULT_MAX_REQUESTS: u32 = 10;

/// Default window length in seconds
pub const DEFAULT_WINDOW_SECS: u64 = 60;

/// Window parameters
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Requests allowed per window per key
    pub max_requests: u32,
    /// Window length
    pub window: StdDuration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: DEFAULT_MAX_REQUESTS,
            window: StdDuration::from_secs(DEFAULT_WINDOW_SECS),
        }
    }
}

type HitLog = HashMap<(String, String), Vec<DateTime<Utc>>>;

/// Sliding-window limiter with periodic compaction
pub struct SlidingWindowLimiter {
    config: RateLimitConfig,
    hits: Arc<Mutex<HitLog>>,
    compaction: Mutex<Option<JoinHandle<()>>>,
}

impl SlidingWindowLimiter {
    /// Create a limiter and start its compaction task. Must be called
    /// from within a tokio runtime.
    pub fn new(config: RateLimitConfig) -> Self {
        let hits: Arc<Mutex<HitLog>> = Arc::new(Mutex::new(HashMap::new()));
        let window = Duration::seconds(config.window.as_secs() as i64);

        let sweep_hits = Arc::clone(&hits);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(StdDuration::from_secs(DEFAULT_WINDOW_SECS));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let removed = compact_log(&sweep_hits, window);
                if removed > 0 {
                    debug!(removed, "compacted rate-limit keys");
                }
            }
        });

        Self {
            config,
            hits,
            compaction: Mutex::new(Some(handle)),
        }
    }

    /// Would another request from this client on this endpoint be
    /// allowed right now? Does not mutate any counter.
    pub fn check(&self, endpoint: &str, client_id: &str) -> bool {
        let cutoff = self.cutoff();
        let hits = self.hits.lock().expect("rate-limit lock poisoned");
        match hits.get(&(endpoint.to_string(), client_id.to_string())) {
            Some(timestamps) => {
                let recent = timestamps.iter().filter(|t| **t > cutoff).count();
                recent < self.config.max_requests as usize
            }
            None => true,
        }
    }

    /// Record one request for this client and endpoint.
    pub fn record(&self, endpoint: &str, client_id: &str) {
        let mut hits = self.hits.lock().expect("rate-limit lock poisoned");
        hits.entry((endpoint.to_string(), client_id.to_string()))
            .or_default()
            .push(Utc::now());
    }

    /// Drop keys whose samples all fell out of the window; returns how
    /// many keys were removed.
    pub fn compact(&self) -> usize {
        compact_log(&self.hits, self.window())
    }

    /// Stop the compaction task and clear all counters.
    pub fn dispose(&self) {
        if let Some(handle) = self
            .compaction
            .lock()
            .expect("rate-limit lock poisoned")
            .take()
        {
            handle.abort();
        }
        self.hits.lock().expect("rate-limit lock poisoned").clear();
    }

    fn window(&self) -> Duration {
        Duration::seconds(self.config.window.as_secs() as i64)
    }

    fn cutoff(&self) -> DateTime<Utc> {
        Utc::now() - self.window()
    }
}

fn compact_log(hits: &Mutex<HitLog>, window: Duration) -> usize {
    let cutoff = Utc::now() - window;
    let mut hits = hits.lock().expect("rate-limit lock poisoned");
    let before = hits.len();
    hits.retain(|_, timestamps| {
        timestamps.retain(|t| *t > cutoff);
        !timestamps.is_empty()
    });
    before - hits.len()
}

impl Drop for SlidingWindowLimiter {
    fn drop(&mut self) {
        if let Some(handle) = self
            .compaction
            .lock()
            .expect("rate-limit lock poisoned")
            .take()
        {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(max_requests: u32) -> SlidingWindowLimiter {
        SlidingWindowLimiter::new(RateLimitConfig {
            max_requests,
            window: StdDuration::from_secs(60),
        })
    }

    #[tokio::test]
    async fn test_allows_up_to_cap() {
        let limiter = limiter(3);
        for _ in 0..3 {
            assert!(limiter.check("verify", "client-a"));
            limiter.record("verify", "client-a");
        }
        assert!(!limiter.check("verify", "client-a"));
        limiter.dispose();
    }

    #[tokio::test]
    async fn test_check_does_not_mutate() {
        let limiter = limiter(2);
        for _ in 0..10 {
            assert!(limiter.check("challenge", "client-a"));
        }
        limiter.record("challenge", "client-a");
        assert!(limiter.check("challenge", "client-a"));
        limiter.dispose();
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let limiter = limiter(1);
        limiter.record("verify", "client-a");
        assert!(!limiter.check("verify", "client-a"));
        assert!(limiter.check("verify", "client-b"));
        assert!(limiter.check("challenge", "client-a"));
        limiter.dispose();
    }

    #[tokio::test]
    async fn test_compact_drops_stale_keys() {
        let limiter = SlidingWindowLimiter::new(RateLimitConfig {
            max_requests: 5,
            window: StdDuration::ZERO,
        });
        limiter.record("verify", "client-a");
        // With a zero-length window every sample is already stale.
        assert_eq!(limiter.compact(), 1);
        assert!(limiter.check("verify", "client-a"));
        limiter.dispose();
    }
}
