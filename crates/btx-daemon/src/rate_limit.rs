//! An in-memory map of key→timestamps, pruned per request (§5, §6). Two
//! independent limiters share this shape: a general one keyed by
//! token-or-address, and a stricter one keyed by user id for strategy runs.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

pub struct RateLimiter {
    window: Duration,
    max_calls: u32,
    hits: Mutex<HashMap<String, Vec<Instant>>>,
}

impl RateLimiter {
    pub fn new(window: Duration, max_calls: u32) -> Self {
        Self { window, max_calls, hits: Mutex::new(HashMap::new()) }
    }

    /// Prunes timestamps older than the window, then admits the call if
    /// under `max_calls`, recording it. Returns `false` on a breach; the
    /// caller does not queue, it rejects immediately (§5 "Cancellation and
    /// timeouts").
    pub fn check(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut hits = self.hits.lock().unwrap();
        let times = hits.entry(key.to_string()).or_default();
        times.retain(|t| now.duration_since(*t) < self.window);
        if times.len() as u32 >= self.max_calls {
            return false;
        }
        times.push(now);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admits_up_to_max_calls_then_rejects() {
        let limiter = RateLimiter::new(Duration::from_secs(60), 2);
        assert!(limiter.check("a"));
        assert!(limiter.check("a"));
        assert!(!limiter.check("a"));
    }

    #[test]
    fn different_keys_have_independent_budgets() {
        let limiter = RateLimiter::new(Duration::from_secs(60), 1);
        assert!(limiter.check("a"));
        assert!(limiter.check("b"));
    }
}
