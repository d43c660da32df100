//! Per-user sliding-window rate limiting for `/chat`.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Process-wide sliding-window limiter.
pub struct ChatRateLimiter {
    max_requests: usize,
    window: Duration,
    requests: Mutex<HashMap<String, Vec<Instant>>>,
}

impl ChatRateLimiter {
    pub fn new(max_requests: usize, window_seconds: u64) -> Self {
        Self {
            max_requests: max_requests.max(1),
            window: Duration::from_secs(window_seconds),
            requests: Mutex::new(HashMap::new()),
        }
    }

    /// Admits or refuses a request; refusals return the retry-after delay.
    ///
    /// Admitted requests are recorded immediately, so more than
    /// `max_requests` admissions can never fall inside one window.
    pub fn check(&self, user_id: &str) -> Result<(), Duration> {
        let now = Instant::now();
        let mut requests = self.requests.lock();
        let entry = requests.entry(user_id.to_string()).or_default();

        entry.retain(|t| now.duration_since(*t) < self.window);

        if entry.len() >= self.max_requests {
            // The oldest recorded request opens the next slot.
            let oldest = entry.iter().min().copied().unwrap_or(now);
            let retry_after = self.window.saturating_sub(now.duration_since(oldest));
            return Err(retry_after);
        }

        entry.push(now);
        Ok(())
    }
}
