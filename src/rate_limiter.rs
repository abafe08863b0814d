// Rate limiting for calls to the telemetry collaborator
// Shared by all instrument workers

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Sliding-window rate limiter guarding the external market-data API.
pub struct RateLimiter {
    requests: Mutex<VecDeque<Instant>>,
    max_requests_per_sec: u32,
    min_interval_ms: u64,
}

impl RateLimiter {
    /// Create a new rate limiter with a 20% safety margin below the
    /// collaborator's advertised limit.
    pub fn new(max_requests_per_sec: u32) -> Self {
        let safety_factor = 0.8;
        let safe_limit = ((max_requests_per_sec as f64 * safety_factor) as u32).max(1);
        let min_interval_ms = 1000 / safe_limit as u64;

        Self {
            requests: Mutex::new(VecDeque::new()),
            max_requests_per_sec: safe_limit,
            min_interval_ms,
        }
    }

    /// Wait until a request slot is available.
    pub async fn wait_if_needed(&self) {
        loop {
            // The lock is confined to this synchronous block so the guard
            // never lives across an await and the future stays Send.
            let wait = {
                let mut requests = self
                    .requests
                    .lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner);
                let now = Instant::now();

                // Drop entries older than the one-second window
                let one_sec_ago = now.checked_sub(Duration::from_secs(1)).unwrap_or(now);
                while requests.front().map_or(false, |&t| t < one_sec_ago) {
                    requests.pop_front();
                }

                // Window full: wait for the oldest entry to age out
                let window_wait = if requests.len() >= self.max_requests_per_sec as usize {
                    requests
                        .front()
                        .map(|&oldest| {
                            (oldest + Duration::from_secs(1)).saturating_duration_since(now)
                        })
                        .filter(|w| !w.is_zero())
                } else {
                    None
                };

                // Enforce minimum spacing between consecutive requests
                let spacing_wait = requests
                    .back()
                    .map(|&last| {
                        Duration::from_millis(self.min_interval_ms)
                            .saturating_sub(now.duration_since(last))
                    })
                    .filter(|w| !w.is_zero());

                match window_wait.or(spacing_wait) {
                    Some(w) => Some(w),
                    None => {
                        requests.push_back(now);
                        None
                    }
                }
            };

            match wait {
                Some(w) => tokio::time::sleep(w).await,
                None => return,
            }
        }
    }
}
