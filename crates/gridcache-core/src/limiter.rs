//! Outbound request serialization: a rolling per-minute admission window,
//! a concurrency cap, and retry with exponential backoff.
//!
//! Submitted operations are single attempts - the limiter owns all retry
//! policy. Callers suspend until a terminal outcome; nothing here blocks
//! an OS thread.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};

use rand::Rng;
use tokio::sync::{Mutex, Semaphore};
use tokio::time::{sleep, Duration, Instant};
use tracing::{debug, warn};

use crate::error::DataError;

// ============================================================================
// Constants
// ============================================================================

/// Length of the rolling admission window.
const RATE_WINDOW: Duration = Duration::from_secs(60);

/// Requests admitted per rolling window.
/// 30/min stays comfortably inside the upstream's free-tier quota.
const MAX_REQUESTS_PER_WINDOW: usize = 30;

/// Maximum concurrently executing requests.
/// 4 keeps mobile radios busy without stampeding the upstream.
const MAX_CONCURRENT_REQUESTS: usize = 4;

/// Total attempts per submission (1 initial + 3 retries).
const MAX_ATTEMPTS: u32 = 4;

/// Initial backoff delay in milliseconds.
/// 1 second is polite to the server while not making users wait too long.
const BASE_BACKOFF_MS: u64 = 1000;

/// Backoff ceiling in milliseconds.
const MAX_BACKOFF_MS: u64 = 30_000;

/// Jitter applied to every backoff sleep (plus or minus 10%).
const JITTER_FRACTION: f64 = 0.1;

/// Scheduling weight for a submission.
///
/// Lower priorities pay a fixed penalty on every contended-window
/// recheck, giving foreground requests a statistical edge on scarce
/// admission slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    /// Foreground reads the user is waiting on.
    High,
    /// Searches and listings.
    Normal,
    /// Background refresh and sync traffic.
    Low,
}

impl Priority {
    fn admission_penalty(&self) -> Duration {
        match self {
            Priority::High => Duration::ZERO,
            Priority::Normal => Duration::from_millis(25),
            Priority::Low => Duration::from_millis(100),
        }
    }
}

/// Tunables for the limiter; defaults match the constants above.
#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    pub max_per_window: usize,
    pub max_concurrent: usize,
    pub max_attempts: u32,
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            max_per_window: MAX_REQUESTS_PER_WINDOW,
            max_concurrent: MAX_CONCURRENT_REQUESTS,
            max_attempts: MAX_ATTEMPTS,
            base_backoff_ms: BASE_BACKOFF_MS,
            max_backoff_ms: MAX_BACKOFF_MS,
        }
    }
}

/// Admission control plus retry queue for all outbound requests.
pub struct RateLimiter {
    config: RateLimiterConfig,
    /// Admission timestamps inside the rolling window.
    window: Mutex<VecDeque<Instant>>,
    /// Execution slots, independent of window admission.
    slots: Semaphore,
    /// Current backoff delay per request id. Reset on success, cleared
    /// when the queue drains.
    backoff: Mutex<HashMap<String, u64>>,
    /// Submissions currently somewhere between admission and outcome.
    active: AtomicUsize,
}

impl RateLimiter {
    pub fn new(config: RateLimiterConfig) -> Self {
        let slots = Semaphore::new(config.max_concurrent);
        Self {
            config,
            window: Mutex::new(VecDeque::new()),
            slots,
            backoff: Mutex::new(HashMap::new()),
            active: AtomicUsize::new(0),
        }
    }

    /// Run `operation` under admission control, retrying retryable
    /// failures with exponential backoff until success, a terminal
    /// failure, or attempt exhaustion. The most recent error is
    /// surfaced verbatim.
    pub async fn submit<T, F, Fut>(
        &self,
        request_id: &str,
        priority: Priority,
        operation: F,
    ) -> Result<T, DataError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, DataError>>,
    {
        self.active.fetch_add(1, Ordering::SeqCst);
        let result = self.run(request_id, priority, operation).await;
        // Last submission out clears accumulated backoff state
        if self.active.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.backoff.lock().await.clear();
        }
        result
    }

    async fn run<T, F, Fut>(
        &self,
        request_id: &str,
        priority: Priority,
        operation: F,
    ) -> Result<T, DataError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, DataError>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            self.admit(priority).await;

            let outcome = {
                let _slot = self
                    .slots
                    .acquire()
                    .await
                    .map_err(|_| DataError::Server("request slot pool closed".to_string()))?;
                operation().await
            };

            match outcome {
                Ok(value) => {
                    self.backoff.lock().await.remove(request_id);
                    return Ok(value);
                }
                Err(err) if err.is_retryable() && attempt < self.config.max_attempts => {
                    let delay_ms = self.next_backoff(request_id).await;
                    warn!(
                        request_id,
                        attempt,
                        delay_ms,
                        error = %err,
                        "Request failed, backing off"
                    );
                    sleep(Duration::from_millis(jittered(delay_ms))).await;
                }
                Err(err) => {
                    if err.is_retryable() {
                        warn!(request_id, attempt, error = %err, "Retries exhausted");
                    } else {
                        debug!(request_id, error = %err, "Terminal failure, not retrying");
                    }
                    return Err(err);
                }
            }
        }
    }

    /// Wait for a slot in the rolling window, then record the admission.
    /// The window lock is never held across a sleep.
    async fn admit(&self, priority: Priority) {
        loop {
            let wait = {
                let mut window = self.window.lock().await;
                let now = Instant::now();
                while window
                    .front()
                    .is_some_and(|t| now.duration_since(*t) >= RATE_WINDOW)
                {
                    window.pop_front();
                }

                if window.len() < self.config.max_per_window {
                    window.push_back(now);
                    return;
                }

                match window.front() {
                    Some(oldest) => RATE_WINDOW.saturating_sub(now.duration_since(*oldest)),
                    None => Duration::ZERO,
                }
            };

            sleep(wait + priority.admission_penalty()).await;
        }
    }

    /// Escalate and return the backoff delay for this request id.
    async fn next_backoff(&self, request_id: &str) -> u64 {
        let mut backoff = self.backoff.lock().await;
        let delay = backoff
            .entry(request_id.to_string())
            .and_modify(|d| *d = (*d * 2).min(self.config.max_backoff_ms))
            .or_insert(self.config.base_backoff_ms);
        *delay
    }

    #[cfg(test)]
    async fn backoff_state_len(&self) -> usize {
        self.backoff.lock().await.len()
    }
}

fn jittered(delay_ms: u64) -> u64 {
    let factor = rand::thread_rng().gen_range(1.0 - JITTER_FRACTION..=1.0 + JITTER_FRACTION);
    (delay_ms as f64 * factor) as u64
}

// ============================================================================
// Tests
// ============================================================================
