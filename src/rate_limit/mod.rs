//! Sliding-window rate limiting.
//!
//! Tracks tokens dispatched per model over a trailing window (60 seconds by
//! default) and admits new work only while usage stays under a fraction of
//! the model's tokens-per-minute quota. Nearing the quota is never an error;
//! callers wait for [`RateLimiter::wait_time`] and re-check.

pub mod window;

pub use window::{UsageSample, UsageWindow};

use crate::config::RateLimitConfig;
use crate::tokens::limits::{LimitTable, normalize_model};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Lower bound on a single backoff sleep.
const MIN_BACKOFF: Duration = Duration::from_millis(10);

/// Outcome of an atomic admission attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The request was admitted and recorded.
    Granted,
    /// Usage is near the quota; re-check after the advisory wait.
    Wait(Duration),
}

/// Snapshot of a model's rate-limit usage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RateLimitStatus {
    /// Tokens dispatched within the window.
    pub current: u64,
    /// Tokens-per-minute quota.
    pub limit: u64,
    /// Usage above which new work waits.
    pub threshold: u64,
    /// `limit - current`, floored at zero.
    pub available: u64,
    /// `current / limit` as a percentage, one decimal.
    pub utilization_pct: f64,
}

/// Per-model sliding-window throughput tracker.
///
/// Shared by reference between workers; all state sits behind one mutex so
/// that check-and-record is atomic.
///
/// # Examples
///
/// ```
/// use chunkwise::rate_limit::RateLimiter;
///
/// let limiter = RateLimiter::default();
/// assert!(limiter.can_proceed("gpt-4o", 1_000));
/// limiter.record("gpt-4o", 27_000);
/// assert!(!limiter.can_proceed("gpt-4o", 1));
/// ```
#[derive(Debug)]
pub struct RateLimiter {
    windows: Mutex<HashMap<String, UsageWindow>>,
    limits: LimitTable<u64>,
    window: Duration,
    threshold_ratio: f64,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(&RateLimitConfig::default())
    }
}

impl RateLimiter {
    /// Creates a rate limiter from configuration.
    #[must_use]
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
            limits: LimitTable::tpm(&config.tpm_per_model, config.default_tpm),
            window: config.window(),
            threshold_ratio: config.threshold_ratio,
        }
    }

    /// Tokens-per-minute quota for `model`.
    pub fn limit_for(&self, model: &str) -> u64 {
        self.limits.resolve(model)
    }

    fn threshold_for(&self, model: &str) -> u64 {
        (self.limit_for(model) as f64 * self.threshold_ratio).floor() as u64
    }

    /// Runs `f` on the purged window of `model`.
    fn with_window<R>(&self, model: &str, f: impl FnOnce(&mut UsageWindow, Instant) -> R) -> R {
        let now = Instant::now();
        let mut windows = self.windows.lock();
        let usage = windows.entry(normalize_model(model)).or_default();
        usage.purge(now, self.window);
        f(usage, now)
    }

    /// Tokens dispatched for `model` within the trailing window.
    pub fn current_usage(&self, model: &str) -> u64 {
        self.with_window(model, |usage, _| usage.total())
    }

    /// Whether `tokens` more can be dispatched without crossing the
    /// threshold.
    pub fn can_proceed(&self, model: &str, tokens: usize) -> bool {
        let threshold = self.threshold_for(model);
        self.with_window(model, |usage, _| usage.total() + tokens as u64 <= threshold)
    }

    /// Advisory wait before `tokens` could proceed: zero when it already can,
    /// otherwise the time until the oldest sample leaves the window.
    pub fn wait_time(&self, model: &str, tokens: usize) -> Duration {
        let threshold = self.threshold_for(model);
        let window = self.window;
        self.with_window(model, |usage, now| {
            if usage.total() + tokens as u64 <= threshold {
                return Duration::ZERO;
            }
            usage.until_oldest_expires(now, window).unwrap_or(Duration::ZERO)
        })
    }

    /// Records one dispatched unit of work.
    pub fn record(&self, model: &str, tokens: usize) {
        self.with_window(model, |usage, now| {
            usage.push(UsageSample {
                at: now,
                tokens: tokens as u64,
            });
            debug!(model, tokens, window_total = usage.total(), "rate usage recorded");
        });
    }

    /// Admission decision for `tokens` against a purged window.
    ///
    /// A request larger than the threshold on its own is admitted into an
    /// empty window; otherwise it could never proceed.
    fn admission(&self, usage: &UsageWindow, now: Instant, threshold: u64, tokens: usize) -> Admission {
        if usage.is_empty() || usage.total() + tokens as u64 <= threshold {
            return Admission::Granted;
        }
        let wait = usage
            .until_oldest_expires(now, self.window)
            .unwrap_or(Duration::ZERO)
            .max(MIN_BACKOFF);
        Admission::Wait(wait)
    }

    /// Checks and records under one lock.
    pub fn try_acquire(&self, model: &str, tokens: usize) -> Admission {
        let threshold = self.threshold_for(model);
        self.with_window(model, |usage, now| {
            let admission = self.admission(usage, now, threshold, tokens);
            if admission == Admission::Granted {
                usage.push(UsageSample {
                    at: now,
                    tokens: tokens as u64,
                });
            }
            admission
        })
    }

    /// Waits until `tokens` are admitted for `model`, then records them.
    ///
    /// Only the calling task sleeps. Dropping the future abandons the wait
    /// without recording anything.
    pub async fn acquire(&self, model: &str, tokens: usize) {
        while let Admission::Wait(wait) = self.try_acquire(model, tokens) {
            backoff(model, tokens, wait).await;
        }
    }

    /// Waits until `tokens` would be admitted for `model` without recording
    /// them.
    ///
    /// Another task may take the capacity before the caller does, so a
    /// following [`try_acquire`](Self::try_acquire) can still ask to wait.
    pub async fn wait_for_capacity(&self, model: &str, tokens: usize) {
        let threshold = self.threshold_for(model);
        loop {
            let admission = self.with_window(model, |usage, now| self.admission(usage, now, threshold, tokens));
            match admission {
                Admission::Granted => return,
                Admission::Wait(wait) => backoff(model, tokens, wait).await,
            }
        }
    }

    /// Usage snapshot for `model`.
    pub fn status(&self, model: &str) -> RateLimitStatus {
        let limit = self.limit_for(model);
        let threshold = self.threshold_for(model);
        let current = self.current_usage(model);
        let utilization_pct = if limit == 0 {
            0.0
        } else {
            (current as f64 / limit as f64 * 1_000.0).round() / 10.0
        };
        RateLimitStatus {
            current,
            limit,
            threshold,
            available: limit.saturating_sub(current),
            utilization_pct,
        }
    }

    /// Forgets all samples for `model`, or for every model.
    pub fn reset(&self, model: Option<&str>) {
        let mut windows = self.windows.lock();
        match model {
            Some(model) => {
                windows.remove(&normalize_model(model));
            }
            None => windows.clear(),
        }
    }
}

async fn backoff(model: &str, tokens: usize, wait: Duration) {
    warn!(
        model,
        tokens,
        wait_ms = wait.as_millis() as u64,
        "rate limit threshold reached, waiting"
    );
    tokio::time::sleep(wait).await;
}
