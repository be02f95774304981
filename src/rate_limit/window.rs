//! Sliding usage window.

use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

/// One dispatched unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsageSample {
    /// Dispatch time.
    pub at: Instant,
    /// Tokens consumed.
    pub tokens: u64,
}

/// Samples of one model within the trailing window, oldest first.
#[derive(Debug, Default)]
pub struct UsageWindow {
    samples: VecDeque<UsageSample>,
    total: u64,
}

impl UsageWindow {
    /// Drops samples at least `window` old.
    pub fn purge(&mut self, now: Instant, window: Duration) {
        while let Some(oldest) = self.samples.front() {
            if now.saturating_duration_since(oldest.at) < window {
                break;
            }
            self.total -= oldest.tokens;
            self.samples.pop_front();
        }
    }

    /// Appends a sample. Timestamps are expected to be non-decreasing.
    pub fn push(&mut self, sample: UsageSample) {
        self.total += sample.tokens;
        self.samples.push_back(sample);
    }

    /// Sum of tokens in the window (as of the last purge).
    pub const fn total(&self) -> u64 {
        self.total
    }

    /// Whether no samples remain.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Time until the oldest sample leaves the window.
    pub fn until_oldest_expires(&self, now: Instant, window: Duration) -> Option<Duration> {
        self.samples
            .front()
            .map(|oldest| (oldest.at + window).saturating_duration_since(now))
    }
}
