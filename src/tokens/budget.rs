//! Token budget admission control.
//!
//! Tracks reserved tokens per model against a limit derived from the
//! model's published context window scaled by a safety ratio. This is an
//! advisory gate checked before dispatch, not something the backend enforces.
//!
//! One `BudgetManager` is constructed per job (or per process) and shared by
//! reference; nothing is global. Reset is explicit.

use crate::config::BudgetConfig;
use crate::error::{BudgetError, Result};
use crate::tokens::limits::{LimitTable, normalize_model};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::pin::pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Budget counters for one model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenBudget {
    /// Tokens currently reserved.
    pub used: usize,
    /// Maximum reservable tokens.
    pub limit: usize,
}

impl TokenBudget {
    /// Tokens still reservable.
    #[must_use]
    pub const fn available(&self) -> usize {
        self.limit.saturating_sub(self.used)
    }
}

/// Snapshot of a model's budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BudgetStatus {
    /// Tokens currently reserved.
    pub used: usize,
    /// Maximum reservable tokens.
    pub limit: usize,
    /// `limit - used`.
    pub available: usize,
}

impl From<TokenBudget> for BudgetStatus {
    fn from(budget: TokenBudget) -> Self {
        Self {
            used: budget.used,
            limit: budget.limit,
            available: budget.available(),
        }
    }
}

/// Per-model token budget tracker.
///
/// # Examples
///
/// ```
/// use chunkwise::tokens::BudgetManager;
///
/// let budgets = BudgetManager::default();
/// assert!(budgets.reserve(1_000, "gpt-4o"));
/// assert_eq!(budgets.status("gpt-4o").used, 1_000);
/// budgets.release(1_000, "gpt-4o");
/// assert_eq!(budgets.status("gpt-4o").used, 0);
/// ```
#[derive(Debug)]
pub struct BudgetManager {
    budgets: Mutex<HashMap<String, TokenBudget>>,
    windows: LimitTable<usize>,
    safety_ratio: f64,
    released: Notify,
}

impl Default for BudgetManager {
    fn default() -> Self {
        Self::new(&BudgetConfig::default())
    }
}

impl BudgetManager {
    /// Creates a budget manager from configuration.
    #[must_use]
    pub fn new(config: &BudgetConfig) -> Self {
        Self {
            budgets: Mutex::new(HashMap::new()),
            windows: LimitTable::context_windows(
                &config.context_windows,
                config.default_context_window,
            ),
            safety_ratio: config.safety_ratio,
            released: Notify::new(),
        }
    }

    /// Limit for `model`: context window scaled by the safety ratio.
    pub fn limit_for(&self, model: &str) -> usize {
        (self.windows.resolve(model) as f64 * self.safety_ratio).floor() as usize
    }

    fn budget_mut<'a>(
        &self,
        budgets: &'a mut HashMap<String, TokenBudget>,
        model: &str,
    ) -> &'a mut TokenBudget {
        budgets.entry(normalize_model(model)).or_insert_with(|| TokenBudget {
            used: 0,
            limit: self.limit_for(model),
        })
    }

    /// Reserves `tokens` for `model` iff the new total stays within the
    /// limit. On failure nothing is reserved.
    pub fn reserve(&self, tokens: usize, model: &str) -> bool {
        let mut budgets = self.budgets.lock();
        let budget = self.budget_mut(&mut budgets, model);
        let Some(next) = budget.used.checked_add(tokens) else {
            return false;
        };
        if next > budget.limit {
            warn!(
                model,
                used = budget.used,
                requested = tokens,
                limit = budget.limit,
                "insufficient token budget"
            );
            return false;
        }
        budget.used = next;
        debug!(model, reserved = tokens, used = budget.used, limit = budget.limit, "budget reserved");
        true
    }

    /// Releases `tokens` for `model`, clamped at zero.
    pub fn release(&self, tokens: usize, model: &str) {
        {
            let mut budgets = self.budgets.lock();
            if let Some(budget) = budgets.get_mut(&normalize_model(model)) {
                budget.used = budget.used.saturating_sub(tokens);
                debug!(model, released = tokens, used = budget.used, "budget released");
            }
        }
        self.released.notify_waiters();
    }

    /// Returns the budget snapshot for `model`.
    pub fn status(&self, model: &str) -> BudgetStatus {
        let budgets = self.budgets.lock();
        budgets.get(&normalize_model(model)).copied().map_or_else(
            || {
                let limit = self.limit_for(model);
                BudgetStatus {
                    used: 0,
                    limit,
                    available: limit,
                }
            },
            BudgetStatus::from,
        )
    }

    /// Zeroes usage for one model, or for all models when `model` is `None`.
    ///
    /// Call between independent jobs, never while reservations are live.
    pub fn reset(&self, model: Option<&str>) {
        let mut budgets = self.budgets.lock();
        match model {
            Some(model) => {
                if let Some(budget) = budgets.get_mut(&normalize_model(model)) {
                    budget.used = 0;
                }
            }
            None => budgets.clear(),
        }
        drop(budgets);
        info!(scope = model.unwrap_or("all models"), "token budget reset");
        self.released.notify_waiters();
    }

    /// Reserves and returns a guard that releases on drop.
    pub fn reserve_guard(self: &Arc<Self>, tokens: usize, model: &str) -> Option<BudgetReservation> {
        self.reserve(tokens, model).then(|| BudgetReservation {
            manager: Arc::clone(self),
            model: model.to_string(),
            tokens,
        })
    }

    /// Reserves `tokens`, waiting up to `max_wait` for other in-flight
    /// reservations to be released.
    ///
    /// # Errors
    ///
    /// Returns [`BudgetError::Exceeded`] if the request can never fit the
    /// limit or the wait elapses first.
    pub async fn acquire(
        self: &Arc<Self>,
        tokens: usize,
        model: &str,
        max_wait: Duration,
    ) -> Result<BudgetReservation> {
        let exceeded = |available| BudgetError::Exceeded {
            model: model.to_string(),
            requested: tokens,
            available,
        };

        let limit = self.status(model).limit;
        if tokens > limit {
            return Err(exceeded(limit).into());
        }

        let deadline = Instant::now() + max_wait;
        loop {
            let mut notified = pin!(self.released.notified());
            notified.as_mut().enable();

            if let Some(reservation) = self.reserve_guard(tokens, model) {
                return Ok(reservation);
            }

            debug!(model, tokens, "waiting for budget release");
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Err(exceeded(self.status(model).available).into());
            }
        }
    }
}

/// A live budget reservation. Released exactly once, on drop.
#[derive(Debug)]
pub struct BudgetReservation {
    manager: Arc<BudgetManager>,
    model: String,
    tokens: usize,
}

impl BudgetReservation {
    /// Reserved token count.
    #[must_use]
    pub const fn tokens(&self) -> usize {
        self.tokens
    }
}

impl Drop for BudgetReservation {
    fn drop(&mut self) {
        self.manager.release(self.tokens, &self.model);
    }
}
