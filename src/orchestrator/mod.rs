//! Map phase.
//!
//! The orchestrator decides whether a document needs splitting under the
//! stage's effective budget, chunks it when it does, dispatches every chunk
//! to a caller-supplied [`ChunkHandler`] through a bounded worker pool, and
//! returns the successful partial results with a [`ChunkingAudit`].
//!
//! ```text
//! text ─► estimate ─► fits? ─yes─► single chunk ─┐
//!                       │                        ├─► pool ─► partial results
//!                       └─no──► semantic chunker ┘     (budget + rate gated)
//! ```

pub mod audit;
pub mod handler;
pub mod pool;

pub use audit::ChunkingAudit;
pub use handler::{ChunkHandler, FnHandler, handler_fn};
pub use pool::{DispatchContext, PoolReport, dispatch};

use crate::chunking::{ChunkPlan, ChunkingReason, CoverageReport, SectionMarkers, SemanticChunker};
use crate::config::{ChunkingConfig, Config, DispatchConfig};
use crate::core::Chunk;
use crate::error::{ChunkingError, DispatchError, Result};
use crate::rate_limit::RateLimiter;
use crate::reconcile::{MergedResult, Reconcile, reconcile};
use crate::tokens::{BudgetManager, TokenEstimator};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Successful partial results of a map phase, in chunk order.
#[derive(Debug)]
pub struct MapOutcome<R> {
    /// Handler outputs of the chunks that succeeded.
    pub results: Vec<R>,
    /// Coverage and usage audit.
    pub audit: ChunkingAudit,
}

/// How a document will be dispatched.
#[derive(Debug, Clone)]
pub struct DispatchPlan {
    /// Chunks and their coverage.
    pub plan: ChunkPlan,
    /// Per-chunk token budget the chunker ran with.
    pub effective_max_tokens: usize,
}

/// Drives the map phase for one stage.
///
/// Budget and rate-limit services are injected so several orchestrators
/// (or several jobs) can share, or deliberately isolate, their counters.
#[derive(Debug, Clone)]
pub struct ChunkOrchestrator {
    estimator: TokenEstimator,
    budgets: Arc<BudgetManager>,
    limiter: Arc<RateLimiter>,
    chunking: ChunkingConfig,
    dispatch: DispatchConfig,
    markers: Option<SectionMarkers>,
}

impl ChunkOrchestrator {
    /// Creates an orchestrator with its own budget and rate-limit services.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `config` is invalid and a tokenizer
    /// error if the BPE tables fail to load.
    pub fn new(config: &Config) -> Result<Self> {
        Self::with_services(
            config,
            Arc::new(BudgetManager::new(&config.budget)),
            Arc::new(RateLimiter::new(&config.rate_limit)),
        )
    }

    /// Creates an orchestrator over shared services.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `config` is invalid and a tokenizer
    /// error if the BPE tables fail to load.
    pub fn with_services(
        config: &Config,
        budgets: Arc<BudgetManager>,
        limiter: Arc<RateLimiter>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            estimator: TokenEstimator::new()?,
            budgets,
            limiter,
            chunking: config.chunking.clone(),
            dispatch: config.dispatch.clone(),
            markers: None,
        })
    }

    /// Labels chunks with the sections recognized by `markers`.
    #[must_use]
    pub fn with_sections(mut self, markers: SectionMarkers) -> Self {
        self.markers = Some(markers);
        self
    }

    /// Budget service.
    pub const fn budgets(&self) -> &Arc<BudgetManager> {
        &self.budgets
    }

    /// Rate-limit service.
    pub const fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Decides how `text` will be dispatched when sent alongside
    /// `fixed_context_tokens` of surrounding context.
    ///
    /// # Errors
    ///
    /// Returns [`ChunkingError::OverlapTooLarge`] when the fixed context and
    /// response reserve leave no more than the overlap for each chunk.
    pub fn plan(&self, text: &str, model: &str, fixed_context_tokens: usize) -> Result<DispatchPlan> {
        let max_tokens = self.chunking.max_tokens;
        let overlap_tokens = self.chunking.overlap_tokens;
        let total_tokens = self.estimator.estimate(text, model);
        let total_chars = text.chars().count();

        let single = |reason: ChunkingReason| {
            let chunks = if text.is_empty() {
                Vec::new()
            } else {
                vec![Chunk::whole(text, total_tokens).with_section(self.leading_section(text))]
            };
            let coverage = CoverageReport::unsplit(
                reason,
                &chunks,
                total_tokens,
                total_chars,
                max_tokens,
                overlap_tokens,
            );
            DispatchPlan {
                plan: ChunkPlan { chunks, coverage },
                effective_max_tokens: max_tokens,
            }
        };

        if text.is_empty() {
            return Ok(single(ChunkingReason::EmptyInput));
        }
        if !self.chunking.enabled {
            info!(model, total_tokens, "chunking disabled, single pass");
            return Ok(single(ChunkingReason::ChunkingDisabled));
        }
        if total_tokens + fixed_context_tokens <= max_tokens {
            info!(model, total_tokens, fixed_context_tokens, max_tokens, "document fits, single pass");
            return Ok(single(ChunkingReason::FitsSingleContext));
        }

        let effective_max_tokens = max_tokens
            .saturating_sub(fixed_context_tokens)
            .saturating_sub(self.dispatch.response_reserve_tokens);
        if effective_max_tokens <= overlap_tokens {
            return Err(ChunkingError::OverlapTooLarge {
                overlap: overlap_tokens,
                max: effective_max_tokens,
            }
            .into());
        }

        info!(
            model,
            total_tokens,
            fixed_context_tokens,
            max_tokens,
            effective_max_tokens,
            "document exceeds context, chunking"
        );

        let mut chunker = SemanticChunker::new(self.estimator, effective_max_tokens, overlap_tokens)?;
        if let Some(markers) = &self.markers {
            chunker = chunker.with_sections(markers.clone());
        }
        Ok(DispatchPlan {
            plan: chunker.chunk_with_coverage(text, model),
            effective_max_tokens,
        })
    }

    fn leading_section(&self, text: &str) -> Option<String> {
        self.markers
            .as_ref()
            .and_then(|m| m.split(text).into_iter().next())
            .map(|s| s.label)
    }

    /// Runs the map phase of `text` through `handler`.
    ///
    /// Failed chunks are logged, counted in the audit and skipped.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::NoChunkSucceeded`] when the document is empty
    /// or every chunk failed, [`crate::error::BudgetError::Exceeded`] when a
    /// chunk cannot obtain budget (retry the job later), and any planning
    /// error from [`Self::plan`].
    pub async fn run<H: ChunkHandler>(
        &self,
        text: &str,
        model: &str,
        fixed_context_tokens: usize,
        handler: Arc<H>,
    ) -> Result<MapOutcome<H::Output>> {
        let DispatchPlan {
            plan,
            effective_max_tokens,
        } = self.plan(text, model, fixed_context_tokens)?;

        let mut audit =
            ChunkingAudit::from_coverage(plan.coverage, model, self.chunking.min_coverage_ratio);
        audit.max_tokens = self.chunking.max_tokens;
        audit.effective_max_tokens = effective_max_tokens;
        audit.fixed_context_tokens = fixed_context_tokens;
        audit.workers = self.dispatch.workers;

        let attempted = plan.chunks.len();
        if attempted == 0 {
            error!(model, "nothing to dispatch");
            return Err(DispatchError::NoChunkSucceeded {
                attempted,
                last_error: "document is empty".to_string(),
            }
            .into());
        }

        if audit.applied && !audit.coverage_gate_passed {
            warn!(
                model,
                coverage_chars = audit.coverage_ratio_chars,
                coverage_tokens = audit.coverage_ratio_tokens,
                min = audit.min_coverage_ratio,
                "chunk coverage below minimum"
            );
        }

        let ctx = DispatchContext {
            budgets: Arc::clone(&self.budgets),
            limiter: Arc::clone(&self.limiter),
            model: Arc::from(model),
            fixed_context_tokens,
            budget_wait: self.dispatch.budget_wait_timeout(),
        };
        let report = dispatch(handler, plan.chunks, self.dispatch.workers, ctx).await?;

        audit.chunks_succeeded = report.succeeded.len();
        audit.chunks_failed = report.failed.len();
        audit.failed_chunks = report.failed.iter().map(|(index, _)| *index).collect();

        if report.succeeded.is_empty() {
            let last_error = report
                .failed
                .last()
                .map(|(_, message)| message.clone())
                .unwrap_or_default();
            error!(model, attempted, error = %last_error, "every chunk failed");
            return Err(DispatchError::NoChunkSucceeded {
                attempted,
                last_error,
            }
            .into());
        }

        info!(
            model,
            chunks = attempted,
            succeeded = audit.chunks_succeeded,
            failed = audit.chunks_failed,
            "map phase complete"
        );

        Ok(MapOutcome {
            results: report.succeeded.into_iter().map(|(_, value)| value).collect(),
            audit,
        })
    }

    /// Runs the map phase and reconciles the partial results.
    ///
    /// # Errors
    ///
    /// Any error of [`Self::run`].
    pub async fn run_and_reconcile<H>(
        &self,
        text: &str,
        model: &str,
        fixed_context_tokens: usize,
        handler: Arc<H>,
    ) -> Result<(MergedResult<H::Output>, ChunkingAudit)>
    where
        H: ChunkHandler,
        H::Output: Reconcile,
    {
        let outcome = self.run(text, model, fixed_context_tokens, handler).await?;
        let merged = reconcile(outcome.results)?;
        Ok((merged, outcome.audit))
    }
}
