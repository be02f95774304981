//! Bounded worker pool for chunk jobs.
//!
//! Jobs flow through a channel whose capacity equals the worker count, so at
//! most `workers` chunks are in flight and the feeder blocks once the queue
//! is full. Each job waits for rate-limit capacity, reserves budget, records
//! its rate usage, runs the handler, and releases its reservation on every
//! exit path. No reservation is held while a job waits on the rate limit.

use crate::core::Chunk;
use crate::error::{BudgetError, DispatchError, Error, Result};
use crate::orchestrator::handler::ChunkHandler;
use crate::rate_limit::{Admission, RateLimiter};
use crate::tokens::BudgetManager;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// Shared services and limits for one dispatch.
#[derive(Debug, Clone)]
pub struct DispatchContext {
    /// Budget admission.
    pub budgets: Arc<BudgetManager>,
    /// Throughput admission.
    pub limiter: Arc<RateLimiter>,
    /// Target model.
    pub model: Arc<str>,
    /// Fixed context sent alongside every chunk.
    pub fixed_context_tokens: usize,
    /// Maximum wait for budget before the job is abandoned.
    pub budget_wait: Duration,
}

/// Results of a dispatch, ordered by chunk index.
#[derive(Debug)]
pub struct PoolReport<R> {
    /// Successful outputs with their chunk index.
    pub succeeded: Vec<(usize, R)>,
    /// Failed chunk indices with the handler's error message.
    pub failed: Vec<(usize, String)>,
}

enum JobError {
    Handler(String),
    Budget(BudgetError),
}

/// Dispatches `chunks` to `handler` on `workers` concurrent workers.
///
/// Handler failures are collected, not propagated.
///
/// # Errors
///
/// Returns [`BudgetError::Exceeded`] (remaining jobs are abandoned) when a
/// chunk cannot obtain budget, and [`DispatchError::WorkerFailed`] if a
/// worker task panics.
pub async fn dispatch<H: ChunkHandler>(
    handler: Arc<H>,
    chunks: Vec<Chunk>,
    workers: usize,
    ctx: DispatchContext,
) -> Result<PoolReport<H::Output>> {
    let workers = workers.max(1);
    let (job_tx, job_rx) = mpsc::channel::<Chunk>(workers);
    let (result_tx, mut result_rx) =
        mpsc::channel::<(usize, std::result::Result<H::Output, JobError>)>(workers);
    let job_rx = Arc::new(Mutex::new(job_rx));
    let aborted = Arc::new(AtomicBool::new(false));

    let mut tasks = JoinSet::new();
    for worker_id in 0..workers {
        let job_rx = Arc::clone(&job_rx);
        let result_tx = result_tx.clone();
        let handler = Arc::clone(&handler);
        let ctx = ctx.clone();
        let aborted = Arc::clone(&aborted);

        tasks.spawn(async move {
            loop {
                let job = {
                    let mut rx = job_rx.lock().await;
                    rx.recv().await
                };
                let Some(chunk) = job else {
                    break;
                };
                if aborted.load(Ordering::Acquire) {
                    continue;
                }
                debug!(worker_id, chunk = chunk.index, "processing chunk");
                let index = chunk.index;
                let outcome = run_job(handler.as_ref(), &chunk, &ctx).await;
                if result_tx.send((index, outcome)).await.is_err() {
                    break;
                }
            }
        });
    }
    drop(result_tx);

    {
        let aborted = Arc::clone(&aborted);
        tasks.spawn(async move {
            for chunk in chunks {
                if aborted.load(Ordering::Acquire) || job_tx.send(chunk).await.is_err() {
                    break;
                }
            }
        });
    }

    let mut succeeded = Vec::new();
    let mut failed = Vec::new();
    let mut budget_error = None;
    while let Some((index, outcome)) = result_rx.recv().await {
        match outcome {
            Ok(value) => succeeded.push((index, value)),
            Err(JobError::Handler(message)) => {
                warn!(chunk = index, error = %message, "chunk processing failed, skipping");
                failed.push((index, message));
            }
            Err(JobError::Budget(err)) => {
                warn!(chunk = index, error = %err, "token budget exhausted, abandoning dispatch");
                aborted.store(true, Ordering::Release);
                budget_error.get_or_insert(err);
            }
        }
    }

    while let Some(joined) = tasks.join_next().await {
        joined.map_err(|e| DispatchError::WorkerFailed(e.to_string()))?;
    }

    if let Some(err) = budget_error {
        return Err(err.into());
    }

    succeeded.sort_by_key(|(index, _)| *index);
    failed.sort_by_key(|(index, _)| *index);
    Ok(PoolReport { succeeded, failed })
}

async fn run_job<H: ChunkHandler>(
    handler: &H,
    chunk: &Chunk,
    ctx: &DispatchContext,
) -> std::result::Result<H::Output, JobError> {
    let tokens = chunk.estimated_tokens + ctx.fixed_context_tokens;

    let reservation = loop {
        ctx.limiter.wait_for_capacity(&ctx.model, tokens).await;

        let reservation = match ctx.budgets.acquire(tokens, &ctx.model, ctx.budget_wait).await {
            Ok(reservation) => reservation,
            Err(Error::Budget(err)) => return Err(JobError::Budget(err)),
            Err(other) => return Err(JobError::Handler(other.to_string())),
        };

        match ctx.limiter.try_acquire(&ctx.model, tokens) {
            Admission::Granted => break reservation,
            Admission::Wait(_) => {
                debug!(chunk = chunk.index, tokens, "rate capacity taken by another worker, retrying");
                drop(reservation);
            }
        }
    };

    let result = handler.process(chunk).await;
    drop(reservation);
    result.map_err(|e| JobError::Handler(format!("{e:#}")))
}
