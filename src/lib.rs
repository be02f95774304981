//! # chunkwise
//!
//! Token-budgeted map-reduce over documents larger than a model's context.
//!
//! chunkwise decides whether a document fits a text-generation backend's
//! fixed context window, splits it into bounded, overlapping,
//! paragraph-aligned chunks when it does not, dispatches the chunks to a
//! caller-supplied handler under per-model token budgets and a
//! sliding-window rate limit, and reconciles the partial results into one.
//!
//! ## Features
//!
//! - **Token estimation**: BPE counts per model family (`o200k_base`, `cl100k_base`)
//! - **Semantic chunking**: paragraph packing with overlap and a coverage audit
//! - **Budgets**: per-model reservations released exactly once
//! - **Rate limiting**: sliding 60-second tokens-per-minute windows
//! - **Map phase**: bounded worker pool with per-chunk failure isolation
//! - **Reduce phase**: typed per-field merge policies, entity clustering,
//!   verdict voting with explicit conflicts
//!
//! ## Example
//!
//! ```no_run
//! use chunkwise::{ChunkOrchestrator, Config, handler_fn};
//! use std::sync::Arc;
//!
//! # async fn run(document: &str) -> chunkwise::Result<()> {
//! let orchestrator = ChunkOrchestrator::new(&Config::default())?;
//! let handler = Arc::new(handler_fn(|chunk| Ok(chunk.text.len())));
//! let outcome = orchestrator.run(document, "gpt-4o", 0, handler).await?;
//! println!("{} chunks, {} failed", outcome.audit.chunk_count, outcome.audit.chunks_failed);
//! # Ok(())
//! # }
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod chunking;
pub mod config;
pub mod core;
pub mod error;
pub mod io;
pub mod logging;
pub mod orchestrator;
pub mod rate_limit;
pub mod reconcile;
pub mod tokens;

// Re-export commonly used types at crate root
pub use error::{Error, Result};

// Re-export core domain types
pub use core::Chunk;

// Re-export configuration
pub use config::Config;

// Re-export chunking types
pub use chunking::{ChunkPlan, ChunkingReason, CoverageReport, SectionMarkers, SemanticChunker, chunk};

// Re-export token accounting types
pub use tokens::{BudgetManager, BudgetReservation, TokenEstimator};

// Re-export rate limiting types
pub use rate_limit::RateLimiter;

// Re-export map-phase types
pub use orchestrator::{ChunkHandler, ChunkOrchestrator, ChunkingAudit, MapOutcome, handler_fn};

// Re-export reduce-phase types
pub use reconcile::{Entity, MergePolicy, MergedResult, Reconcile, Verdict, VerdictConflict, reconcile};
