//! Error types for chunkwise operations.
//!
//! This module provides the error hierarchy using `thiserror` for token
//! budgeting, chunking, dispatch, and reconciliation.

use thiserror::Error;

/// Result type alias for chunkwise operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type.
#[derive(Error, Debug)]
pub enum Error {
    /// Chunking-related errors (misconfiguration of the splitter).
    #[error("chunking error: {0}")]
    Chunking(#[from] ChunkingError),

    /// Token budget admission errors.
    #[error("budget error: {0}")]
    Budget(#[from] BudgetError),

    /// Map-phase dispatch errors.
    #[error("dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    /// Reduce-phase errors.
    #[error("reconcile error: {0}")]
    Reconcile(#[from] ReconcileError),

    /// Tokenizer table could not be loaded.
    #[error("tokenizer error: {message}")]
    Tokenizer {
        /// Description of the tokenizer failure.
        message: String,
    },

    /// Configuration errors.
    #[error("configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },
}

impl Error {
    /// Returns `true` when the caller should back off and retry the whole
    /// job later instead of treating the failure as permanent.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Budget(BudgetError::Exceeded { .. }))
    }

    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

/// Chunker configuration errors. Always fatal, never clamped.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChunkingError {
    /// Invalid chunk configuration.
    #[error("invalid chunk configuration: {reason}")]
    InvalidConfig {
        /// Reason the configuration is invalid.
        reason: String,
    },

    /// Overlap is not smaller than the chunk budget.
    #[error("overlap {overlap} tokens must be less than max {max} tokens")]
    OverlapTooLarge {
        /// Overlap size in tokens.
        overlap: usize,
        /// Maximum chunk size in tokens.
        max: usize,
    },

    /// Section marker pattern failed to compile.
    #[error("regex error: {0}")]
    Regex(String),
}

/// Token budget errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BudgetError {
    /// The reservation does not fit the model's budget. Back off and retry
    /// the job later.
    #[error("token budget exceeded for {model}: requested {requested}, available {available}")]
    Exceeded {
        /// Model identifier.
        model: String,
        /// Tokens requested.
        requested: usize,
        /// Tokens available when the request was refused.
        available: usize,
    },
}

/// Map-phase errors.
#[derive(Error, Debug)]
pub enum DispatchError {
    /// Every unit of work failed.
    #[error("no unit of work succeeded ({attempted} attempted): {last_error}")]
    NoChunkSucceeded {
        /// Number of chunks dispatched.
        attempted: usize,
        /// Message of the last observed handler failure.
        last_error: String,
    },

    /// A worker task panicked or was torn down.
    #[error("worker failed: {0}")]
    WorkerFailed(String),
}

/// Reduce-phase errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReconcileError {
    /// Nothing to reconcile.
    #[error("cannot reconcile an empty result set")]
    Empty,

    /// Categorical fields without a resolvable majority.
    #[error("unresolved verdict conflicts on: {}", fields.join(", "))]
    Conflicts {
        /// Names of the conflicting fields.
        fields: Vec<String>,
    },
}

impl From<regex::Error> for ChunkingError {
    fn from(err: regex::Error) -> Self {
        Self::Regex(err.to_string())
    }
}

impl From<regex::Error> for Error {
    fn from(err: regex::Error) -> Self {
        Self::Chunking(err.into())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::config(err.to_string())
    }
}
