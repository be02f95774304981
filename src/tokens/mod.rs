//! Token accounting.
//!
//! - **Estimator**: deterministic token counts per tokenizer family
//! - **Budget**: per-model admission control with reservation guards
//! - **Limits**: published context windows and default TPM quotas

pub mod budget;
pub mod estimator;
pub mod limits;

pub use budget::{BudgetManager, BudgetReservation, BudgetStatus, TokenBudget};
pub use estimator::{TokenEstimator, TokenizerFamily};
pub use limits::{
    DEFAULT_CONTEXT_WINDOW, DEFAULT_TPM, LimitTable, known_context_window, known_tpm,
    normalize_model,
};
