//! Token estimation.
//!
//! Counts tokens with the BPE table of the model's tokenizer family. Models
//! that are not recognized fall back to the generic `cl100k_base` table.
//! Tables are loaded once per process and shared read-only; estimation
//! itself is a pure function of `(text, model)`.

use crate::error::{Error, Result};
use crate::tokens::limits::normalize_model;
use std::sync::OnceLock;
use tiktoken_rs::CoreBPE;

/// Tokenizer families with distinct BPE tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenizerFamily {
    /// `o200k_base`: gpt-4o, gpt-4.1, o-series, gpt-5.
    O200k,
    /// `cl100k_base`: gpt-4, gpt-3.5, embeddings, and the generic fallback.
    Cl100k,
}

impl TokenizerFamily {
    /// Resolves the tokenizer family for a model identifier.
    #[must_use]
    pub fn for_model(model: &str) -> Self {
        let model = normalize_model(model);
        let o200k = ["gpt-4o", "gpt-4.1", "gpt-4.5", "gpt-5", "o1", "o3", "o4", "chatgpt-4o"];
        if o200k.iter().any(|prefix| model.starts_with(prefix)) {
            Self::O200k
        } else {
            Self::Cl100k
        }
    }

    /// Name of the BPE table.
    #[must_use]
    pub const fn encoding_name(self) -> &'static str {
        match self {
            Self::O200k => "o200k_base",
            Self::Cl100k => "cl100k_base",
        }
    }
}

static O200K: OnceLock<CoreBPE> = OnceLock::new();
static CL100K: OnceLock<CoreBPE> = OnceLock::new();

fn load(family: TokenizerFamily) -> Result<&'static CoreBPE> {
    let cell = match family {
        TokenizerFamily::O200k => &O200K,
        TokenizerFamily::Cl100k => &CL100K,
    };
    if let Some(bpe) = cell.get() {
        return Ok(bpe);
    }
    let bpe = match family {
        TokenizerFamily::O200k => tiktoken_rs::o200k_base(),
        TokenizerFamily::Cl100k => tiktoken_rs::cl100k_base(),
    }
    .map_err(|e| Error::Tokenizer {
        message: format!("{}: {e}", family.encoding_name()),
    })?;
    // A concurrent loader may have won the race; either table is identical.
    Ok(cell.get_or_init(|| bpe))
}

/// Deterministic token estimator.
///
/// Cheap to clone; all clones share the process-wide BPE tables.
///
/// # Examples
///
/// ```
/// use chunkwise::tokens::TokenEstimator;
///
/// let estimator = TokenEstimator::new().unwrap();
/// assert_eq!(estimator.estimate("", "gpt-4o"), 0);
/// assert!(estimator.estimate("Hello, world!", "gpt-4o") > 0);
/// ```
#[derive(Clone, Copy)]
pub struct TokenEstimator {
    o200k: &'static CoreBPE,
    cl100k: &'static CoreBPE,
}

impl std::fmt::Debug for TokenEstimator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenEstimator")
            .field("families", &["o200k_base", "cl100k_base"])
            .finish()
    }
}

impl TokenEstimator {
    /// Loads the BPE tables.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Tokenizer`] if a table cannot be constructed.
    pub fn new() -> Result<Self> {
        Ok(Self {
            o200k: load(TokenizerFamily::O200k)?,
            cl100k: load(TokenizerFamily::Cl100k)?,
        })
    }

    const fn bpe(&self, family: TokenizerFamily) -> &CoreBPE {
        match family {
            TokenizerFamily::O200k => self.o200k,
            TokenizerFamily::Cl100k => self.cl100k,
        }
    }

    /// Estimates the token count of `text` under `model`'s tokenizer.
    pub fn estimate(&self, text: &str, model: &str) -> usize {
        if text.is_empty() {
            return 0;
        }
        self.bpe(TokenizerFamily::for_model(model))
            .encode_with_special_tokens(text)
            .len()
    }

    /// Returns whether `text` fits within `max_tokens` under `model`.
    pub fn fits(&self, text: &str, model: &str, max_tokens: usize) -> bool {
        self.estimate(text, model) <= max_tokens
    }
}
