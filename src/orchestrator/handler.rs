//! Per-chunk handlers.
//!
//! A handler turns one chunk into a partial structured result. Its errors are
//! opaque to the orchestrator: they are logged and counted, never inspected.

use crate::core::Chunk;
use async_trait::async_trait;
use std::marker::PhantomData;

/// Converts one chunk into a partial result.
#[async_trait]
pub trait ChunkHandler: Send + Sync + 'static {
    /// Partial result type.
    type Output: Send + 'static;

    /// Processes a single chunk.
    async fn process(&self, chunk: &Chunk) -> anyhow::Result<Self::Output>;
}

/// Adapter running a synchronous closure as a [`ChunkHandler`].
pub struct FnHandler<F, T> {
    f: F,
    _output: PhantomData<fn() -> T>,
}

impl<F, T> std::fmt::Debug for FnHandler<F, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnHandler").finish_non_exhaustive()
    }
}

/// Wraps a closure as a handler.
///
/// # Examples
///
/// ```
/// use chunkwise::orchestrator::handler_fn;
///
/// let handler = handler_fn(|chunk| Ok(chunk.text.len()));
/// # let _ = handler;
/// ```
pub const fn handler_fn<F, T>(f: F) -> FnHandler<F, T>
where
    F: Fn(&Chunk) -> anyhow::Result<T> + Send + Sync + 'static,
    T: Send + 'static,
{
    FnHandler {
        f,
        _output: PhantomData,
    }
}

#[async_trait]
impl<F, T> ChunkHandler for FnHandler<F, T>
where
    F: Fn(&Chunk) -> anyhow::Result<T> + Send + Sync + 'static,
    T: Send + 'static,
{
    type Output = T;

    async fn process(&self, chunk: &Chunk) -> anyhow::Result<T> {
        (self.f)(chunk)
    }
}
