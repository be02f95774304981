//! Core domain models.
//!
//! Pure value types with no I/O or tokenizer dependencies.

pub mod chunk;

pub use chunk::Chunk;
