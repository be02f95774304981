//! Unicode utilities shared by the chunker and the coverage audit.

pub mod unicode;

pub use unicode::{CharCursor, find_char_boundary, find_char_boundary_forward, find_sentence_break};
