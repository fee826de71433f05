//! Diff handling for revio.
//!
//! Parses unified diffs, drops noise files before they reach the model,
//! renders hunks with line numbers for prompting, and splits oversized diffs
//! into token-budgeted chunks.

pub mod chunker;
pub mod filter;
pub mod language;
pub mod parser;
pub mod render;
pub mod tokens;
