//! Core types, configuration, and error handling for revio.
//!
//! This crate provides the shared foundation used by the other revio crates:
//! - [`RevioError`]: unified error type using `thiserror`
//! - [`RevioConfig`]: configuration loaded from `.revio.toml`
//! - Shared types: [`DiffHunk`], [`Suggestion`],
//!   [`InlineComment`], [`PrMetadata`], [`OutputFormat`]

mod config;
mod error;
mod types;

pub use config::{
    model_context_limit, FilterConfig, GitConfig, GitProviderKind, LlmConfig, OutputConfig,
    RevioConfig, SuggestionsConfig,
};
pub use error::RevioError;
pub use types::{DiffHunk, InlineComment, OutputFormat, PrMetadata, Suggestion};

/// A convenience `Result` type for revio operations.
pub type Result<T> = std::result::Result<T, RevioError>;
