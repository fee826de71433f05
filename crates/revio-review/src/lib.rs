//! The revio PR tools: code suggestions and questions.
//!
//! Wires git hosts ([`provider`]), the model client ([`llm`]) and the diff
//! handling from `revio-difflens` into two pipelines:
//! [`pipeline::CodeSuggestions`] and [`questions::Questions`].

pub mod format;
pub mod github;
pub mod gitlab;
pub mod llm;
pub mod pipeline;
pub mod prompt;
pub mod provider;
pub mod publish;
pub mod questions;
pub mod rank;
pub mod suggestions;
pub mod yaml;
