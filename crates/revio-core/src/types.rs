use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A single hunk from a unified diff.
///
/// # Examples
///
/// ```
/// use revio_core::DiffHunk;
/// use std::path::PathBuf;
///
/// let hunk = DiffHunk {
///     file_path: PathBuf::from("src/lib.rs"),
///     old_start: 10,
///     old_lines: 1,
///     new_start: 10,
///     new_lines: 1,
///     content: "-old line\n+new line\n".into(),
/// };
/// assert_eq!(hunk.content.lines().count(), 2);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffHunk {
    /// Path to the affected file.
    pub file_path: PathBuf,
    /// Starting line in the old version.
    pub old_start: u32,
    /// Number of lines in the old version.
    pub old_lines: u32,
    /// Starting line in the new version.
    pub new_start: u32,
    /// Number of lines in the new version.
    pub new_lines: u32,
    /// Raw diff content for this hunk, one `+`/`-`/` ` prefixed line each.
    pub content: String,
}

/// A code suggestion produced by the model.
///
/// `existing_code` and `improved_code` always differ; no-op suggestions are
/// dropped when the model output is parsed.
///
/// # Examples
///
/// ```
/// use revio_core::Suggestion;
///
/// let s = Suggestion {
///     relevant_file: "src/db.rs".into(),
///     relevant_lines_start: 12,
///     relevant_lines_end: 14,
///     existing_code: "conn.execute(&q)".into(),
///     improved_code: "conn.execute(&q)?".into(),
///     suggestion_content: "Propagate the error".into(),
///     label: "possible issue".into(),
/// };
/// assert!(!s.is_noop());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Suggestion {
    /// Path of the file the suggestion applies to.
    pub relevant_file: String,
    /// First line of the affected range in the new version.
    pub relevant_lines_start: u32,
    /// Last line of the affected range in the new version.
    pub relevant_lines_end: u32,
    /// Code as it is in the PR.
    pub existing_code: String,
    /// Code as the model proposes it.
    pub improved_code: String,
    /// Free-text explanation.
    pub suggestion_content: String,
    /// Category label (e.g. `"performance"`, `"enhancement"`).
    pub label: String,
}

impl Suggestion {
    /// `true` when applying the suggestion would change nothing.
    pub fn is_noop(&self) -> bool {
        self.existing_code == self.improved_code
    }
}

/// A comment anchored to a line range in the PR head.
///
/// Used both for plain inline comments and for committable suggestion blocks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineComment {
    /// File path relative to the repository root.
    pub path: String,
    /// First line of the range.
    pub start_line: u32,
    /// Last line of the range; plain comments anchor here.
    pub end_line: u32,
    /// Markdown body.
    pub body: String,
}

/// PR metadata substituted into prompts.
///
/// # Examples
///
/// ```
/// use revio_core::PrMetadata;
///
/// let meta = PrMetadata {
///     title: "Add caching".into(),
///     branch: "feature/cache".into(),
///     description: String::new(),
///     commit_messages: vec!["add cache".into(), "fix test".into()],
/// };
/// assert_eq!(meta.commit_messages_str(), "1. add cache\n2. fix test");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrMetadata {
    /// PR title.
    pub title: String,
    /// Source branch name.
    pub branch: String,
    /// PR body.
    pub description: String,
    /// Commit messages, oldest first.
    pub commit_messages: Vec<String>,
}

impl PrMetadata {
    /// Commit messages as a numbered list, one per line.
    pub fn commit_messages_str(&self) -> String {
        self.commit_messages
            .iter()
            .enumerate()
            .map(|(i, m)| format!("{}. {}", i + 1, m.trim()))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Output format for CLI subcommands.
///
/// Implements [`FromStr`] so it can be used directly with `clap` argument parsing.
///
/// # Examples
///
/// ```
/// use revio_core::OutputFormat;
///
/// let fmt: OutputFormat = "json".parse().unwrap();
/// assert_eq!(fmt, OutputFormat::Json);
///
/// let fmt: OutputFormat = "md".parse().unwrap();
/// assert_eq!(fmt, OutputFormat::Markdown);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable summaries.
    #[default]
    Text,
    /// Machine-readable JSON with camelCase keys.
    Json,
    /// Markdown-formatted output.
    Markdown,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Markdown => write!(f, "markdown"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            "markdown" | "md" => Ok(OutputFormat::Markdown),
            other => Err(format!("unknown output format: {other}")),
        }
    }
}
