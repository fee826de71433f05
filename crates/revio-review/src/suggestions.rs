//! Turning model output into [`Suggestion`] records.

use revio_core::Suggestion;
use serde_yaml::Value;

use crate::yaml::load_yaml;

/// Keys whose values are usually multi-line code or prose.
const MULTILINE_KEYS: &[&str] = &[
    "relevant_file",
    "suggestion_content",
    "existing_code",
    "improved_code",
];

const DEFAULT_LABEL: &str = "enhancement";

/// Parse model output into suggestions.
///
/// Accepts a mapping with a `code_suggestions` list or a bare list.
/// Records missing `relevant_file`, `existing_code` or `improved_code` are
/// skipped, as are no-op records. Unparseable output yields an empty list.
///
/// # Examples
///
/// ```
/// use revio_review::suggestions::parse_suggestions;
///
/// let output = "\
/// code_suggestions:
/// - relevant_file: |
///     src/lib.rs
///   suggestion_content: |
///     Avoid the clone
///   existing_code: |
///     let v = items.clone();
///   improved_code: |
///     let v = &items;
///   relevant_lines_start: 4
///   relevant_lines_end: 4
///   label: |
///     performance
/// ";
/// let suggestions = parse_suggestions(output);
/// assert_eq!(suggestions.len(), 1);
/// assert_eq!(suggestions[0].relevant_file, "src/lib.rs");
/// assert_eq!(suggestions[0].label, "performance");
/// ```
pub fn parse_suggestions(output: &str) -> Vec<Suggestion> {
    let Some(value) = load_yaml(output, MULTILINE_KEYS) else {
        return Vec::new();
    };

    let records = match &value {
        Value::Sequence(seq) => seq,
        Value::Mapping(_) => match value.get("code_suggestions") {
            Some(Value::Sequence(seq)) => seq,
            _ => {
                tracing::warn!("model output has no code_suggestions list");
                return Vec::new();
            }
        },
        _ => return Vec::new(),
    };

    let mut suggestions = Vec::with_capacity(records.len());
    for (i, record) in records.iter().enumerate() {
        let Some(suggestion) = suggestion_from_record(record) else {
            tracing::debug!(index = i + 1, "skipping malformed suggestion");
            continue;
        };
        if suggestion.is_noop() {
            tracing::debug!(
                index = i + 1,
                file = %suggestion.relevant_file,
                "skipping suggestion: existing code equals improved code"
            );
            continue;
        }
        suggestions.push(suggestion);
    }
    suggestions
}

fn suggestion_from_record(record: &Value) -> Option<Suggestion> {
    let relevant_file = text(record.get("relevant_file")?)?.trim().to_string();
    if relevant_file.is_empty() {
        return None;
    }
    let existing_code = text(record.get("existing_code")?)?.trim_end().to_string();
    let improved_code = text(record.get("improved_code")?)?.trim_end().to_string();

    let label = record
        .get("label")
        .and_then(text)
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
        .unwrap_or_else(|| DEFAULT_LABEL.to_string());

    Some(Suggestion {
        relevant_file,
        relevant_lines_start: line_number(record.get("relevant_lines_start")),
        relevant_lines_end: line_number(record.get("relevant_lines_end")),
        existing_code,
        improved_code,
        suggestion_content: record
            .get("suggestion_content")
            .and_then(text)
            .map(|c| c.trim_end().to_string())
            .unwrap_or_default(),
        label,
    })
}

fn text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Line numbers may arrive as numbers or quoted strings; anything else is 0.
fn line_number(value: Option<&Value>) -> u32 {
    match value {
        Some(Value::Number(n)) => n.as_u64().and_then(|n| u32::try_from(n).ok()).unwrap_or(0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}
