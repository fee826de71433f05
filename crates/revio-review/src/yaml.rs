//! Lenient YAML loading for model output.
//!
//! Models often return almost-YAML: fenced, wrapped in braces, with
//! unquoted multi-line values, or followed by chatter. [`load_yaml`] tries a
//! plain parse first and then a fixed sequence of repairs.

use serde_yaml::Value;

const MAX_TRAILING_LINES_DROPPED: usize = 50;

/// Parse `text` as YAML, repairing common model mistakes.
///
/// `multiline_keys` lists keys whose inline values should be rewritten as
/// `|-` block scalars when the plain parse fails. Only mappings and
/// sequences count as a successful parse.
///
/// Returns `None` (after a warn log) when every repair fails.
///
/// # Examples
///
/// ```
/// use revio_review::yaml::load_yaml;
///
/// let text = "```yaml\nSort Order:\n  - suggestion number: 1\n    importance order: 1\n```";
/// let value = load_yaml(text, &[]).unwrap();
/// assert!(value.get("Sort Order").is_some());
/// ```
pub fn load_yaml(text: &str, multiline_keys: &[&str]) -> Option<Value> {
    let stripped = strip_fences(text);
    if let Some(value) = parse_structured(stripped) {
        return Some(value);
    }
    tracing::debug!("plain YAML parse failed, trying repairs");

    let repairs: [&dyn Fn(&str) -> Option<String>; 3] = [
        &|s: &str| Some(block_scalar_keys(s, multiline_keys)),
        &|_: &str| extract_yaml_fence(text),
        &strip_braces,
    ];
    for (i, repair) in repairs.iter().enumerate() {
        if let Some(candidate) = repair(stripped) {
            if let Some(value) = parse_structured(&candidate) {
                tracing::debug!(repair = i, "YAML parsed after repair");
                return Some(value);
            }
        }
    }

    let mut lines: Vec<&str> = stripped.lines().collect();
    for _ in 0..MAX_TRAILING_LINES_DROPPED {
        if lines.pop().is_none() {
            break;
        }
        if let Some(value) = parse_structured(&lines.join("\n")) {
            tracing::debug!(remaining = lines.len(), "YAML parsed after dropping trailing lines");
            return Some(value);
        }
    }

    tracing::warn!("failed to parse model output as YAML");
    None
}

fn parse_structured(text: &str) -> Option<Value> {
    match serde_yaml::from_str::<Value>(text) {
        Ok(value @ (Value::Mapping(_) | Value::Sequence(_))) => Some(value),
        _ => None,
    }
}

/// Remove a surrounding ```` ```yaml ```` / ```` ``` ```` fence.
pub(crate) fn strip_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let inner = trimmed
        .strip_prefix("```yaml")
        .or_else(|| trimmed.strip_prefix("```yml"))
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    inner.strip_suffix("```").unwrap_or(inner).trim_matches('\n')
}

/// Rewrite `key: value` into a `key: |-` block scalar for each listed key.
fn block_scalar_keys(text: &str, keys: &[&str]) -> String {
    let mut out = String::with_capacity(text.len() + 64);
    for line in text.lines() {
        match split_inline_value(line, keys) {
            Some((head, key_col, value)) => {
                out.push_str(head);
                out.push_str(" |-\n");
                out.push_str(&" ".repeat(key_col + 2));
                out.push_str(value);
            }
            None => out.push_str(line),
        }
        out.push('\n');
    }
    out
}

/// For `  - key: value`, returns (`  - key:`, column of `key`, `value`).
fn split_inline_value<'a>(line: &'a str, keys: &[&str]) -> Option<(&'a str, usize, &'a str)> {
    let body = line.trim_start();
    let body = body.strip_prefix("- ").unwrap_or(body);
    let key_col = line.len() - body.len();

    let key = keys.iter().find(|k| {
        body.strip_prefix(**k)
            .is_some_and(|rest| rest.starts_with(':'))
    })?;
    let colon = key_col + key.len();
    let value = line[colon + 1..].trim();
    if value.is_empty() || value.starts_with('|') || value.starts_with('>') {
        return None;
    }
    Some((&line[..=colon], key_col, value))
}

fn extract_yaml_fence(text: &str) -> Option<String> {
    let start = text.find("```yaml")? + "```yaml".len();
    let end = text.rfind("```")?;
    (end > start).then(|| text[start..end].trim_matches('\n').to_string())
}

fn strip_braces(text: &str) -> Option<String> {
    let trimmed = text.trim();
    let inner = trimmed.strip_prefix('{')?;
    Some(inner.strip_suffix('}').unwrap_or(inner).to_string())
}
