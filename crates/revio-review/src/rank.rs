//! Optional second model pass that orders suggestions by importance.

use revio_core::{RevioError, Suggestion, SuggestionsConfig};

use crate::llm::{chat_with_fallback, ChatModel};
use crate::prompt::{log_prompt, render_prompt, PromptVars, SORT_SUGGESTIONS};
use crate::yaml::load_yaml;

/// Ask `model` to rank `suggestions` and return them in its order.
///
/// Falls back to the input order when the call fails or the answer is
/// unusable. The ranked list is clipped by `final_clip_factor`.
pub async fn rank_suggestions(
    llm: &dyn ChatModel,
    model: &str,
    suggestions: Vec<Suggestion>,
    config: &SuggestionsConfig,
    verbosity_level: u8,
) -> Vec<Suggestion> {
    if suggestions.len() < 2 {
        return suggestions;
    }

    let vars = PromptVars {
        suggestion_str: suggestion_str(&suggestions),
        ..PromptVars::default()
    };
    let prompt = match render_prompt(&SORT_SUGGESTIONS, &vars) {
        Ok(p) => p,
        Err(e) => {
            tracing::warn!(error = %e, "could not render ranking prompt");
            return suggestions;
        }
    };
    log_prompt(&prompt, verbosity_level);

    let completion = match chat_with_fallback(llm, &[model], &prompt.system, &prompt.user).await {
        Ok(c) => c,
        Err(e) => {
            tracing::info!(error = %e, "could not rank suggestions, keeping model order");
            return suggestions;
        }
    };

    match apply_sort_order(&suggestions, &completion.text) {
        Ok(ranked) => clip(ranked, config),
        Err(e) => {
            tracing::info!(error = %e, "could not rank suggestions, keeping model order");
            suggestions
        }
    }
}

/// Numbered one-line-per-suggestion listing used in the ranking prompt.
///
/// # Examples
///
/// ```
/// use revio_core::Suggestion;
/// use revio_review::rank::suggestion_str;
///
/// let s = Suggestion {
///     relevant_file: "a.rs".into(),
///     relevant_lines_start: 1,
///     relevant_lines_end: 1,
///     existing_code: "a".into(),
///     improved_code: "b".into(),
///     suggestion_content: "rename".into(),
///     label: "style".into(),
/// };
/// assert!(suggestion_str(&[s]).starts_with("suggestion 1: {"));
/// ```
pub fn suggestion_str(suggestions: &[Suggestion]) -> String {
    suggestions
        .iter()
        .enumerate()
        .map(|(i, s)| {
            let record = serde_json::json!({
                "relevant_file": s.relevant_file,
                "suggestion_content": s.suggestion_content,
                "existing_code": s.existing_code,
                "improved_code": s.improved_code,
                "label": s.label,
            });
            format!("suggestion {}: {record}\n\n", i + 1)
        })
        .collect()
}

/// Reorder `suggestions` by a `Sort Order` YAML answer.
///
/// Suggestions the answer does not mention keep their relative order after
/// the ranked ones.
///
/// # Errors
///
/// Returns [`RevioError::Parse`] if the answer is not YAML, lacks
/// `Sort Order`, or contains out-of-range or duplicate numbers.
pub fn apply_sort_order(
    suggestions: &[Suggestion],
    answer: &str,
) -> Result<Vec<Suggestion>, RevioError> {
    let value = load_yaml(answer, &[])
        .ok_or_else(|| RevioError::Parse("ranking answer is not YAML".into()))?;
    let entries = value
        .get("Sort Order")
        .and_then(|v| v.as_sequence())
        .ok_or_else(|| RevioError::Parse("ranking answer has no 'Sort Order' list".into()))?;

    let n = suggestions.len();
    let mut slots: Vec<Option<usize>> = vec![None; n];
    let mut seen = vec![false; n];

    for entry in entries {
        let number = index_field(entry, "suggestion number", n)?;
        let order = index_field(entry, "importance order", n)?;
        if seen[number] || slots[order].is_some() {
            return Err(RevioError::Parse(format!(
                "duplicate entry in sort order: suggestion {}",
                number + 1
            )));
        }
        seen[number] = true;
        slots[order] = Some(number);
    }

    let ranked = slots.into_iter().flatten();
    let unranked = (0..n).filter(|i| !seen[*i]);
    Ok(ranked.chain(unranked).map(|i| suggestions[i].clone()).collect())
}

fn index_field(entry: &serde_yaml::Value, key: &str, n: usize) -> Result<usize, RevioError> {
    let raw = entry.get(key).ok_or_else(|| RevioError::Parse(format!("missing '{key}'")))?;
    let number = match raw {
        serde_yaml::Value::Number(num) => num.as_u64(),
        serde_yaml::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
    .and_then(|v| usize::try_from(v).ok())
    .ok_or_else(|| RevioError::Parse(format!("'{key}' is not a number")))?;

    if number == 0 || number > n {
        return Err(RevioError::Parse(format!("'{key}' {number} out of range 1..={n}")));
    }
    Ok(number - 1)
}

/// Truncate to `round(max(len, num_code_suggestions, per_chunk) * final_clip_factor)`.
///
/// A factor of exactly 1 leaves the list untouched.
pub fn clip(mut suggestions: Vec<Suggestion>, config: &SuggestionsConfig) -> Vec<Suggestion> {
    let factor = config.final_clip_factor;
    if factor == 1.0 {
        return suggestions;
    }
    let max_len = suggestions
        .len()
        .max(config.num_code_suggestions)
        .max(config.num_code_suggestions_per_chunk);
    let new_len = (0.5 + max_len as f64 * factor) as usize;
    if new_len < suggestions.len() {
        tracing::debug!(from = suggestions.len(), to = new_len, "clipping ranked suggestions");
        suggestions.truncate(new_len);
    }
    suggestions
}
