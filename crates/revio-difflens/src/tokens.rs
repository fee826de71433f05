//! Token estimation for prompt budgeting.

/// Tokens reserved for the model's answer when sizing a prompt.
pub const OUTPUT_BUFFER_TOKENS: usize = 1000;

/// Approximate token count: one token per four characters, rounded up.
///
/// # Examples
///
/// ```
/// use revio_difflens::tokens::estimate_tokens;
///
/// assert_eq!(estimate_tokens(""), 0);
/// assert_eq!(estimate_tokens("abcd"), 1);
/// assert_eq!(estimate_tokens("abcde"), 2);
/// ```
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

/// Tokens left for the diff once the prompt scaffolding and answer are accounted for.
///
/// `prompt_tokens` is the size of the prompt rendered with an empty diff.
/// Saturates at zero.
///
/// # Examples
///
/// ```
/// use revio_difflens::tokens::diff_budget;
///
/// assert_eq!(diff_budget(8000, 500), 6500);
/// assert_eq!(diff_budget(1200, 500), 0);
/// ```
pub fn diff_budget(context_limit: usize, prompt_tokens: usize) -> usize {
    context_limit
        .saturating_sub(prompt_tokens)
        .saturating_sub(OUTPUT_BUFFER_TOKENS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_chars_not_bytes() {
        // four multibyte chars
        assert_eq!(estimate_tokens("éééé"), 1);
    }

    #[test]
    fn budget_subtracts_output_buffer() {
        assert_eq!(diff_budget(128_000, 2000), 125_000);
        assert_eq!(diff_budget(0, 0), 0);
    }
}
