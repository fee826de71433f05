//! Posting suggestions back to the PR.

use std::collections::HashMap;

use revio_core::{InlineComment, RevioError, Suggestion, SuggestionsConfig};
use serde::Serialize;

use crate::format::{self, NO_SUGGESTIONS};
use crate::provider::{Capability, GitProvider};

/// What happened while publishing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishReport {
    /// Items (or comments) that were posted.
    pub published: usize,
    /// Items whose individual retry also failed.
    pub failed: usize,
    /// Suggestions dropped before publishing (bad path or line range).
    pub skipped: usize,
}

/// Which batch endpoint to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    CodeSuggestions,
    InlineComments,
}

/// Publish `suggestions` according to `config`.
///
/// Never fails: provider errors are logged and reflected in the report.
pub async fn publish_suggestions(
    provider: &dyn GitProvider,
    suggestions: &[Suggestion],
    config: &SuggestionsConfig,
) -> PublishReport {
    if suggestions.is_empty() {
        tracing::info!("no suggestions found to improve this PR");
        return publish_single_comment(provider, NO_SUGGESTIONS).await;
    }

    if config.summarize {
        tracing::info!(count = suggestions.len(), "publishing summary of suggestions");
        let link = |path: &str, start: u32, end: u32| provider.get_line_link(path, start, end);
        let body = format::summary_table(
            suggestions,
            provider.is_supported(Capability::GfmMarkdown),
            &link,
        );
        return publish_single_comment(provider, &body).await;
    }

    let suggestions_supported = provider.is_supported(Capability::CodeSuggestions);
    let mode = if config.include_improved_code && suggestions_supported {
        Mode::CodeSuggestions
    } else if provider.is_supported(Capability::InlineComments) {
        if config.include_improved_code {
            tracing::warn!("code suggestions are not supported by the git provider, posting inline comments");
        }
        Mode::InlineComments
    } else {
        tracing::error!("neither code suggestions nor inline comments are supported by the git provider");
        return PublishReport {
            skipped: suggestions.len(),
            ..PublishReport::default()
        };
    };

    let mut report = PublishReport::default();
    let mut heads: HashMap<String, Option<Vec<String>>> = HashMap::new();
    let mut items = Vec::with_capacity(suggestions.len());

    for s in suggestions {
        let path = s.relevant_file.trim();
        if path.is_empty()
            || s.relevant_lines_start == 0
            || s.relevant_lines_end < s.relevant_lines_start
        {
            tracing::debug!(
                file = %s.relevant_file,
                start = s.relevant_lines_start,
                end = s.relevant_lines_end,
                "skipping suggestion with invalid location"
            );
            report.skipped += 1;
            continue;
        }

        let item = match mode {
            Mode::CodeSuggestions => {
                let lines = head_lines(provider, &mut heads, path).await;
                let head_line = lines
                    .and_then(|l| l.get(s.relevant_lines_start as usize - 1))
                    .map(String::as_str);
                let code = format::dedent_code(head_line, s.improved_code.trim_end());
                InlineComment {
                    path: path.to_string(),
                    start_line: s.relevant_lines_start,
                    end_line: s.relevant_lines_end,
                    body: format::code_suggestion_body(s, &code),
                }
            }
            Mode::InlineComments => InlineComment {
                path: path.to_string(),
                start_line: s.relevant_lines_end,
                end_line: s.relevant_lines_end,
                body: format::inline_comment_body(s),
            },
        };
        items.push(item);
    }

    if items.is_empty() {
        return report;
    }

    match publish_batch(provider, mode, &items).await {
        Ok(rejected) => {
            let rejected = rejected.min(items.len());
            tracing::info!(count = items.len() - rejected, rejected, "published suggestions");
            report.published += items.len() - rejected;
            report.failed += rejected;
        }
        Err(e) => {
            tracing::info!(error = %e, "batch publish failed, publishing each suggestion separately");
            for item in &items {
                match publish_batch(provider, mode, std::slice::from_ref(item)).await {
                    Ok(0) => report.published += 1,
                    Ok(_) => report.failed += 1,
                    Err(e) => {
                        tracing::warn!(path = %item.path, line = item.start_line, error = %e, "failed to publish suggestion");
                        report.failed += 1;
                    }
                }
            }
        }
    }
    report
}

async fn publish_batch(
    provider: &dyn GitProvider,
    mode: Mode,
    items: &[InlineComment],
) -> Result<usize, RevioError> {
    match mode {
        Mode::CodeSuggestions => provider.publish_code_suggestions(items).await,
        Mode::InlineComments => provider.publish_inline_comments(items).await,
    }
}

async fn publish_single_comment(provider: &dyn GitProvider, body: &str) -> PublishReport {
    match provider.publish_comment(body, false).await {
        Ok(()) => PublishReport {
            published: 1,
            ..PublishReport::default()
        },
        Err(e) => {
            tracing::warn!(error = %e, "failed to publish comment");
            PublishReport {
                failed: 1,
                ..PublishReport::default()
            }
        }
    }
}

/// Head-version lines of `path`, fetched once per file.
async fn head_lines<'a>(
    provider: &dyn GitProvider,
    cache: &'a mut HashMap<String, Option<Vec<String>>>,
    path: &str,
) -> Option<&'a Vec<String>> {
    if !cache.contains_key(path) {
        let lines = match provider.get_file_content(path).await {
            Ok(content) => Some(content.lines().map(String::from).collect()),
            Err(e) => {
                tracing::debug!(path, error = %e, "could not fetch head file, keeping snippet indentation");
                None
            }
        };
        cache.insert(path.to_string(), lines);
    }
    cache.get(path).and_then(Option::as_ref)
}
