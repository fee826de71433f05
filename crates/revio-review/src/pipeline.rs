use std::fmt;
use std::sync::Arc;

use revio_core::{FilterConfig, PrMetadata, RevioConfig, RevioError, Suggestion};
use revio_difflens::chunker::{chunk_diff, fit_single};
use revio_difflens::filter::DiffFilter;
use revio_difflens::language::main_language;
use revio_difflens::parser::FileDiff;
use revio_difflens::tokens::{diff_budget, estimate_tokens};
use serde::Serialize;

use crate::format;
use crate::llm::{chat_with_fallback, ChatModel};
use crate::prompt::{log_prompt, render_prompt, PromptTemplate, PromptVars, CODE_SUGGESTIONS};
use crate::provider::GitProvider;
use crate::publish::{publish_suggestions, PublishReport};
use crate::rank::rank_suggestions;
use crate::suggestions::parse_suggestions;

const PREPARING_SUGGESTIONS: &str = "Preparing suggestions...";

/// Result of a code-suggestions run.
///
/// # Examples
///
/// ```
/// use revio_review::pipeline::{RunStats, SuggestionRun};
///
/// let run = SuggestionRun {
///     suggestions: vec![],
///     stats: RunStats::default(),
/// };
/// assert!(run.to_string().contains("No suggestions found"));
/// ```
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestionRun {
    /// Suggestions in final (possibly ranked) order.
    pub suggestions: Vec<Suggestion>,
    /// Statistics about the run.
    pub stats: RunStats,
}

/// Statistics about a code-suggestions run.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStats {
    /// Files sent to the model.
    pub files_reviewed: usize,
    /// Files dropped by the diff filter.
    pub files_skipped: usize,
    /// Prompts sent (one per chunk in extended mode).
    pub chunks_processed: usize,
    /// Chunks beyond `max_number_of_calls` that were not sent.
    pub chunks_skipped: usize,
    /// Whether extended mode was used.
    pub extended: bool,
    /// Main language detected for the PR.
    pub language: String,
    /// Outcome of publishing, when output was published.
    pub published: Option<PublishReport>,
}

impl SuggestionRun {
    /// Markdown rendering for `--format markdown`.
    pub fn to_markdown(&self) -> String {
        format::suggestions_markdown(&self.suggestions)
    }
}

impl fmt::Display for SuggestionRun {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Code Suggestions")?;
        writeln!(f, "================")?;
        writeln!(
            f,
            "Files: {} (skipped: {}) | Prompts: {} (skipped: {}) | Mode: {}\n",
            self.stats.files_reviewed,
            self.stats.files_skipped,
            self.stats.chunks_processed,
            self.stats.chunks_skipped,
            if self.stats.extended { "extended" } else { "single" },
        )?;

        if self.suggestions.is_empty() {
            writeln!(f, "{}", format::NO_SUGGESTIONS)?;
        }
        for (i, s) in self.suggestions.iter().enumerate() {
            writeln!(
                f,
                "{}. [{}] {}:{}-{}",
                i + 1,
                s.label,
                s.relevant_file,
                s.relevant_lines_start,
                s.relevant_lines_end
            )?;
            if !s.suggestion_content.is_empty() {
                writeln!(f, "   {}", s.suggestion_content)?;
            }
            writeln!(f)?;
        }

        if let Some(report) = &self.stats.published {
            writeln!(
                f,
                "Published: {} | Failed: {} | Skipped: {}",
                report.published, report.failed, report.skipped
            )?;
        }
        Ok(())
    }
}

/// The code-suggestions tool: diff in, suggestions out.
///
/// Fetches the PR, asks the model for suggestions (chunk by chunk in
/// extended mode), optionally ranks them, and publishes them unless
/// `output.publish_output` is off.
pub struct CodeSuggestions {
    provider: Arc<dyn GitProvider>,
    llm: Arc<dyn ChatModel>,
    config: RevioConfig,
    extended: bool,
}

impl CodeSuggestions {
    /// Create the tool. Extended mode starts as `suggestions.auto_extended_mode`.
    pub fn new(provider: Arc<dyn GitProvider>, llm: Arc<dyn ChatModel>, config: RevioConfig) -> Self {
        let extended = config.suggestions.auto_extended_mode;
        Self {
            provider,
            llm,
            config,
            extended,
        }
    }

    /// Force extended mode on (it stays on if the config enables it).
    pub fn extended(mut self, extended: bool) -> Self {
        self.extended |= extended;
        self
    }

    /// Run the pipeline.
    ///
    /// # Errors
    ///
    /// Returns an error if the PR cannot be fetched, the prompt cannot be
    /// rendered, or every model call failed. Ranking and publishing
    /// failures are logged instead.
    pub async fn run(&self) -> Result<SuggestionRun, RevioError> {
        let publish = self.config.output.publish_output;
        let provider = self.provider.as_ref();

        tracing::info!(extended = self.extended, "generating code suggestions");
        let meta = provider.get_metadata().await?;

        if publish {
            if let Err(e) = provider.publish_comment(PREPARING_SUGGESTIONS, true).await {
                tracing::warn!(error = %e, "could not post progress comment");
            }
        }

        let result = self.generate(&meta).await;

        if publish {
            if let Err(e) = provider.remove_initial_comment().await {
                tracing::warn!(error = %e, "could not remove progress comment");
            }
        }
        let mut run = result?;

        if publish {
            let report =
                publish_suggestions(provider, &run.suggestions, &self.config.suggestions).await;
            run.stats.published = Some(report);
        }
        Ok(run)
    }

    async fn generate(&self, meta: &PrMetadata) -> Result<SuggestionRun, RevioError> {
        let cfg = &self.config.suggestions;
        let provider = self.provider.as_ref();

        let (files, files_skipped) = load_diff(provider, &self.config.filter).await?;
        let language = detect_language(provider, &files).await;

        let mut stats = RunStats {
            files_reviewed: files.len(),
            files_skipped,
            extended: self.extended,
            language: language.clone(),
            ..RunStats::default()
        };

        if files.is_empty() {
            tracing::info!("no reviewable files in the diff");
            return Ok(SuggestionRun {
                suggestions: Vec::new(),
                stats,
            });
        }

        let vars = PromptVars {
            title: meta.title.clone(),
            branch: meta.branch.clone(),
            description: meta.description.clone(),
            language,
            num_code_suggestions: if self.extended {
                cfg.num_code_suggestions_per_chunk
            } else {
                cfg.num_code_suggestions
            },
            extra_instructions: cfg.extra_instructions.clone(),
            commit_messages_str: meta.commit_messages_str(),
            summarize_mode: cfg.summarize,
            ..PromptVars::default()
        };

        let models = self.config.llm.models();
        let primary = models.first().copied().unwrap_or(self.config.llm.model.as_str());
        let budget = prompt_budget(
            &CODE_SUGGESTIONS,
            &vars,
            self.config.llm.context_limit(primary),
        )?;

        let diffs: Vec<String> = if self.extended {
            let mut chunks = chunk_diff(&files, budget);
            if chunks.len() > cfg.max_number_of_calls {
                stats.chunks_skipped = chunks.len() - cfg.max_number_of_calls;
                tracing::warn!(
                    chunks = chunks.len(),
                    skipped = stats.chunks_skipped,
                    max_number_of_calls = cfg.max_number_of_calls,
                    "diff needs more calls than allowed, skipping trailing chunks"
                );
                chunks.truncate(cfg.max_number_of_calls);
            }
            chunks.iter().map(|c| c.render()).collect()
        } else {
            vec![fit_single(&files, budget).text]
        };

        let verbosity = self.config.output.verbosity_level;
        let mut suggestions = Vec::new();
        let mut last_err = None;
        for (i, diff) in diffs.iter().enumerate() {
            tracing::info!(chunk = i + 1, total = diffs.len(), "requesting suggestions");
            let vars = PromptVars {
                diff: diff.clone(),
                ..vars.clone()
            };
            let prompt = render_prompt(&CODE_SUGGESTIONS, &vars)?;
            log_prompt(&prompt, verbosity);

            match chat_with_fallback(self.llm.as_ref(), &models, &prompt.system, &prompt.user).await {
                Ok(completion) => {
                    if verbosity >= 2 {
                        tracing::info!("\nAI response:\n{}", completion.text);
                    }
                    let parsed = parse_suggestions(&completion.text);
                    tracing::debug!(chunk = i + 1, count = parsed.len(), "parsed suggestions");
                    suggestions.extend(parsed);
                    stats.chunks_processed += 1;
                }
                Err(e) => {
                    tracing::warn!(chunk = i + 1, error = %e, "chunk failed, continuing without it");
                    last_err = Some(e);
                }
            }
        }

        if stats.chunks_processed == 0 {
            if let Some(e) = last_err {
                return Err(e);
            }
        }

        let rank = if self.extended {
            cfg.rank_extended_suggestions
        } else {
            cfg.rank_suggestions
        };
        if rank && !suggestions.is_empty() {
            tracing::info!(count = suggestions.len(), "ranking suggestions");
            suggestions =
                rank_suggestions(self.llm.as_ref(), primary, suggestions, cfg, verbosity).await;
        }

        Ok(SuggestionRun { suggestions, stats })
    }
}

/// Fetch the PR diff and drop noise files. Returns the kept files and the
/// number skipped.
pub(crate) async fn load_diff(
    provider: &dyn GitProvider,
    filter: &FilterConfig,
) -> Result<(Vec<FileDiff>, usize), RevioError> {
    let files = provider.get_diff().await?;
    let result = DiffFilter::from_config(filter).filter(files);
    if !result.skipped.is_empty() {
        tracing::info!(skipped = result.skipped.len(), kept = result.kept.len(), "filtered diff");
    }
    Ok((result.kept, result.skipped.len()))
}

/// Main PR language, or an empty string when the host cannot tell.
pub(crate) async fn detect_language(provider: &dyn GitProvider, files: &[FileDiff]) -> String {
    let languages = provider.get_languages().await.unwrap_or_else(|e| {
        tracing::debug!(error = %e, "could not fetch repository languages");
        Default::default()
    });
    main_language(&languages, files.iter().map(|f| f.path()))
}

/// Tokens left for the diff after the prompt rendered without one.
pub(crate) fn prompt_budget(
    template: &PromptTemplate,
    vars: &PromptVars,
    context_limit: usize,
) -> Result<usize, RevioError> {
    let empty = render_prompt(template, vars)?;
    let used = estimate_tokens(&empty.system) + estimate_tokens(&empty.user);
    let budget = diff_budget(context_limit, used);
    tracing::debug!(context_limit, prompt_tokens = used, budget, "diff token budget");
    Ok(budget)
}
