//! The ask tool: answer a free-text question about a PR.

use std::fmt;
use std::sync::Arc;

use revio_core::{PrMetadata, RevioConfig, RevioError};
use revio_difflens::chunker::fit_single;
use serde::Serialize;

use crate::llm::{chat_with_fallback, ChatModel};
use crate::pipeline::{detect_language, load_diff, prompt_budget};
use crate::prompt::{log_prompt, render_prompt, PromptVars, QUESTIONS};
use crate::provider::GitProvider;

const PREPARING_ANSWER: &str = "Preparing answer...";

/// A question and the model's answer.
///
/// # Examples
///
/// ```
/// use revio_review::questions::Answer;
///
/// let answer = Answer::new("Is this safe?", "  Yes.\n");
/// assert_eq!(answer.comment(), "Question: Is this safe?\n\nAnswer:\nYes.\n\n");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Answer {
    /// The question as asked.
    pub question: String,
    /// Model answer, trimmed.
    pub answer: String,
    /// Whether the answer was posted to the PR.
    pub published: bool,
}

impl Answer {
    pub fn new(question: &str, answer: &str) -> Self {
        Self {
            question: question.to_string(),
            answer: answer.trim().to_string(),
            published: false,
        }
    }

    /// The PR comment body.
    pub fn comment(&self) -> String {
        format!("Question: {}\n\nAnswer:\n{}\n\n", self.question, self.answer)
    }
}

impl fmt::Display for Answer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.comment().trim_end())
    }
}

/// The ask tool.
pub struct Questions {
    provider: Arc<dyn GitProvider>,
    llm: Arc<dyn ChatModel>,
    config: RevioConfig,
    question: String,
}

impl Questions {
    /// `question` is the words of the question joined with spaces.
    pub fn new(
        provider: Arc<dyn GitProvider>,
        llm: Arc<dyn ChatModel>,
        config: RevioConfig,
        question: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            llm,
            config,
            question: question.into(),
        }
    }

    /// Answer the question, posting the answer unless publishing is off.
    ///
    /// Returns `Ok(None)` when no model could answer; that failure is
    /// logged and nothing is posted.
    ///
    /// # Errors
    ///
    /// Returns an error if the PR cannot be fetched or the prompt cannot be
    /// rendered.
    pub async fn run(&self) -> Result<Option<Answer>, RevioError> {
        let publish = self.config.output.publish_output;
        let provider = self.provider.as_ref();

        tracing::info!(question = %self.question, "answering question");
        let meta = provider.get_metadata().await?;

        if publish {
            if let Err(e) = provider.publish_comment(PREPARING_ANSWER, true).await {
                tracing::warn!(error = %e, "could not post progress comment");
            }
        }

        let result = self.answer(&meta).await;

        if publish {
            if let Err(e) = provider.remove_initial_comment().await {
                tracing::warn!(error = %e, "could not remove progress comment");
            }
        }

        let Some(mut answer) = result? else {
            return Ok(None);
        };
        if publish {
            match provider.publish_comment(&answer.comment(), false).await {
                Ok(()) => answer.published = true,
                Err(e) => tracing::warn!(error = %e, "failed to publish answer"),
            }
        }
        Ok(Some(answer))
    }

    async fn answer(&self, meta: &PrMetadata) -> Result<Option<Answer>, RevioError> {
        let provider = self.provider.as_ref();
        let (files, _) = load_diff(provider, &self.config.filter).await?;

        let mut vars = PromptVars {
            title: meta.title.clone(),
            branch: meta.branch.clone(),
            description: meta.description.clone(),
            language: detect_language(provider, &files).await,
            commit_messages_str: meta.commit_messages_str(),
            questions: self.question.clone(),
            ..PromptVars::default()
        };

        let models = self.config.llm.models();
        let primary = models.first().copied().unwrap_or(self.config.llm.model.as_str());
        let budget = prompt_budget(&QUESTIONS, &vars, self.config.llm.context_limit(primary))?;
        vars.diff = fit_single(&files, budget).text;

        let verbosity = self.config.output.verbosity_level;
        let prompt = render_prompt(&QUESTIONS, &vars)?;
        log_prompt(&prompt, verbosity);

        match chat_with_fallback(self.llm.as_ref(), &models, &prompt.system, &prompt.user).await {
            Ok(completion) => {
                if verbosity >= 2 {
                    tracing::info!("\nAI response:\n{}", completion.text);
                }
                Ok(Some(Answer::new(&self.question, &completion.text)))
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to generate an answer");
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn answer_is_trimmed() {
        let a = Answer::new("why?", "\n\n  because  \n");
        assert_eq!(a.answer, "because");
        assert_eq!(a.comment(), "Question: why?\n\nAnswer:\nbecause\n\n");
    }

    #[test]
    fn display_drops_trailing_blank_lines() {
        let a = Answer::new("q", "a");
        assert_eq!(a.to_string(), "Question: q\n\nAnswer:\na");
    }

    #[test]
    fn serializes_camel_case() {
        let json = serde_json::to_value(Answer::new("q", "a")).unwrap();
        assert_eq!(json["published"], false);
        assert_eq!(json["question"], "q");
    }
}
