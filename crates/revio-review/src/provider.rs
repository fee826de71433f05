//! Git hosting abstraction.
//!
//! Pipelines talk to a [`GitProvider`]; [`create_provider`] picks GitHub or
//! GitLab from a PR reference and the `[git]` config.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use revio_core::{GitConfig, GitProviderKind, InlineComment, PrMetadata, RevioError};
use revio_difflens::parser::FileDiff;

use crate::github::GitHubProvider;
use crate::gitlab::GitLabProvider;

/// Optional provider features.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// Plain comments anchored to a line.
    InlineComments,
    /// Committable suggestion blocks.
    CodeSuggestions,
    /// `<details>` and other GitHub-flavored markdown.
    GfmMarkdown,
}

/// Read and write access to one pull/merge request.
#[async_trait]
pub trait GitProvider: Send + Sync {
    /// Title, branch, description and commit messages.
    async fn get_metadata(&self) -> Result<PrMetadata, RevioError>;

    /// Repository languages with their sizes as reported by the host.
    async fn get_languages(&self) -> Result<BTreeMap<String, u64>, RevioError>;

    /// The PR diff, one entry per changed file.
    async fn get_diff(&self) -> Result<Vec<FileDiff>, RevioError>;

    /// Content of `path` at the PR head.
    async fn get_file_content(&self, path: &str) -> Result<String, RevioError>;

    /// Post a PR-level comment. Temporary comments are remembered so
    /// [`remove_initial_comment`](Self::remove_initial_comment) can delete them.
    async fn publish_comment(&self, body: &str, temporary: bool) -> Result<(), RevioError>;

    /// Delete every temporary comment posted so far.
    async fn remove_initial_comment(&self) -> Result<(), RevioError>;

    /// Publish committable suggestion blocks as one batch.
    ///
    /// Returns how many items the host rejected while the rest were posted.
    /// An error means nothing was posted.
    async fn publish_code_suggestions(&self, items: &[InlineComment]) -> Result<usize, RevioError>;

    /// Publish plain inline comments as one batch. Same contract as
    /// [`publish_code_suggestions`](Self::publish_code_suggestions).
    async fn publish_inline_comments(&self, items: &[InlineComment]) -> Result<usize, RevioError>;

    /// Web link to a line range of a changed file.
    fn get_line_link(&self, path: &str, start: u32, end: u32) -> String;

    /// Whether the provider supports `capability`.
    fn is_supported(&self, capability: Capability) -> bool;
}

/// A parsed pull/merge request reference.
///
/// # Examples
///
/// ```
/// use revio_core::GitProviderKind;
/// use revio_review::provider::{parse_pr_ref, PrRef};
///
/// let pr = parse_pr_ref("https://github.com/octocat/hello-world/pull/42", GitProviderKind::Auto).unwrap();
/// assert_eq!(pr, PrRef::Github { owner: "octocat".into(), repo: "hello-world".into(), number: 42 });
///
/// let mr = parse_pr_ref("https://gitlab.com/group/sub/proj/-/merge_requests/7", GitProviderKind::Auto).unwrap();
/// assert!(matches!(mr, PrRef::Gitlab { iid: 7, .. }));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrRef {
    /// A GitHub pull request.
    Github {
        /// Repository owner.
        owner: String,
        /// Repository name.
        repo: String,
        /// PR number.
        number: u64,
    },
    /// A GitLab merge request.
    Gitlab {
        /// Instance URL taken from the reference, if it was a full URL.
        host: Option<String>,
        /// Full project path (`group/subgroup/project`).
        project: String,
        /// Merge request IID.
        iid: u64,
    },
}

impl fmt::Display for PrRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrRef::Github { owner, repo, number } => write!(f, "{owner}/{repo}#{number}"),
            PrRef::Gitlab { project, iid, .. } => write!(f, "{project}!{iid}"),
        }
    }
}

/// Parse a PR URL or `owner/repo#N` shorthand.
///
/// Full URLs decide the provider themselves. Shorthand refers to GitHub
/// unless `kind` is [`GitProviderKind::Gitlab`].
///
/// # Errors
///
/// Returns [`RevioError::Config`] for anything unrecognised, or when the URL
/// contradicts an explicitly configured provider.
pub fn parse_pr_ref(reference: &str, kind: GitProviderKind) -> Result<PrRef, RevioError> {
    let reference = reference.trim().trim_end_matches('/');
    let invalid = || {
        RevioError::Config(format!(
            "invalid PR reference '{reference}', expected a PR URL or owner/repo#number"
        ))
    };

    if let Some((scheme, rest)) = reference.split_once("://") {
        let (host, path) = rest.split_once('/').ok_or_else(invalid)?;

        if let Some((project, iid)) = path.split_once("/-/merge_requests/") {
            if kind == GitProviderKind::Github {
                return Err(RevioError::Config(format!(
                    "'{reference}' is a GitLab merge request but git.provider is github"
                )));
            }
            return Ok(PrRef::Gitlab {
                host: Some(format!("{scheme}://{host}")),
                project: project.to_string(),
                iid: parse_number(iid.split('/').next().unwrap_or(iid))?,
            });
        }

        let parts: Vec<&str> = path.split('/').collect();
        if let [owner, repo, "pull", number, ..] = parts.as_slice() {
            if kind == GitProviderKind::Gitlab {
                return Err(RevioError::Config(format!(
                    "'{reference}' is a GitHub pull request but git.provider is gitlab"
                )));
            }
            return Ok(PrRef::Github {
                owner: owner.to_string(),
                repo: repo.to_string(),
                number: parse_number(number)?,
            });
        }
        return Err(invalid());
    }

    let (path, number) = reference.split_once('#').ok_or_else(invalid)?;
    let number = parse_number(number)?;
    if kind == GitProviderKind::Gitlab {
        if path.is_empty() {
            return Err(invalid());
        }
        return Ok(PrRef::Gitlab {
            host: None,
            project: path.to_string(),
            iid: number,
        });
    }
    match path.split_once('/') {
        Some((owner, repo)) if !owner.is_empty() && !repo.is_empty() && !repo.contains('/') => {
            Ok(PrRef::Github {
                owner: owner.to_string(),
                repo: repo.to_string(),
                number,
            })
        }
        _ => Err(invalid()),
    }
}

fn parse_number(raw: &str) -> Result<u64, RevioError> {
    raw.parse()
        .map_err(|_| RevioError::Config(format!("invalid PR number: {raw}")))
}

/// Build the provider for `pr`.
///
/// # Errors
///
/// Returns [`RevioError::Config`] if no token is available, or
/// [`RevioError::Git`] if the HTTP clients cannot be built.
pub fn create_provider(pr: &PrRef, config: &GitConfig) -> Result<Arc<dyn GitProvider>, RevioError> {
    match pr {
        PrRef::Github { owner, repo, number } => {
            let token = config.resolve_token(GitProviderKind::Github).ok_or_else(|| {
                RevioError::Config(
                    "no GitHub token: set git.token, GITHUB_TOKEN or GH_TOKEN".into(),
                )
            })?;
            let provider =
                GitHubProvider::new(&config.github_api_url, &token, owner, repo, *number)?;
            Ok(Arc::new(provider))
        }
        PrRef::Gitlab { host, project, iid } => {
            let token = config.resolve_token(GitProviderKind::Gitlab).ok_or_else(|| {
                RevioError::Config("no GitLab token: set git.token or GITLAB_TOKEN".into())
            })?;
            let base = host.as_deref().unwrap_or(&config.gitlab_url);
            let provider = GitLabProvider::new(base, &token, project, *iid)?;
            Ok(Arc::new(provider))
        }
    }
}
