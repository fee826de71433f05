use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::RevioError;

/// Top-level configuration loaded from `.revio.toml`.
///
/// Supports layered resolution: CLI flags > env vars > local config > defaults.
///
/// # Examples
///
/// ```
/// use revio_core::RevioConfig;
///
/// let config = RevioConfig::default();
/// assert_eq!(config.suggestions.num_code_suggestions, 4);
/// assert!(config.output.publish_output);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RevioConfig {
    /// LLM provider settings.
    #[serde(default)]
    pub llm: LlmConfig,
    /// Git hosting provider settings.
    #[serde(default)]
    pub git: GitConfig,
    /// Code suggestion behavior.
    #[serde(default)]
    pub suggestions: SuggestionsConfig,
    /// Publishing and verbosity.
    #[serde(default)]
    pub output: OutputConfig,
    /// Files to keep out of the prompt.
    #[serde(default)]
    pub filter: FilterConfig,
}

impl RevioConfig {
    /// Load configuration from a TOML file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`RevioError::FileNotFound`] if the file does not exist,
    /// [`RevioError::Io`] if it cannot be read, or [`RevioError::Toml`] if the
    /// content is not valid TOML.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use revio_core::RevioConfig;
    /// use std::path::Path;
    ///
    /// let config = RevioConfig::from_file(Path::new(".revio.toml")).unwrap();
    /// ```
    pub fn from_file(path: &Path) -> Result<Self, RevioError> {
        if !path.exists() {
            return Err(RevioError::FileNotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns [`RevioError::Toml`] if parsing fails.
    ///
    /// # Examples
    ///
    /// ```
    /// use revio_core::RevioConfig;
    ///
    /// let toml = r#"
    /// [suggestions]
    /// num_code_suggestions = 6
    /// "#;
    /// let config = RevioConfig::from_toml(toml).unwrap();
    /// assert_eq!(config.suggestions.num_code_suggestions, 6);
    /// ```
    pub fn from_toml(content: &str) -> Result<Self, RevioError> {
        let config: Self = toml::from_str(content)?;
        Ok(config)
    }
}

/// Known context windows, in tokens. Looked up by exact name first, then by
/// the longest matching prefix.
const MODEL_CONTEXT_LIMITS: &[(&str, usize)] = &[
    ("gpt-3.5-turbo", 4_000),
    ("gpt-3.5-turbo-16k", 16_000),
    ("gpt-4", 8_000),
    ("gpt-4-32k", 32_000),
    ("gpt-4-turbo", 128_000),
    ("gpt-4o", 128_000),
    ("gpt-4o-mini", 128_000),
    ("gpt-4.1", 1_000_000),
    ("o1", 200_000),
    ("o3", 200_000),
    ("claude-2", 100_000),
    ("claude-3", 200_000),
    ("claude-sonnet-4", 200_000),
    ("claude-opus-4", 200_000),
];

const DEFAULT_CONTEXT_LIMIT: usize = 8_000;

/// Return the context window for `model`, ignoring any `provider/` prefix.
///
/// # Examples
///
/// ```
/// use revio_core::model_context_limit;
///
/// assert_eq!(model_context_limit("gpt-4"), 8_000);
/// assert_eq!(model_context_limit("openai/gpt-4o"), 128_000);
/// assert_eq!(model_context_limit("claude-3-5-sonnet-latest"), 200_000);
/// assert_eq!(model_context_limit("some-local-model"), 8_000);
/// ```
pub fn model_context_limit(model: &str) -> usize {
    let name = model.rsplit('/').next().unwrap_or(model);
    if let Some((_, limit)) = MODEL_CONTEXT_LIMITS.iter().find(|(m, _)| *m == name) {
        return *limit;
    }
    MODEL_CONTEXT_LIMITS
        .iter()
        .filter(|(m, _)| name.starts_with(m))
        .max_by_key(|(m, _)| m.len())
        .map_or(DEFAULT_CONTEXT_LIMIT, |(_, limit)| *limit)
}

/// LLM provider configuration.
///
/// # Examples
///
/// ```
/// use revio_core::LlmConfig;
///
/// let config = LlmConfig::default();
/// assert_eq!(config.model, "gpt-4o");
/// assert_eq!(config.models(), vec!["gpt-4o", "gpt-4o-mini"]);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Primary model identifier.
    #[serde(default = "default_model")]
    pub model: String,
    /// Models tried in order when the primary model fails.
    #[serde(default = "default_fallback_models")]
    pub fallback_models: Vec<String>,
    /// API key for the provider.
    pub api_key: Option<String>,
    /// Custom base URL for API requests.
    pub base_url: Option<String>,
    /// Override for the model's context window.
    pub max_input_tokens: Option<usize>,
    /// Sampling temperature for suggestion and question prompts.
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// HTTP timeout for a single completion request.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_model() -> String {
    "gpt-4o".into()
}

fn default_fallback_models() -> Vec<String> {
    vec!["gpt-4o-mini".into()]
}

fn default_temperature() -> f32 {
    0.2
}

fn default_timeout_secs() -> u64 {
    120
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            fallback_models: default_fallback_models(),
            api_key: None,
            base_url: None,
            max_input_tokens: None,
            temperature: default_temperature(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl LlmConfig {
    /// The primary model followed by the fallbacks, without duplicates.
    pub fn models(&self) -> Vec<&str> {
        let mut models: Vec<&str> = vec![self.model.as_str()];
        for m in &self.fallback_models {
            if !models.contains(&m.as_str()) {
                models.push(m);
            }
        }
        models
    }

    /// Context window for `model`, honoring `max_input_tokens`.
    pub fn context_limit(&self, model: &str) -> usize {
        self.max_input_tokens
            .unwrap_or_else(|| model_context_limit(model))
    }

    /// Environment variable holding the API key. Every backend speaks the
    /// OpenAI chat completions API, whatever serves it.
    pub const API_KEY_ENV: &'static str = "OPENAI_API_KEY";

    /// API key from the config, falling back to [`Self::API_KEY_ENV`].
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var(Self::API_KEY_ENV).ok())
    }
}

/// Which git hosting API to talk to.
///
/// # Examples
///
/// ```
/// use revio_core::GitProviderKind;
///
/// let kind: GitProviderKind = "gitlab".parse().unwrap();
/// assert_eq!(kind, GitProviderKind::Gitlab);
/// assert_eq!(GitProviderKind::default(), GitProviderKind::Auto);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GitProviderKind {
    /// Infer from the PR URL.
    #[default]
    Auto,
    /// GitHub or GitHub Enterprise.
    Github,
    /// GitLab (hosted or self-managed).
    Gitlab,
}

impl fmt::Display for GitProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GitProviderKind::Auto => write!(f, "auto"),
            GitProviderKind::Github => write!(f, "github"),
            GitProviderKind::Gitlab => write!(f, "gitlab"),
        }
    }
}

impl FromStr for GitProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(GitProviderKind::Auto),
            "github" => Ok(GitProviderKind::Github),
            "gitlab" => Ok(GitProviderKind::Gitlab),
            other => Err(format!("unknown git provider: {other}")),
        }
    }
}

/// Git hosting provider configuration.
///
/// # Examples
///
/// ```
/// use revio_core::GitConfig;
///
/// let config = GitConfig::default();
/// assert_eq!(config.github_api_url, "https://api.github.com");
/// assert_eq!(config.gitlab_url, "https://gitlab.com");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitConfig {
    /// Provider selection (default: inferred from the PR URL).
    #[serde(default)]
    pub provider: GitProviderKind,
    /// Access token; falls back to `GITHUB_TOKEN`/`GH_TOKEN` or `GITLAB_TOKEN`.
    pub token: Option<String>,
    /// GitHub REST API root.
    #[serde(default = "default_github_api_url")]
    pub github_api_url: String,
    /// GitLab instance URL (without `/api/v4`).
    #[serde(default = "default_gitlab_url")]
    pub gitlab_url: String,
}

fn default_github_api_url() -> String {
    "https://api.github.com".into()
}

fn default_gitlab_url() -> String {
    "https://gitlab.com".into()
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            provider: GitProviderKind::Auto,
            token: None,
            github_api_url: default_github_api_url(),
            gitlab_url: default_gitlab_url(),
        }
    }
}

impl GitConfig {
    /// Token from the config, falling back to the provider's env vars.
    pub fn resolve_token(&self, kind: GitProviderKind) -> Option<String> {
        if let Some(token) = &self.token {
            return Some(token.clone());
        }
        match kind {
            GitProviderKind::Gitlab => std::env::var("GITLAB_TOKEN").ok(),
            _ => std::env::var("GITHUB_TOKEN")
                .or_else(|_| std::env::var("GH_TOKEN"))
                .ok(),
        }
    }
}

/// Code suggestion behavior.
///
/// # Examples
///
/// ```
/// use revio_core::SuggestionsConfig;
///
/// let config = SuggestionsConfig::default();
/// assert_eq!(config.num_code_suggestions_per_chunk, 8);
/// assert_eq!(config.max_number_of_calls, 5);
/// assert!(config.include_improved_code);
/// assert!(!config.summarize);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuggestionsConfig {
    /// Suggestions requested in a single-pass review (default: 4).
    #[serde(default = "default_num_code_suggestions")]
    pub num_code_suggestions: usize,
    /// Suggestions requested per chunk in extended mode (default: 8).
    #[serde(default = "default_num_code_suggestions_per_chunk")]
    pub num_code_suggestions_per_chunk: usize,
    /// Always run in extended mode, without `--extended` (default: false).
    #[serde(default)]
    pub auto_extended_mode: bool,
    /// Maximum number of chunks sent to the model in extended mode (default: 5).
    #[serde(default = "default_max_number_of_calls")]
    pub max_number_of_calls: usize,
    /// Rank suggestions with a second model call in single-pass mode (default: false).
    #[serde(default)]
    pub rank_suggestions: bool,
    /// Rank suggestions with a second model call in extended mode (default: true).
    #[serde(default = "default_true")]
    pub rank_extended_suggestions: bool,
    /// Fraction of ranked suggestions kept (default: 0.9).
    #[serde(default = "default_final_clip_factor")]
    pub final_clip_factor: f64,
    /// Publish one summary table instead of inline comments (default: false).
    #[serde(default)]
    pub summarize: bool,
    /// Publish committable suggestion blocks rather than plain inline comments (default: true).
    #[serde(default = "default_true")]
    pub include_improved_code: bool,
    /// Free text appended to the prompt.
    #[serde(default)]
    pub extra_instructions: String,
}

fn default_num_code_suggestions() -> usize {
    4
}

fn default_num_code_suggestions_per_chunk() -> usize {
    8
}

fn default_max_number_of_calls() -> usize {
    5
}

fn default_final_clip_factor() -> f64 {
    0.9
}

fn default_true() -> bool {
    true
}

impl Default for SuggestionsConfig {
    fn default() -> Self {
        Self {
            num_code_suggestions: default_num_code_suggestions(),
            num_code_suggestions_per_chunk: default_num_code_suggestions_per_chunk(),
            auto_extended_mode: false,
            max_number_of_calls: default_max_number_of_calls(),
            rank_suggestions: false,
            rank_extended_suggestions: true,
            final_clip_factor: default_final_clip_factor(),
            summarize: false,
            include_improved_code: true,
            extra_instructions: String::new(),
        }
    }
}

/// Publishing and verbosity settings.
///
/// # Examples
///
/// ```
/// use revio_core::OutputConfig;
///
/// let config = OutputConfig::default();
/// assert!(config.publish_output);
/// assert_eq!(config.verbosity_level, 0);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Post results to the PR; when `false` they are only printed.
    #[serde(default = "default_true")]
    pub publish_output: bool,
    /// 0 = quiet, 1 = log recoverable failures, 2 = also dump prompts and responses.
    #[serde(default)]
    pub verbosity_level: u8,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            publish_output: true,
            verbosity_level: 0,
        }
    }
}

/// Files kept out of the prompt.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Additional glob patterns to skip before sending to the LLM.
    #[serde(default)]
    pub skip_patterns: Vec<String>,
    /// Additional file extensions to skip before sending to the LLM.
    #[serde(default)]
    pub skip_extensions: Vec<String>,
}
