use std::path::PathBuf;

/// Errors that can occur across revio.
///
/// Each variant wraps a specific error domain. Library crates use this type
/// directly; the binary crate reports them as `miette` diagnostics.
///
/// # Examples
///
/// ```
/// use revio_core::RevioError;
///
/// let err = RevioError::Config("missing API key".into());
/// assert!(err.to_string().contains("missing API key"));
/// ```
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum RevioError {
    /// Filesystem I/O failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid or missing configuration.
    #[error("configuration error: {0}")]
    #[diagnostic(help("check .revio.toml and the API key / token environment variables"))]
    Config(String),

    /// Git hosting API failure (GitHub, GitLab).
    #[error("git provider error: {0}")]
    Git(String),

    /// Diff or model output parsing failure.
    #[error("parse error: {0}")]
    Parse(String),

    /// LLM API or response error.
    #[error("LLM error: {0}")]
    Llm(String),

    /// Prompt template rendering failure.
    #[error("template error: {0}")]
    Template(#[from] minijinja::Error),

    /// TOML deserialization failure.
    #[error("TOML parse error: {0}")]
    #[diagnostic(help("run `revio init` to see every supported option"))]
    Toml(#[from] toml::de::Error),

    /// A required file was not found.
    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_converts() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: RevioError = io_err.into();
        assert!(err.to_string().contains("gone"));
    }

    #[test]
    fn config_error_displays_message() {
        let err = RevioError::Config("bad value".into());
        assert_eq!(err.to_string(), "configuration error: bad value");
    }

    #[test]
    fn toml_error_converts() {
        let toml_err = toml::from_str::<toml::Value>("a = [1, 2").unwrap_err();
        let err: RevioError = toml_err.into();
        assert!(err.to_string().starts_with("TOML parse error"));
    }

    #[test]
    fn file_not_found_shows_path() {
        let err = RevioError::FileNotFound(PathBuf::from("/tmp/missing.toml"));
        assert!(err.to_string().contains("/tmp/missing.toml"));
    }
}
