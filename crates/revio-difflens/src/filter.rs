//! Pre-prompt file filtering.
//!
//! Drops lock files, generated code, vendored dependencies, minified files,
//! and files matching configured patterns before they reach the model.

use std::path::{Path, PathBuf};

use revio_core::FilterConfig;

use crate::parser::FileDiff;

/// Files and patterns to skip before prompting.
///
/// # Examples
///
/// ```
/// use revio_difflens::filter::DiffFilter;
///
/// let filter = DiffFilter::default_filter();
/// assert!(filter.should_skip("package-lock.json"));
/// assert!(!filter.should_skip("src/main.rs"));
/// ```
pub struct DiffFilter {
    skip_patterns: Vec<glob::Pattern>,
    skip_extensions: Vec<String>,
}

impl DiffFilter {
    /// Create a filter with only the built-in rules.
    pub fn default_filter() -> Self {
        Self {
            skip_patterns: Vec::new(),
            skip_extensions: Vec::new(),
        }
    }

    /// Create a filter from the `[filter]` config section.
    ///
    /// Invalid glob patterns are logged and ignored.
    ///
    /// # Examples
    ///
    /// ```
    /// use revio_core::FilterConfig;
    /// use revio_difflens::filter::DiffFilter;
    ///
    /// let config = FilterConfig {
    ///     skip_patterns: vec!["docs/**".into()],
    ///     skip_extensions: vec!["snap".into()],
    /// };
    /// let filter = DiffFilter::from_config(&config);
    /// assert!(filter.should_skip("docs/guide.md"));
    /// assert!(filter.should_skip("ui/button.snap"));
    /// ```
    pub fn from_config(config: &FilterConfig) -> Self {
        let skip_patterns = config
            .skip_patterns
            .iter()
            .filter_map(|pat| match glob::Pattern::new(pat) {
                Ok(p) => Some(p),
                Err(e) => {
                    tracing::warn!(pattern = %pat, error = %e, "ignoring invalid skip pattern");
                    None
                }
            })
            .collect();

        Self {
            skip_patterns,
            skip_extensions: config
                .skip_extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_string())
                .collect(),
        }
    }

    /// Check if a single file path should be skipped, ignoring content heuristics.
    pub fn should_skip(&self, path: &str) -> bool {
        self.check_skip(Path::new(path), "").is_some()
    }

    /// Split `diffs` into reviewable files and skipped ones.
    pub fn filter(&self, diffs: Vec<FileDiff>) -> FilterResult {
        let mut kept = Vec::new();
        let mut skipped = Vec::new();

        for diff in diffs {
            let content: String = diff.hunks.iter().map(|h| h.content.as_str()).collect();
            match self.check_skip(diff.path(), &content) {
                Some(reason) => {
                    tracing::debug!(path = %diff.path().display(), %reason, "skipping file");
                    skipped.push(SkippedFile {
                        path: diff.path().to_path_buf(),
                        reason,
                    });
                }
                None => kept.push(diff),
            }
        }

        FilterResult { kept, skipped }
    }

    fn check_skip(&self, path: &Path, content: &str) -> Option<SkipReason> {
        let path_str = path.to_string_lossy();
        let file_name = path
            .file_name()
            .map(|f| f.to_string_lossy().to_string())
            .unwrap_or_default();

        if LOCK_FILES.contains(&file_name.as_str()) {
            return Some(SkipReason::LockFile);
        }
        if path_str
            .split('/')
            .any(|part| matches!(part, "vendor" | "third_party" | "node_modules"))
        {
            return Some(SkipReason::VendoredCode);
        }
        if is_minified(&file_name, content) {
            return Some(SkipReason::MinifiedFile);
        }
        if is_generated(&file_name, content) {
            return Some(SkipReason::GeneratedFile);
        }
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            if self.skip_extensions.iter().any(|s| s == ext) {
                return Some(SkipReason::PatternMatch(format!("*.{ext}")));
            }
        }
        self.skip_patterns
            .iter()
            .find(|p| p.matches(&path_str))
            .map(|p| SkipReason::PatternMatch(p.to_string()))
    }
}

/// Result of filtering diffs.
pub struct FilterResult {
    /// Diffs that passed the filter.
    pub kept: Vec<FileDiff>,
    /// Files that were skipped with reasons.
    pub skipped: Vec<SkippedFile>,
}

/// A file that was skipped during filtering.
#[derive(Debug, Clone)]
pub struct SkippedFile {
    /// Path of the skipped file.
    pub path: PathBuf,
    /// Why the file was skipped.
    pub reason: SkipReason,
}

/// Reason a file was skipped.
///
/// # Examples
///
/// ```
/// use revio_difflens::filter::SkipReason;
///
/// let reason = SkipReason::LockFile;
/// assert_eq!(format!("{reason}"), "lock file");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Package manager lock file.
    LockFile,
    /// Auto-generated code.
    GeneratedFile,
    /// Third-party vendored code.
    VendoredCode,
    /// Minified or bundled file.
    MinifiedFile,
    /// Matched a configured pattern or extension.
    PatternMatch(String),
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::LockFile => write!(f, "lock file"),
            SkipReason::GeneratedFile => write!(f, "generated file"),
            SkipReason::VendoredCode => write!(f, "vendored code"),
            SkipReason::MinifiedFile => write!(f, "minified file"),
            SkipReason::PatternMatch(pat) => write!(f, "pattern: {pat}"),
        }
    }
}

const LOCK_FILES: &[&str] = &[
    "package-lock.json",
    "yarn.lock",
    "Cargo.lock",
    "pnpm-lock.yaml",
    "poetry.lock",
    "Pipfile.lock",
    "Gemfile.lock",
    "composer.lock",
    "go.sum",
];

fn is_minified(file_name: &str, content: &str) -> bool {
    if file_name.ends_with(".min.js") || file_name.ends_with(".min.css") {
        return true;
    }
    content.lines().any(|line| line.len() > 500)
}

fn is_generated(file_name: &str, content: &str) -> bool {
    if file_name.contains(".generated.")
        || file_name.ends_with(".g.dart")
        || file_name.ends_with(".pb.go")
        || file_name.ends_with(".pb.rs")
    {
        return true;
    }
    content.lines().take(5).any(|line| {
        let text = line.get(1..).unwrap_or("");
        text.contains("// Code generated") || text.contains("# AUTO-GENERATED")
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_unified_diff;

    fn make_diff(path: &str, content: &str) -> Vec<FileDiff> {
        let diff = format!(
            "diff --git a/{path} b/{path}\n\
             --- a/{path}\n\
             +++ b/{path}\n\
             @@ -1,0 +1,1 @@\n\
             {content}\n"
        );
        parse_unified_diff(&diff).unwrap()
    }

    #[test]
    fn lock_files_skipped() {
        let filter = DiffFilter::default_filter();
        for name in LOCK_FILES {
            let result = filter.filter(make_diff(name, "+new line"));
            assert!(result.kept.is_empty(), "expected {name} to be skipped");
            assert_eq!(result.skipped[0].reason, SkipReason::LockFile);
        }
    }

    #[test]
    fn generated_files_skipped() {
        let filter = DiffFilter::default_filter();
        for name in &["api.generated.ts", "model.g.dart", "proto.pb.go"] {
            let result = filter.filter(make_diff(name, "+new line"));
            assert_eq!(result.skipped[0].reason, SkipReason::GeneratedFile);
        }

        let result = filter.filter(make_diff("gen.go", "+// Code generated by protoc. DO NOT EDIT."));
        assert_eq!(result.skipped[0].reason, SkipReason::GeneratedFile);
    }

    #[test]
    fn minified_and_vendored_skipped() {
        let filter = DiffFilter::default_filter();

        let result = filter.filter(make_diff("app.min.js", "+var x=1;"));
        assert_eq!(result.skipped[0].reason, SkipReason::MinifiedFile);

        let long_line = format!("+{}", "x".repeat(501));
        let result = filter.filter(make_diff("bundle.js", &long_line));
        assert_eq!(result.skipped[0].reason, SkipReason::MinifiedFile);

        let result = filter.filter(make_diff("vendor/lib.go", "+line"));
        assert_eq!(result.skipped[0].reason, SkipReason::VendoredCode);
    }

    #[test]
    fn configured_patterns_and_extensions() {
        let config = FilterConfig {
            skip_patterns: vec!["*.test.ts".into(), "[invalid".into()],
            skip_extensions: vec![".snap".into()],
        };
        let filter = DiffFilter::from_config(&config);

        let result = filter.filter(make_diff("auth.test.ts", "+test line"));
        assert!(matches!(result.skipped[0].reason, SkipReason::PatternMatch(_)));

        let result = filter.filter(make_diff("ui/card.snap", "+snapshot"));
        assert_eq!(
            result.skipped[0].reason,
            SkipReason::PatternMatch("*.snap".into())
        );

        let result = filter.filter(make_diff("src/auth.ts", "+real code"));
        assert_eq!(result.kept.len(), 1);
        assert!(result.skipped.is_empty());
    }
}
