//! Prompt templates and rendering.
//!
//! Templates are Jinja-style (`minijinja`) with strict undefined handling,
//! so a variable missing from [`PromptVars`] is an error, not an empty string.

use minijinja::{Environment, UndefinedBehavior};
use revio_core::RevioError;
use serde::Serialize;

/// A system/user template pair.
#[derive(Debug, Clone, Copy)]
pub struct PromptTemplate {
    /// Template for the system message.
    pub system: &'static str,
    /// Template for the user message.
    pub user: &'static str,
}

/// A rendered system/user prompt pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPrompt {
    /// System message text.
    pub system: String,
    /// User message text.
    pub user: String,
}

/// Variables substituted into the templates.
///
/// Every template sees every field; fields a tool does not use stay at
/// their defaults.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PromptVars {
    /// PR title.
    pub title: String,
    /// Source branch.
    pub branch: String,
    /// PR body.
    pub description: String,
    /// Main language of the PR.
    pub language: String,
    /// Line-numbered diff.
    pub diff: String,
    /// How many suggestions to ask for.
    pub num_code_suggestions: usize,
    /// Free-text instructions from the config.
    pub extra_instructions: String,
    /// Numbered commit message list.
    pub commit_messages_str: String,
    /// Ask for shorter output suited to the summary table.
    pub summarize_mode: bool,
    /// User question for the questions tool.
    pub questions: String,
    /// Numbered suggestion list for the ranking prompt.
    pub suggestion_str: String,
}

/// Render `template` with `vars`.
///
/// # Errors
///
/// Returns [`RevioError::Template`] on syntax errors or undefined variables.
///
/// # Examples
///
/// ```
/// use revio_review::prompt::{render_prompt, PromptTemplate, PromptVars};
///
/// let template = PromptTemplate {
///     system: "You review {{ language }} code.",
///     user: "Title: {{ title }}",
/// };
/// let vars = PromptVars {
///     title: "Fix parser".into(),
///     language: "rust".into(),
///     ..PromptVars::default()
/// };
/// let prompt = render_prompt(&template, &vars).unwrap();
/// assert_eq!(prompt.system, "You review rust code.");
/// assert_eq!(prompt.user, "Title: Fix parser");
/// ```
pub fn render_prompt(
    template: &PromptTemplate,
    vars: &PromptVars,
) -> Result<RenderedPrompt, RevioError> {
    let mut env = Environment::new();
    env.set_undefined_behavior(UndefinedBehavior::Strict);
    env.set_trim_blocks(true);
    env.set_lstrip_blocks(true);

    Ok(RenderedPrompt {
        system: env.render_str(template.system, vars)?,
        user: env.render_str(template.user, vars)?,
    })
}

/// Log a rendered prompt when `verbosity_level` asks for it.
pub fn log_prompt(prompt: &RenderedPrompt, verbosity_level: u8) {
    if verbosity_level >= 2 {
        tracing::info!("\nSystem prompt:\n{}", prompt.system);
        tracing::info!("\nUser prompt:\n{}", prompt.user);
    }
}

/// Prompt asking for YAML code suggestions on a line-numbered diff.
pub const CODE_SUGGESTIONS: PromptTemplate = PromptTemplate {
    system: r#"You are a language model called Revio, that specializes in suggesting code improvements for a Pull Request (PR).
Your task is to provide meaningful and actionable code suggestions, to improve the new code presented in a PR diff.

The diff is shown per file. Each hunk has a '__new hunk__' section, prefixed with the line number in the new version of the file, and optionally an '__old hunk__' section with the removed lines.
Lines starting with '+' were added, lines starting with '-' were removed, other lines are unchanged context.

Specific instructions:
- Provide up to {{ num_code_suggestions }} code suggestions.
- Focus on important suggestions like fixing code problems, issues and bugs. As a second priority, provide suggestions for meaningful code improvements, like performance, vulnerability, modularity, and best practices.
- Suggestions should refer only to code from the '__new hunk__' sections, and focus on new lines of code (lines starting with '+').
- Provide the exact line numbers range (inclusive) for each suggestion.
- Don't suggest to add docstrings, type hints, or comments.
- 'existing_code' and 'improved_code' must differ.
{% if summarize_mode %}
- Keep 'suggestion_content' short: one or two sentences.
{% endif %}
{% if extra_instructions %}

Extra instructions from the user:
======
{{ extra_instructions }}
======
{% endif %}

The output must be a YAML object equivalent to type $PRCodeSuggestions, according to the following Pydantic-like definitions:
=====
class CodeSuggestion:
    relevant_file: str  # the relevant file full path
    suggestion_content: str  # a concrete suggestion for meaningfully improving the new PR code
    existing_code: str  # a code snippet showing the relevant code lines from a '__new hunk__' section
    improved_code: str  # a new code snippet that can be used to replace the relevant lines in the '__new hunk__' code
    relevant_lines_start: int  # the relevant lines start, inclusive, from a '__new hunk__' section
    relevant_lines_end: int  # the relevant lines end, inclusive, from a '__new hunk__' section
    label: str  # a single label for the suggestion, e.g. 'performance', 'enhancement', 'possible issue', 'best practice', 'maintainability'

class PRCodeSuggestions:
    code_suggestions: List[CodeSuggestion]
=====

Example output:
```yaml
code_suggestions:
- relevant_file: |
    src/cache.rs
  suggestion_content: |
    ...
  existing_code: |
    ...
  relevant_lines_start: 12
  relevant_lines_end: 13
  improved_code: |
    ...
  label: |
    ...
```

Each YAML output MUST be after a newline, indented, with block scalar indicator ('|').
"#,
    user: r#"PR Info:

Title: '{{ title }}'

Branch: '{{ branch }}'
{% if description %}

Description:
======
{{ description }}
======
{% endif %}
{% if language %}

Main PR language: '{{ language }}'
{% endif %}
{% if commit_messages_str %}

Commit messages:
======
{{ commit_messages_str }}
======
{% endif %}


The PR Diff:
======
{{ diff }}
======


Response (should be a valid YAML, and nothing else):
```yaml
"#,
};

/// Prompt asking the model to order suggestions by importance.
pub const SORT_SUGGESTIONS: PromptTemplate = PromptTemplate {
    system: r#"You are Revio, a language model that specializes in ranking code suggestions for a Pull Request (PR) by importance.
Rank the suggestions: bug fixes and security issues first, then performance, then maintainability and style.

The output must be a YAML object with a single key 'Sort Order' listing every suggestion once:
```yaml
Sort Order:
  - suggestion number: 1
    importance order: 2
  - suggestion number: 2
    importance order: 1
```
"#,
    user: r#"Code suggestions:
======
{{ suggestion_str }}
======


Response (should be a valid YAML, and nothing else):
```yaml
"#,
};

/// Prompt asking a free-text question about the PR.
pub const QUESTIONS: PromptTemplate = PromptTemplate {
    system: r#"You are Revio, a language model designed to answer questions about a Git Pull Request (PR).
Answer the user's questions about the PR based on its title, description and diff.
Be informative, constructive, and give examples. Try to be as specific as possible, and don't avoid answering the questions.
Make sure not to repeat modifications already implemented in the new PR code.
"#,
    user: r#"PR Info:
Title: '{{ title }}'

Branch: '{{ branch }}'
{% if description %}

Description:
======
{{ description }}
======
{% endif %}
{% if language %}

Main PR language: '{{ language }}'
{% endif %}


The PR Git Diff:
======
{{ diff }}
======


The PR Questions:
======
{{ questions }}
======

Response:
"#,
};

#[cfg(test)]
mod tests {
    use super::*;

    fn vars() -> PromptVars {
        PromptVars {
            title: "Add cache".into(),
            branch: "feature/cache".into(),
            language: "rust".into(),
            diff: "## file: 'src/cache.rs'".into(),
            num_code_suggestions: 4,
            ..PromptVars::default()
        }
    }

    #[test]
    fn suggestions_prompt_substitutes_vars() {
        let prompt = render_prompt(&CODE_SUGGESTIONS, &vars()).unwrap();
        assert!(prompt.system.contains("Provide up to 4 code suggestions."));
        assert!(prompt.user.contains("Title: 'Add cache'"));
        assert!(prompt.user.contains("## file: 'src/cache.rs'"));
        assert!(!prompt.user.contains("Description:"));
        assert!(!prompt.system.contains("Extra instructions"));
    }

    #[test]
    fn optional_sections_appear_when_set() {
        let vars = PromptVars {
            description: "Adds an LRU cache".into(),
            extra_instructions: "Prefer iterators".into(),
            commit_messages_str: "1. add cache".into(),
            summarize_mode: true,
            ..vars()
        };
        let prompt = render_prompt(&CODE_SUGGESTIONS, &vars).unwrap();
        assert!(prompt.system.contains("Prefer iterators"));
        assert!(prompt.system.contains("one or two sentences"));
        assert!(prompt.user.contains("Adds an LRU cache"));
        assert!(prompt.user.contains("1. add cache"));
    }

    #[test]
    fn undefined_variable_is_an_error() {
        let template = PromptTemplate {
            system: "{{ nonexistent }}",
            user: "",
        };
        let err = render_prompt(&template, &vars()).unwrap_err();
        assert!(matches!(err, RevioError::Template(_)));
    }

    #[test]
    fn builtin_templates_render() {
        let vars = PromptVars {
            questions: "Is this thread-safe?".into(),
            suggestion_str: "suggestion 1: {}".into(),
            ..vars()
        };
        let questions = render_prompt(&QUESTIONS, &vars).unwrap();
        assert!(questions.user.contains("Is this thread-safe?"));
        let sort = render_prompt(&SORT_SUGGESTIONS, &vars).unwrap();
        assert!(sort.user.contains("suggestion 1: {}"));
    }
}
