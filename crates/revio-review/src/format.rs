//! Markdown rendering of suggestions for PR comments and terminal output.

use std::fmt::Write;

use revio_core::Suggestion;
use revio_difflens::language::language_for_path;

/// Body posted when a run produced nothing.
pub const NO_SUGGESTIONS: &str = "No suggestions found to improve this PR.";

const SUMMARY_WRAP: usize = 90;

/// Insert `<br>` between words so no run exceeds roughly `width` characters.
///
/// # Examples
///
/// ```
/// use revio_review::format::insert_br_after_x_chars;
///
/// assert_eq!(insert_br_after_x_chars("short", 90), "short");
/// assert_eq!(insert_br_after_x_chars("aaa bbb ccc", 7), "aaa bbb<br>ccc");
/// ```
pub fn insert_br_after_x_chars(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len() + 16);
    let mut line_len = 0;
    for word in text.split(' ') {
        let len = word.chars().count();
        if line_len > 0 && line_len + 1 + len > width {
            out.push_str("<br>");
            line_len = 0;
        } else if line_len > 0 {
            out.push(' ');
            line_len += 1;
        }
        out.push_str(word);
        line_len += len;
    }
    out
}

/// Re-indent `snippet` so its first line matches `head_line`'s indentation.
///
/// Only adds indentation; a snippet already indented deeper is returned as-is.
///
/// # Examples
///
/// ```
/// use revio_review::format::dedent_code;
///
/// let code = "if x {\n    y();\n}";
/// assert_eq!(dedent_code(Some("        if x {"), code), "        if x {\n            y();\n        }");
/// assert_eq!(dedent_code(None, code), code);
/// ```
pub fn dedent_code(head_line: Option<&str>, snippet: &str) -> String {
    let (Some(original), Some(first)) = (head_line, snippet.lines().next()) else {
        return snippet.to_string();
    };
    let delta = indent_width(original).saturating_sub(indent_width(first));
    if delta == 0 {
        return snippet.to_string();
    }
    let pad = " ".repeat(delta);
    snippet
        .lines()
        .map(|line| {
            if line.trim().is_empty() {
                line.to_string()
            } else {
                format!("{pad}{line}")
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn indent_width(line: &str) -> usize {
    line.len() - line.trim_start().len()
}

/// `**Suggestion:** {content} [{label}]` followed by a committable block.
pub fn code_suggestion_body(suggestion: &Suggestion, improved_code: &str) -> String {
    format!(
        "{}\n```suggestion\n{}\n```",
        inline_comment_body(suggestion),
        improved_code.trim_end()
    )
}

/// `**Suggestion:** {content} [{label}]`.
pub fn inline_comment_body(suggestion: &Suggestion) -> String {
    format!(
        "**Suggestion:** {} [{}]",
        suggestion.suggestion_content.trim_end(),
        suggestion.label.trim()
    )
}

fn clean_label(label: &str) -> &str {
    label.trim().trim_matches(|c| c == '\'' || c == '"')
}

fn fence_language(path: &str) -> &'static str {
    language_for_path(path).unwrap_or_default()
}

/// Group by cleaned label, labels in first-seen order.
fn group_by_label(suggestions: &[Suggestion]) -> Vec<(&str, Vec<&Suggestion>)> {
    let mut groups: Vec<(&str, Vec<&Suggestion>)> = Vec::new();
    for s in suggestions {
        let label = clean_label(&s.label);
        match groups.iter_mut().find(|(l, _)| *l == label) {
            Some((_, members)) => members.push(s),
            None => groups.push((label, vec![s])),
        }
    }
    groups
}

/// HTML/markdown table of suggestions grouped by label, for the summary comment.
///
/// `link` maps a file and line range to a web URL. With `gfm` the code
/// examples are collapsed in `<details>` blocks.
pub fn summary_table(
    suggestions: &[Suggestion],
    gfm: bool,
    link: &dyn Fn(&str, u32, u32) -> String,
) -> String {
    let mut body = String::from("## PR Code Suggestions\n\n<table>");
    let _ = write!(
        body,
        "<thead><tr><th></th><th>Suggestions{}</th></tr></thead><tbody>",
        "&nbsp; ".repeat(65)
    );

    for (label, group) in group_by_label(suggestions) {
        let _ = write!(body, "<tr><td><strong>{label}</strong></td><td><table>");
        for s in group {
            let link = link(
                s.relevant_file.trim(),
                s.relevant_lines_start,
                s.relevant_lines_end,
            );
            let content = insert_br_after_x_chars(s.suggestion_content.trim_end(), SUMMARY_WRAP);
            let lang = fence_language(&s.relevant_file);

            let mut example = String::new();
            if gfm {
                example.push_str("<details> <summary> Example code:</summary>\n\n___\n\n");
            }
            let _ = write!(
                example,
                "Existing code:\n```{lang}\n{}\n```\nImproved code:\n```{lang}\n{}\n```\n",
                s.existing_code.trim_end(),
                s.improved_code.trim_end()
            );
            if gfm {
                example.push_str("</details>\n");
            }

            let _ = write!(
                body,
                "\n<tr>\n  <td>\n\n\n**{content}**\n\n[{file} [{start}-{end}]]({link})\n\n{example}\n  </td>\n\n</tr>\n",
                file = s.relevant_file.trim(),
                start = s.relevant_lines_start,
                end = s.relevant_lines_end,
            );
        }
        body.push_str("</table></td></tr>");
    }
    body.push_str("</tbody></table>");
    body
}

/// Plain markdown listing for terminal or `--format markdown` output.
pub fn suggestions_markdown(suggestions: &[Suggestion]) -> String {
    if suggestions.is_empty() {
        return format!("{NO_SUGGESTIONS}\n");
    }
    let mut out = String::from("## PR Code Suggestions\n\n");
    for (i, s) in suggestions.iter().enumerate() {
        let lang = fence_language(&s.relevant_file);
        let _ = writeln!(
            out,
            "### {}. [{}] {} ({}-{})\n",
            i + 1,
            clean_label(&s.label),
            s.relevant_file,
            s.relevant_lines_start,
            s.relevant_lines_end
        );
        if !s.suggestion_content.is_empty() {
            let _ = writeln!(out, "{}\n", s.suggestion_content.trim_end());
        }
        let _ = writeln!(
            out,
            "Existing code:\n```{lang}\n{}\n```\n\nImproved code:\n```{lang}\n{}\n```\n",
            s.existing_code.trim_end(),
            s.improved_code.trim_end()
        );
    }
    out
}
