//! Line-numbered diff rendering for prompts.
//!
//! Every hunk is shown twice: a `__new hunk__` block with absolute new-side
//! line numbers (context plus added lines) and, when the hunk removes
//! anything, an `__old hunk__` block with context plus removed lines. The
//! numbers let the model point at `relevant_lines_start`/`relevant_lines_end`.

use std::fmt::Write;

use revio_core::DiffHunk;

use crate::parser::FileDiff;

/// Render a single file with numbered hunks.
///
/// # Examples
///
/// ```
/// use revio_difflens::parser::parse_unified_diff;
/// use revio_difflens::render::render_file;
///
/// let diff = "--- a/a.rs\n+++ b/a.rs\n@@ -1,2 +1,2 @@\n fn a() {\n-    old();\n+    new();\n";
/// let files = parse_unified_diff(diff).unwrap();
/// let out = render_file(&files[0]);
/// assert!(out.starts_with("## file: 'a.rs'"));
/// assert!(out.contains("2 +    new();"));
/// assert!(out.contains("__old hunk__\n fn a() {\n-    old();"));
/// ```
pub fn render_file(file: &FileDiff) -> String {
    let mut out = file_header(file);
    if file.is_deleted_file {
        out.push_str("\nFile was deleted.\n");
        return out;
    }
    for hunk in &file.hunks {
        out.push('\n');
        out.push_str(&render_hunk(hunk));
    }
    out
}

/// The `## file: '...'` line that opens every rendered file.
pub fn file_header(file: &FileDiff) -> String {
    format!("## file: '{}'\n", file.path().display())
}

/// Render several files separated by blank lines.
pub fn render_files(files: &[FileDiff]) -> String {
    files
        .iter()
        .map(render_file)
        .collect::<Vec<_>>()
        .join("\n")
}

/// `@@ -a,b +c,d @@` header for a hunk.
pub fn hunk_header(hunk: &DiffHunk) -> String {
    format!(
        "@@ -{},{} +{},{} @@",
        hunk.old_start, hunk.old_lines, hunk.new_start, hunk.new_lines
    )
}

/// One hunk with its header, numbered new side and optional old side.
pub fn render_hunk(hunk: &DiffHunk) -> String {
    let mut out = hunk_header(hunk);
    out.push('\n');

    let mut new_lines = Vec::new();
    let mut old_lines = Vec::new();
    let mut has_removed = false;
    for line in hunk.content.lines() {
        match line.chars().next() {
            Some('+') => new_lines.push(line),
            Some('-') => {
                has_removed = true;
                old_lines.push(line);
            }
            _ => {
                new_lines.push(line);
                old_lines.push(line);
            }
        }
    }

    out.push_str("__new hunk__\n");
    for (n, line) in (u64::from(hunk.new_start)..).zip(new_lines) {
        let _ = writeln!(out, "{n} {line}");
    }

    if has_removed {
        out.push_str("__old hunk__\n");
        for line in old_lines {
            out.push_str(line);
            out.push('\n');
        }
    }
    out
}
