use std::fmt;
use std::path::{Path, PathBuf};

use revio_core::{DiffHunk, RevioError};

/// A complete diff for a single file, containing zero or more hunks.
///
/// # Examples
///
/// ```
/// use revio_difflens::parser::parse_unified_diff;
///
/// let diff = "diff --git a/hello.rs b/hello.rs\n\
///             --- a/hello.rs\n\
///             +++ b/hello.rs\n\
///             @@ -1,2 +1,3 @@\n\
///              fn main() {\n\
///             +    println!(\"hello\");\n\
///              }\n";
/// let files = parse_unified_diff(diff).unwrap();
/// assert_eq!(files.len(), 1);
/// assert_eq!(files[0].path(), std::path::Path::new("hello.rs"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDiff {
    /// Path in the old version.
    pub old_path: PathBuf,
    /// Path in the new version.
    pub new_path: PathBuf,
    /// Parsed hunks for this file.
    pub hunks: Vec<DiffHunk>,
    /// Whether this is a newly created file.
    pub is_new_file: bool,
    /// Whether this file was deleted.
    pub is_deleted_file: bool,
    /// Whether this file was renamed.
    pub is_rename: bool,
}

impl FileDiff {
    fn empty() -> Self {
        Self {
            old_path: PathBuf::new(),
            new_path: PathBuf::new(),
            hunks: Vec::new(),
            is_new_file: false,
            is_deleted_file: false,
            is_rename: false,
        }
    }

    /// The path reviewers know the file by: the new path, or the old one for deletions.
    pub fn path(&self) -> &Path {
        if self.is_deleted_file || self.new_path.as_os_str().is_empty() {
            &self.old_path
        } else {
            &self.new_path
        }
    }

    /// A copy of this file header carrying only `hunks`.
    pub fn with_hunks(&self, hunks: Vec<DiffHunk>) -> Self {
        Self {
            hunks,
            ..self.without_hunks()
        }
    }

    fn without_hunks(&self) -> Self {
        Self {
            old_path: self.old_path.clone(),
            new_path: self.new_path.clone(),
            hunks: Vec::new(),
            is_new_file: self.is_new_file,
            is_deleted_file: self.is_deleted_file,
            is_rename: self.is_rename,
        }
    }
}

impl fmt::Display for FileDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} hunks)", self.path().display(), self.hunks.len())
    }
}

/// Parse a unified diff string (as produced by `git diff` or the GitHub diff
/// media type) into structured [`FileDiff`] entries.
///
/// Handles new files, deleted files, renamed files, patches without a
/// `diff --git` line, and binary files (which are skipped).
///
/// # Errors
///
/// Returns [`RevioError::Parse`] if a hunk header is malformed.
///
/// # Examples
///
/// ```
/// use revio_difflens::parser::parse_unified_diff;
///
/// let files = parse_unified_diff("").unwrap();
/// assert!(files.is_empty());
/// ```
pub fn parse_unified_diff(input: &str) -> Result<Vec<FileDiff>, RevioError> {
    let mut files: Vec<FileDiff> = Vec::new();
    let mut current: Option<FileDiff> = None;
    let mut hunk: Option<OpenHunk> = None;
    let mut is_binary = false;

    for line in input.lines() {
        if let Some(open) = hunk.as_mut() {
            if !open.is_complete() && open.push(line) {
                continue;
            }
        }
        if line.starts_with('\\') {
            continue;
        }
        close_hunk(&mut current, &mut hunk);

        if let Some(paths) = line.strip_prefix("diff --git ") {
            finish_file(&mut files, &mut current, is_binary);
            is_binary = false;
            let mut file = FileDiff::empty();
            // Mode-only changes have no ---/+++ lines to name the file.
            if let Some((old_path, new_path)) = parse_git_header(paths) {
                file.old_path = old_path;
                file.new_path = new_path;
            }
            current = Some(file);
            continue;
        }

        // Plain patches have no "diff --git" line; an old-path header after a
        // finished hunk opens the next file.
        if line.starts_with("--- ") && current.as_ref().map_or(true, |f| !f.hunks.is_empty()) {
            finish_file(&mut files, &mut current, is_binary);
            is_binary = false;
            current = Some(FileDiff::empty());
        }

        let Some(file) = current.as_mut() else {
            continue;
        };

        if line.starts_with("Binary files ") && line.ends_with(" differ") {
            is_binary = true;
        } else if line.starts_with("new file mode") {
            file.is_new_file = true;
        } else if line.starts_with("deleted file mode") {
            file.is_deleted_file = true;
        } else if let Some(from) = line.strip_prefix("rename from ") {
            file.is_rename = true;
            file.old_path = PathBuf::from(from);
        } else if let Some(to) = line.strip_prefix("rename to ") {
            file.is_rename = true;
            file.new_path = PathBuf::from(to);
        } else if let Some(path) = line.strip_prefix("--- ") {
            file.old_path = parse_path(path);
            if file.old_path == Path::new("/dev/null") {
                file.is_new_file = true;
            }
        } else if let Some(path) = line.strip_prefix("+++ ") {
            file.new_path = parse_path(path);
            if file.new_path == Path::new("/dev/null") {
                file.is_deleted_file = true;
            }
        } else if line.starts_with("@@ ") {
            let (old_start, old_lines, new_start, new_lines) = parse_hunk_header(line)?;
            hunk = Some(OpenHunk {
                hunk: DiffHunk {
                    file_path: file.path().to_path_buf(),
                    old_start,
                    old_lines,
                    new_start,
                    new_lines,
                    content: String::new(),
                },
                remaining_old: old_lines,
                remaining_new: new_lines,
            });
        }
    }

    close_hunk(&mut current, &mut hunk);
    finish_file(&mut files, &mut current, is_binary);
    Ok(files)
}

/// A hunk whose body is still being read; the header counts say how many
/// lines of each side are left.
struct OpenHunk {
    hunk: DiffHunk,
    remaining_old: u32,
    remaining_new: u32,
}

impl OpenHunk {
    fn is_complete(&self) -> bool {
        self.remaining_old == 0 && self.remaining_new == 0
    }

    /// Consume a body line. Returns `false` if the line does not belong to the hunk.
    fn push(&mut self, line: &str) -> bool {
        match line.chars().next() {
            Some('+') if self.remaining_new > 0 => {
                self.remaining_new -= 1;
                self.append(line);
            }
            Some('-') if self.remaining_old > 0 => {
                self.remaining_old -= 1;
                self.append(line);
            }
            Some(' ') | None => {
                self.remaining_old = self.remaining_old.saturating_sub(1);
                self.remaining_new = self.remaining_new.saturating_sub(1);
                // Some servers strip the space from blank context lines.
                self.append(if line.is_empty() { " " } else { line });
            }
            Some('\\') => {}
            _ => return false,
        }
        true
    }

    fn append(&mut self, line: &str) {
        self.hunk.content.push_str(line);
        self.hunk.content.push('\n');
    }
}

fn close_hunk(current: &mut Option<FileDiff>, hunk: &mut Option<OpenHunk>) {
    if let Some(open) = hunk.take() {
        if let Some(file) = current.as_mut() {
            file.hunks.push(open.hunk);
        }
    }
}

fn finish_file(files: &mut Vec<FileDiff>, current: &mut Option<FileDiff>, is_binary: bool) {
    if let Some(file) = current.take() {
        if !is_binary {
            files.push(file);
        }
    }
}

/// Paths from `a/<old> b/<new>`. Equal paths are split down the middle so
/// names containing " b/" still parse.
fn parse_git_header(paths: &str) -> Option<(PathBuf, PathBuf)> {
    let paths = paths.trim();
    if !paths.starts_with("a/") {
        return None;
    }
    let half = paths.len() / 2;
    if paths.len() % 2 == 1 && paths.is_char_boundary(half) {
        let (old, rest) = paths.split_at(half);
        if let Some(new) = rest.strip_prefix(' ') {
            if new.starts_with("b/") && old[2..] == new[2..] {
                return Some((parse_path(old), parse_path(new)));
            }
        }
    }
    let (old, new) = paths.split_once(" b/")?;
    Some((parse_path(old), PathBuf::from(new)))
}

fn parse_path(raw: &str) -> PathBuf {
    // Some tools append a tab and a timestamp after the path.
    let raw = raw.split('\t').next().unwrap_or(raw);
    let normalized = raw.trim().trim_matches('"');

    if normalized == "/dev/null" {
        return PathBuf::from("/dev/null");
    }

    let stripped = normalized
        .strip_prefix("a/")
        .or_else(|| normalized.strip_prefix("b/"))
        .unwrap_or(normalized);

    PathBuf::from(stripped)
}

fn parse_hunk_header(line: &str) -> Result<(u32, u32, u32, u32), RevioError> {
    let invalid = || RevioError::Parse(format!("invalid hunk header: {line}"));

    let inner = line
        .strip_prefix("@@ ")
        .and_then(|s| s.find(" @@").map(|end| &s[..end]))
        .ok_or_else(invalid)?;

    let (old, new) = inner.split_once(' ').ok_or_else(invalid)?;
    let old = old.strip_prefix('-').ok_or_else(invalid)?;
    let new = new.strip_prefix('+').ok_or_else(invalid)?;

    let (old_start, old_lines) = parse_range(old).ok_or_else(invalid)?;
    let (new_start, new_lines) = parse_range(new).ok_or_else(invalid)?;

    Ok((old_start, old_lines, new_start, new_lines))
}

fn parse_range(range: &str) -> Option<(u32, u32)> {
    match range.split_once(',') {
        Some((start, count)) => Some((start.parse().ok()?, count.parse().ok()?)),
        None => Some((range.parse().ok()?, 1)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_diff_returns_empty_vec() {
        let files = parse_unified_diff("").unwrap();
        assert!(files.is_empty());
    }

    #[test]
    fn single_file_single_hunk() {
        let diff = "\
diff --git a/src/main.rs b/src/main.rs
index abc1234..def5678 100644
--- a/src/main.rs
+++ b/src/main.rs
@@ -1,3 +1,4 @@
 fn main() {
+    println!(\"hello\");
     let x = 1;
 }
";
        let files = parse_unified_diff(diff).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].new_path, PathBuf::from("src/main.rs"));
        let hunk = &files[0].hunks[0];
        assert_eq!(
            (hunk.old_start, hunk.old_lines, hunk.new_start, hunk.new_lines),
            (1, 3, 1, 4)
        );
        assert!(hunk.content.contains("+    println!"));
    }

    #[test]
    fn multiple_files_and_hunks() {
        let diff = "\
diff --git a/a.rs b/a.rs
--- a/a.rs
+++ b/a.rs
@@ -1,3 +1,4 @@
 fn foo() {
+    bar();
 }
@@ -10,3 +11,4 @@
 fn baz() {
+    qux();
 }
diff --git a/b.rs b/b.rs
--- a/b.rs
+++ b/b.rs
@@ -1 +1,2 @@
 line1
+line2
";
        let files = parse_unified_diff(diff).unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].hunks.len(), 2);
        assert_eq!(files[0].hunks[1].old_start, 10);
        assert_eq!(files[1].path(), Path::new("b.rs"));
        assert_eq!(files[1].hunks[0].old_lines, 1);
    }

    #[test]
    fn new_and_deleted_files() {
        let diff = "\
diff --git a/new.rs b/new.rs
new file mode 100644
--- /dev/null
+++ b/new.rs
@@ -0,0 +1,2 @@
+fn hello() {
+}
diff --git a/old.rs b/old.rs
deleted file mode 100644
--- a/old.rs
+++ /dev/null
@@ -1,2 +0,0 @@
-fn goodbye() {
-}
";
        let files = parse_unified_diff(diff).unwrap();
        assert!(files[0].is_new_file);
        assert_eq!(files[0].hunks[0].old_lines, 0);
        assert!(files[1].is_deleted_file);
        assert_eq!(files[1].path(), Path::new("old.rs"));
        assert_eq!(files[1].hunks[0].file_path, PathBuf::from("old.rs"));
        assert_eq!(files[1].hunks[0].new_lines, 0);
    }

    #[test]
    fn renamed_file_without_hunks() {
        let diff = "\
diff --git a/old_name.rs b/new_name.rs
similarity index 100%
rename from old_name.rs
rename to new_name.rs
";
        let files = parse_unified_diff(diff).unwrap();
        assert_eq!(files.len(), 1);
        assert!(files[0].is_rename);
        assert_eq!(files[0].path(), Path::new("new_name.rs"));
        assert!(files[0].hunks.is_empty());
    }

    #[test]
    fn mode_change_takes_path_from_git_header() {
        let diff = "\
diff --git a/scripts/run.sh b/scripts/run.sh
old mode 100644
new mode 100755
";
        let files = parse_unified_diff(diff).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path(), Path::new("scripts/run.sh"));
        assert_eq!(files[0].old_path, PathBuf::from("scripts/run.sh"));
        assert!(files[0].hunks.is_empty());
    }

    #[test]
    fn git_header_paths_with_spaces() {
        assert_eq!(
            parse_git_header("a/my b/file.rs b/my b/file.rs"),
            Some((PathBuf::from("my b/file.rs"), PathBuf::from("my b/file.rs")))
        );
        assert_eq!(
            parse_git_header("a/old.rs b/new.rs"),
            Some((PathBuf::from("old.rs"), PathBuf::from("new.rs")))
        );
        assert_eq!(parse_git_header("garbage"), None);
    }

    #[test]
    fn removed_line_that_looks_like_header_stays_in_hunk() {
        let diff = "\
diff --git a/notes.md b/notes.md
--- a/notes.md
+++ b/notes.md
@@ -1,2 +1,1 @@
--- a list item
 kept
";
        let files = parse_unified_diff(diff).unwrap();
        assert_eq!(files.len(), 1);
        assert!(files[0].hunks[0].content.contains("--- a list item"));
        assert_eq!(files[0].path(), Path::new("notes.md"));
    }

    #[test]
    fn binary_files_skipped() {
        let diff = "\
diff --git a/image.png b/image.png
Binary files a/image.png and b/image.png differ
diff --git a/code.rs b/code.rs
--- a/code.rs
+++ b/code.rs
@@ -1 +1,2 @@
 line1
+line2
";
        let files = parse_unified_diff(diff).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].new_path, PathBuf::from("code.rs"));
    }

    #[test]
    fn no_newline_marker_dropped() {
        let diff = "\
--- a/f.rs
+++ b/f.rs
@@ -1 +1 @@
-old
\\ No newline at end of file
+new
\\ No newline at end of file
";
        let files = parse_unified_diff(diff).unwrap();
        let content = &files[0].hunks[0].content;
        assert!(!content.contains("No newline"));
        assert_eq!(content, "-old\n+new\n");
    }

    #[test]
    fn malformed_hunk_header_is_an_error() {
        let diff = "--- a/x.rs\n+++ b/x.rs\n@@ -a,b +1 @@\n+x\n";
        assert!(matches!(
            parse_unified_diff(diff),
            Err(RevioError::Parse(_))
        ));
    }

    #[test]
    fn parse_path_handles_quotes_and_timestamps() {
        assert_eq!(parse_path("\"a/src/my file.rs\""), PathBuf::from("src/my file.rs"));
        assert_eq!(
            parse_path("b/src/lib.rs\t2024-01-01 00:00:00"),
            PathBuf::from("src/lib.rs")
        );
    }
}
