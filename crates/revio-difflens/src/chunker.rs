//! Token-budgeted diff packing.
//!
//! [`chunk_diff`] splits a diff into prompt-sized chunks for extended mode,
//! never dropping a hunk. [`fit_single`] squeezes a diff into one prompt,
//! listing the files that did not fit by name.

use std::path::PathBuf;

use crate::parser::FileDiff;
use crate::render::{file_header, render_file, render_files, render_hunk};
use crate::tokens::estimate_tokens;

/// A group of file diffs that fits one prompt.
#[derive(Debug, Clone)]
pub struct DiffChunk {
    /// File diffs in diff order; a file split across chunks appears in each
    /// with the subset of its hunks.
    pub files: Vec<FileDiff>,
    /// Estimated size of the rendered chunk.
    pub tokens: usize,
}

impl DiffChunk {
    /// Line-numbered rendering of the chunk, ready for the prompt.
    pub fn render(&self) -> String {
        render_files(&self.files)
    }
}

/// Split `files` into chunks whose rendering fits `budget` tokens.
///
/// Hunks are packed greedily in diff order. A file that overflows the
/// current chunk continues in the next one with its header repeated. A
/// single hunk larger than `budget` gets a chunk of its own.
///
/// Every input hunk appears in exactly one chunk.
///
/// # Examples
///
/// ```
/// use revio_difflens::chunker::chunk_diff;
/// use revio_difflens::parser::parse_unified_diff;
///
/// let diff = "--- a/a.rs\n+++ b/a.rs\n@@ -1,1 +1,1 @@\n-x\n+y\n";
/// let files = parse_unified_diff(diff).unwrap();
/// let chunks = chunk_diff(&files, 10_000);
/// assert_eq!(chunks.len(), 1);
/// assert_eq!(chunks[0].files[0].hunks.len(), 1);
/// ```
pub fn chunk_diff(files: &[FileDiff], budget: usize) -> Vec<DiffChunk> {
    let mut packer = Packer::new(budget);

    for file in files {
        if file.is_deleted_file || file.hunks.is_empty() {
            packer.push_whole(file);
            continue;
        }

        let header_cost = estimate_tokens(&file_header(file));
        let mut piece = Vec::new();
        let mut piece_cost = header_cost;

        for hunk in &file.hunks {
            let hunk_cost = estimate_tokens(&render_hunk(hunk)) + 1;

            if header_cost + hunk_cost > budget {
                tracing::warn!(
                    path = %file.path().display(),
                    hunk_tokens = hunk_cost,
                    budget,
                    "hunk exceeds chunk budget, sending it alone"
                );
                packer.add_piece(file, std::mem::take(&mut piece), piece_cost);
                piece_cost = header_cost;
                packer.flush();
                packer.add_piece(file, vec![hunk.clone()], header_cost + hunk_cost);
                packer.flush();
                continue;
            }

            if !packer.fits(piece_cost + hunk_cost) {
                packer.add_piece(file, std::mem::take(&mut piece), piece_cost);
                piece_cost = header_cost;
                packer.flush();
            }
            piece.push(hunk.clone());
            piece_cost += hunk_cost;
        }
        packer.add_piece(file, piece, piece_cost);
    }

    packer.finish()
}

struct Packer {
    budget: usize,
    chunks: Vec<DiffChunk>,
    current: DiffChunk,
}

impl Packer {
    fn new(budget: usize) -> Self {
        Self {
            budget,
            chunks: Vec::new(),
            current: DiffChunk {
                files: Vec::new(),
                tokens: 0,
            },
        }
    }

    /// Would `cost` more tokens still fit the current chunk?
    fn fits(&self, cost: usize) -> bool {
        self.current.tokens + separator(&self.current) + cost <= self.budget
    }

    fn add_piece(&mut self, file: &FileDiff, hunks: Vec<revio_core::DiffHunk>, cost: usize) {
        if hunks.is_empty() {
            return;
        }
        self.current.tokens += separator(&self.current) + cost;
        self.current.files.push(file.with_hunks(hunks));
    }

    fn push_whole(&mut self, file: &FileDiff) {
        let cost = estimate_tokens(&render_file(file));
        if !self.fits(cost) {
            self.flush();
        }
        self.current.tokens += separator(&self.current) + cost;
        self.current.files.push(file.clone());
    }

    fn flush(&mut self) {
        if !self.current.files.is_empty() {
            let done = std::mem::replace(
                &mut self.current,
                DiffChunk {
                    files: Vec::new(),
                    tokens: 0,
                },
            );
            self.chunks.push(done);
        }
    }

    fn finish(mut self) -> Vec<DiffChunk> {
        self.flush();
        self.chunks
    }
}

fn separator(chunk: &DiffChunk) -> usize {
    usize::from(!chunk.files.is_empty())
}

/// A diff squeezed into a single prompt.
#[derive(Debug, Clone)]
pub struct FittedDiff {
    /// Rendered diff text, possibly followed by the omitted-file list.
    pub text: String,
    /// Files that did not fit and are listed by name only.
    pub omitted: Vec<PathBuf>,
}

/// Fit `files` into one prompt of at most `budget` tokens.
///
/// When the whole diff fits it is returned as-is. Otherwise whole files
/// are added in diff order until the next one would overflow, and the
/// remaining paths are listed under `Additional modified files:`.
///
/// # Examples
///
/// ```
/// use revio_difflens::chunker::fit_single;
/// use revio_difflens::parser::parse_unified_diff;
///
/// let diff = "--- a/a.rs\n+++ b/a.rs\n@@ -1,1 +1,1 @@\n-x\n+y\n";
/// let files = parse_unified_diff(diff).unwrap();
/// let fitted = fit_single(&files, 10_000);
/// assert!(fitted.omitted.is_empty());
/// assert!(fitted.text.starts_with("## file: 'a.rs'"));
/// ```
pub fn fit_single(files: &[FileDiff], budget: usize) -> FittedDiff {
    let full = render_files(files);
    if estimate_tokens(&full) <= budget {
        return FittedDiff {
            text: full,
            omitted: Vec::new(),
        };
    }

    let all_names = omitted_section(files.iter().map(|f| f.path().to_path_buf()));
    let available = budget.saturating_sub(estimate_tokens(&all_names));

    let mut rendered = Vec::new();
    let mut used = 0;
    let mut included = 0;
    for file in files {
        let text = render_file(file);
        let cost = estimate_tokens(&text) + 1;
        if used + cost > available {
            break;
        }
        used += cost;
        included += 1;
        rendered.push(text);
    }

    let omitted: Vec<PathBuf> = files[included..]
        .iter()
        .map(|f| f.path().to_path_buf())
        .collect();
    tracing::info!(
        included,
        omitted = omitted.len(),
        budget,
        "diff exceeds prompt budget, listing remaining files by name"
    );

    let mut text = rendered.join("\n");
    text.push_str(&omitted_section(omitted.iter().cloned()));
    FittedDiff { text, omitted }
}

fn omitted_section(paths: impl Iterator<Item = PathBuf>) -> String {
    let mut out = String::from("\n\nAdditional modified files:\n");
    for path in paths {
        out.push_str(&path.display().to_string());
        out.push('\n');
    }
    out
}
