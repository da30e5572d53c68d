//! Line diffs of rendered templates.

use colored::Colorize;
use similar::{ChangeTag, TextDiff};
use std::fmt;
use std::ops::Range;

/// Type of change in a diff line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeType {
    /// Line was inserted
    Insert,
    /// Line was deleted
    Delete,
    /// Line is unchanged (context)
    Equal,
}

/// A single line in a diff
#[derive(Debug, Clone)]
pub struct DiffLine {
    /// The content of the line, newline included
    pub content: String,
    /// The type of change
    pub change_type: ChangeType,
}

/// A hunk (group of changes) in a diff
#[derive(Debug, Clone)]
pub struct DiffHunk {
    /// Starting line number in old file
    pub old_start: usize,
    /// Number of lines from old file
    pub old_count: usize,
    /// Starting line number in new file
    pub new_start: usize,
    /// Number of lines from new file
    pub new_count: usize,
    /// Lines in this hunk
    pub lines: Vec<DiffLine>,
}

/// Statistics about a diff operation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiffStats {
    /// Number of lines inserted
    pub insertions: usize,
    /// Number of lines deleted
    pub deletions: usize,
    /// Number of hunks in the diff
    pub hunks: usize,
}

impl DiffStats {
    /// Check if there are any changes
    pub fn has_changes(&self) -> bool {
        self.insertions > 0 || self.deletions > 0
    }
}

impl fmt::Display for DiffStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} insertion(s)(+), {} deletion(s)(-)",
            self.insertions, self.deletions
        )
    }
}

/// Result of a diff operation
#[derive(Debug, Clone)]
pub struct DiffResult {
    /// Header for old file
    pub old_header: String,
    /// Header for new file
    pub new_header: String,
    /// All hunks in the diff
    pub hunks: Vec<DiffHunk>,
    /// Statistics about the diff
    pub stats: DiffStats,
}

impl DiffResult {
    /// Check if there are any changes
    pub fn has_changes(&self) -> bool {
        self.stats.has_changes()
    }

    /// Render as a unified diff, empty when nothing changed.
    pub fn render(&self, use_color: bool) -> String {
        if !self.has_changes() {
            return String::new();
        }

        let mut output = Vec::new();
        if use_color {
            output.push(self.old_header.red().bold().to_string());
            output.push(self.new_header.green().bold().to_string());
        } else {
            output.push(self.old_header.clone());
            output.push(self.new_header.clone());
        }

        for hunk in &self.hunks {
            let header = format!(
                "@@ -{},{} +{},{} @@",
                hunk.old_start, hunk.old_count, hunk.new_start, hunk.new_count
            );
            output.push(if use_color {
                header.cyan().to_string()
            } else {
                header
            });

            for line in &hunk.lines {
                let content = line.content.trim_end_matches('\n');
                let rendered = match line.change_type {
                    ChangeType::Insert => format!("+{}", content),
                    ChangeType::Delete => format!("-{}", content),
                    ChangeType::Equal => format!(" {}", content),
                };
                output.push(match (use_color, line.change_type) {
                    (true, ChangeType::Insert) => rendered.green().to_string(),
                    (true, ChangeType::Delete) => rendered.red().to_string(),
                    _ => rendered,
                });
            }
        }

        output.join("\n")
    }
}

/// Generate a diff between two strings
pub fn generate_diff(
    old: &str,
    new: &str,
    old_label: &str,
    new_label: &str,
    context_lines: usize,
) -> DiffResult {
    let text_diff = TextDiff::from_lines(old, new);
    let mut unified = text_diff.unified_diff();
    unified.context_radius(context_lines);

    let mut hunks = Vec::new();
    let mut stats = DiffStats::default();

    for hunk in unified.iter_hunks() {
        let ops = hunk.ops();
        let (old_start, old_count, new_start, new_count) = match (ops.first(), ops.last()) {
            (Some(first), Some(last)) => {
                let (old_start, old_count) =
                    header_range(first.old_range().start..last.old_range().end);
                let (new_start, new_count) =
                    header_range(first.new_range().start..last.new_range().end);
                (old_start, old_count, new_start, new_count)
            }
            _ => (0, 0, 0, 0),
        };
        let mut diff_hunk = DiffHunk {
            old_start,
            old_count,
            new_start,
            new_count,
            lines: Vec::new(),
        };

        for change in hunk.iter_changes() {
            let change_type = match change.tag() {
                ChangeTag::Delete => {
                    stats.deletions += 1;
                    ChangeType::Delete
                }
                ChangeTag::Insert => {
                    stats.insertions += 1;
                    ChangeType::Insert
                }
                ChangeTag::Equal => ChangeType::Equal,
            };
            diff_hunk.lines.push(DiffLine {
                content: change.value().to_string(),
                change_type,
            });
        }

        stats.hunks += 1;
        hunks.push(diff_hunk);
    }

    DiffResult {
        old_header: format!("--- {}", old_label),
        new_header: format!("+++ {}", new_label),
        hunks,
        stats,
    }
}

/// One-based start and length of a hunk side. An empty side is anchored
/// on the line it follows, as in `@@ -2,0 +3,1 @@`.
fn header_range(range: Range<usize>) -> (usize, usize) {
    let len = range.len();
    if len == 0 {
        (range.start, 0)
    } else {
        (range.start + 1, len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_diff() {
        let result = generate_diff("old\n", "new\n", "a", "b", 3);
        assert!(result.has_changes());
        assert_eq!(result.stats.insertions, 1);
        assert_eq!(result.stats.deletions, 1);
        assert_eq!(result.hunks.len(), 1);
    }

    #[test]
    fn test_no_changes_renders_empty() {
        let result = generate_diff("same\n", "same\n", "a", "b", 3);
        assert!(!result.has_changes());
        assert_eq!(result.render(false), "");
    }

    #[test]
    fn test_render_plain() {
        let before = "line1\nline2\nline3\n";
        let after = "line1\nmodified\nline3\n";
        let text = generate_diff(before, after, "old.json", "new.json", 1).render(false);
        assert!(text.starts_with("--- old.json\n+++ new.json\n@@ -1,3 +1,3 @@"));
        assert!(text.contains("\n-line2"));
        assert!(text.contains("\n+modified"));
        assert!(text.contains("\n line1"));
    }

    #[test]
    fn test_insert_only_hunk_keeps_old_anchor() {
        let result = generate_diff("a\nb\nc\nd\n", "a\nb\nX\nc\nd\n", "a", "b", 0);
        assert_eq!(result.hunks.len(), 1);
        let hunk = &result.hunks[0];
        assert_eq!(
            (hunk.old_start, hunk.old_count, hunk.new_start, hunk.new_count),
            (2, 0, 3, 1)
        );
        assert!(result.render(false).contains("\n@@ -2,0 +3,1 @@\n+X"));
    }

    #[test]
    fn test_delete_only_hunk_keeps_new_anchor() {
        let result = generate_diff("a\nb\nc\n", "a\nc\n", "a", "b", 0);
        let hunk = &result.hunks[0];
        assert_eq!(
            (hunk.old_start, hunk.old_count, hunk.new_start, hunk.new_count),
            (2, 1, 1, 0)
        );
    }
}
