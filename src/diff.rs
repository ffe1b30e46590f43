//! Diff generation for previewing changes.

use similar::{ChangeTag, TextDiff};
use std::fmt::Write;
use std::path::{Path, PathBuf};

// ANSI color codes
const RED: &str = "\x1b[31m";
const GREEN: &str = "\x1b[32m";
const CYAN: &str = "\x1b[36m";
const RESET: &str = "\x1b[0m";

/// Generates a unified diff between two strings.
pub fn unified_diff(original: &str, modified: &str, path: &Path) -> String {
    render(
        original,
        modified,
        &format!("a/{}", path.display()),
        &format!("b/{}", path.display()),
        false,
    )
}

/// Colorized diff output for terminal display.
pub fn colorized_diff(original: &str, modified: &str, path: &Path) -> String {
    render(
        original,
        modified,
        &format!("a/{}", path.display()),
        &format!("b/{}", path.display()),
        true,
    )
}

fn render(original: &str, modified: &str, old_label: &str, new_label: &str, color: bool) -> String {
    let diff = TextDiff::from_lines(original, modified);
    let mut output = String::new();
    let (header, reset) = if color { (CYAN, RESET) } else { ("", "") };

    let _ = writeln!(&mut output, "{}--- {}{}", header, old_label, reset);
    let _ = writeln!(&mut output, "{}+++ {}{}", header, new_label, reset);

    for (idx, group) in diff.grouped_ops(3).iter().enumerate() {
        if idx > 0 && !color {
            let _ = writeln!(&mut output);
        }

        for op in group {
            for change in diff.iter_changes(op) {
                let (sign, tint) = match change.tag() {
                    ChangeTag::Delete => ("-", RED),
                    ChangeTag::Insert => ("+", GREEN),
                    ChangeTag::Equal => (" ", ""),
                };

                if color && !tint.is_empty() {
                    let _ = write!(&mut output, "{}{}{}{}", tint, sign, change.value(), RESET);
                } else {
                    let _ = write!(&mut output, "{}{}", sign, change.value());
                }
                if change.missing_newline() {
                    let _ = writeln!(&mut output);
                }
            }
        }
    }

    output
}

/// The before and after state of one file touched by a plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChange {
    pub path: PathBuf,
    /// `None` when the file is created.
    pub original: Option<String>,
    /// `None` when the file is deleted.
    pub modified: Option<String>,
}

impl FileChange {
    /// An edited file.
    pub fn modified(path: impl Into<PathBuf>, original: String, modified: String) -> Self {
        Self {
            path: path.into(),
            original: Some(original),
            modified: Some(modified),
        }
    }

    /// A file that does not exist yet.
    pub fn created(path: impl Into<PathBuf>, content: String) -> Self {
        Self {
            path: path.into(),
            original: None,
            modified: Some(content),
        }
    }

    /// A file that is removed.
    pub fn deleted(path: impl Into<PathBuf>, content: String) -> Self {
        Self {
            path: path.into(),
            original: Some(content),
            modified: None,
        }
    }

    /// Returns true if the content does not change.
    pub fn is_unchanged(&self) -> bool {
        self.original.is_some() && self.original == self.modified
    }

    /// Renders the change as a unified diff, optionally with ANSI colors.
    pub fn diff(&self, color: bool) -> String {
        let old_label = match self.original {
            Some(_) => format!("a/{}", self.path.display()),
            None => "/dev/null".to_string(),
        };
        let new_label = match self.modified {
            Some(_) => format!("b/{}", self.path.display()),
            None => "/dev/null".to_string(),
        };
        render(
            self.original.as_deref().unwrap_or(""),
            self.modified.as_deref().unwrap_or(""),
            &old_label,
            &new_label,
            color,
        )
    }

    pub fn summary(&self) -> DiffSummary {
        DiffSummary::from_diff(
            self.original.as_deref().unwrap_or(""),
            self.modified.as_deref().unwrap_or(""),
        )
    }
}

/// Represents a summary of changes.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DiffSummary {
    pub files_changed: usize,
    pub insertions: usize,
    pub deletions: usize,
}

impl DiffSummary {
    /// Creates a summary from original and modified content.
    pub fn from_diff(original: &str, modified: &str) -> Self {
        let diff = TextDiff::from_lines(original, modified);
        let mut insertions = 0;
        let mut deletions = 0;

        for change in diff.iter_all_changes() {
            match change.tag() {
                ChangeTag::Insert => insertions += 1,
                ChangeTag::Delete => deletions += 1,
                ChangeTag::Equal => {}
            }
        }

        Self {
            files_changed: if insertions > 0 || deletions > 0 { 1 } else { 0 },
            insertions,
            deletions,
        }
    }

    /// Summarizes a set of file changes.
    pub fn from_changes(changes: &[FileChange]) -> Self {
        let mut total = Self::default();
        for change in changes {
            let mut summary = change.summary();
            // Created or deleted empty files still count as changed.
            if !change.is_unchanged() {
                summary.files_changed = 1;
            }
            total.merge(&summary);
        }
        total
    }

    /// Combines two summaries.
    pub fn merge(&mut self, other: &DiffSummary) {
        self.files_changed += other.files_changed;
        self.insertions += other.insertions;
        self.deletions += other.deletions;
    }
}

impl std::fmt::Display for DiffSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} file(s) changed, {} insertions(+), {} deletions(-)",
            self.files_changed, self.insertions, self.deletions
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unified_diff_marks_changes() {
        let diff = unified_diff("int count;\n", "int total;\n", Path::new("A.java"));
        assert!(diff.starts_with("--- a/A.java\n+++ b/A.java\n"));
        assert!(diff.contains("-int count;\n"));
        assert!(diff.contains("+int total;\n"));
    }

    #[test]
    fn test_created_and_deleted_files() {
        let created = FileChange::created("p/B.java", "class B {}\n".to_string());
        assert!(created.diff(false).starts_with("--- /dev/null\n+++ b/p/B.java\n"));

        let deleted = FileChange::deleted("p/A.java", "class A {}\n".to_string());
        assert!(deleted.diff(false).contains("+++ /dev/null"));

        let summary = DiffSummary::from_changes(&[created, deleted]);
        assert_eq!(summary.files_changed, 2);
        assert_eq!(summary.insertions, 1);
        assert_eq!(summary.deletions, 1);
    }

    #[test]
    fn test_colorized_diff_uses_ansi_codes() {
        let diff = colorized_diff("a\n", "b\n", Path::new("x.txt"));
        assert!(diff.contains(RED));
        assert!(diff.contains(GREEN));
    }
}
