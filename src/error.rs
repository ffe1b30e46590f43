//! Error types for the refactoring engine.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for refactoring operations.
#[derive(Error, Debug)]
pub enum RefactorError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    #[error("Glob pattern error: {0}")]
    Glob(#[from] globset::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Tree-sitter parse error for {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Tree-sitter query error: {0}")]
    Query(#[from] tree_sitter::QueryError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A container, class or factory target resolved to no candidate or to
    /// more than one.
    #[error("Ambiguous target '{target}': {}", describe_candidates(.candidates))]
    AmbiguousTarget {
        target: String,
        candidates: Vec<String>,
    },

    /// Apply was refused because the plan carries blocking conflicts.
    #[error("{count} blocking conflict(s): {summary}")]
    BlockingConflict { count: usize, summary: String },

    /// A file changed between planning and applying.
    #[error("Stale snapshot: {0} was modified after the plan was computed")]
    StaleSnapshot(PathBuf),

    /// The storage refused a write; every earlier write has been rolled back.
    #[error("Storage failure on {path}: {message}")]
    StorageFailure { path: PathBuf, message: String },

    #[error("Unknown declaration: {0}")]
    UnknownDeclaration(String),

    #[error("Unsupported element for {operation}: {message}")]
    UnsupportedElement {
        operation: &'static str,
        message: String,
    },

    #[error("Overlapping edits in {file}: {first:?} overlaps {second:?}")]
    OverlappingEdits {
        file: PathBuf,
        first: (usize, usize),
        second: (usize, usize),
    },

    #[error("Refactoring was cancelled")]
    Cancelled,
}

fn describe_candidates(candidates: &[String]) -> String {
    if candidates.is_empty() {
        "no candidates".to_string()
    } else {
        format!("candidates: {}", candidates.join(", "))
    }
}

impl RefactorError {
    /// Returns true for errors surfaced before any mutation was attempted.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            RefactorError::StaleSnapshot(_) | RefactorError::StorageFailure { .. }
        )
    }

    pub(crate) fn ambiguous(target: impl Into<String>, candidates: Vec<String>) -> Self {
        RefactorError::AmbiguousTarget {
            target: target.into(),
            candidates,
        }
    }

    pub(crate) fn storage(path: impl Into<PathBuf>, message: impl std::fmt::Display) -> Self {
        RefactorError::StorageFailure {
            path: path.into(),
            message: message.to_string(),
        }
    }
}

/// A specialized Result type for refactoring operations.
pub type Result<T> = std::result::Result<T, RefactorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ambiguous_target_message() {
        let err = RefactorError::ambiguous("com.example.Missing", Vec::new());
        assert_eq!(
            err.to_string(),
            "Ambiguous target 'com.example.Missing': no candidates"
        );

        let err = RefactorError::ambiguous(
            "Util",
            vec!["a.Util".to_string(), "b.Util".to_string()],
        );
        assert!(err.to_string().contains("a.Util, b.Util"));
    }

    #[test]
    fn test_recoverable_kinds() {
        assert!(RefactorError::ambiguous("x", Vec::new()).is_recoverable());
        assert!(
            RefactorError::BlockingConflict {
                count: 1,
                summary: "clash".into()
            }
            .is_recoverable()
        );
        assert!(!RefactorError::StaleSnapshot(PathBuf::from("A.java")).is_recoverable());
        assert!(!RefactorError::storage("A.java", "read-only").is_recoverable());
    }
}
