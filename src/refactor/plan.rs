//! Refactoring plans: the edits and file operations of one refactoring.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use crate::diff::{DiffSummary, FileChange};
use crate::error::{RefactorError, Result};
use crate::span::{Span, TextRange};
use crate::storage::{Fingerprint, SourceStorage};

/// Replaces one range of a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edit {
    pub file: PathBuf,
    pub range: TextRange,
    pub replacement: String,
}

impl Edit {
    pub fn new(file: impl Into<PathBuf>, range: TextRange, replacement: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            range,
            replacement: replacement.into(),
        }
    }

    /// Inserts text at an offset.
    pub fn insert(file: impl Into<PathBuf>, offset: usize, text: impl Into<String>) -> Self {
        Self::new(file, TextRange::empty(offset), text)
    }

    /// Removes a range.
    pub fn delete(file: impl Into<PathBuf>, range: TextRange) -> Self {
        Self::new(file, range, String::new())
    }

    pub fn span(&self) -> Span {
        Span::new(self.file.clone(), self.range)
    }

    pub fn is_insertion(&self) -> bool {
        self.range.is_empty()
    }
}

/// A whole-file operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileOp {
    Create { path: PathBuf, content: String },
    Delete { path: PathBuf },
}

impl FileOp {
    pub fn path(&self) -> &Path {
        match self {
            FileOp::Create { path, .. } | FileOp::Delete { path } => path,
        }
    }
}

/// The ordered edits and file operations implementing one refactoring,
/// plus the fingerprint of every existing file they touch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RefactoringPlan {
    pub description: String,
    pub edits: Vec<Edit>,
    pub file_ops: Vec<FileOp>,
    pub fingerprints: BTreeMap<PathBuf, Fingerprint>,
}

impl RefactoringPlan {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            ..Self::default()
        }
    }

    pub fn push(&mut self, edit: Edit) {
        self.edits.push(edit);
    }

    pub fn replace(&mut self, file: &Path, range: TextRange, text: impl Into<String>) {
        self.push(Edit::new(file, range, text));
    }

    pub fn insert(&mut self, file: &Path, offset: usize, text: impl Into<String>) {
        self.push(Edit::insert(file, offset, text));
    }

    pub fn delete(&mut self, file: &Path, range: TextRange) {
        self.push(Edit::delete(file, range));
    }

    pub fn create_file(&mut self, path: impl Into<PathBuf>, content: impl Into<String>) {
        self.file_ops.push(FileOp::Create {
            path: path.into(),
            content: content.into(),
        });
    }

    pub fn delete_file(&mut self, path: impl Into<PathBuf>) {
        self.file_ops.push(FileOp::Delete { path: path.into() });
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty() && self.file_ops.is_empty()
    }

    /// Edits of one file, in plan order.
    pub fn edits_in<'a>(&'a self, file: &'a Path) -> impl Iterator<Item = &'a Edit> {
        self.edits.iter().filter(move |e| e.file == file)
    }

    /// Every file the plan edits, creates or deletes.
    pub fn affected_files(&self) -> Vec<PathBuf> {
        let files: BTreeSet<PathBuf> = self
            .edits
            .iter()
            .map(|e| e.file.clone())
            .chain(self.file_ops.iter().map(|op| op.path().to_path_buf()))
            .collect();
        files.into_iter().collect()
    }

    /// Sorts the edits, drops duplicates, merges insertions at the same
    /// offset and rejects overlapping edits.
    pub fn normalize(&mut self) -> Result<()> {
        self.edits
            .retain(|e| !(e.range.is_empty() && e.replacement.is_empty()));
        self.edits
            .sort_by(|a, b| a.file.cmp(&b.file).then(a.range.cmp(&b.range)));

        let mut normalized: Vec<Edit> = Vec::with_capacity(self.edits.len());
        for edit in self.edits.drain(..) {
            if let Some(last) = normalized.last_mut()
                && last.file == edit.file
            {
                if *last == edit {
                    continue;
                }
                if last.is_insertion() && edit.is_insertion() && last.range == edit.range {
                    last.replacement.push_str(&edit.replacement);
                    continue;
                }
                if last.range.overlaps(&edit.range) {
                    return Err(RefactorError::OverlappingEdits {
                        file: edit.file,
                        first: (last.range.start, last.range.end),
                        second: (edit.range.start, edit.range.end),
                    });
                }
            }
            normalized.push(edit);
        }
        self.edits = normalized;
        Ok(())
    }

    /// Applies this plan's edits of `file` to `text`.
    pub fn apply_to(&self, file: &Path, text: &str) -> Result<String> {
        let edits: Vec<&Edit> = self.edits_in(file).collect();
        apply_edits(file, text, &edits)
    }

    /// Moves `from` to `to`: its pending edits are folded into the content
    /// of the new file.
    pub fn relocate(&mut self, from: &Path, to: impl Into<PathBuf>, original: &str) -> Result<()> {
        let to = to.into();
        if to == from {
            return Ok(());
        }
        let content = self.apply_to(from, original)?;
        self.edits.retain(|e| e.file != from);
        self.create_file(to, content);
        self.delete_file(from);
        Ok(())
    }

    /// Before and after content of every affected file, read from `storage`.
    pub fn changes(&self, storage: &dyn SourceStorage) -> Result<Vec<FileChange>> {
        let mut changes = Vec::new();
        let deleted: BTreeSet<&Path> = self
            .file_ops
            .iter()
            .filter_map(|op| match op {
                FileOp::Delete { path } => Some(path.as_path()),
                FileOp::Create { .. } => None,
            })
            .collect();

        let edited: BTreeSet<&Path> = self.edits.iter().map(|e| e.file.as_path()).collect();
        for file in edited {
            if deleted.contains(file) {
                continue;
            }
            let original = storage.read(file)?;
            let modified = self.apply_to(file, &original)?;
            changes.push(FileChange::modified(file, original, modified));
        }

        for op in &self.file_ops {
            match op {
                FileOp::Create { path, content } => {
                    changes.push(FileChange::created(path, content.clone()));
                }
                FileOp::Delete { path } => {
                    changes.push(FileChange::deleted(path, storage.read(path)?));
                }
            }
        }
        changes.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(changes)
    }

    pub fn summary(&self, storage: &dyn SourceStorage) -> Result<DiffSummary> {
        Ok(DiffSummary::from_changes(&self.changes(storage)?))
    }
}

/// Applies non-overlapping edits to `text`, last edit first.
///
/// Insertions at the same offset are merged in the order given, as
/// [`RefactoringPlan::normalize`] does.
pub fn apply_edits(file: &Path, text: &str, edits: &[&Edit]) -> Result<String> {
    let mut sorted: Vec<&Edit> = edits.to_vec();
    sorted.sort_by_key(|e| e.range);

    let mut merged: Vec<(TextRange, String)> = Vec::with_capacity(sorted.len());
    for edit in sorted {
        if let Some((range, replacement)) = merged.last_mut() {
            if range.is_empty() && edit.is_insertion() && *range == edit.range {
                replacement.push_str(&edit.replacement);
                continue;
            }
            if range.overlaps(&edit.range) {
                return Err(RefactorError::OverlappingEdits {
                    file: file.to_path_buf(),
                    first: (range.start, range.end),
                    second: (edit.range.start, edit.range.end),
                });
            }
        }
        merged.push((edit.range, edit.replacement.clone()));
    }

    let mut result = text.to_string();
    for (range, replacement) in merged.iter().rev() {
        let TextRange { start, end } = *range;
        if end > result.len() || !result.is_char_boundary(start) || !result.is_char_boundary(end) {
            return Err(RefactorError::StaleSnapshot(file.to_path_buf()));
        }
        result.replace_range(start..end, replacement);
    }
    Ok(result)
}

/// The text of `range` with every edit lying inside it applied.
pub fn materialize(file: &Path, text: &str, range: TextRange, edits: &[Edit]) -> Result<String> {
    let inner: Vec<Edit> = edits
        .iter()
        .filter(|e| e.file == file && range.covers(&e.range))
        .map(|e| Edit::new(file, e.range.relative_to(range.start), e.replacement.clone()))
        .collect();
    let refs: Vec<&Edit> = inner.iter().collect();
    apply_edits(file, range.slice(text), &refs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    fn path() -> &'static Path {
        Path::new("A.java")
    }

    #[test]
    fn test_normalize_sorts_and_dedups() {
        let mut plan = RefactoringPlan::new("test");
        plan.replace(path(), TextRange::new(10, 12), "b");
        plan.replace(path(), TextRange::new(0, 2), "a");
        plan.replace(path(), TextRange::new(10, 12), "b");
        plan.normalize().unwrap();

        assert_eq!(plan.edits.len(), 2);
        assert_eq!(plan.edits[0].range, TextRange::new(0, 2));
    }

    #[test]
    fn test_normalize_merges_insertions_in_order() {
        let mut plan = RefactoringPlan::new("test");
        plan.insert(path(), 5, "\nimport a.B;");
        plan.insert(path(), 5, "\nimport a.C;");
        plan.normalize().unwrap();

        assert_eq!(plan.edits.len(), 1);
        assert_eq!(plan.edits[0].replacement, "\nimport a.B;\nimport a.C;");
    }

    #[test]
    fn test_normalize_rejects_overlap() {
        let mut plan = RefactoringPlan::new("test");
        plan.replace(path(), TextRange::new(0, 5), "x");
        plan.replace(path(), TextRange::new(3, 8), "y");

        let err = plan.normalize().unwrap_err();
        assert!(matches!(err, RefactorError::OverlappingEdits { .. }));
    }

    #[test]
    fn test_apply_edits_in_reverse() {
        let mut plan = RefactoringPlan::new("test");
        plan.replace(path(), TextRange::new(4, 9), "total");
        plan.insert(path(), 0, "// x\n");
        plan.normalize().unwrap();

        let result = plan.apply_to(path(), "int count;").unwrap();
        assert_eq!(result, "// x\nint total;");
    }

    #[test]
    fn test_edit_past_end_is_stale() {
        let edit = Edit::new(path(), TextRange::new(4, 40), "x");
        let err = apply_edits(path(), "short", &[&edit]).unwrap_err();
        assert!(matches!(err, RefactorError::StaleSnapshot(_)));
    }

    #[test]
    fn test_relocate_folds_edits() {
        let mut plan = RefactoringPlan::new("move");
        plan.replace(path(), TextRange::new(8, 9), "q");
        plan.relocate(path(), "q/A.java", "package p;").unwrap();

        assert!(plan.edits.is_empty());
        assert_eq!(
            plan.file_ops[0],
            FileOp::Create {
                path: PathBuf::from("q/A.java"),
                content: "package q;".to_string()
            }
        );
        assert_eq!(plan.affected_files().len(), 2);
    }

    #[test]
    fn test_materialize_applies_inner_edits() {
        let text = "class A { static int x() { return y; } }";
        let edits = vec![
            Edit::new(path(), TextRange::new(34, 35), "A.y"),
            Edit::new(path(), TextRange::new(0, 5), "final class"),
        ];
        let member = materialize(path(), text, TextRange::new(10, 38), &edits).unwrap();
        assert_eq!(member, "static int x() { return A.y; }");
    }

    #[test]
    fn test_materialize_merges_insertions_at_one_offset() {
        let text = "class B {\n}";
        let edits = vec![
            Edit::insert(path(), 9, "\n    private final A a;"),
            Edit::insert(path(), 9, "\n    B(A a) {}"),
        ];
        let class = materialize(path(), text, TextRange::new(0, 11), &edits).unwrap();
        assert_eq!(class, "class B {\n    private final A a;\n    B(A a) {}\n}");

        let clash = vec![
            Edit::insert(path(), 9, "x"),
            Edit::new(path(), TextRange::new(8, 10), "y"),
        ];
        let refs: Vec<&Edit> = clash.iter().collect();
        assert!(matches!(
            apply_edits(path(), text, &refs),
            Err(RefactorError::OverlappingEdits { .. })
        ));
    }

    #[test]
    fn test_changes_and_summary() {
        let storage = MemoryStorage::new()
            .with_file("A.java", "class A {}\n")
            .with_file("B.java", "class B {}\n");
        let mut plan = RefactoringPlan::new("test");
        plan.replace(Path::new("A.java"), TextRange::new(6, 7), "Z");
        plan.delete_file("B.java");

        let changes = plan.changes(&storage).unwrap();
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].modified.as_deref(), Some("class Z {}\n"));
        assert_eq!(changes[1].modified, None);
        assert_eq!(plan.summary(&storage).unwrap().files_changed, 2);
    }
}
