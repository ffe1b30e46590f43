//! Planning context shared by every refactoring.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tracing::debug;

use crate::config::RefactorSettings;
use crate::error::{RefactorError, Result};
use crate::refactor::conflict::{occurrence_warning, Conflict, ConflictDetector};
use crate::refactor::plan::{Edit, RefactoringPlan};
use crate::refactor::CancellationFlag;
use crate::scope::{
    Declaration, DeclarationId, FileInfo, ProgramIndex, Reference, SearchScope, UsageSearch,
};
use crate::span::TextRange;
use crate::storage::{Fingerprint, SourceStorage};

/// Read-only view of one program snapshot used while planning.
///
/// Source text is read at most once per file and checked against the
/// fingerprint the index was built from.
pub struct PlanContext<'a> {
    pub index: &'a ProgramIndex,
    pub storage: &'a dyn SourceStorage,
    pub settings: &'a RefactorSettings,
    cancel: CancellationFlag,
    texts: RefCell<HashMap<PathBuf, Rc<str>>>,
}

impl<'a> PlanContext<'a> {
    pub fn new(
        index: &'a ProgramIndex,
        storage: &'a dyn SourceStorage,
        settings: &'a RefactorSettings,
    ) -> Self {
        Self {
            index,
            storage,
            settings,
            cancel: CancellationFlag::new(),
            texts: RefCell::new(HashMap::new()),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Fails with [`RefactorError::Cancelled`] once cancellation was requested.
    pub fn checkpoint(&self) -> Result<()> {
        self.cancel.check()
    }

    pub fn decl(&self, id: DeclarationId) -> Result<&'a Declaration> {
        self.index.get(id)
    }

    pub fn file(&self, path: &Path) -> Option<&'a FileInfo> {
        self.index.file(path)
    }

    /// Current text of a source file.
    pub fn text(&self, path: &Path) -> Result<Rc<str>> {
        if let Some(text) = self.texts.borrow().get(path) {
            return Ok(Rc::clone(text));
        }
        let text: Rc<str> = self.storage.read(path)?.into();
        if let Some(expected) = self.index.file(path).and_then(|f| f.fingerprint.as_ref())
            && Fingerprint::of(&text) != *expected
        {
            return Err(RefactorError::StaleSnapshot(path.to_path_buf()));
        }
        self.texts
            .borrow_mut()
            .insert(path.to_path_buf(), Rc::clone(&text));
        Ok(text)
    }

    /// Source text of a range.
    pub fn slice(&self, path: &Path, range: TextRange) -> Result<String> {
        Ok(range.slice(&self.text(path)?).to_string())
    }

    pub fn detector(&self) -> ConflictDetector<'a> {
        ConflictDetector::new(self.index)
    }

    pub fn search(&self) -> UsageSearch<'a> {
        UsageSearch::new(self.index, self.storage, self.settings)
    }

    /// Code references to `id`, in file order.
    pub fn references(&self, id: DeclarationId) -> Vec<&'a Reference> {
        self.index.references(id, &SearchScope::code_only())
    }

    /// Resolves a qualified class name to exactly one type.
    pub fn resolve_class(&self, qualified_name: &str) -> Result<DeclarationId> {
        let candidates: Vec<DeclarationId> = self
            .index
            .find(qualified_name)
            .iter()
            .copied()
            .filter(|&id| self.index.declaration(id).is_some_and(|d| d.kind.is_type()))
            .collect();
        match candidates.as_slice() {
            [single] => Ok(*single),
            _ => Err(RefactorError::ambiguous(
                qualified_name,
                candidates.iter().map(|&id| self.index.describe(id)).collect(),
            )),
        }
    }
}

/// A plan together with the conflicts it would introduce.
#[derive(Debug, Clone, Default)]
pub struct Planned {
    pub plan: RefactoringPlan,
    pub conflicts: Vec<Conflict>,
}

impl Planned {
    pub fn has_blocking_conflicts(&self) -> bool {
        self.conflicts.iter().any(|c| c.is_blocking())
    }
}

/// Collects edits, conflicts, required imports and file moves while a
/// refactoring is planned.
#[derive(Debug, Default)]
pub struct PlanBuilder {
    plan: RefactoringPlan,
    conflicts: Vec<Conflict>,
    imports: BTreeMap<PathBuf, BTreeSet<String>>,
    relocations: Vec<(PathBuf, PathBuf)>,
}

impl PlanBuilder {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            plan: RefactoringPlan::new(description),
            ..Self::default()
        }
    }

    pub fn replace(&mut self, file: &Path, range: TextRange, text: impl Into<String>) {
        self.plan.replace(file, range, text);
    }

    pub fn insert(&mut self, file: &Path, offset: usize, text: impl Into<String>) {
        self.plan.insert(file, offset, text);
    }

    pub fn delete(&mut self, file: &Path, range: TextRange) {
        self.plan.delete(file, range);
    }

    pub fn create_file(&mut self, path: impl Into<PathBuf>, content: impl Into<String>) {
        self.plan.create_file(path, content);
    }

    pub fn edits(&self) -> &[Edit] {
        &self.plan.edits
    }

    /// Removes and returns the edits lying inside `range` of `file`.
    pub fn take_edits_in(&mut self, file: &Path, range: TextRange) -> Vec<Edit> {
        let (inside, outside): (Vec<Edit>, Vec<Edit>) = self
            .plan
            .edits
            .drain(..)
            .partition(|e| e.file == file && range.covers(&e.range));
        self.plan.edits = outside;
        inside
    }

    pub fn conflict(&mut self, conflict: Conflict) {
        self.conflicts.push(conflict);
    }

    pub fn conflicts(&mut self, conflicts: impl IntoIterator<Item = Conflict>) {
        self.conflicts.extend(conflicts);
    }

    /// Requests an import of `qualified_name` in `file`. Imports the file
    /// already has, or does not need, are skipped when the plan is finished.
    pub fn import(&mut self, file: &Path, qualified_name: impl Into<String>) {
        self.imports
            .entry(file.to_path_buf())
            .or_default()
            .insert(qualified_name.into());
    }

    /// Moves a file once all other edits are collected.
    pub fn relocate(&mut self, from: impl Into<PathBuf>, to: impl Into<PathBuf>) {
        self.relocations.push((from.into(), to.into()));
    }

    /// Edits comment and non-source occurrences of a name, reporting each
    /// as a warning. `comment` and `non_source` are (needle, replacement).
    pub fn rewrite_occurrences(
        &mut self,
        ctx: &PlanContext<'_>,
        scope: &SearchScope,
        comment: (&str, &str),
        non_source: (&str, &str),
    ) -> Result<()> {
        let search = ctx.search();
        if scope.search_in_comments && comment.0 != comment.1 {
            for occurrence in search.comment_occurrences(comment.0, scope)? {
                self.replace(&occurrence.span.file, occurrence.span.range, comment.1);
                self.conflict(occurrence_warning(&occurrence, comment.1));
            }
        }
        if scope.search_in_non_source_files && non_source.0 != non_source.1 {
            for occurrence in search.non_source_occurrences(non_source.0, scope)? {
                self.replace(&occurrence.span.file, occurrence.span.range, non_source.1);
                self.conflict(occurrence_warning(&occurrence, non_source.1));
            }
        }
        Ok(())
    }

    /// Turns pending imports and relocations into plan entries, normalizes
    /// the edits and records the fingerprint of every touched file.
    pub fn finish(self, ctx: &PlanContext<'_>) -> Result<Planned> {
        let PlanBuilder {
            mut plan,
            conflicts,
            imports,
            relocations,
        } = self;

        for (file, names) in imports {
            let Some(info) = ctx.file(&file) else {
                continue;
            };
            let needed: Vec<String> = names
                .into_iter()
                .filter(|name| needs_import(info, name))
                .collect();
            if needed.is_empty() {
                continue;
            }
            let at = info.import_insertion_point();
            plan.insert(&file, at, import_block(&needed, at, info));
        }

        for (from, to) in relocations {
            let text = ctx.text(&from)?;
            plan.relocate(&from, to, &text)?;
        }

        plan.normalize()?;
        for path in plan.affected_files() {
            if ctx.storage.exists(&path) {
                let text = ctx.text(&path)?;
                plan.fingerprints.insert(path, Fingerprint::of(&text));
            }
        }

        debug!(
            "planned '{}': {} edit(s), {} file op(s), {} conflict(s)",
            plan.description,
            plan.edits.len(),
            plan.file_ops.len(),
            conflicts.len()
        );
        Ok(Planned { plan, conflicts })
    }
}

fn needs_import(info: &FileInfo, qualified_name: &str) -> bool {
    let Some((package, _)) = qualified_name.rsplit_once('.') else {
        return false;
    };
    package != info.package && package != "java.lang" && !info.imports_type(qualified_name)
}

fn import_block(names: &[String], at: usize, info: &FileInfo) -> String {
    let lines: Vec<String> = names.iter().map(|n| format!("import {};", n)).collect();
    if at == 0 {
        format!("{}\n\n", lines.join("\n"))
    } else if info.imports.is_empty() {
        format!("\n\n{}", lines.join("\n"))
    } else {
        format!("\n{}", lines.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::{ImportInfo, JavaIndexer};
    use crate::storage::MemoryStorage;

    #[test]
    fn test_needs_import() {
        let info = FileInfo {
            package: "com.example".to_string(),
            imports: vec![ImportInfo {
                name: "java.util.List".to_string(),
                range: TextRange::new(0, 0),
                name_range: TextRange::new(0, 0),
                is_static: false,
                wildcard: false,
            }],
            ..FileInfo::default()
        };
        assert!(needs_import(&info, "com.other.Util"));
        assert!(!needs_import(&info, "com.example.Util"));
        assert!(!needs_import(&info, "java.util.List"));
        assert!(!needs_import(&info, "java.lang.String"));
        assert!(!needs_import(&info, "Util"));
    }

    #[test]
    fn test_finish_inserts_imports_once() {
        let storage = MemoryStorage::new().with_file("p/A.java", "package p;\n\nclass A {}\n");
        let index = JavaIndexer::new(&storage).build().unwrap();
        let settings = RefactorSettings::default();
        let ctx = PlanContext::new(&index, &storage, &settings);

        let mut builder = PlanBuilder::new("imports");
        builder.import(Path::new("p/A.java"), "q.B");
        builder.import(Path::new("p/A.java"), "q.B");
        builder.import(Path::new("p/A.java"), "p.C");
        let planned = builder.finish(&ctx).unwrap();

        let text = planned
            .plan
            .apply_to(Path::new("p/A.java"), &ctx.text(Path::new("p/A.java")).unwrap())
            .unwrap();
        assert_eq!(text, "package p;\n\nimport q.B;\n\nclass A {}\n");
        assert!(planned.plan.fingerprints.contains_key(Path::new("p/A.java")));
    }

    #[test]
    fn test_text_detects_changes_since_indexing() {
        let storage = MemoryStorage::new().with_file("A.java", "class A {}\n");
        let index = JavaIndexer::new(&storage).build().unwrap();
        storage.insert("A.java", "class A { int x; }\n");
        let settings = RefactorSettings::default();
        let ctx = PlanContext::new(&index, &storage, &settings);

        let err = ctx.text(Path::new("A.java")).unwrap_err();
        assert!(matches!(err, RefactorError::StaleSnapshot(_)));
    }

    #[test]
    fn test_cancelled_context() {
        let index = ProgramIndex::new();
        let storage = MemoryStorage::new();
        let settings = RefactorSettings::default();
        let cancel = CancellationFlag::new();
        let ctx = PlanContext::new(&index, &storage, &settings).with_cancellation(cancel.clone());

        assert!(ctx.checkpoint().is_ok());
        cancel.cancel();
        assert!(matches!(ctx.checkpoint(), Err(RefactorError::Cancelled)));
    }
}
