//! Refactoring engine: planning, conflict detection and atomic application.
//!
//! An [`Engine`] owns one indexed snapshot of a workspace. Every refactoring
//! is planned against that snapshot into a [`RefactoringHandle`], which can
//! be inspected, previewed, applied or dropped.

pub mod apply;
pub mod conflict;
pub mod operations;
pub mod plan;

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use crate::config::RefactorSettings;
use crate::diff::{DiffSummary, FileChange};
use crate::error::{RefactorError, Result};
use crate::factory::RefactoringFactory;
use crate::scope::{JavaIndexer, ProgramIndex};
use crate::storage::{FsStorage, SourceStorage};

use apply::{ApplyReport, TransactionApplier};
use conflict::{blocking_error, Conflict};
use operations::{Intent, PlanContext, Planned, Refactoring};
use plan::RefactoringPlan;

/// Cooperative cancellation for planning.
///
/// Clones share the flag; planners poll it between units of work.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Fails with [`RefactorError::Cancelled`] once cancelled.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(RefactorError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// An indexed workspace refactorings are planned against.
pub struct Engine {
    index: Arc<ProgramIndex>,
    storage: Arc<dyn SourceStorage>,
    settings: Arc<RefactorSettings>,
    apply_lock: Arc<Mutex<()>>,
}

impl Engine {
    /// Indexes every Java file of `storage`.
    pub fn new(storage: Arc<dyn SourceStorage>, settings: RefactorSettings) -> Result<Self> {
        let index = JavaIndexer::new(storage.as_ref()).build()?;
        let stats = index.stats();
        debug!(
            "indexed {} file(s): {} declaration(s), {} reference(s)",
            stats.files, stats.declarations, stats.references
        );
        Ok(Self {
            index: Arc::new(index),
            storage,
            settings: Arc::new(settings),
            apply_lock: Arc::new(Mutex::new(())),
        })
    }

    /// Opens a workspace directory, reading `.refactor.yaml` when present.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        let settings = RefactorSettings::discover(root)?;
        let storage = FsStorage::open(root, &settings.exclude_patterns)?;
        Self::new(Arc::new(storage), settings)
    }

    pub fn index(&self) -> &ProgramIndex {
        &self.index
    }

    pub fn settings(&self) -> &RefactorSettings {
        &self.settings
    }

    pub fn storage(&self) -> &dyn SourceStorage {
        self.storage.as_ref()
    }

    /// Rebuilds the index from the current storage content, e.g. after
    /// applying a plan.
    pub fn reindex(&mut self) -> Result<()> {
        let index = JavaIndexer::new(self.storage.as_ref()).build()?;
        self.index = Arc::new(index);
        Ok(())
    }

    /// Entry points for every refactoring kind.
    pub fn factory(&self) -> RefactoringFactory<'_> {
        RefactoringFactory::new(self)
    }

    /// Plans `intent` against the current snapshot.
    pub fn plan(&self, intent: impl Into<Intent>) -> Result<RefactoringHandle> {
        self.plan_with(intent, CancellationFlag::new())
    }

    /// Plans `intent`, giving up with [`RefactorError::Cancelled`] once
    /// `cancel` is set.
    pub fn plan_with(&self, intent: impl Into<Intent>, cancel: CancellationFlag) -> Result<RefactoringHandle> {
        let intent = intent.into();
        let ctx = PlanContext::new(&self.index, self.storage.as_ref(), &self.settings)
            .with_cancellation(cancel);
        let planned = intent.plan(&ctx)?;
        debug!(
            "planned '{}': {} edit(s), {} file op(s), {} conflict(s)",
            planned.plan.description,
            planned.plan.edits.len(),
            planned.plan.file_ops.len(),
            planned.conflicts.len()
        );
        Ok(RefactoringHandle {
            intent,
            planned,
            overridden: false,
            storage: Arc::clone(&self.storage),
            apply_lock: Arc::clone(&self.apply_lock),
        })
    }
}

/// A planned refactoring awaiting a decision.
pub struct RefactoringHandle {
    intent: Intent,
    planned: Planned,
    overridden: bool,
    storage: Arc<dyn SourceStorage>,
    apply_lock: Arc<Mutex<()>>,
}

impl std::fmt::Debug for RefactoringHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefactoringHandle")
            .field("intent", &self.intent)
            .field("planned", &self.planned)
            .field("overridden", &self.overridden)
            .finish()
    }
}

impl RefactoringHandle {
    pub fn name(&self) -> &'static str {
        self.intent.name()
    }

    pub fn intent(&self) -> &Intent {
        &self.intent
    }

    pub fn find_conflicts(&self) -> &[Conflict] {
        &self.planned.conflicts
    }

    pub fn has_blocking_conflicts(&self) -> bool {
        self.planned.has_blocking_conflicts()
    }

    pub fn plan(&self) -> &RefactoringPlan {
        &self.planned.plan
    }

    /// The content every affected file would have after applying.
    pub fn preview(&self) -> Result<Vec<FileChange>> {
        self.planned.plan.changes(self.storage.as_ref())
    }

    /// The preview as a unified diff.
    pub fn diff(&self, color: bool) -> Result<String> {
        Ok(self
            .preview()?
            .iter()
            .filter(|c| !c.is_unchanged())
            .map(|c| c.diff(color))
            .collect::<Vec<_>>()
            .join("\n"))
    }

    pub fn summary(&self) -> Result<DiffSummary> {
        Ok(DiffSummary::from_changes(&self.preview()?))
    }

    /// Allows [`apply`](Self::apply) despite blocking conflicts.
    pub fn override_conflicts(&mut self) -> &mut Self {
        self.overridden = true;
        self
    }

    /// Applies the plan atomically.
    ///
    /// Refused with [`RefactorError::BlockingConflict`] while blocking
    /// conflicts remain and were not overridden.
    pub fn apply(self) -> Result<ApplyReport> {
        if !self.overridden
            && let Some(err) = blocking_error(&self.planned.conflicts)
        {
            warn!("refusing to apply '{}': {}", self.planned.plan.description, err);
            return Err(err);
        }
        let _guard = self.apply_lock.lock().unwrap_or_else(|e| e.into_inner());
        TransactionApplier::new(self.storage.as_ref()).apply(&self.planned.plan)
    }

    /// Discards the plan without touching the workspace.
    pub fn abort(self) {
        debug!("aborted '{}'", self.planned.plan.description);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::refactor::operations::Rename;
    use crate::storage::MemoryStorage;

    const COUNTER: &str = "package p;

public class Counter {
    private int count;

    int next() {
        int total = 0;
        count++;
        return count + total;
    }
}
";

    fn engine(storage: MemoryStorage) -> Engine {
        Engine::new(Arc::new(storage), RefactorSettings::default()).unwrap()
    }

    #[test]
    fn test_cancellation_flag() {
        let flag = CancellationFlag::new();
        let clone = flag.clone();
        assert!(flag.check().is_ok());
        clone.cancel();
        assert!(flag.is_cancelled());
        assert!(matches!(flag.check(), Err(RefactorError::Cancelled)));
    }

    #[test]
    fn test_cancelled_planning() {
        let engine = engine(MemoryStorage::new().with_file("src/p/Counter.java", COUNTER));
        let count = engine.index().resolve("p.Counter#count").unwrap();
        let cancel = CancellationFlag::new();
        cancel.cancel();
        let err = engine.plan_with(Rename::new(count, "value"), cancel).unwrap_err();
        assert!(matches!(err, RefactorError::Cancelled));
    }

    #[test]
    fn test_blocking_conflict_refuses_apply_until_overridden() {
        let storage = Arc::new(MemoryStorage::new().with_file("src/p/Counter.java", COUNTER));
        let engine = Engine::new(storage.clone(), RefactorSettings::default()).unwrap();
        let count = engine.index().resolve("p.Counter#count").unwrap();

        let handle = engine.plan(Rename::new(count, "total")).unwrap();
        assert!(handle.has_blocking_conflicts());
        let err = handle.apply().unwrap_err();
        assert!(matches!(err, RefactorError::BlockingConflict { .. }));
        assert_eq!(storage.read(Path::new("src/p/Counter.java")).unwrap(), COUNTER);

        let mut handle = engine.plan(Rename::new(count, "total")).unwrap();
        handle.override_conflicts();
        let report = handle.apply().unwrap();
        assert_eq!(report.files_written.len(), 1);
    }

    #[test]
    fn test_preview_does_not_write() {
        let storage = Arc::new(MemoryStorage::new().with_file("src/p/Counter.java", COUNTER));
        let engine = Engine::new(storage.clone(), RefactorSettings::default()).unwrap();
        let count = engine.index().resolve("p.Counter#count").unwrap();

        let handle = engine.plan(Rename::new(count, "hits")).unwrap();
        let diff = handle.diff(false).unwrap();
        assert!(diff.contains("+    private int hits;"));
        handle.abort();
        assert_eq!(storage.read(Path::new("src/p/Counter.java")).unwrap(), COUNTER);
    }
}
