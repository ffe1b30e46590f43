//! Atomic application of refactoring plans.
//!
//! The applier checks every fingerprint before touching anything, stages
//! the new content of every file in memory, then mutates the storage while
//! journaling how to undo each step. Any failure replays the journal
//! backwards, leaving the storage exactly as it was.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::{RefactorError, Result};
use crate::storage::SourceStorage;

use super::plan::{FileOp, RefactoringPlan};

/// What an applied plan changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReport {
    pub files_written: Vec<PathBuf>,
    pub files_created: Vec<PathBuf>,
    pub files_deleted: Vec<PathBuf>,
    pub edits: usize,
}

impl ApplyReport {
    pub fn files_changed(&self) -> usize {
        self.files_written.len() + self.files_created.len() + self.files_deleted.len()
    }
}

enum Step {
    Write { path: PathBuf, content: String },
    Create { path: PathBuf, content: String },
    Delete { path: PathBuf },
}

enum Undo {
    Restore { path: PathBuf, content: String },
    Remove { path: PathBuf },
}

/// Applies plans against one storage.
pub struct TransactionApplier<'a> {
    storage: &'a dyn SourceStorage,
}

impl<'a> TransactionApplier<'a> {
    pub fn new(storage: &'a dyn SourceStorage) -> Self {
        Self { storage }
    }

    /// Applies every edit and file operation of `plan`, or none of them.
    pub fn apply(&self, plan: &RefactoringPlan) -> Result<ApplyReport> {
        self.verify(plan)?;
        let steps = self.stage(plan)?;
        debug!(
            "applying '{}': {} edit(s), {} step(s)",
            plan.description,
            plan.edits.len(),
            steps.len()
        );

        let mut journal = Vec::with_capacity(steps.len());
        let mut report = ApplyReport {
            edits: plan.edits.len(),
            ..ApplyReport::default()
        };

        for step in steps {
            if let Err(err) = self.perform(&step, &mut journal, &mut report) {
                let path = step_path(&step).to_path_buf();
                warn!(
                    "applying '{}' failed on {}: {}; rolling back {} step(s)",
                    plan.description,
                    path.display(),
                    err,
                    journal.len()
                );
                self.rollback(journal);
                return Err(match err {
                    RefactorError::StorageFailure { .. } => err,
                    other => RefactorError::storage(path, other),
                });
            }
        }

        info!(
            "applied '{}': {} edit(s) across {} file(s)",
            plan.description,
            report.edits,
            report.files_changed()
        );
        Ok(report)
    }

    /// Compares the plan-time fingerprints with the current content.
    fn verify(&self, plan: &RefactoringPlan) -> Result<()> {
        for (path, expected) in &plan.fingerprints {
            match self.storage.fingerprint(path) {
                Ok(current) if current == *expected => {}
                Ok(current) => {
                    warn!(
                        "{} changed since planning ({} != {})",
                        path.display(),
                        current,
                        expected
                    );
                    return Err(RefactorError::StaleSnapshot(path.clone()));
                }
                Err(err) => {
                    warn!("{} is no longer readable: {}", path.display(), err);
                    return Err(RefactorError::StaleSnapshot(path.clone()));
                }
            }
        }
        for op in &plan.file_ops {
            if let FileOp::Create { path, .. } = op
                && !plan.fingerprints.contains_key(path)
                && self.storage.exists(path)
            {
                warn!("{} appeared since planning", path.display());
                return Err(RefactorError::StaleSnapshot(path.clone()));
            }
        }
        Ok(())
    }

    /// Computes the final content of every edited file before any mutation.
    fn stage(&self, plan: &RefactoringPlan) -> Result<Vec<Step>> {
        let mut steps = Vec::new();
        let deleted: Vec<&Path> = plan
            .file_ops
            .iter()
            .filter_map(|op| match op {
                FileOp::Delete { path } => Some(path.as_path()),
                FileOp::Create { .. } => None,
            })
            .collect();

        let edited: BTreeSet<&Path> = plan.edits.iter().map(|e| e.file.as_path()).collect();
        for file in edited {
            if deleted.contains(&file) {
                continue;
            }
            let original = self.storage.read(file)?;
            let content = plan.apply_to(file, &original)?;
            if content != original {
                steps.push(Step::Write {
                    path: file.to_path_buf(),
                    content,
                });
            }
        }

        for op in &plan.file_ops {
            steps.push(match op {
                FileOp::Create { path, content } => Step::Create {
                    path: path.clone(),
                    content: content.clone(),
                },
                FileOp::Delete { path } => Step::Delete { path: path.clone() },
            });
        }
        Ok(steps)
    }

    fn perform(&self, step: &Step, journal: &mut Vec<Undo>, report: &mut ApplyReport) -> Result<()> {
        match step {
            Step::Write { path, content } => {
                let original = self.storage.read(path)?;
                journal.push(Undo::Restore {
                    path: path.clone(),
                    content: original,
                });
                self.storage.write(path, content)?;
                report.files_written.push(path.clone());
            }
            Step::Create { path, content } => {
                let undo = match self.storage.read(path) {
                    Ok(original) => Undo::Restore {
                        path: path.clone(),
                        content: original,
                    },
                    Err(_) => Undo::Remove { path: path.clone() },
                };
                journal.push(undo);
                self.storage.write(path, content)?;
                report.files_created.push(path.clone());
            }
            Step::Delete { path } => {
                let original = self.storage.read(path)?;
                journal.push(Undo::Restore {
                    path: path.clone(),
                    content: original,
                });
                self.storage.delete(path)?;
                report.files_deleted.push(path.clone());
            }
        }
        Ok(())
    }

    /// Undoes journaled steps, newest first. Steps whose mutation never
    /// happened are detected by comparing content and skipped.
    fn rollback(&self, journal: Vec<Undo>) {
        for undo in journal.into_iter().rev() {
            let outcome = match &undo {
                Undo::Restore { path, content } => {
                    if self.storage.read(path).ok().as_ref() == Some(content) {
                        continue;
                    }
                    self.storage.write(path, content)
                }
                Undo::Remove { path } => {
                    if !self.storage.exists(path) {
                        continue;
                    }
                    self.storage.delete(path)
                }
            };
            if let Err(err) = outcome {
                warn!("rollback step failed: {}", err);
            }
        }
    }
}

fn step_path(step: &Step) -> &Path {
    match step {
        Step::Write { path, .. } | Step::Create { path, .. } | Step::Delete { path } => path,
    }
}
