//! # Refactor Engine
//!
//! A semantic refactoring engine for Java source trees.
//!
//! This crate provides:
//! - A symbol and reference index built with tree-sitter
//! - Planners for rename, move, make-static, convert-to-instance,
//!   turn-refs-to-super, replace-constructor-with-factory and type cooking
//! - Conflict detection before anything is written
//! - Atomic application with fingerprint checks and rollback
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use refactor_engine::prelude::*;
//!
//! // Rename a field and every reference to it
//! let engine = Engine::open("./my-project")?;
//! let count = engine.index().resolve("com.example.Counter#count")?;
//! let handle = engine.factory().create_rename(count, "total")?;
//!
//! for conflict in handle.find_conflicts() {
//!     println!("{}", conflict);
//! }
//! println!("{}", handle.diff(true)?);
//! handle.apply()?;
//! # Ok::<(), refactor_engine::error::RefactorError>(())
//! ```
//!
//! ## Moving Classes
//!
//! ```rust,no_run
//! use refactor_engine::prelude::*;
//!
//! let engine = Engine::open("./my-project")?;
//! let factory = engine.factory();
//! let util = engine.index().resolve("com.example.Util")?;
//! let destination = factory.create_source_folder_preserving_move_destination("com.example.common");
//!
//! let mut handle = factory.create_move_classes_or_packages(vec![util], destination)?;
//! if handle.has_blocking_conflicts() {
//!     // Inspect the conflicts, then decide
//!     handle.override_conflicts();
//! }
//! let report = handle.apply()?;
//! println!("Changed {} file(s)", report.files_changed());
//! # Ok::<(), refactor_engine::error::RefactorError>(())
//! ```
//!
//! ## Testing Against Memory
//!
//! ```rust
//! use refactor_engine::prelude::*;
//! use std::sync::Arc;
//!
//! let storage = MemoryStorage::new()
//!     .with_file("src/p/A.java", "package p;\n\nclass A {\n    int size;\n}\n");
//! let engine = Engine::new(Arc::new(storage), RefactorSettings::default())?;
//! let size = engine.index().resolve("p.A#size")?;
//! let handle = engine.factory().create_rename(size, "length")?;
//! assert_eq!(handle.plan().edits.len(), 1);
//! # Ok::<(), refactor_engine::error::RefactorError>(())
//! ```

pub mod config;
pub mod container;
pub mod diff;
pub mod error;
pub mod factory;
pub mod lang;
pub mod refactor;
pub mod scope;
pub mod span;
pub mod storage;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::config::RefactorSettings;
    pub use crate::container::{ContainerResolver, MoveDestination, Placement};
    pub use crate::diff::{DiffSummary, FileChange};
    pub use crate::error::{RefactorError, Result};
    pub use crate::factory::RefactoringFactory;
    pub use crate::lang::{Java, Language};
    pub use crate::refactor::apply::{ApplyReport, TransactionApplier};
    pub use crate::refactor::conflict::{Conflict, ConflictKind, Severity};
    pub use crate::refactor::operations::{
        ConstructorPolicy, ConvertToInstanceMethod, CookOptions, FactorySource, Intent,
        MakeClassStatic, MakeMethodStatic, MoveClassesOrPackages, MoveInner, MoveMembers,
        Refactoring, Rename, ReplaceConstructorWithFactory, StaticSettings, TurnRefsToSuper,
        TypeCook,
    };
    pub use crate::refactor::plan::{Edit, FileOp, RefactoringPlan};
    pub use crate::refactor::{CancellationFlag, Engine, RefactoringHandle};
    pub use crate::scope::{
        Declaration, DeclarationId, DeclarationKind, JavaIndexer, ProgramIndex, Reference,
        ReferenceContext, SearchScope, Visibility,
    };
    pub use crate::span::{Span, TextRange};
    pub use crate::storage::{Fingerprint, FsStorage, MemoryStorage, SourceStorage};
}

pub use prelude::*;
