//! Symbol and reference index for semantic refactoring operations.
//!
//! This module records the declarations and references of one program
//! snapshot and answers the usage queries the planners need.
//!
//! ## Overview
//!
//! - **Declaration**: A named entity (package, type, field, method, variable)
//! - **Reference**: A use of a declaration in code
//! - **Occurrence**: A textual hit in a comment or non-source file
//! - **ProgramIndex**: All of the above for one snapshot, plus per-file facts
//!
//! ## Example
//!
//! ```rust,no_run
//! use refactor_engine::scope::{JavaIndexer, SearchScope};
//! use refactor_engine::storage::FsStorage;
//!
//! let storage = FsStorage::open(".", &[])?;
//! let index = JavaIndexer::new(&storage).build()?;
//!
//! let count = index.resolve("com.example.Counter#count")?;
//! let usages = index.references(count, &SearchScope::code_only());
//! println!("Found {} usages of 'count'", usages.len());
//! # Ok::<(), refactor_engine::error::RefactorError>(())
//! ```

mod declaration;
mod index;
mod java;
mod reference;
mod search;

pub use declaration::{
    erase_type, Declaration, DeclarationId, DeclarationKind, Namespace, Visibility,
};
pub use index::{FileInfo, ImportInfo, IndexStats, ProgramIndex};
pub use java::JavaIndexer;
pub use reference::{CallSite, CastSite, Occurrence, OccurrenceKind, Reference, ReferenceContext};
pub use search::{SearchScope, UsageSearch};
