//! Refactoring operations over an indexed Java program.
//!
//! Each operation is a plain descriptor implementing [`Refactoring`]: given
//! a [`PlanContext`] it computes a [`Planned`] result, the edits plus every
//! conflict they would introduce. Planning never touches the storage.
//!
//! ## Available Operations
//!
//! ### Rename and Move
//! - [`Rename`] - Rename any declaration, including classes and packages
//! - [`MoveClassesOrPackages`] - Move top-level classes or packages to another package
//! - [`MoveMembers`] - Move static members to another class
//! - [`MoveInner`] - Turn an inner class into a top-level class
//!
//! ### Static and Instance Methods
//! - [`MakeMethodStatic`] - Make an instance method static
//! - [`MakeClassStatic`] - Make an inner class static
//! - [`ConvertToInstanceMethod`] - Move a static method into a parameter's class
//!
//! ### Types
//! - [`TurnRefsToSuper`] - Use a supertype wherever possible
//! - [`ReplaceConstructorWithFactory`] - Introduce a static factory method
//! - [`TypeCook`] - Generify raw collection types
//!
//! ## Example
//!
//! ```rust,no_run
//! use refactor_engine::config::RefactorSettings;
//! use refactor_engine::refactor::operations::{PlanContext, Refactoring, Rename};
//! use refactor_engine::scope::JavaIndexer;
//! use refactor_engine::storage::FsStorage;
//!
//! let storage = FsStorage::open(".", &[])?;
//! let index = JavaIndexer::new(&storage).build()?;
//! let settings = RefactorSettings::default();
//! let ctx = PlanContext::new(&index, &storage, &settings);
//!
//! let count = index.resolve("com.example.Counter#count")?;
//! let planned = Rename::new(count, "total").plan(&ctx)?;
//! println!("{} edit(s), {} conflict(s)", planned.plan.edits.len(), planned.conflicts.len());
//! # Ok::<(), refactor_engine::error::RefactorError>(())
//! ```

mod constructor_factory;
mod context;
mod convert_instance;
mod make_static;
mod move_classes;
mod move_inner;
mod move_members;
mod packages;
mod rename;
mod super_refs;
mod text;
mod type_cook;

pub use constructor_factory::{ConstructorPolicy, FactorySource, ReplaceConstructorWithFactory};
pub use context::{PlanBuilder, PlanContext, Planned};
pub use convert_instance::ConvertToInstanceMethod;
pub use make_static::{MakeClassStatic, MakeMethodStatic, StaticSettings};
pub use move_classes::MoveClassesOrPackages;
pub use move_inner::MoveInner;
pub use move_members::MoveMembers;
pub use rename::Rename;
pub use super_refs::TurnRefsToSuper;
pub use type_cook::{CookOptions, TypeCook};

use crate::error::Result;

/// Trait for refactoring operations.
///
/// Planning is pure: implementations only read the index and source text
/// through the context, and check for cancellation in their loops.
pub trait Refactoring {
    /// Returns the name of this operation.
    fn name(&self) -> &'static str;

    /// Computes the edits of this operation and the conflicts they introduce.
    fn plan(&self, ctx: &PlanContext<'_>) -> Result<Planned>;
}

/// A refactoring request: one descriptor per supported kind.
#[derive(Debug, Clone)]
pub enum Intent {
    Rename(Rename),
    MoveClassesOrPackages(MoveClassesOrPackages),
    MoveMembers(MoveMembers),
    MoveInner(MoveInner),
    MakeMethodStatic(MakeMethodStatic),
    MakeClassStatic(MakeClassStatic),
    ConvertToInstanceMethod(ConvertToInstanceMethod),
    TurnRefsToSuper(TurnRefsToSuper),
    ReplaceConstructorWithFactory(ReplaceConstructorWithFactory),
    TypeCook(TypeCook),
}

impl Intent {
    fn operation(&self) -> &dyn Refactoring {
        match self {
            Intent::Rename(op) => op,
            Intent::MoveClassesOrPackages(op) => op,
            Intent::MoveMembers(op) => op,
            Intent::MoveInner(op) => op,
            Intent::MakeMethodStatic(op) => op,
            Intent::MakeClassStatic(op) => op,
            Intent::ConvertToInstanceMethod(op) => op,
            Intent::TurnRefsToSuper(op) => op,
            Intent::ReplaceConstructorWithFactory(op) => op,
            Intent::TypeCook(op) => op,
        }
    }
}

impl Refactoring for Intent {
    fn name(&self) -> &'static str {
        self.operation().name()
    }

    fn plan(&self, ctx: &PlanContext<'_>) -> Result<Planned> {
        self.operation().plan(ctx)
    }
}

macro_rules! intent_from {
    ($($variant:ident),* $(,)?) => {
        $(
            impl From<$variant> for Intent {
                fn from(op: $variant) -> Self {
                    Intent::$variant(op)
                }
            }
        )*
    };
}

intent_from!(
    Rename,
    MoveClassesOrPackages,
    MoveMembers,
    MoveInner,
    MakeMethodStatic,
    MakeClassStatic,
    ConvertToInstanceMethod,
    TurnRefsToSuper,
    ReplaceConstructorWithFactory,
    TypeCook,
);

#[cfg(test)]
pub(crate) mod testing {
    use crate::config::RefactorSettings;
    use crate::scope::{JavaIndexer, ProgramIndex};
    use crate::storage::{MemoryStorage, SourceStorage};
    use std::path::Path;

    use super::{PlanContext, Planned, Refactoring};

    /// A small in-memory workspace for planner tests.
    pub struct Workspace {
        pub storage: MemoryStorage,
        pub index: ProgramIndex,
        pub settings: RefactorSettings,
    }

    impl Workspace {
        pub fn new(files: &[(&str, &str)]) -> Self {
            let mut storage = MemoryStorage::new();
            for (path, content) in files {
                storage = storage.with_file(*path, *content);
            }
            let index = JavaIndexer::new(&storage).build().unwrap();
            Self {
                storage,
                index,
                settings: RefactorSettings {
                    search_in_comments: false,
                    search_in_non_source_files: false,
                    ..RefactorSettings::default()
                },
            }
        }

        pub fn ctx(&self) -> PlanContext<'_> {
            PlanContext::new(&self.index, &self.storage, &self.settings)
        }

        pub fn plan(&self, op: &dyn Refactoring) -> Planned {
            op.plan(&self.ctx()).unwrap()
        }

        /// Content of `path` after the plan, `None` if the plan deletes it.
        pub fn after(&self, planned: &Planned, path: &str) -> Option<String> {
            let path = Path::new(path);
            planned
                .plan
                .changes(&self.storage)
                .unwrap()
                .into_iter()
                .find(|c| c.path == path)
                .map(|c| c.modified)
                .unwrap_or_else(|| self.storage.read(path).ok())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::Workspace;
    use super::*;

    #[test]
    fn test_intent_dispatch() {
        let ws = Workspace::new(&[("A.java", "class A {\n    int count;\n}\n")]);
        let count = ws.index.resolve("A#count").unwrap();

        let intent = Intent::from(Rename::new(count, "total"));
        assert_eq!(intent.name(), "Rename");
        let planned = ws.plan(&intent);
        assert_eq!(planned.plan.edits.len(), 1);
        assert!(planned.conflicts.is_empty());
    }
}
