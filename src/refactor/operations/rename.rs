//! Rename refactoring.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::error::{RefactorError, Result};
use crate::refactor::conflict::{Conflict, ConflictKind};
use crate::scope::{
    Declaration, DeclarationId, DeclarationKind, ProgramIndex, Reference, ReferenceContext,
    SearchScope, Visibility,
};

use super::context::{PlanBuilder, PlanContext, Planned};
use super::packages::{mirrored_dir, rewrite_package};
use super::text::{parent_name, qualify};
use super::Refactoring;

/// Rename a declaration and every reference to it.
///
/// Renaming a class also renames its constructors and moves `Old.java` to
/// `New.java` when the class gives the file its name. Renaming a method
/// renames the methods overriding it or overridden by it. A package is
/// renamed together with its sub-packages; a simple new name replaces the
/// last segment, a dotted one replaces the whole name.
#[derive(Debug, Clone)]
pub struct Rename {
    pub target: DeclarationId,
    pub new_name: String,
    /// Also rename whole-word occurrences inside comments.
    pub search_in_comments: bool,
    /// Also rename qualified-name occurrences in non-source files.
    pub search_in_non_source_files: bool,
}

impl Rename {
    /// Create a new Rename operation.
    pub fn new(target: DeclarationId, new_name: impl Into<String>) -> Self {
        Self {
            target,
            new_name: new_name.into(),
            search_in_comments: false,
            search_in_non_source_files: false,
        }
    }

    /// Rename occurrences in comments too.
    pub fn search_in_comments(mut self, enabled: bool) -> Self {
        self.search_in_comments = enabled;
        self
    }

    /// Rename occurrences in non-source files too.
    pub fn search_in_non_source_files(mut self, enabled: bool) -> Self {
        self.search_in_non_source_files = enabled;
        self
    }

    fn scope(&self) -> SearchScope {
        SearchScope::code_only()
            .with_comments(self.search_in_comments)
            .with_non_source_files(self.search_in_non_source_files)
    }

    fn plan_package(&self, ctx: &PlanContext<'_>, package: &Declaration) -> Result<Planned> {
        let old = package.qualified_name.as_str();
        let new_name = if self.new_name.contains('.') {
            self.new_name.clone()
        } else {
            qualify(parent_name(old), &self.new_name)
        };
        let mut builder = PlanBuilder::new(format!("Rename package '{}' to '{}'", old, new_name));
        if let Some(conflict) = ctx.detector().invalid_name(&new_name, DeclarationKind::Package) {
            builder.conflict(conflict.with_declaration(package.id));
        }
        if new_name == old {
            return builder.finish(ctx);
        }

        rewrite_package(ctx, &mut builder, package, &new_name, |file, from, to| {
            Ok(mirrored_dir(file, from, to))
        })?;
        builder.rewrite_occurrences(ctx, &self.scope(), (old, &new_name), (old, &new_name))?;
        builder.finish(ctx)
    }
}

impl Refactoring for Rename {
    fn name(&self) -> &'static str {
        "Rename"
    }

    fn plan(&self, ctx: &PlanContext<'_>) -> Result<Planned> {
        let mut decl = ctx.decl(self.target)?;
        if decl.kind == DeclarationKind::Constructor {
            let class = decl
                .container
                .ok_or_else(|| RefactorError::UnknownDeclaration(ctx.index.describe(decl.id)))?;
            decl = ctx.decl(class)?;
        }
        if decl.kind == DeclarationKind::Package {
            return self.plan_package(ctx, decl);
        }

        let new_name = self.new_name.as_str();
        let mut builder = PlanBuilder::new(format!(
            "Rename {} '{}' to '{}'",
            decl.kind.name(),
            decl.qualified_name,
            new_name
        ));
        let detector = ctx.detector();
        if let Some(conflict) = detector.invalid_name(new_name, decl.kind) {
            builder.conflict(conflict.with_declaration(decl.id));
        }
        if new_name == decl.name {
            return builder.finish(ctx);
        }

        for target in overriding_family(ctx.index, decl) {
            ctx.checkpoint()?;
            let refs: Vec<&Reference> = ctx
                .references(target.id)
                .into_iter()
                .filter(|r| r.context != ReferenceContext::This)
                .collect();

            builder.replace(&target.file, target.name_range, new_name);
            for r in &refs {
                builder.replace(&r.file, r.range, new_name);
            }

            builder.conflicts(detector.sibling_collisions(target, new_name));
            builder.conflicts(detector.shadowing_locals(target, new_name, &refs));
            builder.conflicts(detector.captured_fields(target, new_name));
            if target.container.is_none()
                && target.kind.is_type()
                && let Some(conflict) = detector.type_collision(&target.package, new_name, &[target.id])
            {
                builder.conflict(conflict.with_declaration(target.id));
            }
            if target.kind.is_type() {
                type_shadowing(ctx, &mut builder, target, new_name, &refs);
            }
        }

        if decl.kind.is_type() {
            for ctor in ctx.index.constructors(decl.id) {
                builder.replace(&ctor.file, ctor.name_range, new_name);
            }
            if let Some(to) = renamed_file(ctx.index, decl, new_name) {
                if ctx.storage.exists(&to) {
                    builder.conflict(detector.existing_file(&to).with_declaration(decl.id));
                }
                builder.relocate(decl.file.clone(), to);
            }
        }

        if !decl.kind.is_local() {
            let new_qualified = qualify(parent_name(&decl.qualified_name), new_name);
            builder.rewrite_occurrences(
                ctx,
                &self.scope(),
                (&decl.name, new_name),
                (&decl.qualified_name, &new_qualified),
            )?;
        }
        builder.finish(ctx)
    }
}

/// `method` plus the instance methods that override it or that it overrides,
/// transitively through the type hierarchy.
fn overriding_family<'a>(index: &'a ProgramIndex, method: &'a Declaration) -> Vec<&'a Declaration> {
    if method.kind != DeclarationKind::Method
        || method.is_static
        || method.visibility == Visibility::Private
    {
        return vec![method];
    }
    let types: Vec<DeclarationId> = index
        .declarations()
        .filter(|d| d.kind.is_type())
        .map(|d| d.id)
        .collect();

    let mut family = vec![method];
    let mut queue = vec![method];
    while let Some(current) = queue.pop() {
        let Some(owner) = current.container else {
            continue;
        };
        for &t in &types {
            if t == owner || !(index.is_subtype(t, owner) || index.is_subtype(owner, t)) {
                continue;
            }
            let related = index.members(t).iter().filter_map(|&m| index.declaration(m)).filter(|d| {
                d.kind == DeclarationKind::Method
                    && d.name == current.name
                    && d.arity == current.arity
                    && !d.is_static
                    && d.visibility != Visibility::Private
            });
            for d in related {
                if !family.iter().any(|f| f.id == d.id) {
                    family.push(d);
                    queue.push(d);
                }
            }
        }
    }
    family
}

/// Blocking conflicts where the new type name already means another type at
/// a simple-name reference.
fn type_shadowing(
    ctx: &PlanContext<'_>,
    builder: &mut PlanBuilder,
    decl: &Declaration,
    new_name: &str,
    refs: &[&Reference],
) {
    let mut reported: BTreeSet<&Path> = BTreeSet::new();
    let sites = refs
        .iter()
        .filter(|r| r.qualifier.is_none())
        .map(|r| (r.file.as_path(), r.enclosing, Some(*r)))
        .chain(std::iter::once((decl.file.as_path(), decl.container, None)));
    for (file, enclosing, r) in sites {
        let Some(other) = ctx.index.resolve_type(file, enclosing, new_name) else {
            continue;
        };
        if other == decl.id || ctx.index.is_within(other, decl.id) || !reported.insert(file) {
            continue;
        }
        let mut conflict = Conflict::blocking(
            ConflictKind::NameCollision,
            format!(
                "'{}' already refers to {} in {}",
                new_name,
                ctx.index.describe(other),
                file.display()
            ),
        )
        .with_declaration(other)
        .with_declaration(decl.id);
        if let Some(r) = r {
            conflict = conflict.with_span(r.span());
        }
        builder.conflict(conflict);
    }
}

/// The new path of the file named after a renamed top-level type.
fn renamed_file(index: &ProgramIndex, decl: &Declaration, new_name: &str) -> Option<PathBuf> {
    if index.containing_type(decl.id).is_some() {
        return None;
    }
    let stem = decl.file.file_stem()?.to_str()?;
    (stem == decl.name).then(|| decl.file.with_file_name(format!("{}.java", new_name)))
}

#[cfg(test)]
mod tests {
    use super::super::testing::Workspace;
    use super::*;

    const COUNTER: &str = "package com.example;

public class Counter {
    private int count;

    public Counter() {
        count = 0;
    }

    public void increment() {
        count++;
        this.count += 1;
    }

    public int get() {
        return count;
    }
}
";

    const USER: &str = "package com.example.app;

import com.example.Counter;

class User {
    int run() {
        Counter counter = new Counter();
        counter.increment();
        return counter.get();
    }
}
";

    fn workspace() -> Workspace {
        Workspace::new(&[
            ("src/com/example/Counter.java", COUNTER),
            ("src/com/example/app/User.java", USER),
        ])
    }

    #[test]
    fn test_rename_trait() {
        let op = Rename::new(DeclarationId(0), "x");
        assert_eq!(op.name(), "Rename");
    }

    #[test]
    fn test_rename_field_edits_declaration_and_references() {
        let ws = workspace();
        let count = ws.index.resolve("com.example.Counter#count").unwrap();
        let planned = ws.plan(&Rename::new(count, "total"));

        assert_eq!(planned.plan.edits.len(), 5);
        assert!(planned.conflicts.is_empty());
        let after = ws.after(&planned, "src/com/example/Counter.java").unwrap();
        assert!(after.contains("private int total;"));
        assert!(after.contains("this.total += 1;"));
        assert!(!after.contains("count"));
    }

    #[test]
    fn test_rename_class_moves_file_and_constructors() {
        let ws = workspace();
        let counter = ws.index.resolve("com.example.Counter").unwrap();
        let planned = ws.plan(&Rename::new(counter, "Tally"));

        assert!(ws.after(&planned, "src/com/example/Counter.java").is_none());
        let renamed = ws.after(&planned, "src/com/example/Tally.java").unwrap();
        assert!(renamed.contains("public class Tally {"));
        assert!(renamed.contains("public Tally() {"));

        let user = ws.after(&planned, "src/com/example/app/User.java").unwrap();
        assert!(user.contains("import com.example.Tally;"));
        assert!(user.contains("Tally counter = new Tally();"));
    }

    #[test]
    fn test_rename_constructor_renames_class() {
        let ws = workspace();
        let ctor = ws.index.resolve("com.example.Counter#<init>").unwrap();
        let planned = ws.plan(&Rename::new(ctor, "Tally"));
        assert!(ws.after(&planned, "src/com/example/Tally.java").is_some());
    }

    #[test]
    fn test_rename_into_shadowing_local_is_blocking() {
        let ws = Workspace::new(&[(
            "A.java",
            "class A {
    int count;
    void run() {
        int total = 1;
        count += total;
    }
}
",
        )]);
        let count = ws.index.resolve("A#count").unwrap();
        let planned = ws.plan(&Rename::new(count, "total"));
        let blocking: Vec<_> = planned.conflicts.iter().filter(|c| c.is_blocking()).collect();
        assert_eq!(blocking.len(), 1);
        assert_eq!(blocking[0].kind, ConflictKind::NameCollision);
    }

    #[test]
    fn test_rename_to_keyword_is_invalid() {
        let ws = workspace();
        let count = ws.index.resolve("com.example.Counter#count").unwrap();
        let planned = ws.plan(&Rename::new(count, "class"));
        assert!(planned.conflicts.iter().any(|c| c.kind == ConflictKind::InvalidName));
    }

    #[test]
    fn test_rename_method_renames_overrides() {
        let ws = Workspace::new(&[
            ("p/Shape.java", "package p;\n\npublic class Shape {\n    public double area() { return 0; }\n}\n"),
            (
                "p/Square.java",
                "package p;\n\npublic class Square extends Shape {\n    public double area() { return 4; }\n    double twice() { return area() * 2; }\n}\n",
            ),
        ]);
        let area = ws.index.resolve("p.Shape#area").unwrap();
        let planned = ws.plan(&Rename::new(area, "surface"));
        let square = ws.after(&planned, "p/Square.java").unwrap();
        assert!(square.contains("public double surface() { return 4; }"));
        assert!(square.contains("return surface() * 2;"));
    }

    #[test]
    fn test_rename_package_moves_directories() {
        let ws = workspace();
        let package = ws.index.package("com.example").unwrap();
        let planned = ws.plan(&Rename::new(package, "sample"));

        let moved = ws.after(&planned, "src/com/sample/Counter.java").unwrap();
        assert!(moved.starts_with("package com.sample;"));
        let user = ws.after(&planned, "src/com/sample/app/User.java").unwrap();
        assert!(user.starts_with("package com.sample.app;"));
        assert!(user.contains("import com.sample.Counter;"));
        assert!(ws.after(&planned, "src/com/example/Counter.java").is_none());
    }

    #[test]
    fn test_comment_occurrences_are_warnings() {
        let ws = Workspace::new(&[("A.java", "/** Holds a count. */\nclass A {\n    int count;\n}\n")]);
        let count = ws.index.resolve("A#count").unwrap();
        let planned = ws.plan(&Rename::new(count, "total").search_in_comments(true));

        assert_eq!(planned.conflicts.len(), 1);
        assert_eq!(planned.conflicts[0].kind, ConflictKind::TextualOccurrence);
        assert!(!planned.has_blocking_conflicts());
        let after = ws.after(&planned, "A.java").unwrap();
        assert!(after.starts_with("/** Holds a total. */"));
    }

    #[test]
    fn test_round_trip_restores_text() {
        let ws = workspace();
        let count = ws.index.resolve("com.example.Counter#count").unwrap();
        let planned = ws.plan(&Rename::new(count, "total"));
        let renamed = ws.after(&planned, "src/com/example/Counter.java").unwrap();

        let back = Workspace::new(&[
            ("src/com/example/Counter.java", renamed.as_str()),
            ("src/com/example/app/User.java", USER),
        ]);
        let total = back.index.resolve("com.example.Counter#total").unwrap();
        let planned = back.plan(&Rename::new(total, "count"));
        assert_eq!(back.after(&planned, "src/com/example/Counter.java").unwrap(), COUNTER);
    }
}
