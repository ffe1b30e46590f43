//! Moving top-level classes and packages to another package.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::{Path, PathBuf};

use crate::container::{ContainerResolver, MoveDestination};
use crate::error::{RefactorError, Result};
use crate::refactor::conflict::{Conflict, ConflictKind};
use crate::scope::{
    Declaration, DeclarationId, DeclarationKind, ProgramIndex, Reference, ReferenceContext,
    SearchScope, Visibility,
};

use super::context::{PlanBuilder, PlanContext, Planned};
use super::packages::rewrite_package;
use super::text::{qualify, skip_whitespace};
use super::Refactoring;

/// Move top-level classes or whole packages to a destination package.
///
/// Every file of a moved class moves with it, so all top-level types of a
/// file must be moved together. Moved packages keep their last segment:
/// moving `com.a.util` to `org.b` yields `org.b.util`.
#[derive(Debug, Clone)]
pub struct MoveClassesOrPackages {
    pub elements: Vec<DeclarationId>,
    pub destination: MoveDestination,
    pub search_in_comments: bool,
    pub search_in_non_source_files: bool,
}

impl MoveClassesOrPackages {
    /// Create a new MoveClassesOrPackages operation.
    pub fn new(elements: Vec<DeclarationId>, destination: MoveDestination) -> Self {
        Self {
            elements,
            destination,
            search_in_comments: false,
            search_in_non_source_files: false,
        }
    }

    /// Rewrite qualified names in comments too.
    pub fn search_in_comments(mut self, enabled: bool) -> Self {
        self.search_in_comments = enabled;
        self
    }

    /// Rewrite qualified names in non-source files too.
    pub fn search_in_non_source_files(mut self, enabled: bool) -> Self {
        self.search_in_non_source_files = enabled;
        self
    }

    fn scope(&self) -> SearchScope {
        SearchScope::code_only()
            .with_comments(self.search_in_comments)
            .with_non_source_files(self.search_in_non_source_files)
    }
}

impl Refactoring for MoveClassesOrPackages {
    fn name(&self) -> &'static str {
        "Move Classes or Packages"
    }

    fn plan(&self, ctx: &PlanContext<'_>) -> Result<Planned> {
        let dest = self.destination.package.as_str();
        let resolver = ContainerResolver::for_index(ctx.settings, ctx.index);
        let mut builder = PlanBuilder::new(format!(
            "Move {} element(s) to package '{}'",
            self.elements.len(),
            if dest.is_empty() { "<default>" } else { dest }
        ));
        if let Some(conflict) = ctx.detector().invalid_name(dest, DeclarationKind::Package) {
            builder.conflict(conflict);
            return builder.finish(ctx);
        }

        let mut types = Vec::new();
        for &id in &self.elements {
            let decl = ctx.decl(id)?;
            match decl.kind {
                DeclarationKind::Package => {
                    let last = decl.qualified_name.rsplit('.').next().unwrap_or(&decl.name);
                    let new_name = qualify(dest, last);
                    if new_name == decl.qualified_name {
                        continue;
                    }
                    let placement = &self.destination.placement;
                    rewrite_package(ctx, &mut builder, decl, &new_name, |file, from, to| {
                        resolver.target_dir(placement, to, file, from).map(Some)
                    })?;
                    builder.rewrite_occurrences(
                        ctx,
                        &self.scope(),
                        (&decl.qualified_name, &new_name),
                        (&decl.qualified_name, &new_name),
                    )?;
                }
                kind if kind.is_type() => {
                    if ctx.index.containing_type(id).is_some() {
                        return Err(RefactorError::UnsupportedElement {
                            operation: "move classes",
                            message: format!(
                                "{} is a nested class; move it out with move inner",
                                decl.qualified_name
                            ),
                        });
                    }
                    types.push(decl);
                }
                kind => {
                    return Err(RefactorError::UnsupportedElement {
                        operation: "move classes",
                        message: format!("cannot move {} {}", kind.name(), decl.qualified_name),
                    });
                }
            }
        }

        if !types.is_empty() {
            self.plan_types(ctx, &mut builder, &resolver, &types)?;
        }
        builder.finish(ctx)
    }
}

impl MoveClassesOrPackages {
    fn plan_types(
        &self,
        ctx: &PlanContext<'_>,
        builder: &mut PlanBuilder,
        resolver: &ContainerResolver,
        types: &[&Declaration],
    ) -> Result<()> {
        let dest = self.destination.package.as_str();
        let moved_ids: Vec<DeclarationId> = types.iter().map(|d| d.id).collect();
        let mut by_file: BTreeMap<&Path, Vec<&Declaration>> = BTreeMap::new();
        for decl in types {
            by_file.entry(decl.file.as_path()).or_default().push(decl);
        }
        let moved_files: HashSet<&Path> = by_file.keys().copied().collect();

        for (&file, decls) in &by_file {
            ctx.checkpoint()?;
            let info = ctx
                .file(file)
                .ok_or_else(|| RefactorError::UnknownDeclaration(file.display().to_string()))?;

            let left_behind: Vec<&DeclarationId> = info
                .top_level
                .iter()
                .filter(|id| !moved_ids.contains(id))
                .collect();
            if !left_behind.is_empty() {
                builder.conflict(
                    Conflict::blocking(
                        ConflictKind::IncompatibleTarget,
                        format!(
                            "{} declares other classes that are not moved",
                            file.display()
                        ),
                    )
                    .with_declaration(decls[0].id),
                );
            }

            let text = ctx.text(file)?;
            match (info.package_clause, dest.is_empty()) {
                (Some(clause), true) => {
                    let end = skip_whitespace(&text, clause.end);
                    builder.delete(file, crate::span::TextRange::new(clause.start, end));
                }
                (Some(clause), false) => {
                    builder.replace(file, clause, format!("package {};", dest));
                }
                (None, false) => builder.insert(file, 0, format!("package {};\n\n", dest)),
                (None, true) => {}
            }

            if info.package != dest {
                self.import_left_behind(ctx, builder, file, &info.package, &moved_ids);
            }

            let to = resolver.target_path(&self.destination.placement, dest, file, &info.package)?;
            if to != file {
                if ctx.storage.exists(&to) {
                    builder.conflict(ctx.detector().existing_file(&to));
                }
                builder.relocate(file, to);
            }
        }

        for decl in types {
            ctx.checkpoint()?;
            if decl.package == dest {
                continue;
            }
            if let Some(conflict) = ctx.detector().type_collision(dest, &decl.name, &moved_ids) {
                builder.conflict(conflict.with_declaration(decl.id));
            }
            let new_qualified = qualify(dest, &decl.name);
            let refs: Vec<&Reference> = ctx
                .references(decl.id)
                .into_iter()
                .filter(|r| r.context != ReferenceContext::This)
                .collect();
            let old_prefix = format!("{}.", decl.package);

            for r in &refs {
                let text = ctx.text(&r.file)?;
                let qualified = r.qualifier.is_some_and(|q| q.slice(&text) == old_prefix);
                if qualified {
                    builder.replace(&r.file, r.qualified_range(), new_qualified.as_str());
                    continue;
                }
                if r.qualifier.is_some() || moved_files.contains(r.file.as_path()) {
                    continue;
                }
                let info = ctx.file(&r.file);
                let imported_by_name = info.is_some_and(|i| i.imports_type(&decl.qualified_name));
                if !imported_by_name && ctx.index.package_of(&r.file) != dest {
                    builder.import(&r.file, new_qualified.as_str());
                }
            }

            let external = refs
                .iter()
                .copied()
                .filter(|r| !moved_files.contains(r.file.as_path()));
            builder.conflicts(ctx.detector().visibility_violations(
                decl,
                decl.visibility,
                dest,
                decl.id,
                external,
            ));
            self.member_visibility(ctx, builder, decl, &moved_files);

            builder.rewrite_occurrences(
                ctx,
                &self.scope(),
                (&decl.qualified_name, &new_qualified),
                (&decl.qualified_name, &new_qualified),
            )?;
        }

        for &file in &moved_files {
            outgoing_visibility(ctx, builder, file, dest, &moved_ids);
        }
        Ok(())
    }

    /// Imports for types of the old package still used by a moved file.
    fn import_left_behind(
        &self,
        ctx: &PlanContext<'_>,
        builder: &mut PlanBuilder,
        file: &Path,
        old_package: &str,
        moved: &[DeclarationId],
    ) {
        let index = ctx.index;
        let used: BTreeSet<&str> = index
            .all_references()
            .iter()
            .filter(|r| r.file == file && r.qualifier.is_none() && r.context.is_type_usage())
            .filter_map(|r| index.declaration(r.target))
            .filter(|t| {
                t.package == old_package
                    && index.containing_type(t.id).is_none()
                    && !moved.contains(&t.id)
            })
            .map(|t| t.qualified_name.as_str())
            .collect();
        for name in used {
            builder.import(file, name);
        }
    }

    /// Package-private and protected members of a moved type that code left
    /// in the old package can no longer reach.
    fn member_visibility(
        &self,
        ctx: &PlanContext<'_>,
        builder: &mut PlanBuilder,
        decl: &Declaration,
        moved_files: &HashSet<&Path>,
    ) {
        let dest = self.destination.package.as_str();
        let members = nested_members(ctx.index, decl.id);
        for member in members {
            if !matches!(member.visibility, Visibility::PackagePrivate | Visibility::Protected) {
                continue;
            }
            let external: Vec<&Reference> = ctx
                .references(member.id)
                .into_iter()
                .filter(|r| !moved_files.contains(r.file.as_path()))
                .collect();
            builder.conflicts(ctx.detector().visibility_violations(
                member,
                member.visibility,
                dest,
                member.id,
                external,
            ));
        }
    }
}

/// Members of a type and of its nested types, excluding locals.
fn nested_members(index: &ProgramIndex, type_id: DeclarationId) -> Vec<&Declaration> {
    let mut out = Vec::new();
    let mut queue = vec![type_id];
    while let Some(t) = queue.pop() {
        for &m in index.members(t) {
            let Some(d) = index.declaration(m) else {
                continue;
            };
            if d.kind.is_local() {
                continue;
            }
            if d.kind.is_type() {
                queue.push(d.id);
            }
            out.push(d);
        }
    }
    out
}

/// Declarations used by a moved file that it could no longer access from
/// the destination package.
fn outgoing_visibility(
    ctx: &PlanContext<'_>,
    builder: &mut PlanBuilder,
    file: &Path,
    dest: &str,
    moved: &[DeclarationId],
) {
    let index = ctx.index;
    let mut reported: BTreeSet<(DeclarationId, PathBuf)> = BTreeSet::new();
    for r in index.all_references().iter().filter(|r| r.file == file) {
        let Some(target) = index.declaration(r.target) else {
            continue;
        };
        if target.kind.is_local() || target.kind == DeclarationKind::Package {
            continue;
        }
        let inside = index
            .top_level_type(target.id)
            .is_some_and(|top| moved.contains(&top));
        if inside || target.package == dest {
            continue;
        }
        let package_private = |d: &Declaration| d.visibility == Visibility::PackagePrivate;
        let owner_hidden = index
            .top_level_type(target.id)
            .and_then(|top| index.declaration(top))
            .is_some_and(package_private);
        let hidden = match target.visibility {
            Visibility::PackagePrivate => true,
            Visibility::Protected => !r
                .enclosing
                .and_then(|e| index.type_or_container(e))
                .zip(index.containing_type(target.id))
                .is_some_and(|(from, owner)| index.is_subtype(from, owner)),
            Visibility::Private | Visibility::Public => false,
        };
        if (hidden || owner_hidden) && reported.insert((target.id, file.to_path_buf())) {
            builder.conflict(
                Conflict::blocking(
                    ConflictKind::VisibilityViolation,
                    format!(
                        "moved code in {} uses {} '{}', which is not accessible from package '{}'",
                        file.display(),
                        target.kind.name(),
                        target.qualified_name,
                        dest
                    ),
                )
                .with_declaration(target.id)
                .with_span(r.span()),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::Workspace;
    use super::*;

    const UTIL: &str = "package com.a;

public class Util {
    public static int twice(int x) { return x * 2; }
}
";

    const HELPER: &str = "package com.a;

public class Helper {
    int run() {
        return Util.twice(2);
    }
}
";

    const CLIENT: &str = "package com.b;

import com.a.Util;

class Client {
    int go() {
        return Util.twice(3) + com.a.Util.twice(1);
    }
}
";

    fn workspace() -> Workspace {
        Workspace::new(&[
            ("src/main/java/com/a/Util.java", UTIL),
            ("src/main/java/com/a/Helper.java", HELPER),
            ("src/main/java/com/b/Client.java", CLIENT),
        ])
    }

    #[test]
    fn test_move_class_relocates_and_rewrites() {
        let ws = workspace();
        let util = ws.index.resolve("com.a.Util").unwrap();
        let op = MoveClassesOrPackages::new(vec![util], MoveDestination::source_folder_preserving("com.c"));
        let planned = ws.plan(&op);
        assert!(!planned.has_blocking_conflicts(), "{:?}", planned.conflicts);

        assert!(ws.after(&planned, "src/main/java/com/a/Util.java").is_none());
        let moved = ws.after(&planned, "src/main/java/com/c/Util.java").unwrap();
        assert!(moved.starts_with("package com.c;\n"));

        let client = ws.after(&planned, "src/main/java/com/b/Client.java").unwrap();
        assert!(client.contains("import com.c.Util;"));
        assert!(client.contains("com.c.Util.twice(1)"));

        let helper = ws.after(&planned, "src/main/java/com/a/Helper.java").unwrap();
        assert!(helper.contains("import com.c.Util;"));
    }

    #[test]
    fn test_package_private_class_cannot_leave_its_users() {
        let ws = Workspace::new(&[
            ("com/a/Hidden.java", "package com.a;\n\nclass Hidden {}\n"),
            ("com/a/User.java", "package com.a;\n\nclass User { Hidden h; }\n"),
        ]);
        let hidden = ws.index.resolve("com.a.Hidden").unwrap();
        let op = MoveClassesOrPackages::new(vec![hidden], MoveDestination::source_folder_preserving("com.b"));
        let planned = ws.plan(&op);
        assert!(planned
            .conflicts
            .iter()
            .any(|c| c.kind == ConflictKind::VisibilityViolation && c.is_blocking()));
    }

    #[test]
    fn test_move_package_keeps_last_segment() {
        let ws = workspace();
        let package = ws.index.package("com.a").unwrap();
        let op = MoveClassesOrPackages::new(vec![package], MoveDestination::source_folder_preserving("org"));
        let planned = ws.plan(&op);

        let moved = ws.after(&planned, "src/main/java/org/a/Util.java").unwrap();
        assert!(moved.starts_with("package org.a;"));
        let client = ws.after(&planned, "src/main/java/com/b/Client.java").unwrap();
        assert!(client.contains("import org.a.Util;"));
        assert!(client.contains("org.a.Util.twice(1)"));
    }

    #[test]
    fn test_nested_class_is_unsupported() {
        let ws = Workspace::new(&[("p/A.java", "package p;\n\nclass A {\n    static class B {}\n}\n")]);
        let inner = ws.index.resolve("p.A.B").unwrap();
        let op = MoveClassesOrPackages::new(vec![inner], MoveDestination::source_folder_preserving("q"));
        let err = op.plan(&ws.ctx()).unwrap_err();
        assert!(matches!(err, RefactorError::UnsupportedElement { .. }));
    }

    #[test]
    fn test_unknown_source_root_is_ambiguous() {
        let ws = workspace();
        let util = ws.index.resolve("com.a.Util").unwrap();
        let op = MoveClassesOrPackages::new(vec![util], MoveDestination::source_root("com.c", "nowhere"));
        let err = op.plan(&ws.ctx()).unwrap_err();
        assert!(matches!(err, RefactorError::AmbiguousTarget { .. }));
    }
}
