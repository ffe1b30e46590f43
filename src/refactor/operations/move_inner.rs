//! Turning an inner class into a top-level class.

use std::collections::HashSet;

use crate::container::ContainerResolver;
use crate::error::{RefactorError, Result};
use crate::refactor::conflict::{Conflict, ConflictKind};
use crate::refactor::plan::materialize;
use crate::scope::{DeclarationId, DeclarationKind, ReferenceContext, Visibility};
use crate::span::{indentation_at, TextRange};

use super::context::{PlanBuilder, PlanContext, Planned};
use super::make_static::inject_fields;
use super::text::{member_extent, qualify, reindent, skip_whitespace, variable_name_for, visibility_edit};
use super::Refactoring;

/// Move an inner class to its own file in the same package.
///
/// With `pass_outer_class`, the new class receives the outer instance
/// through a constructor parameter stored in a field named
/// `parameter_name`, and every use of outer instance state goes through it.
#[derive(Debug, Clone)]
pub struct MoveInner {
    pub inner: DeclarationId,
    pub new_name: String,
    pub pass_outer_class: bool,
    /// Name of the outer-instance field and parameter.
    pub parameter_name: Option<String>,
}

impl MoveInner {
    /// Create a new MoveInner operation.
    pub fn new(inner: DeclarationId, new_name: impl Into<String>) -> Self {
        Self {
            inner,
            new_name: new_name.into(),
            pass_outer_class: false,
            parameter_name: None,
        }
    }

    /// Pass the outer instance to the new class.
    pub fn pass_outer_class(mut self, parameter_name: impl Into<String>) -> Self {
        self.pass_outer_class = true;
        self.parameter_name = Some(parameter_name.into());
        self
    }
}

impl Refactoring for MoveInner {
    fn name(&self) -> &'static str {
        "Move Inner Class"
    }

    fn plan(&self, ctx: &PlanContext<'_>) -> Result<Planned> {
        let inner = ctx.decl(self.inner)?;
        let outer_id = ctx
            .index
            .containing_type(inner.id)
            .filter(|_| inner.kind.is_type())
            .ok_or_else(|| RefactorError::UnsupportedElement {
                operation: "move inner",
                message: format!("{} is not a nested class", inner.qualified_name),
            })?;
        if inner.container != Some(outer_id) {
            return Err(RefactorError::UnsupportedElement {
                operation: "move inner",
                message: format!("{} is a local class", inner.qualified_name),
            });
        }
        let outer = ctx.decl(outer_id)?;
        let file = inner.file.as_path();
        let info = ctx
            .file(file)
            .ok_or_else(|| RefactorError::UnknownDeclaration(file.display().to_string()))?;
        ContainerResolver::for_index(ctx.settings, ctx.index).source_root_of(file, &info.package)?;

        let new_name = self.new_name.as_str();
        let new_qualified = qualify(&inner.package, new_name);
        let new_path = file.with_file_name(format!("{}.java", new_name));
        let mut builder = PlanBuilder::new(format!(
            "Move inner class {} to {}",
            inner.qualified_name, new_qualified
        ));
        let detector = ctx.detector();
        if let Some(conflict) = detector.invalid_name(new_name, inner.kind) {
            builder.conflict(conflict);
        }
        if let Some(conflict) = detector.type_collision(&inner.package, new_name, &[]) {
            builder.conflict(conflict.with_declaration(inner.id));
        }
        if ctx.storage.exists(&new_path) {
            builder.conflict(detector.existing_file(&new_path));
        }

        let text = ctx.text(file)?;
        let extent = member_extent(&text, inner, Some(info));
        let inner_range = inner.range;
        let passes_outer = self.pass_outer_class && !inner.is_static;
        let param = self
            .parameter_name
            .clone()
            .unwrap_or_else(|| variable_name_for(&outer.name));
        if passes_outer && let Some(conflict) = detector.invalid_name(&param, DeclarationKind::Field) {
            builder.conflict(conflict);
        }

        // Uses of the outer class from inside the inner class.
        let mut outer_this_members: HashSet<usize> = HashSet::new();
        let inner_refs: Vec<_> = ctx
            .index
            .all_references()
            .iter()
            .filter(|r| r.file == file && inner_range.contains(r.range.start))
            .collect();
        for r in &inner_refs {
            let Some(target) = ctx.index.declaration(r.target) else {
                continue;
            };
            if target.container != Some(outer_id) || target.kind.is_type() || target.kind.is_local() {
                continue;
            }
            if target.visibility == Visibility::Private {
                builder.conflict(
                    Conflict::blocking(
                        ConflictKind::VisibilityViolation,
                        format!(
                            "{} uses private {} '{}' of {}",
                            inner.name,
                            target.kind.name(),
                            target.name,
                            outer.name
                        ),
                    )
                    .with_declaration(target.id)
                    .with_span(r.span()),
                );
            }
            let qualifier = r.qualifier.map(|q| q.slice(&text).replace(char::is_whitespace, ""));
            let via_outer_this = qualifier.as_deref() == Some(format!("{}.this.", outer.name).as_str());
            match (target.is_static, r.qualifier) {
                (true, None) if r.context == ReferenceContext::Unqualified => {
                    builder.insert(file, r.range.start, format!("{}.", outer.name));
                }
                (false, None) | (false, Some(_)) if r.qualifier.is_none() || via_outer_this => {
                    if !passes_outer {
                        builder.conflict(
                            Conflict::blocking(
                                ConflictKind::StaticContext,
                                format!(
                                    "{} uses {} '{}' of the outer instance",
                                    inner.name,
                                    target.kind.name(),
                                    target.name
                                ),
                            )
                            .with_declaration(target.id)
                            .with_span(r.span()),
                        );
                    } else if let Some(q) = r.qualifier {
                        outer_this_members.insert(q.start);
                        builder.replace(file, q, format!("{}.", param));
                    } else {
                        builder.insert(file, r.range.start, format!("{}.", param));
                    }
                }
                _ => {}
            }
        }
        // Bare `Outer.this`.
        for r in inner_refs.iter().filter(|r| r.target == outer_id && r.qualifier.is_none()) {
            let rest = &text[r.range.end..];
            let after_dot = rest.trim_start().strip_prefix('.').map(str::trim_start);
            if after_dot.is_some_and(|s| s.starts_with("this")) && !outer_this_members.contains(&r.range.start) {
                let this_end = r.range.end + rest.find("this").unwrap_or(0) + "this".len();
                if passes_outer {
                    builder.replace(file, TextRange::new(r.range.start, this_end), param.as_str());
                } else {
                    builder.conflict(
                        Conflict::blocking(
                            ConflictKind::StaticContext,
                            format!("{} uses {}.this", inner.name, outer.name),
                        )
                        .with_span(r.span()),
                    );
                }
            }
        }

        // Private members of the inner class used by the rest of the file.
        for member in ctx.index.members(inner.id).iter().filter_map(|&m| ctx.index.declaration(m)) {
            if member.visibility != Visibility::Private || member.kind.is_local() {
                continue;
            }
            let outside = ctx
                .references(member.id)
                .into_iter()
                .find(|r| r.file != file || !inner_range.contains(r.range.start));
            if let Some(r) = outside {
                builder.conflict(
                    Conflict::blocking(
                        ConflictKind::VisibilityViolation,
                        format!(
                            "private {} '{}' of {} is used outside of it",
                            member.kind.name(),
                            member.name,
                            inner.name
                        ),
                    )
                    .with_declaration(member.id)
                    .with_span(r.span()),
                );
            }
        }

        // Declaration: name, modifiers, constructors, outer field.
        builder.replace(file, inner.name_range, new_name);
        if let Some(keyword) = inner.static_keyword {
            builder.delete(file, TextRange::new(keyword.start, skip_whitespace(&text, keyword.end)));
        }
        if matches!(inner.visibility, Visibility::Private | Visibility::Protected)
            && let Some((range, keyword)) = visibility_edit(&text, inner, Visibility::PackagePrivate)
        {
            builder.replace(file, range, keyword);
        }
        let constructors = ctx.index.constructors(inner.id);
        for ctor in &constructors {
            builder.replace(file, ctor.name_range, new_name);
        }
        if passes_outer {
            let field = [(outer.name.clone(), param.clone())];
            inject_fields(&mut builder, &text, inner, &constructors, &field, new_name);
        }

        // Uses of the inner class.
        for r in ctx.references(inner.id) {
            ctx.checkpoint()?;
            if r.context == ReferenceContext::This {
                continue;
            }
            let site_text = ctx.text(&r.file)?;
            match (r.context, r.qualifier) {
                (ReferenceContext::Import, Some(_)) => {
                    builder.replace(&r.file, r.qualified_range(), new_qualified.as_str());
                }
                (_, Some(_)) => {
                    builder.replace(&r.file, r.qualified_range(), new_name);
                    builder.import(&r.file, new_qualified.as_str());
                }
                (_, None) => {
                    builder.replace(&r.file, r.range, new_name);
                    if r.file != file {
                        builder.import(&r.file, new_qualified.as_str());
                    }
                }
            }
            if passes_outer
                && r.context == ReferenceContext::Construction
                && let Some(call) = &r.call
            {
                let callee = call.callee.slice(&site_text);
                match callee.find(".new") {
                    Some(dot) => {
                        let receiver = callee[..dot].trim();
                        builder.delete(&r.file, TextRange::new(call.callee.start, call.callee.start + dot + 1));
                        insert_argument(&mut builder, &r.file, &call.arguments, &call.args, receiver);
                    }
                    None => {
                        let in_outer_instance = r.enclosing.is_some_and(|e| {
                            ctx.index.is_within(e, outer_id)
                                && !ctx.index.is_within(e, inner.id)
                                && ctx.index.declaration(e).is_some_and(|d| !d.is_static)
                        });
                        let inside_inner = r.enclosing.is_some_and(|e| ctx.index.is_within(e, inner.id));
                        if in_outer_instance {
                            insert_argument(&mut builder, &r.file, &call.arguments, &call.args, "this");
                        } else if inside_inner {
                            insert_argument(&mut builder, &r.file, &call.arguments, &call.args, &param);
                        } else {
                            builder.conflict(
                                Conflict::warning(
                                    ConflictKind::UnsafeUsage,
                                    format!(
                                        "cannot tell which {} instance to pass to new {}",
                                        outer.name, new_name
                                    ),
                                )
                                .with_span(r.span()),
                            );
                        }
                    }
                }
            }
        }

        // Cut the class into its own file.
        let edits = builder.take_edits_in(file, extent);
        let body = materialize(file, &text, extent, &edits)?;
        let body = reindent(&body, indentation_at(&text, inner.range.start), "");
        builder.delete(file, extent);

        let mut content = String::new();
        if !info.package.is_empty() {
            content.push_str(&format!("package {};\n\n", info.package));
        }
        for import in &info.imports {
            content.push_str(import.range.slice(&text));
            content.push('\n');
        }
        if !info.imports.is_empty() {
            content.push('\n');
        }
        content.push_str(body.trim_start_matches('\n'));
        builder.create_file(new_path, content);
        builder.finish(ctx)
    }
}

fn insert_argument(
    builder: &mut PlanBuilder,
    file: &std::path::Path,
    arguments: &TextRange,
    args: &[TextRange],
    value: &str,
) {
    let text = if args.is_empty() {
        value.to_string()
    } else {
        format!("{}, ", value)
    };
    builder.insert(file, arguments.start + 1, text);
}

#[cfg(test)]
mod tests {
    use super::super::testing::Workspace;
    use super::*;

    const OUTER: &str = "package p;

public class Outer {
    private int unused;
    int count = 3;

    class Item {
        int doubled() {
            return count * 2;
        }
    }

    Item make() {
        return new Item();
    }
}
";

    fn workspace() -> Workspace {
        Workspace::new(&[("src/main/java/p/Outer.java", OUTER)])
    }

    #[test]
    fn test_move_inner_trait() {
        assert_eq!(MoveInner::new(DeclarationId(0), "X").name(), "Move Inner Class");
    }

    #[test]
    fn test_move_inner_passing_outer_instance() {
        let ws = workspace();
        let item = ws.index.resolve("p.Outer.Item").unwrap();
        let planned = ws.plan(&MoveInner::new(item, "Item").pass_outer_class("outer"));
        assert!(!planned.has_blocking_conflicts(), "{:?}", planned.conflicts);

        let moved = ws.after(&planned, "src/main/java/p/Item.java").unwrap();
        assert_eq!(
            moved,
            "package p;

class Item {
    private final Outer outer;

    Item(Outer outer) {
        this.outer = outer;
    }

    int doubled() {
        return outer.count * 2;
    }
}
"
        );
        let outer = ws.after(&planned, "src/main/java/p/Outer.java").unwrap();
        assert!(outer.contains("return new Item(this);"));
        assert!(!outer.contains("class Item"));
    }

    #[test]
    fn test_outer_state_without_passing_is_blocking() {
        let ws = workspace();
        let item = ws.index.resolve("p.Outer.Item").unwrap();
        let planned = ws.plan(&MoveInner::new(item, "Item"));
        assert!(planned
            .conflicts
            .iter()
            .any(|c| c.kind == ConflictKind::StaticContext && c.is_blocking()));
    }

    #[test]
    fn test_file_outside_source_roots_is_ambiguous() {
        let ws = Workspace::new(&[("misc/Outer.java", OUTER)]);
        let item = ws.index.resolve("p.Outer.Item").unwrap();
        let err = MoveInner::new(item, "Item").plan(&ws.ctx()).unwrap_err();
        assert!(matches!(err, RefactorError::AmbiguousTarget { .. }));
    }
}
