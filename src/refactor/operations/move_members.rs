//! Moving static members between classes.

use std::path::Path;

use crate::error::{RefactorError, Result};
use crate::refactor::conflict::{Conflict, ConflictKind};
use crate::refactor::plan::materialize;
use crate::scope::{
    erase_type, Declaration, DeclarationId, DeclarationKind, ReferenceContext, Visibility,
};
use crate::span::{indentation_at, TextRange};

use super::context::{PlanBuilder, PlanContext, Planned};
use super::text::{body_end_insertion, member_extent, reindent, visibility_edit, INDENT};
use super::Refactoring;

/// Move static fields, methods and nested classes to another class.
///
/// Member text is carried over with its internal references rewritten:
/// static members left behind are reached through the source class.
/// References elsewhere are re-qualified with the target class.
#[derive(Debug, Clone)]
pub struct MoveMembers {
    pub members: Vec<DeclarationId>,
    /// Qualified name of the target class.
    pub target_class: String,
    /// Visibility of the moved members; `None` keeps their own.
    pub visibility: Option<Visibility>,
    /// Turn `static final E X = new E(..)` fields moved into enum `E` into
    /// enum constants.
    pub make_enum_constants: bool,
}

impl MoveMembers {
    /// Create a new MoveMembers operation.
    pub fn new(members: Vec<DeclarationId>, target_class: impl Into<String>) -> Self {
        Self {
            members,
            target_class: target_class.into(),
            visibility: None,
            make_enum_constants: false,
        }
    }

    /// Give the moved members this visibility.
    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = Some(visibility);
        self
    }

    /// Convert matching fields to enum constants.
    pub fn make_enum_constants(mut self, enabled: bool) -> Self {
        self.make_enum_constants = enabled;
        self
    }
}

/// A member that passed validation, with its source class.
struct Moving<'a> {
    decl: &'a Declaration,
    source: &'a Declaration,
    extent: TextRange,
    as_constant: bool,
}

impl Refactoring for MoveMembers {
    fn name(&self) -> &'static str {
        "Move Members"
    }

    fn plan(&self, ctx: &PlanContext<'_>) -> Result<Planned> {
        let target_id = ctx.resolve_class(&self.target_class)?;
        let target = ctx.decl(target_id)?;
        let target_body = target.body.ok_or_else(|| RefactorError::UnsupportedElement {
            operation: "move members",
            message: format!("{} has no body", target.qualified_name),
        })?;
        let mut builder = PlanBuilder::new(format!(
            "Move {} member(s) to {}",
            self.members.len(),
            target.qualified_name
        ));
        let detector = ctx.detector();

        let mut moving: Vec<Moving<'_>> = Vec::new();
        for &id in &self.members {
            ctx.checkpoint()?;
            let decl = ctx.decl(id)?;
            if !matches!(decl.kind, DeclarationKind::Field | DeclarationKind::Method)
                && !decl.kind.is_type()
            {
                return Err(RefactorError::UnsupportedElement {
                    operation: "move members",
                    message: format!("cannot move {} {}", decl.kind.name(), decl.qualified_name),
                });
            }
            let source_id = ctx.index.containing_type(id).ok_or_else(|| {
                RefactorError::UnsupportedElement {
                    operation: "move members",
                    message: format!("{} is not a member of a class", decl.qualified_name),
                }
            })?;
            let source = ctx.decl(source_id)?;

            if source_id == target_id || ctx.index.is_within(target_id, id) {
                builder.conflict(
                    Conflict::blocking(
                        ConflictKind::IncompatibleTarget,
                        format!(
                            "{} cannot be moved into {}",
                            decl.qualified_name, target.qualified_name
                        ),
                    )
                    .with_declaration(id),
                );
                continue;
            }
            if !decl.is_static {
                builder.conflict(
                    Conflict::blocking(
                        ConflictKind::StaticContext,
                        format!("{} '{}' is not static", decl.kind.name(), decl.name),
                    )
                    .with_declaration(id)
                    .with_span(decl.name_span()),
                );
                continue;
            }
            let shares_declaration = ctx.index.members(source_id).iter().any(|&m| {
                m != id && ctx.index.declaration(m).is_some_and(|d| d.range == decl.range)
            });
            if shares_declaration {
                builder.conflict(
                    Conflict::blocking(
                        ConflictKind::IncompatibleTarget,
                        format!(
                            "field '{}' shares its declaration with other fields",
                            decl.name
                        ),
                    )
                    .with_declaration(id),
                );
                continue;
            }

            builder.conflicts(
                detector
                    .member_collisions(target_id, &decl.name, decl.kind.namespace(), decl.arity)
                    .into_iter()
                    .map(|c| c.with_declaration(id)),
            );

            let text = ctx.text(&decl.file)?;
            let as_constant = self.make_enum_constants && enum_constant_candidate(&text, decl, target);
            moving.push(Moving {
                decl,
                source,
                extent: member_extent(&text, decl, ctx.file(&decl.file)),
                as_constant,
            });
        }

        let moved_ids: Vec<DeclarationId> = moving.iter().map(|m| m.decl.id).collect();
        let inside_moved = |file: &Path, offset: usize| {
            moving
                .iter()
                .any(|m| m.decl.file == file && m.extent.contains(offset))
        };

        // References to the moved members.
        for m in &moving {
            ctx.checkpoint()?;
            let visibility = self.visibility.unwrap_or(m.decl.visibility);
            let mut external = Vec::new();
            for r in ctx.references(m.decl.id) {
                let in_target = r.enclosing.is_some_and(|e| ctx.index.is_within(e, target_id));
                let moving_with = inside_moved(&r.file, r.range.start);
                if !in_target && !moving_with {
                    external.push(r);
                }
                let text = ctx.text(&r.file)?;
                match (r.context, r.qualifier) {
                    (ReferenceContext::Import, Some(qualifier)) => {
                        builder.replace(&r.file, qualifier, format!("{}.", target.qualified_name));
                    }
                    (_, Some(qualifier)) => {
                        let separator = if qualifier.slice(&text).trim_end().ends_with("::") {
                            "::"
                        } else {
                            "."
                        };
                        builder.replace(&r.file, qualifier, format!("{}{}", target.name, separator));
                        builder.import(&r.file, target.qualified_name.as_str());
                    }
                    (_, None) if in_target || moving_with => {}
                    (_, None) => {
                        builder.insert(&r.file, r.range.start, format!("{}.", target.name));
                        builder.import(&r.file, target.qualified_name.as_str());
                    }
                }
            }
            builder.conflicts(detector.visibility_violations(
                m.decl,
                visibility,
                &target.package,
                target_id,
                external,
            ));
        }

        // References made by the moved code.
        for m in &moving {
            let text = ctx.text(&m.decl.file)?;
            let inner = ctx
                .index
                .all_references()
                .iter()
                .filter(|r| r.file == m.decl.file && m.extent.contains(r.range.start));
            for r in inner {
                let Some(used) = ctx.index.declaration(r.target) else {
                    continue;
                };
                if used.kind.is_local() || moved_ids.iter().any(|&id| ctx.index.is_within(used.id, id)) {
                    continue;
                }
                if r.context.is_type_usage() && r.qualifier.is_none() && used.kind.is_type() {
                    if ctx.index.containing_type(used.id).is_none() {
                        builder.import(&target.file, used.qualified_name.as_str());
                    }
                    continue;
                }
                let member_of_source = used.container == Some(m.source.id);
                if member_of_source && r.qualifier.is_none() && used.is_static && !used.kind.is_type() {
                    builder.insert(&r.file, r.range.start, format!("{}.", m.source.name));
                    builder.import(&target.file, m.source.qualified_name.as_str());
                }
                if member_of_source && !used.is_static && r.context != ReferenceContext::This {
                    builder.conflict(
                        Conflict::blocking(
                            ConflictKind::StaticContext,
                            format!(
                                "moved member '{}' uses instance member '{}'",
                                m.decl.name, used.name
                            ),
                        )
                        .with_declaration(used.id)
                        .with_span(r.span()),
                    );
                }
                if !ctx.index.is_accessible_as(
                    used,
                    used.visibility,
                    &used.package,
                    used.id,
                    &target.file,
                    Some(target_id),
                ) {
                    builder.conflict(
                        Conflict::blocking(
                            ConflictKind::VisibilityViolation,
                            format!(
                                "moved member '{}' uses {} '{}', which {} cannot access",
                                m.decl.name,
                                used.kind.name(),
                                used.qualified_name,
                                target.qualified_name
                            ),
                        )
                        .with_declaration(used.id)
                        .with_span(r.span()),
                    );
                }
            }
            if let Some(visibility) = self.visibility
                && let Some((range, keyword)) = visibility_edit(&text, m.decl, visibility)
            {
                builder.replace(&m.decl.file, range, keyword);
            }
        }

        // Cut the members and paste them into the target body.
        let target_text = ctx.text(&target.file)?;
        let mut insertion = body_end_insertion(&target_text, target_body);
        let mut constants = Vec::new();
        for m in &moving {
            let text = ctx.text(&m.decl.file)?;
            let edits = builder.take_edits_in(&m.decl.file, m.extent);
            builder.delete(&m.decl.file, m.extent);
            if m.as_constant {
                constants.push(enum_constant_text(&text, m.decl, &edits)?);
                continue;
            }
            let member = materialize(&m.decl.file, &text, m.extent, &edits)?;
            let from = indentation_at(&text, m.decl.range.start);
            builder.insert(
                &target.file,
                insertion.offset,
                insertion.wrap(&reindent(&member, from, &insertion.indent)),
            );
        }

        if target.kind == DeclarationKind::Enum {
            let has_members = moving.iter().any(|m| !m.as_constant);
            enum_edits(ctx, &mut builder, target, &target_text, &constants, has_members);
        }
        builder.finish(ctx)
    }
}

/// A `static final E X = new E(..)` field about to move into enum `E`.
fn enum_constant_candidate(text: &str, decl: &Declaration, target: &Declaration) -> bool {
    target.kind == DeclarationKind::Enum
        && decl.kind == DeclarationKind::Field
        && decl.is_final
        && decl.type_text.as_deref().map(erase_type) == Some(target.name.as_str())
        && decl
            .initializer
            .map(|init| init.slice(text).trim_start())
            .is_some_and(|init| {
                init.strip_prefix("new")
                    .map(str::trim_start)
                    .is_some_and(|rest| rest.starts_with(&target.name) && rest.contains('('))
            })
}

/// `NAME(args)` for a field initialized with `new E(args)`.
fn enum_constant_text(
    text: &str,
    decl: &Declaration,
    edits: &[crate::refactor::plan::Edit],
) -> Result<String> {
    let Some(init) = decl.initializer else {
        return Ok(decl.name.clone());
    };
    let value = materialize(&decl.file, text, init, edits)?;
    let arguments = value
        .find('(')
        .map(|open| value[open..].trim())
        .unwrap_or("()");
    if arguments == "()" {
        Ok(decl.name.clone())
    } else {
        Ok(format!("{}{}", decl.name, arguments))
    }
}

/// Adds new constants to an enum and makes sure its constant list is
/// terminated before any members.
fn enum_edits(
    ctx: &PlanContext<'_>,
    builder: &mut PlanBuilder,
    target: &Declaration,
    text: &str,
    constants: &[String],
    has_members: bool,
) {
    let Some(body) = target.body else {
        return;
    };
    let last_constant = ctx
        .index
        .members(target.id)
        .iter()
        .filter_map(|&m| ctx.index.declaration(m))
        .filter(|d| d.kind == DeclarationKind::EnumConstant)
        .map(|d| d.range.end)
        .max();
    let indent = format!("{}{}", indentation_at(text, target.range.start), INDENT);

    match last_constant {
        Some(end) => {
            let rest = &text[end..body.end];
            let terminated = rest.trim_start().trim_start_matches(',').trim_start().starts_with(';');
            let mut insertion = String::new();
            for constant in constants {
                insertion.push_str(&format!(",\n{}{}", indent, constant));
            }
            if !terminated && has_members {
                insertion.push(';');
            }
            builder.insert(&target.file, end, insertion);
        }
        None => {
            let open = body.start + 1;
            let rest = &text[open..body.end];
            let semicolon = rest
                .trim_start()
                .starts_with(';')
                .then(|| open + rest.len() - rest.trim_start().len());
            if constants.is_empty() && (semicolon.is_some() || !has_members) {
                return;
            }
            let list = format!("\n{}{};", indent, constants.join(&format!(",\n{}", indent)));
            match semicolon {
                // An empty constant list `;` is replaced by the new one.
                Some(at) => builder.replace(&target.file, TextRange::new(open, at + 1), list),
                None => builder.insert(&target.file, open, list),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::Workspace;
    use super::*;

    const SOURCE: &str = "package p;

public class Source {
    public static int base = 10;

    public static int scaled(int x) {
        return x * base;
    }

    void run() {
        System.out.println(scaled(2));
    }
}
";

    const TARGET: &str = "package q;

public class Target {
    static int other() {
        return 1;
    }
}
";

    const USER: &str = "package p;

class User {
    int go() {
        return Source.scaled(3);
    }
}
";

    fn workspace() -> Workspace {
        Workspace::new(&[
            ("p/Source.java", SOURCE),
            ("q/Target.java", TARGET),
            ("p/User.java", USER),
        ])
    }

    #[test]
    fn test_move_members_trait() {
        assert_eq!(MoveMembers::new(vec![], "q.Target").name(), "Move Members");
    }

    #[test]
    fn test_move_static_method() {
        let ws = workspace();
        let scaled = ws.index.resolve("p.Source#scaled").unwrap();
        let planned = ws.plan(&MoveMembers::new(vec![scaled], "q.Target"));
        assert!(!planned.has_blocking_conflicts(), "{:?}", planned.conflicts);

        let target = ws.after(&planned, "q/Target.java").unwrap();
        assert!(target.contains("import p.Source;"));
        assert!(target.contains("    public static int scaled(int x) {\n        return x * Source.base;\n    }\n}\n"));

        let source = ws.after(&planned, "p/Source.java").unwrap();
        assert!(!source.contains("public static int scaled"));
        assert!(source.contains("System.out.println(Target.scaled(2));"));
        assert!(source.contains("import q.Target;"));

        let user = ws.after(&planned, "p/User.java").unwrap();
        assert!(user.contains("return Target.scaled(3);"));
    }

    #[test]
    fn test_instance_member_is_blocking() {
        let ws = workspace();
        let run = ws.index.resolve("p.Source#run").unwrap();
        let planned = ws.plan(&MoveMembers::new(vec![run], "q.Target"));
        assert!(planned
            .conflicts
            .iter()
            .any(|c| c.kind == ConflictKind::StaticContext && c.is_blocking()));
    }

    #[test]
    fn test_downgraded_visibility_is_checked() {
        let ws = workspace();
        let scaled = ws.index.resolve("p.Source#scaled").unwrap();
        let op = MoveMembers::new(vec![scaled], "q.Target").with_visibility(Visibility::PackagePrivate);
        let planned = ws.plan(&op);
        assert!(planned
            .conflicts
            .iter()
            .any(|c| c.kind == ConflictKind::VisibilityViolation));
    }

    #[test]
    fn test_fields_become_enum_constants() {
        let ws = Workspace::new(&[
            (
                "p/Colors.java",
                "package p;\n\nclass Colors {\n    static final Color RED = new Color(255);\n}\n",
            ),
            (
                "p/Color.java",
                "package p;\n\nenum Color {\n    BLUE(0);\n\n    Color(int v) {}\n}\n",
            ),
        ]);
        let red = ws.index.resolve("p.Colors#RED").unwrap();
        let op = MoveMembers::new(vec![red], "p.Color").make_enum_constants(true);
        let planned = ws.plan(&op);

        let color = ws.after(&planned, "p/Color.java").unwrap();
        assert!(color.contains("BLUE(0),\n    RED(255);"), "{}", color);
        let colors = ws.after(&planned, "p/Colors.java").unwrap();
        assert!(!colors.contains("RED"));
    }

    #[test]
    fn test_move_into_empty_class() {
        let ws = Workspace::new(&[
            ("p/Source.java", SOURCE),
            ("q/Empty.java", "package q;\n\npublic class Empty {\n}\n"),
        ]);
        let scaled = ws.index.resolve("p.Source#scaled").unwrap();
        let planned = ws.plan(&MoveMembers::new(vec![scaled], "q.Empty"));
        assert!(!planned.has_blocking_conflicts(), "{:?}", planned.conflicts);

        let target = ws.after(&planned, "q/Empty.java").unwrap();
        assert!(
            target.contains(
                "public class Empty {\n    public static int scaled(int x) {\n        return x * Source.base;\n    }\n}\n"
            ),
            "{}",
            target
        );
    }

    #[test]
    fn test_constants_replace_empty_constant_list() {
        let ws = Workspace::new(&[
            (
                "p/Colors.java",
                "package p;\n\nclass Colors {\n    static final Color RED = new Color(1);\n}\n",
            ),
            (
                "p/Color.java",
                "package p;\n\nenum Color {\n    ;\n\n    Color(int v) {}\n}\n",
            ),
        ]);
        let red = ws.index.resolve("p.Colors#RED").unwrap();
        let op = MoveMembers::new(vec![red], "p.Color").make_enum_constants(true);
        let planned = ws.plan(&op);

        let color = ws.after(&planned, "p/Color.java").unwrap();
        assert!(color.contains("enum Color {\n    RED(1);\n\n    Color(int v) {}"), "{}", color);
    }
}
