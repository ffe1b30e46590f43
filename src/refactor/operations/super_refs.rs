//! Retyping variables from a class to one of its supertypes.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::PathBuf;

use crate::error::{RefactorError, Result};
use crate::refactor::conflict::{Conflict, ConflictKind};
use crate::scope::{Declaration, DeclarationId, DeclarationKind, Reference, ReferenceContext};
use crate::span::TextRange;

use super::context::{PlanBuilder, PlanContext, Planned};
use super::make_static::override_conflicts;
use super::Refactoring;

/// Use `super_class` instead of `class` wherever a variable only needs
/// what the supertype offers.
#[derive(Debug, Clone)]
pub struct TurnRefsToSuper {
    pub class: DeclarationId,
    pub super_class: DeclarationId,
    /// Also retarget `instanceof` checks.
    pub replace_instance_of: bool,
}

impl TurnRefsToSuper {
    pub fn new(class: DeclarationId, super_class: DeclarationId) -> Self {
        Self {
            class,
            super_class,
            replace_instance_of: false,
        }
    }

    pub fn replace_instance_of(mut self, enabled: bool) -> Self {
        self.replace_instance_of = enabled;
        self
    }
}

/// Why a variable keeps the subclass type.
enum Blocker {
    Member(String),
    Flow(String),
    Signature,
    Shared,
}

impl Blocker {
    fn describe(&self) -> String {
        match self {
            Blocker::Member(name) => format!("uses '{}', which the supertype lacks", name),
            Blocker::Flow(into) => format!("flows into {}", into),
            Blocker::Signature => "belongs to an overriding method".to_string(),
            Blocker::Shared => "shares its declaration with a variable that must keep the type".to_string(),
        }
    }
}

impl Refactoring for TurnRefsToSuper {
    fn name(&self) -> &'static str {
        "Use Supertype Where Possible"
    }

    fn plan(&self, ctx: &PlanContext<'_>) -> Result<Planned> {
        let class = ctx.decl(self.class)?;
        let sup = ctx.decl(self.super_class)?;
        if class.id == sup.id || !ctx.index.is_subtype(class.id, sup.id) {
            return Err(RefactorError::UnsupportedElement {
                operation: "turn references to super",
                message: format!("{} is not a supertype of {}", sup.qualified_name, class.qualified_name),
            });
        }
        let mut builder = PlanBuilder::new(format!(
            "Use {} instead of {} where possible",
            sup.qualified_name, class.qualified_name
        ));

        let candidates = candidates(ctx, class);
        let ids: HashSet<DeclarationId> = candidates.iter().map(|c| c.id).collect();

        // Direct blockers and flow edges between candidates.
        let mut blocked: HashMap<DeclarationId, Blocker> = HashMap::new();
        let mut flows: HashMap<DeclarationId, Vec<DeclarationId>> = HashMap::new();
        for var in &candidates {
            ctx.checkpoint()?;
            if var.kind == DeclarationKind::Parameter
                && let Some(method) = var.container.and_then(|m| ctx.index.declaration(m))
                && let Some(owner) = ctx.index.containing_type(method.id).and_then(|t| ctx.index.declaration(t))
                && method.kind == DeclarationKind::Method
                && !override_conflicts(ctx, owner, method).is_empty()
            {
                blocked.insert(var.id, Blocker::Signature);
                continue;
            }
            for r in ctx.references(var.id) {
                match use_of(ctx, class, sup, var, r)? {
                    Use::Fine => {}
                    Use::Into(target) if ids.contains(&target) => {
                        flows.entry(var.id).or_default().push(target)
                    }
                    Use::Into(target) => {
                        blocked.insert(var.id, Blocker::Flow(ctx.index.describe(target)));
                    }
                    Use::Blocked(blocker) => {
                        blocked.insert(var.id, blocker);
                    }
                }
            }
        }

        // Multi-declarator fields share one type.
        let mut groups: BTreeMap<(PathBuf, TextRange), Vec<DeclarationId>> = BTreeMap::new();
        for var in &candidates {
            if let Some(range) = var.type_range {
                groups.entry((var.file.clone(), range)).or_default().push(var.id);
            }
        }

        // A variable flowing into a blocked one stays blocked too.
        loop {
            let mut changed = false;
            for var in &candidates {
                if blocked.contains_key(&var.id) {
                    continue;
                }
                let into_blocked = flows
                    .get(&var.id)
                    .and_then(|targets| targets.iter().find(|t| blocked.contains_key(t)));
                if let Some(&target) = into_blocked {
                    blocked.insert(var.id, Blocker::Flow(ctx.index.describe(target)));
                    changed = true;
                }
            }
            for members in groups.values() {
                if members.iter().any(|m| blocked.contains_key(m)) {
                    for m in members {
                        if !blocked.contains_key(m) {
                            blocked.insert(*m, Blocker::Shared);
                            changed = true;
                        }
                    }
                }
            }
            if !changed {
                break;
            }
        }

        let class_refs = ctx.references(class.id);
        for ((file, type_range), members) in &groups {
            let reasons: Vec<(DeclarationId, &Blocker)> = members
                .iter()
                .filter_map(|m| blocked.get(m).map(|b| (*m, b)))
                .collect();
            if !reasons.is_empty() {
                if let Some((id, reason)) = reasons.iter().find(|(_, b)| !matches!(b, Blocker::Shared)) {
                    let var = ctx.decl(*id)?;
                    builder.conflict(
                        Conflict::warning(
                            ConflictKind::UnsafeUsage,
                            format!(
                                "{} keeps type {}: it {}",
                                ctx.index.describe(var.id),
                                class.name,
                                reason.describe()
                            ),
                        )
                        .with_declaration(var.id)
                        .with_span(var.name_span()),
                    );
                }
                continue;
            }
            let type_ref = class_refs
                .iter()
                .find(|r| r.file == *file && type_range.contains(r.range.start) && r.context.is_type_usage());
            if let Some(r) = type_ref {
                builder.replace(file, r.qualified_range(), sup.name.as_str());
                builder.import(file, sup.qualified_name.as_str());
            }
        }

        if self.replace_instance_of {
            for r in class_refs.iter().filter(|r| r.context == ReferenceContext::InstanceOf) {
                builder.replace(&r.file, r.qualified_range(), sup.name.as_str());
                builder.import(&r.file, sup.qualified_name.as_str());
            }
        }
        builder.finish(ctx)
    }
}

/// Fields, parameters and locals declared with type `class`.
fn candidates<'a>(ctx: &PlanContext<'a>, class: &Declaration) -> Vec<&'a Declaration> {
    ctx.index
        .declarations()
        .filter(|d| {
            matches!(
                d.kind,
                DeclarationKind::Field | DeclarationKind::Parameter | DeclarationKind::Local
            )
        })
        .filter(|d| {
            d.type_text
                .as_deref()
                .is_some_and(|t| !t.contains('<') && !t.contains('['))
        })
        .filter(|d| {
            d.erased_type()
                .and_then(|ty| ctx.index.resolve_type(&d.file, d.container, ty))
                == Some(class.id)
        })
        .collect()
}

enum Use {
    Fine,
    /// The value is stored in another variable.
    Into(DeclarationId),
    Blocked(Blocker),
}

/// Classifies one reference to `var`.
fn use_of(
    ctx: &PlanContext<'_>,
    class: &Declaration,
    sup: &Declaration,
    var: &Declaration,
    r: &Reference,
) -> Result<Use> {
    // Member access through the variable.
    let accessed = ctx
        .index
        .all_references()
        .iter()
        .filter(|m| m.file == r.file && m.receiver == Some(var.id))
        .find(|m| {
            m.qualifier
                .is_some_and(|q| q.start == r.range.start)
        });
    if let Some(m) = accessed
        && let Some(member) = ctx.index.declaration(m.target)
    {
        let available = !ctx
            .index
            .find_members(sup.id, &member.name, |d| {
                d.kind.namespace() == member.kind.namespace() && d.arity == member.arity
            })
            .is_empty();
        if !available {
            return Ok(Use::Blocked(Blocker::Member(member.name.clone())));
        }
        return Ok(Use::Fine);
    }

    let text = ctx.text(&r.file)?;

    // Passed as an argument.
    for call_ref in ctx.index.all_references().iter().filter(|c| c.file == r.file) {
        let Some(call) = &call_ref.call else {
            continue;
        };
        let Some(position) = call.args.iter().position(|a| *a == r.range) else {
            continue;
        };
        let callee = match call_ref.context {
            ReferenceContext::Construction => ctx
                .index
                .constructors(call_ref.target)
                .into_iter()
                .find(|c| c.accepts_arity(call.args.len()))
                .map(|c| c.id),
            _ => Some(call_ref.target),
        };
        let Some(callee) = callee else {
            return Ok(Use::Fine);
        };
        let params = ctx.index.parameters(callee);
        let Some(param) = params.get(position.min(params.len().saturating_sub(1))) else {
            return Ok(Use::Fine);
        };
        return Ok(typed_as(ctx, param, class.id).map_or(Use::Fine, Use::Into));
    }

    // Initializer of another declaration.
    if let Some(other) = ctx
        .index
        .declarations()
        .find(|d| d.file == r.file && d.initializer == Some(r.range))
    {
        return Ok(typed_as(ctx, other, class.id).map_or(Use::Fine, Use::Into));
    }

    // Right-hand side of an assignment.
    let before = text[..r.range.start].trim_end();
    let after = text[r.range.end..].trim_start();
    if before.ends_with('=') && !before.ends_with("==") && !before.ends_with("!=") && after.starts_with(';') {
        let assigned = ctx
            .index
            .all_references()
            .iter()
            .filter(|a| a.file == r.file && a.range.end <= r.range.start)
            .max_by_key(|a| a.range.end)
            .filter(|a| text[a.range.end..r.range.start].trim() == "=");
        if let Some(a) = assigned
            && let Some(target) = ctx.index.declaration(a.target)
        {
            return Ok(typed_as(ctx, target, class.id).map_or(Use::Fine, Use::Into));
        }
    }

    // Returned from a method declared to return the class.
    if before.ends_with("return") && after.starts_with(';') {
        let method = r
            .enclosing
            .and_then(|e| ctx.index.declaration(e))
            .filter(|m| m.kind == DeclarationKind::Method);
        if let Some(method) = method
            && typed_as(ctx, method, class.id).is_some()
        {
            return Ok(Use::Into(method.id));
        }
    }
    Ok(Use::Fine)
}

/// `decl.id` when `decl` is declared with type `class`.
fn typed_as(ctx: &PlanContext<'_>, decl: &Declaration, class: DeclarationId) -> Option<DeclarationId> {
    let ty = decl.erased_type()?;
    let context = if decl.kind.is_callable() { Some(decl.id) } else { decl.container };
    (ctx.index.resolve_type(&decl.file, context, ty) == Some(class)).then_some(decl.id)
}

#[cfg(test)]
mod tests {
    use super::super::testing::Workspace;
    use super::*;

    const SHAPE: &str = "package p;

public class Shape {
    public double area() {
        return 0;
    }
}
";

    const CIRCLE: &str = "package p;

public class Circle extends Shape {
    double radius;

    public double area() {
        return 3 * radius * radius;
    }
}
";

    const REPORT: &str = "package p;

class Report {
    double total(Circle c) {
        return c.area();
    }

    double radius(Circle c) {
        return c.radius;
    }

    double chain(Circle c) {
        return total(c);
    }

    double chain2(Circle c) {
        return radius(c);
    }

    boolean check(Object o) {
        return o instanceof Circle;
    }
}
";

    fn workspace() -> Workspace {
        Workspace::new(&[
            ("src/p/Shape.java", SHAPE),
            ("src/p/Circle.java", CIRCLE),
            ("src/p/Report.java", REPORT),
        ])
    }

    #[test]
    fn test_retypes_only_safe_variables() {
        let ws = workspace();
        let circle = ws.index.resolve("p.Circle").unwrap();
        let shape = ws.index.resolve("p.Shape").unwrap();
        let planned = ws.plan(&TurnRefsToSuper::new(circle, shape));

        let report = ws.after(&planned, "src/p/Report.java").unwrap();
        assert!(report.contains("double total(Shape c)"));
        assert!(report.contains("double chain(Shape c)"));
        assert!(report.contains("double radius(Circle c)"));
        assert!(report.contains("double chain2(Circle c)"));
        assert!(report.contains("o instanceof Circle"));

        let warnings: Vec<_> = planned
            .conflicts
            .iter()
            .filter(|c| c.kind == ConflictKind::UnsafeUsage)
            .collect();
        assert_eq!(warnings.len(), 2);
        assert!(!planned.has_blocking_conflicts());
    }

    #[test]
    fn test_instanceof_is_retargeted_on_request() {
        let ws = workspace();
        let circle = ws.index.resolve("p.Circle").unwrap();
        let shape = ws.index.resolve("p.Shape").unwrap();
        let planned = ws.plan(&TurnRefsToSuper::new(circle, shape).replace_instance_of(true));
        let report = ws.after(&planned, "src/p/Report.java").unwrap();
        assert!(report.contains("o instanceof Shape"));
    }

    #[test]
    fn test_unrelated_types_are_rejected() {
        let ws = workspace();
        let circle = ws.index.resolve("p.Circle").unwrap();
        let report = ws.index.resolve("p.Report").unwrap();
        let err = TurnRefsToSuper::new(circle, report).plan(&ws.ctx()).unwrap_err();
        assert!(matches!(err, RefactorError::UnsupportedElement { .. }));
    }
}
