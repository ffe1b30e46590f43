//! Making instance methods and inner classes static.
//!
//! Both operations replace the implicit `this` (or `Outer.this`) with an
//! explicit receiver. [`StaticSettings`] decides what the receiver is:
//!
//! - with a class parameter name, a parameter typed as the class is added,
//!   plus one parameter per listed field, and the body reads listed fields
//!   through their own parameter and everything else through the class
//!   parameter;
//! - without one, a single receiver named after the first of `names` (or
//!   after the class) is added and only the listed fields may be read
//!   through it. Instance methods are called through it as well.
//!
//! Bodies that use no instance state get no receiver at all.

use std::path::Path;

use crate::error::{RefactorError, Result};
use crate::refactor::conflict::{Conflict, ConflictKind};
use crate::scope::{Declaration, DeclarationId, DeclarationKind, Reference, ReferenceContext};
use crate::span::{indentation_at, TextRange};

use super::context::{PlanBuilder, PlanContext, Planned};
use super::text::{modifier_insertion, skip_whitespace, variable_name_for, INDENT};
use super::Refactoring;

/// Receiver and captured-field policy shared by both operations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StaticSettings {
    /// Rewrite call and construction sites to pass the receiver.
    pub replace_usages: bool,
    pub class_parameter_name: Option<String>,
    /// Simple names of instance fields passed explicitly.
    pub fields: Vec<String>,
    /// Parameter names, parallel to `fields`; without a class parameter, the
    /// first entry names the receiver.
    pub names: Vec<String>,
}

impl StaticSettings {
    pub fn new(replace_usages: bool) -> Self {
        Self {
            replace_usages,
            ..Self::default()
        }
    }

    pub fn with_class_parameter(mut self, name: impl Into<String>) -> Self {
        self.class_parameter_name = Some(name.into());
        self
    }

    pub fn with_field(mut self, field: impl Into<String>, name: impl Into<String>) -> Self {
        self.fields.push(field.into());
        self.names.push(name.into());
        self
    }

    /// Resolves the receiver for members of `class`.
    fn receiver<'a>(&self, ctx: &PlanContext<'a>, class: &'a Declaration) -> Result<Receiver<'a>> {
        let mut fields = Vec::with_capacity(self.fields.len());
        for name in &self.fields {
            let found = ctx.index.find_members(class.id, name, |d| {
                d.kind == DeclarationKind::Field && !d.is_static
            });
            let id = found
                .first()
                .copied()
                .ok_or_else(|| RefactorError::UnknownDeclaration(format!("{}#{}", class.qualified_name, name)))?;
            fields.push(ctx.decl(id)?);
        }

        match &self.class_parameter_name {
            Some(name) => {
                if self.names.len() != fields.len() {
                    return Err(RefactorError::InvalidConfig(format!(
                        "{} field parameters but {} names",
                        fields.len(),
                        self.names.len()
                    )));
                }
                Ok(Receiver::ClassParameter {
                    name: name.clone(),
                    fields: fields.into_iter().zip(self.names.iter().cloned()).collect(),
                })
            }
            None => {
                if self.names.len() > 1 {
                    return Err(RefactorError::InvalidConfig(
                        "without a class parameter only one receiver name may be given".to_string(),
                    ));
                }
                let name = self
                    .names
                    .first()
                    .cloned()
                    .unwrap_or_else(|| variable_name_for(&class.name));
                Ok(Receiver::Captured { name, fields })
            }
        }
    }
}

/// How rewritten code reaches the state it used to get from `this`.
enum Receiver<'a> {
    ClassParameter {
        name: String,
        fields: Vec<(&'a Declaration, String)>,
    },
    Captured {
        name: String,
        fields: Vec<&'a Declaration>,
    },
}

impl Receiver<'_> {
    fn name(&self) -> &str {
        match self {
            Receiver::ClassParameter { name, .. } | Receiver::Captured { name, .. } => name,
        }
    }

    /// The parameter replacing a listed field.
    fn field_parameter(&self, id: DeclarationId) -> Option<&str> {
        match self {
            Receiver::ClassParameter { fields, .. } => {
                fields.iter().find(|(f, _)| f.id == id).map(|(_, n)| n.as_str())
            }
            Receiver::Captured { .. } => None,
        }
    }

    fn reaches_field(&self, id: DeclarationId) -> bool {
        match self {
            Receiver::ClassParameter { .. } => true,
            Receiver::Captured { fields, .. } => fields.iter().any(|f| f.id == id),
        }
    }

    /// Declared type and name of each new parameter.
    fn parameters(&self, class_name: &str) -> Vec<(String, String)> {
        let mut params = vec![(class_name.to_string(), self.name().to_string())];
        if let Receiver::ClassParameter { fields, .. } = self {
            for (field, name) in fields {
                let ty = field.type_text.clone().unwrap_or_else(|| "Object".to_string());
                params.push((ty, name.clone()));
            }
        }
        params
    }

    /// Arguments passed for the new parameters when `receiver` is the object.
    fn arguments(&self, receiver: &str) -> Vec<String> {
        let mut args = vec![receiver.to_string()];
        if let Receiver::ClassParameter { fields, .. } = self {
            args.extend(fields.iter().map(|(f, _)| format!("{}.{}", receiver, f.name)));
        }
        args
    }

    fn has_field_arguments(&self) -> bool {
        matches!(self, Receiver::ClassParameter { fields, .. } if !fields.is_empty())
    }
}

/// A use of the implicit receiver inside the rewritten region.
enum InstanceUse<'a> {
    Member {
        reference: &'a Reference,
        target: &'a Declaration,
        /// `this.` or `Outer.this.` when written.
        qualifier: Option<TextRange>,
    },
    Bare(TextRange),
}

/// Uses of `owner`'s instance state inside `region` of `file`.
///
/// `this_qualifier` is the qualifier that names the implicit receiver
/// explicitly (`this.` for methods, `Outer.this.` for inner classes).
fn instance_uses<'a>(
    ctx: &PlanContext<'a>,
    file: &Path,
    region: TextRange,
    owner: &Declaration,
    this_qualifier: &str,
    skip: DeclarationId,
) -> Result<Vec<InstanceUse<'a>>> {
    let text = ctx.text(file)?;
    let mut uses = Vec::new();
    let mut explicit_starts = Vec::new();
    let refs = ctx
        .index
        .all_references()
        .iter()
        .filter(|r| r.file == file && region.contains(r.range.start));

    for r in refs.clone() {
        let Some(target) = ctx.index.declaration(r.target) else {
            continue;
        };
        let member = matches!(target.kind, DeclarationKind::Field | DeclarationKind::Method)
            && !target.is_static
            && target.id != skip
            && target
                .container
                .is_some_and(|c| c == owner.id || ctx.index.is_subtype(owner.id, c));
        if !member {
            continue;
        }
        match r.qualifier {
            None if r.context == ReferenceContext::Unqualified => uses.push(InstanceUse::Member {
                reference: r,
                target,
                qualifier: None,
            }),
            Some(q) if q.slice(&text).replace(char::is_whitespace, "") == this_qualifier => {
                explicit_starts.push(q.start);
                uses.push(InstanceUse::Member {
                    reference: r,
                    target,
                    qualifier: Some(q),
                });
            }
            _ => {}
        }
    }

    for r in refs {
        if r.target != owner.id {
            continue;
        }
        if this_qualifier == "this." {
            if r.context == ReferenceContext::This {
                uses.push(InstanceUse::Bare(r.range));
            }
        } else if r.qualifier.is_none() && !explicit_starts.contains(&r.range.start) {
            // Bare `Outer.this`.
            let rest = &text[r.range.end..];
            if let Some(after) = rest.trim_start().strip_prefix('.')
                && after.trim_start().starts_with("this")
                && let Some(at) = rest.find("this")
            {
                uses.push(InstanceUse::Bare(TextRange::new(r.range.start, r.range.end + at + 4)));
            }
        }
    }
    Ok(uses)
}

fn rewrite_uses(builder: &mut PlanBuilder, file: &Path, uses: &[InstanceUse<'_>], receiver: &Receiver<'_>) {
    let via = format!("{}.", receiver.name());
    for u in uses {
        match u {
            InstanceUse::Bare(range) => builder.replace(file, *range, receiver.name()),
            InstanceUse::Member {
                reference,
                target,
                qualifier,
            } => {
                if target.kind == DeclarationKind::Field && !receiver.reaches_field(target.id) {
                    builder.conflict(
                        Conflict::blocking(
                            ConflictKind::StaticContext,
                            format!("uses instance field '{}' that is not passed explicitly", target.name),
                        )
                        .with_declaration(target.id)
                        .with_span(reference.span()),
                    );
                    continue;
                }
                match (receiver.field_parameter(target.id), qualifier) {
                    (Some(param), Some(q)) => {
                        builder.replace(file, TextRange::new(q.start, reference.range.end), param)
                    }
                    (Some(param), None) => builder.replace(file, reference.range, param),
                    (None, Some(q)) => builder.replace(file, *q, via.as_str()),
                    (None, None) => builder.insert(file, reference.range.start, via.as_str()),
                }
            }
        }
    }
}

/// New parameter names that clash with parameters or locals of `region`.
fn parameter_collisions(
    ctx: &PlanContext<'_>,
    file: &Path,
    region: TextRange,
    params: &[(String, String)],
) -> Vec<Conflict> {
    let detector = ctx.detector();
    let mut conflicts = Vec::new();
    for (_, name) in params {
        if let Some(conflict) = detector.invalid_name(name, DeclarationKind::Parameter) {
            conflicts.push(conflict);
        }
        let clash = ctx
            .index
            .declarations()
            .find(|d| d.kind.is_local() && d.file == file && region.contains(d.range.start) && d.name == *name);
        if let Some(existing) = clash {
            conflicts.push(
                Conflict::blocking(
                    ConflictKind::NameCollision,
                    format!("{} '{}' already exists", existing.kind.name(), name),
                )
                .with_declaration(existing.id)
                .with_span(existing.name_span()),
            );
        }
    }
    conflicts
}

fn declared_list(params: &[(String, String)]) -> String {
    params
        .iter()
        .map(|(ty, name)| format!("{} {}", ty, name))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Inserts `values` as leading arguments of a call.
fn prepend_arguments(builder: &mut PlanBuilder, file: &Path, arguments: TextRange, had_args: bool, values: &[String]) {
    let mut text = values.join(", ");
    if had_args {
        text.push_str(", ");
    }
    builder.insert(file, arguments.start + 1, text);
}

/// Adds final fields to `class` and threads them through every
/// constructor as leading parameters. Classes without constructors get one.
pub(crate) fn inject_fields(
    builder: &mut PlanBuilder,
    text: &str,
    class: &Declaration,
    constructors: &[&Declaration],
    fields: &[(String, String)],
    class_name: &str,
) {
    let Some(body) = class.body else {
        return;
    };
    let file = class.file.as_path();
    let indent = format!("{}{}", indentation_at(text, class.range.start), INDENT);
    let open = body.start + 1;
    let declared = declared_list(fields);
    let names: Vec<&str> = fields.iter().map(|(_, n)| n.as_str()).collect();

    let mut field_lines = String::from("\n");
    for (ty, name) in fields {
        field_lines.push_str(&format!("{}private final {} {};\n", indent, ty, name));
    }
    builder.insert(file, open, field_lines);

    let assignments = |indent: &str| -> String {
        names
            .iter()
            .map(|n| format!("\n{}this.{} = {};", indent, n, n))
            .collect()
    };

    if constructors.is_empty() {
        builder.insert(
            file,
            open,
            format!(
                "\n{indent}{class_name}({declared}) {{{body}\n{indent}}}\n",
                indent = indent,
                class_name = class_name,
                declared = declared,
                body = assignments(&format!("{}{}", indent, INDENT)),
            ),
        );
        return;
    }

    for ctor in constructors {
        if let Some(params) = ctor.parameters {
            let insertion = if ctor.arity == Some(0) {
                declared.clone()
            } else {
                format!("{}, ", declared)
            };
            builder.insert(file, params.start + 1, insertion);
        }
        let Some(ctor_body) = ctor.body else {
            continue;
        };
        let start = skip_whitespace(text, ctor_body.start + 1);
        let first = &text[start..ctor_body.end];
        if first.starts_with("this(") || first.starts_with("this (") {
            // Delegating constructors pass the values on.
            let open_paren = start + first.find('(').unwrap_or(4) + 1;
            let closes = text[open_paren..].trim_start().starts_with(')');
            let mut passed = names.join(", ");
            if !closes {
                passed.push_str(", ");
            }
            builder.insert(file, open_paren, passed);
            continue;
        }
        let ctor_indent = format!("{}{}", indentation_at(text, ctor.range.start), INDENT);
        let at = if first.starts_with("super(") || first.starts_with("super (") {
            first.find(';').map_or(ctor_body.start + 1, |semi| start + semi + 1)
        } else {
            ctor_body.start + 1
        };
        builder.insert(file, at, assignments(&ctor_indent));
    }
}

/// Turn an instance method into a static method with an explicit receiver.
#[derive(Debug, Clone)]
pub struct MakeMethodStatic {
    pub method: DeclarationId,
    pub settings: StaticSettings,
}

impl MakeMethodStatic {
    /// Create a new MakeMethodStatic operation.
    pub fn new(method: DeclarationId, settings: StaticSettings) -> Self {
        Self { method, settings }
    }
}

impl Refactoring for MakeMethodStatic {
    fn name(&self) -> &'static str {
        "Make Method Static"
    }

    fn plan(&self, ctx: &PlanContext<'_>) -> Result<Planned> {
        let method = ctx.decl(self.method)?;
        if method.kind != DeclarationKind::Method || method.is_static {
            return Err(RefactorError::UnsupportedElement {
                operation: "make static",
                message: format!("{} is not an instance method", ctx.index.describe(method.id)),
            });
        }
        let (Some(body), Some(params)) = (method.body, method.parameters) else {
            return Err(RefactorError::UnsupportedElement {
                operation: "make static",
                message: format!("{} has no body", ctx.index.describe(method.id)),
            });
        };
        let class_id = ctx
            .index
            .containing_type(method.id)
            .ok_or_else(|| RefactorError::UnknownDeclaration(method.qualified_name.clone()))?;
        let class = ctx.decl(class_id)?;
        let receiver = self.settings.receiver(ctx, class)?;
        let file = method.file.as_path();
        let text = ctx.text(file)?;

        let mut builder = PlanBuilder::new(format!("Make {} static", ctx.index.describe(method.id)));
        for conflict in override_conflicts(ctx, class, method) {
            builder.conflict(conflict);
        }

        let (at, keyword) = modifier_insertion(&text, method, "static");
        builder.insert(file, at, keyword);

        let uses = instance_uses(ctx, file, body, class, "this.", method.id)?;
        let calls_itself = ctx
            .references(method.id)
            .iter()
            .any(|r| r.file == file && body.contains(r.range.start));
        let needs_receiver = !uses.is_empty() || calls_itself;
        if !needs_receiver {
            return builder.finish(ctx);
        }

        let new_params = receiver.parameters(&class.name);
        builder.conflicts(parameter_collisions(ctx, file, method.range, &new_params));
        let declared = declared_list(&new_params);
        let insertion = if method.arity == Some(0) {
            declared
        } else {
            format!("{}, ", declared)
        };
        builder.insert(file, params.start + 1, insertion);
        rewrite_uses(&mut builder, file, &uses, &receiver);

        let sites: Vec<&Reference> = ctx.references(method.id);
        if !self.settings.replace_usages {
            if !sites.is_empty() {
                builder.conflict(Conflict::warning(
                    ConflictKind::UnsafeUsage,
                    format!(
                        "{} call sites of {} are not updated",
                        sites.len(),
                        method.name
                    ),
                ));
            }
            return builder.finish(ctx);
        }

        for r in sites {
            ctx.checkpoint()?;
            let site_text = ctx.text(&r.file)?;
            let Some(call) = &r.call else {
                builder.conflict(
                    Conflict::warning(
                        ConflictKind::UnsafeUsage,
                        format!("method reference to {} cannot pass a receiver", method.name),
                    )
                    .with_span(r.span()),
                );
                continue;
            };
            let receiver_expr = match r.qualifier {
                Some(q) => {
                    let written = q.slice(&site_text).trim().trim_end_matches('.').trim();
                    let expr = if written == "super" { "this" } else { written };
                    if receiver.has_field_arguments() && !java_simple_expression(expr) {
                        builder.conflict(
                            Conflict::warning(
                                ConflictKind::UnsafeUsage,
                                format!("receiver '{}' is evaluated more than once", expr),
                            )
                            .with_span(r.span()),
                        );
                    }
                    builder.replace(&r.file, q, format!("{}.", class.name));
                    builder.import(&r.file, class.qualified_name.as_str());
                    expr.to_string()
                }
                None if r.file == file && body.contains(r.range.start) => receiver.name().to_string(),
                None => match r.enclosing.and_then(|e| ctx.index.type_or_container(e)) {
                    Some(t) if t == class.id => "this".to_string(),
                    _ => format!("{}.this", class.name),
                },
            };
            prepend_arguments(
                &mut builder,
                &r.file,
                call.arguments,
                !call.args.is_empty(),
                &receiver.arguments(&receiver_expr),
            );
        }
        builder.finish(ctx)
    }
}

fn java_simple_expression(expr: &str) -> bool {
    expr == "this" || expr.split('.').all(crate::lang::java::is_identifier)
}

/// A static method can neither override nor be overridden.
pub(super) fn override_conflicts(ctx: &PlanContext<'_>, class: &Declaration, method: &Declaration) -> Vec<Conflict> {
    let same_signature = |d: &Declaration| d.kind == DeclarationKind::Method && d.arity == method.arity;
    let mut conflicts = Vec::new();
    for sup in ctx.index.supertypes(class.id) {
        if let Some(&overridden) = ctx.index.find_members(sup, &method.name, same_signature).first() {
            conflicts.push(
                Conflict::blocking(
                    ConflictKind::IncompatibleTarget,
                    format!("{} overrides {}", method.name, ctx.index.describe(overridden)),
                )
                .with_declaration(overridden),
            );
        }
    }
    let overriding = ctx
        .index
        .declarations()
        .filter(|d| d.kind.is_type() && d.id != class.id && ctx.index.is_subtype(d.id, class.id))
        .flat_map(|sub| ctx.index.members(sub.id).iter().copied())
        .filter_map(|m| ctx.index.declaration(m))
        .filter(|m| m.name == method.name && same_signature(m));
    for sub in overriding {
        conflicts.push(
            Conflict::blocking(
                ConflictKind::IncompatibleTarget,
                format!("{} is overridden by {}", method.name, ctx.index.describe(sub.id)),
            )
            .with_declaration(sub.id),
        );
    }
    conflicts
}

/// Turn an inner class into a static nested class.
#[derive(Debug, Clone)]
pub struct MakeClassStatic {
    pub class: DeclarationId,
    pub settings: StaticSettings,
}

impl MakeClassStatic {
    /// Create a new MakeClassStatic operation.
    pub fn new(class: DeclarationId, settings: StaticSettings) -> Self {
        Self { class, settings }
    }
}

impl Refactoring for MakeClassStatic {
    fn name(&self) -> &'static str {
        "Make Class Static"
    }

    fn plan(&self, ctx: &PlanContext<'_>) -> Result<Planned> {
        let inner = ctx.decl(self.class)?;
        let outer_id = ctx
            .index
            .containing_type(inner.id)
            .filter(|_| inner.kind == DeclarationKind::Class && !inner.is_static)
            .filter(|&o| inner.container == Some(o))
            .ok_or_else(|| RefactorError::UnsupportedElement {
                operation: "make static",
                message: format!("{} is not an inner class", inner.qualified_name),
            })?;
        let outer = ctx.decl(outer_id)?;
        let receiver = self.settings.receiver(ctx, outer)?;
        let file = inner.file.as_path();
        let text = ctx.text(file)?;

        let mut builder = PlanBuilder::new(format!("Make {} static", inner.qualified_name));
        let (at, keyword) = modifier_insertion(&text, inner, "static");
        builder.insert(file, at, keyword);

        let uses = instance_uses(ctx, file, inner.range, outer, &format!("{}.this.", outer.name), inner.id)?;
        let needs_receiver = !uses.is_empty();
        let new_fields = receiver.parameters(&outer.name);
        if needs_receiver {
            builder.conflicts(parameter_collisions(ctx, file, inner.range, &new_fields));
            for (_, name) in &new_fields {
                if let Some(existing) = ctx
                    .index
                    .find_members(inner.id, name, |d| d.kind.is_variable())
                    .first()
                {
                    builder.conflict(
                        Conflict::blocking(
                            ConflictKind::NameCollision,
                            format!("field '{}' already exists in {}", name, inner.name),
                        )
                        .with_declaration(*existing),
                    );
                }
            }
            let constructors = ctx.index.constructors(inner.id);
            inject_fields(&mut builder, &text, inner, &constructors, &new_fields, &inner.name);
            rewrite_uses(&mut builder, file, &uses, &receiver);
        }

        let sites: Vec<&Reference> = ctx
            .references(inner.id)
            .into_iter()
            .filter(|r| r.context == ReferenceContext::Construction)
            .collect();
        if needs_receiver && !self.settings.replace_usages {
            if !sites.is_empty() {
                builder.conflict(Conflict::warning(
                    ConflictKind::UnsafeUsage,
                    format!("{} constructions of {} are not updated", sites.len(), inner.name),
                ));
            }
            return builder.finish(ctx);
        }

        for r in sites {
            ctx.checkpoint()?;
            let Some(call) = &r.call else {
                continue;
            };
            let site_text = ctx.text(&r.file)?;
            let callee = call.callee.slice(&site_text);
            let outer_expr = match callee.find(".new") {
                Some(dot) => {
                    let expr = callee[..dot].trim().to_string();
                    builder.delete(&r.file, TextRange::new(call.callee.start, call.callee.start + dot + 1));
                    if r.qualifier.is_none() && !r.enclosing.is_some_and(|e| ctx.index.is_within(e, outer.id)) {
                        builder.insert(&r.file, r.range.start, format!("{}.", outer.name));
                    }
                    Some(expr)
                }
                None if r.enclosing.is_some_and(|e| ctx.index.is_within(e, inner.id)) => {
                    Some(receiver.name().to_string())
                }
                None if r.enclosing.is_some_and(|e| {
                    ctx.index.is_within(e, outer.id) && ctx.index.declaration(e).is_some_and(|d| !d.is_static)
                }) =>
                {
                    Some("this".to_string())
                }
                None => None,
            };
            if !needs_receiver {
                continue;
            }
            match outer_expr {
                Some(expr) => prepend_arguments(
                    &mut builder,
                    &r.file,
                    call.arguments,
                    !call.args.is_empty(),
                    &receiver.arguments(&expr),
                ),
                None => builder.conflict(
                    Conflict::warning(
                        ConflictKind::UnsafeUsage,
                        format!("cannot tell which {} instance to pass to new {}", outer.name, inner.name),
                    )
                    .with_span(r.span()),
                ),
            }
        }
        builder.finish(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::Workspace;
    use super::*;

    const POINT: &str = "package p;

public class Point {
    int x;
    int y;

    int shifted(int d) {
        return x + d;
    }

    int sum() {
        return this.x + y;
    }

    int add(int a, int b) {
        return a + b;
    }

    int twice() {
        return shifted(2) * 2;
    }
}
";

    const USER: &str = "package p;

class User {
    int use(Point pt) {
        return pt.shifted(1);
    }
}
";

    fn workspace() -> Workspace {
        Workspace::new(&[("src/p/Point.java", POINT), ("src/p/User.java", USER)])
    }

    #[test]
    fn test_captured_field_goes_through_receiver() {
        let ws = workspace();
        let method = ws.index.resolve("p.Point#shifted").unwrap();
        let settings = StaticSettings::new(true).with_field("x", "self");
        let planned = ws.plan(&MakeMethodStatic::new(method, settings));
        assert!(planned.conflicts.is_empty(), "{:?}", planned.conflicts);

        let point = ws.after(&planned, "src/p/Point.java").unwrap();
        assert!(point.contains("    static int shifted(Point self, int d) {\n        return self.x + d;\n    }"));
        assert!(point.contains("return shifted(this, 2) * 2;"));
        let user = ws.after(&planned, "src/p/User.java").unwrap();
        assert!(user.contains("return Point.shifted(pt, 1);"));
    }

    #[test]
    fn test_uncaptured_field_is_blocking() {
        let ws = workspace();
        let method = ws.index.resolve("p.Point#sum").unwrap();
        let settings = StaticSettings::new(true).with_field("x", "self");
        let planned = ws.plan(&MakeMethodStatic::new(method, settings));
        let blocking: Vec<_> = planned.conflicts.iter().filter(|c| c.is_blocking()).collect();
        assert_eq!(blocking.len(), 1);
        assert_eq!(blocking[0].kind, ConflictKind::StaticContext);
    }

    #[test]
    fn test_class_parameter_with_field_parameters() {
        let ws = workspace();
        let method = ws.index.resolve("p.Point#shifted").unwrap();
        let settings = StaticSettings::new(true)
            .with_class_parameter("point")
            .with_field("x", "px");
        let planned = ws.plan(&MakeMethodStatic::new(method, settings));
        assert!(planned.conflicts.is_empty(), "{:?}", planned.conflicts);

        let point = ws.after(&planned, "src/p/Point.java").unwrap();
        assert!(point.contains("static int shifted(Point point, int px, int d) {\n        return px + d;"));
        assert!(point.contains("shifted(this, this.x, 2)"));
        let user = ws.after(&planned, "src/p/User.java").unwrap();
        assert!(user.contains("Point.shifted(pt, pt.x, 1)"));
    }

    #[test]
    fn test_stateless_method_gets_no_receiver() {
        let ws = workspace();
        let method = ws.index.resolve("p.Point#add").unwrap();
        let planned = ws.plan(&MakeMethodStatic::new(method, StaticSettings::new(true)));
        let point = ws.after(&planned, "src/p/Point.java").unwrap();
        assert!(point.contains("    static int add(int a, int b) {"));
        assert_eq!(planned.plan.edits.len(), 1);
    }

    #[test]
    fn test_unreplaced_usages_warn() {
        let ws = workspace();
        let method = ws.index.resolve("p.Point#shifted").unwrap();
        let settings = StaticSettings::new(false).with_field("x", "self");
        let planned = ws.plan(&MakeMethodStatic::new(method, settings));
        assert!(!planned.has_blocking_conflicts());
        assert!(planned.conflicts.iter().any(|c| c.kind == ConflictKind::UnsafeUsage));
    }

    #[test]
    fn test_several_names_need_class_parameter() {
        let ws = workspace();
        let method = ws.index.resolve("p.Point#shifted").unwrap();
        let settings = StaticSettings {
            replace_usages: true,
            class_parameter_name: None,
            fields: vec!["x".into(), "y".into()],
            names: vec!["a".into(), "b".into()],
        };
        let err = MakeMethodStatic::new(method, settings).plan(&ws.ctx()).unwrap_err();
        assert!(matches!(err, RefactorError::InvalidConfig(_)));
    }

    const OUTER: &str = "package p;

public class Outer {
    int count = 3;

    class Item {
        int value;

        Item(int value) {
            this.value = value;
        }

        int total() {
            return value + count;
        }
    }

    Item make() {
        return new Item(1);
    }
}
";

    #[test]
    fn test_make_class_static_passes_outer_instance() {
        let ws = Workspace::new(&[("src/p/Outer.java", OUTER)]);
        let item = ws.index.resolve("p.Outer.Item").unwrap();
        let settings = StaticSettings::new(true).with_class_parameter("outer");
        let planned = ws.plan(&MakeClassStatic::new(item, settings));
        assert!(planned.conflicts.is_empty(), "{:?}", planned.conflicts);

        let outer = ws.after(&planned, "src/p/Outer.java").unwrap();
        assert!(outer.contains("    static class Item {\n        private final Outer outer;\n"));
        assert!(outer.contains("Item(Outer outer, int value) {\n            this.outer = outer;\n            this.value = value;"));
        assert!(outer.contains("return value + outer.count;"));
        assert!(outer.contains("return new Item(this, 1);"));
    }
}
