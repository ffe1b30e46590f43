//! Replacing constructor calls with a static factory method.

use crate::error::{RefactorError, Result};
use crate::refactor::conflict::{Conflict, ConflictKind};
use crate::scope::{Declaration, DeclarationId, DeclarationKind, ReferenceContext, Visibility};
use crate::span::TextRange;

use super::context::{PlanBuilder, PlanContext, Planned};
use super::text::{body_end_insertion, visibility_edit, INDENT};
use super::Refactoring;

/// Where the factory takes its signature from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FactorySource {
    /// An explicit constructor.
    Constructor(DeclarationId),
    /// A class relying on its implicit default constructor.
    Class(DeclarationId),
}

/// What happens to the constructor once callers use the factory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConstructorPolicy {
    #[default]
    Keep,
    Downgrade(Visibility),
}

/// Introduce `static C factory_name(..)` in `target_class` and route every
/// `new C(..)` through it.
#[derive(Debug, Clone)]
pub struct ReplaceConstructorWithFactory {
    pub source: FactorySource,
    pub target_class: DeclarationId,
    pub factory_name: String,
    pub policy: ConstructorPolicy,
}

impl ReplaceConstructorWithFactory {
    pub fn new(source: FactorySource, target_class: DeclarationId, factory_name: impl Into<String>) -> Self {
        Self {
            source,
            target_class,
            factory_name: factory_name.into(),
            policy: ConstructorPolicy::Keep,
        }
    }

    pub fn with_policy(mut self, policy: ConstructorPolicy) -> Self {
        self.policy = policy;
        self
    }
}

/// Type parameters written after a class name, e.g. `<K, V extends Number>`.
fn type_parameters(text: &str, class: &Declaration) -> Option<String> {
    let rest = text.get(class.name_range.end..)?.trim_start();
    if !rest.starts_with('<') {
        return None;
    }
    let mut depth = 0;
    for (i, c) in rest.char_indices() {
        match c {
            '<' => depth += 1,
            '>' => {
                depth -= 1;
                if depth == 0 {
                    return Some(rest[..=i].to_string());
                }
            }
            _ => {}
        }
    }
    None
}

/// `<K, V>` from `<K, V extends Number>`.
fn type_arguments(parameters: &str) -> String {
    let inner = parameters.trim().trim_start_matches('<').trim_end_matches('>');
    let mut names = Vec::new();
    let mut depth = 0;
    let mut current = String::new();
    for c in inner.chars() {
        match c {
            '<' => depth += 1,
            '>' => depth -= 1,
            ',' if depth == 0 => {
                names.push(std::mem::take(&mut current));
                continue;
            }
            _ => {}
        }
        current.push(c);
    }
    names.push(current);
    let names: Vec<&str> = names
        .iter()
        .filter_map(|n| n.split_whitespace().next())
        .collect();
    format!("<{}>", names.join(", "))
}

impl Refactoring for ReplaceConstructorWithFactory {
    fn name(&self) -> &'static str {
        "Replace Constructor With Factory"
    }

    fn plan(&self, ctx: &PlanContext<'_>) -> Result<Planned> {
        let unsupported = |message: String| RefactorError::UnsupportedElement {
            operation: "replace constructor with factory",
            message,
        };
        let (class, ctor) = match self.source {
            FactorySource::Constructor(id) => {
                let ctor = ctx.decl(id)?;
                if ctor.kind != DeclarationKind::Constructor {
                    return Err(unsupported(format!("{} is not a constructor", ctx.index.describe(id))));
                }
                let class = ctx
                    .index
                    .containing_type(id)
                    .ok_or_else(|| RefactorError::UnknownDeclaration(ctor.qualified_name.clone()))?;
                (ctx.decl(class)?, Some(ctor))
            }
            FactorySource::Class(id) => {
                let class = ctx.decl(id)?;
                if !ctx.index.constructors(id).is_empty() {
                    return Err(unsupported(format!(
                        "{} declares constructors; pick one of them",
                        class.qualified_name
                    )));
                }
                (class, None)
            }
        };
        let text = ctx.text(&class.file)?;
        if class.kind != DeclarationKind::Class {
            return Err(unsupported(format!("{} is not a class", class.qualified_name)));
        }
        if class.modifiers.is_some_and(|m| m.slice(&text).split_whitespace().any(|w| w == "abstract")) {
            return Err(unsupported(format!("{} is abstract", class.qualified_name)));
        }
        if ctx.index.containing_type(class.id).is_some() && !class.is_static {
            return Err(unsupported(format!("{} is an inner class", class.qualified_name)));
        }
        let target = ctx.decl(self.target_class)?;
        let Some(target_body) = target.body else {
            return Err(unsupported(format!("{} has no body", target.qualified_name)));
        };

        let name = self.factory_name.as_str();
        let mut builder = PlanBuilder::new(format!(
            "Replace constructor of {} with factory {}.{}",
            class.qualified_name, target.name, name
        ));
        let detector = ctx.detector();
        if let Some(conflict) = detector.invalid_name(name, DeclarationKind::Method) {
            builder.conflict(conflict);
        }
        let arity = ctor.and_then(|c| c.arity).or(Some(0));
        builder.conflicts(detector.member_collisions(
            target.id,
            name,
            DeclarationKind::Method.namespace(),
            arity,
        ));

        // The factory method.
        let params = ctx.index.parameters(ctor.map_or(class.id, |c| c.id));
        let parameter_list = match ctor.and_then(|c| c.parameters) {
            Some(range) => range.slice(&text).to_string(),
            None => "()".to_string(),
        };
        let throws = ctor
            .and_then(|c| Some(text[c.parameters?.end..c.body?.start].trim().to_string()))
            .filter(|t| !t.is_empty())
            .map(|t| format!(" {}", t))
            .unwrap_or_default();
        let arguments = params.iter().map(|p| p.name.as_str()).collect::<Vec<_>>().join(", ");
        let generics = type_parameters(&text, class);
        let (type_prefix, return_type, diamond) = match &generics {
            Some(tp) => (format!("{} ", tp), format!("{}{}", class.name, type_arguments(tp)), "<>"),
            None => (String::new(), class.name.clone(), ""),
        };
        let visibility = ctor.map_or(class.visibility, |c| c.visibility);
        let keyword = visibility.keyword().map(|k| format!("{} ", k)).unwrap_or_default();

        let target_text = ctx.text(&target.file)?;
        let mut insertion = body_end_insertion(&target_text, target_body);
        let factory = format!(
            "{indent}{keyword}static {type_prefix}{return_type} {name}{params}{throws} {{\n{indent}{INDENT}return new {class}{diamond}({arguments});\n{indent}}}\n",
            indent = insertion.indent,
            keyword = keyword,
            type_prefix = type_prefix,
            return_type = return_type,
            name = name,
            params = parameter_list,
            throws = throws,
            INDENT = INDENT,
            class = class.name,
            diamond = diamond,
            arguments = arguments,
        );
        if target.id != class.id {
            builder.import(&target.file, class.qualified_name.as_str());
        }

        // The constructor itself.
        let policy_visibility = match self.policy {
            ConstructorPolicy::Keep => None,
            ConstructorPolicy::Downgrade(v) => Some(v),
        };
        let mut factory_text = factory;
        if let Some(v) = policy_visibility {
            match ctor {
                Some(ctor) => {
                    if let Some((range, keyword)) = visibility_edit(&text, ctor, v) {
                        builder.replace(&class.file, range, keyword);
                    }
                }
                None => {
                    // Make the implicit constructor explicit.
                    let mut class_insertion = body_end_insertion(&text, class.body.unwrap_or(class.range));
                    let keyword = v.keyword().map(|k| format!("{} ", k)).unwrap_or_default();
                    let explicit = format!(
                        "{indent}{keyword}{name}() {{\n{indent}}}\n",
                        indent = class_insertion.indent,
                        keyword = keyword,
                        name = class.name
                    );
                    if target.id == class.id {
                        factory_text = format!("{}\n{}", explicit, factory_text);
                    } else {
                        builder.insert(&class.file, class_insertion.offset, class_insertion.wrap(&explicit));
                    }
                }
            }
        }
        builder.insert(&target.file, insertion.offset, insertion.wrap(&factory_text));

        let ctor_id = ctor.map_or(class.id, |c| c.id);
        let new_visibility = policy_visibility.unwrap_or(visibility);
        let reachable_from = |file: &std::path::Path, from: Option<DeclarationId>| {
            let decl = ctor.unwrap_or(class);
            ctx.index
                .is_accessible_as(decl, new_visibility, &class.package, ctor_id, file, from)
        };
        if !reachable_from(&target.file, Some(target.id)) {
            builder.conflict(
                Conflict::blocking(
                    ConflictKind::VisibilityViolation,
                    format!("{} cannot call the constructor of {}", target.name, class.name),
                )
                .with_declaration(ctor_id),
            );
        }

        // Construction sites.
        let constructors = ctx.index.constructors(class.id);
        for r in ctx.references(class.id) {
            ctx.checkpoint()?;
            if r.context != ReferenceContext::Construction {
                continue;
            }
            let Some(call) = &r.call else {
                continue;
            };
            let argc = call.args.len();
            let this_ctor = match ctor {
                Some(c) => c.accepts_arity(argc),
                None => argc == 0,
            };
            if !this_ctor {
                continue;
            }
            let site_text = ctx.text(&r.file)?;
            let overloads = constructors.iter().filter(|c| c.accepts_arity(argc)).count();
            let callee = call.callee.slice(&site_text);
            let anonymous = site_text[call.arguments.end..].trim_start().starts_with('{');
            let skip_reason = if overloads > 1 {
                Some("an overloaded constructor call")
            } else if anonymous {
                Some("an anonymous subclass")
            } else if !callee.trim_start().starts_with("new") {
                Some("a qualified instance creation")
            } else {
                None
            };
            if let Some(reason) = skip_reason {
                builder.conflict(
                    Conflict::warning(
                        ConflictKind::UnsafeUsage,
                        format!("{} is not replaced: it is {}", callee.trim(), reason),
                    )
                    .with_span(r.span()),
                );
                if !reachable_from(&r.file, r.enclosing) {
                    builder.conflict(
                        Conflict::blocking(
                            ConflictKind::VisibilityViolation,
                            format!("{} would no longer be accessible", callee.trim()),
                        )
                        .with_declaration(ctor_id)
                        .with_span(r.span()),
                    );
                }
                continue;
            }

            let explicit_args = callee
                .find('<')
                .zip(callee.rfind('>'))
                .map(|(open, close)| callee[open + 1..close].trim())
                .filter(|args| !args.is_empty());
            let in_target = r.enclosing.is_some_and(|e| ctx.index.is_within(e, target.id));
            let replacement = match explicit_args {
                Some(args) => format!("{}.<{}>{}", target.name, args, name),
                None if in_target => name.to_string(),
                None => format!("{}.{}", target.name, name),
            };
            builder.replace(&r.file, TextRange::new(call.callee.start, call.arguments.start), replacement);
            if !in_target {
                builder.import(&r.file, target.qualified_name.as_str());
            }
        }

        // Subclasses still call the constructor through super(..).
        if let Some(v) = policy_visibility {
            let subclasses = ctx
                .index
                .declarations()
                .filter(|d| d.kind == DeclarationKind::Class && d.id != class.id)
                .filter(|d| ctx.index.supertypes(d.id).contains(&class.id));
            for sub in subclasses {
                if !reachable_from(&sub.file, Some(sub.id)) {
                    builder.conflict(
                        Conflict::blocking(
                            ConflictKind::VisibilityViolation,
                            format!(
                                "subclass {} cannot call a {} constructor of {}",
                                sub.name,
                                v,
                                class.name
                            ),
                        )
                        .with_declaration(sub.id),
                    );
                }
            }
        }
        builder.finish(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::Workspace;
    use super::*;

    const MONEY: &str = "package p;

public class Money {
    private final int cents;

    public Money(int cents) {
        this.cents = cents;
    }
}
";

    const WALLET: &str = "package p;

class Wallet {
    Money empty() {
        return new Money(0);
    }
}
";

    #[test]
    fn test_type_arguments() {
        assert_eq!(type_arguments("<K, V extends Comparable<V>>"), "<K, V>");
        assert_eq!(type_arguments("<T>"), "<T>");
    }

    #[test]
    fn test_factory_from_constructor() {
        let ws = Workspace::new(&[("src/p/Money.java", MONEY), ("src/p/Wallet.java", WALLET)]);
        let money = ws.index.resolve("p.Money").unwrap();
        let ctor = ws.index.constructors(money)[0].id;
        let op = ReplaceConstructorWithFactory::new(FactorySource::Constructor(ctor), money, "of")
            .with_policy(ConstructorPolicy::Downgrade(Visibility::Private));
        let planned = ws.plan(&op);
        assert!(planned.conflicts.is_empty(), "{:?}", planned.conflicts);

        let after = ws.after(&planned, "src/p/Money.java").unwrap();
        assert!(after.contains("    private Money(int cents) {"));
        assert!(after.contains(
            "    public static Money of(int cents) {\n        return new Money(cents);\n    }\n}\n"
        ));
        let wallet = ws.after(&planned, "src/p/Wallet.java").unwrap();
        assert!(wallet.contains("return Money.of(0);"));
    }

    #[test]
    fn test_factory_from_implicit_constructor() {
        let ws = Workspace::new(&[
            ("src/p/Point.java", "package p;\n\nclass Point {\n}\n"),
            ("src/p/Use.java", "package p;\n\nclass Use {\n    Point p = new Point();\n}\n"),
        ]);
        let point = ws.index.resolve("p.Point").unwrap();
        let planned = ws.plan(&ReplaceConstructorWithFactory::new(FactorySource::Class(point), point, "create"));
        let after = ws.after(&planned, "src/p/Point.java").unwrap();
        assert!(after.contains("    static Point create() {\n        return new Point();\n    }"));
        let user = ws.after(&planned, "src/p/Use.java").unwrap();
        assert!(user.contains("Point p = Point.create();"));
    }

    #[test]
    fn test_private_constructor_blocks_other_factory_class() {
        let ws = Workspace::new(&[("src/p/Money.java", MONEY), ("src/p/Wallet.java", WALLET)]);
        let money = ws.index.resolve("p.Money").unwrap();
        let wallet = ws.index.resolve("p.Wallet").unwrap();
        let ctor = ws.index.constructors(money)[0].id;
        let op = ReplaceConstructorWithFactory::new(FactorySource::Constructor(ctor), wallet, "money")
            .with_policy(ConstructorPolicy::Downgrade(Visibility::Private));
        let planned = ws.plan(&op);
        assert!(planned
            .conflicts
            .iter()
            .any(|c| c.kind == ConflictKind::VisibilityViolation && c.is_blocking()));
    }
}
