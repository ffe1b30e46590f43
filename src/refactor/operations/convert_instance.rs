//! Converting a static method into an instance method of a parameter's type.

use crate::error::{RefactorError, Result};
use crate::refactor::conflict::{Conflict, ConflictKind};
use crate::refactor::plan::materialize;
use crate::scope::{DeclarationId, DeclarationKind, ReferenceContext};
use crate::span::{indentation_at, TextRange};

use super::context::{PlanBuilder, PlanContext, Planned};
use super::text::{body_end_insertion, member_extent, reindent, skip_whitespace};
use super::Refactoring;

/// Turn `static R m(T t, A a)` into `R m(A a)` on `T`, with `t` becoming
/// `this` and calls `m(x, a)` becoming `x.m(a)`.
#[derive(Debug, Clone)]
pub struct ConvertToInstanceMethod {
    pub method: DeclarationId,
    /// The parameter whose type receives the method.
    pub target_parameter: DeclarationId,
}

impl ConvertToInstanceMethod {
    pub fn new(method: DeclarationId, target_parameter: DeclarationId) -> Self {
        Self {
            method,
            target_parameter,
        }
    }
}

/// Range deleting item `i` of a comma separated list along with one of its
/// separators.
fn list_removal(items: &[TextRange], i: usize) -> TextRange {
    let item = items[i];
    if i + 1 < items.len() {
        TextRange::new(item.start, items[i + 1].start)
    } else if i > 0 {
        TextRange::new(items[i - 1].end, item.end)
    } else {
        item
    }
}

fn receiver_text(expr: &str) -> String {
    let expr = expr.trim();
    let simple = expr == "this"
        || expr.split('.').all(crate::lang::java::is_identifier)
        || (expr.starts_with('(') && expr.ends_with(')'));
    if simple {
        expr.to_string()
    } else {
        format!("({})", expr)
    }
}

impl Refactoring for ConvertToInstanceMethod {
    fn name(&self) -> &'static str {
        "Convert To Instance Method"
    }

    fn plan(&self, ctx: &PlanContext<'_>) -> Result<Planned> {
        let method = ctx.decl(self.method)?;
        let param = ctx.decl(self.target_parameter)?;
        let unsupported = |message: String| RefactorError::UnsupportedElement {
            operation: "convert to instance method",
            message,
        };
        if method.kind != DeclarationKind::Method || !method.is_static || method.body.is_none() {
            return Err(unsupported(format!(
                "{} is not a static method with a body",
                ctx.index.describe(method.id)
            )));
        }
        let params = ctx.index.parameters(method.id);
        let Some(position) = params.iter().position(|p| p.id == param.id) else {
            return Err(unsupported(format!(
                "{} is not a parameter of {}",
                param.name, method.name
            )));
        };
        let target_id = param
            .erased_type()
            .and_then(|ty| ctx.index.resolve_type(&method.file, Some(method.id), ty))
            .filter(|&t| {
                ctx.index
                    .declaration(t)
                    .is_some_and(|d| matches!(d.kind, DeclarationKind::Class | DeclarationKind::Enum))
            })
            .ok_or_else(|| {
                unsupported(format!(
                    "the type of parameter {} is not a class in the workspace",
                    param.name
                ))
            })?;
        let target = ctx.decl(target_id)?;
        let source_id = ctx
            .index
            .containing_type(method.id)
            .ok_or_else(|| RefactorError::UnknownDeclaration(method.qualified_name.clone()))?;
        let source = ctx.decl(source_id)?;
        let in_place = source_id == target_id;
        let file = method.file.as_path();
        let text = ctx.text(file)?;
        let detector = ctx.detector();

        let mut builder = PlanBuilder::new(format!(
            "Convert {} to an instance method of {}",
            ctx.index.describe(method.id),
            target.qualified_name
        ));
        if !in_place {
            let arity = method.arity.map(|a| a.saturating_sub(1));
            builder.conflicts(detector.member_collisions(
                target_id,
                &method.name,
                method.kind.namespace(),
                arity,
            ));
        }

        // Signature.
        if let Some(keyword) = method.static_keyword {
            builder.delete(file, TextRange::new(keyword.start, skip_whitespace(&text, keyword.end)));
        }
        let param_ranges: Vec<TextRange> = params.iter().map(|p| p.range).collect();
        builder.delete(file, list_removal(&param_ranges, position));

        // Body.
        let body = method.body.unwrap_or(method.range);
        for r in ctx.references(param.id) {
            let after = text[r.range.end..].trim_start();
            if after.starts_with('=') && !after.starts_with("==") {
                builder.conflict(
                    Conflict::blocking(
                        ConflictKind::IncompatibleTarget,
                        format!("parameter '{}' is reassigned", param.name),
                    )
                    .with_declaration(param.id)
                    .with_span(r.span()),
                );
            }
            builder.replace(file, r.range, "this");
        }
        if !in_place {
            let used_refs = ctx
                .index
                .all_references()
                .iter()
                .filter(|r| r.file == file && body.contains(r.range.start));
            for r in used_refs {
                let Some(used) = ctx.index.declaration(r.target) else {
                    continue;
                };
                if used.kind.is_local() || ctx.index.is_within(used.id, method.id) {
                    continue;
                }
                if r.context.is_type_usage() && r.qualifier.is_none() && used.kind.is_type() {
                    if ctx.index.containing_type(used.id).is_none() {
                        builder.import(&target.file, used.qualified_name.as_str());
                    }
                    continue;
                }
                if used.container == Some(source_id)
                    && used.is_static
                    && r.qualifier.is_none()
                    && r.context == ReferenceContext::Unqualified
                    && used.id != method.id
                {
                    builder.insert(file, r.range.start, format!("{}.", source.name));
                    builder.import(&target.file, source.qualified_name.as_str());
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
                                "{} uses {} '{}', which {} cannot access",
                                method.name,
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
        }

        // Call sites.
        let sites = ctx.references(method.id);
        if !in_place {
            let external: Vec<_> = sites.iter().copied().filter(|r| !body.contains(r.range.start) || r.file != file).collect();
            builder.conflicts(detector.visibility_violations(
                method,
                method.visibility,
                &target.package,
                target_id,
                external,
            ));
        }
        for r in &sites {
            ctx.checkpoint()?;
            let Some(call) = &r.call else {
                builder.conflict(
                    Conflict::warning(
                        ConflictKind::UnsafeUsage,
                        format!("method reference to {} is not updated", method.name),
                    )
                    .with_span(r.span()),
                );
                continue;
            };
            let Some(&argument) = call.args.get(position) else {
                continue;
            };
            let site_text = ctx.text(&r.file)?;
            let value = argument.slice(&site_text).trim();
            if value == "null" {
                builder.conflict(
                    Conflict::warning(
                        ConflictKind::UnsafeUsage,
                        format!("{} is called on null", method.name),
                    )
                    .with_span(r.span()),
                );
            }
            builder.replace(
                &r.file,
                call.callee,
                format!("{}.{}", receiver_text(value), method.name),
            );
            builder.delete(&r.file, list_removal(&call.args, position));
        }

        if in_place {
            return builder.finish(ctx);
        }

        let info = ctx.file(file);
        let extent = member_extent(&text, method, info);
        let edits = builder.take_edits_in(file, extent);
        let member = materialize(file, &text, extent, &edits)?;
        builder.delete(file, extent);
        let target_text = ctx.text(&target.file)?;
        let Some(target_body) = target.body else {
            return Err(unsupported(format!("{} has no body", target.qualified_name)));
        };
        let mut insertion = body_end_insertion(&target_text, target_body);
        let from = indentation_at(&text, method.range.start);
        builder.insert(
            &target.file,
            insertion.offset,
            insertion.wrap(&reindent(&member, from, &insertion.indent)),
        );
        builder.finish(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::Workspace;
    use super::*;

    const ACCOUNT: &str = "package p;

public class Account {
    int balance;
}
";

    const BANK: &str = "package p;

class Bank {
    static int FEE = 1;

    static int withdraw(Account account, int amount) {
        account.balance -= amount + FEE;
        return account.balance;
    }

    void run(Account a) {
        withdraw(a, 5);
        Bank.withdraw(new Account(), 1);
    }
}
";

    fn workspace() -> Workspace {
        Workspace::new(&[("src/p/Account.java", ACCOUNT), ("src/p/Bank.java", BANK)])
    }

    #[test]
    fn test_list_removal() {
        let items = [TextRange::new(1, 3), TextRange::new(5, 7), TextRange::new(9, 11)];
        assert_eq!(list_removal(&items, 0), TextRange::new(1, 5));
        assert_eq!(list_removal(&items, 2), TextRange::new(7, 11));
        assert_eq!(list_removal(&items[..1], 0), TextRange::new(1, 3));
    }

    #[test]
    fn test_convert_moves_method_to_parameter_type() {
        let ws = workspace();
        let method = ws.index.resolve("p.Bank#withdraw").unwrap();
        let param = ws.index.parameters(method)[0].id;
        let planned = ws.plan(&ConvertToInstanceMethod::new(method, param));
        assert!(planned.conflicts.is_empty(), "{:?}", planned.conflicts);

        let account = ws.after(&planned, "src/p/Account.java").unwrap();
        assert_eq!(
            account,
            "package p;

public class Account {
    int balance;

    int withdraw(int amount) {
        this.balance -= amount + Bank.FEE;
        return this.balance;
    }
}
"
        );
        let bank = ws.after(&planned, "src/p/Bank.java").unwrap();
        assert!(!bank.contains("static int withdraw"));
        assert!(bank.contains("a.withdraw(5);"));
        assert!(bank.contains("(new Account()).withdraw(1);"));
    }

    #[test]
    fn test_instance_method_is_rejected() {
        let ws = workspace();
        let method = ws.index.resolve("p.Bank#run").unwrap();
        let param = ws.index.parameters(method)[0].id;
        let err = ConvertToInstanceMethod::new(method, param).plan(&ws.ctx()).unwrap_err();
        assert!(matches!(err, RefactorError::UnsupportedElement { .. }));
    }
}
