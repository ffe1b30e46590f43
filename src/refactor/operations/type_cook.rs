//! Type cooking: giving raw generic declarations type arguments inferred
//! from the casts applied where they are used.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::refactor::conflict::{Conflict, ConflictKind};
use crate::scope::{erase_type, Declaration, DeclarationId, DeclarationKind, Reference};
use crate::span::TextRange;

use super::context::{PlanBuilder, PlanContext, Planned};
use super::Refactoring;

/// Switches of the type cooking algorithm.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CookOptions {
    /// Remove casts made redundant by the new type arguments.
    pub drop_obsolete_casts: bool,
    /// Leave declarations without casting uses raw instead of using `Object`.
    pub leave_objects_raw: bool,
    /// Leave arrays of raw containers alone.
    pub preserve_raw_arrays: bool,
    /// Cook every raw declaration of the containing types, not only the
    /// selected ones.
    pub exhaustive: bool,
    /// Retype `Object` variables that are always cast to one type.
    pub cook_objects: bool,
    /// Use `<?>` when the casts disagree.
    pub cook_to_wildcards: bool,
}

/// Generify raw declarations inside `elements`.
#[derive(Debug, Clone)]
pub struct TypeCook {
    pub elements: Vec<DeclarationId>,
    pub options: CookOptions,
}

impl TypeCook {
    pub fn new(elements: Vec<DeclarationId>, options: CookOptions) -> Self {
        Self { elements, options }
    }

    /// Variables covered by the selection.
    fn scope<'a>(&self, ctx: &PlanContext<'a>) -> Result<Vec<&'a Declaration>> {
        let mut roots = BTreeSet::new();
        let mut singles = BTreeSet::new();
        for &id in &self.elements {
            let decl = ctx.decl(id)?;
            if decl.kind.is_variable() && !self.options.exhaustive {
                singles.insert(id);
            } else if decl.kind.is_variable() {
                if let Some(owner) = ctx.index.containing_type(id) {
                    roots.insert(owner);
                }
            } else {
                roots.insert(id);
            }
        }
        let packages: Vec<&str> = roots
            .iter()
            .filter_map(|&id| ctx.index.declaration(id))
            .filter(|d| d.kind == DeclarationKind::Package)
            .map(|d| d.qualified_name.as_str())
            .collect();
        Ok(ctx
            .index
            .declarations()
            .filter(|d| d.kind.is_variable() && d.kind != DeclarationKind::EnumConstant)
            .filter(|d| {
                singles.contains(&d.id)
                    || roots.iter().any(|&r| ctx.index.is_within(d.id, r))
                    || packages.contains(&d.package.as_str())
            })
            .collect())
    }
}

/// The new type of one declaration.
enum Cooked {
    /// `List` becomes `List<T>`.
    Arguments(String),
    /// `Object` becomes `T`.
    Retyped(String),
}

fn boxed(type_text: &str) -> &str {
    match type_text {
        "int" => "Integer",
        "long" => "Long",
        "short" => "Short",
        "byte" => "Byte",
        "char" => "Character",
        "boolean" => "Boolean",
        "float" => "Float",
        "double" => "Double",
        other => other,
    }
}

impl Refactoring for TypeCook {
    fn name(&self) -> &'static str {
        "Type Cook"
    }

    fn plan(&self, ctx: &PlanContext<'_>) -> Result<Planned> {
        let options = self.options;
        let containers = &ctx.settings.generic_containers;
        let mut builder = PlanBuilder::new("Generify raw types");
        let mut decided: BTreeMap<DeclarationId, Cooked> = BTreeMap::new();

        for var in self.scope(ctx)? {
            ctx.checkpoint()?;
            let Some(type_text) = var.type_text.as_deref().map(str::trim) else {
                continue;
            };
            let refs = ctx.references(var.id);
            let raw = !type_text.contains('<') && containers.iter().any(|c| c == erase_type(type_text));
            if raw {
                if type_text.contains('[') && options.preserve_raw_arrays {
                    continue;
                }
                // Casts applied to expressions reading from the container.
                let casts: BTreeSet<&str> = refs
                    .iter()
                    .filter_map(|r| r.cast.as_ref().filter(|c| c.expression.end > r.range.end))
                    .map(|c| boxed(c.type_text.trim()))
                    .collect();
                let argument = match casts.len() {
                    0 if options.leave_objects_raw => continue,
                    0 => "Object".to_string(),
                    1 => casts.iter().next().map(|t| t.to_string()).unwrap_or_default(),
                    _ if options.cook_to_wildcards => "?".to_string(),
                    _ => {
                        builder.conflict(
                            Conflict::warning(
                                ConflictKind::UnsafeUsage,
                                format!(
                                    "{} stays raw: its uses are cast to {}",
                                    ctx.index.describe(var.id),
                                    casts.iter().copied().collect::<Vec<_>>().join(", ")
                                ),
                            )
                            .with_declaration(var.id)
                            .with_span(var.name_span()),
                        );
                        continue;
                    }
                };
                decided.insert(var.id, Cooked::Arguments(argument));
            } else if options.cook_objects && matches!(type_text, "Object" | "java.lang.Object") && !refs.is_empty() {
                let casts: Vec<&str> = refs
                    .iter()
                    .filter_map(|r| r.cast.as_ref().filter(|c| c.expression.end == r.range.end))
                    .map(|c| c.type_text.trim())
                    .collect();
                let first = casts.first().copied();
                if casts.len() == refs.len() && first.is_some_and(|f| casts.iter().all(|c| *c == f)) {
                    decided.insert(var.id, Cooked::Retyped(first.unwrap_or("Object").to_string()));
                }
            }
        }

        // Declarations sharing one type must agree.
        let mut groups: BTreeMap<(PathBuf, TextRange), Vec<&Declaration>> = BTreeMap::new();
        for &id in decided.keys() {
            let decl = ctx.decl(id)?;
            if let Some(range) = decl.type_range {
                groups.entry((decl.file.clone(), range)).or_default().push(decl);
            }
        }
        for ((file, type_range), members) in &groups {
            let siblings = ctx
                .index
                .declarations()
                .filter(|d| d.file == *file && d.type_range == Some(*type_range))
                .count();
            let cooked: Vec<&Cooked> = members.iter().filter_map(|m| decided.get(&m.id)).collect();
            let agree = cooked.windows(2).all(|w| same(w[0], w[1]));
            if siblings != members.len() || !agree {
                builder.conflict(
                    Conflict::warning(
                        ConflictKind::UnsafeUsage,
                        format!(
                            "{} shares its type with declarations that cannot be cooked the same way",
                            members.iter().map(|m| m.name.as_str()).collect::<Vec<_>>().join(", ")
                        ),
                    )
                    .with_declaration(members[0].id),
                );
                continue;
            }
            let text = ctx.text(file)?;
            let declared = type_range.slice(&text);
            match cooked[0] {
                Cooked::Arguments(argument) => {
                    let at = declared
                        .find('[')
                        .map(|i| type_range.start + declared[..i].trim_end().len())
                        .unwrap_or(type_range.end);
                    builder.insert(file, at, format!("<{}>", argument));
                    for m in members {
                        if let Some(at) = m.initializer.and_then(|init| diamond_insertion(&text, init, containers)) {
                            builder.insert(file, at, "<>");
                        }
                    }
                    if options.drop_obsolete_casts && argument != "?" && argument != "Object" {
                        for m in members {
                            drop_casts(ctx, &mut builder, m, argument, |c, r| c.expression.end > r.range.end);
                        }
                    }
                }
                Cooked::Retyped(new_type) => {
                    builder.replace(file, *type_range, new_type.as_str());
                    if options.drop_obsolete_casts {
                        for m in members {
                            drop_casts(ctx, &mut builder, m, new_type, |c, r| c.expression.end == r.range.end);
                        }
                    }
                }
            }
        }
        builder.finish(ctx)
    }
}

fn same(a: &Cooked, b: &Cooked) -> bool {
    match (a, b) {
        (Cooked::Arguments(x), Cooked::Arguments(y)) | (Cooked::Retyped(x), Cooked::Retyped(y)) => x == y,
        _ => false,
    }
}

/// Offset for `<>` in a `new RawContainer(..)` initializer.
fn diamond_insertion(text: &str, init: TextRange, containers: &[String]) -> Option<usize> {
    let value = init.slice(text);
    let rest = value.trim_start().strip_prefix("new")?;
    let name_start = rest.len() - rest.trim_start().len();
    let name_len = rest[name_start..]
        .find(|c: char| !(c.is_alphanumeric() || c == '_' || c == '.' || c == '$'))
        .unwrap_or(rest.len() - name_start);
    let name = &rest[name_start..name_start + name_len];
    let after = rest[name_start + name_len..].trim_start();
    if name.is_empty() || !after.starts_with('(') || !containers.iter().any(|c| c == erase_type(name)) {
        return None;
    }
    let offset_in_value = value.len() - rest.len() + name_start + name_len;
    Some(init.start + offset_in_value)
}

fn drop_casts(
    ctx: &PlanContext<'_>,
    builder: &mut PlanBuilder,
    decl: &Declaration,
    cast_type: &str,
    applies: impl Fn(&crate::scope::CastSite, &Reference) -> bool,
) {
    for r in ctx.references(decl.id) {
        if let Some(cast) = &r.cast
            && applies(cast, r)
            && boxed(cast.type_text.trim()) == cast_type
        {
            builder.delete(&r.file, cast.prefix);
        }
    }
}
