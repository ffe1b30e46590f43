//! Conflict detection.
//!
//! Every check here reports all the conflicts it finds; callers collect
//! them and decide whether to proceed past warnings.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

use crate::error::RefactorError;
use crate::lang::java;
use crate::scope::{
    Declaration, DeclarationId, DeclarationKind, Namespace, Occurrence, ProgramIndex, Reference,
    ReferenceContext, Visibility,
};
use crate::span::Span;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConflictKind {
    /// The new name or location clashes with an existing declaration.
    NameCollision,
    /// A reference loses access to its declaration.
    VisibilityViolation,
    /// Code would use instance state from a static context.
    StaticContext,
    /// The target cannot receive the moved or converted element.
    IncompatibleTarget,
    /// The new name is not a valid identifier.
    InvalidName,
    /// A textual occurrence in a comment or non-source file is edited.
    TextualOccurrence,
    /// A usage cannot be updated safely and is left unchanged.
    UnsafeUsage,
}

impl ConflictKind {
    pub fn name(&self) -> &'static str {
        match self {
            ConflictKind::NameCollision => "name collision",
            ConflictKind::VisibilityViolation => "visibility violation",
            ConflictKind::StaticContext => "static context",
            ConflictKind::IncompatibleTarget => "incompatible target",
            ConflictKind::InvalidName => "invalid name",
            ConflictKind::TextualOccurrence => "textual occurrence",
            ConflictKind::UnsafeUsage => "unsafe usage",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    Warning,
    Blocking,
}

/// An issue a plan would introduce if applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conflict {
    pub kind: ConflictKind,
    pub severity: Severity,
    pub description: String,
    pub declarations: Vec<DeclarationId>,
    pub spans: Vec<Span>,
}

impl Conflict {
    pub fn new(kind: ConflictKind, severity: Severity, description: impl Into<String>) -> Self {
        Self {
            kind,
            severity,
            description: description.into(),
            declarations: Vec::new(),
            spans: Vec::new(),
        }
    }

    pub fn blocking(kind: ConflictKind, description: impl Into<String>) -> Self {
        Self::new(kind, Severity::Blocking, description)
    }

    pub fn warning(kind: ConflictKind, description: impl Into<String>) -> Self {
        Self::new(kind, Severity::Warning, description)
    }

    pub fn with_declaration(mut self, id: DeclarationId) -> Self {
        if !self.declarations.contains(&id) {
            self.declarations.push(id);
        }
        self
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.spans.push(span);
        self
    }

    pub fn is_blocking(&self) -> bool {
        self.severity == Severity::Blocking
    }
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let severity = match self.severity {
            Severity::Blocking => "blocking",
            Severity::Warning => "warning",
        };
        write!(f, "[{}] {}: {}", severity, self.kind.name(), self.description)?;
        if let Some(span) = self.spans.first() {
            write!(
                f,
                " ({}:{}..{})",
                span.file.display(),
                span.range.start,
                span.range.end
            )?;
        }
        Ok(())
    }
}

/// The error refusing to apply a plan with blocking conflicts, if any.
pub fn blocking_error(conflicts: &[Conflict]) -> Option<RefactorError> {
    let blocking: Vec<&Conflict> = conflicts.iter().filter(|c| c.is_blocking()).collect();
    if blocking.is_empty() {
        return None;
    }
    let summary = blocking
        .iter()
        .map(|c| c.description.as_str())
        .collect::<Vec<_>>()
        .join("; ");
    Some(RefactorError::BlockingConflict {
        count: blocking.len(),
        summary,
    })
}

/// Warning for a textual occurrence that the plan rewrites.
pub fn occurrence_warning(occurrence: &Occurrence, replacement: &str) -> Conflict {
    Conflict::warning(
        ConflictKind::TextualOccurrence,
        format!(
            "'{}' in {} {} is replaced with '{}'",
            occurrence.text,
            occurrence.kind.name(),
            occurrence.span.file.display(),
            replacement
        ),
    )
    .with_span(occurrence.span.clone())
}

/// Checks shared by several refactorings, run against one index snapshot.
pub struct ConflictDetector<'a> {
    index: &'a ProgramIndex,
}

impl<'a> ConflictDetector<'a> {
    pub fn new(index: &'a ProgramIndex) -> Self {
        Self { index }
    }

    /// Rejects names that are not identifiers (or dotted names for packages).
    pub fn invalid_name(&self, name: &str, kind: DeclarationKind) -> Option<Conflict> {
        let valid = if kind == DeclarationKind::Package {
            name.is_empty() || java::is_qualified_name(name)
        } else {
            java::is_identifier(name)
        };
        (!valid).then(|| {
            Conflict::blocking(
                ConflictKind::InvalidName,
                format!("'{}' is not a valid {} name", name, kind.name()),
            )
        })
    }

    /// Declarations in the same container as `decl` that already use `name`.
    pub fn sibling_collisions(&self, decl: &Declaration, name: &str) -> Vec<Conflict> {
        let Some(container) = decl.container else {
            return Vec::new();
        };
        self.members_named(container, name, decl.kind.namespace(), decl.arity)
            .into_iter()
            .filter(|d| d.id != decl.id)
            .filter(|d| !decl.kind.is_local() || scopes_overlap(decl, d))
            .map(|existing| self.collision(existing, name))
            .collect()
    }

    /// Members of `type_id` that would clash with a member called `name`.
    pub fn member_collisions(
        &self,
        type_id: DeclarationId,
        name: &str,
        namespace: Namespace,
        arity: Option<usize>,
    ) -> Vec<Conflict> {
        self.members_named(type_id, name, namespace, arity)
            .into_iter()
            .map(|existing| self.collision(existing, name))
            .collect()
    }

    /// A top-level type `name` already present in `package`.
    pub fn type_collision(
        &self,
        package: &str,
        name: &str,
        except: &[DeclarationId],
    ) -> Option<Conflict> {
        self.index
            .types_in_package(package)
            .into_iter()
            .filter(|id| !except.contains(id))
            .filter_map(|id| self.index.declaration(id))
            .find(|d| d.name == name)
            .map(|existing| self.collision(existing, name))
    }

    /// Locals or parameters called `name` that would shadow `decl` at its
    /// unqualified reference sites.
    pub fn shadowing_locals(
        &self,
        decl: &Declaration,
        name: &str,
        refs: &[&Reference],
    ) -> Vec<Conflict> {
        if !decl.kind.is_variable() {
            return Vec::new();
        }
        let mut conflicts = Vec::new();
        for r in refs.iter().filter(|r| r.context == ReferenceContext::Unqualified) {
            let shadowing = self
                .index
                .visible_locals(&r.file, r.range.start)
                .into_iter()
                .find(|local| local.name == name && local.id != decl.id);
            if let Some(local) = shadowing {
                conflicts.push(
                    Conflict::blocking(
                        ConflictKind::NameCollision,
                        format!(
                            "{} '{}' declared in {} would hide {} '{}' at this reference",
                            local.kind.name(),
                            name,
                            local.file.display(),
                            decl.kind.name(),
                            decl.name
                        ),
                    )
                    .with_declaration(local.id)
                    .with_declaration(decl.id)
                    .with_span(r.span()),
                );
            }
        }
        conflicts
    }

    /// Fields called `name` that the renamed local `decl` would capture at
    /// unqualified references inside its scope.
    pub fn captured_fields(&self, decl: &Declaration, name: &str) -> Vec<Conflict> {
        let Some(scope) = decl.scope.filter(|_| decl.kind.is_local()) else {
            return Vec::new();
        };
        self.index
            .all_references()
            .iter()
            .filter(|r| {
                r.file == decl.file
                    && r.context == ReferenceContext::Unqualified
                    && scope.contains(r.range.start)
            })
            .filter_map(|r| {
                let target = self.index.declaration(r.target)?;
                (target.name == name && !target.kind.is_local() && target.kind.is_variable())
                    .then_some((r, target))
            })
            .map(|(r, field)| {
                Conflict::blocking(
                    ConflictKind::NameCollision,
                    format!(
                        "renaming '{}' to '{}' would capture the reference to {} '{}'",
                        decl.name,
                        name,
                        field.kind.name(),
                        field.qualified_name
                    ),
                )
                .with_declaration(field.id)
                .with_declaration(decl.id)
                .with_span(r.span())
            })
            .collect()
    }

    /// References that could no longer see `decl` if it had `visibility`
    /// and belonged to `owner` in `package`.
    pub fn visibility_violations<'r>(
        &self,
        decl: &Declaration,
        visibility: Visibility,
        package: &str,
        owner: DeclarationId,
        refs: impl IntoIterator<Item = &'r Reference>,
    ) -> Vec<Conflict> {
        refs.into_iter()
            .filter(|r| {
                !self
                    .index
                    .is_accessible_as(decl, visibility, package, owner, &r.file, r.enclosing)
            })
            .map(|r| {
                Conflict::blocking(
                    ConflictKind::VisibilityViolation,
                    format!(
                        "{} '{}' would not be accessible from {}",
                        decl.kind.name(),
                        decl.name,
                        r.file.display()
                    ),
                )
                .with_declaration(decl.id)
                .with_span(r.span())
            })
            .collect()
    }

    /// A file already exists where the plan creates one.
    pub fn existing_file(&self, path: &Path) -> Conflict {
        Conflict::blocking(
            ConflictKind::NameCollision,
            format!("file {} already exists", path.display()),
        )
        .with_span(Span::new(path, crate::span::TextRange::empty(0)))
    }

    fn members_named(
        &self,
        container: DeclarationId,
        name: &str,
        namespace: Namespace,
        arity: Option<usize>,
    ) -> Vec<&'a Declaration> {
        let index = self.index;
        index
            .members(container)
            .iter()
            .filter_map(|&m| index.declaration(m))
            .filter(|d| d.name == name && d.kind.namespace() == namespace)
            .filter(|d| namespace != Namespace::Method || arity.is_none() || d.arity == arity)
            .collect()
    }

    fn collision(&self, existing: &Declaration, name: &str) -> Conflict {
        Conflict::blocking(
            ConflictKind::NameCollision,
            format!(
                "{} '{}' already exists in {}",
                existing.kind.name(),
                name,
                self.index
                    .declaration(existing.container.unwrap_or(existing.id))
                    .map(|c| c.qualified_name.as_str())
                    .unwrap_or("the same scope")
            ),
        )
        .with_declaration(existing.id)
        .with_span(existing.name_span())
    }
}

fn scopes_overlap(a: &Declaration, b: &Declaration) -> bool {
    match (a.scope, b.scope) {
        (Some(x), Some(y)) => x.overlaps(&y),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::span::TextRange;

    fn decl(name: &str, kind: DeclarationKind, container: Option<DeclarationId>) -> Declaration {
        let mut d = Declaration::new(name, kind, "A.java", TextRange::new(0, 1), TextRange::new(0, 1));
        d.container = container;
        d
    }

    #[test]
    fn test_invalid_names() {
        let index = ProgramIndex::new();
        let detector = ConflictDetector::new(&index);
        assert!(detector.invalid_name("total", DeclarationKind::Field).is_none());
        assert!(detector.invalid_name("class", DeclarationKind::Field).is_some());
        assert!(detector.invalid_name("com.example", DeclarationKind::Package).is_none());
        assert!(detector.invalid_name("com.example", DeclarationKind::Class).is_some());
    }

    #[test]
    fn test_sibling_methods_collide_only_with_same_arity() {
        let mut index = ProgramIndex::new();
        let class = index.add_declaration(decl("A", DeclarationKind::Class, None));
        let mut one = decl("run", DeclarationKind::Method, Some(class));
        one.arity = Some(1);
        index.add_declaration(one);
        let mut zero = decl("go", DeclarationKind::Method, Some(class));
        zero.arity = Some(0);
        let go = index.add_declaration(zero);

        let detector = ConflictDetector::new(&index);
        let go = index.get(go).unwrap();
        assert!(detector.sibling_collisions(go, "run").is_empty());

        let mut go_one = go.clone();
        go_one.arity = Some(1);
        assert_eq!(detector.sibling_collisions(&go_one, "run").len(), 1);
    }

    #[test]
    fn test_blocking_error_counts_only_blocking() {
        let conflicts = vec![
            Conflict::warning(ConflictKind::TextualOccurrence, "comment"),
            Conflict::blocking(ConflictKind::NameCollision, "clash"),
        ];
        match blocking_error(&conflicts) {
            Some(RefactorError::BlockingConflict { count, summary }) => {
                assert_eq!(count, 1);
                assert_eq!(summary, "clash");
            }
            other => panic!("unexpected: {:?}", other),
        }
        assert!(blocking_error(&conflicts[..1]).is_none());
    }
}
