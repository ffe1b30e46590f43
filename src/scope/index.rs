//! The symbol and reference index of one program snapshot.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};

use crate::error::{RefactorError, Result};
use crate::span::TextRange;
use crate::storage::Fingerprint;

use super::declaration::{Declaration, DeclarationId, DeclarationKind, Visibility};
use super::reference::Reference;
use super::search::SearchScope;

/// An import declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportInfo {
    /// The imported name without `static` or `.*`.
    pub name: String,
    /// The whole statement including the semicolon.
    pub range: TextRange,
    /// The dotted name.
    pub name_range: TextRange,
    pub is_static: bool,
    pub wildcard: bool,
}

impl ImportInfo {
    pub fn simple_name(&self) -> &str {
        self.name.rsplit('.').next().unwrap_or(&self.name)
    }
}

/// Per-file facts recorded by the index provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileInfo {
    /// Package name, "" for the default package.
    pub package: String,
    /// The `package ...;` statement.
    pub package_clause: Option<TextRange>,
    pub imports: Vec<ImportInfo>,
    pub comments: Vec<TextRange>,
    /// Fingerprint of the content the index was built from.
    pub fingerprint: Option<Fingerprint>,
    pub top_level: Vec<DeclarationId>,
    pub locals: Vec<DeclarationId>,
}

impl FileInfo {
    /// Offset at which a new import statement can be inserted.
    pub fn import_insertion_point(&self) -> usize {
        self.imports
            .iter()
            .map(|i| i.range.end)
            .max()
            .or(self.package_clause.map(|p| p.end))
            .unwrap_or(0)
    }

    /// Returns true if `name` is imported by a single-type import.
    pub fn imports_type(&self, qualified_name: &str) -> bool {
        self.imports
            .iter()
            .any(|i| !i.is_static && !i.wildcard && i.name == qualified_name)
    }

    /// Returns true if `offset` lies inside a comment.
    pub fn in_comment(&self, offset: usize) -> bool {
        self.comments.iter().any(|c| c.contains(offset))
    }
}

/// Size statistics, used for logging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexStats {
    pub files: usize,
    pub declarations: usize,
    pub references: usize,
}

/// Declarations, references and file facts of one program snapshot.
///
/// The index is immutable once built and is shared between threads; planning
/// only ever reads it.
#[derive(Debug, Default)]
pub struct ProgramIndex {
    declarations: Vec<Declaration>,
    references: Vec<Reference>,
    refs_by_target: HashMap<DeclarationId, Vec<usize>>,
    by_qualified_name: HashMap<String, Vec<DeclarationId>>,
    types_by_name: HashMap<String, Vec<DeclarationId>>,
    members: HashMap<DeclarationId, Vec<DeclarationId>>,
    packages: HashMap<String, DeclarationId>,
    files: BTreeMap<PathBuf, FileInfo>,
}

impl ProgramIndex {
    /// Create a new, empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the facts of a file, creating an empty record if needed.
    pub fn file_mut(&mut self, path: &Path) -> &mut FileInfo {
        self.files.entry(path.to_path_buf()).or_default()
    }

    /// Add a file record.
    pub fn add_file(&mut self, path: impl Into<PathBuf>, info: FileInfo) {
        self.files.insert(path.into(), info);
    }

    /// Add a declaration and return its assigned id.
    pub fn add_declaration(&mut self, mut decl: Declaration) -> DeclarationId {
        let id = DeclarationId(self.declarations.len() as u32);
        decl.id = id;

        self.by_qualified_name
            .entry(decl.qualified_name.clone())
            .or_default()
            .push(id);

        if decl.kind.is_type() {
            self.types_by_name
                .entry(decl.name.clone())
                .or_default()
                .push(id);
        }
        if decl.kind == DeclarationKind::Package {
            self.packages.insert(decl.qualified_name.clone(), id);
        }

        let is_top_level = match decl.container {
            None => true,
            Some(c) => self.declaration(c).map(|d| d.kind) == Some(DeclarationKind::Package),
        };
        if let Some(container) = decl.container {
            self.members.entry(container).or_default().push(id);
        }

        let file = self.file_mut(&decl.file.clone());
        if decl.kind.is_local() {
            file.locals.push(id);
        } else if decl.kind.is_type() && is_top_level {
            file.top_level.push(id);
        }

        self.declarations.push(decl);
        id
    }

    /// Add a reference.
    pub fn add_reference(&mut self, reference: Reference) {
        self.refs_by_target
            .entry(reference.target)
            .or_default()
            .push(self.references.len());
        self.references.push(reference);
    }

    /// Returns the package declaration with the given name.
    pub fn package(&self, name: &str) -> Option<DeclarationId> {
        self.packages.get(name).copied()
    }

    pub fn declaration(&self, id: DeclarationId) -> Option<&Declaration> {
        self.declarations.get(id.0 as usize)
    }

    /// Like [`declaration`](Self::declaration) but fails for unknown ids.
    pub fn get(&self, id: DeclarationId) -> Result<&Declaration> {
        self.declaration(id)
            .ok_or_else(|| RefactorError::UnknownDeclaration(id.to_string()))
    }

    pub fn declarations(&self) -> impl Iterator<Item = &Declaration> {
        self.declarations.iter()
    }

    pub fn all_references(&self) -> &[Reference] {
        &self.references
    }

    /// Every code reference to `id`.
    pub fn references_to(&self, id: DeclarationId) -> impl Iterator<Item = &Reference> {
        self.refs_by_target
            .get(&id)
            .into_iter()
            .flatten()
            .map(move |&i| &self.references[i])
    }

    /// Code references to `id` inside the search scope, in file order.
    pub fn references(&self, id: DeclarationId, scope: &SearchScope) -> Vec<&Reference> {
        let mut refs: Vec<&Reference> = self
            .references_to(id)
            .filter(|r| scope.includes(&r.file))
            .collect();
        refs.sort_by(|a, b| a.file.cmp(&b.file).then(a.range.start.cmp(&b.range.start)));
        refs
    }

    /// All declarations with the given qualified name.
    pub fn find(&self, qualified_name: &str) -> &[DeclarationId] {
        self.by_qualified_name
            .get(qualified_name)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Finds the single type with the given qualified name.
    pub fn find_type(&self, qualified_name: &str) -> Option<DeclarationId> {
        self.find(qualified_name)
            .iter()
            .copied()
            .find(|&id| self.is_kind(id, |k| k.is_type()))
    }

    /// Resolves a declaration path to exactly one declaration.
    ///
    /// Paths are `com.example.Type`, `com.example.Type#member` or
    /// `com.example.Type#member/arity`; a bare dotted name that is not a type
    /// resolves to a package.
    pub fn resolve(&self, path: &str) -> Result<DeclarationId> {
        let (owner, member) = match path.split_once('#') {
            Some((owner, member)) => (owner, Some(member)),
            None => (path, None),
        };

        let candidates: Vec<DeclarationId> = match member {
            None => {
                let found = self.find(owner).to_vec();
                if found.is_empty() {
                    self.package(owner).into_iter().collect()
                } else {
                    found
                }
            }
            Some(member) => {
                let (name, arity) = match member.split_once('/') {
                    Some((name, arity)) => (name, arity.parse::<usize>().ok()),
                    None => (member, None),
                };
                let owner_id = self.resolve(owner)?;
                self.members(owner_id)
                    .iter()
                    .copied()
                    .filter(|&id| {
                        self.declaration(id).is_some_and(|d| {
                            let matches_name = d.name == name
                                || (d.kind == DeclarationKind::Constructor && name == "<init>");
                            matches_name && arity.is_none_or(|n| d.arity == Some(n))
                        })
                    })
                    .collect()
            }
        };

        match candidates.as_slice() {
            [single] => Ok(*single),
            _ => Err(RefactorError::ambiguous(
                path,
                candidates.iter().map(|&id| self.describe(id)).collect(),
            )),
        }
    }

    /// A short human-readable description of a declaration.
    pub fn describe(&self, id: DeclarationId) -> String {
        match self.declaration(id) {
            Some(d) => match d.arity {
                Some(n) if d.kind.is_callable() => format!("{}/{}", d.qualified_name, n),
                _ => d.qualified_name.clone(),
            },
            None => id.to_string(),
        }
    }

    /// Direct members of a type (or parameters and locals of a callable).
    pub fn members(&self, id: DeclarationId) -> &[DeclarationId] {
        self.members.get(&id).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// Parameters of a method or constructor, in declaration order.
    pub fn parameters(&self, id: DeclarationId) -> Vec<&Declaration> {
        let mut params: Vec<&Declaration> = self
            .members(id)
            .iter()
            .filter_map(|&m| self.declaration(m))
            .filter(|d| d.kind == DeclarationKind::Parameter)
            .collect();
        params.sort_by_key(|d| d.range.start);
        params
    }

    /// Constructors declared by a class.
    pub fn constructors(&self, id: DeclarationId) -> Vec<&Declaration> {
        self.members(id)
            .iter()
            .filter_map(|&m| self.declaration(m))
            .filter(|d| d.kind == DeclarationKind::Constructor)
            .collect()
    }

    /// Types with the given simple name.
    pub fn types_named(&self, name: &str) -> &[DeclarationId] {
        self.types_by_name
            .get(name)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Top-level types declared in a package.
    pub fn types_in_package(&self, package: &str) -> Vec<DeclarationId> {
        self.files
            .values()
            .filter(|f| f.package == package)
            .flat_map(|f| f.top_level.iter().copied())
            .collect()
    }

    pub fn file(&self, path: &Path) -> Option<&FileInfo> {
        self.files.get(path)
    }

    pub fn files(&self) -> impl Iterator<Item = (&PathBuf, &FileInfo)> {
        self.files.iter()
    }

    /// Package of an indexed file, "" when unknown.
    pub fn package_of(&self, path: &Path) -> &str {
        self.files
            .get(path)
            .map(|f| f.package.as_str())
            .unwrap_or("")
    }

    fn is_kind(&self, id: DeclarationId, pred: impl Fn(DeclarationKind) -> bool) -> bool {
        self.declaration(id).is_some_and(|d| pred(d.kind))
    }

    /// Containers of `id`, innermost first.
    pub fn ancestors(&self, id: DeclarationId) -> Vec<DeclarationId> {
        let mut chain = Vec::new();
        let mut current = self.declaration(id).and_then(|d| d.container);
        while let Some(c) = current {
            chain.push(c);
            current = self.declaration(c).and_then(|d| d.container);
        }
        chain
    }

    /// Returns true if `id` is `ancestor` or nested inside it.
    pub fn is_within(&self, id: DeclarationId, ancestor: DeclarationId) -> bool {
        id == ancestor || self.ancestors(id).contains(&ancestor)
    }

    /// The nearest type strictly containing `id`.
    pub fn containing_type(&self, id: DeclarationId) -> Option<DeclarationId> {
        self.ancestors(id)
            .into_iter()
            .find(|&c| self.is_kind(c, |k| k.is_type()))
    }

    /// `id` itself if it is a type, else its containing type.
    pub fn type_or_container(&self, id: DeclarationId) -> Option<DeclarationId> {
        if self.is_kind(id, |k| k.is_type()) {
            Some(id)
        } else {
            self.containing_type(id)
        }
    }

    /// The outermost type containing (or being) `id`.
    pub fn top_level_type(&self, id: DeclarationId) -> Option<DeclarationId> {
        let mut top = self.type_or_container(id)?;
        while let Some(outer) = self.containing_type(top) {
            top = outer;
        }
        Some(top)
    }

    /// Locals and parameters of `file` visible at `offset`.
    pub fn visible_locals(&self, file: &Path, offset: usize) -> Vec<&Declaration> {
        self.files
            .get(file)
            .into_iter()
            .flat_map(|f| f.locals.iter())
            .filter_map(|&id| self.declaration(id))
            .filter(|d| d.scope.is_some_and(|s| s.contains(offset)))
            .collect()
    }

    /// Resolves the direct supertypes of a type that are part of the index.
    pub fn supertypes(&self, id: DeclarationId) -> Vec<DeclarationId> {
        let Some(decl) = self.declaration(id) else {
            return Vec::new();
        };
        decl.supertypes
            .iter()
            .filter_map(|name| self.resolve_type(&decl.file, decl.container, name))
            .filter(|&s| s != id)
            .collect()
    }

    /// Returns true if `sub` is `sup` or inherits from it.
    pub fn is_subtype(&self, sub: DeclarationId, sup: DeclarationId) -> bool {
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([sub]);
        while let Some(t) = queue.pop_front() {
            if t == sup {
                return true;
            }
            if seen.insert(t) {
                queue.extend(self.supertypes(t));
            }
        }
        false
    }

    /// Members named `name` of a type or its supertypes, nearest first.
    pub fn find_members(
        &self,
        type_id: DeclarationId,
        name: &str,
        pred: impl Fn(&Declaration) -> bool,
    ) -> Vec<DeclarationId> {
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([type_id]);
        while let Some(t) = queue.pop_front() {
            if !seen.insert(t) {
                continue;
            }
            let found: Vec<DeclarationId> = self
                .members(t)
                .iter()
                .copied()
                .filter(|&m| {
                    self.declaration(m)
                        .is_some_and(|d| d.name == name && !d.kind.is_local() && pred(d))
                })
                .collect();
            if !found.is_empty() {
                return found;
            }
            queue.extend(self.supertypes(t));
        }
        Vec::new()
    }

    /// Resolves a type name as written in `file`, inside `enclosing`.
    pub fn resolve_type(
        &self,
        file: &Path,
        enclosing: Option<DeclarationId>,
        name: &str,
    ) -> Option<DeclarationId> {
        let name = name.trim();
        if let Some((head, rest)) = name.split_once('.') {
            if let Some(id) = self.find_type(name) {
                return Some(id);
            }
            let mut current = self.resolve_type(file, enclosing, head)?;
            for segment in rest.split('.') {
                current = self
                    .members(current)
                    .iter()
                    .copied()
                    .find(|&m| self.declaration(m).is_some_and(|d| d.kind.is_type() && d.name == segment))?;
            }
            return Some(current);
        }

        // Enclosing types and their member types.
        let mut scope = enclosing.and_then(|e| self.type_or_container(e));
        while let Some(t) = scope {
            let decl = self.declaration(t)?;
            if decl.name == name {
                return Some(t);
            }
            let nested = self.find_members(t, name, |d| d.kind.is_type());
            if let Some(&n) = nested.first() {
                return Some(n);
            }
            scope = self.containing_type(t);
        }

        let info = self.files.get(file);
        if let Some(info) = info {
            if let Some(&id) = info
                .top_level
                .iter()
                .find(|&&id| self.declaration(id).is_some_and(|d| d.name == name))
            {
                return Some(id);
            }
            for import in info.imports.iter().filter(|i| !i.wildcard && !i.is_static) {
                if import.simple_name() == name
                    && let Some(id) = self.find_type(&import.name)
                {
                    return Some(id);
                }
            }
        }

        let package = info.map(|i| i.package.as_str()).unwrap_or("");
        let candidates = self.types_named(name);
        let top_level_in = |pkg: &str| {
            candidates.iter().copied().find(|&id| {
                self.declaration(id).is_some_and(|d| {
                    d.package == pkg && self.containing_type(id).is_none()
                })
            })
        };
        if let Some(id) = top_level_in(package) {
            return Some(id);
        }
        info.into_iter()
            .flat_map(|i| i.imports.iter())
            .filter(|i| i.wildcard && !i.is_static)
            .find_map(|i| top_level_in(&i.name))
    }

    /// Java access check: can code at `from_file`, inside `from`, see `target`?
    pub fn is_accessible(
        &self,
        target: DeclarationId,
        from_file: &Path,
        from: Option<DeclarationId>,
    ) -> bool {
        let Some(decl) = self.declaration(target) else {
            return false;
        };
        self.is_accessible_as(decl, decl.visibility, &decl.package, target, from_file, from)
    }

    /// Access check for `target` as if it had `visibility` and lived in
    /// `package` under the top-level type of `owner`.
    pub fn is_accessible_as(
        &self,
        decl: &Declaration,
        visibility: Visibility,
        package: &str,
        owner: DeclarationId,
        from_file: &Path,
        from: Option<DeclarationId>,
    ) -> bool {
        if decl.kind.is_local() || decl.kind == DeclarationKind::Package {
            return true;
        }
        let same_package = self.package_of(from_file) == package;
        match visibility {
            Visibility::Public => true,
            Visibility::PackagePrivate => same_package,
            Visibility::Protected => {
                same_package
                    || match (from.and_then(|f| self.type_or_container(f)), self.type_or_container_of_member(owner)) {
                        (Some(from_type), Some(owner_type)) => self.is_subtype(from_type, owner_type),
                        _ => false,
                    }
            }
            Visibility::Private => {
                let owner_top = self.top_level_type(owner);
                let from_top = from.and_then(|f| self.top_level_type(f));
                owner_top.is_some() && owner_top == from_top
            }
        }
    }

    fn type_or_container_of_member(&self, id: DeclarationId) -> Option<DeclarationId> {
        if self.is_kind(id, |k| k.is_type()) {
            self.containing_type(id).or(Some(id))
        } else {
            self.containing_type(id)
        }
    }

    pub fn stats(&self) -> IndexStats {
        IndexStats {
            files: self.files.len(),
            declarations: self.declarations.len(),
            references: self.references.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::reference::ReferenceContext;

    fn class(name: &str, package: &str, file: &str) -> Declaration {
        Declaration::new(name, DeclarationKind::Class, file, TextRange::new(0, 10), TextRange::new(6, 7))
            .with_qualified_name(format!("{package}.{name}"))
            .with_package(package)
            .with_visibility(Visibility::Public)
    }

    #[test]
    fn test_add_and_resolve() {
        let mut index = ProgramIndex::new();
        index.file_mut(Path::new("p/A.java")).package = "p".to_string();
        let a = index.add_declaration(class("A", "p", "p/A.java"));
        let field = index.add_declaration(
            Declaration::new("count", DeclarationKind::Field, "p/A.java", TextRange::new(2, 8), TextRange::new(4, 8))
                .with_qualified_name("p.A.count")
                .with_container(a),
        );

        assert_eq!(index.resolve("p.A").unwrap(), a);
        assert_eq!(index.resolve("p.A#count").unwrap(), field);
        assert!(matches!(
            index.resolve("p.A#missing"),
            Err(RefactorError::AmbiguousTarget { .. })
        ));
        assert_eq!(index.file(Path::new("p/A.java")).unwrap().top_level, vec![a]);
        assert_eq!(index.containing_type(field), Some(a));
    }

    #[test]
    fn test_references_are_sorted_and_scoped() {
        let mut index = ProgramIndex::new();
        let a = index.add_declaration(class("A", "p", "p/A.java"));
        index.add_reference(Reference::new("q/B.java", TextRange::new(30, 31), a, ReferenceContext::Type));
        index.add_reference(Reference::new("q/B.java", TextRange::new(10, 11), a, ReferenceContext::Type));
        index.add_reference(Reference::new("r/C.java", TextRange::new(5, 6), a, ReferenceContext::Type));

        let all = index.references(a, &SearchScope::code_only());
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].range.start, 10);

        let scoped = index.references(
            a,
            &SearchScope::code_only().restrict_to([PathBuf::from("r/C.java")]),
        );
        assert_eq!(scoped.len(), 1);
    }

    #[test]
    fn test_private_access_is_limited_to_top_level_type() {
        let mut index = ProgramIndex::new();
        let a = index.add_declaration(class("A", "p", "p/A.java"));
        let b = index.add_declaration(class("B", "p", "p/B.java"));
        let secret = index.add_declaration(
            Declaration::new("secret", DeclarationKind::Field, "p/A.java", TextRange::new(2, 8), TextRange::new(4, 8))
                .with_container(a)
                .with_package("p")
                .with_visibility(Visibility::Private),
        );

        assert!(index.is_accessible(secret, Path::new("p/A.java"), Some(a)));
        assert!(!index.is_accessible(secret, Path::new("p/B.java"), Some(b)));
    }
}
