//! Java index provider built on tree-sitter.
//!
//! Indexing runs in two passes over every `.java` file of a storage: the
//! first records declarations (so every type of the program is known), the
//! second resolves names to references using a lexical scope chain:
//! locals and parameters, members of the enclosing types, outer types, then
//! types by simple name via the file's own types, imports and package.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use streaming_iterator::StreamingIterator;
use tree_sitter::{Node, Query, QueryCursor, Tree};

use crate::error::{RefactorError, Result};
use crate::lang::{Java, Language};
use crate::span::TextRange;
use crate::storage::{Fingerprint, SourceStorage};

use super::declaration::{Declaration, DeclarationId, DeclarationKind, Visibility};
use super::index::{FileInfo, ImportInfo, ProgramIndex};
use super::reference::{CallSite, CastSite, Reference, ReferenceContext};

const COMMENT_QUERY: &str = "(line_comment) @comment (block_comment) @comment";

struct ParsedFile {
    path: PathBuf,
    text: String,
    tree: Tree,
    /// Declarations by the start byte of their name token.
    decl_at: HashMap<usize, DeclarationId>,
}

/// Builds a [`ProgramIndex`] from the Java sources of a storage.
pub struct JavaIndexer<'a> {
    storage: &'a dyn SourceStorage,
}

impl<'a> JavaIndexer<'a> {
    pub fn new(storage: &'a dyn SourceStorage) -> Self {
        Self { storage }
    }

    /// Parses and indexes every Java file.
    pub fn build(&self) -> Result<ProgramIndex> {
        let mut files = Vec::new();
        for path in self.storage.files()? {
            if !Java.matches_path(&path) {
                continue;
            }
            let text = self.storage.read(&path)?;
            let tree = Java.parse(&text).map_err(|e| match e {
                RefactorError::Parse { message, .. } => RefactorError::Parse {
                    path: path.clone(),
                    message,
                },
                other => other,
            })?;
            if tree.root_node().has_error() {
                tracing::warn!("{} has syntax errors, indexing what parsed", path.display());
            }
            files.push(ParsedFile {
                path,
                text,
                tree,
                decl_at: HashMap::new(),
            });
        }

        let comment_query = Java.query(COMMENT_QUERY)?;
        let mut index = ProgramIndex::new();

        for file in &mut files {
            let mut pass = DeclarationPass {
                index: &mut index,
                path: &file.path,
                text: &file.text,
                package: String::new(),
                package_id: None,
                decl_at: HashMap::new(),
            };
            let root = file.tree.root_node();
            pass.record_file(root, &comment_query);
            let container = pass.package_id;
            pass.visit_children(root, container);
            file.decl_at = pass.decl_at;
        }

        for file in &files {
            let refs = {
                let mut pass = ReferencePass {
                    index: &index,
                    path: &file.path,
                    text: &file.text,
                    decl_at: &file.decl_at,
                    refs: Vec::new(),
                };
                pass.visit(file.tree.root_node(), None);
                pass.refs
            };
            for reference in refs {
                index.add_reference(reference);
            }
        }

        let stats = index.stats();
        tracing::debug!(
            files = stats.files,
            declarations = stats.declarations,
            references = stats.references,
            "indexed java sources"
        );
        Ok(index)
    }
}

fn node_text<'t>(node: Node<'_>, text: &'t str) -> &'t str {
    &text[node.start_byte()..node.end_byte()]
}

fn range_of(node: Node<'_>) -> TextRange {
    TextRange::new(node.start_byte(), node.end_byte())
}

fn children<'t>(node: Node<'t>) -> Vec<Node<'t>> {
    let mut cursor = node.walk();
    node.children(&mut cursor).collect()
}

fn named_children<'t>(node: Node<'t>) -> Vec<Node<'t>> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor)
        .filter(|n| !matches!(n.kind(), "line_comment" | "block_comment"))
        .collect()
}

fn find_named_child<'t>(node: Node<'t>, kind: &str) -> Option<Node<'t>> {
    named_children(node).into_iter().find(|n| n.kind() == kind)
}

fn find_child<'t>(node: Node<'t>, kind: &str) -> Option<Node<'t>> {
    children(node).into_iter().find(|n| n.kind() == kind)
}

fn modifiers_of(node: Node<'_>) -> Option<Node<'_>> {
    node.child_by_field_name("modifiers")
        .or_else(|| find_named_child(node, "modifiers"))
}

/// The dotted name of a package or import declaration.
fn dotted_name_node(node: Node<'_>) -> Option<Node<'_>> {
    named_children(node)
        .into_iter()
        .find(|n| matches!(n.kind(), "scoped_identifier" | "identifier"))
}

/// Type text without generic arguments, array brackets or varargs dots.
fn base_type(type_text: &str) -> &str {
    let base = type_text.split('<').next().unwrap_or(type_text);
    let base = base.split('[').next().unwrap_or(base);
    base.trim().trim_end_matches("...").trim()
}

fn qualify(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}

/// Splits a dotted name into its segments with their ranges.
fn split_segments(text: &str, range: TextRange) -> Vec<(String, TextRange)> {
    let mut segments = Vec::new();
    let mut start = range.start;
    for part in range.slice(text).split('.') {
        let leading = part.len() - part.trim_start().len();
        let trimmed = part.trim();
        if !trimmed.is_empty() {
            let seg_start = start + leading;
            segments.push((
                trimmed.to_string(),
                TextRange::new(seg_start, seg_start + trimmed.len()),
            ));
        }
        start += part.len() + 1;
    }
    segments
}

/// Simple names of the direct supertypes of a type declaration.
fn supertype_names(node: Node<'_>, text: &str) -> Vec<String> {
    let mut names = Vec::new();
    for child in named_children(node) {
        match child.kind() {
            "superclass" | "super_interfaces" | "extends_interfaces" | "type_list" => {
                names.extend(supertype_names(child, text))
            }
            "type_identifier" | "scoped_type_identifier" => {
                names.push(node_text(child, text).to_string())
            }
            "generic_type" => {
                if let Some(base) = named_children(child).first() {
                    names.push(node_text(*base, text).to_string());
                }
            }
            _ => {}
        }
    }
    names
}

/// The identifier an expression starts from (`items` in `items.get(0)`).
fn head_identifier(node: Node<'_>) -> Option<Node<'_>> {
    let mut current = node;
    loop {
        current = match current.kind() {
            "identifier" => return Some(current),
            "method_invocation" => match current.child_by_field_name("object") {
                Some(object) if object.kind() == "this" => current.child_by_field_name("name")?,
                Some(object) => object,
                None => current.child_by_field_name("name")?,
            },
            "field_access" => match current.child_by_field_name("object") {
                Some(object) if object.kind() == "this" => current.child_by_field_name("field")?,
                Some(object) => object,
                None => return None,
            },
            "array_access" => current.child_by_field_name("array")?,
            "parenthesized_expression" => *named_children(current).first()?,
            _ => return None,
        };
    }
}

struct DeclarationPass<'i, 't> {
    index: &'i mut ProgramIndex,
    path: &'t Path,
    text: &'t str,
    package: String,
    package_id: Option<DeclarationId>,
    decl_at: HashMap<usize, DeclarationId>,
}

impl<'t> DeclarationPass<'_, 't> {
    fn text_of(&self, node: Node<'_>) -> &'t str {
        node_text(node, self.text)
    }

    fn record_file(&mut self, root: Node<'_>, comment_query: &Query) {
        let mut info = FileInfo {
            fingerprint: Some(Fingerprint::of(self.text)),
            ..FileInfo::default()
        };
        let mut package_name = None;

        for child in named_children(root) {
            match child.kind() {
                "package_declaration" => {
                    if let Some(name) = dotted_name_node(child) {
                        info.package = self.text_of(name).to_string();
                        info.package_clause = Some(range_of(child));
                        package_name = Some((range_of(child), range_of(name)));
                    }
                }
                "import_declaration" => {
                    if let Some(name) = dotted_name_node(child) {
                        info.imports.push(ImportInfo {
                            name: self.text_of(name).to_string(),
                            range: range_of(child),
                            name_range: range_of(name),
                            is_static: find_child(child, "static").is_some(),
                            wildcard: find_child(child, "asterisk").is_some(),
                        });
                    }
                }
                _ => {}
            }
        }

        let mut cursor = QueryCursor::new();
        let mut matches = cursor.matches(comment_query, root, self.text.as_bytes());
        while let Some(m) = matches.next() {
            for capture in m.captures {
                info.comments.push(range_of(capture.node));
            }
        }
        info.comments.sort();
        info.comments.dedup();

        self.package = info.package.clone();
        self.index.add_file(self.path, info);

        if let Some((clause, name_range)) = package_name {
            self.package_id = match self.index.package(&self.package) {
                Some(id) => Some(id),
                None => {
                    let decl = Declaration::new(
                        self.package.clone(),
                        DeclarationKind::Package,
                        self.path,
                        clause,
                        name_range,
                    )
                    .with_package(self.package.clone())
                    .with_visibility(Visibility::Public);
                    let id = self.index.add_declaration(decl);
                    self.decl_at.insert(name_range.start, id);
                    Some(id)
                }
            };
        }
    }

    fn container_info(&self, container: Option<DeclarationId>) -> (String, Option<DeclarationKind>) {
        match container.and_then(|c| self.index.declaration(c)) {
            Some(d) => (d.qualified_name.clone(), Some(d.kind)),
            None => (String::new(), None),
        }
    }

    fn new_declaration(
        &self,
        name_node: Node<'_>,
        kind: DeclarationKind,
        range: TextRange,
        container: Option<DeclarationId>,
    ) -> Declaration {
        let name = self.text_of(name_node);
        let (prefix, _) = self.container_info(container);
        let mut decl = Declaration::new(name, kind, self.path, range, range_of(name_node))
            .with_qualified_name(qualify(&prefix, name))
            .with_package(self.package.clone());
        decl.container = container;
        decl
    }

    fn apply_modifiers(&self, decl: &mut Declaration, node: Node<'_>, in_interface: bool) {
        let modifiers = modifiers_of(node);
        decl.modifiers = modifiers.map(range_of);
        decl.static_keyword = modifiers.and_then(|m| find_child(m, "static")).map(range_of);
        decl.is_static = decl.static_keyword.is_some();
        decl.is_final = modifiers.and_then(|m| find_child(m, "final")).is_some();
        decl.visibility = modifiers
            .and_then(|m| Visibility::from_modifiers(self.text_of(m)))
            .unwrap_or(if in_interface {
                Visibility::Public
            } else {
                Visibility::PackagePrivate
            });
    }

    fn add(&mut self, decl: Declaration) -> DeclarationId {
        let start = decl.name_range.start;
        let id = self.index.add_declaration(decl);
        self.decl_at.insert(start, id);
        id
    }

    fn visit_children(&mut self, node: Node<'_>, container: Option<DeclarationId>) {
        for child in named_children(node) {
            self.visit(child, container);
        }
    }

    fn visit(&mut self, node: Node<'_>, container: Option<DeclarationId>) {
        match node.kind() {
            "class_declaration"
            | "interface_declaration"
            | "enum_declaration"
            | "record_declaration"
            | "annotation_type_declaration" => {
                if let Some(id) = self.declare_type(node, container)
                    && let Some(body) = node.child_by_field_name("body")
                {
                    self.visit_children(body, Some(id));
                }
                return;
            }
            "method_declaration" | "constructor_declaration" => {
                if let Some(id) = self.declare_callable(node, container)
                    && let Some(body) = node.child_by_field_name("body")
                {
                    self.visit_children(body, Some(id));
                }
                return;
            }
            "field_declaration" | "constant_declaration" => self.declare_fields(node, container),
            "enum_constant" => {
                self.declare_enum_constant(node, container);
                return;
            }
            "local_variable_declaration" => self.declare_locals(node, container),
            "enhanced_for_statement" => {
                if let Some(name) = node.child_by_field_name("name") {
                    self.declare_local(name, node.child_by_field_name("type"), None, range_of(node), container);
                }
            }
            "catch_clause" => {
                if let Some(param) = find_named_child(node, "catch_formal_parameter")
                    && let Some(name) = param.child_by_field_name("name")
                {
                    let type_node = find_named_child(param, "catch_type");
                    self.declare_local(name, type_node, None, range_of(node), container);
                }
            }
            "lambda_expression" => self.declare_lambda_parameters(node, container),
            "resource" => {
                if let Some(name) = node.child_by_field_name("name") {
                    let scope = node
                        .parent()
                        .and_then(|resources| resources.parent())
                        .map(range_of)
                        .unwrap_or_else(|| range_of(node));
                    let value = node.child_by_field_name("value");
                    self.declare_local(name, node.child_by_field_name("type"), value, scope, container);
                }
            }
            _ => {}
        }
        self.visit_children(node, container);
    }

    fn declare_type(&mut self, node: Node<'_>, container: Option<DeclarationId>) -> Option<DeclarationId> {
        let name_node = node.child_by_field_name("name")?;
        let kind = match node.kind() {
            "interface_declaration" | "annotation_type_declaration" => DeclarationKind::Interface,
            "enum_declaration" => DeclarationKind::Enum,
            _ => DeclarationKind::Class,
        };
        let (_, outer_kind) = self.container_info(container);
        let in_interface = outer_kind == Some(DeclarationKind::Interface);
        let nested = outer_kind.is_some_and(|k| k.is_type());

        let mut decl = self.new_declaration(name_node, kind, range_of(node), container);
        self.apply_modifiers(&mut decl, node, in_interface);
        // Nested interfaces and enums, and every type nested in an interface,
        // are implicitly static.
        if nested && (kind != DeclarationKind::Class || in_interface) {
            decl.is_static = true;
        }
        decl.body = node.child_by_field_name("body").map(range_of);
        decl.supertypes = supertype_names(node, self.text);
        Some(self.add(decl))
    }

    fn declare_fields(&mut self, node: Node<'_>, container: Option<DeclarationId>) {
        let (_, owner_kind) = self.container_info(container);
        let in_interface =
            owner_kind == Some(DeclarationKind::Interface) || node.kind() == "constant_declaration";
        let type_node = node.child_by_field_name("type");

        let mut cursor = node.walk();
        let declarators: Vec<Node<'_>> = node
            .children_by_field_name("declarator", &mut cursor)
            .collect();
        for declarator in declarators {
            let Some(name_node) = declarator.child_by_field_name("name") else {
                continue;
            };
            let mut decl =
                self.new_declaration(name_node, DeclarationKind::Field, range_of(node), container);
            self.apply_modifiers(&mut decl, node, in_interface);
            if in_interface {
                decl.is_static = true;
                decl.is_final = true;
            }
            if let Some(t) = type_node {
                decl = decl.with_type(self.text_of(t), range_of(t));
            }
            decl.initializer = declarator.child_by_field_name("value").map(range_of);
            self.add(decl);
        }
    }

    fn declare_enum_constant(&mut self, node: Node<'_>, container: Option<DeclarationId>) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let enum_name = container
            .and_then(|c| self.index.declaration(c))
            .map(|d| d.name.clone())
            .unwrap_or_default();
        let mut decl = self
            .new_declaration(name_node, DeclarationKind::EnumConstant, range_of(node), container)
            .with_visibility(Visibility::Public)
            .with_static(true)
            .with_type(enum_name, range_of(name_node));
        decl.is_final = true;
        decl.initializer = node.child_by_field_name("arguments").map(range_of);
        decl.body = node.child_by_field_name("body").map(range_of);
        self.add(decl);
    }

    fn declare_callable(&mut self, node: Node<'_>, container: Option<DeclarationId>) -> Option<DeclarationId> {
        let name_node = node.child_by_field_name("name")?;
        let kind = if node.kind() == "constructor_declaration" {
            DeclarationKind::Constructor
        } else {
            DeclarationKind::Method
        };
        let (_, owner_kind) = self.container_info(container);
        let in_interface = owner_kind == Some(DeclarationKind::Interface);

        let mut decl = self.new_declaration(name_node, kind, range_of(node), container);
        self.apply_modifiers(&mut decl, node, in_interface);
        if let Some(t) = node.child_by_field_name("type") {
            decl = decl.with_type(self.text_of(t), range_of(t));
        }
        let params_node = node.child_by_field_name("parameters");
        decl.parameters = params_node.map(range_of);
        decl.body = node.child_by_field_name("body").map(range_of);

        let params: Vec<Node<'_>> = params_node
            .map(named_children)
            .unwrap_or_default()
            .into_iter()
            .filter(|p| matches!(p.kind(), "formal_parameter" | "spread_parameter"))
            .collect();
        decl.arity = Some(params.len());
        decl.varargs = params.iter().any(|p| p.kind() == "spread_parameter");

        let method_range = range_of(node);
        let id = self.add(decl);

        for param in params {
            let (name_node, type_node) = if param.kind() == "spread_parameter" {
                let name = find_named_child(param, "variable_declarator")
                    .and_then(|d| d.child_by_field_name("name"));
                let ty = named_children(param).into_iter().find(|n| {
                    !matches!(
                        n.kind(),
                        "modifiers" | "annotation" | "marker_annotation" | "variable_declarator"
                    )
                });
                (name, ty)
            } else {
                (param.child_by_field_name("name"), param.child_by_field_name("type"))
            };
            let Some(name_node) = name_node else {
                continue;
            };
            let mut p = self
                .new_declaration(name_node, DeclarationKind::Parameter, range_of(param), Some(id))
                .with_scope(method_range);
            p.is_final = modifiers_of(param)
                .and_then(|m| find_child(m, "final"))
                .is_some();
            if let Some(t) = type_node {
                let mut type_text = self.text_of(t).to_string();
                if param.kind() == "spread_parameter" {
                    type_text.push_str("...");
                }
                p = p.with_type(type_text, range_of(t));
            }
            self.add(p);
        }
        Some(id)
    }

    fn declare_locals(&mut self, node: Node<'_>, container: Option<DeclarationId>) {
        let block_end = node.parent().map(|p| p.end_byte()).unwrap_or(node.end_byte());
        let type_node = node.child_by_field_name("type");
        let mut cursor = node.walk();
        let declarators: Vec<Node<'_>> = node
            .children_by_field_name("declarator", &mut cursor)
            .collect();
        for declarator in declarators {
            if let Some(name) = declarator.child_by_field_name("name") {
                let scope = TextRange::new(declarator.start_byte(), block_end);
                let value = declarator.child_by_field_name("value");
                self.declare_local(name, type_node, value, scope, container);
            }
        }
    }

    fn declare_local(
        &mut self,
        name_node: Node<'_>,
        type_node: Option<Node<'_>>,
        value: Option<Node<'_>>,
        scope: TextRange,
        container: Option<DeclarationId>,
    ) -> DeclarationId {
        let mut decl = self
            .new_declaration(name_node, DeclarationKind::Local, range_of(name_node), container)
            .with_scope(scope);
        if let Some(t) = type_node {
            decl = decl.with_type(self.text_of(t), range_of(t));
        }
        decl.initializer = value.map(range_of);
        self.add(decl)
    }

    fn declare_lambda_parameters(&mut self, node: Node<'_>, container: Option<DeclarationId>) {
        let Some(params) = node.child_by_field_name("parameters") else {
            return;
        };
        let scope = range_of(node);
        match params.kind() {
            "identifier" => {
                self.declare_local(params, None, None, scope, container);
            }
            "inferred_parameters" => {
                for ident in named_children(params) {
                    if ident.kind() == "identifier" {
                        self.declare_local(ident, None, None, scope, container);
                    }
                }
            }
            _ => {
                for param in named_children(params) {
                    if let Some(name) = param.child_by_field_name("name") {
                        self.declare_local(name, param.child_by_field_name("type"), None, scope, container);
                    }
                }
            }
        }
    }
}

/// What the object of a member access denotes.
#[derive(Debug, Clone, Copy)]
enum Operand {
    This(Option<DeclarationId>),
    Super(Option<DeclarationId>),
    /// A variable and its resolved type.
    Variable(DeclarationId, Option<DeclarationId>),
    Type(DeclarationId),
    /// Any other expression, with its type when known.
    Value(Option<DeclarationId>),
}

impl Operand {
    fn type_id(&self) -> Option<DeclarationId> {
        match *self {
            Operand::This(t) | Operand::Super(t) | Operand::Value(t) => t,
            Operand::Variable(_, t) => t,
            Operand::Type(t) => Some(t),
        }
    }
}

struct ReferencePass<'a> {
    index: &'a ProgramIndex,
    path: &'a Path,
    text: &'a str,
    decl_at: &'a HashMap<usize, DeclarationId>,
    refs: Vec<Reference>,
}

impl<'a> ReferencePass<'a> {
    fn text_of(&self, node: Node<'_>) -> &'a str {
        node_text(node, self.text)
    }

    fn push(&mut self, reference: Reference) {
        self.refs.push(reference);
    }

    fn reference(
        &self,
        range: TextRange,
        target: DeclarationId,
        context: ReferenceContext,
        enclosing: Option<DeclarationId>,
    ) -> Reference {
        Reference::new(self.path, range, target, context).with_enclosing(enclosing)
    }

    fn visit_children(&mut self, node: Node<'_>, enclosing: Option<DeclarationId>) {
        for child in named_children(node) {
            self.visit(child, enclosing);
        }
    }

    fn visit(&mut self, node: Node<'_>, enclosing: Option<DeclarationId>) {
        let enclosing = match node.kind() {
            "class_declaration"
            | "interface_declaration"
            | "enum_declaration"
            | "record_declaration"
            | "annotation_type_declaration"
            | "method_declaration"
            | "constructor_declaration" => node
                .child_by_field_name("name")
                .and_then(|n| self.decl_at.get(&n.start_byte()).copied())
                .or(enclosing),
            _ => enclosing,
        };

        match node.kind() {
            "package_declaration" => self.visit_package(node),
            "import_declaration" => self.visit_import(node),
            "line_comment" | "block_comment" | "scoped_identifier" => {}
            "type_identifier" => self.visit_type(node, ReferenceContext::Type, None, enclosing),
            "scoped_type_identifier" => {
                self.emit_dotted(range_of(node), ReferenceContext::Type, None, enclosing);
            }
            "object_creation_expression" => self.visit_creation(node, enclosing),
            "instanceof_expression" => self.visit_instanceof(node, enclosing),
            "method_invocation" => self.visit_invocation(node, enclosing),
            "field_access" => self.visit_field_access(node, enclosing),
            "method_reference" => self.visit_method_reference(node, enclosing),
            "cast_expression" => self.visit_cast(node, enclosing),
            "identifier" => self.visit_identifier(node, enclosing),
            "this" => self.visit_this(node, enclosing),
            _ => self.visit_children(node, enclosing),
        }
    }

    fn visit_package(&mut self, node: Node<'_>) {
        let Some(name) = dotted_name_node(node) else {
            return;
        };
        if self.decl_at.contains_key(&name.start_byte()) {
            return;
        }
        if let Some(package) = self.index.package(self.text_of(name)) {
            let r = self.reference(range_of(name), package, ReferenceContext::Qualified, None);
            self.push(r);
        }
    }

    fn visit_import(&mut self, node: Node<'_>) {
        let Some(name) = dotted_name_node(node) else {
            return;
        };
        let name_range = range_of(name);
        let is_static = find_child(node, "static").is_some();
        let wildcard = find_child(node, "asterisk").is_some();

        if wildcard {
            if !is_static && let Some(package) = self.index.package(self.text_of(name)) {
                let r = self.reference(name_range, package, ReferenceContext::Import, None);
                self.push(r);
            } else {
                self.emit_dotted(name_range, ReferenceContext::Import, None, None);
            }
            return;
        }

        if !is_static {
            self.emit_dotted(name_range, ReferenceContext::Import, None, None);
            return;
        }

        let full = self.text_of(name);
        let Some(dot) = full.rfind('.') else {
            return;
        };
        let owner_range = TextRange::new(name_range.start, name_range.start + dot);
        let member_range = TextRange::new(name_range.start + dot + 1, name_range.end);
        let member = member_range.slice(self.text).trim();
        if let Some(owner) = self.emit_dotted(owner_range, ReferenceContext::Import, None, None) {
            let targets: Vec<DeclarationId> = self
                .index
                .members(owner)
                .iter()
                .copied()
                .filter(|&m| {
                    self.index
                        .declaration(m)
                        .is_some_and(|d| d.name == member && d.is_static && !d.kind.is_local())
                })
                .collect();
            for target in targets {
                let r = self
                    .reference(member_range, target, ReferenceContext::Import, None)
                    .with_qualifier(TextRange::new(name_range.start, member_range.start));
                self.push(r);
            }
        }
    }

    /// Emits references for a dotted type name (`com.example.Outer.Inner`):
    /// one for the package prefix, if indexed, and one per type segment.
    /// Returns the innermost resolved type.
    fn emit_dotted(
        &mut self,
        range: TextRange,
        context: ReferenceContext,
        mut call: Option<CallSite>,
        enclosing: Option<DeclarationId>,
    ) -> Option<DeclarationId> {
        let segments = split_segments(self.text, range);
        if segments.is_empty() {
            return None;
        }

        let mut package_len = 0;
        let mut prefix = String::new();
        for (i, (segment, _)) in segments.iter().enumerate().take(segments.len() - 1) {
            if i > 0 {
                prefix.push('.');
            }
            prefix.push_str(segment);
            if self.index.package(&prefix).is_some() {
                package_len = i + 1;
            }
        }
        let package_name = segments[..package_len]
            .iter()
            .map(|(s, _)| s.as_str())
            .collect::<Vec<_>>()
            .join(".");
        if package_len > 0
            && let Some(package) = self.index.package(&package_name)
        {
            let package_range = TextRange::new(segments[0].1.start, segments[package_len - 1].1.end);
            let ctx = if context == ReferenceContext::Import {
                ReferenceContext::Import
            } else {
                ReferenceContext::Qualified
            };
            let r = self.reference(package_range, package, ctx, enclosing);
            self.push(r);
        }

        let mut current: Option<DeclarationId> = None;
        for i in package_len..segments.len() {
            let (segment, segment_range) = &segments[i];
            let next = match current {
                None if package_len > 0 => self.index.find_type(&qualify(&package_name, segment)),
                None => self.index.resolve_type(self.path, enclosing, segment),
                Some(outer) => self.index.members(outer).iter().copied().find(|&m| {
                    self.index
                        .declaration(m)
                        .is_some_and(|d| d.kind.is_type() && d.name == *segment)
                }),
            };
            let Some(next) = next else {
                break;
            };

            let last = i + 1 == segments.len();
            let ctx = match context {
                ReferenceContext::Import => ReferenceContext::Import,
                ReferenceContext::Type if i == package_len && package_len > 0 => {
                    ReferenceContext::Qualified
                }
                _ if last => context,
                _ => ReferenceContext::Type,
            };
            let mut r = self.reference(*segment_range, next, ctx, enclosing);
            if i > 0 {
                r = r.with_qualifier(TextRange::new(segments[0].1.start, segment_range.start));
            }
            if last && let Some(call) = call.take() {
                r = r.with_call(call);
            }
            self.push(r);
            current = Some(next);
        }
        current
    }

    fn visit_type(
        &mut self,
        node: Node<'_>,
        context: ReferenceContext,
        call: Option<CallSite>,
        enclosing: Option<DeclarationId>,
    ) {
        if let Some(target) = self.index.resolve_type(self.path, enclosing, self.text_of(node)) {
            let mut r = self.reference(range_of(node), target, context, enclosing);
            if let Some(call) = call {
                r = r.with_call(call);
            }
            self.push(r);
        }
    }

    /// Visits a type in a position with a specific context (creation, instanceof).
    fn visit_type_in(
        &mut self,
        node: Node<'_>,
        context: ReferenceContext,
        call: Option<CallSite>,
        enclosing: Option<DeclarationId>,
    ) {
        match node.kind() {
            "type_identifier" => self.visit_type(node, context, call, enclosing),
            "scoped_type_identifier" => {
                self.emit_dotted(range_of(node), context, call, enclosing);
            }
            "generic_type" => {
                let parts = named_children(node);
                if let Some(base) = parts.first() {
                    self.visit_type_in(*base, context, call, enclosing);
                }
                for rest in parts.iter().skip(1) {
                    self.visit(*rest, enclosing);
                }
            }
            _ => self.visit(node, enclosing),
        }
    }

    fn call_site(&self, node: Node<'_>, arguments: Node<'_>) -> CallSite {
        CallSite {
            expression: range_of(node),
            callee: TextRange::new(node.start_byte(), arguments.start_byte()),
            arguments: range_of(arguments),
            args: named_children(arguments).into_iter().map(range_of).collect(),
        }
    }

    fn visit_creation(&mut self, node: Node<'_>, enclosing: Option<DeclarationId>) {
        let type_node = node.child_by_field_name("type");
        let call = node
            .child_by_field_name("arguments")
            .map(|args| self.call_site(node, args));
        for child in named_children(node) {
            if Some(child) == type_node {
                self.visit_type_in(child, ReferenceContext::Construction, call.clone(), enclosing);
            } else {
                self.visit(child, enclosing);
            }
        }
    }

    fn visit_instanceof(&mut self, node: Node<'_>, enclosing: Option<DeclarationId>) {
        if let Some(left) = node.child_by_field_name("left") {
            self.visit(left, enclosing);
        }
        if let Some(right) = node.child_by_field_name("right") {
            self.visit_type_in(right, ReferenceContext::InstanceOf, None, enclosing);
        }
    }

    /// Types enclosing `enclosing`, innermost first.
    fn enclosing_types(&self, enclosing: Option<DeclarationId>) -> Vec<DeclarationId> {
        let mut types = Vec::new();
        let mut current = enclosing.and_then(|e| self.index.type_or_container(e));
        while let Some(t) = current {
            types.push(t);
            current = self.index.containing_type(t);
        }
        types
    }

    fn type_of(&self, id: DeclarationId) -> Option<DeclarationId> {
        let decl = self.index.declaration(id)?;
        let type_text = decl.type_text.as_deref()?;
        self.index
            .resolve_type(&decl.file, decl.container, base_type(type_text))
    }

    /// A member brought in by a static import.
    fn static_import(&self, name: &str, pred: impl Fn(&Declaration) -> bool) -> Option<DeclarationId> {
        let info = self.index.file(self.path)?;
        for import in info.imports.iter().filter(|i| i.is_static) {
            let owner = if import.wildcard {
                import.name.as_str()
            } else {
                match import.name.rsplit_once('.') {
                    Some((owner, member)) if member == name => owner,
                    _ => continue,
                }
            };
            if let Some(owner) = self.index.find_type(owner)
                && let Some(&m) = self
                    .index
                    .find_members(owner, name, |d| d.is_static && pred(d))
                    .first()
            {
                return Some(m);
            }
        }
        None
    }

    fn resolve_variable(
        &self,
        name: &str,
        offset: usize,
        enclosing: Option<DeclarationId>,
    ) -> Option<DeclarationId> {
        let local = self
            .index
            .visible_locals(self.path, offset)
            .into_iter()
            .filter(|d| d.name == name)
            .max_by_key(|d| d.scope.map(|s| s.start));
        if let Some(local) = local {
            return Some(local.id);
        }
        for t in self.enclosing_types(enclosing) {
            if let Some(&field) = self
                .index
                .find_members(t, name, |d| d.kind.is_variable())
                .first()
            {
                return Some(field);
            }
        }
        self.static_import(name, |d| d.kind.is_variable())
    }

    /// Dotted text of an identifier chain (`com.example.Util`).
    fn dotted_text(&self, node: Node<'_>) -> Option<String> {
        match node.kind() {
            "identifier" => Some(self.text_of(node).to_string()),
            "field_access" => {
                let object = self.dotted_text(node.child_by_field_name("object")?)?;
                let field = node.child_by_field_name("field")?;
                (field.kind() == "identifier").then(|| format!("{}.{}", object, self.text_of(field)))
            }
            _ => None,
        }
    }

    /// Resolves an identifier chain that names a type rather than a value.
    fn dotted_type(&self, node: Node<'_>, enclosing: Option<DeclarationId>) -> Option<DeclarationId> {
        let dotted = self.dotted_text(node)?;
        let first = dotted.split('.').next()?;
        if self
            .resolve_variable(first, node.start_byte(), enclosing)
            .is_some()
        {
            return None;
        }
        self.index
            .find_type(&dotted)
            .or_else(|| self.index.resolve_type(self.path, enclosing, &dotted))
    }

    fn classify(&self, node: Node<'_>, enclosing: Option<DeclarationId>) -> Operand {
        let enclosing_type = self.enclosing_types(enclosing).first().copied();
        match node.kind() {
            "this" => Operand::This(enclosing_type),
            "super" => Operand::Super(
                enclosing_type.and_then(|t| self.index.supertypes(t).first().copied()),
            ),
            "identifier" => {
                let name = self.text_of(node);
                if let Some(var) = self.resolve_variable(name, node.start_byte(), enclosing) {
                    Operand::Variable(var, self.type_of(var))
                } else if let Some(t) = self.index.resolve_type(self.path, enclosing, name) {
                    Operand::Type(t)
                } else {
                    Operand::Value(None)
                }
            }
            "field_access" => {
                let (Some(object), Some(field)) = (
                    node.child_by_field_name("object"),
                    node.child_by_field_name("field"),
                ) else {
                    return Operand::Value(None);
                };
                if field.kind() == "this" {
                    return Operand::This(self.classify(object, enclosing).type_id());
                }
                if let Some(t) = self.dotted_type(node, enclosing) {
                    return Operand::Type(t);
                }
                let owner = self.classify(object, enclosing).type_id();
                let target = owner.and_then(|t| {
                    self.index
                        .find_members(t, self.text_of(field), |d| d.kind.is_variable())
                        .first()
                        .copied()
                });
                Operand::Value(target.and_then(|f| self.type_of(f)))
            }
            "method_invocation" => Operand::Value(
                self.resolve_invocation(node, enclosing)
                    .and_then(|(m, _)| self.type_of(m)),
            ),
            "object_creation_expression" | "cast_expression" => Operand::Value(
                node.child_by_field_name("type")
                    .and_then(|t| {
                        self.index
                            .resolve_type(self.path, enclosing, base_type(self.text_of(t)))
                    }),
            ),
            "parenthesized_expression" => match named_children(node).first() {
                Some(inner) => self.classify(*inner, enclosing),
                None => Operand::Value(None),
            },
            _ => Operand::Value(None),
        }
    }

    fn resolve_invocation(
        &self,
        node: Node<'_>,
        enclosing: Option<DeclarationId>,
    ) -> Option<(DeclarationId, Option<Operand>)> {
        let name = self.text_of(node.child_by_field_name("name")?);
        let argc = node
            .child_by_field_name("arguments")
            .map(|a| named_children(a).len())
            .unwrap_or(0);
        let is_method =
            |d: &Declaration| d.kind == DeclarationKind::Method && d.accepts_arity(argc);

        match node.child_by_field_name("object") {
            None => {
                let target = self
                    .enclosing_types(enclosing)
                    .into_iter()
                    .find_map(|t| self.index.find_members(t, name, is_method).first().copied())
                    .or_else(|| self.static_import(name, is_method))?;
                Some((target, None))
            }
            Some(object) => {
                let operand = self.classify(object, enclosing);
                let owner = operand.type_id()?;
                let target = *self.index.find_members(owner, name, is_method).first()?;
                Some((target, Some(operand)))
            }
        }
    }

    fn visit_invocation(&mut self, node: Node<'_>, enclosing: Option<DeclarationId>) {
        let name = node.child_by_field_name("name");
        let object = node.child_by_field_name("object");
        let arguments = node.child_by_field_name("arguments");

        if let (Some(name), Some((target, operand))) = (name, self.resolve_invocation(node, enclosing)) {
            let context = match operand {
                None => ReferenceContext::Unqualified,
                Some(Operand::Type(_)) => ReferenceContext::Static,
                Some(_) => ReferenceContext::Instance,
            };
            let mut r = self.reference(range_of(name), target, context, enclosing);
            if let Some(object) = object {
                r = r.with_qualifier(TextRange::new(object.start_byte(), name.start_byte()));
            }
            if let Some(Operand::Variable(var, _)) = operand {
                r = r.with_receiver(var);
            }
            if let Some(arguments) = arguments {
                r = r.with_call(self.call_site(node, arguments));
            }
            self.push(r);
        }

        for child in named_children(node) {
            if Some(child) == name {
                continue;
            }
            if Some(child) == object {
                self.visit_object(child, enclosing);
            } else {
                self.visit(child, enclosing);
            }
        }
    }

    /// Visits the object of a member access, treating identifier chains
    /// that name a type as a dotted type name.
    fn visit_object(&mut self, object: Node<'_>, enclosing: Option<DeclarationId>) {
        if object.kind() == "field_access" && self.dotted_type(object, enclosing).is_some() {
            self.emit_dotted(range_of(object), ReferenceContext::Type, None, enclosing);
        } else {
            self.visit(object, enclosing);
        }
    }

    fn visit_field_access(&mut self, node: Node<'_>, enclosing: Option<DeclarationId>) {
        let (Some(object), Some(field)) = (
            node.child_by_field_name("object"),
            node.child_by_field_name("field"),
        ) else {
            self.visit_children(node, enclosing);
            return;
        };
        if field.kind() == "this" {
            // `Outer.this`
            self.visit_object(object, enclosing);
            return;
        }

        let operand = self.classify(object, enclosing);
        let name = self.text_of(field);
        let qualifier = TextRange::new(object.start_byte(), field.start_byte());
        let field_target = operand.type_id().and_then(|t| {
            self.index
                .find_members(t, name, |d| d.kind.is_variable())
                .first()
                .copied()
        });

        if let Some(target) = field_target {
            let context = match operand {
                Operand::Type(_) => ReferenceContext::Static,
                _ => ReferenceContext::Instance,
            };
            let mut r = self
                .reference(range_of(field), target, context, enclosing)
                .with_qualifier(qualifier);
            if let Operand::Variable(var, _) = operand {
                r = r.with_receiver(var);
            }
            self.push(r);
            self.visit_object(object, enclosing);
        } else if self.dotted_type(node, enclosing).is_some() {
            // The whole access names a type (`com.example.Util`).
            self.emit_dotted(range_of(node), ReferenceContext::Type, None, enclosing);
        } else {
            self.visit_object(object, enclosing);
        }
    }

    fn visit_method_reference(&mut self, node: Node<'_>, enclosing: Option<DeclarationId>) {
        let parts = children(node);
        let Some(head) = parts.iter().copied().find(|n| n.is_named()) else {
            return;
        };
        let name = parts
            .last()
            .copied()
            .filter(|n| n.kind() == "identifier" && n.start_byte() > head.end_byte());

        let operand = match head.kind() {
            "type_identifier" | "scoped_type_identifier" | "generic_type" => {
                let base = base_type(self.text_of(head));
                self.index
                    .resolve_type(self.path, enclosing, base)
                    .map(Operand::Type)
                    .unwrap_or(Operand::Value(None))
            }
            _ => self.classify(head, enclosing),
        };

        if let Some(name) = name
            && let Some(owner) = operand.type_id()
            && let Some(&target) = self
                .index
                .find_members(owner, self.text_of(name), |d| d.kind == DeclarationKind::Method)
                .first()
        {
            let context = match operand {
                Operand::Type(_) => ReferenceContext::Static,
                _ => ReferenceContext::Instance,
            };
            let r = self
                .reference(range_of(name), target, context, enclosing)
                .with_qualifier(TextRange::new(head.start_byte(), name.start_byte()));
            self.push(r);
        }

        match head.kind() {
            "type_identifier" | "scoped_type_identifier" | "generic_type" => {
                self.visit_type_in(head, ReferenceContext::Type, None, enclosing)
            }
            _ => self.visit_object(head, enclosing),
        }
    }

    fn visit_cast(&mut self, node: Node<'_>, enclosing: Option<DeclarationId>) {
        let before = self.refs.len();
        self.visit_children(node, enclosing);

        let (Some(type_node), Some(value)) = (
            node.child_by_field_name("type"),
            node.child_by_field_name("value"),
        ) else {
            return;
        };
        let Some(head) = head_identifier(value) else {
            return;
        };
        let cast = CastSite {
            expression: range_of(node),
            prefix: TextRange::new(node.start_byte(), value.start_byte()),
            type_text: self.text_of(type_node).to_string(),
        };
        if let Some(r) = self.refs[before..]
            .iter_mut()
            .find(|r| r.range.start == head.start_byte())
        {
            r.cast = Some(cast);
        }
    }

    fn visit_identifier(&mut self, node: Node<'_>, enclosing: Option<DeclarationId>) {
        let start = node.start_byte();
        if self.decl_at.contains_key(&start) {
            return;
        }
        if let Some(parent) = node.parent() {
            let is_label = matches!(
                parent.kind(),
                "labeled_statement" | "break_statement" | "continue_statement"
            );
            let is_key = parent.kind() == "element_value_pair"
                && parent.child_by_field_name("key") == Some(node);
            if is_label || is_key {
                return;
            }
        }

        let name = self.text_of(node);
        let range = range_of(node);
        if let Some(var) = self.resolve_variable(name, start, enclosing) {
            let r = self.reference(range, var, ReferenceContext::Unqualified, enclosing);
            self.push(r);
        } else if let Some(t) = self.index.resolve_type(self.path, enclosing, name) {
            let r = self.reference(range, t, ReferenceContext::Type, enclosing);
            self.push(r);
        }
    }

    fn visit_this(&mut self, node: Node<'_>, enclosing: Option<DeclarationId>) {
        if let Some(parent) = node.parent() {
            let is_qualifier = matches!(parent.kind(), "field_access" | "method_invocation")
                && parent.child_by_field_name("object") == Some(node);
            if is_qualifier || parent.kind() == "explicit_constructor_invocation" {
                return;
            }
        }
        if let Some(t) = self.enclosing_types(enclosing).first().copied() {
            let r = self.reference(range_of(node), t, ReferenceContext::This, enclosing);
            self.push(r);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::search::SearchScope;
    use crate::storage::MemoryStorage;

    const COUNTER: &str = "package com.example;

/** Counts things. */
public class Counter {
    private int count;

    public void increment() {
        count++;
        this.count += 1;
    }

    public int get() {
        return count;
    }
}
";

    const USER: &str = "package com.example.app;

import com.example.Counter;

class User {
    int run(Counter counter) {
        counter.increment();
        Counter other = new Counter();
        return other.get();
    }
}
";

    fn index_of(files: &[(&str, &str)]) -> ProgramIndex {
        let mut storage = MemoryStorage::new();
        for (path, content) in files {
            storage = storage.with_file(*path, *content);
        }
        JavaIndexer::new(&storage).build().unwrap()
    }

    #[test]
    fn test_declarations_and_packages() {
        let index = index_of(&[("src/com/example/Counter.java", COUNTER)]);

        let counter = index.resolve("com.example.Counter").unwrap();
        let decl = index.get(counter).unwrap();
        assert_eq!(decl.kind, DeclarationKind::Class);
        assert_eq!(decl.visibility, Visibility::Public);
        assert_eq!(decl.package, "com.example");

        let count = index.resolve("com.example.Counter#count").unwrap();
        let count = index.get(count).unwrap();
        assert_eq!(count.visibility, Visibility::Private);
        assert_eq!(count.type_text.as_deref(), Some("int"));

        let increment = index.resolve("com.example.Counter#increment/0").unwrap();
        assert_eq!(index.get(increment).unwrap().arity, Some(0));
        assert!(index.package("com.example").is_some());

        let info = index.file(Path::new("src/com/example/Counter.java")).unwrap();
        assert_eq!(info.comments.len(), 1);
        assert!(info.fingerprint.is_some());
    }

    #[test]
    fn test_field_references() {
        let index = index_of(&[("src/com/example/Counter.java", COUNTER)]);
        let count = index.resolve("com.example.Counter#count").unwrap();

        let refs = index.references(count, &SearchScope::code_only());
        assert_eq!(refs.len(), 3);
        assert_eq!(refs[0].context, ReferenceContext::Unqualified);
        assert_eq!(refs[1].context, ReferenceContext::Instance);
        assert!(refs[1].is_this_qualified(COUNTER));
    }

    #[test]
    fn test_cross_file_references() {
        let index = index_of(&[
            ("src/com/example/Counter.java", COUNTER),
            ("src/com/example/app/User.java", USER),
        ]);
        let counter = index.resolve("com.example.Counter").unwrap();
        let refs = index.references(counter, &SearchScope::code_only());
        let contexts: Vec<ReferenceContext> = refs.iter().map(|r| r.context).collect();
        assert!(contexts.contains(&ReferenceContext::Import));
        assert!(contexts.contains(&ReferenceContext::Construction));
        assert_eq!(contexts.iter().filter(|c| **c == ReferenceContext::Type).count(), 2);

        let increment = index.resolve("com.example.Counter#increment").unwrap();
        let calls = index.references(increment, &SearchScope::code_only());
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].context, ReferenceContext::Instance);
        assert!(calls[0].receiver.is_some());
        assert!(calls[0].call.is_some());

        let get = index.resolve("com.example.Counter#get").unwrap();
        assert_eq!(index.references(get, &SearchScope::code_only()).len(), 1);
    }

    #[test]
    fn test_locals_shadow_fields() {
        let source = "class A {
    int total;
    void run() {
        int total = 1;
        total++;
    }
    void other() {
        total++;
    }
}
";
        let index = index_of(&[("A.java", source)]);
        let field = index.resolve("A#total").unwrap();
        let refs = index.references(field, &SearchScope::code_only());
        assert_eq!(refs.len(), 1);
        assert!(refs[0].range.start > source.find("void other").unwrap());
    }

    #[test]
    fn test_cast_is_attached_to_head_reference() {
        let source = "import java.util.List;
class Box {
    List items;
    String first() {
        return (String) items.get(0);
    }
}
";
        let index = index_of(&[("Box.java", source)]);
        let items = index.resolve("Box#items").unwrap();
        let refs = index.references(items, &SearchScope::code_only());
        assert_eq!(refs.len(), 1);
        let cast = refs[0].cast.as_ref().unwrap();
        assert_eq!(cast.type_text, "String");
        assert_eq!(cast.prefix.slice(source), "(String) ");
    }

    #[test]
    fn test_split_segments() {
        let text = "com.example . Util";
        let segments = split_segments(text, TextRange::new(0, text.len()));
        let names: Vec<&str> = segments.iter().map(|(s, _)| s.as_str()).collect();
        assert_eq!(names, vec!["com", "example", "Util"]);
        assert_eq!(segments[2].1.slice(text), "Util");
    }
}
