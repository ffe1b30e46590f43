//! Declarations: named program entities.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::span::{Span, TextRange};

/// Identifier of a declaration within one [`ProgramIndex`](super::ProgramIndex).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DeclarationId(pub u32);

impl std::fmt::Display for DeclarationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The kind of a declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeclarationKind {
    Package,
    Class,
    Interface,
    Enum,
    Field,
    EnumConstant,
    Method,
    Constructor,
    Parameter,
    Local,
}

/// Name spaces in which two declarations can clash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    Package,
    Type,
    Variable,
    Method,
}

impl DeclarationKind {
    /// Returns a human-readable name for this kind.
    pub fn name(&self) -> &'static str {
        match self {
            DeclarationKind::Package => "package",
            DeclarationKind::Class => "class",
            DeclarationKind::Interface => "interface",
            DeclarationKind::Enum => "enum",
            DeclarationKind::Field => "field",
            DeclarationKind::EnumConstant => "enum constant",
            DeclarationKind::Method => "method",
            DeclarationKind::Constructor => "constructor",
            DeclarationKind::Parameter => "parameter",
            DeclarationKind::Local => "local variable",
        }
    }

    /// Returns true for classes, interfaces and enums.
    pub fn is_type(&self) -> bool {
        matches!(
            self,
            DeclarationKind::Class | DeclarationKind::Interface | DeclarationKind::Enum
        )
    }

    /// Returns true for declarations local to a method body.
    pub fn is_local(&self) -> bool {
        matches!(self, DeclarationKind::Parameter | DeclarationKind::Local)
    }

    /// Returns true for fields, enum constants, parameters and locals.
    pub fn is_variable(&self) -> bool {
        matches!(
            self,
            DeclarationKind::Field
                | DeclarationKind::EnumConstant
                | DeclarationKind::Parameter
                | DeclarationKind::Local
        )
    }

    /// Returns true for methods and constructors.
    pub fn is_callable(&self) -> bool {
        matches!(self, DeclarationKind::Method | DeclarationKind::Constructor)
    }

    pub fn namespace(&self) -> Namespace {
        match self {
            DeclarationKind::Package => Namespace::Package,
            k if k.is_type() => Namespace::Type,
            k if k.is_callable() => Namespace::Method,
            _ => Namespace::Variable,
        }
    }
}

/// Java access levels, ordered from most to least restrictive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Visibility {
    Private,
    PackagePrivate,
    Protected,
    Public,
}

impl Visibility {
    /// The modifier keyword, or `None` for package-private.
    pub fn keyword(&self) -> Option<&'static str> {
        match self {
            Visibility::Private => Some("private"),
            Visibility::PackagePrivate => None,
            Visibility::Protected => Some("protected"),
            Visibility::Public => Some("public"),
        }
    }

    /// Parses a visibility name as accepted by the factory surface.
    ///
    /// Accepts the modifier keywords plus `package`/`package-private` and
    /// the empty string for package-private access.
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim() {
            "private" => Some(Visibility::Private),
            "" | "package" | "package-private" | "packageLocal" => Some(Visibility::PackagePrivate),
            "protected" => Some(Visibility::Protected),
            "public" => Some(Visibility::Public),
            _ => None,
        }
    }

    /// Extracts the visibility from a modifier list, if one is present.
    pub fn from_modifiers(modifiers: &str) -> Option<Self> {
        modifiers
            .split(|c: char| !c.is_alphanumeric())
            .find_map(|word| match word {
                "private" => Some(Visibility::Private),
                "protected" => Some(Visibility::Protected),
                "public" => Some(Visibility::Public),
                _ => None,
            })
    }
}

impl std::fmt::Display for Visibility {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.keyword().unwrap_or("package-private"))
    }
}

/// A named program entity.
///
/// `container` is a back-reference by id; declarations never own each other.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Declaration {
    pub id: DeclarationId,
    /// Simple name (for packages, the dotted package name).
    pub name: String,
    pub qualified_name: String,
    pub kind: DeclarationKind,
    pub visibility: Visibility,
    pub is_static: bool,
    pub is_final: bool,
    pub container: Option<DeclarationId>,
    pub file: PathBuf,
    /// Package of the declaring file ("" for the default package).
    pub package: String,
    /// The whole declaration.
    pub range: TextRange,
    /// The name token.
    pub name_range: TextRange,
    /// The modifier list, if any.
    pub modifiers: Option<TextRange>,
    /// The `static` keyword inside the modifier list.
    pub static_keyword: Option<TextRange>,
    /// Declared type (or return type) text and range.
    pub type_text: Option<String>,
    pub type_range: Option<TextRange>,
    /// Parameter list including parentheses.
    pub parameters: Option<TextRange>,
    /// Body including braces.
    pub body: Option<TextRange>,
    /// Variable initializer expression.
    pub initializer: Option<TextRange>,
    /// Region in which a local or parameter is visible.
    pub scope: Option<TextRange>,
    /// Parameter count of methods and constructors.
    pub arity: Option<usize>,
    pub varargs: bool,
    /// Simple names of direct supertypes.
    pub supertypes: Vec<String>,
}

impl Declaration {
    /// Create a new declaration. The id is assigned when it is added to an index.
    pub fn new(
        name: impl Into<String>,
        kind: DeclarationKind,
        file: impl Into<PathBuf>,
        range: TextRange,
        name_range: TextRange,
    ) -> Self {
        let name = name.into();
        Self {
            id: DeclarationId(0),
            qualified_name: name.clone(),
            name,
            kind,
            visibility: Visibility::PackagePrivate,
            is_static: false,
            is_final: false,
            container: None,
            file: file.into(),
            package: String::new(),
            range,
            name_range,
            modifiers: None,
            static_keyword: None,
            type_text: None,
            type_range: None,
            parameters: None,
            body: None,
            initializer: None,
            scope: None,
            arity: None,
            varargs: false,
            supertypes: Vec::new(),
        }
    }

    pub fn with_qualified_name(mut self, qualified_name: impl Into<String>) -> Self {
        self.qualified_name = qualified_name.into();
        self
    }

    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    pub fn with_container(mut self, container: DeclarationId) -> Self {
        self.container = Some(container);
        self
    }

    pub fn with_package(mut self, package: impl Into<String>) -> Self {
        self.package = package.into();
        self
    }

    pub fn with_static(mut self, is_static: bool) -> Self {
        self.is_static = is_static;
        self
    }

    pub fn with_type(mut self, type_text: impl Into<String>, type_range: TextRange) -> Self {
        self.type_text = Some(type_text.into());
        self.type_range = Some(type_range);
        self
    }

    pub fn with_scope(mut self, scope: TextRange) -> Self {
        self.scope = Some(scope);
        self
    }

    /// The whole declaration as a span.
    pub fn span(&self) -> Span {
        Span::new(self.file.clone(), self.range)
    }

    /// The name token as a span.
    pub fn name_span(&self) -> Span {
        Span::new(self.file.clone(), self.name_range)
    }

    /// Type text with generic arguments and array brackets stripped.
    pub fn erased_type(&self) -> Option<&str> {
        self.type_text.as_deref().map(erase_type)
    }

    /// Returns true if a call with `count` arguments can target this callable.
    pub fn accepts_arity(&self, count: usize) -> bool {
        match self.arity {
            Some(n) if self.varargs => count + 1 >= n,
            Some(n) => n == count,
            None => true,
        }
    }
}

/// Strips generic arguments, array brackets and package qualifiers from a
/// type: `java.util.List<String>[]` becomes `List`.
pub fn erase_type(type_text: &str) -> &str {
    let base = type_text.split('<').next().unwrap_or(type_text);
    let base = base.split('[').next().unwrap_or(base).trim();
    base.rsplit('.').next().unwrap_or(base).trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_visibility_order_and_parse() {
        assert!(Visibility::Private < Visibility::PackagePrivate);
        assert!(Visibility::Protected < Visibility::Public);
        assert_eq!(Visibility::parse("package"), Some(Visibility::PackagePrivate));
        assert_eq!(Visibility::parse("protected"), Some(Visibility::Protected));
        assert_eq!(Visibility::parse("friend"), None);
        assert_eq!(
            Visibility::from_modifiers("@Deprecated public static"),
            Some(Visibility::Public)
        );
        assert_eq!(Visibility::from_modifiers("static final"), None);
    }

    #[test]
    fn test_erase_type() {
        assert_eq!(erase_type("java.util.List<String>"), "List");
        assert_eq!(erase_type("int[]"), "int");
        assert_eq!(erase_type("Map<K, List<V>>"), "Map");
        assert_eq!(erase_type("Outer.Inner"), "Inner");
    }

    #[test]
    fn test_accepts_arity() {
        let mut decl = Declaration::new(
            "log",
            DeclarationKind::Method,
            "A.java",
            TextRange::new(0, 10),
            TextRange::new(0, 3),
        );
        decl.arity = Some(2);
        assert!(decl.accepts_arity(2));
        assert!(!decl.accepts_arity(3));

        decl.varargs = true;
        assert!(decl.accepts_arity(1));
        assert!(decl.accepts_arity(5));
        assert!(!decl.accepts_arity(0));
    }

    #[test]
    fn test_namespaces() {
        assert_eq!(DeclarationKind::Enum.namespace(), Namespace::Type);
        assert_eq!(DeclarationKind::Constructor.namespace(), Namespace::Method);
        assert_eq!(DeclarationKind::Local.namespace(), Namespace::Variable);
    }
}
