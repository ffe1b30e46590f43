//! References: usage sites of declarations.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::span::{Span, TextRange};

use super::declaration::DeclarationId;

/// How a reference reaches its declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReferenceContext {
    /// A simple name in an expression (`count`, `helper()`).
    Unqualified,
    /// Member access through an instance (`this.count`, `order.total()`).
    Instance,
    /// Member access through a type name (`Util.MAX`, `Util.parse()`).
    Static,
    /// A fully qualified type name in code (`com.example.Util`).
    Qualified,
    /// A simple type name in a declaration or cast.
    Type,
    /// The type of an instance creation expression (`new Util()`).
    Construction,
    /// An import declaration.
    Import,
    /// The type of an `instanceof` check.
    InstanceOf,
    /// A bare `this` expression referring to the enclosing class.
    This,
}

impl ReferenceContext {
    /// Returns true for references that name a type.
    pub fn is_type_usage(&self) -> bool {
        matches!(
            self,
            ReferenceContext::Type
                | ReferenceContext::Qualified
                | ReferenceContext::Construction
                | ReferenceContext::Import
                | ReferenceContext::InstanceOf
        )
    }

    /// Returns true for member accesses carrying an explicit qualifier.
    pub fn is_qualified_member(&self) -> bool {
        matches!(self, ReferenceContext::Instance | ReferenceContext::Static)
    }
}

/// A method call or instance creation around a reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallSite {
    /// The whole call expression.
    pub expression: TextRange,
    /// From the start of the expression up to the argument list
    /// (`obj.run`, `new Util<>`).
    pub callee: TextRange,
    /// The argument list including parentheses.
    pub arguments: TextRange,
    /// Each argument expression.
    pub args: Vec<TextRange>,
}

/// A cast applied to the expression a reference heads, e.g. the
/// `(String) ` in `(String) names.get(0)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CastSite {
    /// The whole cast expression.
    pub expression: TextRange,
    /// From the opening parenthesis up to the casted value.
    pub prefix: TextRange,
    /// The cast type as written.
    pub type_text: String,
}

/// A usage of a declaration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reference {
    pub file: PathBuf,
    /// The simple name token naming the target.
    pub range: TextRange,
    pub target: DeclarationId,
    pub context: ReferenceContext,
    /// Innermost method, constructor or type containing the reference.
    pub enclosing: Option<DeclarationId>,
    /// Qualifier preceding the name, including the dot (`this.`, `com.example.`).
    pub qualifier: Option<TextRange>,
    /// Declaration the qualifier resolves to, when it is a variable.
    pub receiver: Option<DeclarationId>,
    pub call: Option<CallSite>,
    pub cast: Option<CastSite>,
}

impl Reference {
    /// Create a new reference.
    pub fn new(
        file: impl Into<PathBuf>,
        range: TextRange,
        target: DeclarationId,
        context: ReferenceContext,
    ) -> Self {
        Self {
            file: file.into(),
            range,
            target,
            context,
            enclosing: None,
            qualifier: None,
            receiver: None,
            call: None,
            cast: None,
        }
    }

    pub fn with_enclosing(mut self, enclosing: Option<DeclarationId>) -> Self {
        self.enclosing = enclosing;
        self
    }

    pub fn with_qualifier(mut self, qualifier: TextRange) -> Self {
        self.qualifier = Some(qualifier);
        self
    }

    pub fn with_receiver(mut self, receiver: DeclarationId) -> Self {
        self.receiver = Some(receiver);
        self
    }

    pub fn with_call(mut self, call: CallSite) -> Self {
        self.call = Some(call);
        self
    }

    /// The name token as a span.
    pub fn span(&self) -> Span {
        Span::new(self.file.clone(), self.range)
    }

    /// The qualifier plus the name (`this.count`, `com.example.Util`).
    pub fn qualified_range(&self) -> TextRange {
        match self.qualifier {
            Some(q) => TextRange::new(q.start, self.range.end),
            None => self.range,
        }
    }

    /// Returns true if the qualifier is exactly `this.`.
    pub fn is_this_qualified(&self, source: &str) -> bool {
        self.qualifier
            .map(|q| q.slice(source).trim_end_matches('.').trim() == "this")
            .unwrap_or(false)
    }
}

/// A textual hit outside of code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Occurrence {
    pub span: Span,
    pub kind: OccurrenceKind,
    /// The matched text.
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OccurrenceKind {
    /// Inside a comment of an indexed source file.
    Comment,
    /// Inside a non-source file.
    NonSource,
}

impl OccurrenceKind {
    pub fn name(&self) -> &'static str {
        match self {
            OccurrenceKind::Comment => "comment",
            OccurrenceKind::NonSource => "non-source file",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qualified_range() {
        let source = "this.count = 1;";
        let reference = Reference::new(
            "A.java",
            TextRange::new(5, 10),
            DeclarationId(1),
            ReferenceContext::Instance,
        )
        .with_qualifier(TextRange::new(0, 5));

        assert_eq!(reference.qualified_range(), TextRange::new(0, 10));
        assert!(reference.is_this_qualified(source));
        assert_eq!(reference.range.slice(source), "count");
    }

    #[test]
    fn test_context_classification() {
        assert!(ReferenceContext::Import.is_type_usage());
        assert!(!ReferenceContext::Unqualified.is_type_usage());
        assert!(ReferenceContext::Static.is_qualified_member());
    }
}
