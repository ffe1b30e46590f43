//! Java language support.

use super::Language;
use tree_sitter::Language as TsLanguage;

/// Java programming language.
pub struct Java;

impl Language for Java {
    fn name(&self) -> &'static str {
        "java"
    }

    fn extensions(&self) -> &[&'static str] {
        &["java"]
    }

    fn grammar(&self) -> TsLanguage {
        tree_sitter_java::LANGUAGE.into()
    }
}

const KEYWORDS: &[&str] = &[
    "abstract", "assert", "boolean", "break", "byte", "case", "catch", "char", "class", "const",
    "continue", "default", "do", "double", "else", "enum", "extends", "final", "finally",
    "float", "for", "goto", "if", "implements", "import", "instanceof", "int", "interface",
    "long", "native", "new", "package", "private", "protected", "public", "return", "short",
    "static", "strictfp", "super", "switch", "synchronized", "this", "throw", "throws",
    "transient", "try", "void", "volatile", "while", "true", "false", "null", "_",
];

/// Returns true if `name` is a reserved word.
pub fn is_keyword(name: &str) -> bool {
    KEYWORDS.contains(&name)
}

/// Returns true if `name` is a legal simple identifier.
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    let valid_start = matches!(chars.next(), Some(c) if c.is_alphabetic() || c == '_' || c == '$');
    valid_start && chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$') && !is_keyword(name)
}

/// Returns true if `name` is a legal dotted package or class name.
pub fn is_qualified_name(name: &str) -> bool {
    !name.is_empty() && name.split('.').all(is_identifier)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifiers() {
        assert!(is_identifier("total"));
        assert!(is_identifier("$tmp_1"));
        assert!(!is_identifier("1abc"));
        assert!(!is_identifier("class"));
        assert!(!is_identifier(""));
        assert!(!is_identifier("a.b"));
    }

    #[test]
    fn test_qualified_names() {
        assert!(is_qualified_name("com.example.util"));
        assert!(!is_qualified_name("com..util"));
        assert!(!is_qualified_name("com.new.util"));
    }
}
