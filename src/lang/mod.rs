//! Language abstraction over tree-sitter grammars.

pub mod java;

pub use java::Java;

use crate::error::{RefactorError, Result};
use std::path::Path;
use tree_sitter::{Language as TsLanguage, Parser, Query, Tree};

/// A programming language the indexer can parse.
pub trait Language: Send + Sync {
    /// Returns the name of the language.
    fn name(&self) -> &'static str;

    /// Returns the file extensions associated with this language.
    fn extensions(&self) -> &[&'static str];

    /// Returns the tree-sitter language grammar.
    fn grammar(&self) -> TsLanguage;

    /// Parses source code into a tree-sitter AST.
    fn parse(&self, source: &str) -> Result<Tree> {
        let mut parser = Parser::new();
        parser
            .set_language(&self.grammar())
            .map_err(|e| RefactorError::Parse {
                path: Path::new("<source>").to_path_buf(),
                message: format!("Failed to set language: {e}"),
            })?;

        parser.parse(source, None).ok_or_else(|| RefactorError::Parse {
            path: Path::new("<source>").to_path_buf(),
            message: "Failed to parse source".to_string(),
        })
    }

    /// Creates a tree-sitter query for this language.
    fn query(&self, pattern: &str) -> Result<Query> {
        Ok(Query::new(&self.grammar(), pattern)?)
    }

    /// Checks if this language handles the given file extension.
    fn matches_extension(&self, ext: &str) -> bool {
        self.extensions().iter().any(|e| e.eq_ignore_ascii_case(ext))
    }

    /// Checks if this language handles the given path.
    fn matches_path(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| self.matches_extension(ext))
            .unwrap_or(false)
    }
}
