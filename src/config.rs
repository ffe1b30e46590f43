//! Serializable engine settings.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{RefactorError, Result};

/// File name looked up at the workspace root by [`RefactorSettings::discover`].
pub const SETTINGS_FILE: &str = ".refactor.yaml";

/// Settings shared by every refactoring of a workspace.
///
/// Overloaded factory entry points that omit search flags take their values
/// from here.
///
/// # Example YAML
///
/// ```yaml
/// source_roots:
///   - src/main/java
/// search_in_comments: true
/// search_in_non_source_files: false
/// non_source_extensions: [xml, properties]
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RefactorSettings {
    /// Source roots relative to the workspace root, most specific first.
    pub source_roots: Vec<PathBuf>,

    /// Rewrite occurrences of renamed or moved names inside comments.
    pub search_in_comments: bool,

    /// Rewrite qualified-name occurrences inside non-source files.
    pub search_in_non_source_files: bool,

    /// Extensions of files searched as non-source text.
    pub non_source_extensions: Vec<String>,

    /// Glob patterns excluded from indexing and text search.
    pub exclude_patterns: Vec<String>,

    /// Raw generic types eligible for type cooking.
    pub generic_containers: Vec<String>,
}

impl Default for RefactorSettings {
    fn default() -> Self {
        Self {
            source_roots: vec![
                PathBuf::from("src/main/java"),
                PathBuf::from("src/test/java"),
                PathBuf::from("src"),
            ],
            search_in_comments: true,
            search_in_non_source_files: true,
            non_source_extensions: [
                "xml",
                "properties",
                "yaml",
                "yml",
                "json",
                "txt",
                "md",
                "gradle",
                "kts",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            exclude_patterns: vec![
                "**/target/**".to_string(),
                "**/build/**".to_string(),
                "**/.git/**".to_string(),
            ],
            generic_containers: [
                "List",
                "ArrayList",
                "LinkedList",
                "Set",
                "HashSet",
                "TreeSet",
                "Collection",
                "Iterator",
                "Iterable",
                "Optional",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

impl RefactorSettings {
    /// Loads settings from `<root>/.refactor.yaml`, or returns defaults when
    /// the file does not exist.
    pub fn discover(root: impl AsRef<Path>) -> Result<Self> {
        let path = root.as_ref().join(SETTINGS_FILE);
        if path.is_file() {
            Self::from_yaml(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load settings from a YAML file.
    pub fn from_yaml(path: impl AsRef<Path>) -> Result<Self> {
        let content = read_settings(path.as_ref())?;
        Self::from_yaml_str(&content)
    }

    /// Parse settings from YAML text.
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let settings: Self = serde_yaml::from_str(content).map_err(|e| {
            RefactorError::InvalidConfig(format!("Failed to parse YAML settings: {}", e))
        })?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from a JSON file.
    pub fn from_json(path: impl AsRef<Path>) -> Result<Self> {
        let content = read_settings(path.as_ref())?;
        let settings: Self = serde_json::from_str(&content).map_err(|e| {
            RefactorError::InvalidConfig(format!("Failed to parse JSON settings: {}", e))
        })?;
        settings.validate()?;
        Ok(settings)
    }

    /// Save settings to a YAML file.
    pub fn to_yaml(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = serde_yaml::to_string(self).map_err(|e| {
            RefactorError::InvalidConfig(format!("Failed to serialize settings: {}", e))
        })?;
        std::fs::write(path.as_ref(), content)?;
        Ok(())
    }

    /// Returns true if `path` has one of the non-source extensions.
    pub fn is_non_source(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|ext| {
                self.non_source_extensions
                    .iter()
                    .any(|e| e.eq_ignore_ascii_case(ext))
            })
            .unwrap_or(false)
    }

    fn validate(&self) -> Result<()> {
        if self.source_roots.is_empty() {
            return Err(RefactorError::InvalidConfig(
                "at least one source root is required".to_string(),
            ));
        }
        if let Some(root) = self.source_roots.iter().find(|r| r.is_absolute()) {
            return Err(RefactorError::InvalidConfig(format!(
                "source root {} must be relative to the workspace",
                root.display()
            )));
        }
        Ok(())
    }
}

fn read_settings(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| {
        RefactorError::Io(std::io::Error::new(
            e.kind(),
            format!("Failed to read settings file {}: {}", path.display(), e),
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_search_everywhere() {
        let settings = RefactorSettings::default();
        assert!(settings.search_in_comments);
        assert!(settings.search_in_non_source_files);
        assert!(settings.is_non_source(Path::new("META-INF/beans.xml")));
        assert!(!settings.is_non_source(Path::new("src/A.java")));
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let settings = RefactorSettings::from_yaml_str(
            "search_in_comments: false\nsource_roots: [java]\n",
        )
        .unwrap();
        assert!(!settings.search_in_comments);
        assert!(settings.search_in_non_source_files);
        assert_eq!(settings.source_roots, vec![PathBuf::from("java")]);
    }

    #[test]
    fn test_rejects_empty_source_roots() {
        let err = RefactorSettings::from_yaml_str("source_roots: []\n").unwrap_err();
        assert!(matches!(err, RefactorError::InvalidConfig(_)));
    }

    #[test]
    fn test_discover_and_round_trip() {
        let dir = TempDir::new().unwrap();
        assert!(RefactorSettings::discover(dir.path()).unwrap().search_in_comments);

        let mut settings = RefactorSettings::default();
        settings.search_in_non_source_files = false;
        settings.to_yaml(dir.path().join(SETTINGS_FILE)).unwrap();

        let loaded = RefactorSettings::discover(dir.path()).unwrap();
        assert!(!loaded.search_in_non_source_files);
    }
}
