//! Container resolution: where moved files go.
//!
//! A [`MoveDestination`] names a target package plus a placement policy.
//! The [`ContainerResolver`] turns it into a directory for each moved file,
//! using the configured source roots and the roots implied by where
//! existing files live.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::config::RefactorSettings;
use crate::error::{RefactorError, Result};
use crate::scope::ProgramIndex;

/// How moved files are distributed over source roots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Placement {
    /// Each file stays under the source root it came from.
    PreserveSourceFolder,
    /// Every file goes under the given source root.
    SourceRoot(PathBuf),
}

/// A target package and placement policy for moved classes and packages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveDestination {
    pub package: String,
    pub placement: Placement,
}

impl MoveDestination {
    /// Moves into `package`, keeping each file under its own source root.
    pub fn source_folder_preserving(package: impl Into<String>) -> Self {
        Self {
            package: package.into(),
            placement: Placement::PreserveSourceFolder,
        }
    }

    /// Moves into `package` under `root`.
    pub fn source_root(package: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            package: package.into(),
            placement: Placement::SourceRoot(root.into()),
        }
    }
}

/// Directory of a package below a source root.
pub fn package_dir(package: &str) -> PathBuf {
    package
        .split('.')
        .filter(|segment| !segment.is_empty())
        .collect()
}

/// Maps destinations to concrete directories.
#[derive(Debug, Clone)]
pub struct ContainerResolver {
    configured: Vec<PathBuf>,
    known: BTreeSet<PathBuf>,
}

impl ContainerResolver {
    /// A resolver that only knows the configured source roots.
    pub fn new(settings: &RefactorSettings) -> Self {
        let configured = settings.source_roots.clone();
        Self {
            known: configured.iter().cloned().collect(),
            configured,
        }
    }

    /// A resolver that also knows the roots implied by indexed files.
    pub fn for_index(settings: &RefactorSettings, index: &ProgramIndex) -> Self {
        let mut resolver = Self::new(settings);
        for (path, info) in index.files() {
            if let Some(root) = implied_root(path, &info.package) {
                resolver.known.insert(root);
            }
        }
        resolver
    }

    /// The source root containing `file`, whose package is `package`.
    ///
    /// The most specific configured root wins; otherwise the root is
    /// inferred from the package directories. Files under no root are
    /// reported as [`RefactorError::AmbiguousTarget`].
    pub fn source_root_of(&self, file: &Path, package: &str) -> Result<PathBuf> {
        let configured = self
            .configured
            .iter()
            .filter(|root| file.starts_with(root))
            .max_by_key(|root| root.components().count());
        if let Some(root) = configured {
            return Ok(root.clone());
        }
        implied_root(file, package).ok_or_else(|| {
            RefactorError::ambiguous(
                file.display().to_string(),
                self.configured
                    .iter()
                    .map(|r| r.display().to_string())
                    .collect(),
            )
        })
    }

    /// Directory for a file of package `file_package` moved into `package`.
    pub fn target_dir(
        &self,
        placement: &Placement,
        package: &str,
        file: &Path,
        file_package: &str,
    ) -> Result<PathBuf> {
        let root = match placement {
            Placement::PreserveSourceFolder => self.source_root_of(file, file_package)?,
            Placement::SourceRoot(root) => {
                if !self.known.contains(root) {
                    return Err(RefactorError::ambiguous(
                        root.display().to_string(),
                        self.known.iter().map(|r| r.display().to_string()).collect(),
                    ));
                }
                root.clone()
            }
        };
        Ok(root.join(package_dir(package)))
    }

    /// New path of `file` when it moves into `package`.
    pub fn target_path(
        &self,
        placement: &Placement,
        package: &str,
        file: &Path,
        file_package: &str,
    ) -> Result<PathBuf> {
        let name = file.file_name().ok_or_else(|| {
            RefactorError::InvalidConfig(format!("{} has no file name", file.display()))
        })?;
        Ok(self
            .target_dir(placement, package, file, file_package)?
            .join(name))
    }
}

/// The root implied by a file living in its package directory.
fn implied_root(file: &Path, package: &str) -> Option<PathBuf> {
    let dir = file.parent()?;
    let package_path = package_dir(package);
    if package_path.as_os_str().is_empty() {
        return Some(dir.to_path_buf());
    }
    if !dir.ends_with(&package_path) {
        return None;
    }
    let depth = package_path.components().count();
    let keep = dir.components().count().checked_sub(depth)?;
    Some(dir.components().take(keep).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(roots: &[&str]) -> RefactorSettings {
        RefactorSettings {
            source_roots: roots.iter().map(PathBuf::from).collect(),
            ..RefactorSettings::default()
        }
    }

    #[test]
    fn test_most_specific_configured_root_wins() {
        let resolver = ContainerResolver::new(&settings(&["src", "src/main/java"]));
        let root = resolver
            .source_root_of(Path::new("src/main/java/com/x/A.java"), "com.x")
            .unwrap();
        assert_eq!(root, PathBuf::from("src/main/java"));
    }

    #[test]
    fn test_root_inferred_from_package() {
        let resolver = ContainerResolver::new(&settings(&["src/main/java"]));
        let root = resolver
            .source_root_of(Path::new("lib/com/x/A.java"), "com.x")
            .unwrap();
        assert_eq!(root, PathBuf::from("lib"));
    }

    #[test]
    fn test_file_outside_every_root_is_ambiguous() {
        let resolver = ContainerResolver::new(&settings(&["src/main/java"]));
        let err = resolver
            .source_root_of(Path::new("misc/A.java"), "com.x")
            .unwrap_err();
        assert!(matches!(err, RefactorError::AmbiguousTarget { .. }));
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_target_paths() {
        let resolver = ContainerResolver::new(&settings(&["src/main/java", "src/test/java"]));
        let path = resolver
            .target_path(
                &Placement::PreserveSourceFolder,
                "com.y",
                Path::new("src/test/java/com/x/ATest.java"),
                "com.x",
            )
            .unwrap();
        assert_eq!(path, PathBuf::from("src/test/java/com/y/ATest.java"));

        let path = resolver
            .target_path(
                &Placement::SourceRoot(PathBuf::from("src/main/java")),
                "",
                Path::new("src/test/java/com/x/ATest.java"),
                "com.x",
            )
            .unwrap();
        assert_eq!(path, PathBuf::from("src/main/java/ATest.java"));

        let err = resolver
            .target_dir(
                &Placement::SourceRoot(PathBuf::from("nowhere")),
                "com.y",
                Path::new("src/main/java/com/x/A.java"),
                "com.x",
            )
            .unwrap_err();
        assert!(matches!(err, RefactorError::AmbiguousTarget { .. }));
    }
}
