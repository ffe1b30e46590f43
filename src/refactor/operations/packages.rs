//! Renaming and moving whole packages.

use std::path::{Path, PathBuf};

use crate::container::package_dir;
use crate::error::Result;
use crate::refactor::conflict::{Conflict, ConflictKind};
use crate::scope::{Declaration, DeclarationKind};

use super::context::{PlanBuilder, PlanContext};

/// Renames `package` and its sub-packages to `new_name`, rewriting package
/// clauses, imports and qualified names. `target_dir` maps each file
/// (with its old and new package) to its new directory, or `None` to leave
/// it where it is.
pub(crate) fn rewrite_package(
    ctx: &PlanContext<'_>,
    builder: &mut PlanBuilder,
    package: &Declaration,
    new_name: &str,
    mut target_dir: impl FnMut(&Path, &str, &str) -> Result<Option<PathBuf>>,
) -> Result<()> {
    let old = package.qualified_name.as_str();
    if new_name.starts_with(&format!("{}.", old)) {
        builder.conflict(
            Conflict::blocking(
                ConflictKind::IncompatibleTarget,
                format!("package '{}' cannot be moved into itself", old),
            )
            .with_declaration(package.id),
        );
        return Ok(());
    }

    let affected: Vec<&Declaration> = ctx
        .index
        .declarations()
        .filter(|d| d.kind == DeclarationKind::Package)
        .filter(|d| d.qualified_name == old || d.qualified_name.starts_with(&format!("{}.", old)))
        .collect();

    for pkg in affected {
        ctx.checkpoint()?;
        let renamed = format!("{}{}", new_name, &pkg.qualified_name[old.len()..]);
        if let Some(existing) = ctx.index.package(&renamed) {
            builder.conflict(
                Conflict::blocking(
                    ConflictKind::NameCollision,
                    format!("package '{}' already exists", renamed),
                )
                .with_declaration(existing)
                .with_declaration(pkg.id),
            );
        }

        builder.replace(&pkg.file, pkg.name_range, renamed.as_str());
        for r in ctx.references(pkg.id) {
            builder.replace(&r.file, r.range, renamed.as_str());
        }

        let files: Vec<&PathBuf> = ctx
            .index
            .files()
            .filter(|(_, info)| info.package == pkg.qualified_name)
            .map(|(path, _)| path)
            .collect();
        for path in files {
            let Some(dir) = target_dir(path, &pkg.qualified_name, &renamed)? else {
                continue;
            };
            let Some(name) = path.file_name() else {
                continue;
            };
            let to = dir.join(name);
            if to == *path {
                continue;
            }
            if ctx.storage.exists(&to) {
                builder.conflict(ctx.detector().existing_file(&to));
            }
            builder.relocate(path.clone(), to);
        }
    }
    Ok(())
}

/// New directory of a file whose directory mirrors `old_package`, with the
/// package part replaced by `new_package`.
pub(crate) fn mirrored_dir(file: &Path, old_package: &str, new_package: &str) -> Option<PathBuf> {
    let dir = file.parent()?;
    let old_path = package_dir(old_package);
    if !dir.ends_with(&old_path) {
        return None;
    }
    let keep = dir.components().count() - old_path.components().count();
    let root: PathBuf = dir.components().take(keep).collect();
    Some(root.join(package_dir(new_package)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mirrored_dir() {
        assert_eq!(
            mirrored_dir(Path::new("src/com/x/A.java"), "com.x", "org.y.z"),
            Some(PathBuf::from("src/org/y/z"))
        );
        assert_eq!(mirrored_dir(Path::new("misc/A.java"), "com.x", "org.y"), None);
    }
}
