// src/watch/path_utils.rs

//! Utility functions for path handling in the watcher and the engine.

use std::path::{Component, Path, PathBuf};

/// Convert a path into a string relative to `root`, with forward slashes.
///
/// Tries a direct `strip_prefix(root)` first and falls back to comparing
/// canonicalized paths (symlinked roots). Returns `None` if the path cannot
/// be related to `root`.
pub fn relative_str(root: &Path, path: &Path) -> Option<String> {
    if let Ok(rel) = path.strip_prefix(root) {
        return Some(rel.to_string_lossy().replace('\\', "/"));
    }

    if let (Ok(root_canon), Ok(path_canon)) = (root.canonicalize(), path.canonicalize()) {
        if let Ok(rel) = path_canon.strip_prefix(&root_canon) {
            return Some(rel.to_string_lossy().replace('\\', "/"));
        }
    }

    None
}

/// Render a path with forward slashes for pattern matching.
pub fn slash_str(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

/// Join a user supplied relative path onto `root`, refusing anything that
/// would step outside of it (`..`, absolute components).
pub fn confined_join(root: &Path, rel: &str) -> Option<PathBuf> {
    let mut out = root.to_path_buf();
    for component in Path::new(rel.trim_start_matches('/')).components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(out)
}

/// Name of the workspace owning a rule file: the file's directory relative
/// to the workspace home.
pub fn workspace_of_rule_file(workspace_home: &Path, rule_file: &Path) -> Option<String> {
    let dir = rule_file.parent()?;
    let rel = dir.strip_prefix(workspace_home).ok()?;
    let name = rel.to_string_lossy().replace('\\', "/");
    (!name.is_empty()).then_some(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confined_join_rejects_parent_components() {
        let root = Path::new("/data/Project");
        assert_eq!(
            confined_join(root, "/out/a.txt"),
            Some(PathBuf::from("/data/Project/out/a.txt"))
        );
        assert_eq!(confined_join(root, "out/../../etc/passwd"), None);
    }

    #[test]
    fn rule_file_workspace_is_its_directory() {
        let home = Path::new("/home");
        assert_eq!(
            workspace_of_rule_file(home, Path::new("/home/Project/Sub/triggers.toml")),
            Some("Project/Sub".to_string())
        );
        assert_eq!(
            workspace_of_rule_file(home, Path::new("/home/triggers.toml")),
            None
        );
    }
}
