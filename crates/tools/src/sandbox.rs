//! Sandbox: confines file tools to a single root directory.
//!
//! Paths supplied by the model are always interpreted relative to the
//! sandbox root. Absolute paths, `..` components and symlinks that resolve
//! outside the root are rejected.

use sidekick_core::error::ToolError;
use std::path::{Component, Path, PathBuf};

/// The single directory file tools may touch.
#[derive(Debug, Clone)]
pub struct Sandbox {
    root: PathBuf,
}

impl Sandbox {
    /// Open (creating if needed) a sandbox rooted at `root`.
    pub fn new(root: impl AsRef<Path>) -> std::io::Result<Self> {
        std::fs::create_dir_all(root.as_ref())?;
        let root = root.as_ref().canonicalize()?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a model-supplied path to an absolute path inside the sandbox.
    ///
    /// The target does not need to exist; its nearest existing ancestor is
    /// canonicalized so symlinked directories cannot escape the root. A
    /// dangling symlink cannot be canonicalized and is rejected.
    pub fn resolve(&self, path: &str) -> Result<PathBuf, ToolError> {
        let trimmed = path.trim();
        let relative = Path::new(trimmed);

        if relative.is_absolute() || trimmed.starts_with('/') || trimmed.starts_with('\\') {
            return Err(ToolError::SandboxViolation(format!(
                "absolute path '{path}' is not allowed; use a path relative to the sandbox"
            )));
        }

        for component in relative.components() {
            match component {
                Component::ParentDir => {
                    return Err(ToolError::SandboxViolation(format!(
                        "path traversal detected in '{path}'"
                    )));
                }
                Component::Prefix(_) | Component::RootDir => {
                    return Err(ToolError::SandboxViolation(format!(
                        "absolute path '{path}' is not allowed"
                    )));
                }
                Component::CurDir | Component::Normal(_) => {}
            }
        }

        let joined = self.root.join(relative);
        let resolved = self.canonicalize_existing_prefix(&joined)?;

        if !resolved.starts_with(&self.root) {
            return Err(ToolError::SandboxViolation(format!(
                "path '{path}' resolves outside the sandbox"
            )));
        }

        Ok(resolved)
    }

    /// Render an absolute sandbox path back to the form the model uses.
    pub fn display(&self, path: &Path) -> String {
        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        let shown = relative.to_string_lossy().replace('\\', "/");
        if shown.is_empty() { ".".into() } else { shown }
    }

    fn canonicalize_existing_prefix(&self, path: &Path) -> Result<PathBuf, ToolError> {
        let mut existing = path.to_path_buf();
        let mut rest: Vec<std::ffi::OsString> = Vec::new();

        // Does not follow the final link: a dangling symlink stops the walk
        while std::fs::symlink_metadata(&existing).is_err() {
            match (existing.file_name(), existing.parent()) {
                (Some(name), Some(parent)) => {
                    rest.push(name.to_os_string());
                    existing = parent.to_path_buf();
                }
                _ => break,
            }
        }

        let mut canonical = existing.canonicalize().map_err(|e| {
            ToolError::SandboxViolation(format!(
                "failed to resolve '{}': {e}",
                existing.display()
            ))
        })?;
        for name in rest.into_iter().rev() {
            canonical.push(name);
        }
        Ok(canonical)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_paths_resolve_inside_root() {
        let dir = tempfile::tempdir().unwrap();
        let sandbox = Sandbox::new(dir.path()).unwrap();

        let resolved = sandbox.resolve("notes/todo.txt").unwrap();
        assert!(resolved.starts_with(sandbox.root()));
        assert_eq!(sandbox.display(&resolved), "notes/todo.txt");
        assert_eq!(sandbox.display(&sandbox.resolve(".").unwrap()), ".");
    }

    #[test]
    fn traversal_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let sandbox = Sandbox::new(dir.path()).unwrap();

        for bad in ["../etc/passwd", "a/../../b", ".."] {
            assert!(
                matches!(sandbox.resolve(bad), Err(ToolError::SandboxViolation(_))),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn absolute_paths_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let sandbox = Sandbox::new(dir.path()).unwrap();
        assert!(matches!(
            sandbox.resolve("/etc/passwd"),
            Err(ToolError::SandboxViolation(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn symlink_escape_rejected() {
        let outside = tempfile::tempdir().unwrap();
        let dir = tempfile::tempdir().unwrap();
        std::os::unix::fs::symlink(outside.path(), dir.path().join("escape")).unwrap();

        let sandbox = Sandbox::new(dir.path()).unwrap();
        assert!(matches!(
            sandbox.resolve("escape/secret.txt"),
            Err(ToolError::SandboxViolation(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn dangling_symlink_rejected() {
        let outside = tempfile::tempdir().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let target = outside.path().join("created.txt");
        std::os::unix::fs::symlink(&target, dir.path().join("link.txt")).unwrap();

        let sandbox = Sandbox::new(dir.path()).unwrap();
        assert!(matches!(
            sandbox.resolve("link.txt"),
            Err(ToolError::SandboxViolation(_))
        ));
        assert!(matches!(
            sandbox.resolve("link.txt/inner"),
            Err(ToolError::SandboxViolation(_))
        ));
        assert!(!target.exists());
    }

    #[cfg(unix)]
    #[test]
    fn symlink_inside_root_allowed() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("real.txt"), "hi").unwrap();
        std::os::unix::fs::symlink(dir.path().join("real.txt"), dir.path().join("alias.txt"))
            .unwrap();

        let sandbox = Sandbox::new(dir.path()).unwrap();
        let resolved = sandbox.resolve("alias.txt").unwrap();
        assert_eq!(sandbox.display(&resolved), "real.txt");
    }

    #[test]
    fn creates_missing_root() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("nested/sandbox");
        let sandbox = Sandbox::new(&root).unwrap();
        assert!(sandbox.root().is_dir());
    }
}
