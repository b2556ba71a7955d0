//! Lexical path canonicalization.
//!
//! Graph keys must be absolute and free of `.`/`..` components. Symlinks are not
//! resolved, so two keys name the same node exactly when their spelled paths match.

use std::path::{Component, Path, PathBuf};

/// Resolve `path` against `base` and normalize it lexically.
pub fn absolutize(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        normalize(path)
    } else {
        normalize(&base.join(path))
    }
}

/// Remove `.` components and fold `..` into their parent.
///
/// `..` at the root stays at the root.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(prefix) => out.push(prefix.as_os_str()),
            Component::RootDir => out.push(Component::RootDir.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() && !out.has_root() {
                    out.push("..");
                }
            }
            Component::Normal(part) => out.push(part),
        }
    }
    out
}

/// Resolve `path` against the current working directory.
pub fn absolutize_from_cwd(path: &Path) -> std::io::Result<PathBuf> {
    if path.is_absolute() {
        return Ok(normalize(path));
    }
    Ok(absolutize(&std::env::current_dir()?, path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absolutize_relative() {
        assert_eq!(
            absolutize(Path::new("/work/App"), Path::new("../Core/./Sources")),
            PathBuf::from("/work/Core/Sources")
        );
    }

    #[test]
    fn test_absolutize_keeps_absolute() {
        assert_eq!(
            absolutize(Path::new("/work"), Path::new("/opt/lib/../libFoo.a")),
            PathBuf::from("/opt/libFoo.a")
        );
    }

    #[test]
    fn test_parent_of_root_is_root() {
        assert_eq!(normalize(Path::new("/../a")), PathBuf::from("/a"));
    }
}
