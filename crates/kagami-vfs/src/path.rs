//! Virtual path handling.
//!
//! Virtual paths are `/`-separated strings anchored at the filesystem root
//! (`"/"`). They never touch the host path machinery: `.` is dropped, `..`
//! pops one segment and is clamped at the root, and repeated slashes collapse.

use crate::error::{VfsError, VfsResult};

/// The root path.
pub const ROOT: &str = "/";

/// Normalize a path into its absolute form.
///
/// Relative paths are anchored at the root. Fails on NUL bytes.
pub fn normalize(path: &str) -> VfsResult<String> {
    if path.contains('\0') {
        return Err(VfsError::invalid_path(path.replace('\0', "\\0")));
    }

    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }

    if segments.is_empty() {
        Ok(ROOT.to_string())
    } else {
        Ok(format!("/{}", segments.join("/")))
    }
}

/// Resolve `path` against `base`.
///
/// Absolute paths ignore `base`; relative ones are appended to it.
pub fn join(base: &str, path: &str) -> VfsResult<String> {
    if path.starts_with('/') {
        normalize(path)
    } else {
        normalize(&format!("{base}/{path}"))
    }
}

/// Parent of a normalized path, `None` for the root.
pub fn parent(path: &str) -> Option<&str> {
    if path == ROOT {
        return None;
    }
    match path.rfind('/') {
        Some(0) => Some(ROOT),
        Some(idx) => Some(&path[..idx]),
        None => None,
    }
}

/// Last segment of a normalized path, `None` for the root.
pub fn name(path: &str) -> Option<&str> {
    if path == ROOT {
        return None;
    }
    path.rsplit('/').next().filter(|s| !s.is_empty())
}

/// True if `path` is `ancestor` or lies beneath it. Both must be normalized.
pub fn is_within(ancestor: &str, path: &str) -> bool {
    if ancestor == ROOT {
        return true;
    }
    path == ancestor
        || path
            .strip_prefix(ancestor)
            .is_some_and(|rest| rest.starts_with('/'))
}

/// Strip the leading `/`, yielding a path relative to the root (`""` for root).
pub fn relative(path: &str) -> &str {
    path.trim_start_matches('/')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("").unwrap(), "/");
        assert_eq!(normalize("/").unwrap(), "/");
        assert_eq!(normalize("a/b").unwrap(), "/a/b");
        assert_eq!(normalize("/a//b/").unwrap(), "/a/b");
        assert_eq!(normalize("/a/./b/../c").unwrap(), "/a/c");
    }

    #[test]
    fn test_parent_dir_clamped_at_root() {
        assert_eq!(normalize("/../..").unwrap(), "/");
        assert_eq!(normalize("../etc/passwd").unwrap(), "/etc/passwd");
    }

    #[test]
    fn test_nul_is_malformed() {
        assert!(normalize("/a\0b").is_err());
    }

    #[test]
    fn test_join() {
        assert_eq!(join("/a/b", "c").unwrap(), "/a/b/c");
        assert_eq!(join("/a/b", "../c").unwrap(), "/a/c");
        assert_eq!(join("/a/b", "/x").unwrap(), "/x");
        assert_eq!(join("/", "x").unwrap(), "/x");
        assert_eq!(join("/a", "").unwrap(), "/a");
    }

    #[test]
    fn test_parent_and_name() {
        assert_eq!(parent("/"), None);
        assert_eq!(parent("/a"), Some("/"));
        assert_eq!(parent("/a/b"), Some("/a"));
        assert_eq!(name("/"), None);
        assert_eq!(name("/a/b.txt"), Some("b.txt"));
    }

    #[test]
    fn test_is_within() {
        assert!(is_within("/", "/anything"));
        assert!(is_within("/a", "/a"));
        assert!(is_within("/a", "/a/b"));
        assert!(!is_within("/a", "/ab"));
        assert!(!is_within("/a/b", "/a"));
    }

    #[test]
    fn test_relative() {
        assert_eq!(relative("/"), "");
        assert_eq!(relative("/a/b"), "a/b");
    }
}
