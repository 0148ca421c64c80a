//! Path normalization shared by the facade, the cache layer and the adapters.
//!
//! Normalized paths are relative, `/`-separated, have no `.` or `..`
//! components and no leading or trailing slash. The root is the empty string.

use crate::error::{Result, VfsError};

/// Normalize a caller-supplied path.
///
/// Backslashes are treated as separators, `.` components are dropped and
/// `..` pops the previous component. Popping past the root is an error.
pub fn normalize(path: &str) -> Result<String> {
    if path.chars().any(|c| c == '\0' || (c.is_control() && c != '\t')) {
        return Err(VfsError::InvalidPath(format!(
            "control characters are not allowed: {:?}",
            path
        )));
    }

    let unified = path.replace('\\', "/");
    let mut parts: Vec<&str> = Vec::new();

    for component in unified.split('/') {
        match component {
            "" | "." => {}
            ".." => {
                if parts.pop().is_none() {
                    return Err(VfsError::InvalidPath(format!(
                        "path is outside of the defined root: {}",
                        path
                    )));
                }
            }
            other => parts.push(other),
        }
    }

    Ok(parts.join("/"))
}

/// Parent directory of a normalized path ("" for top-level entries and the root)
pub fn dirname(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[..idx],
        None => "",
    }
}

/// Last component of a normalized path
pub fn basename(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[idx + 1..],
        None => path,
    }
}

/// Join a normalized directory and a child name
pub fn join(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", dir, name)
    }
}

/// All ancestor directories of a normalized path, nearest first, ending at the root.
pub fn ancestors(path: &str) -> Vec<&str> {
    let mut out = Vec::new();
    if path.is_empty() {
        return out;
    }
    let mut current = path;
    loop {
        current = dirname(current);
        out.push(current);
        if current.is_empty() {
            break;
        }
    }
    out
}

/// Whether `path` lies strictly below `dir`
pub fn is_descendant(path: &str, dir: &str) -> bool {
    if dir.is_empty() {
        return !path.is_empty();
    }
    path.len() > dir.len() && path.starts_with(dir) && path.as_bytes()[dir.len()] == b'/'
}

/// Whether `path` is a direct child of `dir`
pub fn is_child(path: &str, dir: &str) -> bool {
    is_descendant(path, dir) && dirname(path) == dir
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("/foo/bar/").unwrap(), "foo/bar");
        assert_eq!(normalize("foo/./bar").unwrap(), "foo/bar");
        assert_eq!(normalize("foo/../bar").unwrap(), "bar");
        assert_eq!(normalize("foo\\bar").unwrap(), "foo/bar");
        assert_eq!(normalize("//").unwrap(), "");
        assert_eq!(normalize("").unwrap(), "");
    }

    #[test]
    fn test_normalize_rejects_escape() {
        assert!(matches!(normalize("../etc"), Err(VfsError::InvalidPath(_))));
        assert!(matches!(normalize("a/../../b"), Err(VfsError::InvalidPath(_))));
        assert!(matches!(normalize("a\0b"), Err(VfsError::InvalidPath(_))));
    }

    #[test]
    fn test_dirname_basename() {
        assert_eq!(dirname("a/b/c.txt"), "a/b");
        assert_eq!(dirname("c.txt"), "");
        assert_eq!(basename("a/b/c.txt"), "c.txt");
        assert_eq!(basename("c.txt"), "c.txt");
        assert_eq!(join("", "x"), "x");
        assert_eq!(join("a", "x"), "a/x");
    }

    #[test]
    fn test_ancestors() {
        assert_eq!(ancestors("a/b/c"), vec!["a/b", "a", ""]);
        assert_eq!(ancestors("a"), vec![""]);
        assert!(ancestors("").is_empty());
    }

    #[test]
    fn test_descendants() {
        assert!(is_descendant("a/b", "a"));
        assert!(is_descendant("a/b/c", "a"));
        assert!(!is_descendant("ab", "a"));
        assert!(!is_descendant("a", "a"));
        assert!(is_descendant("a", ""));
        assert!(is_child("a/b", "a"));
        assert!(!is_child("a/b/c", "a"));
    }
}
