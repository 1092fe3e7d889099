//! Logical path normalization
//!
//! A logical path always starts with `/`. Directory paths end with `/`.
//! Normalizing an already normalized path returns it unchanged.

use crate::error::{Error, Result};

/// The user's root directory
pub const ROOT: &str = "/";

const RESERVED: &[char] = &['*', '?', '"', '<', '>', '|', ':', '%'];

/// Validate a path and return its normalized form
pub fn normalize(path: &str) -> Result<String> {
    if path.trim().is_empty() {
        return Err(Error::InvalidPath("path is empty".into()));
    }
    if path == ROOT {
        return Ok(ROOT.to_string());
    }

    let normalized = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    };

    if normalized.contains("//") {
        return Err(invalid(path, "empty segment"));
    }
    if normalized.contains("..") {
        return Err(invalid(path, "'..' is not allowed"));
    }
    if normalized.contains('\\') {
        return Err(invalid(path, "backslash is not allowed"));
    }
    if let Some(c) = normalized
        .chars()
        .find(|c| RESERVED.contains(c) || c.is_control())
    {
        return Err(invalid(path, &format!("character {:?} is not allowed", c)));
    }
    if normalized.split('/').any(|segment| segment == ".") {
        return Err(invalid(path, "'.' segment is not allowed"));
    }

    // A dotted directory name would read as a file name
    if is_directory(&normalized) && last_segment(&normalized).contains('.') {
        return Err(invalid(path, "directory name must not contain '.'"));
    }

    Ok(normalized)
}

/// Normalize a path that must denote a directory
pub fn normalize_directory(path: &str) -> Result<String> {
    let normalized = normalize(path)?;
    if !is_directory(&normalized) {
        return Err(invalid(path, "directory path must end with '/'"));
    }
    Ok(normalized)
}

/// Normalize a single file name (one segment, no separators)
pub fn normalize_file_name(name: &str) -> Result<String> {
    if name.contains('/') {
        return Err(invalid(name, "file name must not contain '/'"));
    }
    let normalized = normalize(name)?;
    Ok(normalized[1..].to_string())
}

/// Trailing slash marks a directory
pub fn is_directory(path: &str) -> bool {
    path.ends_with('/')
}

/// Check for the root path
pub fn is_root(path: &str) -> bool {
    path == ROOT
}

/// Append a trailing slash if missing
pub fn ensure_trailing_slash(path: &str) -> String {
    if path.ends_with('/') {
        path.to_string()
    } else {
        format!("{}/", path)
    }
}

/// Last segment of a path or key, without any trailing slash.
/// Empty for the root.
pub fn last_segment(path: &str) -> &str {
    let trimmed = path.strip_suffix('/').unwrap_or(path);
    match trimmed.rfind('/') {
        Some(pos) => &trimmed[pos + 1..],
        None => "",
    }
}

/// Directory containing `path`; the root is its own parent
pub fn parent_of(path: &str) -> String {
    let trimmed = path.strip_suffix('/').unwrap_or(path);
    match trimmed.rfind('/') {
        Some(pos) => trimmed[..=pos].to_string(),
        None => ROOT.to_string(),
    }
}

fn invalid(path: &str, reason: &str) -> Error {
    Error::InvalidPath(format!("{}: {}", path, reason))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_accepts() {
        assert_eq!(normalize("/").unwrap(), "/");
        assert_eq!(normalize("/docs/a.txt").unwrap(), "/docs/a.txt");
        assert_eq!(normalize("docs/a.txt").unwrap(), "/docs/a.txt");
        assert_eq!(normalize("/docs/sub/").unwrap(), "/docs/sub/");
        assert_eq!(normalize("/my docs/report (1).pdf").unwrap(), "/my docs/report (1).pdf");
    }

    #[test]
    fn test_normalize_rejects() {
        for bad in [
            "", "   ", "/a/../b", "/a/..", "/a//b", "//", "/a\\b", "/./a", "/a/.", "/a/./b",
            "/a*", "/a?", "/a\"", "/a<b", "/a>b", "/a|b", "/c:/x", "/100%", "/a\tb", "/a\nb",
            "/a.b/",
        ] {
            assert!(
                matches!(normalize(bad), Err(Error::InvalidPath(_))),
                "{:?} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_normalize_idempotent() {
        for path in ["/", "a", "/a/b/", "x/y.txt", "/photos/2024/"] {
            let once = normalize(path).unwrap();
            assert_eq!(normalize(&once).unwrap(), once);
        }
    }

    #[test]
    fn test_normalize_directory() {
        assert_eq!(normalize_directory("/a/b/").unwrap(), "/a/b/");
        assert_eq!(normalize_directory("/").unwrap(), "/");
        assert!(matches!(normalize_directory("/a/b"), Err(Error::InvalidPath(_))));
        assert!(matches!(normalize_directory("/a/b.c/"), Err(Error::InvalidPath(_))));
    }

    #[test]
    fn test_file_name() {
        assert_eq!(normalize_file_name("report.txt").unwrap(), "report.txt");
        assert!(normalize_file_name("a/b.txt").is_err());
        assert!(normalize_file_name("..").is_err());
        assert!(normalize_file_name("").is_err());
    }

    #[test]
    fn test_segments() {
        assert_eq!(last_segment("/docs/a.txt"), "a.txt");
        assert_eq!(last_segment("/docs/sub/"), "sub");
        assert_eq!(last_segment("/"), "");
        assert_eq!(parent_of("/docs/a.txt"), "/docs/");
        assert_eq!(parent_of("/docs/sub/"), "/docs/");
        assert_eq!(parent_of("/docs/"), "/");
        assert_eq!(parent_of("/"), "/");
    }
}
