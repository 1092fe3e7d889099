//! Logical path <-> storage key mapping
//!
//! Key layout: `<namespace><logical path>`, e.g. `user-7-files/docs/a.txt`.
//! The namespace never contains `/`, so the first `/` of a key is always
//! the start of its logical path.

use std::fmt;

use crate::config::NamespaceConfig;
use crate::error::{Error, Result};
use super::path;

const ID_PLACEHOLDER: &str = "{id}";

/// A user's key namespace (no trailing slash)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace(String);

impl Namespace {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Key of the user's root directory
    pub fn root_key(&self) -> String {
        format!("{}/", self.0)
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Translates between logical paths and storage keys
#[derive(Debug, Clone)]
pub struct KeyTranslator {
    template: String,
}

impl KeyTranslator {
    /// Create a translator from a namespace template containing `{id}`
    pub fn new(template: impl Into<String>) -> Result<Self> {
        let template = template.into();
        if template.matches(ID_PLACEHOLDER).count() != 1 {
            return Err(Error::Config(format!(
                "namespace template {:?} must contain {} exactly once",
                template, ID_PLACEHOLDER
            )));
        }
        if template.contains('/') {
            return Err(Error::Config(format!(
                "namespace template {:?} must not contain '/'",
                template
            )));
        }
        Ok(Self { template })
    }

    /// Create a translator from configuration
    pub fn from_config(config: &NamespaceConfig) -> Result<Self> {
        Self::new(config.template.clone())
    }

    /// Namespace owned by a user
    pub fn namespace(&self, user_id: u64) -> Namespace {
        Namespace(self.template.replace(ID_PLACEHOLDER, &user_id.to_string()))
    }

    /// Storage key for any logical path (file or directory)
    pub fn path_to_key(&self, ns: &Namespace, logical: &str) -> Result<String> {
        let normalized = path::normalize(logical)?;
        Ok(format!("{}{}", ns.as_str(), normalized))
    }

    /// Storage key for a logical path that must denote a directory
    pub fn directory_to_key(&self, ns: &Namespace, logical: &str) -> Result<String> {
        let normalized = path::normalize_directory(logical)?;
        Ok(format!("{}{}", ns.as_str(), normalized))
    }
}

/// Logical path of a key (namespace stripped); `/` for a namespace root
pub fn key_to_path(key: &str) -> String {
    match key.find('/') {
        Some(pos) => key[pos..].to_string(),
        None => path::ROOT.to_string(),
    }
}

/// Final segment of a key; empty for a namespace root
pub fn name_of(key: &str) -> String {
    path::last_segment(key).to_string()
}

/// Logical path of the directory containing `key`
pub fn parent_path_of(key: &str) -> String {
    path::parent_of(&key_to_path(key))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn translator() -> KeyTranslator {
        KeyTranslator::new("user-{id}-files").unwrap()
    }

    #[test]
    fn test_namespace() {
        let ns = translator().namespace(42);
        assert_eq!(ns.as_str(), "user-42-files");
        assert_eq!(ns.root_key(), "user-42-files/");
    }

    #[test]
    fn test_rejects_bad_template() {
        assert!(KeyTranslator::new("files").is_err());
        assert!(KeyTranslator::new("{id}-{id}").is_err());
        assert!(KeyTranslator::new("users/{id}").is_err());
    }

    #[test]
    fn test_path_to_key() {
        let t = translator();
        let ns = t.namespace(1);
        assert_eq!(t.path_to_key(&ns, "/docs/a.txt").unwrap(), "user-1-files/docs/a.txt");
        assert_eq!(t.path_to_key(&ns, "/").unwrap(), "user-1-files/");
        assert_eq!(t.directory_to_key(&ns, "/docs/").unwrap(), "user-1-files/docs/");
        assert!(matches!(t.path_to_key(&ns, "/a/../b"), Err(Error::InvalidPath(_))));
        assert!(matches!(t.directory_to_key(&ns, "/docs"), Err(Error::InvalidPath(_))));
    }

    #[test]
    fn test_round_trip() {
        let t = translator();
        let ns = t.namespace(9);
        for p in ["/", "/a", "a/b.txt", "/x/y/", "/photos/2024/img 1.png"] {
            let key = t.path_to_key(&ns, p).unwrap();
            assert_eq!(key_to_path(&key), path::normalize(p).unwrap());
        }
    }

    #[test]
    fn test_key_helpers() {
        assert_eq!(key_to_path("user-1-files"), "/");
        assert_eq!(key_to_path("user-1-files/"), "/");
        assert_eq!(name_of("user-1-files/docs/a.txt"), "a.txt");
        assert_eq!(name_of("user-1-files/docs/"), "docs");
        assert_eq!(name_of("user-1-files/"), "");
        assert_eq!(parent_path_of("user-1-files/docs/a.txt"), "/docs/");
        assert_eq!(parent_path_of("user-1-files/docs/"), "/");
    }
}
