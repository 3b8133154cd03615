use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;

use crate::error::{Result, StoreError};

/// Longest key accepted, in bytes (the S3 limit).
pub const MAX_KEY_LEN: usize = 1024;

/// First path segment reserved for version-control metadata.
pub const RESERVED_SEGMENT: &str = ".git";

/// A validated object key.
///
/// Keys map one-to-one onto relative paths under the vault root: the key
/// `photos/2024/a.jpg` is the file `<root>/photos/2024/a.jpg`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey(String);

impl ObjectKey {
    pub fn parse(key: &str) -> Result<Self> {
        let invalid = |reason| StoreError::InvalidKey {
            key: key.to_string(),
            reason,
        };

        if key.is_empty() {
            return Err(invalid("key is empty"));
        }
        if key.len() > MAX_KEY_LEN {
            return Err(invalid("key is longer than 1024 bytes"));
        }
        if key.contains('\0') || key.contains('\\') {
            return Err(invalid("key contains a NUL byte or backslash"));
        }
        if key.starts_with('/') {
            return Err(invalid("key starts with '/'"));
        }
        if key.ends_with('/') {
            return Err(invalid("key ends with '/'"));
        }

        for (idx, segment) in key.split('/').enumerate() {
            match segment {
                "" => return Err(invalid("key contains an empty segment")),
                "." | ".." => return Err(invalid("key contains a relative segment")),
                RESERVED_SEGMENT if idx == 0 => {
                    return Err(invalid("key is inside the reserved .git directory"))
                }
                _ => {}
            }
        }

        Ok(Self(key.to_string()))
    }

    /// Rebuild a key from a path relative to the vault root.
    ///
    /// Returns `None` for paths that could never have been produced by
    /// [`ObjectKey::to_relative_path`] (non UTF-8 names, reserved segments).
    pub fn from_relative_path(path: &Path) -> Option<Self> {
        let mut segments = Vec::new();
        for component in path.components() {
            match component {
                Component::Normal(name) => segments.push(name.to_str()?),
                _ => return None,
            }
        }
        Self::parse(&segments.join("/")).ok()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn to_relative_path(&self) -> PathBuf {
        self.0.split('/').collect()
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ObjectKey {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl AsRef<str> for ObjectKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
