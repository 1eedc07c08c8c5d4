//! Path validation.
//!
//! A [`PathToken`] is the only form in which a path crosses the native
//! boundary: absolute, non-blank, free of interior NUL bytes. `.`/`..`
//! resolution against a working directory is the caller's job; the cluster
//! sees paths exactly as validated here.

use crate::error::{Result, StorageError};
use std::fmt;

/// A validated absolute path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PathToken(String);

impl PathToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Final path component, empty for the root.
    pub fn leaf(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or("")
    }
}

impl fmt::Display for PathToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Validate a caller-supplied path.
pub fn normalize(path: &str) -> Result<PathToken> {
    let trimmed = path.trim();
    if trimmed.is_empty() {
        return Err(StorageError::NullArgument {
            msg: "path is empty".to_string(),
        });
    }
    if !trimmed.starts_with('/') {
        return Err(StorageError::InvalidArgument {
            msg: format!("path is not absolute: {path}"),
        });
    }
    if trimmed.contains('\0') {
        return Err(StorageError::InvalidArgument {
            msg: "path contains a NUL byte".to_string(),
        });
    }
    Ok(PathToken(trimmed.to_string()))
}
