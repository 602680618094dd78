//! Read-only file operations anchored at the served root.
//!
//! This module provides:
//! - Path resolution that refuses to leave the root
//! - Directory listing filtered per entry by the access policy
//! - Paginated line reads and whole-file downloads
//! - Tail-follow streams of newly appended lines
//!
//! # Security
//!
//! Every input path goes through [`RootResolver`] before any I/O, and
//! authorization is decided on the canonical root-relative path, never on
//! the raw input.

use std::fs;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::access::AccessPolicy;

pub mod browser;
pub mod reader;
pub mod resolver;
pub mod tail;

pub use browser::DirectoryLister;
pub use reader::{Download, Page, PageReader};
pub use resolver::RootResolver;
pub use tail::{TailFollower, TailSession, TailStream};

/// Errors returned by the file operations.
#[derive(Debug, Error)]
pub enum FileError {
    /// The requested path escapes the served root.
    #[error("path is outside the served root: {0}")]
    OutOfBoundsPath(String),

    /// No group grants the user access to the path.
    #[error("access denied to {0}")]
    AccessDenied(String),

    #[error("path not found: {0}")]
    NotFound(String),

    #[error("not a directory: {0}")]
    NotADirectory(String),

    #[error("not a file: {0}")]
    NotAFile(String),

    /// File exceeds the configured size limit.
    #[error("file too large: {size} bytes exceeds limit of {limit} bytes")]
    TooLarge { size: u64, limit: u64 },

    /// The operating system refused access.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Start line below 1.
    #[error("invalid line range: start_line must be >= 1, got {0}")]
    InvalidRange(usize),

    /// A tailed file shrank below the read position.
    #[error("file truncated: {path} shrank to {len} bytes below offset {offset}")]
    Truncated { path: PathBuf, len: u64, offset: u64 },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// A regular file the user has been authorized to read.
#[derive(Debug)]
pub(crate) struct AuthorizedFile {
    pub path: PathBuf,
    pub relative_path: String,
    pub metadata: fs::Metadata,
}

/// Shared precondition chain for reads: resolve, authorize on the canonical
/// relative path, then require an existing regular file.
pub(crate) fn authorize_file(
    resolver: &RootResolver,
    policy: &AccessPolicy,
    username: &str,
    file_path: &str,
) -> Result<AuthorizedFile, FileError> {
    let (path, relative_path) = resolver.resolve_relative(file_path)?;

    if !policy.can_access(username, &relative_path) {
        tracing::warn!(username = %username, path = %relative_path, "Access denied");
        return Err(FileError::AccessDenied(file_path.to_string()));
    }

    let metadata = fs::metadata(&path).map_err(|e| FileError::from_io(e, file_path))?;
    if !metadata.is_file() {
        return Err(FileError::NotAFile(file_path.to_string()));
    }

    Ok(AuthorizedFile {
        path,
        relative_path,
        metadata,
    })
}

impl FileError {
    /// Map an I/O error on `path`, keeping permission failures distinct.
    pub(crate) fn from_io(err: io::Error, path: &str) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => FileError::NotFound(path.to_string()),
            io::ErrorKind::PermissionDenied => FileError::PermissionDenied(path.to_string()),
            _ => FileError::Io(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_io_kinds() {
        let err = FileError::from_io(io::Error::from(io::ErrorKind::NotFound), "a.log");
        assert!(matches!(err, FileError::NotFound(p) if p == "a.log"));

        let err = FileError::from_io(io::Error::from(io::ErrorKind::PermissionDenied), "a.log");
        assert!(matches!(err, FileError::PermissionDenied(_)));

        let err = FileError::from_io(io::Error::other("disk"), "a.log");
        assert!(matches!(err, FileError::Io(_)));
    }

    #[test]
    fn test_too_large_display() {
        let err = FileError::TooLarge { size: 10, limit: 5 };
        assert_eq!(
            err.to_string(),
            "file too large: 10 bytes exceeds limit of 5 bytes"
        );
    }
}
