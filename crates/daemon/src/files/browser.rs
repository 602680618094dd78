//! Directory listing filtered by the access policy.
//!
//! Each child of a listed directory is checked on its own: a directory may
//! hold entries visible to a user next to entries hidden from that same user.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;

use nix::unistd::{access, AccessFlags};
use protocol::messages::FileEntry;

use super::{FileError, RootResolver};
use crate::access::AccessPolicy;

/// Lists directories below the served root.
#[derive(Debug, Clone)]
pub struct DirectoryLister {
    resolver: Arc<RootResolver>,
    policy: Arc<AccessPolicy>,
}

impl DirectoryLister {
    pub fn new(resolver: Arc<RootResolver>, policy: Arc<AccessPolicy>) -> Self {
        Self { resolver, policy }
    }

    /// List the entries of `directory` the user may see, sorted by name.
    ///
    /// A user with no group memberships gets an empty listing without any
    /// filesystem access. Entries whose metadata cannot be read, and symlinks
    /// whose target leaves the root, are left out.
    pub fn list(&self, username: &str, directory: &str) -> Result<Vec<FileEntry>, FileError> {
        if !self.policy.has_any_group(username) {
            tracing::debug!(username = %username, "User has no groups, empty listing");
            return Ok(Vec::new());
        }

        let resolved = self.resolver.resolve(directory)?;
        let metadata = fs::metadata(&resolved).map_err(|e| FileError::from_io(e, directory))?;
        if !metadata.is_dir() {
            return Err(FileError::NotADirectory(directory.to_string()));
        }

        let entries = fs::read_dir(&resolved).map_err(|e| FileError::from_io(e, directory))?;

        let mut results = Vec::new();
        for entry_result in entries {
            let entry = match entry_result {
                Ok(e) => e,
                Err(_) => continue, // Skip entries we can't read
            };

            let name = entry.file_name().to_string_lossy().to_string();
            if let Some(file_entry) = self.visible_entry(username, &resolved, &name) {
                results.push(file_entry);
            }
        }

        results.sort_by(|a, b| a.name.cmp(&b.name));

        tracing::debug!(
            username = %username,
            directory = %directory,
            entries = results.len(),
            "Directory listed"
        );
        Ok(results)
    }

    /// Build the entry for `name` inside `dir` if the user may see it.
    fn visible_entry(&self, username: &str, dir: &Path, name: &str) -> Option<FileEntry> {
        let path = dir.join(name);
        let relative_path = self.resolver.relativize(&path).ok()?;

        // Authorize on the canonical target, the same path a read would use.
        let canonical = fs::canonicalize(&path).ok()?;
        let canonical_relative = match self.resolver.relativize(&canonical) {
            Ok(relative) => relative,
            Err(_) => {
                tracing::debug!(path = %relative_path, "Skipping symlink leaving served root");
                return None;
            }
        };
        if !self.policy.can_access(username, &canonical_relative) {
            return None;
        }

        let metadata = fs::metadata(&canonical).ok()?;
        let modified = metadata
            .modified()
            .unwrap_or(SystemTime::UNIX_EPOCH)
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);

        Some(FileEntry {
            name: name.to_string(),
            relative_path,
            size: metadata.len(),
            modified,
            is_file: metadata.is_file(),
            is_readable: access(&canonical, AccessFlags::R_OK).is_ok(),
        })
    }
}
