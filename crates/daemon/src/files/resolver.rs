//! Root-anchored path resolution.
//!
//! Inputs are client-supplied relative paths. Resolution walks the path from
//! the root, canonicalizing each existing prefix (resolving symlinks and
//! `..`), applies the components below the first missing one lexically and
//! then requires the result to be the root or lie below it, compared
//! component by component.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use super::FileError;

/// Resolves client paths against a canonical root directory.
#[derive(Debug, Clone)]
pub struct RootResolver {
    root: PathBuf,
}

impl RootResolver {
    /// Create a resolver for `root`, which must exist.
    pub fn new<P: AsRef<Path>>(root: P) -> io::Result<Self> {
        let root = fs::canonicalize(root.as_ref())?;
        Ok(Self { root })
    }

    /// The canonical root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a client path to an absolute path inside the root.
    ///
    /// A single leading `/` is ignored, so `/app/x.log` and `app/x.log` name
    /// the same file. The result may not exist; callers check existence after
    /// authorization.
    pub fn resolve(&self, input: &str) -> Result<PathBuf, FileError> {
        let trimmed = input.strip_prefix('/').unwrap_or(input);
        let relative = Path::new(trimmed);
        if relative.has_root() {
            return Err(FileError::OutOfBoundsPath(input.to_string()));
        }

        let resolved = resolve_components(&self.root, relative, input)?;

        if !resolved.starts_with(&self.root) {
            tracing::warn!(path = %input, "Rejected path outside served root");
            return Err(FileError::OutOfBoundsPath(input.to_string()));
        }

        Ok(resolved)
    }

    /// Express a path below the root as a `/`-separated relative string.
    ///
    /// Returns an empty string for the root itself.
    pub fn relativize(&self, path: &Path) -> Result<String, FileError> {
        let relative = path
            .strip_prefix(&self.root)
            .map_err(|_| FileError::OutOfBoundsPath(path.display().to_string()))?;

        let parts: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        Ok(parts.join("/"))
    }

    /// Resolve and relativize in one step.
    pub fn resolve_relative(&self, input: &str) -> Result<(PathBuf, String), FileError> {
        let resolved = self.resolve(input)?;
        let relative = self.relativize(&resolved)?;
        Ok((resolved, relative))
    }
}

/// Walk `relative` from the canonical `root` one component at a time.
///
/// Every existing prefix is canonicalized, so symlinks and `..` are resolved
/// against what is actually on disk. Once a component is missing (or an
/// existing file is used as a directory) the rest is applied lexically, and
/// a later `..` is refused since it cannot be resolved against the disk.
fn resolve_components(root: &Path, relative: &Path, input: &str) -> Result<PathBuf, FileError> {
    let mut resolved = root.to_path_buf();
    let mut missing = false;

    for component in relative.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir if missing => {
                tracing::warn!(path = %input, "Rejected parent component below a missing path");
                return Err(FileError::OutOfBoundsPath(input.to_string()));
            }
            Component::ParentDir => {
                resolved.pop();
            }
            Component::Normal(name) if missing => resolved.push(name),
            Component::Normal(name) => {
                let candidate = resolved.join(name);
                resolved = match fs::canonicalize(&candidate) {
                    Ok(canonical) => canonical,
                    Err(e) if is_missing(&e) => {
                        missing = true;
                        candidate
                    }
                    Err(e) => return Err(FileError::from_io(e, input)),
                };
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(FileError::OutOfBoundsPath(input.to_string()));
            }
        }
    }

    Ok(resolved)
}

fn is_missing(err: &io::Error) -> bool {
    // ENOTDIR surfaces as an uncategorized kind on older toolchains.
    err.kind() == io::ErrorKind::NotFound || err.raw_os_error() == Some(20)
}
