//! File service facade.
//!
//! [`FileService`] owns the compiled access policy, the root resolver and
//! the three file workers, and exposes the operations the transport layer
//! calls. Blocking filesystem work runs on tokio's blocking pool.

use std::io;
use std::path::Path;
use std::sync::Arc;

use protocol::messages::{FileEntry, GroupInfo};

use crate::access::AccessPolicy;
use crate::config::{Config, ConfigError};
use crate::files::{
    DirectoryLister, Download, FileError, Page, PageReader, RootResolver, TailFollower, TailStream,
};

/// Access-controlled, read-only view of the served root.
#[derive(Debug, Clone)]
pub struct FileService {
    config: Arc<Config>,
    policy: Arc<AccessPolicy>,
    resolver: Arc<RootResolver>,
    lister: DirectoryLister,
    reader: PageReader,
    follower: TailFollower,
}

impl FileService {
    /// Build the service from a loaded configuration.
    ///
    /// Compiles every group pattern and canonicalizes the root, failing if
    /// either is invalid.
    pub fn new(config: Arc<Config>) -> Result<Self, ConfigError> {
        let policy = Arc::new(AccessPolicy::from_groups(
            &config.groups,
            config.access.match_mode,
        )?);

        let base_path = &config.server.base_path;
        if !base_path.is_dir() {
            return Err(if base_path.exists() {
                ConfigError::BasePathNotDirectory(base_path.clone())
            } else {
                ConfigError::BasePathMissing(base_path.clone())
            });
        }
        let resolver = Arc::new(
            RootResolver::new(base_path)
                .map_err(|_| ConfigError::BasePathMissing(base_path.clone()))?,
        );

        let lister = DirectoryLister::new(resolver.clone(), policy.clone());
        let reader = PageReader::new(resolver.clone(), policy.clone(), config.limits.clone());
        let follower = TailFollower::new(resolver.clone(), policy.clone(), &config.limits);

        tracing::info!(
            root = %resolver.root().display(),
            groups = config.groups.len(),
            "File service ready"
        );

        Ok(Self {
            config,
            policy,
            resolver,
            lister,
            reader,
            follower,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Canonical served root.
    pub fn root(&self) -> &Path {
        self.resolver.root()
    }

    pub fn policy(&self) -> &AccessPolicy {
        &self.policy
    }

    /// Groups the user is a member of, independent of any path.
    pub fn user_groups(&self, username: &str) -> Vec<String> {
        self.policy.user_groups(username)
    }

    /// Groups granting the user access to `file_path`.
    ///
    /// The path is resolved first so the decision is made on its canonical
    /// relative form. An empty result means no access.
    pub fn resolve_accessible_groups(
        &self,
        username: &str,
        file_path: &str,
    ) -> Result<Vec<String>, FileError> {
        let (_, relative) = self.resolver.resolve_relative(file_path)?;
        Ok(self.policy.accessible_groups(username, &relative))
    }

    /// Summaries of every configured group. Member lists are only
    /// disclosed for groups the user belongs to.
    pub fn group_summaries(&self, username: &str) -> Vec<GroupInfo> {
        self.policy
            .groups()
            .map(|group| {
                let user_has_access = group.has_member(username);
                GroupInfo {
                    name: group.name().to_string(),
                    pattern: group.pattern().to_string(),
                    description: group.description().map(str::to_string),
                    user_has_access,
                    users: user_has_access.then(|| group.members()),
                }
            })
            .collect()
    }

    pub async fn list_directory(
        &self,
        username: &str,
        directory: &str,
    ) -> Result<Vec<FileEntry>, FileError> {
        let lister = self.lister.clone();
        let username = username.to_string();
        let directory = directory.to_string();
        run_blocking(move || lister.list(&username, &directory)).await
    }

    pub async fn read_file_page(
        &self,
        username: &str,
        file_path: &str,
        start_line: usize,
        page_size: Option<usize>,
    ) -> Result<Page, FileError> {
        let reader = self.reader.clone();
        let username = username.to_string();
        let file_path = file_path.to_string();
        run_blocking(move || reader.read_page(&username, &file_path, start_line, page_size)).await
    }

    pub async fn tail_file(&self, username: &str, file_path: &str) -> Result<TailStream, FileError> {
        self.follower.follow(username, file_path).await
    }

    pub async fn open_download(&self, username: &str, file_path: &str) -> Result<Download, FileError> {
        let reader = self.reader.clone();
        let username = username.to_string();
        let file_path = file_path.to_string();
        run_blocking(move || reader.open_download(&username, &file_path)).await
    }
}

async fn run_blocking<T, F>(f: F) -> Result<T, FileError>
where
    F: FnOnce() -> Result<T, FileError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| FileError::Io(io::Error::other(e)))?
}
