//! Paginated line reads and whole-file downloads.
//!
//! A page is read with two passes over one file handle: the first counts
//! every line, the second skips to the requested start and collects the
//! window. A file that is appended to between the passes can report a
//! `total_lines` that disagrees with the returned window; callers get the
//! count as of the first pass.

use std::fs::File;
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::sync::Arc;

use super::{authorize_file, FileError, RootResolver};
use crate::access::AccessPolicy;
use crate::config::LimitsConfig;

/// A window of consecutive lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub lines: Vec<String>,
    pub start_line: usize,
    /// Effective page size after defaulting and clamping.
    pub page_size: usize,
    pub total_lines: usize,
    pub has_more: bool,
}

/// An authorized file opened for download.
#[derive(Debug)]
pub struct Download {
    pub file: File,
    pub size: u64,
    /// Final path component, used for `Content-Disposition`.
    pub file_name: String,
    pub relative_path: String,
}

/// Reads pages of lines from files below the served root.
#[derive(Debug, Clone)]
pub struct PageReader {
    resolver: Arc<RootResolver>,
    policy: Arc<AccessPolicy>,
    limits: LimitsConfig,
}

impl PageReader {
    pub fn new(resolver: Arc<RootResolver>, policy: Arc<AccessPolicy>, limits: LimitsConfig) -> Self {
        Self {
            resolver,
            policy,
            limits,
        }
    }

    /// Page size actually used for a request.
    ///
    /// Missing or zero requests fall back to the configured default; larger
    /// requests are clamped to the configured maximum.
    pub fn effective_page_size(&self, requested: Option<usize>) -> usize {
        requested
            .filter(|&n| n > 0)
            .unwrap_or(self.limits.default_page_size)
            .min(self.limits.max_page_size)
    }

    /// Read up to one page of lines starting at `start_line` (1-based).
    ///
    /// Checks, in order: path bounds, authorization, existence, regular
    /// file, size limit. Line terminators are trimmed and invalid UTF-8 is
    /// replaced.
    pub fn read_page(
        &self,
        username: &str,
        file_path: &str,
        start_line: usize,
        page_size: Option<usize>,
    ) -> Result<Page, FileError> {
        if start_line < 1 {
            return Err(FileError::InvalidRange(start_line));
        }
        let page_size = self.effective_page_size(page_size);

        let (file, relative_path, _) = self.open_checked(username, file_path)?;
        let mut reader = BufReader::new(file);

        let total_lines = count_lines(&mut reader)?;

        reader.seek(SeekFrom::Start(0))?;
        let mut buf = Vec::new();
        for _ in 1..start_line {
            buf.clear();
            if reader.read_until(b'\n', &mut buf)? == 0 {
                break;
            }
        }

        let mut lines = Vec::with_capacity(page_size.min(total_lines));
        while lines.len() < page_size {
            buf.clear();
            if reader.read_until(b'\n', &mut buf)? == 0 {
                break;
            }
            let line = String::from_utf8_lossy(&buf);
            lines.push(line.trim_end_matches(['\r', '\n']).to_string());
        }

        let has_more = start_line + lines.len() - 1 < total_lines;

        tracing::debug!(
            username = %username,
            path = %relative_path,
            start_line,
            returned = lines.len(),
            total_lines,
            "Page read"
        );

        Ok(Page {
            lines,
            start_line,
            page_size,
            total_lines,
            has_more,
        })
    }

    /// Open a whole file for download, with the same checks as [`read_page`].
    ///
    /// [`read_page`]: PageReader::read_page
    pub fn open_download(&self, username: &str, file_path: &str) -> Result<Download, FileError> {
        let (file, relative_path, size) = self.open_checked(username, file_path)?;
        let file_name = relative_path
            .rsplit('/')
            .next()
            .unwrap_or(relative_path.as_str())
            .to_string();

        tracing::info!(username = %username, path = %relative_path, size, "Download started");
        Ok(Download {
            file,
            size,
            file_name,
            relative_path,
        })
    }

    fn open_checked(&self, username: &str, file_path: &str) -> Result<(File, String, u64), FileError> {
        let authorized = authorize_file(&self.resolver, &self.policy, username, file_path)?;

        let size = authorized.metadata.len();
        if size > self.limits.max_file_size {
            return Err(FileError::TooLarge {
                size,
                limit: self.limits.max_file_size,
            });
        }

        let file = File::open(&authorized.path).map_err(|e| FileError::from_io(e, file_path))?;
        Ok((file, authorized.relative_path, size))
    }
}

/// Count lines the way a line iterator would: a final unterminated line
/// still counts.
fn count_lines<R: BufRead>(reader: &mut R) -> Result<usize, FileError> {
    let mut count = 0;
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            return Ok(count);
        }
        count += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GroupConfig, MatchMode};
    use std::fs;
    use std::io::Read;
    use std::path::Path;
    use tempfile::TempDir;

    fn reader_with_limits(dir: &Path, limits: LimitsConfig) -> PageReader {
        let groups = vec![GroupConfig {
            name: "app".to_string(),
            pattern: "app/".to_string(),
            users: vec!["alice".to_string()],
            description: None,
        }];
        let policy = AccessPolicy::from_groups(&groups, MatchMode::Prefix).unwrap();
        let resolver = RootResolver::new(dir).unwrap();
        PageReader::new(Arc::new(resolver), Arc::new(policy), limits)
    }

    fn reader(dir: &Path) -> PageReader {
        reader_with_limits(dir, LimitsConfig::default())
    }

    fn write_lines(path: &Path, count: usize) {
        let content: String = (1..=count).map(|i| format!("line {}\n", i)).collect();
        fs::write(path, content).unwrap();
    }

    fn setup() -> TempDir {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir_all(temp_dir.path().join("app")).unwrap();
        fs::create_dir_all(temp_dir.path().join("system")).unwrap();
        write_lines(&temp_dir.path().join("app/fifteen.log"), 15);
        temp_dir
    }

    #[test]
    fn test_consecutive_pages_partition_file() {
        let temp_dir = setup();
        let reader = reader(temp_dir.path());

        let first = reader.read_page("alice", "app/fifteen.log", 1, Some(10)).unwrap();
        let second = reader.read_page("alice", "app/fifteen.log", 11, Some(10)).unwrap();

        assert_eq!(first.lines.len(), 10);
        assert!(first.has_more);
        assert_eq!(second.lines.len(), 5);
        assert!(!second.has_more);
        assert_eq!(first.total_lines, 15);
        assert_eq!(second.total_lines, 15);

        let all: Vec<String> = first.lines.into_iter().chain(second.lines).collect();
        let expected: Vec<String> = (1..=15).map(|i| format!("line {}", i)).collect();
        assert_eq!(all, expected);
    }

    #[test]
    fn test_start_beyond_end_is_empty() {
        let temp_dir = setup();
        let page = reader(temp_dir.path())
            .read_page("alice", "app/fifteen.log", 100, Some(10))
            .unwrap();

        assert!(page.lines.is_empty());
        assert!(!page.has_more);
        assert_eq!(page.total_lines, 15);
    }

    #[test]
    fn test_exact_page_boundary_has_no_more() {
        let temp_dir = setup();
        let page = reader(temp_dir.path())
            .read_page("alice", "app/fifteen.log", 6, Some(10))
            .unwrap();

        assert_eq!(page.lines.first().map(String::as_str), Some("line 6"));
        assert_eq!(page.lines.len(), 10);
        assert!(!page.has_more);
    }

    #[test]
    fn test_page_size_default_and_clamp() {
        let temp_dir = setup();
        let limits = LimitsConfig {
            default_page_size: 4,
            max_page_size: 6,
            ..LimitsConfig::default()
        };
        let reader = reader_with_limits(temp_dir.path(), limits);

        let page = reader.read_page("alice", "app/fifteen.log", 1, None).unwrap();
        assert_eq!(page.page_size, 4);
        assert_eq!(page.lines.len(), 4);

        let page = reader.read_page("alice", "app/fifteen.log", 1, Some(1000)).unwrap();
        assert_eq!(page.page_size, 6);
        assert_eq!(page.lines.len(), 6);

        assert_eq!(reader.effective_page_size(Some(0)), 4);
    }

    #[test]
    fn test_line_terminators_and_lossy_utf8() {
        let temp_dir = setup();
        fs::write(
            temp_dir.path().join("app/mixed.log"),
            b"crlf line\r\nbad \xff byte\nlast without newline".as_slice(),
        )
        .unwrap();

        let page = reader(temp_dir.path())
            .read_page("alice", "app/mixed.log", 1, Some(10))
            .unwrap();

        assert_eq!(page.total_lines, 3);
        assert_eq!(page.lines[0], "crlf line");
        assert_eq!(page.lines[1], "bad \u{fffd} byte");
        assert_eq!(page.lines[2], "last without newline");
    }

    #[test]
    fn test_empty_file() {
        let temp_dir = setup();
        fs::write(temp_dir.path().join("app/empty.log"), "").unwrap();

        let page = reader(temp_dir.path())
            .read_page("alice", "app/empty.log", 1, None)
            .unwrap();
        assert!(page.lines.is_empty());
        assert_eq!(page.total_lines, 0);
        assert!(!page.has_more);
    }

    #[test]
    fn test_precondition_order() {
        let temp_dir = setup();
        write_lines(&temp_dir.path().join("system/secret.log"), 3);
        let reader = reader(temp_dir.path());

        // Authorization comes before existence: no probing of hidden paths.
        assert!(matches!(
            reader.read_page("alice", "system/missing.log", 1, None),
            Err(FileError::AccessDenied(_))
        ));
        assert!(matches!(
            reader.read_page("alice", "system/secret.log", 1, None),
            Err(FileError::AccessDenied(_))
        ));
        assert!(matches!(
            reader.read_page("alice", "app/missing.log", 1, None),
            Err(FileError::NotFound(_))
        ));
        assert!(matches!(
            reader.read_page("alice", "app/", 1, None),
            Err(FileError::AccessDenied(_))
        ));
        fs::create_dir(temp_dir.path().join("app/subdir")).unwrap();
        assert!(matches!(
            reader.read_page("alice", "app/subdir", 1, None),
            Err(FileError::NotAFile(_))
        ));
        assert!(matches!(
            reader.read_page("alice", "../app/fifteen.log", 1, None),
            Err(FileError::OutOfBoundsPath(_))
        ));
        assert!(matches!(
            reader.read_page("alice", "app/fifteen.log", 0, None),
            Err(FileError::InvalidRange(0))
        ));
    }

    #[test]
    fn test_authorization_uses_canonical_path() {
        let temp_dir = setup();
        write_lines(&temp_dir.path().join("system/secret.log"), 3);
        let reader = reader(temp_dir.path());

        assert!(matches!(
            reader.read_page("alice", "app/../system/secret.log", 1, None),
            Err(FileError::AccessDenied(_))
        ));
        let page = reader
            .read_page("alice", "system/../app/fifteen.log", 1, Some(1))
            .unwrap();
        assert_eq!(page.lines, vec!["line 1"]);
    }

    #[test]
    fn test_missing_component_cannot_hide_symlink_escape() {
        let temp_dir = setup();
        let outside = TempDir::new().unwrap();
        fs::write(outside.path().join("shadow"), "root:secret\n").unwrap();
        std::os::unix::fs::symlink(outside.path(), temp_dir.path().join("app/logs")).unwrap();
        let reader = reader(temp_dir.path());

        for path in ["app/logs/shadow", "app/nope/../logs/shadow"] {
            assert!(
                matches!(
                    reader.read_page("alice", path, 1, None),
                    Err(FileError::OutOfBoundsPath(_))
                ),
                "path {:?}",
                path
            );
        }
        assert!(matches!(
            reader.open_download("alice", "app/nope/../logs/shadow"),
            Err(FileError::OutOfBoundsPath(_))
        ));
    }

    #[test]
    fn test_too_large() {
        let temp_dir = setup();
        let limits = LimitsConfig {
            max_file_size: 10,
            ..LimitsConfig::default()
        };
        let reader = reader_with_limits(temp_dir.path(), limits);

        assert!(matches!(
            reader.read_page("alice", "app/fifteen.log", 1, None),
            Err(FileError::TooLarge { limit: 10, .. })
        ));
        assert!(matches!(
            reader.open_download("alice", "app/fifteen.log"),
            Err(FileError::TooLarge { .. })
        ));
    }

    #[test]
    fn test_open_download() {
        let temp_dir = setup();
        let mut download = reader(temp_dir.path())
            .open_download("alice", "/app/fifteen.log")
            .unwrap();

        assert_eq!(download.file_name, "fifteen.log");
        assert_eq!(download.relative_path, "app/fifteen.log");

        let mut content = String::new();
        download.file.read_to_string(&mut content).unwrap();
        assert_eq!(content.len() as u64, download.size);
        assert!(content.starts_with("line 1\n"));
    }
}
