//! Protocol message definitions for LogView.
//!
//! This module defines the response bodies returned by the daemon. All
//! messages are serialized as JSON.

use serde::{Deserialize, Serialize};

/// Basic service information returned by the root endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceInfo {
    /// Application name.
    pub application: String,
    /// Application version.
    pub version: String,
    /// Short description.
    pub description: String,
}

/// Health probe body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
}

impl HealthStatus {
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
        }
    }
}

/// The authenticated user and the groups they belong to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfoResponse {
    pub username: String,
    pub groups: Vec<String>,
}

/// A single visible entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// Entry name (not full path).
    pub name: String,
    /// Path relative to the served root, `/`-separated.
    pub relative_path: String,
    /// Size in bytes.
    pub size: u64,
    /// Last modified timestamp (Unix epoch seconds).
    pub modified: u64,
    /// Whether the entry is a regular file.
    pub is_file: bool,
    /// Whether the daemon process can read the entry.
    pub is_readable: bool,
}

/// Response to a directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileListResponse {
    /// Accessible entries, sorted by name.
    pub files: Vec<FileEntry>,
    /// Directory that was listed, as requested.
    pub directory: String,
    /// Groups the user belongs to.
    pub user_groups: Vec<String>,
}

/// A page of file content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileContentResponse {
    /// Lines of the page, line terminators removed.
    pub content: Vec<String>,
    /// File path, as requested.
    pub file_path: String,
    /// First line of the page (1-based).
    pub start_line: usize,
    /// Effective page size after defaulting and clamping.
    pub page_size: usize,
    /// Total lines in the file at read time.
    pub total_lines: usize,
    /// Whether lines exist beyond this page.
    pub has_more: bool,
}

/// Description of a configured group, as reported to a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupInfo {
    pub name: String,
    pub pattern: String,
    pub description: Option<String>,
    pub user_has_access: bool,
    /// Members, only disclosed to members of the group.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub users: Option<Vec<String>>,
}

/// Response describing the access-control structure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupsResponse {
    pub groups: Vec<GroupInfo>,
    pub user_groups: Vec<String>,
    pub base_path: String,
}

/// Event carried by a tail stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum TailEvent {
    /// A newly appended line.
    Line(String),
    /// Terminal error; no further events follow.
    Error(ErrorMessage),
}

impl TailEvent {
    /// Server-sent event name for this event. Lines use the default event.
    pub fn event_name(&self) -> Option<&'static str> {
        match self {
            TailEvent::Line(_) => None,
            TailEvent::Error(_) => Some("error"),
        }
    }

    /// JSON payload written to the `data:` field of the event.
    pub fn data(&self) -> crate::Result<String> {
        match self {
            TailEvent::Line(line) => crate::to_json(line),
            TailEvent::Error(err) => crate::to_json(err),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TailEvent::Error(_))
    }
}

/// Error payload returned for failed requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorMessage {
    /// Error code.
    pub code: ErrorCode,
    /// Human-readable error message.
    pub message: String,
}

impl ErrorMessage {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Error codes for the failure taxonomy of the file service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// No identity supplied with the request.
    Unauthorized,
    /// Requested path escapes the served root.
    OutOfBoundsPath,
    /// No group grants the user access to the path.
    AccessDenied,
    /// Path does not exist.
    NotFound,
    /// Path exists but is not a directory.
    NotADirectory,
    /// Path exists but is not a regular file.
    NotAFile,
    /// File exceeds the configured size limit.
    TooLarge,
    /// The filesystem denied the operation.
    PermissionDenied,
    /// Operating system failure while reading.
    IoError,
    /// Invalid request or parameters.
    InvalidRequest,
    /// Server-side error.
    InternalError,
}

impl ErrorCode {
    /// Whether retrying the same request could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorCode::IoError | ErrorCode::InternalError)
    }
}
