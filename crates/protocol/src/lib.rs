//! # LogView Protocol Library
//!
//! Wire types shared by the LogView daemon and its clients.
//!
//! The daemon serves read-only, access-controlled views of log files rooted at
//! a single directory. Every response body it produces is one of the types in
//! [`messages`], encoded as JSON. Tail streams are delivered as server-sent
//! events whose payloads are described by [`messages::TailEvent`].
//!
//! ## Example Usage
//!
//! ```rust
//! use protocol::messages::{ErrorCode, ErrorMessage};
//!
//! let err = ErrorMessage::new(ErrorCode::AccessDenied, "Access denied to file: app/x.log");
//! let json = protocol::to_json(&err).unwrap();
//! assert!(json.contains("ACCESS_DENIED"));
//! ```
//!
//! ## Modules
//!
//! - [`messages`]: Response bodies and error payloads
//! - [`error`]: Error types

pub mod error;
pub mod messages;

pub use error::{ProtocolError, Result};
pub use messages::{
    ErrorCode, ErrorMessage, FileContentResponse, FileEntry, FileListResponse, GroupInfo,
    GroupsResponse, HealthStatus, ServiceInfo, TailEvent, UserInfoResponse,
};

/// Serialize a wire type to a JSON string.
pub fn to_json<T: serde::Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(value)?)
}
