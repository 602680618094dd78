//! # LogView Daemon Library
//!
//! This crate provides a read-only, access-controlled view of the log files
//! below a single root directory.
//!
//! ## Overview
//!
//! Users are identified by an upstream proxy; the daemon decides what each
//! user may see from regex-based group definitions. It provides:
//!
//! - **Authorization**: group membership and path patterns, unioned per user
//! - **Path Safety**: every path is canonicalized and kept inside the root
//! - **Listing**: directory contents filtered entry by entry
//! - **Paging**: line windows over large files
//! - **Tailing**: live streams of appended lines
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                    HTTP transport (axum)                 │
//! ├──────────────────────────────────────────────────────────┤
//! │                       FileService                        │
//! │  ┌──────────────┐  ┌──────────────┐  ┌────────────────┐  │
//! │  │  Directory   │  │     Page     │  │      Tail      │  │
//! │  │   Lister     │  │    Reader    │  │    Follower    │  │
//! │  └──────────────┘  └──────────────┘  └────────────────┘  │
//! │  ┌────────────────────────┐  ┌────────────────────────┐  │
//! │  │     AccessPolicy       │  │     RootResolver       │  │
//! │  └────────────────────────┘  └────────────────────────┘  │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use logview::{Config, FileService};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut config = Config::load_default()?;
//!     config.apply_env_overrides();
//!     config.validate()?;
//!
//!     let service = FileService::new(Arc::new(config))?;
//!     let page = service.read_file_page("alice", "app/server.log", 1, Some(50)).await?;
//!     for line in page.lines {
//!         println!("{}", line);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`config`]: Configuration loading, defaults and validation
//! - [`access`]: Group-based authorization
//! - [`files`]: Path resolution, listing, paging and tailing
//! - [`service`]: Facade over the file operations
//! - [`http`]: Routes, identity extraction and error mapping

pub mod access;
pub mod config;
pub mod files;
pub mod http;
pub mod service;

// Re-export protocol for convenience
pub use protocol;

// Re-export config types for convenience
pub use config::{Config, ConfigError, GroupConfig, MatchMode};

pub use access::{AccessPolicy, Group};

// Re-export files types for convenience
pub use files::{
    DirectoryLister, Download, FileError, Page, PageReader, RootResolver, TailFollower,
    TailSession, TailStream,
};

pub use http::{router, AppState};
pub use service::FileService;
