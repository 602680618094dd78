//! Tail-follow streaming of appended lines.
//!
//! A tail opens the file, seeks to its current end and then polls: every
//! complete line available is yielded at once, and when nothing new is
//! there the stream sleeps for the configured interval before looking
//! again. Content present when the tail starts is never replayed.
//!
//! The stream ends when the consumer drops it, when it is cancelled, or
//! after yielding a single terminal error.

use std::fmt;
use std::io::{self, SeekFrom};
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use futures_util::stream::{self, Stream, StreamExt};
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, BufReader};
use tokio_util::sync::CancellationToken;

use super::{authorize_file, FileError, RootResolver};
use crate::access::AccessPolicy;
use crate::config::LimitsConfig;

/// Read position of one tail stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TailSession {
    pub file_path: PathBuf,
    /// Bytes consumed so far; only moves forward.
    pub byte_offset: u64,
    /// When the stream last found no new data.
    pub last_poll_at: Option<Instant>,
}

/// Starts tail streams for authorized files.
#[derive(Debug, Clone)]
pub struct TailFollower {
    resolver: Arc<RootResolver>,
    policy: Arc<AccessPolicy>,
    poll_interval: Duration,
    buffer_size: usize,
    max_line_bytes: usize,
}

impl TailFollower {
    pub fn new(resolver: Arc<RootResolver>, policy: Arc<AccessPolicy>, limits: &LimitsConfig) -> Self {
        Self {
            resolver,
            policy,
            poll_interval: limits.tail_check_interval(),
            buffer_size: limits.tail_buffer_size,
            max_line_bytes: usize::try_from(limits.max_file_size).unwrap_or(usize::MAX),
        }
    }

    /// Start following `file_path` from its current end.
    ///
    /// Fails before yielding anything if the path is out of bounds, not
    /// authorized, missing or not a regular file. Size is not checked.
    pub async fn follow(&self, username: &str, file_path: &str) -> Result<TailStream, FileError> {
        let authorized = {
            let resolver = self.resolver.clone();
            let policy = self.policy.clone();
            let username = username.to_string();
            let file_path = file_path.to_string();
            tokio::task::spawn_blocking(move || {
                authorize_file(&resolver, &policy, &username, &file_path)
            })
            .await
            .map_err(|e| FileError::Io(io::Error::other(e)))??
        };

        let mut file = File::open(&authorized.path)
            .await
            .map_err(|e| FileError::from_io(e, file_path))?;
        let byte_offset = file.seek(SeekFrom::End(0)).await?;

        tracing::info!(
            username = %username,
            path = %authorized.relative_path,
            offset = byte_offset,
            "Tail started"
        );

        let state = TailState {
            reader: BufReader::with_capacity(self.buffer_size, file),
            pending: Vec::new(),
            session: TailSession {
                file_path: authorized.path,
                byte_offset,
                last_poll_at: None,
            },
            poll_interval: self.poll_interval,
            max_line_bytes: self.max_line_bytes,
            finished: false,
        };

        Ok(TailStream {
            relative_path: authorized.relative_path,
            start_offset: byte_offset,
            inner: stream::unfold(state, next_line).boxed(),
        })
    }
}

/// Unbounded stream of lines appended to a tailed file.
pub struct TailStream {
    relative_path: String,
    start_offset: u64,
    inner: Pin<Box<dyn Stream<Item = Result<String, FileError>> + Send>>,
}

impl TailStream {
    /// Root-relative path of the tailed file.
    pub fn relative_path(&self) -> &str {
        &self.relative_path
    }

    /// File size when the tail started.
    pub fn start_offset(&self) -> u64 {
        self.start_offset
    }

    /// End the stream as soon as `token` is cancelled.
    ///
    /// The file handle is released when the stream is dropped.
    pub fn until_cancelled(self, token: CancellationToken) -> Self {
        Self {
            relative_path: self.relative_path,
            start_offset: self.start_offset,
            inner: self.inner.take_until(token.cancelled_owned()).boxed(),
        }
    }
}

impl fmt::Debug for TailStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TailStream")
            .field("relative_path", &self.relative_path)
            .field("start_offset", &self.start_offset)
            .finish_non_exhaustive()
    }
}

impl Stream for TailStream {
    type Item = Result<String, FileError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

struct TailState {
    reader: BufReader<File>,
    /// Bytes of a line whose newline has not arrived yet.
    pending: Vec<u8>,
    session: TailSession,
    poll_interval: Duration,
    /// Unterminated data beyond this is emitted as a line of its own.
    max_line_bytes: usize,
    finished: bool,
}

impl Drop for TailState {
    fn drop(&mut self) {
        tracing::debug!(
            path = %self.session.file_path.display(),
            offset = self.session.byte_offset,
            "Tail session closed"
        );
    }
}

impl TailState {
    fn fail(mut self, err: FileError) -> Option<(Result<String, FileError>, TailState)> {
        tracing::warn!(path = %self.session.file_path.display(), error = %err, "Tail ended with error");
        self.finished = true;
        Some((Err(err), self))
    }
}

async fn next_line(mut state: TailState) -> Option<(Result<String, FileError>, TailState)> {
    if state.finished {
        return None;
    }

    loop {
        match state.reader.read_until(b'\n', &mut state.pending).await {
            Ok(0) => {
                let len = match state.reader.get_ref().metadata().await {
                    Ok(metadata) => metadata.len(),
                    Err(e) => return state.fail(FileError::Io(e)),
                };
                if len < state.session.byte_offset {
                    let err = FileError::Truncated {
                        path: state.session.file_path.clone(),
                        len,
                        offset: state.session.byte_offset,
                    };
                    return state.fail(err);
                }

                state.session.last_poll_at = Some(Instant::now());
                tokio::time::sleep(state.poll_interval).await;
            }
            Ok(n) => {
                state.session.byte_offset += n as u64;
                if state.pending.last() == Some(&b'\n') {
                    let line = String::from_utf8_lossy(&state.pending)
                        .trim_end_matches(['\r', '\n'])
                        .to_string();
                    state.pending.clear();
                    return Some((Ok(line), state));
                }
                if state.pending.len() > state.max_line_bytes {
                    tracing::debug!(
                        path = %state.session.file_path.display(),
                        bytes = state.pending.len(),
                        "Emitting oversized unterminated line"
                    );
                    let line = String::from_utf8_lossy(&state.pending).into_owned();
                    state.pending.clear();
                    return Some((Ok(line), state));
                }
                // Partial line at EOF; wait for the rest.
            }
            Err(e) => return state.fail(FileError::Io(e)),
        }
    }
}
