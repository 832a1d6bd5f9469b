//! Upload module
//!
//! Implements the multi-step upload protocol: content digest, session
//! creation with server-side dedup ("instant upload"), chunked transfer
//! through presigned per-chunk targets, part verification, and a
//! completion step that may resolve asynchronously.
//!
//! One upload is one pass through the state machine: create session →
//! either reuse (terminal) or transfer chunks 1..N → verify (multi-chunk
//! only) → finalize → possibly poll the async result. There is no
//! cancellation transition in the protocol itself; dropping the upload
//! future aborts the in-flight request and nothing is retried. A session
//! whose transfer was interrupted keeps its accepted chunks server-side,
//! so re-running the upload with unchanged content is a safe re-entry.
//!
//! # Example
//!
//! ```no_run
//! use kappa_pan::api::ApiClient;
//! use kappa_pan::config::Config;
//! use kappa_pan::upload::Uploader;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load("config.yaml")?;
//! let client = ApiClient::from_config(&config.api)?;
//!
//! let mut file = tokio::fs::File::open("backup.tar.zst").await?;
//! let outcome = Uploader::new(&client)
//!     .with_retry_limit(config.upload.retry_limit)
//!     .upload(0, "backup.tar.zst", &mut file)
//!     .await?;
//! println!("uploaded: {outcome:?}");
//! # Ok(())
//! # }
//! ```

use crate::api::{ApiClient, ApiError};
use thiserror::Error;
use tokio::fs::File;

mod chunk;
mod complete;
pub mod hasher;
mod progress;
mod session;
mod verify;

pub use complete::AsyncPollStatus;
pub use progress::{ProgressSink, UploadEvent};
pub use session::UploadSession;

/// Upload errors
#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("Chunk {sequence} rejected with HTTP status {status}")]
    ChunkRejected { sequence: u64, status: u16 },

    #[error("Chunk {sequence} failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        sequence: u64,
        attempts: u32,
        source: Box<UploadError>,
    },

    #[error("Chunk {sequence} reported by the server but never transferred")]
    PartNotFound { sequence: u64 },

    #[error("Chunk {sequence} size mismatch: sent {local} bytes, server recorded {remote}")]
    PartSizeMismatch {
        sequence: u64,
        local: u64,
        remote: u64,
    },

    #[error("Upload failed: server reported neither completion nor asynchronous merge")]
    Failed,
}

/// Shorthand for the malformed-server-response case.
pub(crate) fn protocol(message: impl Into<String>) -> UploadError {
    UploadError::Api(ApiError::Protocol(message.into()))
}

/// Terminal result of one upload invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    /// Content already existed server-side; no bytes were transferred.
    Reused { file_id: i64 },
    /// Upload finalized synchronously.
    Completed { file_id: i64 },
    /// The server is merging chunks asynchronously; poll with
    /// [`Uploader::poll_async_result`] until completed.
    AsyncPending { preupload_id: String },
}

impl UploadOutcome {
    /// The resolved file id, if the upload already has one.
    pub fn file_id(&self) -> Option<i64> {
        match self {
            UploadOutcome::Reused { file_id } | UploadOutcome::Completed { file_id } => {
                Some(*file_id)
            }
            UploadOutcome::AsyncPending { .. } => None,
        }
    }
}

/// Drives complete uploads against an [`ApiClient`].
///
/// The uploader owns no state between invocations; each call makes one
/// full pass over the protocol. The source file handle's cursor is owned
/// by the upload for its duration.
pub struct Uploader<'a> {
    client: &'a ApiClient,
    retry_limit: u32,
}

impl<'a> Uploader<'a> {
    /// Create an uploader with the default retry limit
    pub fn new(client: &'a ApiClient) -> Self {
        Self {
            client,
            retry_limit: crate::config::UploadConfig::default().retry_limit,
        }
    }

    /// Retries per chunk after the first attempt. Zero means a single
    /// attempt per chunk.
    pub fn with_retry_limit(mut self, retry_limit: u32) -> Self {
        self.retry_limit = retry_limit;
        self
    }

    /// Upload a file, discarding progress events.
    pub async fn upload(
        &self,
        parent_file_id: i64,
        filename: &str,
        file: &mut File,
    ) -> Result<UploadOutcome, UploadError> {
        self.upload_with_progress(parent_file_id, filename, file, &mut |_: UploadEvent| {})
            .await
    }

    /// Upload a file, reporting each protocol step to `sink`.
    #[tracing::instrument(
        name = "upload.file",
        skip(self, file, sink),
        fields(parent_file_id = parent_file_id, filename = %filename),
        err
    )]
    pub async fn upload_with_progress(
        &self,
        parent_file_id: i64,
        filename: &str,
        file: &mut File,
        sink: &mut dyn ProgressSink,
    ) -> Result<UploadOutcome, UploadError> {
        let size = file.metadata().await?.len();
        session::validate_upload_args(filename, size)?;

        sink.on_event(UploadEvent::CreatingSession);
        let etag = hasher::file_etag(file).await?;
        let created =
            session::create_session(self.client, parent_file_id, filename, &etag, size).await?;

        let (preupload_id, slice_size) = match created {
            UploadSession::Reused { file_id } => {
                return Ok(UploadOutcome::Reused { file_id });
            }
            UploadSession::Pending {
                preupload_id,
                slice_size,
            } => (preupload_id, slice_size),
        };

        let total_chunks = size.div_ceil(slice_size);
        let engine = chunk::ChunkTransferEngine::new(
            self.client,
            &preupload_id,
            slice_size,
            total_chunks,
            self.retry_limit,
        );
        let record = engine.run(file, sink).await?;

        // Single-chunk uploads skip the cross-check; the server accepts
        // them atomically.
        if slice_size < size && record.len() > 1 {
            sink.on_event(UploadEvent::Verifying {
                total: total_chunks,
            });
            verify::verify_parts(self.client, &preupload_id, &record).await?;
        }

        sink.on_event(UploadEvent::Completing);
        complete::finalize(self.client, &preupload_id).await
    }

    /// Ask once whether an asynchronous merge has finished.
    ///
    /// The protocol places no bound on poll count; callers pick their own
    /// interval and timeout.
    pub async fn poll_async_result(
        &self,
        preupload_id: &str,
    ) -> Result<AsyncPollStatus, UploadError> {
        complete::poll_async_result(self.client, preupload_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_file_id() {
        assert_eq!(UploadOutcome::Reused { file_id: 1 }.file_id(), Some(1));
        assert_eq!(UploadOutcome::Completed { file_id: 2 }.file_id(), Some(2));
        assert_eq!(
            UploadOutcome::AsyncPending {
                preupload_id: "p".into()
            }
            .file_id(),
            None
        );
    }

    #[test]
    fn test_chunk_count_arithmetic() {
        // ceil(size / slice_size) over representative shapes
        let cases = [
            (1u64, 16u64, 1u64),
            (16, 16, 1),
            (17, 16, 2),
            (32, 16, 2),
            (33, 16, 3),
            (5, 1024, 1),
        ];
        for (size, slice, expected) in cases {
            assert_eq!(size.div_ceil(slice), expected, "size={size} slice={slice}");
        }
    }

    #[test]
    fn test_retries_exhausted_display_names_the_cause() {
        let err = UploadError::RetriesExhausted {
            sequence: 3,
            attempts: 4,
            source: Box::new(UploadError::ChunkRejected {
                sequence: 3,
                status: 500,
            }),
        };
        let text = err.to_string();
        assert!(text.contains("Chunk 3 failed after 4 attempts"));
        assert!(text.contains("500"));
    }
}
