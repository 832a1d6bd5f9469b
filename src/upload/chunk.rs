//! Chunk transfer engine
//!
//! Streams the source file to the server in `slice_size`-byte chunks.
//! Sequence numbers start at 1 and are assigned at read time, so they stay
//! contiguous and gap-free regardless of transfer retries. Each chunk gets
//! a freshly acquired presigned target (targets are time-limited and
//! single-use); the same target is reused across retries of that chunk's
//! transfer, never across chunks.

use super::progress::{ProgressSink, UploadEvent};
use super::{protocol, UploadError};
use crate::api::ApiClient;
use bytes::Bytes;
use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::fs::File;
use tokio::io::AsyncReadExt;

const GET_UPLOAD_URL_PATH: &str = "/upload/v1/file/get_upload_url";

#[derive(Debug, Serialize)]
struct UploadTargetRequest<'a> {
    #[serde(rename = "preuploadID")]
    preupload_id: &'a str,
    #[serde(rename = "sliceNo")]
    slice_no: u64,
}

#[derive(Debug, Deserialize)]
struct UploadTargetResponse {
    #[serde(rename = "presignedURL", default)]
    presigned_url: String,
}

/// Bytes actually sent per sequence number.
///
/// Local bookkeeping for the verification pass; lives only for the one
/// upload invocation that built it.
#[derive(Debug, Default)]
pub(crate) struct TransferRecord {
    sizes: HashMap<u64, u64>,
}

impl TransferRecord {
    pub(crate) fn record(&mut self, sequence: u64, bytes: u64) {
        self.sizes.insert(sequence, bytes);
    }

    pub(crate) fn size_of(&self, sequence: u64) -> Option<u64> {
        self.sizes.get(&sequence).copied()
    }

    pub(crate) fn len(&self) -> usize {
        self.sizes.len()
    }
}

pub(crate) struct ChunkTransferEngine<'a> {
    client: &'a ApiClient,
    preupload_id: &'a str,
    slice_size: u64,
    total_chunks: u64,
    retry_limit: u32,
}

impl<'a> ChunkTransferEngine<'a> {
    pub(crate) fn new(
        client: &'a ApiClient,
        preupload_id: &'a str,
        slice_size: u64,
        total_chunks: u64,
        retry_limit: u32,
    ) -> Self {
        Self {
            client,
            preupload_id,
            slice_size,
            total_chunks,
            retry_limit,
        }
    }

    /// Drive the per-chunk loop until the file runs out of bytes.
    ///
    /// The file cursor must be at offset zero. On failure, chunks the
    /// server already accepted are left in place; the session remains a
    /// valid re-entry point.
    pub(crate) async fn run(
        &self,
        file: &mut File,
        sink: &mut dyn ProgressSink,
    ) -> Result<TransferRecord, UploadError> {
        let mut record = TransferRecord::default();
        let buf_len = usize::try_from(self.slice_size).map_err(|_| {
            UploadError::InvalidArgument(format!(
                "slice size {} exceeds addressable memory",
                self.slice_size
            ))
        })?;
        let mut buf = vec![0u8; buf_len];
        let mut sequence: u64 = 1;

        loop {
            // Targets are time-limited: fetch right before the chunk they
            // authorize. Acquisition failures are not retried at this layer.
            let target = self.acquire_target(sequence).await?;

            let n = read_chunk(file, &mut buf).await?;
            if n == 0 {
                break;
            }
            record.record(sequence, n as u64);
            let current = sequence;
            // Assigned once the bytes are read, not once they are accepted.
            sequence += 1;

            self.transfer_chunk(current, &target, Bytes::copy_from_slice(&buf[..n]), sink)
                .await?;
        }

        tracing::debug!(chunks = record.len(), "Chunk transfer finished");
        Ok(record)
    }

    #[tracing::instrument(
        name = "upload.get_chunk_target",
        skip(self),
        fields(slice_no = sequence),
        err
    )]
    async fn acquire_target(&self, sequence: u64) -> Result<String, UploadError> {
        let response: UploadTargetResponse = self
            .client
            .post_json(
                GET_UPLOAD_URL_PATH,
                &UploadTargetRequest {
                    preupload_id: self.preupload_id,
                    slice_no: sequence,
                },
            )
            .await?;
        if response.presigned_url.is_empty() {
            return Err(protocol("get_upload_url response missing presignedURL"));
        }
        Ok(response.presigned_url)
    }

    /// PUT one chunk to its presigned target, retrying transfer failures up
    /// to the configured limit. The target is reused across retries.
    async fn transfer_chunk(
        &self,
        sequence: u64,
        target: &str,
        body: Bytes,
        sink: &mut dyn ProgressSink,
    ) -> Result<(), UploadError> {
        let mut attempt: u32 = 0;

        loop {
            if attempt == 0 {
                sink.on_event(UploadEvent::ChunkStarted {
                    sequence,
                    total: self.total_chunks,
                });
            } else {
                sink.on_event(UploadEvent::ChunkRetried {
                    sequence,
                    total: self.total_chunks,
                    attempt,
                });
            }

            let failure = match self
                .client
                .raw_transfer(Method::PUT, target, body.clone())
                .await
            {
                Ok(status) if status == StatusCode::OK || status == StatusCode::NO_CONTENT => {
                    tracing::debug!(sequence = sequence, bytes = body.len(), "Chunk accepted");
                    return Ok(());
                }
                Ok(status) => UploadError::ChunkRejected {
                    sequence,
                    status: status.as_u16(),
                },
                Err(e) => UploadError::Api(e),
            };

            attempt += 1;
            if attempt > self.retry_limit {
                return Err(UploadError::RetriesExhausted {
                    sequence,
                    attempts: attempt,
                    source: Box::new(failure),
                });
            }
            tracing::warn!(
                sequence = sequence,
                attempt = attempt,
                error = %failure,
                "Chunk transfer failed, retrying"
            );
        }
    }
}

/// Read up to `buf.len()` bytes, filling across short reads.
///
/// Returns the number of bytes read; zero means end of stream.
async fn read_chunk(file: &mut File, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = file.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}
