//! Completion finalizer and async result polling
//!
//! Signals end-of-upload for a session. The server either finalizes
//! immediately, or queues an asynchronous merge the caller polls for.
//! Polling here is single-shot; the wait/backoff strategy belongs to the
//! caller.

use super::{protocol, UploadError, UploadOutcome};
use crate::api::ApiClient;
use serde::{Deserialize, Serialize};

const COMPLETE_PATH: &str = "/upload/v1/file/upload_complete";
const ASYNC_RESULT_PATH: &str = "/upload/v1/file/upload_async_result";

#[derive(Debug, Serialize)]
struct SessionRequest<'a> {
    #[serde(rename = "preuploadID")]
    preupload_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct CompleteResponse {
    #[serde(default)]
    completed: bool,
    #[serde(rename = "async", default)]
    is_async: bool,
    #[serde(rename = "fileID", default)]
    file_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct AsyncResultResponse {
    #[serde(default)]
    completed: bool,
    #[serde(rename = "fileID", default)]
    file_id: Option<i64>,
}

/// Result of one async-completion poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AsyncPollStatus {
    /// The merge has not finished; poll again later.
    Pending,
    /// The merge finished; this file id is authoritative.
    Completed { file_id: i64 },
}

/// Signal end-of-upload and interpret the server's completion state.
#[tracing::instrument(name = "upload.complete", skip(client), err)]
pub(crate) async fn finalize(
    client: &ApiClient,
    preupload_id: &str,
) -> Result<UploadOutcome, UploadError> {
    let response: CompleteResponse = client
        .post_json(COMPLETE_PATH, &SessionRequest { preupload_id })
        .await?;
    outcome_from_response(response, preupload_id)
}

fn outcome_from_response(
    response: CompleteResponse,
    preupload_id: &str,
) -> Result<UploadOutcome, UploadError> {
    if response.completed {
        let file_id = response
            .file_id
            .ok_or_else(|| protocol("upload_complete reported completion without a fileID"))?;
        return Ok(UploadOutcome::Completed { file_id });
    }
    if response.is_async {
        return Ok(UploadOutcome::AsyncPending {
            preupload_id: preupload_id.to_string(),
        });
    }
    // Neither flag set: the server's state is ambiguous and retrying the
    // completion call cannot resolve it.
    Err(UploadError::Failed)
}

/// Ask once whether an asynchronous merge has finished.
#[tracing::instrument(name = "upload.poll_async_result", skip(client), err)]
pub(crate) async fn poll_async_result(
    client: &ApiClient,
    preupload_id: &str,
) -> Result<AsyncPollStatus, UploadError> {
    let response: AsyncResultResponse = client
        .post_json(ASYNC_RESULT_PATH, &SessionRequest { preupload_id })
        .await?;

    if !response.completed {
        return Ok(AsyncPollStatus::Pending);
    }
    let file_id = response
        .file_id
        .ok_or_else(|| protocol("upload_async_result reported completion without a fileID"))?;
    Ok(AsyncPollStatus::Completed { file_id })
}
