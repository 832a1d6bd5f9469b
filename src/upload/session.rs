//! Upload session creation
//!
//! Asks the server for an upload session keyed by `(etag, size)`. The
//! server either recognizes the content and answers `reuse` with the
//! existing file id, or issues a `preuploadID` and the slice size it wants
//! chunks cut to.

use super::{protocol, UploadError};
use crate::api::ApiClient;
use serde::{Deserialize, Serialize};

const CREATE_SESSION_PATH: &str = "/upload/v1/file/create";

/// Longest filename the service accepts
const MAX_FILENAME_CHARS: usize = 128;

/// Characters the service rejects in filenames
const FORBIDDEN_FILENAME_CHARS: &[char] = &['"', '\\', '/', ':', '*', '?', '|', '>', '<'];

#[derive(Debug, Serialize)]
struct CreateSessionRequest<'a> {
    #[serde(rename = "parentFileID")]
    parent_file_id: i64,
    filename: &'a str,
    etag: &'a str,
    size: u64,
}

#[derive(Debug, Deserialize)]
struct CreateSessionResponse {
    #[serde(default)]
    reuse: bool,
    #[serde(rename = "fileID", default)]
    file_id: Option<i64>,
    #[serde(rename = "preuploadID", default)]
    preupload_id: Option<String>,
    #[serde(rename = "sliceSize", default)]
    slice_size: Option<u64>,
}

/// One server-issued upload session, immutable once created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadSession {
    /// The server already holds this `(etag, size)`; the upload is done
    /// without transferring a byte.
    Reused { file_id: i64 },
    /// A fresh session: the file goes up in `slice_size`-byte chunks keyed
    /// by `preupload_id`.
    Pending {
        preupload_id: String,
        slice_size: u64,
    },
}

/// Preconditions checked before any network call.
pub(crate) fn validate_upload_args(filename: &str, size: u64) -> Result<(), UploadError> {
    if size == 0 {
        return Err(UploadError::InvalidArgument(
            "file size must be greater than zero".into(),
        ));
    }
    if filename.is_empty() {
        return Err(UploadError::InvalidArgument(
            "filename must not be empty".into(),
        ));
    }
    if filename.chars().count() > MAX_FILENAME_CHARS {
        return Err(UploadError::InvalidArgument(format!(
            "filename exceeds {MAX_FILENAME_CHARS} characters"
        )));
    }
    if let Some(bad) = filename
        .chars()
        .find(|c| FORBIDDEN_FILENAME_CHARS.contains(c))
    {
        return Err(UploadError::InvalidArgument(format!(
            "filename contains forbidden character {bad:?}"
        )));
    }
    Ok(())
}

/// Request an upload session for `(etag, size)` under the given folder.
#[tracing::instrument(
    name = "upload.create_session",
    skip(client, etag),
    fields(parent_file_id = parent_file_id, filename = %filename, size = size),
    err
)]
pub(crate) async fn create_session(
    client: &ApiClient,
    parent_file_id: i64,
    filename: &str,
    etag: &str,
    size: u64,
) -> Result<UploadSession, UploadError> {
    let response: CreateSessionResponse = client
        .post_json(
            CREATE_SESSION_PATH,
            &CreateSessionRequest {
                parent_file_id,
                filename,
                etag,
                size,
            },
        )
        .await?;

    let session = session_from_response(response)?;
    match &session {
        UploadSession::Reused { file_id } => {
            tracing::info!(file_id = file_id, "Server already holds this content");
        }
        UploadSession::Pending {
            preupload_id,
            slice_size,
        } => {
            tracing::info!(
                preupload_id = %preupload_id,
                slice_size = slice_size,
                "Upload session created"
            );
        }
    }
    Ok(session)
}

fn session_from_response(response: CreateSessionResponse) -> Result<UploadSession, UploadError> {
    if response.reuse {
        let file_id = response
            .file_id
            .ok_or_else(|| protocol("create response marked reuse without a fileID"))?;
        return Ok(UploadSession::Reused { file_id });
    }

    let preupload_id = response
        .preupload_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| protocol("create response missing preuploadID"))?;
    let slice_size = response
        .slice_size
        .filter(|size| *size > 0)
        .ok_or_else(|| protocol("create response missing a positive sliceSize"))?;

    Ok(UploadSession::Pending {
        preupload_id,
        slice_size,
    })
}
