//! Part verification
//!
//! Cross-checks the chunks this client sent against the parts the server
//! recorded for the session. Pure safety check: any disagreement aborts
//! the upload, nothing is corrected or re-sent.

use super::chunk::TransferRecord;
use super::{protocol, UploadError};
use crate::api::ApiClient;
use serde::{Deserialize, Serialize};

const LIST_PARTS_PATH: &str = "/upload/v1/file/list_upload_parts";

#[derive(Debug, Serialize)]
struct ListPartsRequest<'a> {
    #[serde(rename = "preuploadID")]
    preupload_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct ListPartsResponse {
    #[serde(default)]
    parts: Vec<RemotePart>,
}

/// One server-recorded part. The sequence number travels as text.
#[derive(Debug, Deserialize)]
struct RemotePart {
    #[serde(rename = "partNumber")]
    part_number: String,
    size: u64,
    #[serde(default)]
    #[allow(dead_code)]
    etag: String,
}

/// Fetch the server's part list and compare it to the local record.
#[tracing::instrument(
    name = "upload.verify_parts",
    skip(client, record),
    fields(chunks = record.len()),
    err
)]
pub(crate) async fn verify_parts(
    client: &ApiClient,
    preupload_id: &str,
    record: &TransferRecord,
) -> Result<(), UploadError> {
    let response: ListPartsResponse = client
        .post_json(LIST_PARTS_PATH, &ListPartsRequest { preupload_id })
        .await?;
    cross_check(&response.parts, record)
}

/// Iterate the server's parts and probe the local record.
///
/// A part the client never sent, or one recorded with a different size,
/// indicates inconsistent bookkeeping on one side and is terminal. An
/// unparseable sequence number is a malformed server response, not a
/// transient fault.
fn cross_check(parts: &[RemotePart], record: &TransferRecord) -> Result<(), UploadError> {
    for part in parts {
        let sequence: u64 = part
            .part_number
            .parse()
            .map_err(|_| protocol(format!("unparseable partNumber {:?}", part.part_number)))?;

        match record.size_of(sequence) {
            None => return Err(UploadError::PartNotFound { sequence }),
            Some(local) if local != part.size => {
                return Err(UploadError::PartSizeMismatch {
                    sequence,
                    local,
                    remote: part.size,
                });
            }
            Some(_) => {}
        }
    }
    Ok(())
}
