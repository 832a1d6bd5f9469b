//! Streaming content digest
//!
//! The session request is keyed by `(etag, size)` so the server can
//! deduplicate content ("instant upload"). The digest streams the file in
//! fixed-size blocks and rewinds the cursor, leaving the file positioned
//! for the chunk loop. The whole file is never held in memory.

use md5::{Digest, Md5};
use std::io::SeekFrom;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

/// Block size for digest reads
const HASH_BLOCK_SIZE: usize = 4 * 1024 * 1024;

/// Compute the hex-encoded MD5 etag of a file and rewind it to the start.
///
/// The digest is computed fresh on every call; file contents may have
/// changed between upload attempts.
pub async fn file_etag(file: &mut File) -> std::io::Result<String> {
    let mut hasher = Md5::new();
    let mut buf = vec![0u8; HASH_BLOCK_SIZE];

    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    file.seek(SeekFrom::Start(0)).await?;

    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    async fn temp_file_with(content: &[u8]) -> File {
        let mut file = File::from_std(tempfile::tempfile().unwrap());
        file.write_all(content).await.unwrap();
        file.flush().await.unwrap();
        file.seek(SeekFrom::Start(0)).await.unwrap();
        file
    }

    #[tokio::test]
    async fn test_known_digest() {
        let mut file = temp_file_with(b"hello world").await;
        let etag = file_etag(&mut file).await.unwrap();
        assert_eq!(etag, "5eb63bbbe01eeed093cb22bb8f5acdc3");
    }

    #[tokio::test]
    async fn test_empty_file_digest() {
        let mut file = temp_file_with(b"").await;
        let etag = file_etag(&mut file).await.unwrap();
        assert_eq!(etag, "d41d8cd98f00b204e9800998ecf8427e");
    }

    #[tokio::test]
    async fn test_cursor_rewound_after_hashing() {
        let mut file = temp_file_with(b"some bytes that get hashed").await;
        file_etag(&mut file).await.unwrap();

        let mut first = [0u8; 4];
        file.read_exact(&mut first).await.unwrap();
        assert_eq!(&first, b"some");
    }

    #[tokio::test]
    async fn test_digest_spans_blocks() {
        // Content longer than one hash block exercises the incremental path.
        let content = vec![0xA5u8; HASH_BLOCK_SIZE + 1024];
        let mut file = temp_file_with(&content).await;
        let streamed = file_etag(&mut file).await.unwrap();

        let mut hasher = Md5::new();
        hasher.update(&content);
        assert_eq!(streamed, hex::encode(hasher.finalize()));
    }
}
