//! kappa-pan Library
//!
//! Async client for the 123pan open storage API, focused on doing uploads
//! properly: content-addressed dedup, resumable chunked transfer with
//! per-chunk retry, part verification, and asynchronous completion.
//!
//! # Features
//!
//! - **Instant upload**: server-side dedup by `(etag, size)` skips the
//!   transfer entirely when the content is already known
//! - **Chunked transfer**: server-negotiated slice size, presigned
//!   per-chunk targets, configurable retries
//! - **Verification**: local transfer record cross-checked against the
//!   server's part list before finalizing
//! - **Async completion**: single-shot poll semantics, wait strategy left
//!   to the caller
//! - **Explicit client state**: token refresh is a pluggable provider on
//!   an explicitly constructed client, no globals
//!
//! # Example
//!
//! ```no_run
//! use kappa_pan::{ApiClient, Config, Uploader};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let client = ApiClient::from_config(&config.api)?;
//!
//!     let mut file = tokio::fs::File::open("archive.tar.zst").await?;
//!     let outcome = Uploader::new(&client)
//!         .upload(0, "archive.tar.zst", &mut file)
//!         .await?;
//!     println!("{outcome:?}");
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod auth;
pub mod config;
pub mod upload;

// Re-export commonly used types
pub use api::ApiClient;
pub use config::Config;
pub use upload::{AsyncPollStatus, UploadOutcome, Uploader};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
