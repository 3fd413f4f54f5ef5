//! Resumable chunked uploads against a `Content-Range` endpoint.
//!
//! This crate holds the **orchestration** only. Bytes come from a
//! [`ByteSource`](resumable_transfer::ByteSource), progress is persisted
//! through a [`KeyValueStore`](resumable_transfer::KeyValueStore) and requests
//! go out through a [`Transport`] supplied by the host (see the
//! `resumable-http` crate for a `reqwest` one).
//!
//! # Flows
//!
//! - [`Upload`]: a file of known length. Probes the endpoint, reconciles the
//!   persisted session with what the endpoint holds, then sends the remaining
//!   chunks in order.
//! - [`UploadStream`]: chunks pushed by the caller while the total length is
//!   still unknown, each retried with a fixed backoff.

/// Logs a lifecycle event at `info` when the upload runs in debug mode and at
/// `debug` otherwise.
macro_rules! lifecycle {
    ($verbose:expr, $($arg:tt)+) => {
        if $verbose {
            ::tracing::info!($($arg)+)
        } else {
            ::tracing::debug!($($arg)+)
        }
    };
}

pub mod config;
pub mod endpoint;
pub mod error;
pub mod reconcile;
pub mod stream;
pub mod transport;
pub mod upload;

#[cfg(test)]
pub(crate) mod testing;

// Re-export primary types for convenience.
pub use config::{
    ChunkFailCallback, ChunkUploadCallback, ProgressCallback, SettingsError, StreamOptions,
    UploadOptions, UploadSettings,
};
pub use endpoint::Endpoint;
pub use error::{ChecksumMismatch, UploadError};
pub use reconcile::{ResumePlan, ResumeReconciler};
pub use stream::UploadStream;
pub use transport::{BytesSentCallback, PutRequest, PutResponse, Transport, TransportError};
pub use upload::Upload;
