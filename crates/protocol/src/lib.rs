//! Wire vocabulary for chunked, resumable uploads.
//!
//! The remote endpoint accepts sequential `PUT`s carrying a `Content-Range`
//! header, answers `308` while the upload is incomplete and reports the bytes
//! it holds through a `Range` response header. This crate formats and parses
//! those headers and classifies response statuses. It performs no I/O.

pub mod constants;
pub mod range;
pub mod status;
pub mod types;

// Re-export primary types for convenience.
pub use constants::{MIN_CHUNK_SIZE, SESSION_KEY_PREFIX};
pub use range::{ContentRange, RangeError, acknowledged_bytes};
pub use status::ResponseKind;
pub use types::{ChunkFailed, ChunkProgress, ChunkUploaded};
