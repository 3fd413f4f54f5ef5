//! Chunked file traversal with resumable session tracking.
//!
//! - [`ChecksumEngine`] fingerprints chunk edges into a running MD5.
//! - [`SessionStore`] persists per-upload progress through a [`KeyValueStore`].
//! - [`ChunkTraverser`] walks a [`ByteSource`] chunk by chunk, parking at a
//!   [`PauseGate`] between chunks.

mod checksum;
mod gate;
mod session;
mod source;
mod store;
mod traverser;

pub use checksum::{ChecksumEngine, EDGE_LEN, edge_fingerprint};
pub use gate::PauseGate;
pub use session::{SessionStore, UploadSession};
pub use source::{ByteSource, FileSource, MemorySource};
pub use store::{FileStore, KeyValueStore, MemoryStore, StoreError};
pub use traverser::{Chunk, ChunkTraverser, ChunkWalk, ChunkWindow, total_chunks};

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("session store error: {0}")]
    Store(#[from] StoreError),

    #[error("read of {len} bytes at offset {start} exceeds source size {size}")]
    OutOfRange { start: u64, len: u64, size: u64 },

    #[error("cancelled")]
    Cancelled,
}
