use std::fmt;

use md5::{Digest, Md5};

/// Number of leading and trailing bytes of a chunk fed into the fingerprint.
pub const EDGE_LEN: usize = 20;

/// Returns the first [`EDGE_LEN`] bytes followed by the last [`EDGE_LEN`]
/// bytes of `chunk`.
///
/// Chunks shorter than `EDGE_LEN` contribute their whole content to both
/// halves.
pub fn edge_fingerprint(chunk: &[u8]) -> Vec<u8> {
    let head = &chunk[..chunk.len().min(EDGE_LEN)];
    let tail = &chunk[chunk.len().saturating_sub(EDGE_LEN)..];
    let mut out = Vec::with_capacity(head.len() + tail.len());
    out.extend_from_slice(head);
    out.extend_from_slice(tail);
    out
}

/// Incremental MD5 over chunk edges.
///
/// Each [`update`](Self::update) appends the edges of one chunk and returns
/// the hex digest of everything appended so far. The digest is read from a
/// snapshot of the running state, so the accumulator keeps going.
///
/// This only detects that a byte window differs from what was sent before;
/// chunks with identical edges collide.
#[derive(Clone, Default)]
pub struct ChecksumEngine {
    hasher: Md5,
    chunks: usize,
}

impl ChecksumEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one chunk and returns the checksum after it.
    pub fn update(&mut self, chunk: &[u8]) -> String {
        self.hasher.update(edge_fingerprint(chunk));
        self.chunks += 1;
        hex::encode(self.hasher.clone().finalize())
    }

    /// Number of chunks fed since creation or the last reset.
    pub fn chunks(&self) -> usize {
        self.chunks
    }

    /// Drops the running state.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

impl fmt::Debug for ChecksumEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChecksumEngine")
            .field("chunks", &self.chunks)
            .finish_non_exhaustive()
    }
}
