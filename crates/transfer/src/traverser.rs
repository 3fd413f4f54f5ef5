use std::future::Future;
use std::ops::ControlFlow;
use std::sync::{Arc, Mutex, PoisonError};

use resumable_protocol::ContentRange;
use tracing::{debug, warn};

use crate::TransferError;
use crate::checksum::ChecksumEngine;
use crate::gate::PauseGate;
use crate::source::ByteSource;

/// Number of chunks needed to cover `file_size` bytes.
pub fn total_chunks(file_size: u64, chunk_size: u64) -> usize {
    file_size.div_ceil(chunk_size) as usize
}

/// Byte window of one chunk. Derived, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkWindow {
    pub index: usize,
    /// Offset of the first byte.
    pub start: u64,
    pub len: u64,
    pub is_last: bool,
}

impl ChunkWindow {
    /// Window of chunk `index`, or `None` past the end of the file.
    pub fn at(index: usize, file_size: u64, chunk_size: u64) -> Option<Self> {
        let start = index as u64 * chunk_size;
        if start >= file_size {
            return None;
        }
        let len = chunk_size.min(file_size - start);
        Some(Self {
            index,
            start,
            len,
            is_last: start + len == file_size,
        })
    }

    /// Offset of the last byte (inclusive).
    pub fn end(&self) -> u64 {
        self.start + self.len - 1
    }

    /// `Content-Range` announcing this window of a `total`-byte upload.
    pub fn content_range(&self, total: u64) -> ContentRange {
        ContentRange::chunk(self.start, self.len, Some(total))
    }
}

/// A materialized chunk.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub window: ChunkWindow,
    pub data: Vec<u8>,
    /// Running edge checksum, `None` when checksums are disabled.
    pub checksum: Option<String>,
}

/// Sequential walk over a [`ByteSource`] in fixed-size windows.
///
/// Chunks are produced strictly in index order, one at a time. Before each
/// chunk the walk passes the traverser's [`PauseGate`]; a chunk that already
/// started is never interrupted by a pause.
///
/// The traverser owns one [`ChecksumEngine`]. A walk starting at index 0
/// resets it; a walk starting where the previous one stopped continues it, so
/// replaying `[0, k)` and then walking `[k, n)` yields the checksums of one
/// uninterrupted walk.
pub struct ChunkTraverser {
    source: Arc<dyn ByteSource>,
    chunk_size: u64,
    checksums: bool,
    gate: Arc<PauseGate>,
    engine: Mutex<ChecksumEngine>,
}

impl ChunkTraverser {
    /// `chunk_size` must be positive. With `checksums` off no fingerprint is
    /// computed at all.
    pub fn new(source: Arc<dyn ByteSource>, chunk_size: u64, checksums: bool) -> Self {
        Self::with_gate(source, chunk_size, checksums, Arc::new(PauseGate::new()))
    }

    /// Like [`new`](Self::new), sharing an existing gate.
    pub fn with_gate(
        source: Arc<dyn ByteSource>,
        chunk_size: u64,
        checksums: bool,
        gate: Arc<PauseGate>,
    ) -> Self {
        Self {
            source,
            chunk_size,
            checksums,
            gate,
            engine: Mutex::new(ChecksumEngine::new()),
        }
    }

    pub fn file_size(&self) -> u64 {
        self.source.len()
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    pub fn total_chunks(&self) -> usize {
        total_chunks(self.source.len(), self.chunk_size)
    }

    pub fn gate(&self) -> &Arc<PauseGate> {
        &self.gate
    }

    pub fn pause(&self) {
        self.gate.pause();
    }

    pub fn unpause(&self) {
        self.gate.unpause();
    }

    /// Starts a walk over `[start, end)`, `end` defaulting to the chunk count.
    pub fn walk(&self, start: usize, end: Option<usize>) -> ChunkWalk<'_> {
        let total = self.total_chunks();
        let end = end.map_or(total, |e| e.min(total));

        if self.checksums {
            let mut engine = self.engine.lock().unwrap_or_else(PoisonError::into_inner);
            if start == 0 {
                engine.reset();
            } else if engine.chunks() != start {
                warn!(
                    start,
                    hashed = engine.chunks(),
                    "walk does not continue the checksum history; restarting it"
                );
                engine.reset();
            }
        }

        debug!(total_chunks = total, start, end, "starting chunk walk");
        ChunkWalk {
            traverser: self,
            next: start,
            end,
        }
    }

    /// Walks `[start, end)` invoking `action` on every chunk.
    ///
    /// The walk ends early when `action` returns `ControlFlow::Break`, and
    /// aborts with the first error it or the walk produces.
    pub async fn run<F, Fut, E>(
        &self,
        start: usize,
        end: Option<usize>,
        mut action: F,
    ) -> Result<(), E>
    where
        F: FnMut(Chunk) -> Fut,
        Fut: Future<Output = Result<ControlFlow<()>, E>>,
        E: From<TransferError>,
    {
        let mut walk = self.walk(start, end);
        while let Some(chunk) = walk.next_chunk().await? {
            let index = chunk.window.index;
            if action(chunk).await?.is_break() {
                debug!(index, "chunk walk stopped by action");
                return Ok(());
            }
        }
        debug!("chunk walk complete");
        Ok(())
    }
}

/// Cursor of an in-progress walk.
pub struct ChunkWalk<'a> {
    traverser: &'a ChunkTraverser,
    next: usize,
    end: usize,
}

impl ChunkWalk<'_> {
    /// Index of the next chunk to produce.
    pub fn position(&self) -> usize {
        self.next
    }

    /// Waits at the gate, then reads and fingerprints the next chunk.
    ///
    /// Returns `None` once the walk reached its end.
    pub async fn next_chunk(&mut self) -> Result<Option<Chunk>, TransferError> {
        if self.next >= self.end {
            return Ok(None);
        }

        let t = self.traverser;
        t.gate.wait().await?;

        let Some(window) = ChunkWindow::at(self.next, t.source.len(), t.chunk_size) else {
            return Ok(None);
        };
        let data = t.source.read_range(window.start, window.len).await?;

        let checksum = t.checksums.then(|| {
            t.engine
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .update(&data)
        });

        self.next += 1;
        Ok(Some(Chunk {
            window,
            data,
            checksum,
        }))
    }
}
