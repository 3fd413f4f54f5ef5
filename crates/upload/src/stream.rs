//! Streaming uploads of unknown total length.

use std::sync::{Arc, Mutex, PoisonError};

use bytes::Bytes;
use resumable_protocol::{ChunkFailed, ChunkProgress, ChunkUploaded, ContentRange};
use resumable_transfer::{ChecksumEngine, KeyValueStore, PauseGate, SessionStore};
use tracing::{debug, warn};

use crate::config::StreamOptions;
use crate::endpoint::Endpoint;
use crate::error::UploadError;
use crate::transport::{BytesSentCallback, Transport};

const CHUNK_ACCEPTED: &[u16] = &[200, 201, 308];

/// Uploads chunks handed over one at a time while the total length is still
/// unknown.
///
/// Every chunk but the last announces an open total (`bytes s-e/*`); the last
/// one carries the final size. Failed chunks are retried after a fixed
/// backoff, up to `retry_limit` times. There is no local source to replay, so
/// nothing is validated on resume: the caller asks
/// [`remote_resume_index`](Self::remote_resume_index) and resends from there.
pub struct UploadStream {
    options: StreamOptions,
    endpoint: Endpoint,
    session: SessionStore,
    gate: PauseGate,
    engine: Mutex<ChecksumEngine>,
}

impl UploadStream {
    pub fn new(
        options: StreamOptions,
        transport: Arc<dyn Transport>,
        store: Arc<dyn KeyValueStore>,
    ) -> Result<Self, UploadError> {
        options.validate()?;
        let endpoint = Endpoint::new(&options.id, &options.url, &options.content_type, transport);
        let session = SessionStore::new(&options.id, 0, options.chunk_size, store);
        debug!(upload_id = %options.id, chunk_size = options.chunk_size, "upload stream created");
        Ok(Self {
            options,
            endpoint,
            session,
            gate: PauseGate::new(),
            engine: Mutex::new(ChecksumEngine::new()),
        })
    }

    pub fn id(&self) -> &str {
        &self.options.id
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    pub fn is_paused(&self) -> bool {
        self.gate.is_paused()
    }

    /// Index of the first chunk the endpoint does not fully hold.
    pub async fn remote_resume_index(&self) -> Result<usize, UploadError> {
        self.endpoint
            .remote_resume_index(None, self.options.chunk_size)
            .await
    }

    /// Sends chunk `index`, retrying failures after the configured backoff.
    ///
    /// All chunks but the last must be exactly `chunk_size` long. The last
    /// one may be empty when the total is a multiple of the chunk size.
    /// Once retries are exhausted the failure callback fires and
    /// [`UploadError::UnableToRecover`] is returned; the stream does not
    /// reset or resume on its own.
    pub async fn upload_chunk(
        &self,
        index: usize,
        data: impl Into<Bytes>,
        is_last_chunk: bool,
    ) -> Result<(), UploadError> {
        let data: Bytes = data.into();
        if data.is_empty() && !is_last_chunk {
            return Err(UploadError::EmptyChunk { chunk_index: index });
        }

        self.gate.wait().await?;

        let checksum = self
            .engine
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .update(&data);

        let start = index as u64 * self.options.chunk_size;
        let len = data.len() as u64;
        let range = match (is_last_chunk, len) {
            (true, 0) => ContentRange::Probe { total: Some(start) },
            (true, _) => ContentRange::chunk(start, len, Some(start + len)),
            (false, _) => ContentRange::chunk(start, len, None),
        };

        let on_progress = self.options.on_progress.clone().map(|cb| -> BytesSentCallback {
            Arc::new(move |sent: u64| {
                cb(&ChunkProgress {
                    total_bytes: start + len,
                    uploaded_bytes: start + sent,
                    chunk_index: index,
                    chunk_length: len,
                })
            })
        });

        debug!(
            upload_id = %self.id(),
            chunk_index = index,
            range = %range,
            is_last_chunk,
            "uploading stream chunk"
        );

        let attempts = self.options.retry_limit.saturating_add(1);
        let cancel = self.gate.cancel_token();
        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = self.send(data.clone(), range, on_progress.clone()).await;
            match result {
                Ok(()) => break,
                Err(UploadError::Cancelled) => return Err(UploadError::Cancelled),
                Err(e) if attempt < attempts => {
                    warn!(
                        upload_id = %self.id(),
                        chunk_index = index,
                        attempt,
                        error = %e,
                        "chunk upload failed, retrying"
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(self.options.backoff) => {}
                        _ = cancel.cancelled() => return Err(UploadError::Cancelled),
                    }
                }
                Err(e) => {
                    warn!(
                        upload_id = %self.id(),
                        chunk_index = index,
                        attempts = attempt,
                        error = %e,
                        "giving up on chunk"
                    );
                    if let Some(cb) = &self.options.on_chunk_upload_fail {
                        cb(&ChunkFailed { chunk_index: index });
                    }
                    return Err(UploadError::UnableToRecover {
                        chunk_index: index,
                        attempts: attempt,
                        source: Box::new(e),
                    });
                }
            }
        }

        self.session.add_checksum(index, Some(checksum))?;

        if let Some(cb) = &self.options.on_chunk_upload {
            cb(&ChunkUploaded {
                total_bytes: is_last_chunk.then_some(start + len),
                uploaded_bytes: start + len,
                chunk_index: index,
                chunk_length: len,
                is_last_chunk,
            });
        }
        lifecycle!(
            self.options.debug,
            upload_id = %self.id(),
            chunk_index = index,
            is_last_chunk,
            "stream chunk acknowledged"
        );
        Ok(())
    }

    async fn send(
        &self,
        body: Bytes,
        range: ContentRange,
        on_progress: Option<BytesSentCallback>,
    ) -> Result<(), UploadError> {
        let response = self.endpoint.put(Some(body), range, on_progress).await?;
        if self.gate.is_cancelled() {
            return Err(UploadError::Cancelled);
        }
        self.endpoint.check(&response, CHUNK_ACCEPTED)
    }

    /// Holds the next [`upload_chunk`](Self::upload_chunk) call at its start.
    pub fn pause(&self) {
        lifecycle!(self.options.debug, upload_id = %self.id(), "pausing upload stream");
        self.gate.pause();
    }

    pub fn unpause(&self) {
        lifecycle!(self.options.debug, upload_id = %self.id(), "unpausing upload stream");
        self.gate.unpause();
    }

    /// Stops the stream for good and deletes its persisted session.
    pub fn cancel(&self) -> Result<(), UploadError> {
        lifecycle!(self.options.debug, upload_id = %self.id(), "cancelling upload stream");
        self.gate.cancel();
        self.session.reset()?;
        Ok(())
    }
}
