//! Fixed-length upload orchestration.

use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use bytes::Bytes;
use resumable_protocol::{ChunkProgress, ChunkUploaded};
use resumable_transfer::{ByteSource, Chunk, ChunkTraverser, KeyValueStore, SessionStore};
use tracing::{debug, warn};

use crate::config::UploadOptions;
use crate::endpoint::Endpoint;
use crate::error::{ChecksumMismatch, UploadError};
use crate::reconcile::{ResumePlan, ResumeReconciler};
use crate::transport::{BytesSentCallback, Transport};

/// Statuses that acknowledge a chunk.
const CHUNK_ACCEPTED: &[u16] = &[200, 201, 308];

/// Uploads one [`ByteSource`] of known length in sequential chunks.
///
/// Progress is persisted after every acknowledged chunk so a later instance
/// with the same id and store can resume. Once [`start`](Self::start)
/// completes the upload is finished and cannot be started again.
pub struct Upload {
    options: UploadOptions,
    endpoint: Endpoint,
    session: SessionStore,
    traverser: ChunkTraverser,
    finished: AtomicBool,
    last_mismatch: Mutex<Option<ChecksumMismatch>>,
}

impl Upload {
    /// Validates `options` and prepares the upload. Nothing is sent yet.
    pub fn new(
        options: UploadOptions,
        source: Arc<dyn ByteSource>,
        transport: Arc<dyn Transport>,
        store: Arc<dyn KeyValueStore>,
    ) -> Result<Self, UploadError> {
        options.validate()?;

        let endpoint = Endpoint::new(&options.id, &options.url, &options.content_type, transport);
        let session = SessionStore::new(&options.id, source.len(), options.chunk_size, store);
        let traverser = ChunkTraverser::new(source, options.chunk_size, options.validate_checksum);

        debug!(
            upload_id = %options.id,
            file_size = traverser.file_size(),
            chunk_size = options.chunk_size,
            total_chunks = traverser.total_chunks(),
            "upload created"
        );

        Ok(Self {
            options,
            endpoint,
            session,
            traverser,
            finished: AtomicBool::new(false),
            last_mismatch: Mutex::new(None),
        })
    }

    pub fn id(&self) -> &str {
        &self.options.id
    }

    pub fn options(&self) -> &UploadOptions {
        &self.options
    }

    /// Persisted progress of this upload.
    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    pub fn is_paused(&self) -> bool {
        self.traverser.gate().is_paused()
    }

    /// Mismatch that caused the most recent silent restart, if any.
    pub fn last_validation_failure(&self) -> Option<ChecksumMismatch> {
        self.last_mismatch
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Runs the upload to completion.
    ///
    /// When resumable, the endpoint is probed and the persisted session
    /// reconciled first. Every remaining chunk is then sent in order. On
    /// success the session is cleared and the upload becomes finished.
    pub async fn start(&self) -> Result<(), UploadError> {
        if self.is_finished() {
            return Err(UploadError::AlreadyFinished {
                id: self.options.id.clone(),
            });
        }

        let verbose = self.options.debug;
        let start_index = if self.session.is_resumable(self.options.resumable) {
            lifecycle!(verbose, upload_id = %self.id(), "upload may be resumable");
            let plan = ResumeReconciler::new(
                &self.endpoint,
                &self.session,
                &self.traverser,
                self.options.validate_checksum,
            )
            .verbose(verbose)
            .reconcile()
            .await?;

            if let ResumePlan::Restart { mismatch } = &plan {
                *self
                    .last_mismatch
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner) = Some(mismatch.clone());
            }
            plan.start_index()
        } else {
            lifecycle!(verbose, upload_id = %self.id(), "starting upload from scratch");
            0
        };

        lifecycle!(
            verbose,
            upload_id = %self.id(),
            start_index,
            total_chunks = self.traverser.total_chunks(),
            "uploading chunks"
        );
        self.traverser
            .run(start_index, None, |chunk| self.upload_chunk(chunk))
            .await?;

        lifecycle!(verbose, upload_id = %self.id(), "upload complete, clearing session");
        self.session.reset()?;
        self.finished.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Stops before the next chunk. A chunk already in flight completes.
    pub fn pause(&self) {
        lifecycle!(self.options.debug, upload_id = %self.id(), "pausing upload");
        self.traverser.pause();
    }

    /// Releases a paused upload.
    pub fn unpause(&self) {
        lifecycle!(self.options.debug, upload_id = %self.id(), "unpausing upload");
        self.traverser.unpause();
    }

    /// Stops the upload for good and deletes its persisted session.
    ///
    /// A running [`start`](Self::start) returns [`UploadError::Cancelled`]
    /// at its next chunk boundary. A new `Upload` with the same id starts
    /// from scratch.
    pub fn cancel(&self) -> Result<(), UploadError> {
        lifecycle!(self.options.debug, upload_id = %self.id(), "cancelling upload");
        self.traverser.gate().cancel();
        self.session.reset()?;
        Ok(())
    }

    async fn upload_chunk(&self, chunk: Chunk) -> Result<ControlFlow<()>, UploadError> {
        let window = chunk.window;
        let total = self.traverser.file_size();

        debug!(
            upload_id = %self.id(),
            chunk_index = window.index,
            start = window.start,
            end = window.end(),
            "uploading chunk"
        );

        let on_progress = self.options.on_progress.clone().map(|cb| -> BytesSentCallback {
            Arc::new(move |sent: u64| {
                cb(&ChunkProgress {
                    total_bytes: total,
                    uploaded_bytes: window.start + sent,
                    chunk_index: window.index,
                    chunk_length: window.len,
                })
            })
        });

        let response = self
            .endpoint
            .put(
                Some(Bytes::from(chunk.data)),
                window.content_range(total),
                on_progress,
            )
            .await?;

        if self.traverser.gate().is_cancelled() {
            warn!(
                upload_id = %self.id(),
                chunk_index = window.index,
                "chunk acknowledged after cancellation, not recording it"
            );
            return Err(UploadError::Cancelled);
        }
        self.endpoint.check(&response, CHUNK_ACCEPTED)?;

        if self.options.validate_checksum {
            self.session.add_checksum(window.index, chunk.checksum)?;
            // A cancel that raced the write above has already reset the record.
            if self.traverser.gate().is_cancelled() {
                self.session.reset()?;
                return Err(UploadError::Cancelled);
            }
        }

        let uploaded = window.end() + 1;
        if let Some(cb) = &self.options.on_chunk_upload {
            cb(&ChunkUploaded {
                total_bytes: Some(total),
                uploaded_bytes: uploaded,
                chunk_index: window.index,
                chunk_length: window.len,
                is_last_chunk: uploaded == total,
            });
        }

        debug!(
            upload_id = %self.id(),
            chunk_index = window.index,
            status = response.status,
            "chunk acknowledged"
        );
        Ok(ControlFlow::Continue(()))
    }
}
