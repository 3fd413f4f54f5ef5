//! Reconciling a persisted session with what the endpoint holds.

use std::ops::ControlFlow;

use resumable_transfer::{ChunkTraverser, SessionStore};
use tracing::{debug, warn};

use crate::endpoint::Endpoint;
use crate::error::{ChecksumMismatch, UploadError};

/// Where a resumed upload continues.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResumePlan {
    /// Chunks `[0, from)` are known good on both sides.
    Resume { from: usize },
    /// A replayed chunk disagreed; the session was reset.
    Restart { mismatch: ChecksumMismatch },
}

impl ResumePlan {
    /// Index of the first chunk to send.
    pub fn start_index(&self) -> usize {
        match self {
            Self::Resume { from } => *from,
            Self::Restart { .. } => 0,
        }
    }
}

/// Decides where a resumable upload continues.
///
/// The endpoint is the authority on what it holds. Without checksum
/// validation its offset is used as is. With validation the local record is
/// trusted only up to `min(local, remote)` chunks, and only after replaying
/// those chunks from the source reproduces every persisted checksum.
pub struct ResumeReconciler<'a> {
    endpoint: &'a Endpoint,
    session: &'a SessionStore,
    traverser: &'a ChunkTraverser,
    validate: bool,
    verbose: bool,
}

impl<'a> ResumeReconciler<'a> {
    pub fn new(
        endpoint: &'a Endpoint,
        session: &'a SessionStore,
        traverser: &'a ChunkTraverser,
        validate: bool,
    ) -> Self {
        Self {
            endpoint,
            session,
            traverser,
            validate,
            verbose: false,
        }
    }

    /// Logs lifecycle events at `info`.
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub async fn reconcile(&self) -> Result<ResumePlan, UploadError> {
        let id = self.endpoint.id();
        let local = self.session.resume_index();
        let remote = self
            .endpoint
            .remote_resume_index(
                Some(self.traverser.file_size()),
                self.traverser.chunk_size(),
            )
            .await?;

        if !self.validate {
            lifecycle!(self.verbose, upload_id = %id, remote, "resuming at remote offset");
            return Ok(ResumePlan::Resume { from: remote });
        }

        let target = local.min(remote);
        lifecycle!(
            self.verbose,
            upload_id = %id,
            local,
            remote,
            target,
            "validating chunks before resume"
        );

        match self.replay(target).await {
            Ok(()) => {
                lifecycle!(self.verbose, upload_id = %id, from = target, "resuming upload");
                Ok(ResumePlan::Resume { from: target })
            }
            Err(UploadError::DifferentChunk(mismatch)) => {
                warn!(
                    upload_id = %id,
                    chunk_index = mismatch.chunk_index,
                    "local bytes differ from the uploaded ones, restarting from scratch"
                );
                Ok(ResumePlan::Restart { mismatch })
            }
            Err(e) => Err(e),
        }
    }

    /// Re-reads chunks `[0, target)` and compares their checksums with the
    /// persisted ones. The session is reset on the first mismatch.
    async fn replay(&self, target: usize) -> Result<(), UploadError> {
        self.traverser
            .run(0, Some(target), |chunk| async move {
                let index = chunk.window.index;
                let original = self.session.checksum(index);
                if original != chunk.checksum {
                    self.session.reset()?;
                    return Err(UploadError::DifferentChunk(ChecksumMismatch {
                        chunk_index: index,
                        original,
                        computed: chunk.checksum,
                    }));
                }
                debug!(upload_id = %self.endpoint.id(), chunk_index = index, "chunk validated");
                Ok::<_, UploadError>(ControlFlow::Continue(()))
            })
            .await
    }
}
