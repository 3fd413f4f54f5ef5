//! Upload error types.

use std::fmt;

use resumable_protocol::{MIN_CHUNK_SIZE, RangeError, ResponseKind};
use resumable_transfer::{StoreError, TransferError};

use crate::transport::TransportError;

/// A replayed chunk whose checksum disagrees with the persisted one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChecksumMismatch {
    pub chunk_index: usize,
    /// Checksum persisted when the chunk was first acknowledged.
    pub original: Option<String>,
    /// Checksum of the local bytes now.
    pub computed: Option<String>,
}

impl fmt::Display for ChecksumMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "chunk {}: stored {}, computed {}",
            self.chunk_index,
            self.original.as_deref().unwrap_or("<none>"),
            self.computed.as_deref().unwrap_or("<none>"),
        )
    }
}

/// Errors produced by [`Upload`](crate::Upload) and
/// [`UploadStream`](crate::UploadStream).
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("invalid chunk size {chunk_size}: must be a positive multiple of {}", MIN_CHUNK_SIZE)]
    InvalidChunkSize { chunk_size: u64 },

    #[error("missing required option `{0}`")]
    MissingOption(&'static str),

    #[error("upload {id} already finished")]
    AlreadyFinished { id: String },

    #[error("upload {id} incomplete at {url} (status {status})")]
    UploadIncomplete { id: String, url: String, status: u16 },

    #[error("file {id} already uploaded to {url} (status {status})")]
    FileAlreadyUploaded { id: String, url: String, status: u16 },

    #[error("bad request to {url} (status {status})")]
    BadRequest { url: String, status: u16 },

    #[error("upload URL not found: {url}")]
    UrlNotFound { url: String, status: u16 },

    #[error("upload to {url} failed with server status {status}")]
    UploadFailed { url: String, status: u16 },

    #[error("unknown response status {status} from {url}")]
    UnknownResponse { url: String, status: u16 },

    #[error(transparent)]
    MalformedRange(#[from] RangeError),

    #[error("checksum mismatch on resume, {0}")]
    DifferentChunk(ChecksumMismatch),

    #[error("chunk {chunk_index} has no bytes and is not the last chunk")]
    EmptyChunk { chunk_index: usize },

    #[error("unable to recover chunk {chunk_index} after {attempts} attempt(s): {source}")]
    UnableToRecover {
        chunk_index: usize,
        attempts: u32,
        #[source]
        source: Box<UploadError>,
    },

    #[error("upload cancelled")]
    Cancelled,

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("transfer error: {0}")]
    Transfer(TransferError),
}

impl UploadError {
    /// Error for a status the caller did not allow.
    pub fn from_response(kind: ResponseKind, status: u16, id: &str, url: &str) -> Self {
        let (id, url) = (id.to_string(), url.to_string());
        match kind {
            ResponseKind::Incomplete => Self::UploadIncomplete { id, url, status },
            ResponseKind::AlreadyUploaded => Self::FileAlreadyUploaded { id, url, status },
            ResponseKind::BadRequest => Self::BadRequest { url, status },
            ResponseKind::NotFound => Self::UrlNotFound { url, status },
            ResponseKind::ServerFailure => Self::UploadFailed { url, status },
            ResponseKind::Unrecognized => Self::UnknownResponse { url, status },
        }
    }

    /// HTTP status carried by response errors.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::UploadIncomplete { status, .. }
            | Self::FileAlreadyUploaded { status, .. }
            | Self::BadRequest { status, .. }
            | Self::UrlNotFound { status, .. }
            | Self::UploadFailed { status, .. }
            | Self::UnknownResponse { status, .. } => Some(*status),
            Self::UnableToRecover { source, .. } => source.status(),
            _ => None,
        }
    }
}

impl From<TransferError> for UploadError {
    fn from(e: TransferError) -> Self {
        match e {
            TransferError::Cancelled => Self::Cancelled,
            other => Self::Transfer(other),
        }
    }
}

impl From<StoreError> for UploadError {
    fn from(e: StoreError) -> Self {
        Self::Transfer(TransferError::Store(e))
    }
}
