//! Upload options and file-backed upload settings.
//!
//! [`UploadOptions`] and [`StreamOptions`] enumerate everything an upload
//! recognizes, callbacks included. [`UploadSettings`] is the serializable
//! subset a host keeps in its TOML config and turns into options per upload.

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use resumable_protocol::constants::DEFAULT_CONTENT_TYPE;
use resumable_protocol::{ChunkFailed, ChunkProgress, ChunkUploaded, MIN_CHUNK_SIZE};
use serde::{Deserialize, Serialize};

use crate::error::UploadError;

/// Default chunk size: the endpoint minimum.
pub const DEFAULT_CHUNK_SIZE: u64 = MIN_CHUNK_SIZE;

/// Default delay between streaming retries.
pub const DEFAULT_BACKOFF: Duration = Duration::from_millis(1000);

/// Default number of streaming retries after the first attempt.
pub const DEFAULT_RETRY_LIMIT: u32 = 5;

pub type ProgressCallback = Arc<dyn Fn(&ChunkProgress) + Send + Sync>;
pub type ChunkUploadCallback = Arc<dyn Fn(&ChunkUploaded) + Send + Sync>;
pub type ChunkFailCallback = Arc<dyn Fn(&ChunkFailed) + Send + Sync>;

/// Options of a fixed-length [`Upload`](crate::Upload).
#[derive(Clone)]
pub struct UploadOptions {
    /// Identifies the upload; scopes the persisted session.
    pub id: String,
    /// Resumable session URL chunks are `PUT` to.
    pub url: String,
    pub chunk_size: u64,
    pub content_type: String,
    /// Probe and reconcile even without a persisted session.
    pub resumable: bool,
    /// Fingerprint chunks, persist the fingerprints and verify them on resume.
    pub validate_checksum: bool,
    /// Accept chunk sizes that are not a multiple of [`MIN_CHUNK_SIZE`].
    pub allow_small_chunks: bool,
    /// Log lifecycle events at `info` instead of `debug`.
    pub debug: bool,
    pub on_progress: Option<ProgressCallback>,
    pub on_chunk_upload: Option<ChunkUploadCallback>,
}

impl UploadOptions {
    /// Defaults for `id` uploading to `url`.
    pub fn new(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), UploadError> {
        require(&self.id, "id")?;
        require(&self.url, "url")?;
        validate_chunk_size(self.chunk_size, self.allow_small_chunks)
    }
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            id: String::new(),
            url: String::new(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            content_type: DEFAULT_CONTENT_TYPE.into(),
            resumable: true,
            validate_checksum: true,
            allow_small_chunks: false,
            debug: false,
            on_progress: None,
            on_chunk_upload: None,
        }
    }
}

impl fmt::Debug for UploadOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadOptions")
            .field("id", &self.id)
            .field("url", &self.url)
            .field("chunk_size", &self.chunk_size)
            .field("content_type", &self.content_type)
            .field("resumable", &self.resumable)
            .field("validate_checksum", &self.validate_checksum)
            .field("allow_small_chunks", &self.allow_small_chunks)
            .field("debug", &self.debug)
            .finish_non_exhaustive()
    }
}

/// Options of an [`UploadStream`](crate::UploadStream).
#[derive(Clone)]
pub struct StreamOptions {
    pub id: String,
    pub url: String,
    pub chunk_size: u64,
    pub content_type: String,
    pub allow_small_chunks: bool,
    pub debug: bool,
    /// Retries after the first failed attempt of a chunk.
    pub retry_limit: u32,
    /// Fixed delay before each retry.
    pub backoff: Duration,
    pub on_progress: Option<ProgressCallback>,
    pub on_chunk_upload: Option<ChunkUploadCallback>,
    pub on_chunk_upload_fail: Option<ChunkFailCallback>,
}

impl StreamOptions {
    pub fn new(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), UploadError> {
        require(&self.id, "id")?;
        require(&self.url, "url")?;
        validate_chunk_size(self.chunk_size, self.allow_small_chunks)
    }
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            id: String::new(),
            url: String::new(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            content_type: DEFAULT_CONTENT_TYPE.into(),
            allow_small_chunks: false,
            debug: false,
            retry_limit: DEFAULT_RETRY_LIMIT,
            backoff: DEFAULT_BACKOFF,
            on_progress: None,
            on_chunk_upload: None,
            on_chunk_upload_fail: None,
        }
    }
}

impl fmt::Debug for StreamOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamOptions")
            .field("id", &self.id)
            .field("url", &self.url)
            .field("chunk_size", &self.chunk_size)
            .field("content_type", &self.content_type)
            .field("allow_small_chunks", &self.allow_small_chunks)
            .field("debug", &self.debug)
            .field("retry_limit", &self.retry_limit)
            .field("backoff", &self.backoff)
            .finish_non_exhaustive()
    }
}

fn require(value: &str, name: &'static str) -> Result<(), UploadError> {
    if value.is_empty() {
        return Err(UploadError::MissingOption(name));
    }
    Ok(())
}

/// Chunk sizes must be a positive multiple of [`MIN_CHUNK_SIZE`]; with
/// `allow_small` any positive size passes.
pub fn validate_chunk_size(chunk_size: u64, allow_small: bool) -> Result<(), UploadError> {
    let valid = chunk_size > 0 && (allow_small || chunk_size % MIN_CHUNK_SIZE == 0);
    if valid {
        Ok(())
    } else {
        Err(UploadError::InvalidChunkSize { chunk_size })
    }
}

/// Errors loading or saving [`UploadSettings`].
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Upload tuning kept in a host's configuration file.
///
/// ```toml
/// chunk_size = 1048576
/// content_type = "application/octet-stream"
/// validate_checksum = false
/// retry_limit = 3
/// backoff_ms = 250
/// ```
///
/// Every field is optional.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadSettings {
    pub chunk_size: u64,
    pub content_type: String,
    pub resumable: bool,
    pub validate_checksum: bool,
    pub allow_small_chunks: bool,
    pub debug: bool,
    pub retry_limit: u32,
    pub backoff_ms: u64,
}

impl Default for UploadSettings {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            content_type: DEFAULT_CONTENT_TYPE.into(),
            resumable: true,
            validate_checksum: true,
            allow_small_chunks: false,
            debug: false,
            retry_limit: DEFAULT_RETRY_LIMIT,
            backoff_ms: DEFAULT_BACKOFF.as_millis() as u64,
        }
    }
}

impl UploadSettings {
    pub fn from_toml_str(s: &str) -> Result<Self, SettingsError> {
        Ok(toml::from_str(s)?)
    }

    pub fn from_json_str(s: &str) -> Result<Self, SettingsError> {
        Ok(serde_json::from_str(s)?)
    }

    /// Loads settings from a TOML file, falling back to defaults if the file
    /// does not exist.
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no upload settings file, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Writes the settings to `path` as TOML, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<(), SettingsError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, toml::to_string_pretty(self)?)?;
        tracing::debug!(path = %path.display(), "upload settings saved");
        Ok(())
    }

    /// Options for a fixed-length upload of `id` to `url`.
    pub fn upload_options(&self, id: impl Into<String>, url: impl Into<String>) -> UploadOptions {
        UploadOptions {
            id: id.into(),
            url: url.into(),
            chunk_size: self.chunk_size,
            content_type: self.content_type.clone(),
            resumable: self.resumable,
            validate_checksum: self.validate_checksum,
            allow_small_chunks: self.allow_small_chunks,
            debug: self.debug,
            on_progress: None,
            on_chunk_upload: None,
        }
    }

    /// Options for a streaming upload of `id` to `url`.
    pub fn stream_options(&self, id: impl Into<String>, url: impl Into<String>) -> StreamOptions {
        StreamOptions {
            id: id.into(),
            url: url.into(),
            chunk_size: self.chunk_size,
            content_type: self.content_type.clone(),
            allow_small_chunks: self.allow_small_chunks,
            debug: self.debug,
            retry_limit: self.retry_limit,
            backoff: Duration::from_millis(self.backoff_ms),
            on_progress: None,
            on_chunk_upload: None,
            on_chunk_upload_fail: None,
        }
    }
}
