/// Smallest chunk size the endpoint accepts for non-final chunks (256 KiB).
///
/// Configured chunk sizes must be a positive multiple of this value unless the
/// caller explicitly opts into small chunks.
pub const MIN_CHUNK_SIZE: u64 = 256 * 1024;

/// Namespace prefix of persisted session keys (`<prefix>.<upload id>`).
pub const SESSION_KEY_PREFIX: &str = "__resumableUpload";

/// Request header describing the byte window carried by a `PUT`.
pub const CONTENT_RANGE: &str = "Content-Range";

/// Request header carrying the payload media type.
pub const CONTENT_TYPE: &str = "Content-Type";

/// Response header reporting the bytes the endpoint has acknowledged.
///
/// Transports are expected to hand headers over with lower-cased names.
pub const RANGE: &str = "range";

/// Default payload media type.
pub const DEFAULT_CONTENT_TYPE: &str = "text/plain";

/// Status the endpoint answers while an upload is still incomplete.
pub const STATUS_INCOMPLETE: u16 = 308;

/// Returns the storage key of the session persisted for `upload_id`.
pub fn session_key(upload_id: &str) -> String {
    format!("{SESSION_KEY_PREFIX}.{upload_id}")
}
