use serde::{Deserialize, Serialize};

/// Byte-level progress of the chunk currently being sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkProgress {
    /// Size of the whole upload. For streaming uploads the total is unknown,
    /// so this is the end of the current chunk instead.
    pub total_bytes: u64,
    pub uploaded_bytes: u64,
    pub chunk_index: usize,
    pub chunk_length: u64,
}

/// Emitted once the endpoint acknowledged a chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkUploaded {
    /// `None` for streaming uploads.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_bytes: Option<u64>,
    pub uploaded_bytes: u64,
    pub chunk_index: usize,
    pub chunk_length: u64,
    pub is_last_chunk: bool,
}

/// Emitted when a streaming chunk exhausted its retries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkFailed {
    pub chunk_index: usize,
}
