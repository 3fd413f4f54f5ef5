use std::sync::Arc;

use resumable_protocol::constants::session_key;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::TransferError;
use crate::store::KeyValueStore;

/// Persisted progress of one upload.
///
/// `checksums[i]` is present once chunk `i` was processed locally and
/// acknowledged by the endpoint. `started` is set by the first acknowledged
/// chunk and cleared only by a reset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadSession {
    #[serde(default)]
    pub checksums: Vec<Option<String>>,
    pub chunk_size: u64,
    #[serde(default)]
    pub started: bool,
    #[serde(default)]
    pub file_size: u64,
}

impl UploadSession {
    /// Empty record for a fresh upload.
    pub fn new(file_size: u64, chunk_size: u64) -> Self {
        Self {
            checksums: Vec::new(),
            chunk_size,
            started: false,
            file_size,
        }
    }
}

/// Per-upload view over a [`KeyValueStore`].
///
/// Every mutation is written through immediately. A single writer per upload
/// id is assumed; nothing here locks across processes.
pub struct SessionStore {
    id: String,
    key: String,
    file_size: u64,
    chunk_size: u64,
    store: Arc<dyn KeyValueStore>,
}

impl SessionStore {
    pub fn new(
        id: impl Into<String>,
        file_size: u64,
        chunk_size: u64,
        store: Arc<dyn KeyValueStore>,
    ) -> Self {
        let id = id.into();
        Self {
            key: session_key(&id),
            id,
            file_size,
            chunk_size,
            store,
        }
    }

    /// Upload id this store is scoped to.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the persisted record, or a fresh one if none exists.
    ///
    /// A record that does not parse is treated as absent.
    pub fn read(&self) -> UploadSession {
        let Some(raw) = self.store.get(&self.key) else {
            return UploadSession::new(self.file_size, self.chunk_size);
        };
        match serde_json::from_str(&raw) {
            Ok(session) => session,
            Err(e) => {
                warn!(upload_id = %self.id, error = %e, "discarding unreadable session record");
                UploadSession::new(self.file_size, self.chunk_size)
            }
        }
    }

    /// Overwrites the persisted record; `None` deletes it.
    pub fn write(&self, session: Option<&UploadSession>) -> Result<(), TransferError> {
        match session {
            Some(session) => {
                let json = serde_json::to_string(session).map_err(crate::StoreError::from)?;
                self.store.set(&self.key, &json)?;
            }
            None => self.store.remove(&self.key)?,
        }
        Ok(())
    }

    /// Whether a previous run left progress that can be resumed.
    ///
    /// `forced` short-circuits the check. Otherwise the session must have
    /// started with the same chunk size as configured now.
    pub fn is_resumable(&self, forced: bool) -> bool {
        if forced {
            return true;
        }
        let session = self.read();
        session.started && session.chunk_size == self.chunk_size
    }

    /// Local high-water mark: the length of the stored checksum sequence.
    pub fn resume_index(&self) -> usize {
        self.read().checksums.len()
    }

    /// Persisted file size (the configured one for a fresh record).
    pub fn file_size(&self) -> u64 {
        self.read().file_size
    }

    /// Records the checksum of an acknowledged chunk and marks the session
    /// started.
    pub fn add_checksum(&self, index: usize, checksum: Option<String>) -> Result<(), TransferError> {
        let mut session = self.read();
        if session.checksums.len() <= index {
            session.checksums.resize(index + 1, None);
        }
        session.checksums[index] = checksum;
        session.started = true;
        self.write(Some(&session))
    }

    /// Stored checksum of chunk `index`, if any.
    pub fn checksum(&self, index: usize) -> Option<String> {
        self.read().checksums.into_iter().nth(index).flatten()
    }

    /// Deletes the persisted record.
    pub fn reset(&self) -> Result<(), TransferError> {
        self.write(None)
    }
}
