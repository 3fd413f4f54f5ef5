//! A remote upload target: one URL, one content type, one transport.

use std::sync::Arc;

use bytes::Bytes;
use resumable_protocol::constants::{CONTENT_RANGE, CONTENT_TYPE, RANGE, STATUS_INCOMPLETE};
use resumable_protocol::{ContentRange, ResponseKind, acknowledged_bytes};
use tracing::{debug, warn};

use crate::error::UploadError;
use crate::transport::{BytesSentCallback, PutRequest, PutResponse, Transport};

/// Sends chunks and offset probes for one upload and interprets the answers.
#[derive(Clone)]
pub struct Endpoint {
    id: String,
    url: String,
    content_type: String,
    transport: Arc<dyn Transport>,
}

impl Endpoint {
    pub fn new(
        id: impl Into<String>,
        url: impl Into<String>,
        content_type: impl Into<String>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            content_type: content_type.into(),
            transport,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Sends one `PUT` with the given range. `body` is `None` for probes.
    pub async fn put(
        &self,
        body: Option<Bytes>,
        range: ContentRange,
        on_progress: Option<BytesSentCallback>,
    ) -> Result<PutResponse, UploadError> {
        let request = PutRequest {
            url: self.url.clone(),
            body,
            headers: vec![
                (CONTENT_TYPE.to_string(), self.content_type.clone()),
                (CONTENT_RANGE.to_string(), range.to_string()),
            ],
            on_progress,
        };
        let response = self.transport.put(request).await?;
        debug!(
            upload_id = %self.id,
            range = %range,
            status = response.status,
            "endpoint answered"
        );
        Ok(response)
    }

    /// Maps a status outside `allowed` to its error.
    pub fn check(&self, response: &PutResponse, allowed: &[u16]) -> Result<(), UploadError> {
        ResponseKind::check(response.status, allowed).map_err(|kind| {
            warn!(
                upload_id = %self.id,
                url = %self.url,
                status = response.status,
                ?kind,
                "unexpected response status"
            );
            UploadError::from_response(kind, response.status, &self.id, &self.url)
        })
    }

    /// Asks the endpoint how many bytes it holds and converts that into the
    /// index of the first chunk it does not fully hold.
    ///
    /// `total` is `None` while the upload length is unknown.
    pub async fn remote_resume_index(
        &self,
        total: Option<u64>,
        chunk_size: u64,
    ) -> Result<usize, UploadError> {
        let response = self.put(None, ContentRange::Probe { total }, None).await?;
        self.check(&response, &[STATUS_INCOMPLETE])?;

        let acknowledged = acknowledged_bytes(response.header(RANGE))?;
        let index = (acknowledged / chunk_size) as usize;
        debug!(upload_id = %self.id, acknowledged, index, "remote offset");
        Ok(index)
    }
}
