//! Test transports.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;

use crate::transport::{PutRequest, PutResponse, Transport, TransportError};

/// What a transport saw of one request.
#[derive(Debug, Clone)]
pub(crate) struct RecordedRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub has_body: bool,
    pub body_len: usize,
}

impl RecordedRequest {
    fn from_request(req: &PutRequest) -> Self {
        Self {
            url: req.url.clone(),
            headers: req.headers.clone(),
            has_body: req.body.is_some(),
            body_len: req.body_len(),
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Replies with a fixed queue of responses, in order.
pub(crate) struct ScriptedTransport {
    responses: Mutex<VecDeque<Result<PutResponse, TransportError>>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl ScriptedTransport {
    pub fn new(responses: Vec<Result<PutResponse, TransportError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl Transport for ScriptedTransport {
    fn put(
        &self,
        request: PutRequest,
    ) -> Pin<Box<dyn Future<Output = Result<PutResponse, TransportError>> + Send + '_>> {
        Box::pin(async move {
            self.requests
                .lock()
                .unwrap()
                .push(RecordedRequest::from_request(&request));
            if let (Some(cb), Some(body)) = (&request.on_progress, &request.body) {
                cb(body.len() as u64);
            }
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(TransportError::Connection("no scripted response".into())))
        })
    }
}

/// Injected failure for the next chunk `PUT`.
#[derive(Debug, Clone)]
pub(crate) enum Fault {
    Status(u16),
    Transport,
}

#[derive(Default)]
struct ServerState {
    received: Vec<u8>,
    complete: bool,
    chunk_puts: usize,
    accept_limit: Option<usize>,
    faults: VecDeque<Fault>,
    requests: Vec<RecordedRequest>,
}

/// In-memory resumable endpoint.
///
/// Appends chunk bodies at their `Content-Range` offset, answers `308` with
/// the acknowledged range until a chunk completes the announced total, then
/// `200`. A chunk starting inside the held bytes overwrites from there.
#[derive(Default)]
pub(crate) struct FakeServer {
    state: Mutex<ServerState>,
}

impl FakeServer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops the connection on every chunk `PUT` after `n` accepted ones.
    pub fn accept_only(&self, n: usize) {
        self.state.lock().unwrap().accept_limit = Some(n);
    }

    pub fn accept_all(&self) {
        self.state.lock().unwrap().accept_limit = None;
    }

    pub fn push_fault(&self, fault: Fault) {
        self.state.lock().unwrap().faults.push_back(fault);
    }

    /// Pretends the endpoint already holds `bytes`.
    pub fn preload(&self, bytes: &[u8]) {
        self.state.lock().unwrap().received = bytes.to_vec();
    }

    pub fn received(&self) -> Vec<u8> {
        self.state.lock().unwrap().received.clone()
    }

    pub fn is_complete(&self) -> bool {
        self.state.lock().unwrap().complete
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.lock().unwrap().requests.clone()
    }

    /// `Content-Range` values of the chunk `PUT`s, probes excluded.
    pub fn chunk_ranges(&self) -> Vec<String> {
        self.requests()
            .iter()
            .filter(|r| r.has_body)
            .filter_map(|r| r.header("content-range").map(str::to_string))
            .collect()
    }

    pub fn probe_count(&self) -> usize {
        self.requests().iter().filter(|r| !r.has_body).count()
    }

    fn handle(&self, request: &PutRequest) -> Result<PutResponse, TransportError> {
        let mut state = self.state.lock().unwrap();
        state.requests.push(RecordedRequest::from_request(request));

        let range = request.header("content-range").unwrap_or_default().to_string();
        let Some(body) = &request.body else {
            if state.complete {
                return Ok(PutResponse::new(200));
            }
            return Ok(acknowledged(&state.received));
        };

        if let Some(fault) = state.faults.pop_front() {
            return match fault {
                Fault::Status(status) => Ok(PutResponse::new(status)),
                Fault::Transport => Err(TransportError::Connection("connection reset".into())),
            };
        }
        if state.accept_limit.is_some_and(|limit| state.chunk_puts >= limit) {
            return Err(TransportError::Connection("connection reset".into()));
        }

        let Some((start, total)) = parse_chunk_range(&range) else {
            return Ok(PutResponse::new(400));
        };
        if start > state.received.len() as u64 {
            return Ok(PutResponse::new(400));
        }

        state.received.truncate(start as usize);
        state.received.extend_from_slice(body);
        state.chunk_puts += 1;

        if total.is_some_and(|t| t == state.received.len() as u64) {
            state.complete = true;
            return Ok(PutResponse::new(200));
        }
        Ok(acknowledged(&state.received))
    }
}

fn acknowledged(received: &[u8]) -> PutResponse {
    if received.is_empty() {
        return PutResponse::new(308);
    }
    PutResponse::new(308).with_header("range", format!("bytes=0-{}", received.len() - 1))
}

/// `bytes {start}-{end}/{total|*}` -> `(start, total)`.
fn parse_chunk_range(header: &str) -> Option<(u64, Option<u64>)> {
    let rest = header.strip_prefix("bytes ")?;
    let (window, total) = rest.split_once('/')?;
    let total = if total == "*" { None } else { Some(total.parse().ok()?) };
    if window == "*" {
        return Some((total?, total));
    }
    let (start, _) = window.split_once('-')?;
    Some((start.parse().ok()?, total))
}

impl Transport for FakeServer {
    fn put(
        &self,
        request: PutRequest,
    ) -> Pin<Box<dyn Future<Output = Result<PutResponse, TransportError>> + Send + '_>> {
        Box::pin(async move {
            let response = self.handle(&request);
            if response.is_ok()
                && let (Some(cb), Some(body)) = (&request.on_progress, &request.body)
            {
                let len = body.len() as u64;
                cb(len / 2);
                cb(len);
            }
            tokio::task::yield_now().await;
            response
        })
    }
}
