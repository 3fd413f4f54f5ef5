//! [`Transport`] over HTTP with `reqwest`.
//!
//! Bodies with a progress callback are streamed in [`PIECE_SIZE`] pieces and
//! the callback fires as each piece is handed to the connection. Redirects are
//! never followed: the upload endpoint answers `308` to mean "incomplete".

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use futures_util::stream::{self, StreamExt};
use reqwest::header::CONTENT_LENGTH;
use resumable_upload::{BytesSentCallback, PutRequest, PutResponse, Transport, TransportError};
use tracing::{debug, warn};

/// Size of the pieces a body is streamed in when progress is reported.
pub const PIECE_SIZE: usize = 64 * 1024;

/// HTTP `PUT` transport.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Transport with no request timeout.
    pub fn new() -> Result<Self, TransportError> {
        Self::build(None)
    }

    /// Transport whose requests fail with [`TransportError::Timeout`] after
    /// `timeout`.
    pub fn with_timeout(timeout: Duration) -> Result<Self, TransportError> {
        Self::build(Some(timeout))
    }

    /// Wraps an existing client. It must be built with redirects disabled.
    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    fn build(timeout: Option<Duration>) -> Result<Self, TransportError> {
        let mut builder = reqwest::Client::builder().redirect(reqwest::redirect::Policy::none());
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(map_error)?;
        Ok(Self { client })
    }

    async fn send(&self, request: PutRequest) -> Result<PutResponse, TransportError> {
        let len = request.body_len();
        let mut builder = self.client.put(&request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        builder = builder.header(CONTENT_LENGTH, len);

        builder = match (request.body, request.on_progress) {
            (Some(body), Some(on_progress)) => builder.body(progress_body(body, on_progress)),
            (Some(body), None) => builder.body(body),
            (None, _) => builder.body(Bytes::new()),
        };

        let response = builder.send().await.map_err(|e| {
            warn!(url = %request.url, error = %e, "PUT failed");
            map_error(e)
        })?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                let value = value.to_str().ok()?;
                Some((name.as_str().to_ascii_lowercase(), value.to_string()))
            })
            .collect();
        debug!(url = %request.url, status, body_len = len, "PUT answered");

        Ok(PutResponse { status, headers })
    }
}

impl Transport for HttpTransport {
    fn put(
        &self,
        request: PutRequest,
    ) -> Pin<Box<dyn Future<Output = Result<PutResponse, TransportError>> + Send + '_>> {
        Box::pin(self.send(request))
    }
}

/// Streams `body` in [`PIECE_SIZE`] slices, reporting the running total.
fn progress_body(body: Bytes, on_progress: BytesSentCallback) -> reqwest::Body {
    let len = body.len();
    let pieces: Vec<Bytes> = (0..len)
        .step_by(PIECE_SIZE)
        .map(|start| body.slice(start..len.min(start + PIECE_SIZE)))
        .collect();

    let mut sent = 0u64;
    let stream = stream::iter(pieces).map(move |piece| {
        sent += piece.len() as u64;
        on_progress(sent);
        Ok::<_, std::io::Error>(piece)
    });
    reqwest::Body::wrap_stream(stream)
}

fn map_error(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout
    } else if e.is_builder() {
        TransportError::InvalidRequest(e.to_string())
    } else if e.is_connect() || e.is_request() {
        TransportError::Connection(e.to_string())
    } else {
        TransportError::Response(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// What the mock server read off the socket.
    #[derive(Debug, Default)]
    struct Received {
        head: String,
        body: Vec<u8>,
    }

    impl Received {
        fn header(&self, name: &str) -> Option<String> {
            self.head.lines().skip(1).find_map(|line| {
                let (k, v) = line.split_once(':')?;
                k.trim()
                    .eq_ignore_ascii_case(name)
                    .then(|| v.trim().to_string())
            })
        }
    }

    /// Accepts one connection, reads one request and answers with `response`.
    async fn serve_once(response: &'static str) -> (String, tokio::task::JoinHandle<Received>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/upload/session-1", listener.local_addr().unwrap());
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let received = read_request(&mut socket).await;
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.flush().await.unwrap();
            received
        });
        (url, handle)
    }

    async fn read_request(socket: &mut tokio::net::TcpStream) -> Received {
        let mut buf = Vec::new();
        let mut tmp = [0u8; 8192];
        let head_end = loop {
            let n = socket.read(&mut tmp).await.unwrap();
            assert!(n > 0, "connection closed before request head");
            buf.extend_from_slice(&tmp[..n]);
            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
        };
        let head = String::from_utf8_lossy(&buf[..head_end]).into_owned();
        let mut received = Received {
            head,
            body: buf[head_end..].to_vec(),
        };
        let expected: usize = received
            .header("content-length")
            .map(|v| v.parse().unwrap())
            .unwrap_or(0);
        while received.body.len() < expected {
            let n = socket.read(&mut tmp).await.unwrap();
            assert!(n > 0, "connection closed mid-body");
            received.body.extend_from_slice(&tmp[..n]);
        }
        received
    }

    fn request(url: &str, body: Option<Vec<u8>>, range: &str) -> PutRequest {
        PutRequest {
            url: url.to_string(),
            body: body.map(Bytes::from),
            headers: vec![
                ("Content-Type".into(), "text/plain".into()),
                ("Content-Range".into(), range.into()),
            ],
            on_progress: None,
        }
    }

    #[tokio::test]
    async fn sends_put_with_headers_and_body() {
        let (url, server) = serve_once(
            "HTTP/1.1 308 Permanent Redirect\r\nRange: bytes=0-4\r\nLocation: http://127.0.0.1:9/elsewhere\r\nContent-Length: 0\r\n\r\n",
        )
        .await;

        let transport = HttpTransport::new().unwrap();
        let response = transport
            .put(request(&url, Some(b"hello".to_vec()), "bytes 0-4/10"))
            .await
            .unwrap();

        assert_eq!(response.status, 308);
        assert_eq!(response.header("range"), Some("bytes=0-4"));
        assert!(response.headers.contains_key("range"));

        let received = server.await.unwrap();
        assert!(received.head.starts_with("PUT /upload/session-1 HTTP/1.1"));
        assert_eq!(received.header("content-range").as_deref(), Some("bytes 0-4/10"));
        assert_eq!(received.header("content-type").as_deref(), Some("text/plain"));
        assert_eq!(received.body, b"hello");
    }

    #[tokio::test]
    async fn probe_sends_empty_body() {
        let (url, server) = serve_once("HTTP/1.1 308 Resume Incomplete\r\nContent-Length: 0\r\n\r\n").await;

        let transport = HttpTransport::new().unwrap();
        let response = transport
            .put(request(&url, None, "bytes */*"))
            .await
            .unwrap();
        assert_eq!(response.status, 308);
        assert_eq!(response.header("range"), None);

        let received = server.await.unwrap();
        assert_eq!(received.header("content-length").as_deref(), Some("0"));
        assert_eq!(received.header("content-range").as_deref(), Some("bytes */*"));
        assert!(received.body.is_empty());
    }

    #[tokio::test]
    async fn streamed_body_reports_progress() {
        let (url, server) = serve_once("HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n").await;
        let data: Vec<u8> = (0..200_000).map(|i| (i % 256) as u8).collect();

        let seen = Arc::new(Mutex::new(Vec::<u64>::new()));
        let sink = Arc::clone(&seen);
        let mut req = request(&url, Some(data.clone()), "bytes 0-199999/200000");
        req.on_progress = Some(Arc::new(move |sent| sink.lock().unwrap().push(sent)));

        let transport = HttpTransport::new().unwrap();
        let response = transport.put(req).await.unwrap();
        assert_eq!(response.status, 200);

        let received = server.await.unwrap();
        assert_eq!(received.header("content-length").as_deref(), Some("200000"));
        assert_eq!(received.body, data);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 4);
        assert_eq!(*seen.last().unwrap(), 200_000);
        assert!(seen.windows(2).all(|w| w[0] < w[1]));
    }

    #[tokio::test]
    async fn refused_connection_is_connection_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/gone", listener.local_addr().unwrap());
        drop(listener);

        let err = HttpTransport::new()
            .unwrap()
            .put(request(&url, None, "bytes */*"))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Connection(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn silent_server_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/slow", listener.local_addr().unwrap());
        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
            drop(socket);
        });

        let transport = HttpTransport::with_timeout(Duration::from_millis(100)).unwrap();
        let err = transport
            .put(request(&url, None, "bytes */*"))
            .await
            .unwrap_err();
        assert_eq!(err, TransportError::Timeout);
        server.abort();
    }

    #[tokio::test]
    async fn wrapped_client_passes_status_through() {
        let (url, server) = serve_once("HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\n\r\n").await;
        let transport: Arc<dyn Transport> =
            Arc::new(HttpTransport::from_client(reqwest::Client::new()));
        let response = transport
            .put(request(&url, None, "bytes */*"))
            .await
            .unwrap();
        assert_eq!(response.status, 404);
        server.await.unwrap();
    }
}
