//! The outbound network seam of the offline worker.
//!
//! [`Network`] is the one capability the worker needs from the environment
//! besides its cache store: issue a request, get back a [`Snapshot`] or a
//! failure. [`TcpNetwork`] is the production implementation — HTTP/1.1 over
//! a fresh TCP connection per request against a configured origin, with a
//! bounded wait so an unreachable network turns into a failure instead of a
//! hang. One bounded attempt, no retry, no backoff: offline detection is
//! the transport error or the deadline, whichever fires first.

use std::time::Duration;

use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

use crate::http::{Headers, Method, Request};
use crate::offline::store::{CacheKey, Snapshot};

/// Outbound request failures.
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("failed to connect to {origin}: {source}")]
    Connect {
        origin: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error during exchange: {0}")]
    Io(#[from] std::io::Error),

    #[error("no response within {limit:?}")]
    Timeout { limit: Duration },

    #[error("malformed upstream response: {0}")]
    Malformed(String),
}

/// A request about to leave the process: method, target, headers, body.
///
/// This is the worker's own request representation — detached from any
/// inbound connection, cheap to clone, and the thing a [`CacheKey`] is
/// derived from.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    method: Method,
    target: String,
    headers: Headers,
    body: Bytes,
}

// Fields that describe the inbound hop rather than the resource; never
// forwarded upstream.
const HOP_BY_HOP: &[&str] = &[
    "host",
    "connection",
    "keep-alive",
    "proxy-connection",
    "transfer-encoding",
    "te",
    "trailer",
    "upgrade",
    "content-length",
];

impl OutboundRequest {
    /// Creates a request with no headers and an empty body.
    pub fn new(method: Method, target: impl Into<String>) -> Self {
        Self {
            method,
            target: target.into(),
            headers: Headers::new(),
            body: Bytes::new(),
        }
    }

    /// Creates a plain GET — how manifest assets are fetched at install.
    pub fn get(target: impl Into<String>) -> Self {
        Self::new(Method::Get, target)
    }

    /// Rebuilds an inbound [`Request`] as an outbound one, dropping
    /// hop-by-hop headers. This is the proxy's forwarding conversion.
    pub fn from_http(request: &Request) -> Self {
        let headers = request
            .headers()
            .iter()
            .filter(|(name, _)| !HOP_BY_HOP.iter().any(|h| name.eq_ignore_ascii_case(h)))
            .map(|(name, value)| (name.to_owned(), value.to_owned()))
            .collect();
        Self {
            method: request.method().clone(),
            target: request.target(),
            headers,
            body: request.body().clone(),
        }
    }

    /// Appends a header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Sets the request body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// The identity this request is cached under.
    pub fn key(&self) -> CacheKey {
        CacheKey::from(self)
    }
}

/// The outbound request contract required of the environment.
#[async_trait]
pub trait Network: Send + Sync {
    /// Performs the request, returning a captured response or a failure.
    async fn fetch(&self, request: &OutboundRequest) -> Result<Snapshot, NetworkError>;
}

/// HTTP/1.1 over TCP against a single configured origin.
///
/// Each fetch opens a fresh connection, sends `Connection: close`, reads to
/// EOF, and parses the bytes into a [`Snapshot`]. The whole exchange runs
/// under one deadline ([`DEFAULT_TIMEOUT`](Self::DEFAULT_TIMEOUT) unless
/// overridden), and deadline expiry is a [`NetworkError::Timeout`] — the
/// caller treats it exactly like an unreachable network.
#[derive(Debug, Clone)]
pub struct TcpNetwork {
    origin: String,
    timeout: Duration,
}

impl TcpNetwork {
    /// The default per-request deadline.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

    /// Creates a network client for `origin` (`host:port`).
    pub fn new(origin: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            timeout: Self::DEFAULT_TIMEOUT,
        }
    }

    /// Overrides the per-request deadline.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    // Serialize the request in HTTP/1.1 wire format. Framing headers are
    // owned here: Host from the origin, Connection: close, Content-Length
    // from the actual body.
    fn encode(&self, request: &OutboundRequest) -> BytesMut {
        let body = request.body();
        let mut buf = BytesMut::with_capacity(256 + body.len());
        buf.put(format!("{} {} HTTP/1.1\r\n", request.method(), request.target()).as_bytes());
        buf.put(format!("Host: {}\r\n", self.origin).as_bytes());
        buf.put(&b"Connection: close\r\n"[..]);
        for (name, value) in request.headers().iter() {
            buf.put(format!("{name}: {value}\r\n").as_bytes());
        }
        if !body.is_empty() {
            buf.put(format!("Content-Length: {}\r\n", body.len()).as_bytes());
        }
        buf.put(&b"\r\n"[..]);
        buf.put(&body[..]);
        buf
    }

    async fn exchange(&self, request: &OutboundRequest) -> Result<Snapshot, NetworkError> {
        let mut stream =
            TcpStream::connect(&self.origin)
                .await
                .map_err(|source| NetworkError::Connect {
                    origin: self.origin.clone(),
                    source,
                })?;

        stream.write_all(&self.encode(request)).await?;
        stream.flush().await?;

        let mut raw = Vec::with_capacity(4096);
        stream.read_to_end(&mut raw).await?;

        parse_response(&raw)
    }
}

#[async_trait]
impl Network for TcpNetwork {
    async fn fetch(&self, request: &OutboundRequest) -> Result<Snapshot, NetworkError> {
        debug!(origin = %self.origin, method = %request.method(), target = %request.target(), "outbound fetch");
        match tokio::time::timeout(self.timeout, self.exchange(request)).await {
            Ok(result) => result,
            Err(_) => Err(NetworkError::Timeout { limit: self.timeout }),
        }
    }
}

/// Maximum number of response headers accepted from upstream.
const MAX_HEADERS: usize = 64;

/// Parse a complete HTTP/1.1 response into a [`Snapshot`].
///
/// The buffer must hold the entire response (the `Connection: close` +
/// read-to-EOF exchange guarantees that). When a `Content-Length` is
/// present and the buffered body is longer, the body is truncated to the
/// declared length; shorter means the peer hung up early, which is an
/// error.
pub fn parse_response(raw: &[u8]) -> Result<Snapshot, NetworkError> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut response = httparse::Response::new(&mut headers);

    let body_offset = match response
        .parse(raw)
        .map_err(|e| NetworkError::Malformed(e.to_string()))?
    {
        httparse::Status::Complete(offset) => offset,
        httparse::Status::Partial => {
            return Err(NetworkError::Malformed("truncated response head".into()));
        }
    };

    let status = response
        .code
        .ok_or_else(|| NetworkError::Malformed("missing status code".into()))?;

    let mut header_pairs = Vec::with_capacity(response.headers.len());
    let mut content_length: Option<usize> = None;
    for header in response.headers.iter() {
        if let Ok(value) = std::str::from_utf8(header.value) {
            if header.name.eq_ignore_ascii_case("content-length") {
                content_length = value.trim().parse().ok();
            }
            header_pairs.push((header.name.to_owned(), value.to_owned()));
        }
    }

    let mut body = raw[body_offset..].to_vec();
    if let Some(declared) = content_length {
        if body.len() < declared {
            return Err(NetworkError::Malformed(format!(
                "body shorter than declared Content-Length ({} < {declared})",
                body.len()
            )));
        }
        body.truncate(declared);
    }

    Ok(Snapshot::new(status, header_pairs, body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    // ── parse_response ───────────────────────────────────────────────────────

    #[test]
    fn parse_simple_response() {
        let raw = b"HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nContent-Length: 5\r\n\r\nhello";
        let snap = parse_response(raw).unwrap();
        assert_eq!(snap.status, 200);
        assert_eq!(snap.body, b"hello");
        assert!(
            snap.headers
                .iter()
                .any(|(k, v)| k == "Content-Type" && v == "text/html")
        );
    }

    #[test]
    fn parse_truncates_to_content_length() {
        let raw = b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nhi-trailing-junk";
        let snap = parse_response(raw).unwrap();
        assert_eq!(snap.body, b"hi");
    }

    #[test]
    fn parse_rejects_short_body() {
        let raw = b"HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\nhi";
        assert!(matches!(
            parse_response(raw),
            Err(NetworkError::Malformed(_))
        ));
    }

    #[test]
    fn parse_rejects_truncated_head() {
        let raw = b"HTTP/1.1 200 OK\r\nContent-Ty";
        assert!(matches!(
            parse_response(raw),
            Err(NetworkError::Malformed(_))
        ));
    }

    #[test]
    fn parse_without_content_length_takes_rest() {
        let raw = b"HTTP/1.1 404 Not Found\r\n\r\ngone";
        let snap = parse_response(raw).unwrap();
        assert_eq!(snap.status, 404);
        assert_eq!(snap.body, b"gone");
    }

    // ── OutboundRequest ──────────────────────────────────────────────────────

    #[test]
    fn from_http_strips_hop_by_hop_headers() {
        let raw = b"POST /api/entries?x=1 HTTP/1.1\r\nHost: proxy.local\r\nConnection: keep-alive\r\nContent-Length: 2\r\nContent-Type: application/json\r\n\r\n{}";
        let (request, _) = Request::parse(raw).unwrap();
        let outbound = OutboundRequest::from_http(&request);

        assert_eq!(outbound.method(), &Method::Post);
        assert_eq!(outbound.target(), "/api/entries?x=1");
        assert!(!outbound.headers().contains("host"));
        assert!(!outbound.headers().contains("connection"));
        assert!(!outbound.headers().contains("content-length"));
        assert_eq!(
            outbound.headers().get("content-type"),
            Some("application/json")
        );
        assert_eq!(&outbound.body()[..], b"{}");
    }

    #[test]
    fn key_uses_method_and_target() {
        let request = OutboundRequest::get("/app.html");
        assert_eq!(request.key().to_string(), "GET /app.html");
    }

    #[test]
    fn encode_owns_framing_headers() {
        let net = TcpNetwork::new("127.0.0.1:3000");
        let request = OutboundRequest::new(Method::Post, "/api/entries")
            .header("Content-Type", "application/json")
            .with_body(&b"{\"title\":\"x\",\"amount\":1}"[..]);
        let wire = String::from_utf8(net.encode(&request).to_vec()).unwrap();

        assert!(wire.starts_with("POST /api/entries HTTP/1.1\r\n"));
        assert!(wire.contains("Host: 127.0.0.1:3000\r\n"));
        assert!(wire.contains("Connection: close\r\n"));
        assert!(wire.contains("Content-Length: 24\r\n"));
        assert!(wire.ends_with("\r\n\r\n{\"title\":\"x\",\"amount\":1}"));
    }

    // ── TcpNetwork ───────────────────────────────────────────────────────────

    #[tokio::test]
    async fn fetch_round_trip_against_local_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = stream.read(&mut buf).await.unwrap();
            stream
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 4\r\n\r\nbody")
                .await
                .unwrap();
        });

        let net = TcpNetwork::new(addr.to_string());
        let snap = net.fetch(&OutboundRequest::get("/")).await.unwrap();
        assert_eq!(snap.status, 200);
        assert_eq!(snap.body, b"body");
    }

    #[tokio::test]
    async fn fetch_times_out_on_silent_peer() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        // accept and then say nothing
        tokio::spawn(async move {
            let (_stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let net =
            TcpNetwork::new(addr.to_string()).with_timeout(Duration::from_millis(50));
        let err = net.fetch(&OutboundRequest::get("/")).await.unwrap_err();
        assert!(matches!(err, NetworkError::Timeout { .. }));
    }

    #[tokio::test]
    async fn fetch_reports_connect_failure() {
        // bind then drop to get a port that refuses connections
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let net = TcpNetwork::new(addr.to_string());
        let err = net.fetch(&OutboundRequest::get("/")).await.unwrap_err();
        assert!(matches!(err, NetworkError::Connect { .. }));
    }
}
