//! HTTP upgrade handshake (RFC 6455 Section 4.2).
//!
//! Reads the client's upgrade request head, validates it, and writes the
//! `101 Switching Protocols` response carrying `Sec-WebSocket-Accept`.
//!
//! # Flow
//!
//! 1. [`read_request`] - read the request head up to the blank line
//! 2. [`UpgradeRequest::websocket_key`] - extract the client key
//! 3. [`write_response`] - write the 101 response
//!
//! [`accept`] runs all three and answers `400 Bad Request` on failure.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use sha1::{Digest, Sha1};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// GUID appended to the client key before hashing.
pub const WEBSOCKET_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Default deadline for receiving the complete request head (5s).
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_millis(5000);

/// Upper bound on the request head size.
const MAX_REQUEST_HEAD: usize = 8 * 1024;

/// Blank line terminating the request head.
const HEAD_TERMINATOR: &[u8] = b"\r\n\r\n";

// ============================================================================
// Accept Key
// ============================================================================

/// Computes `Sec-WebSocket-Accept` for a client key.
///
/// base64(SHA-1(key ++ GUID)).
#[must_use]
pub fn accept_key(client_key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(client_key.as_bytes());
    hasher.update(WEBSOCKET_GUID.as_bytes());
    BASE64.encode(hasher.finalize())
}

/// Builds the complete `101 Switching Protocols` response.
#[must_use]
pub fn response(client_key: &str) -> String {
    [
        "HTTP/1.1 101 Switching Protocols".to_string(),
        "Upgrade: websocket".to_string(),
        "Connection: Upgrade".to_string(),
        format!("Sec-WebSocket-Accept: {}", accept_key(client_key)),
        String::new(),
    ]
    .iter()
    .map(|line| format!("{line}\r\n"))
    .collect()
}

// ============================================================================
// UpgradeRequest
// ============================================================================

/// Parsed request line and headers of an upgrade request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpgradeRequest {
    /// Request method (e.g. `GET`).
    pub method: String,
    /// Request target (e.g. `/`).
    pub path: String,
    /// Headers in arrival order.
    pub headers: Vec<(String, String)>,
}

impl UpgradeRequest {
    /// Parses a request head (without the terminating blank line).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Handshake`] if the request line is malformed.
    pub fn parse(head: &str) -> Result<Self> {
        let mut lines = head.split("\r\n");

        let request_line = lines.next().unwrap_or_default();
        let mut parts = request_line.split_whitespace();
        let (Some(method), Some(path)) = (parts.next(), parts.next()) else {
            return Err(Error::handshake(format!(
                "malformed request line: {request_line:?}"
            )));
        };

        let headers = lines
            .filter_map(|line| line.split_once(':'))
            .map(|(name, value)| (name.trim().to_string(), value.trim().to_string()))
            .collect();

        Ok(Self {
            method: method.to_string(),
            path: path.to_string(),
            headers,
        })
    }

    /// Looks up a header by case-insensitive name.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Returns `true` if `Upgrade: websocket` is present.
    #[must_use]
    pub fn is_websocket_upgrade(&self) -> bool {
        self.header("Upgrade")
            .is_some_and(|value| value.eq_ignore_ascii_case("websocket"))
    }

    /// Returns the `Sec-WebSocket-Key` value.
    ///
    /// # Errors
    ///
    /// - [`Error::Handshake`] if this is not a WebSocket upgrade
    /// - [`Error::MissingKey`] if the key header is absent or empty
    pub fn websocket_key(&self) -> Result<&str> {
        if !self.is_websocket_upgrade() {
            return Err(Error::handshake("not a websocket upgrade request"));
        }

        self.header("Sec-WebSocket-Key")
            .filter(|key| !key.is_empty())
            .ok_or(Error::MissingKey)
    }
}

// ============================================================================
// Stream I/O
// ============================================================================

/// Reads the request head from `stream`.
///
/// Returns the parsed request and any bytes received after the blank line
/// (a client may pipeline its first frame).
///
/// # Errors
///
/// - [`Error::ReadTimeout`] if the head is incomplete after `deadline`
/// - [`Error::StreamEnded`] if the peer closes first
/// - [`Error::Handshake`] if the head is oversized or malformed
pub async fn read_request<R>(stream: &mut R, deadline: Duration) -> Result<(UpgradeRequest, Vec<u8>)>
where
    R: AsyncRead + Unpin,
{
    let mut buffer = Vec::with_capacity(1024);

    let head_end = timeout(deadline, async {
        loop {
            if let Some(pos) = find_terminator(&buffer) {
                return Ok::<_, Error>(pos);
            }
            if buffer.len() > MAX_REQUEST_HEAD {
                return Err(Error::handshake("request head too large"));
            }
            if stream.read_buf(&mut buffer).await? == 0 {
                return Err(Error::StreamEnded);
            }
        }
    })
    .await
    .map_err(|_| Error::read_timeout(deadline.as_millis() as u64))??;

    let head = std::str::from_utf8(&buffer[..head_end])
        .map_err(|_| Error::handshake("request head is not valid UTF-8"))?;
    let request = UpgradeRequest::parse(head)?;
    let rest = buffer[head_end + HEAD_TERMINATOR.len()..].to_vec();

    Ok((request, rest))
}

/// Writes the `101 Switching Protocols` response.
///
/// # Errors
///
/// Returns [`Error::Io`] if writing fails.
pub async fn write_response<W>(stream: &mut W, client_key: &str) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    stream.write_all(response(client_key).as_bytes()).await?;
    stream.flush().await?;
    Ok(())
}

/// Writes a `400 Bad Request` response.
///
/// # Errors
///
/// Returns [`Error::Io`] if writing fails.
pub async fn write_bad_request<W>(stream: &mut W, reason: &str) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let body = format!("Bad Request: {reason}");
    let head = format!(
        "HTTP/1.1 400 Bad Request\r\n\
         Content-Type: text/plain\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\
         \r\n",
        body.len()
    );
    stream.write_all(head.as_bytes()).await?;
    stream.write_all(body.as_bytes()).await?;
    stream.flush().await?;
    Ok(())
}

/// Performs the complete server side of the handshake.
///
/// On failure a `400 Bad Request` is written (best effort) and the error is
/// returned; the caller must drop the stream without processing frames.
///
/// # Returns
///
/// Bytes received after the request head.
///
/// # Errors
///
/// Any error from [`read_request`] or [`UpgradeRequest::websocket_key`].
pub async fn accept<S>(stream: &mut S, deadline: Duration) -> Result<Vec<u8>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (request, rest) = read_request(stream, deadline).await?;

    let key = match request.websocket_key() {
        Ok(key) => key,
        Err(e) => {
            warn!(error = %e, path = %request.path, "Rejecting upgrade");
            if let Err(write_err) = write_bad_request(stream, &e.to_string()).await {
                debug!(error = %write_err, "Failed to write 400 response");
            }
            return Err(e);
        }
    };

    write_response(stream, key).await?;
    debug!(path = %request.path, "Upgrade accepted");

    Ok(rest)
}

/// Finds the start of the blank line terminating the head.
fn find_terminator(buffer: &[u8]) -> Option<usize> {
    buffer
        .windows(HEAD_TERMINATOR.len())
        .position(|window| window == HEAD_TERMINATOR)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use tokio_test::io::Builder;

    const RFC_KEY: &str = "dGhlIHNhbXBsZSBub25jZQ==";
    const RFC_ACCEPT: &str = "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=";

    fn upgrade_head(key_line: &str) -> String {
        format!(
            "GET /chat HTTP/1.1\r\n\
             Host: localhost:1337\r\n\
             Upgrade: websocket\r\n\
             Connection: Upgrade\r\n\
             {key_line}\
             Sec-WebSocket-Version: 13\r\n\
             \r\n"
        )
    }

    #[test]
    fn test_accept_key_rfc_example() {
        assert_eq!(accept_key(RFC_KEY), RFC_ACCEPT);
    }

    #[test]
    fn test_response_layout() {
        let response = response(RFC_KEY);
        assert_eq!(
            response,
            format!(
                "HTTP/1.1 101 Switching Protocols\r\n\
                 Upgrade: websocket\r\n\
                 Connection: Upgrade\r\n\
                 Sec-WebSocket-Accept: {RFC_ACCEPT}\r\n\
                 \r\n"
            )
        );
    }

    #[test]
    fn test_parse_headers_case_insensitive() {
        let head = upgrade_head(&format!("sec-websocket-key: {RFC_KEY}\r\n"));
        let request = UpgradeRequest::parse(head.trim_end()).unwrap();

        assert_eq!(request.method, "GET");
        assert_eq!(request.path, "/chat");
        assert_eq!(request.header("HOST"), Some("localhost:1337"));
        assert_eq!(request.websocket_key().unwrap(), RFC_KEY);
    }

    #[test]
    fn test_missing_key() {
        let head = upgrade_head("");
        let request = UpgradeRequest::parse(head.trim_end()).unwrap();
        assert!(matches!(request.websocket_key(), Err(Error::MissingKey)));
    }

    #[test]
    fn test_not_an_upgrade() {
        let request = UpgradeRequest::parse("GET / HTTP/1.1\r\nHost: x").unwrap();
        let err = request.websocket_key().unwrap_err();
        assert!(matches!(err, Error::Handshake { .. }));
    }

    #[test]
    fn test_malformed_request_line() {
        assert!(UpgradeRequest::parse("GARBAGE").is_err());
    }

    #[tokio::test]
    async fn test_read_request_keeps_pipelined_bytes() {
        let head = upgrade_head(&format!("Sec-WebSocket-Key: {RFC_KEY}\r\n"));
        let (first, second) = head.as_bytes().split_at(20);
        let mut mock = Builder::new()
            .read(first)
            .read(second)
            .read(&[0x81, 0x80])
            .build();

        let (request, rest) = read_request(&mut mock, DEFAULT_HANDSHAKE_TIMEOUT)
            .await
            .unwrap();
        assert!(request.is_websocket_upgrade());
        // The pipelined bytes arrive in a separate read, so only the head is consumed.
        assert!(rest.is_empty());

        let mut tail = Vec::new();
        mock.read_to_end(&mut tail).await.unwrap();
        assert_eq!(tail, vec![0x81, 0x80]);
    }

    #[tokio::test]
    async fn test_read_request_splits_trailing_bytes() {
        let mut bytes = upgrade_head(&format!("Sec-WebSocket-Key: {RFC_KEY}\r\n")).into_bytes();
        bytes.extend_from_slice(&[0x89, 0x80]);
        let mut stream = &bytes[..];

        let (_, rest) = read_request(&mut stream, DEFAULT_HANDSHAKE_TIMEOUT)
            .await
            .unwrap();
        assert_eq!(rest, vec![0x89, 0x80]);
    }

    #[tokio::test]
    async fn test_accept_writes_101() {
        let head = upgrade_head(&format!("Sec-WebSocket-Key: {RFC_KEY}\r\n"));
        let mut mock = Builder::new()
            .read(head.as_bytes())
            .write(response(RFC_KEY).as_bytes())
            .build();

        let rest = accept(&mut mock, DEFAULT_HANDSHAKE_TIMEOUT).await.unwrap();
        assert!(rest.is_empty());
    }

    #[tokio::test]
    async fn test_accept_rejects_missing_key() {
        let (mut client, mut server) = tokio::io::duplex(4096);
        client
            .write_all(upgrade_head("").as_bytes())
            .await
            .unwrap();

        let err = accept(&mut server, DEFAULT_HANDSHAKE_TIMEOUT)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MissingKey));
        drop(server);

        let mut reply = String::new();
        client.read_to_string(&mut reply).await.unwrap();
        assert!(reply.starts_with("HTTP/1.1 400 Bad Request"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_request_times_out() {
        let (_client, mut server) = tokio::io::duplex(64);
        let err = read_request(&mut server, Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(err.is_timeout());
    }
}
