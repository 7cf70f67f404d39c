//! Minimal HTTP/1.0 request parsing and response writing.
//!
//! The client-facing surface is a line-oriented session protocol, not full
//! HTTP/1.1: no chunked transfer, no keep-alive, no persistent connections.
//! The parser consumes CRLF-terminated lines from a buffered reader and
//! produces an immutable [`Request`]; anything that does not match the
//! request-line or header grammar is rejected with a typed error carrying
//! the raw line for diagnostics.

use std::io;

use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

/// `Server` header value sent on 400 responses.
pub const SERVER_NAME: &str = concat!("proxy/", env!("CARGO_PKG_VERSION"));

/// Errors from parsing a client request.
#[derive(Debug, Error)]
pub enum ParseError {
    /// First line did not match `METHOD SP PATH SP VERSION CRLF`.
    #[error("invalid request line: {0:?}")]
    MalformedRequestLine(String),
    /// A header line did not match `NAME ":" OWS VALUE CRLF`.
    #[error("invalid header line: {0:?}")]
    MalformedHeaderLine(String),
    /// The connection closed before the request was complete.
    #[error("connection closed before end of request")]
    UnexpectedEof,
    /// Transport error while reading.
    #[error("read error: {0}")]
    Io(#[from] io::Error),
}

/// Header map preserving insertion order, with names case-sensitive as
/// received. A duplicate name overwrites the earlier value in place
/// (map semantics; a documented simplification).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers(Vec<(String, String)>);

impl Headers {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Insert a header, overwriting an existing value for the same name
    /// without disturbing its position.
    pub fn insert(&mut self, name: String, value: String) {
        if let Some(slot) = self.0.iter_mut().find(|(n, _)| *n == name) {
            slot.1 = value;
        } else {
            self.0.push((name, value));
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Iterate headers in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A parsed client request. Immutable once parsed; lives for one session.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: String,
    pub path: String,
    pub version: String,
    pub headers: Headers,
}

/// Read and parse one request (request line + headers up to the blank line)
/// from a buffered reader.
pub async fn read_request<R>(reader: &mut R) -> Result<Request, ParseError>
where
    R: AsyncBufRead + Unpin,
{
    let line = read_line(reader).await?.ok_or(ParseError::UnexpectedEof)?;
    let (method, path, version) =
        parse_request_line(&line).ok_or_else(|| ParseError::MalformedRequestLine(line.clone()))?;

    let mut headers = Headers::new();
    loop {
        let line = read_line(reader).await?.ok_or(ParseError::UnexpectedEof)?;
        if line == "\r\n" {
            break;
        }
        let (name, value) =
            parse_header_line(&line).ok_or_else(|| ParseError::MalformedHeaderLine(line.clone()))?;
        headers.insert(name, value);
    }

    Ok(Request {
        method,
        path,
        version,
        headers,
    })
}

/// Read one raw line including its terminator. Returns `None` at EOF.
async fn read_line<R>(reader: &mut R) -> io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    let n = reader.read_until(b'\n', &mut buf).await?;
    if n == 0 {
        return Ok(None);
    }
    // Raw bytes are kept as-is so malformed input shows up verbatim in the
    // error; non-UTF-8 input simply fails the grammar match downstream.
    Ok(Some(String::from_utf8_lossy(&buf).into_owned()))
}

/// Match `METHOD SP PATH SP VERSION CRLF` exactly.
///
/// Method: one or more ASCII uppercase letters. Path and version: one or
/// more non-space characters.
fn parse_request_line(line: &str) -> Option<(String, String, String)> {
    let body = line.strip_suffix("\r\n")?;
    let mut parts = body.split(' ');
    let method = parts.next()?;
    let path = parts.next()?;
    let version = parts.next()?;
    if parts.next().is_some() {
        return None;
    }
    if method.is_empty() || !method.bytes().all(|b| b.is_ascii_uppercase()) {
        return None;
    }
    if path.is_empty() || version.is_empty() {
        return None;
    }
    Some((method.to_string(), path.to_string(), version.to_string()))
}

/// Match `NAME ":" OWS VALUE CRLF`.
///
/// Name: one or more non-colon characters. Value: the remainder after the
/// colon and optional whitespace, non-empty, trimmed of the trailing CRLF.
fn parse_header_line(line: &str) -> Option<(String, String)> {
    let body = line.strip_suffix("\r\n")?;
    let (name, rest) = body.split_once(':')?;
    if name.is_empty() {
        return None;
    }
    let value = rest.trim_start();
    if value.is_empty() {
        return None;
    }
    Some((name.to_string(), value.to_string()))
}

/// Write the fixed stats response.
pub async fn write_stats_response<W>(writer: &mut W) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(b"HTTP/1.0 200 OK\r\n").await?;
    writer.write_all(b"Content-Type: text/plain\r\n").await?;
    writer.write_all(b"\r\n").await?;
    writer.write_all(b"stats page under construction").await?;
    Ok(())
}

/// Write the fixed 400 response.
pub async fn write_bad_request<W>(writer: &mut W) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(b"HTTP/1.0 400 Bad Request\r\n").await?;
    writer
        .write_all(format!("Server: {SERVER_NAME}\r\n").as_bytes())
        .await?;
    writer.write_all(b"\r\n").await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn parse(input: &str) -> Result<Request, ParseError> {
        let mut reader = input.as_bytes();
        read_request(&mut reader).await
    }

    #[tokio::test]
    async fn test_parse_simple_request() {
        let req = parse("GET /stats HTTP/1.0\r\n\r\n").await.unwrap();
        assert_eq!(req.method, "GET");
        assert_eq!(req.path, "/stats");
        assert_eq!(req.version, "HTTP/1.0");
        assert!(req.headers.is_empty());
    }

    #[tokio::test]
    async fn test_parse_headers_in_order() {
        let req = parse("GET / HTTP/1.1\r\nHost: example.com\r\nUser-Agent: x\r\n\r\n")
            .await
            .unwrap();
        let headers: Vec<_> = req.headers.iter().collect();
        assert_eq!(
            headers,
            vec![("Host", "example.com"), ("User-Agent", "x")]
        );
    }

    #[tokio::test]
    async fn test_parse_across_fragmented_reads() {
        let mock = tokio_test::io::Builder::new()
            .read(b"GET /sta")
            .read(b"ts HTTP/1.0\r\nHo")
            .read(b"st: x\r\n\r\n")
            .build();
        let mut reader = tokio::io::BufReader::new(mock);
        let req = read_request(&mut reader).await.unwrap();
        assert_eq!(req.path, "/stats");
        assert_eq!(req.headers.get("Host"), Some("x"));
    }

    #[tokio::test]
    async fn test_duplicate_header_overwrites_in_place() {
        let req = parse("GET / HTTP/1.0\r\nA: 1\r\nB: 2\r\nA: 3\r\n\r\n")
            .await
            .unwrap();
        let headers: Vec<_> = req.headers.iter().collect();
        assert_eq!(headers, vec![("A", "3"), ("B", "2")]);
    }

    #[tokio::test]
    async fn test_header_value_whitespace_trimmed() {
        let req = parse("GET / HTTP/1.0\r\nHost:   example.com\r\n\r\n")
            .await
            .unwrap();
        assert_eq!(req.headers.get("Host"), Some("example.com"));
    }

    #[tokio::test]
    async fn test_malformed_request_line() {
        for input in [
            "\0",
            "get / HTTP/1.0\r\n\r\n",
            "GET /\r\n\r\n",
            "GET  / HTTP/1.0\r\n\r\n",
            "GET / HTTP/1.0 extra\r\n\r\n",
            "GET / HTTP/1.0\n\r\n",
        ] {
            let err = parse(input).await.unwrap_err();
            assert!(
                matches!(err, ParseError::MalformedRequestLine(_)),
                "input {input:?} gave {err:?}"
            );
        }
    }

    #[tokio::test]
    async fn test_malformed_header_line() {
        for input in [
            "GET / HTTP/1.0\r\nno-colon-here\r\n\r\n",
            "GET / HTTP/1.0\r\n: value\r\n\r\n",
            "GET / HTTP/1.0\r\nName:\r\n\r\n",
        ] {
            let err = parse(input).await.unwrap_err();
            assert!(
                matches!(err, ParseError::MalformedHeaderLine(_)),
                "input {input:?} gave {err:?}"
            );
        }
    }

    #[tokio::test]
    async fn test_eof_before_request_line() {
        let err = parse("").await.unwrap_err();
        assert!(matches!(err, ParseError::UnexpectedEof));
    }

    #[tokio::test]
    async fn test_eof_before_blank_line() {
        let err = parse("GET / HTTP/1.0\r\nHost: x\r\n").await.unwrap_err();
        assert!(matches!(err, ParseError::UnexpectedEof));
    }

    #[tokio::test]
    async fn test_bad_request_response_has_server_header() {
        let mut out = Vec::new();
        write_bad_request(&mut out).await.unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("HTTP/1.0 400 Bad Request\r\n"));
        assert!(text.contains("Server: proxy/"));
        assert!(text.ends_with("\r\n\r\n"));
    }
}
