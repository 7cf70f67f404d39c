//! Byte relay from the upstream data connection to the client.
//!
//! The upstream request is re-synthesized from the parsed client request:
//! the version is downgraded to HTTP/1.0 unconditionally and the original
//! headers are forwarded verbatim, in order. The copy loop treats the
//! stream as opaque bytes; each upstream read is bounded by the stall
//! timeout so a producer that stops sending without closing cannot hang
//! the session.

use std::io;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;
use tracing::debug;

use crate::http::Request;
use crate::upstream::UpstreamError;

/// Chunk size for the copy loop.
pub const RELAY_BUF_SIZE: usize = 64 * 1024;

/// Errors that abort a relay.
#[derive(Debug, Error)]
pub enum RelayError {
    /// No bytes arrived from upstream within the stall timeout.
    #[error("relay stalled: no upstream data within {0:?}")]
    Stalled(Duration),
    /// The upstream data connection could not be opened.
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
    /// Read/write failure on either socket.
    #[error("relay I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Statistics for one completed relay.
#[derive(Debug, Clone, Copy)]
pub struct RelayStats {
    /// Bytes copied from upstream to the client.
    pub bytes_relayed: u64,
}

/// Forward the client's request upstream and copy the response bytes back
/// until upstream EOF, a stall, or an I/O failure.
///
/// The upstream socket is owned here and released on every exit path; the
/// caller keeps ownership of the client sink.
pub async fn relay<U, W>(
    request: &Request,
    mut upstream: U,
    client: &mut W,
    stall_timeout: Duration,
) -> Result<RelayStats, RelayError>
where
    U: AsyncRead + AsyncWrite + Unpin,
    W: AsyncWrite + Unpin,
{
    write_upstream_request(request, &mut upstream).await?;

    let mut buf = vec![0u8; RELAY_BUF_SIZE];
    let mut bytes_relayed = 0u64;

    let result = loop {
        let read = match timeout(stall_timeout, upstream.read(&mut buf)).await {
            Ok(read) => read,
            Err(_) => break Err(RelayError::Stalled(stall_timeout)),
        };

        match read {
            Ok(0) => break Ok(()),
            Ok(n) => {
                if let Err(e) = client.write_all(&buf[..n]).await {
                    break Err(RelayError::Io(e));
                }
                bytes_relayed += n as u64;
            }
            Err(e) => break Err(RelayError::Io(e)),
        }
    };

    // Close the upstream socket exactly once, however the loop exited.
    let _ = upstream.shutdown().await;

    debug!(bytes_relayed, "Relay finished");
    result.map(|()| RelayStats { bytes_relayed })
}

/// Write `GET <path> HTTP/1.0` plus the original headers, in order, followed
/// by the blank-line terminator.
async fn write_upstream_request<U>(request: &Request, upstream: &mut U) -> io::Result<()>
where
    U: AsyncWrite + Unpin,
{
    upstream
        .write_all(format!("GET {} HTTP/1.0\r\n", request.path).as_bytes())
        .await?;
    for (name, value) in request.headers.iter() {
        upstream
            .write_all(format!("{name}: {value}\r\n").as_bytes())
            .await?;
    }
    upstream.write_all(b"\r\n").await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::Headers;

    fn stream_request(path: &str) -> Request {
        let mut headers = Headers::new();
        headers.insert("Host".to_string(), "example.com".to_string());
        headers.insert("User-Agent".to_string(), "test".to_string());
        Request {
            method: "GET".to_string(),
            path: path.to_string(),
            version: "HTTP/1.1".to_string(),
            headers,
        }
    }

    #[tokio::test]
    async fn test_upstream_request_downgraded_to_http_1_0() {
        let request = stream_request("/stream/ABC123");
        let mut out = Vec::new();
        write_upstream_request(&request, &mut out).await.unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "GET /stream/ABC123 HTTP/1.0\r\nHost: example.com\r\nUser-Agent: test\r\n\r\n"
        );
    }

    #[tokio::test]
    async fn test_relay_copies_until_eof() {
        let request = stream_request("/stream/ABC123");
        let (upstream, mut peer) = tokio::io::duplex(1024);
        let mut client = Vec::new();

        let producer = tokio::spawn(async move {
            // Consume the forwarded request, then produce a finite clip.
            let mut sink = vec![0u8; 1024];
            let _ = peer.read(&mut sink).await;
            peer.write_all(b"stream-bytes").await.unwrap();
            drop(peer);
        });

        let stats = relay(&request, upstream, &mut client, Duration::from_secs(1))
            .await
            .unwrap();
        producer.await.unwrap();

        assert_eq!(client, b"stream-bytes");
        assert_eq!(stats.bytes_relayed, 12);
    }

    #[tokio::test]
    async fn test_relay_stalls_when_upstream_goes_quiet() {
        let request = stream_request("/stream/ABC123");
        let (upstream, mut peer) = tokio::io::duplex(1024);
        let mut client = Vec::new();

        let producer = tokio::spawn(async move {
            let mut sink = vec![0u8; 1024];
            let _ = peer.read(&mut sink).await;
            peer.write_all(b"partial").await.unwrap();
            // Keep the connection open without producing more bytes.
            tokio::time::sleep(Duration::from_millis(500)).await;
        });

        let err = relay(&request, upstream, &mut client, Duration::from_millis(50))
            .await
            .unwrap_err();
        producer.await.unwrap();

        assert!(matches!(err, RelayError::Stalled(_)));
        // Bytes received before the stall were still delivered.
        assert_eq!(client, b"partial");
    }
}
