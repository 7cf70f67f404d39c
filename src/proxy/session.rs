//! Per-connection session handling.
//!
//! Each session owns exactly one client socket and, while relaying, one
//! upstream socket. The flow is parse, dispatch (stats page, relay, or bad
//! request), then an unconditional close of the client socket. Parsing is
//! not time-bounded; only the upstream relay read carries the stall
//! timeout (a limitation carried over deliberately).

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::http::{self, Request};
use crate::proxy::relay;
use crate::upstream::PeercastClient;

/// One client connection, handled end to end.
pub struct Session {
    client: TcpStream,
    peer_addr: SocketAddr,
    pecast: Arc<PeercastClient>,
    config: Arc<Config>,
}

impl Session {
    pub fn new(
        client: TcpStream,
        peer_addr: SocketAddr,
        pecast: Arc<PeercastClient>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            client,
            peer_addr,
            pecast,
            config,
        }
    }

    /// Run the session to completion.
    ///
    /// Every failure is absorbed here: the client socket is shut down on
    /// every path and nothing propagates to the accept loop.
    pub async fn run(mut self) {
        // The reader's buffer can be discarded after the headers: the client
        // sends nothing further in this protocol.
        let parsed = {
            let mut reader = BufReader::new(&mut self.client);
            http::read_request(&mut reader).await
        };

        let request = match parsed {
            Ok(request) => request,
            Err(e) => {
                // Malformed request: close with no response.
                info!(peer_addr = %self.peer_addr, error = %e, "Rejecting unparseable request");
                let _ = self.client.shutdown().await;
                return;
            }
        };

        debug!(
            peer_addr = %self.peer_addr,
            method = %request.method,
            path = %request.path,
            "Request parsed"
        );

        if let Err(e) = self.dispatch(&request).await {
            debug!(peer_addr = %self.peer_addr, error = %e, "Session ended with error");
        }

        let _ = self.client.shutdown().await;
    }

    async fn dispatch(&mut self, request: &Request) -> std::io::Result<()> {
        if request.method == "GET" {
            if request.path == "/stats" {
                return http::write_stats_response(&mut self.client).await;
            }
            if is_relay_path(&request.path) {
                return self.handle_relay(request).await;
            }
        }
        http::write_bad_request(&mut self.client).await
    }

    async fn handle_relay(&mut self, request: &Request) -> std::io::Result<()> {
        if !self.request_valid(request).await {
            return http::write_bad_request(&mut self.client).await;
        }

        let upstream = match self.pecast.open_data_connection().await {
            Ok(upstream) => upstream,
            Err(e) => {
                warn!(peer_addr = %self.peer_addr, error = %e, "Upstream data connection failed");
                // Headers have not been written yet, so a 400 is still possible.
                return http::write_bad_request(&mut self.client).await;
            }
        };

        match relay::relay(request, upstream, &mut self.client, self.config.stall_timeout).await {
            Ok(stats) => {
                info!(
                    peer_addr = %self.peer_addr,
                    path = %request.path,
                    bytes_relayed = stats.bytes_relayed,
                    "Relay complete"
                );
            }
            Err(e) => {
                // Data may already be on the wire; the client just sees the
                // connection end.
                warn!(peer_addr = %self.peer_addr, path = %request.path, error = %e, "Relay aborted");
            }
        }
        Ok(())
    }

    /// Allow only channels the upstream already knows about, so the proxy
    /// cannot be used to make it originate a new relay.
    async fn request_valid(&self, request: &Request) -> bool {
        let Some(id) = channel_id(&request.path) else {
            return false;
        };

        match self.pecast.channel_ids().await {
            Ok(ids) => ids.contains(id),
            Err(e) => {
                warn!(peer_addr = %self.peer_addr, error = %e, "Channel list query failed");
                false
            }
        }
    }
}

/// Whether a path should be dispatched to the relay handler.
pub fn is_relay_path(path: &str) -> bool {
    path.strip_prefix("/stream/").is_some() || path.strip_prefix("/pls/").is_some()
}

/// Extract the channel id from a `/stream/<ID>` or `/pls/<ID>` path: the
/// maximal leading run of ASCII uppercase letters and digits, non-empty.
pub fn channel_id(path: &str) -> Option<&str> {
    let rest = path
        .strip_prefix("/stream/")
        .or_else(|| path.strip_prefix("/pls/"))?;
    let end = rest
        .bytes()
        .position(|b| !(b.is_ascii_uppercase() || b.is_ascii_digit()))
        .unwrap_or(rest.len());
    if end == 0 {
        return None;
    }
    Some(&rest[..end])
}
