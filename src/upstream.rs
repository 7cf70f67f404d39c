//! Query client for the upstream PeerCast node.
//!
//! The node exposes a JSON-RPC control API at `/api/1` (channel listing and
//! version info) and serves stream data over plain TCP on the same port.
//! All calls are single-shot with no retry; a failure is fatal to the
//! current session only.

use std::collections::HashSet;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

/// Errors from talking to the upstream node.
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// The control API or data port could not be reached.
    #[error("upstream unreachable: {0}")]
    Unreachable(String),
    /// The control API answered with something other than a valid result.
    #[error("upstream protocol error: {0}")]
    Protocol(String),
}

impl From<reqwest::Error> for UpstreamError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_connect() || e.is_timeout() {
            UpstreamError::Unreachable(e.to_string())
        } else {
            UpstreamError::Protocol(e.to_string())
        }
    }
}

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    method: &'a str,
    params: [u8; 0],
    id: u64,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcError>,
}

/// One live channel record from `getChannels`. Only the id matters here;
/// the rest of the record is ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct Channel {
    #[serde(rename = "channelId")]
    pub channel_id: String,
}

/// Version record from `getVersionInfo`.
#[derive(Debug, Clone, Deserialize)]
pub struct VersionInfo {
    #[serde(rename = "agentName", default)]
    pub agent_name: String,
    #[serde(rename = "apiVersion", default)]
    pub api_version: String,
}

/// Client for the upstream node's control API and data port.
pub struct PeercastClient {
    host: String,
    port: u16,
    api_url: String,
    http: reqwest::Client,
    connect_timeout: Duration,
    next_id: AtomicU64,
}

impl PeercastClient {
    /// Create a client for the node at `host:port`.
    pub fn new(host: &str, port: u16, connect_timeout: Duration) -> Result<Self, UpstreamError> {
        let http = reqwest::Client::builder()
            .user_agent(crate::http::SERVER_NAME)
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| UpstreamError::Protocol(e.to_string()))?;

        Ok(Self {
            api_url: format!("http://{host}:{port}/api/1"),
            host: host.to_string(),
            port,
            http,
            connect_timeout,
            next_id: AtomicU64::new(1),
        })
    }

    async fn call<T: DeserializeOwned>(&self, method: &str) -> Result<T, UpstreamError> {
        let request = RpcRequest {
            jsonrpc: "2.0",
            method,
            params: [],
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
        };

        let resp = self.http.post(&self.api_url).json(&request).send().await?;

        if !resp.status().is_success() {
            return Err(UpstreamError::Protocol(format!(
                "RPC call {method} failed (status={})",
                resp.status()
            )));
        }

        let body: RpcResponse<T> = resp.json().await?;

        if let Some(e) = body.error {
            return Err(UpstreamError::Protocol(format!(
                "RPC call {method} failed (code={}): {}",
                e.code, e.message
            )));
        }

        body.result
            .ok_or_else(|| UpstreamError::Protocol(format!("RPC call {method} returned no result")))
    }

    /// List the ids of channels currently live on the node.
    ///
    /// The set reflects the node's state at the instant of the query; it may
    /// be stale by the time a relay begins.
    pub async fn channel_ids(&self) -> Result<HashSet<String>, UpstreamError> {
        let channels: Vec<Channel> = self.call("getChannels").await?;
        debug!(channel_count = channels.len(), "Fetched channel list");
        Ok(channels.into_iter().map(|c| c.channel_id).collect())
    }

    /// Fetch the node's version record.
    pub async fn version_info(&self) -> Result<VersionInfo, UpstreamError> {
        self.call("getVersionInfo").await
    }

    /// Open a plain TCP data connection to the node.
    pub async fn open_data_connection(&self) -> Result<TcpStream, UpstreamError> {
        let addr = (self.host.as_str(), self.port);
        debug!(host = %self.host, port = self.port, "Dialing upstream data connection");

        match timeout(self.connect_timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => Ok(stream),
            Ok(Err(e)) => Err(UpstreamError::Unreachable(e.to_string())),
            Err(_) => Err(UpstreamError::Unreachable(
                io::Error::new(io::ErrorKind::TimedOut, "connect timeout").to_string(),
            )),
        }
    }
}
