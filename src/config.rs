//! Proxy configuration.
//!
//! All knobs are overridable from the command line (see `main.rs`); there is
//! no file-based persisted state.

use std::net::SocketAddr;
use std::time::Duration;

/// Default maximum concurrent sessions.
pub const DEFAULT_MAX_SESSIONS: usize = 1024;

/// Default stall timeout for upstream reads during a relay.
pub const DEFAULT_STALL_TIMEOUT: Duration = Duration::from_secs(5);

/// Default connect timeout for the upstream data connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Runtime configuration for the proxy.
#[derive(Debug, Clone)]
pub struct Config {
    /// Address to accept client connections on.
    pub listen_addr: SocketAddr,
    /// Hostname of the upstream PeerCast node.
    pub upstream_host: String,
    /// Port of the upstream PeerCast node (control API and data).
    pub upstream_port: u16,
    /// Maximum concurrent sessions.
    pub max_sessions: usize,
    /// Maximum time to wait for each upstream read during a relay.
    pub stall_timeout: Duration,
    /// Maximum time to wait when dialing the upstream data connection.
    pub connect_timeout: Duration,
}

impl Config {
    /// Create a configuration with default limits and timeouts.
    pub fn new(listen_addr: SocketAddr, upstream_host: String, upstream_port: u16) -> Self {
        Self {
            listen_addr,
            upstream_host,
            upstream_port,
            max_sessions: DEFAULT_MAX_SESSIONS,
            stall_timeout: DEFAULT_STALL_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(
            SocketAddr::from(([0, 0, 0, 0], 8888)),
            "localhost".to_string(),
            7144,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.listen_addr.port(), 8888);
        assert_eq!(config.upstream_host, "localhost");
        assert_eq!(config.upstream_port, 7144);
        assert_eq!(config.stall_timeout, DEFAULT_STALL_TIMEOUT);
    }
}
