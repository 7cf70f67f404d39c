//! TCP listener and accept loop.
//!
//! Accepts client connections and hands each one to an independently
//! spawned session task. Sessions share no mutable state; the only shared
//! structure is the [`ConnectionRegistry`], which the accept loop and each
//! session's completion path mutate under its single lock. An interrupt
//! stops the accept loop; running sessions drain naturally as their
//! connections close.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn, Instrument};

use crate::config::Config;
use crate::proxy::registry::ConnectionRegistry;
use crate::proxy::session::Session;
use crate::upstream::PeercastClient;

/// The client-facing listener.
pub struct Listener {
    config: Arc<Config>,
    listener: TcpListener,
    pecast: Arc<PeercastClient>,
    registry: Arc<ConnectionRegistry>,
    session_permits: Arc<Semaphore>,
}

impl Listener {
    /// Bind the listening socket.
    pub async fn bind(config: Config, pecast: Arc<PeercastClient>) -> io::Result<Self> {
        let listener = TcpListener::bind(config.listen_addr).await?;
        let local_addr = listener.local_addr()?;

        info!(
            bind_addr = %local_addr,
            max_sessions = config.max_sessions,
            "Listener bound"
        );

        Ok(Self {
            session_permits: Arc::new(Semaphore::new(config.max_sessions)),
            registry: Arc::new(ConnectionRegistry::new()),
            config: Arc::new(config),
            listener,
            pecast,
        })
    }

    /// Get the local address this listener is bound to.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Get the session registry.
    pub fn registry(&self) -> Arc<ConnectionRegistry> {
        Arc::clone(&self.registry)
    }

    /// Accept connections until interrupted.
    pub async fn run(self: Arc<Self>) -> io::Result<()> {
        loop {
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer_addr)) => self.start_session(stream, peer_addr),
                    Err(e) => {
                        error!(error = %e, "Accept error");
                        // Brief sleep to avoid a tight loop on persistent errors
                        tokio::time::sleep(Duration::from_millis(100)).await;
                    }
                },
                result = tokio::signal::ctrl_c() => {
                    if let Err(e) = result {
                        error!(error = %e, "Interrupt handler failed");
                    }
                    info!(
                        live_sessions = self.registry.len(),
                        "Interrupted; no longer accepting connections"
                    );
                    return Ok(());
                }
            }
        }
    }

    fn start_session(&self, stream: tokio::net::TcpStream, peer_addr: SocketAddr) {
        let permit = match self.session_permits.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                warn!(peer_addr = %peer_addr, "Connection rejected: max sessions reached");
                return;
            }
        };

        info!(peer_addr = %peer_addr, "Connection accepted");

        let id = self.registry.register(peer_addr);
        let registry = Arc::clone(&self.registry);
        let session = Session::new(
            stream,
            peer_addr,
            Arc::clone(&self.pecast),
            Arc::clone(&self.config),
        );

        tokio::spawn(
            async move {
                session.run().await;
                debug!(peer_addr = %peer_addr, "Session finished");
                registry.unregister(id);
                drop(permit);
            }
            .instrument(tracing::info_span!("session", peer = %peer_addr)),
        );
    }
}
