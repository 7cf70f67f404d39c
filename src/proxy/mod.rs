//! The per-connection proxy core.
//!
//! This module provides:
//! - The TCP accept loop and session spawning
//! - The session state machine (parse, dispatch, guaranteed close)
//! - The relay engine with its stall timeout
//! - The in-flight session registry
//!
//! ## Architecture
//!
//! ```text
//! Client -> Listener -> Session -> { stats | validate -> Relay | 400 }
//!                          |
//!                  ConnectionRegistry
//! ```

pub mod listener;
pub mod registry;
pub mod relay;
pub mod session;

pub use listener::Listener;
pub use registry::{ConnectionRegistry, SessionEntry, SessionId};
pub use relay::{RelayError, RelayStats, RELAY_BUF_SIZE};
pub use session::Session;
