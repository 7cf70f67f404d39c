pub mod config;
pub mod http;
pub mod proxy;
pub mod upstream;

pub use config::Config;
pub use proxy::{ConnectionRegistry, Listener, RelayError, Session};
pub use upstream::{PeercastClient, UpstreamError};
