pub mod errors;
pub mod handshake;
pub mod models;
pub mod service;

pub use errors::*;
pub use handshake::{perform_connect, HandshakeLimits};
pub use models::*;
pub use service::{ConnectorSettings, TunnelConnector};
