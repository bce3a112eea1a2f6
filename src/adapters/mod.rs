pub mod bridge;
pub mod tcp;
pub mod tls;
pub mod tracking;

pub use bridge::TunnelBridge;
pub use tcp::TcpTransport;
pub use tls::RustlsChannel;
pub use tracking::*;
