pub mod security;
pub mod tracking;
pub mod transport;

pub use security::SecureChannelPort;
pub use tracking::TrackingPort;
pub use transport::{BoxedIo, TransportPort, TunnelIo};
