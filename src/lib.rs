pub mod adapters;
pub mod config;
pub mod connection;
pub mod domain;
pub mod ports;

#[cfg(test)]
mod test_support;

pub use connection::TunnelConnection;
pub use domain::{TunnelConnector, TunnelError};
