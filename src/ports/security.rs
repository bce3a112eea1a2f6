use super::transport::BoxedIo;
use crate::domain::{ProxyEndpoint, Result};
use async_trait::async_trait;

/// Port for wrapping an open stream in a security context that terminates at a proxy
#[async_trait]
pub trait SecureChannelPort: Send + Sync {
    /// Run the full handshake with `proxy` over `stream`
    ///
    /// Certificate trust is whatever the adapter was configured with. On
    /// failure the stream is consumed and dropped.
    async fn secure(&self, stream: BoxedIo, proxy: &ProxyEndpoint) -> Result<BoxedIo>;
}
