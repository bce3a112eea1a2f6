use crate::domain::{ProxyEndpoint, Result};
use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

/// Any bidirectional byte stream a tunnel can run over.
pub trait TunnelIo: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> TunnelIo for T {}

pub type BoxedIo = Box<dyn TunnelIo>;

/// Port for opening the raw connection to the first proxy of a route
#[async_trait]
pub trait TransportPort: Send + Sync {
    /// Open a byte stream to the proxy's host and port
    ///
    /// No security handshake happens here; see `SecureChannelPort`.
    async fn open(&self, proxy: &ProxyEndpoint) -> Result<BoxedIo>;
}
