use async_trait::async_trait;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

use crate::domain::{ProxyEndpoint, Result, TunnelError};
use crate::ports::{BoxedIo, TransportPort};

#[derive(Clone)]
pub struct TcpTransport {
    connect_timeout: Duration,
}

impl TcpTransport {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }

    const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self::new(Self::DEFAULT_TIMEOUT)
    }
}

#[async_trait]
impl TransportPort for TcpTransport {
    async fn open(&self, proxy: &ProxyEndpoint) -> Result<BoxedIo> {
        let addr = proxy.authority();

        match timeout(self.connect_timeout, TcpStream::connect((proxy.host.as_str(), proxy.port))).await {
            Ok(Ok(stream)) => {
                if let Err(e) = stream.set_nodelay(true) {
                    debug!("Failed to set TCP_NODELAY on {}: {}", addr, e);
                }
                debug!("Connected to {}", addr);
                Ok(Box::new(stream))
            }
            Ok(Err(e)) => Err(TunnelError::io(format!("failed to connect to {}", addr), e)),
            Err(_) => Err(TunnelError::Timeout(format!(
                "connecting to {} took longer than {:?}",
                addr, self.connect_timeout
            ))),
        }
    }
}
