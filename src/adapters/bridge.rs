use std::future::Future;
use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::domain::{Result, SessionInfo, SessionOutcome, TunnelConnector, TunnelRoute};
use crate::ports::{TrackingPort, TunnelIo};

/// Forwards every local connection through its own freshly opened tunnel.
pub struct TunnelBridge {
    connector: TunnelConnector,
    route: TunnelRoute,
    tracker: Arc<dyn TrackingPort>,
}

impl TunnelBridge {
    pub fn new(connector: TunnelConnector, route: TunnelRoute, tracker: Arc<dyn TrackingPort>) -> Self {
        Self {
            connector,
            route,
            tracker,
        }
    }

    /// Accepts connections until `shutdown` resolves.
    pub async fn serve<F>(self: Arc<Self>, listener: TcpListener, shutdown: F) -> std::io::Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        info!(listen = %listener.local_addr()?, route = %self.route, "bridge ready");

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("bridge shutting down");
                    return Ok(());
                }
                accepted = listener.accept() => {
                    match accepted {
                        Ok((socket, peer)) => {
                            let bridge = self.clone();
                            tokio::spawn(async move {
                                if let Err(e) = bridge.handle(socket, peer.to_string()).await {
                                    error!(peer = %peer, "tunnel failed: {}", e);
                                }
                            });
                        }
                        Err(e) => warn!("accept failed: {}", e),
                    }
                }
            }
        }
    }

    /// Relays one local connection and reports how the session ended.
    ///
    /// Only a failure to establish the tunnel is an error; a relay that
    /// breaks off afterwards is reported as `SessionOutcome::RelayFailed`.
    pub async fn handle<S>(&self, mut client: S, peer: String) -> Result<SessionOutcome>
    where
        S: TunnelIo,
    {
        let info = SessionInfo::new(peer, self.route.to_string());
        let id = info.id;
        self.tracker.track_session(info).await?;

        let (outcome, result) = match self.connector.connect_route(&self.route).await {
            Ok(mut tunnel) => {
                let outcome = match tokio::io::copy_bidirectional(&mut client, &mut tunnel).await {
                    Ok((sent, received)) => SessionOutcome::Relayed { sent, received },
                    Err(e) => {
                        debug!(session = %id, "relay ended with error: {}", e);
                        SessionOutcome::RelayFailed(e.to_string())
                    }
                };
                (outcome.clone(), Ok(outcome))
            }
            Err(err) => {
                if let Err(e) = client.shutdown().await {
                    debug!(session = %id, "local shutdown failed: {}", e);
                }
                (SessionOutcome::TunnelFailed(err.to_string()), Err(err))
            }
        };

        self.tracker.close_session(id, outcome).await?;
        result
    }
}
