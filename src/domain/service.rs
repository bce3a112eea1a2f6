use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use super::handshake::{perform_connect, HandshakeLimits};
use super::{ProxyEndpoint, Result, TargetEndpoint, TunnelError, TunnelRoute};
use crate::connection::TunnelConnection;
use crate::ports::{BoxedIo, SecureChannelPort, TransportPort, TunnelIo};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectorSettings {
    /// Upper bound for establishing a tunnel, opening the transport included.
    pub handshake_timeout: Duration,
    pub limits: HandshakeLimits,
}

impl Default for ConnectorSettings {
    fn default() -> Self {
        Self {
            handshake_timeout: Duration::from_secs(30),
            limits: HandshakeLimits::default(),
        }
    }
}

/// Opens tunnels through one or two CONNECT proxies.
///
/// Holds no per-connection state: every call owns its stream until it either
/// returns it or shuts it down, so one connector can serve many tasks.
#[derive(Clone)]
pub struct TunnelConnector {
    transport: Arc<dyn TransportPort>,
    security: Arc<dyn SecureChannelPort>,
    settings: ConnectorSettings,
}

impl TunnelConnector {
    pub fn new(
        transport: Arc<dyn TransportPort>,
        security: Arc<dyn SecureChannelPort>,
        settings: ConnectorSettings,
    ) -> Self {
        Self {
            transport,
            security,
            settings,
        }
    }

    pub fn settings(&self) -> &ConnectorSettings {
        &self.settings
    }

    /// Single hop: connect to `proxy`, secure the link and ask for `target`.
    pub async fn connect(&self, proxy: &ProxyEndpoint, target: &TargetEndpoint) -> Result<TunnelConnection<BoxedIo>> {
        self.connect_route(&TunnelRoute::single(proxy.clone(), target.clone()))
            .await
    }

    /// Same as `connect`, over a stream to `proxy` the caller already opened.
    ///
    /// This is what makes tunnels compose: the stream may itself be a tunnel
    /// returned by an earlier call.
    pub async fn connect_over<S>(
        &self,
        stream: S,
        proxy: &ProxyEndpoint,
        target: &TargetEndpoint,
    ) -> Result<TunnelConnection<BoxedIo>>
    where
        S: TunnelIo + 'static,
    {
        proxy.validate()?;
        target.validate()?;
        self.with_deadline(target, async {
            let stream = self.enter(Box::new(stream), proxy).await?;
            perform_connect(stream, target, proxy.credentials.as_ref(), &self.settings.limits).await
        })
        .await
    }

    /// Walks every hop of `route` and returns the stream to its target.
    pub async fn connect_route(&self, route: &TunnelRoute) -> Result<TunnelConnection<BoxedIo>> {
        for hop in route.hops() {
            hop.validate()?;
        }
        route.target().validate()?;

        let tunnel = self.with_deadline(route.target(), self.establish(route)).await?;
        info!(route = %route, status = %tunnel.status_line(), "tunnel established");
        Ok(tunnel)
    }

    async fn establish(&self, route: &TunnelRoute) -> Result<TunnelConnection<BoxedIo>> {
        let hops = route.hops();
        let (first, last) = match (hops.first(), hops.last()) {
            (Some(first), Some(last)) => (first, last),
            _ => return Err(TunnelError::InvalidEndpoint("A route needs at least one proxy".into())),
        };

        let stream = self.transport.open(first).await?;
        let mut stream = self.enter(stream, first).await?;

        for pair in hops.windows(2) {
            let (hop, next_hop) = (&pair[0], &pair[1]);
            let tunnel = perform_connect(
                stream,
                &next_hop.as_target(),
                hop.credentials.as_ref(),
                &self.settings.limits,
            )
            .await?;
            debug!(proxy = %hop, next = %next_hop, "intermediate hop established");
            stream = self.enter(Box::new(tunnel), next_hop).await?;
        }

        perform_connect(stream, route.target(), last.credentials.as_ref(), &self.settings.limits).await
    }

    /// Brings `stream` up to the point where `proxy` can read a request from it.
    async fn enter(&self, stream: BoxedIo, proxy: &ProxyEndpoint) -> Result<BoxedIo> {
        if proxy.scheme.is_secure() {
            let secured = self.security.secure(stream, proxy).await?;
            debug!(proxy = %proxy, "secure channel established");
            Ok(secured)
        } else {
            Ok(stream)
        }
    }

    async fn with_deadline<T>(&self, target: &TargetEndpoint, fut: impl Future<Output = Result<T>>) -> Result<T> {
        match tokio::time::timeout(self.settings.handshake_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(TunnelError::Timeout(format!(
                "tunnel to {} not established within {:?}",
                target, self.settings.handshake_timeout
            ))),
        }
    }
}
