#![cfg(test)]
#![allow(dead_code)]

use std::sync::Arc;

use connect_tunnel::adapters::{RustlsChannel, TcpTransport};
use connect_tunnel::domain::{ConnectorSettings, ProxyEndpoint, TargetEndpoint, TunnelConnector, TunnelRoute};

use super::echo_server::EchoServer;
use super::tls_proxy::{ProxyBehavior, TestCert, TlsProxy};

/// Connector trusting only `cert`.
pub fn client_connector(cert: &TestCert) -> TunnelConnector {
    TunnelConnector::new(
        Arc::new(TcpTransport::default()),
        Arc::new(RustlsChannel::new(cert.roots()).unwrap()),
        ConnectorSettings::default(),
    )
}

/// Echo target behind one or more relaying TLS proxies, all sharing one certificate.
pub struct ProxyChainFixture {
    pub cert: TestCert,
    pub target: EchoServer,
    pub proxies: Vec<TlsProxy>,
}

impl ProxyChainFixture {
    pub async fn new(hops: usize) -> Result<Self, Box<dyn std::error::Error>> {
        let cert = TestCert::localhost();
        let target = EchoServer::start().await?;
        let mut proxies = Vec::with_capacity(hops);
        for _ in 0..hops {
            proxies.push(TlsProxy::start(&cert, ProxyBehavior::Relay).await?);
        }
        Ok(Self { cert, target, proxies })
    }

    pub fn connector(&self) -> TunnelConnector {
        client_connector(&self.cert)
    }

    pub fn route(&self) -> TunnelRoute {
        let hops = self
            .proxies
            .iter()
            .map(|p| p.endpoint().parse::<ProxyEndpoint>().unwrap())
            .collect();
        let target = TargetEndpoint::new("127.0.0.1", self.target.addr().port()).unwrap();
        TunnelRoute::new(hops, target).unwrap()
    }
}
