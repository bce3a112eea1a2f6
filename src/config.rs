use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::adapters::{RustlsChannel, TcpTransport};
use crate::domain::{
    ConnectorSettings, HandshakeLimits, ProxyEndpoint, Result, TargetEndpoint, TunnelConnector, TunnelError,
    TunnelRoute,
};

pub const APP_NAME: &str = "connect-tunnel";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Proxies in the order they are traversed, e.g. `https://proxy.example.net:443`.
    pub proxies: Vec<String>,
    /// Final `host:port` to reach through the proxies.
    pub target: Option<String>,
    /// Local address the bridge listens on.
    pub listen: String,
    pub connect_timeout_ms: u64,
    pub handshake_timeout_ms: u64,
    pub limits: HandshakeLimits,
    pub tls: TlsConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsConfig {
    pub native_roots: bool,
    pub ca_files: Vec<PathBuf>,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            native_roots: true,
            ca_files: Vec::new(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            proxies: Vec::new(),
            target: None,
            listen: "127.0.0.1:5900".into(),
            connect_timeout_ms: 10_000,
            handshake_timeout_ms: 30_000,
            limits: HandshakeLimits::default(),
            tls: TlsConfig::default(),
        }
    }
}

impl AppConfig {
    /// Reads `path`, or the per-user config file when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let loaded: std::result::Result<AppConfig, confy::ConfyError> = match path {
            Some(path) => confy::load_path(path),
            None => confy::load(APP_NAME, "config"),
        };
        let config = loaded.map_err(|e| TunnelError::Config(e.to_string()))?;
        debug!(?config, "configuration loaded");
        Ok(config)
    }

    /// Command-line values win over the file.
    pub fn with_overrides(mut self, proxies: Vec<String>, target: Option<String>) -> Self {
        if !proxies.is_empty() {
            self.proxies = proxies;
        }
        if target.is_some() {
            self.target = target;
        }
        self
    }

    pub fn route(&self) -> Result<TunnelRoute> {
        let hops = self
            .proxies
            .iter()
            .map(|p| p.parse::<ProxyEndpoint>())
            .collect::<Result<Vec<_>>>()?;
        let target = self
            .target
            .as_deref()
            .ok_or_else(|| TunnelError::Config("No target configured".into()))?
            .parse::<TargetEndpoint>()?;
        TunnelRoute::new(hops, target)
    }

    pub fn connector_settings(&self) -> ConnectorSettings {
        ConnectorSettings {
            handshake_timeout: Duration::from_millis(self.handshake_timeout_ms),
            limits: self.limits,
        }
    }

    pub fn build_connector(&self) -> Result<TunnelConnector> {
        let transport = TcpTransport::new(Duration::from_millis(self.connect_timeout_ms));
        let security = RustlsChannel::from_sources(self.tls.native_roots, &self.tls.ca_files)?;
        Ok(TunnelConnector::new(
            Arc::new(transport),
            Arc::new(security),
            self.connector_settings(),
        ))
    }
}
