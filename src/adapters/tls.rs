use async_trait::async_trait;
use rustls::pki_types::{CertificateDer, ServerName};
use rustls::{ClientConfig, RootCertStore};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_rustls::TlsConnector;
use tracing::{debug, info, warn};

use crate::domain::{ProxyEndpoint, Result, TunnelError};
use crate::ports::{BoxedIo, SecureChannelPort};

/// TLS towards the proxy, verified against the configured trust roots.
#[derive(Clone)]
pub struct RustlsChannel {
    connector: TlsConnector,
}

impl RustlsChannel {
    pub fn new(roots: RootCertStore) -> Result<Self> {
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let config = ClientConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .map_err(|e| TunnelError::Config(format!("TLS setup failed: {}", e)))?
            .with_root_certificates(roots)
            .with_no_client_auth();

        Ok(Self {
            connector: TlsConnector::from(Arc::new(config)),
        })
    }

    /// Builds the channel from the system store and/or extra PEM bundles.
    pub fn from_sources(native_roots: bool, ca_files: &[PathBuf]) -> Result<Self> {
        let mut roots = RootCertStore::empty();

        if native_roots {
            let native = rustls_native_certs::load_native_certs();
            for err in native.errors {
                warn!("Skipping unreadable system certificate: {}", err);
            }
            let (added, ignored) = roots.add_parsable_certificates(native.certs);
            debug!("Loaded {} system certificates ({} ignored)", added, ignored);
        }

        for path in ca_files {
            for cert in load_certs(path)? {
                roots
                    .add(cert)
                    .map_err(|e| TunnelError::Config(format!("Invalid certificate in {}: {}", path.display(), e)))?;
            }
            info!("Trusting certificates from {}", path.display());
        }

        if roots.is_empty() {
            return Err(TunnelError::Config("No trusted certificates configured".into()));
        }
        Self::new(roots)
    }
}

#[async_trait]
impl SecureChannelPort for RustlsChannel {
    async fn secure(&self, stream: BoxedIo, proxy: &ProxyEndpoint) -> Result<BoxedIo> {
        let server_name = ServerName::try_from(proxy.host.clone()).map_err(|e| {
            TunnelError::InvalidEndpoint(format!("{} is not a valid TLS server name: {}", proxy.host, e))
        })?;

        let tls = self
            .connector
            .connect(server_name, stream)
            .await
            .map_err(|e| TunnelError::io(format!("TLS handshake with {} failed", proxy), e))?;
        Ok(Box::new(tls))
    }
}

pub fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>> {
    let file = File::open(path)
        .map_err(|e| TunnelError::Config(format!("Cannot open {}: {}", path.display(), e)))?;
    rustls_pemfile::certs(&mut BufReader::new(file))
        .collect::<std::io::Result<Vec<_>>>()
        .map_err(|e| TunnelError::Config(format!("Cannot parse {}: {}", path.display(), e)))
}
