use std::fmt;
use std::str::FromStr;
use std::time::Instant;

use url::Url;
use uuid::Uuid;

use super::{Result, TunnelError};

/// Longest proxy chain a route may describe.
pub const MAX_HOPS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyScheme {
    Https,
    Http,
}

impl ProxyScheme {
    pub fn as_str(&self) -> &str {
        match self {
            ProxyScheme::Https => "https",
            ProxyScheme::Http => "http",
        }
    }

    pub fn default_port(&self) -> u16 {
        match self {
            ProxyScheme::Https => 443,
            ProxyScheme::Http => 80,
        }
    }

    pub fn is_secure(&self) -> bool {
        matches!(self, ProxyScheme::Https)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: String, password: String) -> Self {
        Self { username, password }
    }

    pub fn to_basic_auth(&self) -> String {
        use base64::Engine;
        let credentials = format!("{}:{}", self.username, self.password);
        format!("Basic {}", base64::prelude::BASE64_STANDARD.encode(credentials))
    }
}

/// Where the tunnel should end up once the proxy starts relaying bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetEndpoint {
    pub host: String,
    pub port: u16,
}

impl TargetEndpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Result<Self> {
        let host = host.into();
        validate(&host, port)?;
        Ok(Self { host, port })
    }

    pub fn validate(&self) -> Result<()> {
        validate(&self.host, self.port)
    }

    /// `host:port` as written on the CONNECT request line. IPv6 literals are bracketed.
    pub fn authority(&self) -> String {
        authority(&self.host, self.port)
    }
}

impl fmt::Display for TargetEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.authority())
    }
}

impl FromStr for TargetEndpoint {
    type Err = TunnelError;

    fn from_str(s: &str) -> Result<Self> {
        let (host, port) = split_host_port(s)?;
        TargetEndpoint::new(host, port)
    }
}

/// A forward proxy that understands `CONNECT`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyEndpoint {
    pub scheme: ProxyScheme,
    pub host: String,
    pub port: u16,
    pub credentials: Option<Credentials>,
}

impl ProxyEndpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Result<Self> {
        let host = host.into();
        validate(&host, port)?;
        Ok(Self {
            scheme: ProxyScheme::Https,
            host,
            port,
            credentials: None,
        })
    }

    pub fn with_scheme(mut self, scheme: ProxyScheme) -> Self {
        self.scheme = scheme;
        self
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn validate(&self) -> Result<()> {
        validate(&self.host, self.port)
    }

    pub fn authority(&self) -> String {
        authority(&self.host, self.port)
    }

    /// The proxy seen as the destination of a previous hop.
    pub fn as_target(&self) -> TargetEndpoint {
        TargetEndpoint {
            host: self.host.clone(),
            port: self.port,
        }
    }
}

impl fmt::Display for ProxyEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.scheme.as_str(), self.authority())
    }
}

impl FromStr for ProxyEndpoint {
    type Err = TunnelError;

    /// Accepts `https://[user:pass@]host[:port]`, `http://...` or a bare `host:port`,
    /// which is taken to be an HTTPS proxy.
    fn from_str(s: &str) -> Result<Self> {
        if !s.contains("://") {
            let (host, port) = split_host_port(s)?;
            return ProxyEndpoint::new(host, port);
        }

        let url = Url::parse(s)
            .map_err(|e| TunnelError::InvalidEndpoint(format!("Invalid proxy URL {}: {}", s, e)))?;
        let scheme = match url.scheme() {
            "https" => ProxyScheme::Https,
            "http" => ProxyScheme::Http,
            other => {
                return Err(TunnelError::InvalidEndpoint(format!(
                    "Unsupported proxy scheme {}",
                    other
                )))
            }
        };
        let host = url
            .host_str()
            .map(|h| h.trim_start_matches('[').trim_end_matches(']').to_string())
            .ok_or_else(|| TunnelError::InvalidEndpoint(format!("Missing host in {}", s)))?;
        let port = url.port().unwrap_or_else(|| scheme.default_port());

        let mut proxy = ProxyEndpoint::new(host, port)?.with_scheme(scheme);
        if !url.username().is_empty() {
            proxy = proxy.with_credentials(Credentials::new(
                decode_userinfo(url.username())?,
                decode_userinfo(url.password().unwrap_or_default())?,
            ));
        }
        Ok(proxy)
    }
}

/// Userinfo in a URL stays percent-encoded; the proxy expects the raw value.
fn decode_userinfo(encoded: &str) -> Result<String> {
    percent_encoding::percent_decode_str(encoded)
        .decode_utf8()
        .map(|decoded| decoded.into_owned())
        .map_err(|e| TunnelError::InvalidEndpoint(format!("Invalid proxy credentials: {}", e)))
}

/// One or more proxies to traverse in order, then the final destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelRoute {
    hops: Vec<ProxyEndpoint>,
    target: TargetEndpoint,
}

impl TunnelRoute {
    pub fn new(hops: Vec<ProxyEndpoint>, target: TargetEndpoint) -> Result<Self> {
        if hops.is_empty() {
            return Err(TunnelError::InvalidEndpoint("A route needs at least one proxy".into()));
        }
        if hops.len() > MAX_HOPS {
            return Err(TunnelError::InvalidEndpoint(format!(
                "At most {} proxies can be chained, got {}",
                MAX_HOPS,
                hops.len()
            )));
        }
        Ok(Self { hops, target })
    }

    pub fn single(proxy: ProxyEndpoint, target: TargetEndpoint) -> Self {
        Self {
            hops: vec![proxy],
            target,
        }
    }

    pub fn hops(&self) -> &[ProxyEndpoint] {
        &self.hops
    }

    pub fn target(&self) -> &TargetEndpoint {
        &self.target
    }
}

impl fmt::Display for TunnelRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for hop in &self.hops {
            write!(f, "{} -> ", hop)?;
        }
        write!(f, "{}", self.target)
    }
}

#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub id: Uuid,
    pub peer: String,
    pub route: String,
    pub opened_at: Instant,
    pub closed_at: Option<Instant>,
}

impl SessionInfo {
    pub fn new(peer: String, route: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            peer,
            route,
            opened_at: Instant::now(),
            closed_at: None,
        }
    }

    pub fn close(&mut self) {
        self.closed_at = Some(Instant::now());
    }
}

/// How a bridged session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Both sides closed cleanly after relaying this many bytes.
    Relayed { sent: u64, received: u64 },
    /// The relay broke off; byte counts are unknown.
    RelayFailed(String),
    /// No tunnel was established.
    TunnelFailed(String),
}

fn validate(host: &str, port: u16) -> Result<()> {
    if host.is_empty() {
        return Err(TunnelError::InvalidEndpoint("Empty host".into()));
    }
    if port == 0 {
        return Err(TunnelError::InvalidEndpoint(format!("Port 0 is not valid for {}", host)));
    }
    Ok(())
}

fn authority(host: &str, port: u16) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    }
}

fn split_host_port(s: &str) -> Result<(String, u16)> {
    let (host, port) = s
        .rsplit_once(':')
        .ok_or_else(|| TunnelError::InvalidEndpoint(format!("Missing port in {}", s)))?;
    let port = port
        .parse::<u16>()
        .map_err(|e| TunnelError::InvalidEndpoint(format!("Invalid port in {}: {}", s, e)))?;
    let host = host.trim_start_matches('[').trim_end_matches(']');
    Ok((host.to_string(), port))
}
