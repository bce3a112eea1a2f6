use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TunnelError {
    InvalidEndpoint(String),
    ConnectFailed(String),
    ProxyRejected(String),
    TruncatedResponse,
    ResponseTooLarge(String),
    Timeout(String),
    Config(String),
}

impl fmt::Display for TunnelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TunnelError::InvalidEndpoint(msg) => write!(f, "Invalid endpoint: {}", msg),
            TunnelError::ConnectFailed(msg) => write!(f, "Connection to proxy failed: {}", msg),
            TunnelError::ProxyRejected(detail) => write!(f, "Proxy reports \"{}\"", detail),
            TunnelError::TruncatedResponse => {
                write!(f, "Proxy closed the connection before the end of its response")
            }
            TunnelError::ResponseTooLarge(msg) => write!(f, "Proxy response too large: {}", msg),
            TunnelError::Timeout(msg) => write!(f, "Timed out: {}", msg),
            TunnelError::Config(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl std::error::Error for TunnelError {}

impl TunnelError {
    /// Wraps a lower-level I/O failure that happened before the tunnel was up.
    pub fn io(context: impl fmt::Display, err: std::io::Error) -> Self {
        TunnelError::ConnectFailed(format!("{}: {}", context, err))
    }
}

pub type Result<T> = std::result::Result<T, TunnelError>;
