use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use super::{Credentials, Result, TargetEndpoint, TunnelError};
use crate::connection::TunnelConnection;

const READ_CHUNK: usize = 1024;
const STATUS_VERSIONS: [&str; 2] = ["HTTP/1.0 ", "HTTP/1.1 "];

/// Bounds on how much of a proxy response is buffered before giving up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HandshakeLimits {
    pub max_header_lines: usize,
    pub max_line_length: usize,
}

impl Default for HandshakeLimits {
    fn default() -> Self {
        Self {
            max_header_lines: 64,
            max_line_length: 8192,
        }
    }
}

pub fn format_connect_request(target: &TargetEndpoint, credentials: Option<&Credentials>) -> String {
    let mut request = format!("CONNECT {} HTTP/1.0\r\n", target.authority());
    if let Some(creds) = credentials {
        request.push_str(&format!("Proxy-Authorization: {}\r\n", creds.to_basic_auth()));
    }
    request.push_str("\r\n");
    request
}

/// Accepts `HTTP/1.0 200 ...` and `HTTP/1.1 200 ...`, reason phrase optional.
///
/// Anything else is a rejection carrying the line without its version prefix,
/// or the whole line when it does not look like an HTTP status line at all.
pub fn check_status_line(line: &str) -> Result<()> {
    let rest = match STATUS_VERSIONS.iter().find_map(|v| line.strip_prefix(v)) {
        Some(rest) => rest,
        None => return Err(TunnelError::ProxyRejected(line.to_string())),
    };

    match rest.split(' ').next() {
        Some("200") => Ok(()),
        _ => Err(TunnelError::ProxyRejected(rest.to_string())),
    }
}

/// Runs the CONNECT exchange over an already open stream.
///
/// On success the stream comes back wrapped so that the first byte read from
/// it is the first byte sent after the proxy's header block. On failure the
/// stream is shut down before the error is returned.
pub async fn perform_connect<S>(
    mut stream: S,
    target: &TargetEndpoint,
    credentials: Option<&Credentials>,
    limits: &HandshakeLimits,
) -> Result<TunnelConnection<S>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    match exchange(&mut stream, target, credentials, limits).await {
        Ok((status_line, pending)) => {
            debug!(target = %target, status = %status_line, "CONNECT accepted");
            Ok(TunnelConnection::new(stream, pending, status_line))
        }
        Err(err) => {
            debug!(target = %target, error = %err, "closing proxy connection");
            if let Err(e) = stream.shutdown().await {
                debug!(error = %e, "proxy connection shutdown failed");
            }
            Err(err)
        }
    }
}

async fn exchange<S>(
    stream: &mut S,
    target: &TargetEndpoint,
    credentials: Option<&Credentials>,
    limits: &HandshakeLimits,
) -> Result<(String, Bytes)>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let request = format_connect_request(target, credentials);
    stream
        .write_all(request.as_bytes())
        .await
        .map_err(|e| TunnelError::io(format!("failed to send CONNECT {}", target), e))?;
    stream
        .flush()
        .await
        .map_err(|e| TunnelError::io(format!("failed to send CONNECT {}", target), e))?;

    let mut reader = ResponseReader::new(&mut *stream, limits.max_line_length);

    let status_line = match reader.next_line().await? {
        Some(line) => line,
        None => {
            // EOF: an unterminated status line still gets classified so a
            // rejection is reported as such.
            let partial = reader.take_partial();
            if !partial.is_empty() {
                check_status_line(&partial)?;
            }
            return Err(TunnelError::TruncatedResponse);
        }
    };
    check_status_line(&status_line)?;

    let mut header_lines = 0;
    loop {
        match reader.next_line().await? {
            None => return Err(TunnelError::TruncatedResponse),
            Some(line) if line.is_empty() => break,
            Some(_) => {
                header_lines += 1;
                if header_lines > limits.max_header_lines {
                    return Err(TunnelError::ResponseTooLarge(format!(
                        "more than {} header lines",
                        limits.max_header_lines
                    )));
                }
            }
        }
    }

    Ok((status_line, reader.into_remaining()))
}

/// Splits a proxy response into lines while keeping whatever follows them.
struct ResponseReader<'a, S> {
    stream: &'a mut S,
    buf: BytesMut,
    max_line_length: usize,
}

impl<'a, S: AsyncRead + Unpin> ResponseReader<'a, S> {
    fn new(stream: &'a mut S, max_line_length: usize) -> Self {
        Self {
            stream,
            buf: BytesMut::with_capacity(READ_CHUNK),
            max_line_length,
        }
    }

    /// Next `\n`-terminated line with the terminator (and a preceding `\r`)
    /// removed, or `None` once the stream ends before another terminator.
    async fn next_line(&mut self) -> Result<Option<String>> {
        loop {
            if let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
                let raw = self.buf.split_to(pos + 1);
                let line = strip_line_ending(&raw);
                if line.len() > self.max_line_length {
                    return Err(self.line_too_long());
                }
                return Ok(Some(String::from_utf8_lossy(line).into_owned()));
            }
            // a trailing `\r` may still be followed by its `\n`
            let unterminated = self.buf.strip_suffix(b"\r").unwrap_or(&self.buf[..]);
            if unterminated.len() > self.max_line_length {
                return Err(self.line_too_long());
            }

            self.buf.reserve(READ_CHUNK);
            let n = match self.stream.read_buf(&mut self.buf).await {
                Ok(n) => n,
                // TLS peers that hang up without close_notify
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => 0,
                Err(e) => return Err(TunnelError::io("failed to read proxy response", e)),
            };
            if n == 0 {
                return Ok(None);
            }
        }
    }

    /// Unterminated bytes left over after `next_line` hit the end of the stream.
    fn take_partial(&mut self) -> String {
        let raw = self.buf.split();
        String::from_utf8_lossy(strip_line_ending(&raw)).into_owned()
    }

    fn into_remaining(self) -> Bytes {
        self.buf.freeze()
    }

    fn line_too_long(&self) -> TunnelError {
        TunnelError::ResponseTooLarge(format!("line longer than {} bytes", self.max_line_length))
    }
}

fn strip_line_ending(raw: &[u8]) -> &[u8] {
    let line = raw.strip_suffix(b"\n").unwrap_or(raw);
    line.strip_suffix(b"\r").unwrap_or(line)
}
