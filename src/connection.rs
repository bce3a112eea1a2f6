use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{Buf, Bytes};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

/// An established tunnel.
///
/// The handshake reads the proxy response in chunks, so it may have pulled in
/// bytes that already belong to the tunneled protocol. Those are kept here and
/// handed out before anything else is read from `inner`, which leaves the
/// stream positioned right after the proxy's header block.
pub struct TunnelConnection<S> {
    inner: S,
    pending: Bytes,
    status_line: String,
}

impl<S> TunnelConnection<S> {
    pub fn new(inner: S, pending: Bytes, status_line: String) -> Self {
        Self {
            inner,
            pending,
            status_line,
        }
    }

    /// Status line the proxy answered the CONNECT request with.
    pub fn status_line(&self) -> &str {
        &self.status_line
    }

    /// Bytes received after the header block that have not been read yet.
    pub fn pending(&self) -> &[u8] {
        &self.pending
    }

    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    pub fn into_parts(self) -> (S, Bytes) {
        (self.inner, self.pending)
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for TunnelConnection<S> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<tokio::io::Result<()>> {
        if !self.pending.is_empty() {
            let n = self.pending.len().min(buf.remaining());
            buf.put_slice(&self.pending[..n]);
            self.pending.advance(n);
            return Poll::Ready(Ok(()));
        }
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for TunnelConnection<S> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<core::result::Result<usize, tokio::io::Error>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<core::result::Result<(), std::io::Error>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<core::result::Result<(), std::io::Error>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}
