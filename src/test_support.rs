//! In-memory streams and ports shared by the unit tests.

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, DuplexStream, ReadBuf};
use tokio::task::JoinHandle;

use crate::domain::{ProxyEndpoint, Result, TunnelError};
use crate::ports::{BoxedIo, SecureChannelPort, TransportPort};

/// Observes what happened to a `MockStream` after it was handed away.
#[derive(Clone, Default)]
pub struct StreamProbe {
    shutdowns: Arc<AtomicUsize>,
    dropped: Arc<AtomicBool>,
}

impl StreamProbe {
    pub fn shutdowns(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }

    pub fn is_dropped(&self) -> bool {
        self.dropped.load(Ordering::SeqCst)
    }
}

pub struct MockStream {
    inner: DuplexStream,
    probe: StreamProbe,
}

impl Drop for MockStream {
    fn drop(&mut self) {
        self.probe.dropped.store(true, Ordering::SeqCst);
    }
}

impl AsyncRead for MockStream {
    fn poll_read(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for MockStream {
    fn poll_write(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<std::io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        self.probe.shutdowns.fetch_add(1, Ordering::SeqCst);
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

/// Client end wrapped in a `MockStream`, its probe, and the raw proxy end.
pub fn mock_pair() -> (MockStream, StreamProbe, DuplexStream) {
    let (client, server) = tokio::io::duplex(64 * 1024);
    let probe = StreamProbe::default();
    let stream = MockStream {
        inner: client,
        probe: probe.clone(),
    };
    (stream, probe, server)
}

/// Plays a proxy: for each canned response, reads one request head and answers.
///
/// With `hold_open` the proxy keeps its end until the client goes away,
/// otherwise it hangs up right after the last response. Resolves to the
/// request heads it received.
pub fn spawn_proxy(mut server: DuplexStream, responses: Vec<Vec<u8>>, hold_open: bool) -> JoinHandle<Vec<String>> {
    tokio::spawn(async move {
        let mut requests = Vec::new();
        for response in responses {
            let head = read_request_head(&mut server).await;
            if head.is_empty() {
                break;
            }
            requests.push(head);
            if server.write_all(&response).await.is_err() {
                break;
            }
        }
        if hold_open {
            let mut sink = Vec::new();
            let _ = server.read_to_end(&mut sink).await;
        }
        requests
    })
}

async fn read_request_head(server: &mut DuplexStream) -> String {
    let mut head = Vec::new();
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        match server.read(&mut byte).await {
            Ok(1) => head.push(byte[0]),
            _ => break,
        }
    }
    String::from_utf8_lossy(&head).into_owned()
}

/// Hands out prepared streams in order.
pub struct MockTransport {
    streams: Mutex<VecDeque<MockStream>>,
    opened: AtomicUsize,
}

impl MockTransport {
    pub fn new(streams: Vec<MockStream>) -> Self {
        Self {
            streams: Mutex::new(streams.into()),
            opened: AtomicUsize::new(0),
        }
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TransportPort for MockTransport {
    async fn open(&self, proxy: &ProxyEndpoint) -> Result<BoxedIo> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        let next = self.streams.lock().map(|mut s| s.pop_front()).unwrap_or(None);
        match next {
            Some(stream) => Ok(Box::new(stream)),
            None => Err(TunnelError::ConnectFailed(format!("{}: connection refused", proxy.authority()))),
        }
    }
}

/// Pretends to secure the stream; counts calls and can be told to fail.
#[derive(Default)]
pub struct MockSecurity {
    calls: Mutex<Vec<String>>,
    fail: bool,
}

impl MockSecurity {
    pub fn failing() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn secured_hosts(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl SecureChannelPort for MockSecurity {
    async fn secure(&self, stream: BoxedIo, proxy: &ProxyEndpoint) -> Result<BoxedIo> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(proxy.host.clone());
        }
        if self.fail {
            drop(stream);
            return Err(TunnelError::ConnectFailed(format!(
                "TLS handshake with {} failed: invalid peer certificate",
                proxy
            )));
        }
        Ok(stream)
    }
}
