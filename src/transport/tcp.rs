//! TCP transport implementation for simulated peripherals

use crate::transport::traits::{track_broken, TransportConnector, TransportStream};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

/// TCP stream wrapper implementing TransportStream
pub struct TcpTransportStream {
    inner: TcpStream,
    broken: bool,
}

impl TcpTransportStream {
    pub fn new(stream: TcpStream) -> Self {
        // Small writes (receipt lines, commands) should not sit in Nagle's buffer
        if let Err(e) = stream.set_nodelay(true) {
            debug!("[TCP] set_nodelay failed: {}", e);
        }
        Self {
            inner: stream,
            broken: false,
        }
    }
}

impl AsyncWrite for TcpTransportStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        let poll = Pin::new(&mut this.inner).poll_write(cx, buf);
        track_broken(&mut this.broken, poll)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let poll = Pin::new(&mut this.inner).poll_flush(cx);
        track_broken(&mut this.broken, poll)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        this.broken = true;
        Pin::new(&mut this.inner).poll_shutdown(cx)
    }
}

#[async_trait]
impl TransportStream for TcpTransportStream {
    fn is_alive(&self) -> bool {
        !self.broken && self.inner.peer_addr().is_ok()
    }

    async fn probe(&mut self) -> io::Result<()> {
        self.flush().await?;
        // Pending socket error (RST, unreachable) surfaces here before any write
        if let Some(e) = self.inner.take_error()? {
            self.broken = true;
            return Err(e);
        }
        if let Err(e) = self.inner.peer_addr() {
            self.broken = true;
            return Err(e);
        }
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<()> {
        self.broken = true;
        tokio::io::AsyncWriteExt::shutdown(&mut self.inner).await?;
        Ok(())
    }
}

/// TCP connector, the address is `host:port`
#[derive(Debug, Default, Clone)]
pub struct TcpConnector;

impl TcpConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TransportConnector for TcpConnector {
    type Stream = TcpTransportStream;

    async fn connect(&self, address: &str) -> Result<Self::Stream> {
        let stream = TcpStream::connect(address)
            .await
            .map_err(|e| anyhow!("TCP connect to {} failed: {}", address, e))?;
        debug!("[TCP] Connected to {}", address);
        Ok(TcpTransportStream::new(stream))
    }

    fn validate_address(&self, address: &str) -> Result<()> {
        match address.rsplit_once(':') {
            Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => Ok(()),
            _ => Err(anyhow!("expected host:port, got {:?}", address)),
        }
    }

    fn name(&self) -> &'static str {
        "TCP"
    }
}
