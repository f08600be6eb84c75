//! Transport trait abstraction for pluggable byte-stream backends

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use spp_link_shared::DeviceInfo;
use std::io;
use std::task::Poll;
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// An established byte-stream connection to a peripheral
#[async_trait]
pub trait TransportStream: AsyncWrite + Send + Unpin + 'static {
    /// Whether the connection still looks usable, without touching the wire
    fn is_alive(&self) -> bool;

    /// Lightweight liveness probe
    async fn probe(&mut self) -> io::Result<()> {
        self.flush().await
    }

    /// Close the transport gracefully
    async fn shutdown(&mut self) -> Result<()>;
}

/// Factory for creating transport connections
#[async_trait]
pub trait TransportConnector: Send + Sync + 'static {
    /// The stream type this connector produces
    type Stream: TransportStream;

    /// Attempt to connect to `address`, returning a stream on success
    async fn connect(&self, address: &str) -> Result<Self::Stream>;

    /// Reject addresses this transport can never connect to
    fn validate_address(&self, address: &str) -> Result<()> {
        if address.trim().is_empty() {
            return Err(anyhow!("address is empty"));
        }
        Ok(())
    }

    /// Enumerate peripherals reachable over this transport
    async fn scan(&self) -> Result<Vec<DeviceInfo>> {
        Ok(Vec::new())
    }

    /// Human-readable name for this transport
    fn name(&self) -> &'static str;
}

/// Latch `broken` when a poll result carries an I/O error
pub(crate) fn track_broken<T>(broken: &mut bool, poll: Poll<io::Result<T>>) -> Poll<io::Result<T>> {
    if let Poll::Ready(Err(_)) = &poll {
        *broken = true;
    }
    poll
}
