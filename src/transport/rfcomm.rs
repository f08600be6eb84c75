//! RFCOMM transport implementation for Bluetooth serial peripherals

use crate::transport::bt_discovery::{BtDiscovery, DiscoveryConfig};
use crate::transport::traits::{track_broken, TransportConnector, TransportStream};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use bluer::rfcomm::{SocketAddr as RfcommAddr, Stream as RfcommStream};
use bluer::Address;
use spp_link_shared::DeviceInfo;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::info;

/// Default RFCOMM channel for the serial port service
pub const DEFAULT_RFCOMM_CHANNEL: u8 = 1;

/// RFCOMM stream wrapper implementing TransportStream
pub struct RfcommTransportStream {
    inner: RfcommStream,
    peer_addr: Address,
    broken: bool,
}

impl RfcommTransportStream {
    /// Create a new RFCOMM transport stream
    pub fn new(stream: RfcommStream, peer_addr: Address) -> Self {
        Self {
            inner: stream,
            peer_addr,
            broken: false,
        }
    }

    /// Get the peer Bluetooth address
    pub fn peer_address(&self) -> Address {
        self.peer_addr
    }
}

impl AsyncWrite for RfcommTransportStream {
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
impl TransportStream for RfcommTransportStream {
    fn is_alive(&self) -> bool {
        !self.broken && self.inner.peer_addr().is_ok()
    }

    async fn probe(&mut self) -> io::Result<()> {
        self.flush().await?;
        // The kernel drops the peer address once the baseband link is gone
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

/// Configuration for RFCOMM connector
#[derive(Debug, Clone)]
pub struct RfcommConfig {
    /// RFCOMM channel number
    pub channel: u8,
    /// Device enumeration configuration
    pub discovery: DiscoveryConfig,
}

impl Default for RfcommConfig {
    fn default() -> Self {
        Self {
            channel: DEFAULT_RFCOMM_CHANNEL,
            discovery: DiscoveryConfig::default(),
        }
    }
}

/// RFCOMM connector for Bluetooth serial peripherals, the address is a MAC
pub struct RfcommConnector {
    config: RfcommConfig,
}

impl RfcommConnector {
    /// Create a new RFCOMM connector
    pub fn new(config: RfcommConfig) -> Self {
        Self { config }
    }

    /// Create connector for a specific channel with default discovery
    pub fn with_channel(channel: u8) -> Self {
        Self::new(RfcommConfig {
            channel,
            ..Default::default()
        })
    }

    fn parse_address(address: &str) -> Result<Address> {
        address
            .trim()
            .parse::<Address>()
            .map_err(|e| anyhow!("invalid Bluetooth address {:?}: {}", address, e))
    }
}

#[async_trait]
impl TransportConnector for RfcommConnector {
    type Stream = RfcommTransportStream;

    async fn connect(&self, address: &str) -> Result<Self::Stream> {
        let target_addr = Self::parse_address(address)?;

        let socket_addr = RfcommAddr::new(target_addr, self.config.channel);
        info!("[BT] Connecting to {} channel {}", target_addr, self.config.channel);

        let stream = RfcommStream::connect(socket_addr)
            .await
            .map_err(|e| anyhow!("RFCOMM connect failed: {}", e))?;

        info!("[BT] Connected to {}", target_addr);
        Ok(RfcommTransportStream::new(stream, target_addr))
    }

    fn validate_address(&self, address: &str) -> Result<()> {
        Self::parse_address(address).map(|_| ())
    }

    async fn scan(&self) -> Result<Vec<DeviceInfo>> {
        let adapter = BtDiscovery::get_adapter().await?;
        BtDiscovery::new(self.config.discovery.clone())
            .scan(&adapter)
            .await
    }

    fn name(&self) -> &'static str {
        "Bluetooth"
    }
}
