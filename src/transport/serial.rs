//! Serial TTY transport, e.g. an RFCOMM channel bound to `/dev/rfcomm0`

use crate::transport::traits::{track_broken, TransportConnector, TransportStream};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use spp_link_shared::DeviceInfo;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::AsyncWrite;
use tokio_serial::{SerialPortBuilderExt, SerialPortType, SerialStream};
use tracing::info;

/// Default baud rate for serial peripherals
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Serial port stream wrapper implementing TransportStream
pub struct SerialTransportStream {
    inner: SerialStream,
    broken: bool,
}

impl SerialTransportStream {
    pub fn new(stream: SerialStream) -> Self {
        Self {
            inner: stream,
            broken: false,
        }
    }
}

impl AsyncWrite for SerialTransportStream {
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
impl TransportStream for SerialTransportStream {
    fn is_alive(&self) -> bool {
        !self.broken
    }

    async fn shutdown(&mut self) -> Result<()> {
        self.broken = true;
        tokio::io::AsyncWriteExt::shutdown(&mut self.inner).await?;
        Ok(())
    }
}

/// Configuration for serial connector
#[derive(Debug, Clone)]
pub struct SerialConfig {
    pub baud_rate: u32,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
        }
    }
}

/// Serial connector, the address is a device path
pub struct SerialConnector {
    config: SerialConfig,
}

impl SerialConnector {
    pub fn new(config: SerialConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl TransportConnector for SerialConnector {
    type Stream = SerialTransportStream;

    async fn connect(&self, address: &str) -> Result<Self::Stream> {
        info!("[SERIAL] Opening {} at {} baud", address, self.config.baud_rate);
        let stream = tokio_serial::new(address, self.config.baud_rate)
            .open_native_async()
            .map_err(|e| anyhow!("open {} failed: {}", address, e))?;
        Ok(SerialTransportStream::new(stream))
    }

    async fn scan(&self) -> Result<Vec<DeviceInfo>> {
        let ports = tokio_serial::available_ports()?;
        Ok(ports
            .into_iter()
            .map(|port| {
                let name = match port.port_type {
                    SerialPortType::UsbPort(usb) => usb.product,
                    SerialPortType::BluetoothPort => Some("Bluetooth serial".into()),
                    SerialPortType::PciPort | SerialPortType::Unknown => None,
                };
                DeviceInfo::new(name, port.port_name)
            })
            .collect())
    }

    fn name(&self) -> &'static str {
        "Serial"
    }
}
