//! Scriptable in-memory transport for exercising the link lifecycle

use crate::transport::traits::{TransportConnector, TransportStream};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use spp_link_shared::DeviceInfo;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::AsyncWrite;

#[derive(Default)]
struct MockState {
    /// Refuse the next N connect attempts
    refuse_next: u32,
    /// Refuse every connect attempt
    refuse_all: bool,
    /// Simulated connect latency
    connect_delay: Option<Duration>,
    fail_writes: bool,
    fail_flush: bool,
    panic_on_probe: bool,
    /// Probes never complete, as a flush stuck on a half-dead link
    stall_probe: bool,
    connect_attempts: Vec<String>,
    written: Vec<u8>,
    shutdowns: usize,
    /// Alive flag of every stream handed out, newest last
    streams: Vec<Arc<AtomicBool>>,
}

/// Connector whose streams share one scripted state
#[derive(Clone, Default)]
pub struct MockConnector {
    state: Arc<Mutex<MockState>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    pub fn refuse_next(&self, n: u32) {
        self.state().refuse_next = n;
    }

    pub fn refuse_all(&self, refuse: bool) {
        self.state().refuse_all = refuse;
    }

    pub fn set_connect_delay(&self, delay: Duration) {
        self.state().connect_delay = Some(delay);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.state().fail_writes = fail;
    }

    pub fn fail_flush(&self, fail: bool) {
        self.state().fail_flush = fail;
    }

    pub fn panic_on_probe(&self, panic: bool) {
        self.state().panic_on_probe = panic;
    }

    pub fn stall_probe(&self, stall: bool) {
        self.state().stall_probe = stall;
    }

    /// Silently drop the newest connection, as a peripheral walking out of range
    pub fn kill_current(&self) {
        if let Some(alive) = self.state().streams.last() {
            alive.store(false, Ordering::SeqCst);
        }
    }

    pub fn connect_attempts(&self) -> Vec<String> {
        self.state().connect_attempts.clone()
    }

    pub fn written(&self) -> Vec<u8> {
        self.state().written.clone()
    }

    pub fn shutdowns(&self) -> usize {
        self.state().shutdowns
    }
}

#[async_trait]
impl TransportConnector for MockConnector {
    type Stream = MockStream;

    async fn connect(&self, address: &str) -> Result<Self::Stream> {
        let delay = {
            let mut state = self.state();
            state.connect_attempts.push(address.to_string());
            state.connect_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state();
        if state.refuse_all {
            return Err(anyhow!("host is down"));
        }
        if state.refuse_next > 0 {
            state.refuse_next -= 1;
            return Err(anyhow!("host is down"));
        }

        let alive = Arc::new(AtomicBool::new(true));
        state.streams.push(alive.clone());
        Ok(MockStream {
            state: self.state.clone(),
            alive,
        })
    }

    async fn scan(&self) -> Result<Vec<DeviceInfo>> {
        Ok(vec![DeviceInfo::new(Some("Mock Printer".into()), "AA:BB")])
    }

    fn name(&self) -> &'static str {
        "Mock"
    }
}

pub struct MockStream {
    state: Arc<Mutex<MockState>>,
    alive: Arc<AtomicBool>,
}

impl AsyncWrite for MockStream {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let mut state = self.state.lock().unwrap();
        if state.fail_writes || !self.alive.load(Ordering::SeqCst) {
            return Poll::Ready(Err(io::Error::new(io::ErrorKind::BrokenPipe, "broken pipe")));
        }
        state.written.extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        if self.state.lock().unwrap().fail_flush {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "connection reset",
            )));
        }
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.alive.store(false, Ordering::SeqCst);
        self.state.lock().unwrap().shutdowns += 1;
        Poll::Ready(Ok(()))
    }
}

#[async_trait]
impl TransportStream for MockStream {
    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    async fn probe(&mut self) -> io::Result<()> {
        // Read the flags and release the lock before unwinding
        let (panic_on_probe, stall_probe) = {
            let state = self.state.lock().unwrap();
            (state.panic_on_probe, state.stall_probe)
        };
        if panic_on_probe {
            panic!("probe exploded");
        }
        if stall_probe {
            return futures::future::pending().await;
        }
        tokio::io::AsyncWriteExt::flush(self).await
    }

    async fn shutdown(&mut self) -> Result<()> {
        tokio::io::AsyncWriteExt::shutdown(self).await?;
        Ok(())
    }
}
