//! Connection manager owning the single link and its background workers

use crate::connection::emitter::EventEmitter;
use crate::connection::{monitor, reconnect};
use crate::transport::{TransportConnector, TransportStream};
use anyhow::anyhow;
use spp_link_shared::{
    timing, DeviceInfo, LinkError, LinkEvent, LinkState, LinkStateMachine, LinkTrigger, Result,
    TransitionResult,
};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Timing configuration for the link lifecycle
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Sleep between probes of a healthy link
    pub monitor_interval: Duration,
    /// Sleep after the monitor found the link missing or dead
    pub monitor_retry_interval: Duration,
    /// Base of the reconnect backoff
    pub reconnect_base_delay: Duration,
    /// Cap on a single reconnect wait
    pub reconnect_max_delay: Duration,
    /// Attempts per reconnect trigger
    pub max_reconnect_attempts: u32,
    /// Transport connect timeout
    pub connect_timeout: Duration,
    /// Timeout for one write + flush
    pub write_timeout: Duration,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            monitor_interval: Duration::from_millis(timing::MONITOR_INTERVAL_MS),
            monitor_retry_interval: Duration::from_millis(timing::MONITOR_RETRY_INTERVAL_MS),
            reconnect_base_delay: Duration::from_millis(timing::RECONNECT_BASE_DELAY_MS),
            reconnect_max_delay: Duration::from_millis(timing::RECONNECT_MAX_DELAY_MS),
            max_reconnect_attempts: timing::MAX_RECONNECT_ATTEMPTS,
            connect_timeout: Duration::from_millis(timing::CONNECT_TIMEOUT_MS),
            write_timeout: Duration::from_millis(timing::WRITE_TIMEOUT_MS),
        }
    }
}

impl LinkConfig {
    /// Wait after failed reconnect attempt `attempt` (1-indexed)
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        Duration::from_millis(timing::backoff_delay_ms(
            attempt,
            self.reconnect_base_delay.as_millis() as u64,
            self.reconnect_max_delay.as_millis() as u64,
        ))
    }
}

/// The live transport connection and the address it was opened with
pub(crate) struct ConnectionHandle<S> {
    pub(crate) stream: Option<S>,
    address: Option<String>,
}

impl<S: TransportStream> ConnectionHandle<S> {
    fn new() -> Self {
        Self {
            stream: None,
            address: None,
        }
    }

    /// Replace the connection, returning the one it supersedes
    fn install(&mut self, stream: S, address: &str) -> Option<S> {
        self.address = Some(address.to_string());
        self.stream.replace(stream)
    }

    fn take(&mut self) -> Option<S> {
        self.address = None;
        self.stream.take()
    }

    fn is_alive(&self) -> bool {
        self.stream.as_ref().is_some_and(|s| s.is_alive())
    }
}

/// State that outlives a single connection
struct Session {
    /// Most recently connected address, kept across a link loss
    last_address: Option<String>,
    /// Cancelled on disconnect, or when a new connect supersedes this session
    token: CancellationToken,
    fsm: LinkStateMachine,
}

struct Worker {
    token: CancellationToken,
    task: JoinHandle<()>,
}

#[derive(Default)]
struct Workers {
    monitor: Option<Worker>,
    reconnect: Option<Worker>,
}

/// Clears a run-state flag when the owning loop exits
pub(crate) struct ActiveFlag<'a>(&'a AtomicBool);

impl<'a> ActiveFlag<'a> {
    pub(crate) fn new(flag: &'a AtomicBool) -> Self {
        Self(flag)
    }
}

impl Drop for ActiveFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// State shared between the manager and its worker tasks
pub(crate) struct Shared<C: TransportConnector> {
    pub(crate) connector: C,
    pub(crate) config: LinkConfig,
    pub(crate) events: EventEmitter,
    pub(crate) link: Mutex<ConnectionHandle<C::Stream>>,
    // std locks below are never held across an await
    session: std::sync::Mutex<Session>,
    workers: std::sync::Mutex<Workers>,
    pub(crate) monitor_active: AtomicBool,
    pub(crate) reconnect_active: AtomicBool,
    shutdown: CancellationToken,
}

impl<C: TransportConnector> Shared<C> {
    fn session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn workers(&self) -> MutexGuard<'_, Workers> {
        self.workers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn session_token(&self) -> CancellationToken {
        self.session().token.clone()
    }

    pub(crate) fn transition(&self, trigger: LinkTrigger) {
        let mut session = self.session();
        let from = session.fsm.state();
        match session.fsm.process(trigger) {
            TransitionResult::Success(to) if from != to => {
                debug!("[LINK] State {:?} -> {:?}", from, to);
            }
            TransitionResult::Success(_) => {}
            TransitionResult::Invalid { from, trigger } => {
                debug!("[LINK] Ignoring {:?} while {:?}", trigger, from);
            }
        }
    }

    /// Cancel the current session and open a fresh one
    fn begin_session(&self) -> CancellationToken {
        let mut session = self.session();
        session.token.cancel();
        session.token = self.shutdown.child_token();
        session.fsm.process(LinkTrigger::ConnectRequested);
        session.token.clone()
    }

    /// Start the reconnect coordinator for the last known address.
    ///
    /// No-op when there is no address, when `origin` (the session or worker
    /// that noticed the failure) was cancelled, or when a reconnect loop is
    /// already running.
    pub(crate) fn trigger_reconnect(self: &Arc<Self>, origin: &CancellationToken) {
        let (address, session) = {
            let session = self.session();
            (session.last_address.clone(), session.token.clone())
        };
        let Some(address) = address else {
            debug!("[RECONNECT] No last known address, nothing to reconnect to");
            return;
        };

        let mut workers = self.workers();
        if origin.is_cancelled() || session.is_cancelled() {
            debug!("[RECONNECT] Trigger from a retired session ignored");
            return;
        }
        if self
            .reconnect_active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("[RECONNECT] Already attempting, trigger ignored");
            return;
        }

        let token = session.child_token();
        let task = tokio::spawn(reconnect::run(Arc::clone(self), address, token.clone()));
        workers.reconnect = Some(Worker { token, task });
    }

    /// Start the liveness monitor unless one is already running
    pub(crate) fn start_monitor(self: &Arc<Self>, origin: &CancellationToken) {
        let session = self.session_token();

        let mut workers = self.workers();
        if origin.is_cancelled() || session.is_cancelled() {
            return;
        }
        if self
            .monitor_active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("[MONITOR] Already running");
            return;
        }

        let token = session.child_token();
        let task = tokio::spawn(monitor::run(Arc::clone(self), token.clone()));
        workers.monitor = Some(Worker { token, task });
    }

    /// Cancel the monitor and reconnect loops and wait for both to exit
    async fn stop_workers(&self) {
        let stopped = {
            let mut workers = self.workers();
            let stopped = [workers.monitor.take(), workers.reconnect.take()];
            for worker in stopped.iter().flatten() {
                worker.token.cancel();
            }
            stopped
        };

        for worker in stopped.into_iter().flatten() {
            if let Err(e) = worker.task.await {
                if e.is_panic() {
                    error!("[LINK] Worker panicked: {}", e);
                }
            }
        }
    }

    /// Install `stream` as the live connection unless `token` was cancelled
    /// while it was being opened. Hands the stream back on refusal.
    pub(crate) async fn install(
        &self,
        stream: C::Stream,
        address: &str,
        token: &CancellationToken,
    ) -> std::result::Result<(), C::Stream> {
        let previous = {
            let mut link = self.link.lock().await;
            {
                let mut session = self.session();
                if token.is_cancelled() {
                    return Err(stream);
                }
                session.last_address = Some(address.to_string());
            }
            link.install(stream, address)
        };

        if let Some(previous) = previous {
            close_quietly(previous).await;
        }
        Ok(())
    }
}

/// Best-effort close; a failure closing a dead resource is not an error
pub(crate) async fn close_quietly<S: TransportStream>(mut stream: S) {
    if let Err(e) = TransportStream::shutdown(&mut stream).await {
        debug!("[LINK] Close failed (ignored): {}", e);
    }
}

/// Stops every worker once the last manager handle is gone.
///
/// Worker tasks hold `Shared` themselves, so its own lifetime cannot be
/// used to tear the link down.
struct Owner<C: TransportConnector>(Arc<Shared<C>>);

impl<C: TransportConnector> Drop for Owner<C> {
    fn drop(&mut self) {
        if !self.0.shutdown.is_cancelled() {
            debug!("[LINK] Last handle dropped, stopping workers");
            self.0.shutdown.cancel();
        }
        self.0.events.unsubscribe();
    }
}

/// Manages the single persistent link to a peripheral
pub struct ConnectionManager<C: TransportConnector> {
    shared: Arc<Shared<C>>,
    _owner: Arc<Owner<C>>,
}

impl<C: TransportConnector> Clone for ConnectionManager<C> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            _owner: Arc::clone(&self._owner),
        }
    }
}

impl<C: TransportConnector> ConnectionManager<C> {
    /// Create a new connection manager; nothing runs until `connect`
    pub fn new(connector: C, config: LinkConfig) -> Self {
        let shutdown = CancellationToken::new();
        let session = Session {
            last_address: None,
            token: shutdown.child_token(),
            fsm: LinkStateMachine::new(),
        };

        let shared = Arc::new(Shared {
            connector,
            config,
            events: EventEmitter::new(),
            link: Mutex::new(ConnectionHandle::new()),
            session: std::sync::Mutex::new(session),
            workers: std::sync::Mutex::new(Workers::default()),
            monitor_active: AtomicBool::new(false),
            reconnect_active: AtomicBool::new(false),
            shutdown,
        });

        Self {
            _owner: Arc::new(Owner(Arc::clone(&shared))),
            shared,
        }
    }

    /// Open a connection to `address`, replacing any existing one
    pub async fn connect(&self, address: &str) -> Result<()> {
        let address = address.trim();
        self.shared
            .connector
            .validate_address(address)
            .map_err(|e| LinkError::InvalidArgument(e.to_string()))?;
        if self.shared.shutdown.is_cancelled() {
            return Err(LinkError::ShutDown);
        }

        let session = self.shared.begin_session();
        self.shared.stop_workers().await;

        let previous = self.shared.link.lock().await.take();
        if let Some(previous) = previous {
            close_quietly(previous).await;
        }

        info!(
            "[LINK] Connecting to {} via {}",
            address,
            self.shared.connector.name()
        );
        let connect_timeout = self.shared.config.connect_timeout;
        let result = match timeout(connect_timeout, self.shared.connector.connect(address)).await {
            Ok(result) => result,
            Err(_) => Err(anyhow!("timed out after {:?}", connect_timeout)),
        };

        let reason = match result {
            Ok(stream) => match self.shared.install(stream, address, &session).await {
                Ok(()) => {
                    self.shared.transition(LinkTrigger::ConnectSucceeded);
                    info!("[LINK] Connected to {}", address);
                    self.shared.events.emit(LinkEvent::Connected {
                        mac: address.to_string(),
                    });
                    self.shared.start_monitor(&session);
                    return Ok(());
                }
                Err(stream) => {
                    // Superseded by disconnect or another connect while opening
                    close_quietly(stream).await;
                    "connect cancelled".to_string()
                }
            },
            Err(e) => e.to_string(),
        };

        warn!("[LINK] Connect to {} failed: {}", address, reason);
        if !session.is_cancelled() {
            self.shared.transition(LinkTrigger::ConnectFailed);
        }
        self.shared.events.emit(LinkEvent::error(reason.clone()));
        Err(LinkError::ConnectFailed(reason))
    }

    /// Tear the link down. Idempotent; always emits `disconnected`.
    pub async fn disconnect(&self) {
        info!("[LINK] Disconnecting");
        {
            let mut session = self.shared.session();
            session.last_address = None;
            session.token.cancel();
            session.fsm.process(LinkTrigger::DisconnectRequested);
        }

        // Workers must be gone before the connection is, or the monitor
        // would see the closed link and start a reconnect
        self.shared.stop_workers().await;

        let stream = self.shared.link.lock().await.take();
        if let Some(stream) = stream {
            close_quietly(stream).await;
        }

        self.shared.events.emit(LinkEvent::Disconnected);
    }

    /// Write `data` and flush. An I/O failure also starts recovery in the
    /// background.
    pub async fn write(&self, data: &[u8]) -> Result<()> {
        if data.is_empty() {
            return Err(LinkError::InvalidArgument("bytes empty".into()));
        }

        let origin = self.shared.session_token();
        let write_timeout = self.shared.config.write_timeout;
        // Waiting for the link counts against the timeout too
        let send = async {
            let mut link = self.shared.link.lock().await;
            let stream = link.stream.as_mut()?;
            let sent = async {
                stream.write_all(data).await?;
                stream.flush().await
            };
            Some(sent.await)
        };
        let result = match timeout(write_timeout, send).await {
            Ok(Some(result)) => result,
            Ok(None) => return Err(LinkError::NotConnected),
            Err(_) => Err(io::Error::new(io::ErrorKind::TimedOut, "write timed out")),
        };

        if let Err(e) = result {
            warn!("[LINK] Write failed: {}", e);
            self.shared.events.emit(LinkEvent::error(format!("IO: {}", e)));
            self.shared.trigger_reconnect(&origin);
            return Err(LinkError::Io(e));
        }
        Ok(())
    }

    /// True iff a connection is installed and reports alive
    pub async fn is_connected(&self) -> bool {
        self.shared.link.lock().await.is_alive()
    }

    /// Address of the installed connection, if any
    pub async fn connected_address(&self) -> Option<String> {
        self.shared.link.lock().await.address.clone()
    }

    /// Enumerate peripherals through the transport
    pub async fn scan(&self) -> Result<Vec<DeviceInfo>> {
        self.shared
            .connector
            .scan()
            .await
            .map_err(|e| LinkError::ScanFailed(e.to_string()))
    }

    /// Start recovery towards the last known address
    pub fn trigger_reconnect(&self) {
        let origin = self.shared.session_token();
        self.shared.trigger_reconnect(&origin);
    }

    /// Register the observer, replacing any previous one
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<LinkEvent> {
        self.shared.events.subscribe()
    }

    /// Drop the observer
    pub fn unsubscribe(&self) {
        self.shared.events.unsubscribe();
    }

    /// Stop every worker, close the link and drop the observer.
    /// The manager refuses new connections afterwards.
    pub async fn shutdown(&self) {
        info!("[LINK] Shutting down");
        self.shared.shutdown.cancel();
        self.shared.transition(LinkTrigger::DisconnectRequested);
        self.shared.stop_workers().await;

        let stream = self.shared.link.lock().await.take();
        if let Some(stream) = stream {
            close_quietly(stream).await;
            self.shared.events.emit(LinkEvent::Disconnected);
        }
        self.shared.events.unsubscribe();
    }

    pub fn state(&self) -> LinkState {
        self.shared.session().fsm.state()
    }

    pub fn last_address(&self) -> Option<String> {
        self.shared.session().last_address.clone()
    }

    pub fn is_monitoring(&self) -> bool {
        self.shared.monitor_active.load(Ordering::Acquire)
    }

    pub fn is_reconnecting(&self) -> bool {
        self.shared.reconnect_active.load(Ordering::Acquire)
    }

    pub fn config(&self) -> &LinkConfig {
        &self.shared.config
    }

    pub fn transport_name(&self) -> &'static str {
        self.shared.connector.name()
    }

    #[cfg(test)]
    pub(crate) fn shared(&self) -> &Arc<Shared<C>> {
        &self.shared
    }

    #[cfg(test)]
    pub(crate) fn current_session(&self) -> CancellationToken {
        self.shared.session_token()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::testing::{collect_until, drain, manager, next_event, wait_until};
    use crate::transport::mock::MockConnector;

    #[test]
    fn test_default_config() {
        let config = LinkConfig::default();
        assert_eq!(config.monitor_interval, Duration::from_secs(5));
        assert_eq!(config.monitor_retry_interval, Duration::from_secs(3));
        assert_eq!(config.max_reconnect_attempts, 6);
        assert_eq!(config.backoff_delay(1), Duration::from_millis(2000));
        assert_eq!(config.backoff_delay(5), Duration::from_millis(30000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_emits_connected() {
        let connector = MockConnector::new();
        let link = manager(&connector);
        let mut events = link.subscribe();

        link.connect("AA:BB").await.unwrap();

        assert_eq!(next_event(&mut events).await, LinkEvent::Connected { mac: "AA:BB".into() });
        assert!(link.is_connected().await);
        assert!(link.is_monitoring());
        assert_eq!(link.state(), LinkState::Connected);
        assert_eq!(link.last_address().as_deref(), Some("AA:BB"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_healthy_write_produces_no_error_events() {
        let connector = MockConnector::new();
        let link = manager(&connector);
        let mut events = link.subscribe();

        link.connect("AA:BB").await.unwrap();
        link.write(b"\x1b@hello\n").await.unwrap();
        link.write(b"world\n").await.unwrap();

        assert_eq!(connector.written(), b"\x1b@hello\nworld\n");
        let seen = drain(&mut events, Duration::from_secs(30)).await;
        assert_eq!(seen, vec![LinkEvent::Connected { mac: "AA:BB".into() }]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_failure_reports_io_and_reconnects() {
        let connector = MockConnector::new();
        let link = manager(&connector);
        let mut events = link.subscribe();
        link.connect("AA:BB").await.unwrap();
        next_event(&mut events).await;

        connector.fail_writes(true);
        let err = link.write(b"receipt").await.unwrap_err();
        assert_eq!(err.code(), "IO");

        match next_event(&mut events).await {
            LinkEvent::Error { message } => assert!(message.starts_with("IO:"), "{}", message),
            other => panic!("expected error event, got {:?}", other),
        }
        assert_eq!(next_event(&mut events).await, LinkEvent::Reconnecting { mac: "AA:BB".into() });
        assert_eq!(next_event(&mut events).await, LinkEvent::Reconnected { mac: "AA:BB".into() });
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_argument_and_not_connected() {
        let connector = MockConnector::new();
        let link = manager(&connector);

        let err = link.write(b"x").await.unwrap_err();
        assert!(matches!(err, LinkError::NotConnected));
        assert_eq!(err.code(), "IO");

        link.connect("AA:BB").await.unwrap();
        let err = link.write(&[]).await.unwrap_err();
        assert_eq!(err.code(), "ARG");
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_failure() {
        let connector = MockConnector::new();
        connector.refuse_next(1);
        let link = manager(&connector);
        let mut events = link.subscribe();

        let err = link.connect("AA:BB").await.unwrap_err();
        assert_eq!(err.code(), "CONNECT_FAILED");
        assert!(err.to_string().starts_with("connect failed"));

        assert!(matches!(next_event(&mut events).await, LinkEvent::Error { .. }));
        assert!(!link.is_connected().await);
        assert!(!link.is_monitoring());
        assert_eq!(link.state(), LinkState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_timeout() {
        let connector = MockConnector::new();
        connector.set_connect_delay(Duration::from_secs(60));
        let link = manager(&connector);

        let err = link.connect("AA:BB").await.unwrap_err();
        assert!(matches!(err, LinkError::ConnectFailed(ref reason) if reason.contains("timed out")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_rejects_empty_address() {
        let connector = MockConnector::new();
        let link = manager(&connector);
        let mut events = link.subscribe();

        let err = link.connect("   ").await.unwrap_err();
        assert_eq!(err.code(), "ARG");
        assert!(connector.connect_attempts().is_empty());
        assert!(drain(&mut events, Duration::from_secs(1)).await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_replaces_existing_connection() {
        let connector = MockConnector::new();
        let link = manager(&connector);

        link.connect("AA:BB").await.unwrap();
        link.connect("CC:DD").await.unwrap();

        assert_eq!(connector.connect_attempts(), vec!["AA:BB", "CC:DD"]);
        assert_eq!(connector.shutdowns(), 1);
        assert_eq!(link.last_address().as_deref(), Some("CC:DD"));
        assert_eq!(link.connected_address().await.as_deref(), Some("CC:DD"));
        assert!(link.is_connected().await);
        assert!(link.is_monitoring());
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_clears_link() {
        let connector = MockConnector::new();
        let link = manager(&connector);
        let mut events = link.subscribe();
        link.connect("AA:BB").await.unwrap();

        link.disconnect().await;

        assert!(!link.is_connected().await);
        assert!(link.last_address().is_none());
        assert!(!link.is_monitoring());
        assert_eq!(link.state(), LinkState::Disconnected);
        assert_eq!(connector.shutdowns(), 1);

        // Idempotent, still reports the teardown
        link.disconnect().await;
        let seen = drain(&mut events, Duration::from_secs(1)).await;
        assert_eq!(
            seen,
            vec![
                LinkEvent::Connected { mac: "AA:BB".into() },
                LinkEvent::Disconnected,
                LinkEvent::Disconnected,
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_during_backoff_stops_recovery() {
        let connector = MockConnector::new();
        let link = manager(&connector);
        let mut events = link.subscribe();
        link.connect("AA:BB").await.unwrap();

        connector.refuse_all(true);
        connector.kill_current();
        collect_until(&mut events, |e| {
            matches!(e, LinkEvent::ReconnectAttempt { attempt: 1, .. })
        })
        .await;

        link.disconnect().await;
        assert!(!link.is_connected().await);
        assert!(!link.is_reconnecting());
        let attempts = connector.connect_attempts().len();

        let after = collect_until(&mut events, |e| *e == LinkEvent::Disconnected).await;
        assert!(!after.iter().any(|e| matches!(e, LinkEvent::ReconnectAttempt { .. })));

        let later = drain(&mut events, Duration::from_secs(120)).await;
        assert!(later.is_empty(), "unexpected events: {:?}", later);
        assert_eq!(connector.connect_attempts().len(), attempts);
    }

    #[tokio::test(start_paused = true)]
    async fn test_trigger_after_disconnect_is_noop() {
        let connector = MockConnector::new();
        let link = manager(&connector);
        link.connect("AA:BB").await.unwrap();
        link.disconnect().await;

        link.trigger_reconnect();
        assert!(!link.is_reconnecting());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_refuses_new_connections() {
        let connector = MockConnector::new();
        let link = manager(&connector);
        let mut events = link.subscribe();
        link.connect("AA:BB").await.unwrap();

        link.shutdown().await;

        assert!(!link.is_monitoring());
        assert!(!link.is_connected().await);
        assert!(matches!(link.connect("AA:BB").await, Err(LinkError::ShutDown)));

        let mut seen = Vec::new();
        while let Some(event) = events.recv().await {
            seen.push(event);
        }
        assert_eq!(seen.last(), Some(&LinkEvent::Disconnected));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_last_handle_stops_workers() {
        let connector = MockConnector::new();
        let link = manager(&connector);
        let mut events = link.subscribe();
        link.connect("AA:BB").await.unwrap();

        let other = link.clone();
        drop(link);
        assert!(other.is_monitoring());
        drop(other);

        connector.kill_current();
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(connector.connect_attempts(), vec!["AA:BB"]);

        // Observer sink dropped with the last handle
        let mut seen = Vec::new();
        while let Some(event) = events.recv().await {
            seen.push(event);
        }
        assert_eq!(seen, vec![LinkEvent::Connected { mac: "AA:BB".into() }]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scan_delegates_to_transport() {
        let connector = MockConnector::new();
        let link = manager(&connector);

        let devices = link.scan().await.unwrap();
        assert_eq!(devices, vec![DeviceInfo::new(Some("Mock Printer".into()), "AA:BB")]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_replaces_dead_handle() {
        let connector = MockConnector::new();
        let link = manager(&connector);
        let mut events = link.subscribe();
        link.connect("AA:BB").await.unwrap();

        connector.kill_current();
        assert!(!link.is_connected().await);

        collect_until(&mut events, |e| matches!(e, LinkEvent::Reconnected { .. })).await;
        wait_until(|| !link.is_reconnecting()).await;

        assert!(link.is_connected().await);
        assert_eq!(link.state(), LinkState::Connected);
        // Dead stream closed when the new one was installed
        assert_eq!(connector.shutdowns(), 1);
    }
}
