//! Reconnect coordinator: bounded exponential-backoff recovery towards the
//! last known address

use crate::connection::manager::{close_quietly, ActiveFlag, Shared};
use crate::transport::TransportConnector;
use spp_link_shared::{LinkEvent, LinkTrigger};
use std::sync::Arc;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Reconnect loop; stops early when `token` is cancelled
pub(crate) async fn run<C: TransportConnector>(
    shared: Arc<Shared<C>>,
    address: String,
    token: CancellationToken,
) {
    let _active = ActiveFlag::new(&shared.reconnect_active);
    if token.is_cancelled() {
        return;
    }

    info!("[RECONNECT] Reconnecting to {}", address);
    shared.transition(LinkTrigger::ReconnectStarted);
    shared.events.emit(LinkEvent::Reconnecting {
        mac: address.clone(),
    });

    let config = &shared.config;
    for attempt in 1..=config.max_reconnect_attempts {
        let result = tokio::select! {
            _ = token.cancelled() => break,
            result = timeout(config.connect_timeout, shared.connector.connect(&address)) => result,
        };

        match result {
            Ok(Ok(stream)) => match shared.install(stream, &address, &token).await {
                Ok(()) => {
                    shared.transition(LinkTrigger::ReconnectSucceeded);
                    info!("[RECONNECT] Reconnected to {} on attempt {}", address, attempt);
                    shared.events.emit(LinkEvent::Reconnected {
                        mac: address.clone(),
                    });
                    shared.start_monitor(&token);
                    return;
                }
                Err(stream) => {
                    close_quietly(stream).await;
                    break;
                }
            },
            Ok(Err(e)) => debug!("[RECONNECT] Attempt {} failed: {}", attempt, e),
            Err(_) => debug!("[RECONNECT] Attempt {} timed out", attempt),
        }

        let wait = config.backoff_delay(attempt);
        warn!(
            "[RECONNECT] Attempt {}/{} to {} failed, waiting {:?}",
            attempt, config.max_reconnect_attempts, address, wait
        );
        shared.events.emit(LinkEvent::ReconnectAttempt {
            mac: address.clone(),
            attempt,
            wait_ms: wait.as_millis() as u64,
        });

        tokio::select! {
            _ = token.cancelled() => break,
            _ = sleep(wait) => {}
        }
    }

    // A cancelled loop leaves the link state to whoever cancelled it
    if token.is_cancelled() {
        info!("[RECONNECT] Recovery towards {} cancelled", address);
    } else {
        warn!("[RECONNECT] Giving up on {}", address);
        shared.transition(LinkTrigger::ReconnectExhausted);
    }
    shared.events.emit(LinkEvent::ReconnectFailed { mac: address });
}
