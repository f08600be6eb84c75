//! Liveness monitor
//!
//! Periodically probes the installed connection and starts recovery when the
//! link is missing, dead or fails a probe. A panic inside one check is
//! reported as an `error` event and the loop carries on.

use crate::connection::manager::{ActiveFlag, Shared};
use crate::transport::{TransportConnector, TransportStream};
use futures::FutureExt;
use spp_link_shared::LinkEvent;
use std::any::Any;
use std::io;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

enum Health {
    Healthy,
    /// No connection installed, or the transport reports it dead
    Missing,
    ProbeFailed(io::Error),
}

/// Monitor loop; exits when `token` is cancelled
pub(crate) async fn run<C: TransportConnector>(shared: Arc<Shared<C>>, token: CancellationToken) {
    let _active = ActiveFlag::new(&shared.monitor_active);
    info!("[MONITOR] Liveness monitor started");

    loop {
        let outcome = tokio::select! {
            _ = token.cancelled() => break,
            outcome = AssertUnwindSafe(check(&shared)).catch_unwind() => outcome,
        };

        let pause = match outcome {
            Ok(Health::Healthy) => shared.config.monitor_interval,
            Ok(Health::Missing) => {
                debug!("[MONITOR] Link missing or dead");
                shared.trigger_reconnect(&token);
                shared.config.monitor_retry_interval
            }
            Ok(Health::ProbeFailed(e)) => {
                warn!("[MONITOR] Probe failed: {}", e);
                shared
                    .events
                    .emit(LinkEvent::error(format!("Socket flush failed: {}", e)));
                shared.trigger_reconnect(&token);
                shared.config.monitor_interval
            }
            Err(panic) => {
                let message = panic_message(&*panic);
                error!("[MONITOR] Check panicked: {}", message);
                shared
                    .events
                    .emit(LinkEvent::error(format!("Monitor error: {}", message)));
                shared.config.monitor_retry_interval
            }
        };

        if !pause_or_cancel(&token, pause).await {
            break;
        }
    }

    info!("[MONITOR] Liveness monitor stopped");
}

async fn check<C: TransportConnector>(shared: &Shared<C>) -> Health {
    let mut link = shared.link.lock().await;
    match link.stream.as_mut() {
        // A half-dead link can stall a flush indefinitely; bound it so the
        // lock is released and recovery starts
        Some(stream) if stream.is_alive() => {
            match timeout(shared.config.write_timeout, stream.probe()).await {
                Ok(Ok(())) => Health::Healthy,
                Ok(Err(e)) => Health::ProbeFailed(e),
                Err(_) => Health::ProbeFailed(io::Error::new(
                    io::ErrorKind::TimedOut,
                    "probe timed out",
                )),
            }
        }
        _ => Health::Missing,
    }
}

/// Sleep for `pause`; false if cancelled first
async fn pause_or_cancel(token: &CancellationToken, pause: Duration) -> bool {
    tokio::select! {
        _ = token.cancelled() => false,
        _ = sleep(pause) => true,
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
