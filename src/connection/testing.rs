//! Helpers for driving the link under a paused clock

use crate::connection::{ConnectionManager, LinkConfig};
use crate::transport::mock::MockConnector;
use spp_link_shared::LinkEvent;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::{sleep, timeout, timeout_at, Instant};

pub(crate) fn manager(connector: &MockConnector) -> ConnectionManager<MockConnector> {
    ConnectionManager::new(connector.clone(), LinkConfig::default())
}

/// Next event, letting the paused clock run ahead as far as needed
pub(crate) async fn next_event(events: &mut UnboundedReceiver<LinkEvent>) -> LinkEvent {
    timeout(Duration::from_secs(600), events.recv())
        .await
        .expect("timed out waiting for an event")
        .expect("event channel closed")
}

/// Events up to and including the first one matching `done`
pub(crate) async fn collect_until(
    events: &mut UnboundedReceiver<LinkEvent>,
    done: impl Fn(&LinkEvent) -> bool,
) -> Vec<LinkEvent> {
    let mut seen = Vec::new();
    loop {
        let event = next_event(events).await;
        let finished = done(&event);
        seen.push(event);
        if finished {
            return seen;
        }
    }
}

/// Everything that arrives within `window`
pub(crate) async fn drain(
    events: &mut UnboundedReceiver<LinkEvent>,
    window: Duration,
) -> Vec<LinkEvent> {
    let deadline = Instant::now() + window;
    let mut seen = Vec::new();
    while let Ok(Some(event)) = timeout_at(deadline, events.recv()).await {
        seen.push(event);
    }
    seen
}

pub(crate) async fn wait_until(condition: impl Fn() -> bool) {
    for _ in 0..1000 {
        if condition() {
            return;
        }
        sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached");
}
