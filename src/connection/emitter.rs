//! Delivery of link events to the single registered observer

use spp_link_shared::LinkEvent;
use std::sync::{PoisonError, RwLock};
use tokio::sync::mpsc;
use tracing::debug;

/// Fans link events out to at most one observer.
///
/// Emitting never blocks and never fails: with no observer, or with a
/// receiver that has gone away, the event is dropped.
pub struct EventEmitter {
    sink: RwLock<Option<mpsc::UnboundedSender<LinkEvent>>>,
}

impl EventEmitter {
    pub fn new() -> Self {
        Self {
            sink: RwLock::new(None),
        }
    }

    /// Register a new observer, replacing the previous one
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<LinkEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.sink.write().unwrap_or_else(PoisonError::into_inner) = Some(tx);
        rx
    }

    pub fn unsubscribe(&self) {
        *self.sink.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    #[cfg(test)]
    fn has_observer(&self) -> bool {
        self.sink
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|tx| !tx.is_closed())
    }

    pub fn emit(&self, event: LinkEvent) {
        debug!("[LINK] Event {}: {:?}", event.name(), event);

        let closed = {
            let sink = self.sink.read().unwrap_or_else(PoisonError::into_inner);
            match sink.as_ref() {
                Some(tx) => tx.send(event).is_err(),
                None => false,
            }
        };

        if closed {
            // Only clear if a new observer has not taken its place meanwhile
            let mut sink = self.sink.write().unwrap_or_else(PoisonError::into_inner);
            if sink.as_ref().is_some_and(|tx| tx.is_closed()) {
                debug!("[LINK] Observer gone, dropping sink");
                *sink = None;
            }
        }
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new()
    }
}
