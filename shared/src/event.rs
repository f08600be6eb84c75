//! Lifecycle event records delivered to the link observer
//!
//! Events serialise as flat tagged records:
//! ```text
//! {"event": "reconnect_attempt", "mac": "AA:BB", "attempt": 1, "waitMs": 2000}
//! ```

use serde::{Deserialize, Serialize};

/// Lifecycle events emitted by the connection core
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LinkEvent {
    /// An explicit connect succeeded
    Connected { mac: String },
    /// The link was torn down on request
    Disconnected,
    /// A failure was detected (connect, write, probe or monitor)
    Error { message: String },
    /// Automatic recovery started for `mac`
    Reconnecting { mac: String },
    /// Reconnect attempt `attempt` failed; next attempt after `wait_ms`
    ReconnectAttempt {
        mac: String,
        attempt: u32,
        #[serde(rename = "waitMs")]
        wait_ms: u64,
    },
    /// Automatic recovery re-established the link
    Reconnected { mac: String },
    /// Automatic recovery gave up
    ReconnectFailed { mac: String },
}

impl LinkEvent {
    pub fn error(message: impl Into<String>) -> Self {
        LinkEvent::Error {
            message: message.into(),
        }
    }

    /// The record's `event` tag
    pub fn name(&self) -> &'static str {
        match self {
            LinkEvent::Connected { .. } => "connected",
            LinkEvent::Disconnected => "disconnected",
            LinkEvent::Error { .. } => "error",
            LinkEvent::Reconnecting { .. } => "reconnecting",
            LinkEvent::ReconnectAttempt { .. } => "reconnect_attempt",
            LinkEvent::Reconnected { .. } => "reconnected",
            LinkEvent::ReconnectFailed { .. } => "reconnect_failed",
        }
    }

    /// Address the event refers to, if any
    pub fn mac(&self) -> Option<&str> {
        match self {
            LinkEvent::Connected { mac }
            | LinkEvent::Reconnecting { mac }
            | LinkEvent::ReconnectAttempt { mac, .. }
            | LinkEvent::Reconnected { mac }
            | LinkEvent::ReconnectFailed { mac } => Some(mac),
            LinkEvent::Disconnected | LinkEvent::Error { .. } => None,
        }
    }

    /// Render as a JSON record
    pub fn to_json(&self) -> serde_json::Value {
        // Every variant is a plain struct of strings and integers
        serde_json::to_value(self).unwrap_or_else(|_| serde_json::json!({ "event": self.name() }))
    }
}

/// A peripheral reported by device enumeration
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub name: String,
    pub address: String,
}

impl DeviceInfo {
    /// Create a device record, naming unnamed devices "Unknown"
    pub fn new(name: Option<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.unwrap_or_else(|| "Unknown".into()),
            address: address.into(),
        }
    }
}
