//! Self-healing serial port profile link to a single peripheral.
//!
//! [`ConnectionManager`] owns one persistent connection over a pluggable
//! transport (RFCOMM, serial TTY or TCP), watches it with a liveness monitor
//! and restores it with bounded exponential backoff, reporting every
//! lifecycle change as a [`LinkEvent`].

pub mod connection;
pub mod transport;

pub use connection::{ConnectionManager, EventEmitter, LinkConfig};
pub use spp_link_shared::{timing, DeviceInfo, LinkError, LinkEvent, LinkState, Result};
pub use transport::{TransportConnector, TransportStream};
