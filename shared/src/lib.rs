//! SPP Link Shared Types
//!
//! This crate provides the event records, error taxonomy and link state
//! machine shared between the connection core and whatever layer exposes
//! it to callers.

pub mod error;
pub mod event;
pub mod state_machine;

pub use error::{LinkError, Result};
pub use event::{DeviceInfo, LinkEvent};
pub use state_machine::{LinkState, LinkStateMachine, LinkTrigger, TransitionResult};

/// Timing parameters for the link lifecycle
pub mod timing {
    /// Sleep between liveness probes of a healthy connection
    pub const MONITOR_INTERVAL_MS: u64 = 5000;

    /// Sleep after the monitor found the link missing, dead, or hit an error
    pub const MONITOR_RETRY_INTERVAL_MS: u64 = 3000;

    /// Base delay for reconnect backoff
    pub const RECONNECT_BASE_DELAY_MS: u64 = 1000;

    /// Upper bound for a single reconnect backoff wait
    pub const RECONNECT_MAX_DELAY_MS: u64 = 30000;

    /// Reconnect attempts per trigger before giving up
    pub const MAX_RECONNECT_ATTEMPTS: u32 = 6;

    /// Transport connect timeout
    pub const CONNECT_TIMEOUT_MS: u64 = 15000;

    /// Timeout for a single write + flush
    pub const WRITE_TIMEOUT_MS: u64 = 10000;

    /// Wait after failed reconnect attempt `attempt` (1-indexed):
    /// `min(max_ms, base_ms * 2^attempt)`.
    pub fn backoff_delay_ms(attempt: u32, base_ms: u64, max_ms: u64) -> u64 {
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        base_ms.saturating_mul(factor).min(max_ms)
    }
}
