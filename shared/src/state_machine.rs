//! Link State Machine
//!
//! Defines the lifecycle states of the single managed link and the valid
//! transitions between them.

use serde::Serialize;

/// Lifecycle state of the managed link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkState {
    /// No connection and no recovery in progress
    #[default]
    Disconnected,
    /// Explicit connect in flight
    Connecting,
    /// A connection handle is installed
    Connected,
    /// The reconnect coordinator is attempting recovery
    Reconnecting,
}

/// Triggers that drive state transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkTrigger {
    /// Caller asked for a connection
    ConnectRequested,
    /// Explicit connect established the transport
    ConnectSucceeded,
    /// Explicit connect failed or timed out
    ConnectFailed,
    /// Reconnect coordinator started a recovery run
    ReconnectStarted,
    /// Recovery installed a fresh connection
    ReconnectSucceeded,
    /// Recovery ran out of attempts or was cancelled
    ReconnectExhausted,
    /// Caller asked for the link to be torn down
    DisconnectRequested,
}

/// Result of a state transition attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionResult {
    /// Transition was valid; the machine is now in this state
    Success(LinkState),
    /// Trigger is not valid from the current state; nothing changed
    Invalid { from: LinkState, trigger: LinkTrigger },
}

/// State machine for the managed link
#[derive(Debug, Default)]
pub struct LinkStateMachine {
    current_state: LinkState,
}

impl LinkStateMachine {
    /// Create a new state machine in Disconnected state
    pub fn new() -> Self {
        Self::default()
    }

    /// Get current state
    pub fn state(&self) -> LinkState {
        self.current_state
    }

    /// Process a trigger and return the transition result
    pub fn process(&mut self, trigger: LinkTrigger) -> TransitionResult {
        match self.next_state(trigger) {
            Some(state) => {
                debug_assert!(is_valid_transition(self.current_state, state));
                self.current_state = state;
                TransitionResult::Success(state)
            }
            None => TransitionResult::Invalid {
                from: self.current_state,
                trigger,
            },
        }
    }

    fn next_state(&self, trigger: LinkTrigger) -> Option<LinkState> {
        use LinkState::*;
        use LinkTrigger::*;

        match (self.current_state, trigger) {
            // Teardown is always allowed and idempotent
            (_, DisconnectRequested) => Some(Disconnected),

            // A new explicit connect supersedes whatever is going on
            (_, ConnectRequested) => Some(Connecting),

            (Connecting, ConnectSucceeded) => Some(Connected),
            (Connecting, ConnectFailed) => Some(Disconnected),

            // Recovery can start from a lost link or after a failed connect
            (Connected | Disconnected | Connecting, ReconnectStarted) => Some(Reconnecting),

            (Reconnecting, ReconnectSucceeded) => Some(Connected),
            (Reconnecting, ReconnectExhausted) => Some(Disconnected),

            _ => None,
        }
    }
}

/// Check if a transition from one state to another is generally valid
pub fn is_valid_transition(from: LinkState, to: LinkState) -> bool {
    use LinkState::*;

    match (from, to) {
        (a, b) if a == b => true,

        (_, Disconnected) => true,
        (_, Connecting) => true,

        (Connecting, Connected) => true,
        (Reconnecting, Connected) => true,
        (Connected | Disconnected | Connecting, Reconnecting) => true,

        _ => false,
    }
}
