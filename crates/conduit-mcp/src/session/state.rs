//! Session State Machine
//!
//! Lifecycle of one session:
//!
//! ```text
//! Created ──initialize──▶ Initializing ──initialized──▶ Ready
//!    │                         │                          │
//!    └───────────close / transport failure────────────────┘
//!                              │
//!                           Closing ──dispatcher drained──▶ Closed
//! ```
//!
//! Transitions are linearized under one mutex; every observer sees a
//! consistent ordering. Before `Ready`, only `initialize` and `ping`
//! may be dispatched.

// Layer 1: Standard library imports
use std::fmt;
use std::sync::Mutex;

// Layer 2: Third-party crate imports
use tracing::debug;

// Layer 3: Internal module imports
use crate::protocol::constants::methods;

/// The lifecycle states of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No initialize seen yet
    Created,
    /// Initialize handled; waiting for `notifications/initialized`
    Initializing,
    /// Fully operational
    Ready,
    /// Tearing down; rejecting new work, draining handlers
    Closing,
    /// Dispatch drained and transport disposed
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Created => "created",
            SessionState::Initializing => "initializing",
            SessionState::Ready => "ready",
            SessionState::Closing => "closing",
            SessionState::Closed => "closed",
        };
        write!(f, "{name}")
    }
}

/// Verdict for an inbound request under the current state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchDecision {
    /// Dispatch the handler now
    Dispatch,
    /// Hold until the handshake completes
    Queue,
    /// Reject with InvalidRequest
    Reject,
}

/// Linearizable session state holder
#[derive(Debug)]
pub struct StateMachine {
    state: Mutex<SessionState>,
}

impl StateMachine {
    /// Create a machine in `Created`
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SessionState::Created),
        }
    }

    /// Current state
    pub fn current(&self) -> SessionState {
        *self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Created → Initializing, on the first inbound `initialize`
    ///
    /// Returns `false` if the session already left `Created`; a second
    /// `initialize` is an invalid request.
    pub fn begin_initializing(&self) -> bool {
        self.transition(|state| match state {
            SessionState::Created => Some(SessionState::Initializing),
            _ => None,
        })
    }

    /// Initializing (or Created, on the client side) → Ready
    pub fn mark_ready(&self) -> bool {
        self.transition(|state| match state {
            SessionState::Created | SessionState::Initializing => Some(SessionState::Ready),
            _ => None,
        })
    }

    /// Any live state → Closing; returns the state left behind
    pub fn begin_closing(&self) -> Option<SessionState> {
        let mut guard = self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match *guard {
            SessionState::Closing | SessionState::Closed => None,
            previous => {
                *guard = SessionState::Closing;
                debug!(from = %previous, "session closing");
                Some(previous)
            }
        }
    }

    /// Closing → Closed, once the dispatcher has drained
    pub fn mark_closed(&self) -> bool {
        self.transition(|state| match state {
            SessionState::Closing => Some(SessionState::Closed),
            _ => None,
        })
    }

    /// Decide what to do with an inbound request method right now
    ///
    /// `initialize` and `ping` are the only methods admitted before
    /// `Ready`; everything else queues during the handshake and is
    /// rejected outside it.
    pub fn admit(&self, method: &str) -> DispatchDecision {
        let state = self.current();
        match state {
            SessionState::Ready => DispatchDecision::Dispatch,
            SessionState::Created => match method {
                methods::INITIALIZE | methods::PING => DispatchDecision::Dispatch,
                _ => DispatchDecision::Reject,
            },
            SessionState::Initializing => match method {
                methods::PING => DispatchDecision::Dispatch,
                // A second initialize is a protocol violation.
                methods::INITIALIZE => DispatchDecision::Reject,
                _ => DispatchDecision::Queue,
            },
            SessionState::Closing | SessionState::Closed => DispatchDecision::Reject,
        }
    }

    fn transition(
        &self,
        decide: impl FnOnce(SessionState) -> Option<SessionState>,
    ) -> bool {
        let mut guard = self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match decide(*guard) {
            Some(next) => {
                debug!(from = %*guard, to = %next, "session state transition");
                *guard = next;
                true
            }
            None => false,
        }
    }
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}
