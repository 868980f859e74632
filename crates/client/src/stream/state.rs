//! Connection state machine.
//!
//! ```text
//!            Connect            Opened
//!   Closed ──────────► Connecting ──────► Open
//!                        ▲    │ Failed      │ Failed
//!                  Retry │    ▼             │
//!                        └─ Backoff ◄───────┘
//!
//!   Close: any state ──► Closed
//! ```

use jobsync_core::EventId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Closed,
    Connecting,
    Open,
    Backoff,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transition {
    Connect,
    Opened,
    Failed,
    Retry,
    Close,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid stream transition {transition:?} from {from:?}")]
pub struct InvalidTransition {
    pub from: ConnectionState,
    pub transition: Transition,
}

impl ConnectionState {
    pub fn apply(self, transition: Transition) -> Result<ConnectionState, InvalidTransition> {
        use ConnectionState::*;
        use Transition::*;

        match (self, transition) {
            (Closed, Connect) => Ok(Connecting),
            (Connecting, Opened) => Ok(Open),
            (Connecting, Failed) | (Open, Failed) => Ok(Backoff),
            (Backoff, Retry) => Ok(Connecting),
            (_, Close) => Ok(Closed),
            (from, transition) => Err(InvalidTransition { from, transition }),
        }
    }
}

/// Passive view of a connection, published on every transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionStatus {
    pub state: ConnectionState,
    /// Consecutive failed attempts since the last successful open.
    pub attempt_count: u32,
    /// Id of the last event this connection processed.
    pub last_event_id: Option<EventId>,
}

impl ConnectionStatus {
    pub fn closed(last_event_id: Option<EventId>) -> Self {
        Self {
            state: ConnectionState::Closed,
            attempt_count: 0,
            last_event_id,
        }
    }

    pub fn is_open(&self) -> bool {
        self.state == ConnectionState::Open
    }
}
