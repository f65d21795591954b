//! Session lifecycle state machine.
//!
//! ```text
//! Uninitialized ──> Initialized ──> ShuttingDown ──> Closed
//!              └──────────────────────────────────────┘
//! ```
//!
//! No tool, context, or constraint operation is accepted before
//! Initialized, and none after shutdown begins except the shutdown
//! handshake itself.

use serde::{Deserialize, Serialize};

/// Lifecycle state of a protocol session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Uninitialized,
    Initialized,
    ShuttingDown,
    Closed,
}

impl SessionState {
    /// Whether a transition to `next` is legal.
    pub fn can_transition_to(&self, next: SessionState) -> bool {
        matches!(
            (self, next),
            (SessionState::Uninitialized, SessionState::Initialized)
                | (SessionState::Uninitialized, SessionState::Closed)
                | (SessionState::Initialized, SessionState::ShuttingDown)
                | (SessionState::ShuttingDown, SessionState::Closed)
        )
    }

    /// Whether normal protocol operations (tools, context, constraints)
    /// are accepted in this state.
    pub fn accepts_operations(&self) -> bool {
        matches!(self, SessionState::Initialized)
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, SessionState::Closed)
    }

    pub fn as_str(&self) -> &str {
        match self {
            SessionState::Uninitialized => "uninitialized",
            SessionState::Initialized => "initialized",
            SessionState::ShuttingDown => "shutting_down",
            SessionState::Closed => "closed",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
