//! Tool call state machine.
//!
//! Tracks one admitted execution of a physical action:
//! `Running -> Completed | Failed | Cancelled`. A call is created already
//! running (admission either produces a running call or an error), terminal
//! states are immutable, and progress is non-decreasing.
//!
//! # State Transitions
//!
//! ```text
//! Running ──> Completed
//!        ├──> Failed
//!        └──> Cancelled
//! ```

use serde::{Deserialize, Serialize};

/// Unique identifier for a tool call within a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallId(String);

impl CallId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CallId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<T: Into<String>> From<T> for CallId {
    fn from(s: T) -> Self {
        Self::new(s)
    }
}

/// Lifecycle state of a tool call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolState {
    /// The underlying action implementation is executing.
    Running,
    /// The implementation returned a result.
    Completed,
    /// The implementation raised a failure, or a gate rejected the call
    /// after admission (confirmation denied/timed out).
    Failed,
    /// Cancelled by request or by emergency stop.
    Cancelled,
}

impl ToolState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ToolState::Running)
    }

    pub fn as_str(&self) -> &str {
        match self {
            ToolState::Running => "running",
            ToolState::Completed => "completed",
            ToolState::Failed => "failed",
            ToolState::Cancelled => "cancelled",
        }
    }
}

/// One tracked execution of a physical action.
///
/// Mutated only through the transition methods below; every transition is a
/// no-op once the record is terminal, which makes racing cancellation paths
/// (explicit cancel vs. emergency stop) safe by construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallRecord {
    /// Unique ID for this call.
    pub call_id: CallId,
    /// Name of the tool being executed.
    pub tool_name: String,
    /// Parameters the call was admitted with (post-clamp, if any).
    pub params: serde_json::Value,
    /// Current lifecycle state.
    pub state: ToolState,
    /// Progress in [0, 1], non-decreasing.
    pub progress: f64,
    /// Latest progress message, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Result payload once completed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    /// Error detail once failed or cancelled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Creation timestamp, epoch milliseconds.
    pub created_at: u64,
    /// Terminal timestamp, epoch milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<u64>,
}

impl ToolCallRecord {
    /// Create a record entering Running on admission.
    pub fn new(call_id: CallId, tool_name: impl Into<String>, params: serde_json::Value) -> Self {
        Self {
            call_id,
            tool_name: tool_name.into(),
            params,
            state: ToolState::Running,
            progress: 0.0,
            message: None,
            result: None,
            error: None,
            created_at: current_timestamp(),
            finished_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Record a progress event.
    ///
    /// Values are clamped to [0, 1]. Returns `false` without mutating when
    /// the record is terminal or the value would move progress backwards.
    pub fn update_progress(&mut self, value: f64, message: Option<String>) -> bool {
        if self.is_terminal() {
            return false;
        }
        let value = value.clamp(0.0, 1.0);
        if value < self.progress {
            return false;
        }
        self.progress = value;
        if message.is_some() {
            self.message = message;
        }
        true
    }

    /// Transition Running -> Completed. No-op if terminal.
    pub fn mark_completed(&mut self, result: serde_json::Value) {
        if self.is_terminal() {
            return;
        }
        self.state = ToolState::Completed;
        self.progress = 1.0;
        self.result = Some(result);
        self.finished_at = Some(current_timestamp());
    }

    /// Transition Running -> Failed. No-op if terminal.
    pub fn mark_failed(&mut self, error: impl Into<String>) {
        if self.is_terminal() {
            return;
        }
        self.state = ToolState::Failed;
        self.error = Some(error.into());
        self.finished_at = Some(current_timestamp());
    }

    /// Transition Running -> Cancelled. No-op if terminal, so whichever of
    /// an explicit cancel and an emergency stop lands first is authoritative.
    pub fn mark_cancelled(&mut self, reason: impl Into<String>) {
        if self.is_terminal() {
            return;
        }
        self.state = ToolState::Cancelled;
        self.error = Some(reason.into());
        self.finished_at = Some(current_timestamp());
    }

    /// Wall-clock duration in seconds, available once terminal.
    pub fn duration_secs(&self) -> Option<f64> {
        self.finished_at
            .map(|end| end.saturating_sub(self.created_at) as f64 / 1000.0)
    }
}

/// Current timestamp in epoch milliseconds.
pub(crate) fn current_timestamp() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
