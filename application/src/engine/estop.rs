//! Emergency stop coordinator.
//!
//! A process-wide latch. Asserting it is idempotent and never fails; only
//! an explicit administrative clear resets it. The execution engine holds
//! its admission lock around both `assert` and every admission check, so
//! no call can slip in once the latch is set.

use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{info, warn};

/// Snapshot of the latch, reportable over the wire.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EstopStatus {
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Epoch milliseconds of the assertion.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub since: Option<u64>,
}

#[derive(Default)]
pub struct EmergencyStopCoordinator {
    state: Mutex<EstopStatus>,
}

impl EmergencyStopCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latch the stop. Returns `false` if it was already asserted; the
    /// original reason is kept in that case.
    pub fn assert_stop(&self, reason: impl Into<String>, source: Option<String>) -> bool {
        let mut state = self.state.lock().expect("estop lock poisoned");
        let reason = reason.into();
        if state.active {
            warn!(
                reason = %reason,
                "Emergency stop asserted while already active"
            );
            return false;
        }
        warn!(reason = %reason, source = ?source, "EMERGENCY STOP asserted");
        *state = EstopStatus {
            active: true,
            reason: Some(reason),
            source,
            since: Some(now_ms()),
        };
        true
    }

    /// Administrative clear. Returns `false` if the latch was not set.
    pub fn clear(&self) -> bool {
        let mut state = self.state.lock().expect("estop lock poisoned");
        if !state.active {
            return false;
        }
        info!(reason = ?state.reason, "Emergency stop cleared");
        *state = EstopStatus::default();
        true
    }

    pub fn is_active(&self) -> bool {
        self.state.lock().expect("estop lock poisoned").active
    }

    pub fn status(&self) -> EstopStatus {
        self.state.lock().expect("estop lock poisoned").clone()
    }

    /// Reason of the current assertion, if any.
    pub fn reason(&self) -> Option<String> {
        self.state
            .lock()
            .expect("estop lock poisoned")
            .reason
            .clone()
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
