//! Confirmation domain entities
//!
//! A [`ConfirmationRequest`] gates one high-risk action on explicit human
//! approval. It resolves exactly once — confirm, deny, or timeout — and a
//! resolved request never changes again; late responses are ignored by the
//! workflow, not surfaced as errors.

use crate::tool::call::current_timestamp;
use crate::tool::entities::SafetyLevel;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Unique identifier for a confirmation request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConfirmationId(String);

impl ConfirmationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ConfirmationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How a confirmation request ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationResolution {
    /// Awaiting a response.
    Pending,
    /// The confirming party approved the action.
    Confirmed,
    /// The confirming party denied the action.
    Denied,
    /// The timeout elapsed with no response. Treated as a denial by the
    /// execution engine.
    TimedOut,
}

impl ConfirmationResolution {
    pub fn is_resolved(&self) -> bool {
        !matches!(self, ConfirmationResolution::Pending)
    }

    pub fn is_approved(&self) -> bool {
        matches!(self, ConfirmationResolution::Confirmed)
    }
}

/// One human-in-the-loop approval gate for a proposed action.
#[derive(Debug, Clone)]
pub struct ConfirmationRequest {
    pub id: ConfirmationId,
    /// Human-readable description of the gated action.
    pub action: String,
    pub safety_level: SafetyLevel,
    /// Arbitrary detail payload shown to the confirming party.
    pub details: serde_json::Value,
    /// How long to wait for a response before resolving TimedOut.
    pub timeout: Duration,
    resolution: ConfirmationResolution,
    /// Who resolved it, once resolved by a response.
    pub responded_by: Option<String>,
    /// Resolution timestamp, epoch milliseconds.
    pub resolved_at: Option<u64>,
    /// Creation timestamp, epoch milliseconds.
    pub created_at: u64,
}

impl ConfirmationRequest {
    pub fn new(
        id: ConfirmationId,
        action: impl Into<String>,
        safety_level: SafetyLevel,
        details: serde_json::Value,
        timeout: Duration,
    ) -> Self {
        Self {
            id,
            action: action.into(),
            safety_level,
            details,
            timeout,
            resolution: ConfirmationResolution::Pending,
            responded_by: None,
            resolved_at: None,
            created_at: current_timestamp(),
        }
    }

    pub fn resolution(&self) -> ConfirmationResolution {
        self.resolution
    }

    pub fn is_resolved(&self) -> bool {
        self.resolution.is_resolved()
    }

    /// Resolve the request. Returns `false` without mutating when already
    /// resolved — the first resolution is the only one.
    pub fn resolve(
        &mut self,
        resolution: ConfirmationResolution,
        responded_by: Option<String>,
    ) -> bool {
        if self.is_resolved() || !resolution.is_resolved() {
            return false;
        }
        self.resolution = resolution;
        self.responded_by = responded_by;
        self.resolved_at = Some(current_timestamp());
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn make_pending() -> ConfirmationRequest {
        ConfirmationRequest::new(
            ConfirmationId::new("confirm-1"),
            "Activate the cutter",
            SafetyLevel::Critical,
            json!({"tool": "activate_cutter"}),
            Duration::from_secs(30),
        )
    }

    #[test]
    fn test_new_is_pending() {
        let request = make_pending();
        assert_eq!(request.resolution(), ConfirmationResolution::Pending);
        assert!(!request.is_resolved());
        assert!(request.responded_by.is_none());
    }

    #[test]
    fn test_resolve_once() {
        let mut request = make_pending();
        assert!(request.resolve(
            ConfirmationResolution::Confirmed,
            Some("operator-1".to_string())
        ));
        assert!(request.is_resolved());
        assert_eq!(request.responded_by.as_deref(), Some("operator-1"));

        // A late denial is ignored
        assert!(!request.resolve(
            ConfirmationResolution::Denied,
            Some("operator-2".to_string())
        ));
        assert_eq!(request.resolution(), ConfirmationResolution::Confirmed);
        assert_eq!(request.responded_by.as_deref(), Some("operator-1"));
    }

    #[test]
    fn test_cannot_resolve_to_pending() {
        let mut request = make_pending();
        assert!(!request.resolve(ConfirmationResolution::Pending, None));
        assert!(!request.is_resolved());
    }

    #[test]
    fn test_timed_out_is_not_approved() {
        let mut request = make_pending();
        assert!(request.resolve(ConfirmationResolution::TimedOut, None));
        assert!(!request.resolution().is_approved());
        assert!(request.resolved_at.is_some());
    }

    #[test]
    fn test_resolution_serde() {
        assert_eq!(
            serde_json::to_value(ConfirmationResolution::TimedOut).unwrap(),
            json!("timed_out")
        );
    }
}
