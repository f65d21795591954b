//! Protocol error types
//!
//! Every failure the engine surfaces to a counterparty is a
//! [`ProtocolError`] carrying one of the stable [`ErrorCode`]s. External
//! callers branch on the numeric code, so codes never change meaning.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stable protocol error codes.
///
/// The `-32xxx` range follows JSON-RPC conventions for transport-level
/// failures; the `-40xxx` range is protocol-specific.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    /// Malformed message that could not be decoded.
    ParseError,
    /// Unknown method name.
    MethodNotFound,
    /// Params did not match the method's expected shape.
    InvalidParams,
    /// A safety constraint rejected the action.
    SafetyViolation,
    /// A declared tool precondition evaluated false.
    PreconditionFailed,
    /// No tool registered under the requested name.
    ToolNotFound,
    /// A non-reentrant tool already has a running call.
    ToolBusy,
    /// The confirmation window elapsed with no response.
    ConfirmationTimeout,
    /// The confirming party denied the action.
    ConfirmationDenied,
    /// Emergency stop is asserted; no new calls are admitted.
    EmergencyStopped,
    /// No context source registered under the requested name.
    ContextNotFound,
    /// Operation attempted outside the Initialized lifecycle state.
    NotInitialized,
}

impl ErrorCode {
    /// Numeric wire representation.
    pub fn as_i32(self) -> i32 {
        match self {
            ErrorCode::ParseError => -32700,
            ErrorCode::MethodNotFound => -32601,
            ErrorCode::InvalidParams => -32602,
            ErrorCode::SafetyViolation => -40001,
            ErrorCode::PreconditionFailed => -40002,
            ErrorCode::ToolNotFound => -40003,
            ErrorCode::ToolBusy => -40004,
            ErrorCode::ConfirmationTimeout => -40005,
            ErrorCode::ConfirmationDenied => -40006,
            ErrorCode::EmergencyStopped => -40007,
            ErrorCode::ContextNotFound => -40008,
            ErrorCode::NotInitialized => -40009,
        }
    }

    /// Reverse lookup from a wire code, for inbound error objects.
    pub fn from_i32(code: i32) -> Option<Self> {
        match code {
            -32700 => Some(ErrorCode::ParseError),
            -32601 => Some(ErrorCode::MethodNotFound),
            -32602 => Some(ErrorCode::InvalidParams),
            -40001 => Some(ErrorCode::SafetyViolation),
            -40002 => Some(ErrorCode::PreconditionFailed),
            -40003 => Some(ErrorCode::ToolNotFound),
            -40004 => Some(ErrorCode::ToolBusy),
            -40005 => Some(ErrorCode::ConfirmationTimeout),
            -40006 => Some(ErrorCode::ConfirmationDenied),
            -40007 => Some(ErrorCode::EmergencyStopped),
            -40008 => Some(ErrorCode::ContextNotFound),
            -40009 => Some(ErrorCode::NotInitialized),
            _ => None,
        }
    }

    /// Whether the caller may retry the same request later without changes
    /// on their side beyond waiting.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ErrorCode::ToolBusy | ErrorCode::PreconditionFailed
        )
    }
}

/// A typed protocol failure bound to a specific request or call.
///
/// Failures never cross call boundaries: one call's error is returned on
/// that call alone. The single intentional exception, emergency stop, is
/// coordinated by the engine rather than by error propagation.
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
#[error("[{}] {message}", code.as_i32())]
pub struct ProtocolError {
    /// Stable error code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
    /// Structured detail payload (offending values, constraint name, ...).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ProtocolError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    // Common constructors

    pub fn tool_not_found(name: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::ToolNotFound,
            format!("Tool not found: {}", name.into()),
        )
    }

    pub fn tool_busy(name: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::ToolBusy,
            format!("Tool busy: {}", name.into()),
        )
    }

    pub fn context_not_found(name: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::ContextNotFound,
            format!("Context source not found: {}", name.into()),
        )
    }

    pub fn not_initialized() -> Self {
        Self::new(ErrorCode::NotInitialized, "Not initialized")
    }

    pub fn emergency_stopped(reason: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::EmergencyStopped,
            format!("Emergency stop active: {}", reason.into()),
        )
    }

    pub fn method_not_found(method: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::MethodNotFound,
            format!("Method not found: {}", method.into()),
        )
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidParams, message)
    }

    pub fn safety_violation(constraint: impl Into<String>, reason: impl Into<String>) -> Self {
        let constraint = constraint.into();
        Self::new(
            ErrorCode::SafetyViolation,
            format!("Safety violation: {}", reason.into()),
        )
        .with_data(serde_json::json!({ "constraint": constraint }))
    }

    pub fn precondition_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::PreconditionFailed, message)
    }

    pub fn confirmation_timeout() -> Self {
        Self::new(ErrorCode::ConfirmationTimeout, "Confirmation timeout")
    }

    pub fn confirmation_denied() -> Self {
        Self::new(ErrorCode::ConfirmationDenied, "Confirmation denied")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_round_trip() {
        for code in [
            ErrorCode::ParseError,
            ErrorCode::MethodNotFound,
            ErrorCode::InvalidParams,
            ErrorCode::SafetyViolation,
            ErrorCode::PreconditionFailed,
            ErrorCode::ToolNotFound,
            ErrorCode::ToolBusy,
            ErrorCode::ConfirmationTimeout,
            ErrorCode::ConfirmationDenied,
            ErrorCode::EmergencyStopped,
            ErrorCode::ContextNotFound,
            ErrorCode::NotInitialized,
        ] {
            assert_eq!(ErrorCode::from_i32(code.as_i32()), Some(code));
        }
        assert_eq!(ErrorCode::from_i32(0), None);
    }

    #[test]
    fn test_retryable_codes() {
        assert!(ErrorCode::ToolBusy.is_retryable());
        assert!(ErrorCode::PreconditionFailed.is_retryable());
        assert!(!ErrorCode::SafetyViolation.is_retryable());
        assert!(!ErrorCode::ConfirmationDenied.is_retryable());
    }

    #[test]
    fn test_safety_violation_carries_constraint() {
        let err = ProtocolError::safety_violation("workspace_limits", "target outside bounds");
        assert_eq!(err.code, ErrorCode::SafetyViolation);
        assert_eq!(
            err.data.unwrap()["constraint"],
            serde_json::json!("workspace_limits")
        );
    }

    #[test]
    fn test_display_includes_numeric_code() {
        let err = ProtocolError::not_initialized();
        assert_eq!(err.to_string(), "[-40009] Not initialized");
    }
}
