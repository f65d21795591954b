//! Protocol methods: names and typed params/results.
//!
//! Wire field names are camelCase throughout, matching the protocol's
//! JSON surface.

use crate::confirmation::entities::ConfirmationId;
use crate::context::entities::{ContextSource, SubscriptionId};
use crate::core::geometry::{BoundingBox, Pose};
use crate::safety::constraint::SafetyConstraint;
use crate::tool::call::{CallId, ToolState};
use crate::tool::entities::{SafetyLevel, ToolDefinition};
use serde::{Deserialize, Serialize};

/// Protocol version negotiated at initialize.
pub const PROTOCOL_VERSION: &str = "0.1.0";

/// Method and notification names.
pub mod names {
    pub const INITIALIZE: &str = "arp.initialize";
    pub const SHUTDOWN: &str = "arp.shutdown";
    pub const LIST_TOOLS: &str = "arp.listTools";
    pub const CALL_TOOL: &str = "arp.callTool";
    pub const CANCEL_TOOL: &str = "arp.cancelTool";
    pub const LIST_CONTEXT: &str = "arp.listContext";
    pub const SUBSCRIBE_CONTEXT: &str = "arp.subscribeContext";
    pub const UNSUBSCRIBE_CONTEXT: &str = "arp.unsubscribeContext";
    pub const LIST_CONSTRAINTS: &str = "arp.listConstraints";
    pub const GET_CONSTRAINT: &str = "arp.getConstraint";
    pub const SET_WORKSPACE: &str = "arp.setWorkspace";

    // Notifications (either direction)
    pub const EMERGENCY_STOP: &str = "arp.emergencyStop";
    pub const EMERGENCY_CLEAR: &str = "arp.emergencyClear";
    pub const TOOL_PROGRESS: &str = "arp.toolProgress";
    pub const TOOL_RESULT: &str = "arp.toolResult";
    pub const CONTEXT_UPDATE: &str = "arp.contextUpdate";

    // Server-initiated requests
    pub const REQUEST_CONFIRMATION: &str = "arp.requestConfirmation";
    pub const REQUEST_PLAN: &str = "arp.requestPlan";
}

// --- Handshake ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientInfo {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub robot_model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub robot_type: Option<String>,
}

/// Feature flags negotiated at initialize: the effective capability set is
/// the intersection of what both parties support.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Capabilities {
    #[serde(default = "default_true")]
    pub tools: bool,
    #[serde(default = "default_true")]
    pub context: bool,
    #[serde(default = "default_true")]
    pub constraints: bool,
    #[serde(default)]
    pub planning: bool,
    #[serde(default)]
    pub confirmation: bool,
}

fn default_true() -> bool {
    true
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            tools: true,
            context: true,
            constraints: true,
            planning: false,
            confirmation: false,
        }
    }
}

impl Capabilities {
    pub fn intersect(&self, other: &Capabilities) -> Capabilities {
        Capabilities {
            tools: self.tools && other.tools,
            context: self.context && other.context,
            constraints: self.constraints && other.constraints,
            planning: self.planning && other.planning,
            confirmation: self.confirmation && other.confirmation,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    pub protocol_version: String,
    pub client_info: ClientInfo,
    #[serde(default)]
    pub capabilities: Capabilities,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    pub protocol_version: String,
    pub server_info: ServerInfo,
    pub capabilities: Capabilities,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShutdownResult {
    pub status: String,
}

// --- Tools ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListToolsResult {
    pub tools: Vec<ToolDefinition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallToolParams {
    pub name: String,
    #[serde(default)]
    pub arguments: serde_json::Value,
    /// Caller-supplied call id; the engine generates one when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_id: Option<CallId>,
}

/// Acknowledgement of admission; the terminal outcome follows as an
/// `arp.toolResult` notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallToolAck {
    pub call_id: CallId,
    pub state: ToolState,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelToolParams {
    pub call_id: CallId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolProgressParams {
    pub call_id: CallId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
    #[serde(default)]
    pub message: String,
    pub state: ToolState,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResultParams {
    pub call_id: CallId,
    pub state: ToolState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Wall-clock duration in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
}

// --- Context ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListContextResult {
    pub sources: Vec<ContextSource>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeContextParams {
    /// Source name.
    pub source: String,
    /// Maximum delivery rate in Hz; defaults to the source's nominal rate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_rate: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeContextResult {
    pub subscription_id: SubscriptionId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnsubscribeContextParams {
    pub subscription_id: SubscriptionId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextUpdateParams {
    pub source: String,
    /// ISO-8601 UTC timestamp of the sample.
    pub timestamp: String,
    pub data: serde_json::Value,
}

// --- Constraints & workspace ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListConstraintsResult {
    pub constraints: Vec<SafetyConstraint>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetConstraintParams {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceObject {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pose: Option<Pose>,
    #[serde(rename = "type", default = "default_object_type")]
    pub object_type: String,
}

fn default_object_type() -> String {
    "static".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetWorkspaceParams {
    pub name: String,
    pub bounds: BoundingBox,
    #[serde(default)]
    pub objects: Vec<WorkspaceObject>,
}

// --- Emergency stop ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmergencyStopParams {
    pub reason: String,
    /// Who asserted the stop (client, server, or a constraint name).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

// --- Confirmation ---

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestConfirmationParams {
    pub confirmation_id: ConfirmationId,
    pub action: String,
    pub safety_level: SafetyLevel,
    #[serde(default)]
    pub details: serde_json::Value,
    /// Seconds before the request resolves timed out.
    pub timeout: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmationResponseParams {
    pub confirmation_id: ConfirmationId,
    pub confirmed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub responded_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

// --- Planning ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanStep {
    pub tool: String,
    #[serde(default)]
    pub params: serde_json::Value,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestPlanParams {
    pub goal: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_state: Option<serde_json::Value>,
    pub available_tools: Vec<String>,
    #[serde(default)]
    pub constraints: Vec<SafetyConstraint>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanResult {
    pub steps: Vec<PlanStep>,
    #[serde(default)]
    pub reasoning: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_capabilities_intersect() {
        let server = Capabilities {
            tools: true,
            context: true,
            constraints: true,
            planning: false,
            confirmation: true,
        };
        let client = Capabilities {
            tools: true,
            context: false,
            constraints: true,
            planning: true,
            confirmation: true,
        };
        let negotiated = server.intersect(&client);
        assert!(negotiated.tools);
        assert!(!negotiated.context);
        assert!(!negotiated.planning);
        assert!(negotiated.confirmation);
    }

    #[test]
    fn test_initialize_params_wire_names() {
        let params: InitializeParams = serde_json::from_value(json!({
            "protocolVersion": "0.1.0",
            "clientInfo": {"name": "agent", "version": "1.0.0"},
            "capabilities": {"planning": true, "confirmation": true}
        }))
        .unwrap();
        assert_eq!(params.protocol_version, PROTOCOL_VERSION);
        assert_eq!(params.client_info.name, "agent");
        assert!(params.capabilities.planning);
        // Omitted flags default on
        assert!(params.capabilities.tools);
    }

    #[test]
    fn test_call_tool_params_optional_call_id() {
        let params: CallToolParams = serde_json::from_value(json!({
            "name": "move_to",
            "arguments": {"target": [1.0, 0.0, 0.0]}
        }))
        .unwrap();
        assert!(params.call_id.is_none());

        let with_id: CallToolParams = serde_json::from_value(json!({
            "name": "move_to",
            "callId": "my-call"
        }))
        .unwrap();
        assert_eq!(with_id.call_id.unwrap().as_str(), "my-call");
    }

    #[test]
    fn test_tool_result_wire_shape() {
        let params = ToolResultParams {
            call_id: CallId::new("call-1"),
            state: ToolState::Completed,
            result: Some(json!({"reached": [1, 0, 0]})),
            error: None,
            duration: Some(0.25),
        };
        let wire = serde_json::to_value(&params).unwrap();
        assert_eq!(wire["callId"], json!("call-1"));
        assert_eq!(wire["state"], json!("completed"));
        assert!(wire.get("error").is_none());
    }

    #[test]
    fn test_confirmation_request_wire_shape() {
        let params = RequestConfirmationParams {
            confirmation_id: ConfirmationId::new("confirm-1"),
            action: "Activate the cutter".to_string(),
            safety_level: SafetyLevel::Critical,
            details: json!({}),
            timeout: 30.0,
        };
        let wire = serde_json::to_value(&params).unwrap();
        assert_eq!(wire["confirmationId"], json!("confirm-1"));
        assert_eq!(wire["safetyLevel"], json!("critical"));
    }
}
