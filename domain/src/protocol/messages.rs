//! JSON-RPC 2.0 message envelopes.
//!
//! The actual frame encoding lives behind the codec boundary; the engine
//! consumes and produces these structured forms.

use crate::core::error::ProtocolError;
use serde::{Deserialize, Serialize};

/// Request/response correlation id: integer or string, per JSON-RPC.
/// `Null` appears only in error responses to unparseable requests.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(i64),
    String(String),
    Null,
}

impl From<i64> for RequestId {
    fn from(n: i64) -> Self {
        RequestId::Number(n)
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        RequestId::String(s.to_string())
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestId::Number(n) => write!(f, "{}", n),
            RequestId::String(s) => write!(f, "{}", s),
            RequestId::Null => write!(f, "null"),
        }
    }
}

fn jsonrpc_version() -> String {
    "2.0".to_string()
}

/// A request expecting a correlated response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    #[serde(default = "jsonrpc_version")]
    pub jsonrpc: String,
    pub id: RequestId,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

impl Request {
    pub fn new(id: impl Into<RequestId>, method: impl Into<String>, params: serde_json::Value) -> Self {
        Self {
            jsonrpc: jsonrpc_version(),
            id: id.into(),
            method: method.into(),
            params,
        }
    }
}

/// A one-way message with no response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    #[serde(default = "jsonrpc_version")]
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

impl Notification {
    pub fn new(method: impl Into<String>, params: serde_json::Value) -> Self {
        Self {
            jsonrpc: jsonrpc_version(),
            method: method.into(),
            params,
        }
    }
}

/// Wire error object carried in a failed response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorObject {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl From<ProtocolError> for ErrorObject {
    fn from(err: ProtocolError) -> Self {
        Self {
            code: err.code.as_i32(),
            message: err.message,
            data: err.data,
        }
    }
}

/// A response correlated to a request by id. Exactly one of `result` and
/// `error` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    #[serde(default = "jsonrpc_version")]
    pub jsonrpc: String,
    pub id: RequestId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorObject>,
}

impl Response {
    pub fn success(id: RequestId, result: serde_json::Value) -> Self {
        Self {
            jsonrpc: jsonrpc_version(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: RequestId, error: ProtocolError) -> Self {
        Self {
            jsonrpc: jsonrpc_version(),
            id,
            result: None,
            error: Some(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Any outbound frame the engine can emit through the codec boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OutboundMessage {
    Request(Request),
    Response(Response),
    Notification(Notification),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ProtocolError;
    use serde_json::json;

    #[test]
    fn test_request_id_untagged() {
        let n: RequestId = serde_json::from_value(json!(7)).unwrap();
        assert_eq!(n, RequestId::Number(7));
        let s: RequestId = serde_json::from_value(json!("abc")).unwrap();
        assert_eq!(s, RequestId::String("abc".to_string()));
    }

    #[test]
    fn test_request_defaults() {
        let request: Request =
            serde_json::from_value(json!({"id": 1, "method": "arp.listTools"})).unwrap();
        assert_eq!(request.jsonrpc, "2.0");
        assert!(request.params.is_null());
    }

    #[test]
    fn test_response_success_shape() {
        let response = Response::success(RequestId::Number(1), json!({"ok": true}));
        let wire = serde_json::to_value(&response).unwrap();
        assert_eq!(wire["jsonrpc"], json!("2.0"));
        assert_eq!(wire["result"]["ok"], json!(true));
        assert!(wire.get("error").is_none());
        assert!(response.is_success());
    }

    #[test]
    fn test_response_failure_carries_code() {
        let response = Response::failure(
            RequestId::Number(2),
            ProtocolError::tool_not_found("warp_drive"),
        );
        assert!(!response.is_success());
        let wire = serde_json::to_value(&response).unwrap();
        assert_eq!(wire["error"]["code"], json!(-40003));
        assert!(wire.get("result").is_none());
    }
}
