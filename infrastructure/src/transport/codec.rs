//! Frame codec for the wire boundary.
//!
//! Classifies and decodes newline-delimited JSON-RPC frames into the
//! structured messages the session consumes, and encodes outbound
//! messages back to text. The engine itself never sees an encoding.

use robolink_domain::{
    ErrorCode, Notification, OutboundMessage, ProtocolError, Request, Response,
};
use serde_json::Value;

/// Classification of one inbound JSON-RPC frame.
///
/// - `id` + `method` → a request expecting a response
/// - `id` only → a response to a request we sent
/// - `method` only → a notification
#[derive(Debug, PartialEq, Eq)]
pub enum FrameKind {
    Request,
    Response,
    Notification,
}

/// Structured form of one inbound frame.
#[derive(Debug, Clone)]
pub enum InboundMessage {
    Request(Request),
    Response(Response),
    Notification(Notification),
}

/// Classify a frame by inspecting its `id` and `method` fields.
pub fn classify_frame(json: &Value) -> FrameKind {
    let has_id = json.get("id").map(|v| !v.is_null()).unwrap_or(false);
    let has_method = json.get("method").and_then(|v| v.as_str()).is_some();
    match (has_id, has_method) {
        (true, true) => FrameKind::Request,
        (true, false) => FrameKind::Response,
        _ => FrameKind::Notification,
    }
}

/// Decode one text frame.
///
/// Invalid JSON maps to `ParseError`; valid JSON that fits none of the
/// three frame shapes maps to `InvalidParams`.
pub fn decode_frame(frame: &str) -> Result<InboundMessage, ProtocolError> {
    let json: Value = serde_json::from_str(frame)
        .map_err(|err| ProtocolError::new(ErrorCode::ParseError, format!("Parse error: {err}")))?;

    let decoded = match classify_frame(&json) {
        FrameKind::Request => serde_json::from_value(json).map(InboundMessage::Request),
        FrameKind::Response => serde_json::from_value(json).map(InboundMessage::Response),
        FrameKind::Notification => serde_json::from_value(json).map(InboundMessage::Notification),
    };
    decoded.map_err(|err| ProtocolError::invalid_params(format!("Malformed frame: {err}")))
}

/// Encode one outbound message as a single-line frame.
pub fn encode_frame(message: &OutboundMessage) -> Result<String, ProtocolError> {
    serde_json::to_string(message)
        .map_err(|err| ProtocolError::invalid_params(format!("Encode error: {err}")))
}
