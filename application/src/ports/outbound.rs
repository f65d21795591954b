//! Outbound message port
//!
//! The engine's only way of talking back to the counterparty. Adapters
//! hand frames to the message codec; the engine never sees the encoding.

use async_trait::async_trait;
use robolink_domain::OutboundMessage;
use thiserror::Error;

/// Failure to hand a message to the transport.
#[derive(Error, Debug, Clone)]
pub enum OutboundError {
    #[error("Transport closed")]
    Closed,
    #[error("Send failed: {0}")]
    SendFailed(String),
}

/// Port for emitting outbound protocol messages.
///
/// Implementations (adapters) live in the infrastructure layer. Ordering
/// guarantee required of implementations: messages sent from one task are
/// delivered in send order. No ordering is guaranteed across tasks.
#[async_trait]
pub trait OutboundPort: Send + Sync {
    /// Send one message to the counterparty.
    async fn send(&self, message: OutboundMessage) -> Result<(), OutboundError>;
}
