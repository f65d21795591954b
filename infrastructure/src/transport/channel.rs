//! In-process channel transport.
//!
//! Runs a session over a pair of unbounded channels carrying text frames.
//! This is the adapter used by the integration tests and by hosts that
//! embed client and server in one process; a socket transport plugs in
//! the same way by feeding frames into [`MessageRouter::run`].

use crate::transport::codec::{self, InboundMessage};
use async_trait::async_trait;
use robolink_application::ports::outbound::{OutboundError, OutboundPort};
use robolink_application::ProtocolSession;
use robolink_domain::{OutboundMessage, RequestId, Response};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Outbound port that encodes messages and pushes the frames into a
/// channel.
pub struct ChannelOutbound {
    frames: mpsc::UnboundedSender<String>,
}

impl ChannelOutbound {
    /// Create the port together with the receiving end of the frame
    /// stream.
    pub fn pair() -> (Arc<Self>, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { frames: tx }), rx)
    }
}

#[async_trait]
impl OutboundPort for ChannelOutbound {
    async fn send(&self, message: OutboundMessage) -> Result<(), OutboundError> {
        let frame =
            codec::encode_frame(&message).map_err(|err| OutboundError::SendFailed(err.message))?;
        self.frames
            .send(frame)
            .map_err(|_| OutboundError::Closed)
    }
}

/// Reads inbound frames, decodes them, and drives the session.
///
/// Requests are dispatched on their own tasks so a long call (a
/// confirmation wait, a slow tool) never blocks cancellation or an
/// emergency stop arriving behind it.
pub struct MessageRouter {
    session: Arc<ProtocolSession>,
    outbound: Arc<ChannelOutbound>,
}

impl MessageRouter {
    pub fn new(session: Arc<ProtocolSession>, outbound: Arc<ChannelOutbound>) -> Self {
        Self { session, outbound }
    }

    /// Pump frames until the channel closes or `shutdown` fires.
    pub async fn run(
        &self,
        mut inbound: mpsc::UnboundedReceiver<String>,
        shutdown: CancellationToken,
    ) {
        loop {
            let frame = tokio::select! {
                _ = shutdown.cancelled() => break,
                frame = inbound.recv() => match frame {
                    Some(frame) => frame,
                    None => break,
                },
            };
            self.handle_frame(frame).await;
        }
        debug!("Message router stopped");
    }

    async fn handle_frame(&self, frame: String) {
        let message = match codec::decode_frame(&frame) {
            Ok(message) => message,
            Err(error) => {
                warn!(code = error.code.as_i32(), "Dropping bad frame: {}", error.message);
                let response = Response::failure(RequestId::Null, error);
                let _ = self
                    .outbound
                    .send(OutboundMessage::Response(response))
                    .await;
                return;
            }
        };

        match message {
            InboundMessage::Request(request) => {
                let session = self.session.clone();
                let outbound = self.outbound.clone();
                tokio::spawn(async move {
                    let response = session.dispatch(request).await;
                    if let Err(err) = outbound.send(OutboundMessage::Response(response)).await {
                        warn!(error = %err, "Response not sent");
                    }
                });
            }
            InboundMessage::Notification(notification) => {
                self.session.dispatch_notification(notification).await;
            }
            InboundMessage::Response(response) => {
                self.session.dispatch_response(response);
            }
        }
    }
}
