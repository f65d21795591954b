//! Confirmation workflow.
//!
//! Confirmation-gated calls suspend here before admission: a
//! `arp.requestConfirmation` request goes out, and execution resumes only
//! on an approving response. No response within the timeout resolves the
//! request TimedOut, which the caller treats as a denial. Late responses
//! are dropped by the correlator and logged, never surfaced.

use crate::config::EngineConfig;
use crate::engine::correlation::OutboundRequests;
use crate::ports::outbound::OutboundPort;
use robolink_domain::protocol::methods::RequestConfirmationParams;
use robolink_domain::{
    ConfirmationId, ConfirmationRequest, ConfirmationResolution, OutboundMessage, SafetyLevel,
    method_names,
};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Verdict shape expected in the confirmation response result.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Verdict {
    confirmed: bool,
    #[serde(default)]
    responded_by: Option<String>,
}

pub struct ConfirmationWorkflow {
    outbound: Arc<dyn OutboundPort>,
    correlator: Arc<OutboundRequests>,
    /// Resolved requests, kept for status queries and audit.
    archive: Mutex<HashMap<ConfirmationId, ConfirmationRequest>>,
    next_id: AtomicU64,
    default_timeout: Duration,
}

impl ConfirmationWorkflow {
    pub fn new(
        outbound: Arc<dyn OutboundPort>,
        correlator: Arc<OutboundRequests>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            outbound,
            correlator,
            archive: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
            default_timeout: config.confirmation_timeout(),
        }
    }

    /// Request approval for one action and wait for the verdict.
    ///
    /// Resolves exactly once: Confirmed, Denied, or TimedOut. A closed
    /// transport resolves Denied (fail closed).
    pub async fn request(
        &self,
        action: impl Into<String>,
        safety_level: SafetyLevel,
        details: Value,
        timeout: Option<Duration>,
    ) -> ConfirmationResolution {
        let timeout = timeout.unwrap_or(self.default_timeout);
        let id = ConfirmationId::new(format!(
            "confirm-{}",
            self.next_id.fetch_add(1, Ordering::Relaxed) + 1
        ));
        let mut request =
            ConfirmationRequest::new(id.clone(), action.into(), safety_level, details, timeout);

        let params = RequestConfirmationParams {
            confirmation_id: id.clone(),
            action: request.action.clone(),
            safety_level,
            details: request.details.clone(),
            timeout: timeout.as_secs_f64(),
        };
        let params = match serde_json::to_value(&params) {
            Ok(value) => value,
            Err(err) => {
                warn!(confirmation_id = %id, error = %err, "Failed to encode confirmation request");
                request.resolve(ConfirmationResolution::Denied, None);
                return self.archive_and_return(request);
            }
        };

        let (wire_request, rx) = self
            .correlator
            .register(method_names::REQUEST_CONFIRMATION, params);
        let request_id = wire_request.id.clone();

        info!(
            confirmation_id = %id,
            action = %request.action,
            timeout_secs = timeout.as_secs_f64(),
            "Requesting confirmation"
        );

        if let Err(err) = self
            .outbound
            .send(OutboundMessage::Request(wire_request))
            .await
        {
            warn!(confirmation_id = %id, error = %err, "Confirmation request not sent");
            self.correlator.forget(&request_id);
            request.resolve(ConfirmationResolution::Denied, None);
            return self.archive_and_return(request);
        }

        let (resolution, responded_by) = match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(response)) => match response.result {
                Some(result) => match serde_json::from_value::<Verdict>(result) {
                    Ok(verdict) if verdict.confirmed => {
                        (ConfirmationResolution::Confirmed, verdict.responded_by)
                    }
                    Ok(verdict) => (ConfirmationResolution::Denied, verdict.responded_by),
                    Err(err) => {
                        warn!(confirmation_id = %id, error = %err, "Malformed confirmation verdict");
                        (ConfirmationResolution::Denied, None)
                    }
                },
                None => {
                    debug!(confirmation_id = %id, "Confirmation answered with an error response");
                    (ConfirmationResolution::Denied, None)
                }
            },
            Ok(Err(_)) => {
                // Waiter dropped: the session is tearing down.
                (ConfirmationResolution::Denied, None)
            }
            Err(_) => {
                self.correlator.forget(&request_id);
                info!(confirmation_id = %id, "Confirmation timed out");
                (ConfirmationResolution::TimedOut, None)
            }
        };

        request.resolve(resolution, responded_by);
        self.archive_and_return(request)
    }

    fn archive_and_return(&self, request: ConfirmationRequest) -> ConfirmationResolution {
        let resolution = request.resolution();
        self.archive
            .lock()
            .expect("confirmation archive lock poisoned")
            .insert(request.id.clone(), request);
        resolution
    }

    /// Look up a resolved request by id.
    pub fn get(&self, id: &ConfirmationId) -> Option<ConfirmationRequest> {
        self.archive
            .lock()
            .expect("confirmation archive lock poisoned")
            .get(id)
            .cloned()
    }

    pub fn resolved_count(&self) -> usize {
        self.archive
            .lock()
            .expect("confirmation archive lock poisoned")
            .len()
    }
}
