//! Tool execution engine.
//!
//! Owns the full call lifecycle: admission (emergency stop gate, busy
//! check, preconditions, safety evaluation, confirmation), spawning the
//! handler task, progress forwarding, and terminal transitions.
//!
//! Admission and emergency stop share one lock. `emergency_stop` latches
//! the coordinator and cancels every running call while holding it, and
//! every admission checks the latch under it, so no call can be admitted
//! after the stop is asserted. Terminal transitions are no-ops on the
//! record, so whichever of a handler result, an explicit cancel, and an
//! emergency stop lands first is authoritative.

use crate::engine::confirmation::ConfirmationWorkflow;
use crate::engine::estop::EmergencyStopCoordinator;
use crate::ports::outbound::OutboundPort;
use crate::ports::tool_handler::{HandlerRegistry, Progress, ToolHandlerPort};
use robolink_domain::protocol::methods::{CallToolAck, CallToolParams, ToolProgressParams, ToolResultParams};
use robolink_domain::{
    CallId, ConstraintSet, Notification, Outcome, OutboundMessage, ProposedAction, ProtocolError,
    RateWindow, RobotState, ToolCallRecord, ToolCatalog, ToolDefinition, ToolState,
    evaluate_constraints, method_names, precondition_holds,
};
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

struct CallEntry {
    record: ToolCallRecord,
    token: CancellationToken,
}

/// Everything the admission decision reads and writes, behind one lock.
#[derive(Default)]
struct AdmissionState {
    calls: HashMap<CallId, CallEntry>,
    rate: RateWindow,
}

pub struct ToolExecutionEngine {
    catalog: ToolCatalog,
    handlers: HandlerRegistry,
    constraints: Arc<RwLock<ConstraintSet>>,
    robot_state: Arc<RwLock<RobotState>>,
    estop: Arc<EmergencyStopCoordinator>,
    confirmations: Arc<ConfirmationWorkflow>,
    outbound: Arc<dyn OutboundPort>,
    admission: Mutex<AdmissionState>,
    next_call: AtomicU64,
}

impl ToolExecutionEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        catalog: ToolCatalog,
        handlers: HandlerRegistry,
        constraints: Arc<RwLock<ConstraintSet>>,
        robot_state: Arc<RwLock<RobotState>>,
        estop: Arc<EmergencyStopCoordinator>,
        confirmations: Arc<ConfirmationWorkflow>,
        outbound: Arc<dyn OutboundPort>,
    ) -> Self {
        Self {
            catalog,
            handlers,
            constraints,
            robot_state,
            estop,
            confirmations,
            outbound,
            admission: Mutex::new(AdmissionState::default()),
            next_call: AtomicU64::new(0),
        }
    }

    pub fn catalog(&self) -> &ToolCatalog {
        &self.catalog
    }

    pub fn estop(&self) -> &EmergencyStopCoordinator {
        &self.estop
    }

    /// Admit and start one tool call.
    ///
    /// Checks run in a fixed order: emergency stop, tool existence, busy,
    /// preconditions, safety constraints, confirmation. Confirmation-gated
    /// calls re-run the gates after the operator answers, since the world
    /// may have moved while they waited.
    pub async fn call_tool(
        self: &Arc<Self>,
        params: CallToolParams,
    ) -> Result<CallToolAck, ProtocolError> {
        let definition = self
            .catalog
            .get(&params.name)
            .cloned()
            .ok_or_else(|| ProtocolError::tool_not_found(&params.name))?;
        let handler = self
            .handlers
            .get(&params.name)
            .ok_or_else(|| ProtocolError::tool_not_found(&params.name))?;
        let action = ProposedAction::new(&definition.name, params.arguments.clone());

        if !definition.requires_confirmation() {
            let mut admission = self.admission.lock().expect("admission lock poisoned");
            let admitted = self.preflight(&mut admission, &definition, action)?;
            return self.start_locked(&mut admission, &definition, handler, admitted, params.call_id);
        }

        // Confirmation path: preflight first so a doomed call never
        // disturbs the operator.
        {
            let mut admission = self.admission.lock().expect("admission lock poisoned");
            self.preflight(&mut admission, &definition, action.clone())?;
        }

        let resolution = self
            .confirmations
            .request(
                format!("Execute tool '{}'", definition.name),
                definition.safety.level,
                json!({
                    "tool": definition.name.clone(),
                    "arguments": params.arguments.clone(),
                    "description": definition.description.clone(),
                }),
                None,
            )
            .await;

        if !resolution.is_approved() {
            let error = if resolution == robolink_domain::ConfirmationResolution::TimedOut {
                ProtocolError::confirmation_timeout()
            } else {
                ProtocolError::confirmation_denied()
            };
            let record = {
                let mut admission = self.admission.lock().expect("admission lock poisoned");
                let call_id = self.allocate_id(&mut admission, params.call_id)?;
                let mut record =
                    ToolCallRecord::new(call_id.clone(), &definition.name, params.arguments);
                record.mark_failed(error.message.clone());
                admission.calls.insert(
                    call_id,
                    CallEntry {
                        record: record.clone(),
                        token: CancellationToken::new(),
                    },
                );
                record
            };
            info!(call_id = %record.call_id, tool = %record.tool_name, "Confirmation refused");
            self.emit_result(&record).await;
            return Err(error);
        }

        let mut admission = self.admission.lock().expect("admission lock poisoned");
        let admitted = self.preflight(&mut admission, &definition, action)?;
        self.start_locked(&mut admission, &definition, handler, admitted, params.call_id)
    }

    /// Cancel one call. Cancelling a terminal call is a no-op that returns
    /// the existing record.
    pub fn cancel(&self, call_id: &CallId) -> Result<ToolCallRecord, ProtocolError> {
        let mut admission = self.admission.lock().expect("admission lock poisoned");
        let entry = admission
            .calls
            .get_mut(call_id)
            .ok_or_else(|| ProtocolError::invalid_params(format!("Unknown callId '{}'", call_id)))?;
        if entry.record.is_terminal() {
            return Ok(entry.record.clone());
        }
        info!(call_id = %call_id, tool = %entry.record.tool_name, "Cancelling tool call");
        entry.record.mark_cancelled("Cancelled by request");
        entry.token.cancel();
        Ok(entry.record.clone())
    }

    /// Latch the emergency stop and cancel every running call.
    ///
    /// Runs under the admission lock; returns the ids of the calls it
    /// cancelled.
    pub fn emergency_stop(&self, reason: &str, source: Option<String>) -> Vec<CallId> {
        let mut admission = self.admission.lock().expect("admission lock poisoned");
        self.estop.assert_stop(reason, source);

        let mut cancelled = Vec::new();
        for entry in admission.calls.values_mut() {
            if !entry.record.is_terminal() {
                entry
                    .record
                    .mark_cancelled(format!("Emergency stop: {}", reason));
                entry.token.cancel();
                cancelled.push(entry.record.call_id.clone());
            }
        }
        if !cancelled.is_empty() {
            warn!(count = cancelled.len(), "Emergency stop cancelled running calls");
        }
        cancelled
    }

    /// Administrative clear of the emergency stop latch.
    pub fn clear_emergency_stop(&self) -> bool {
        self.estop.clear()
    }

    /// Cooperatively cancel every running call (shutdown drain).
    pub fn cancel_all(&self, reason: &str) -> usize {
        let mut admission = self.admission.lock().expect("admission lock poisoned");
        let mut count = 0;
        for entry in admission.calls.values_mut() {
            if !entry.record.is_terminal() {
                entry.record.mark_cancelled(reason);
                entry.token.cancel();
                count += 1;
            }
        }
        count
    }

    pub fn get_call(&self, call_id: &CallId) -> Option<ToolCallRecord> {
        self.admission
            .lock()
            .expect("admission lock poisoned")
            .calls
            .get(call_id)
            .map(|entry| entry.record.clone())
    }

    pub fn running_count(&self) -> usize {
        self.admission
            .lock()
            .expect("admission lock poisoned")
            .calls
            .values()
            .filter(|entry| !entry.record.is_terminal())
            .count()
    }

    /// Wait until no call is running. Used by shutdown together with a
    /// drain timeout.
    pub async fn wait_drained(&self) {
        loop {
            if self.running_count() == 0 {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
    }

    /// Gates before admission. Must hold the admission lock.
    fn preflight(
        &self,
        admission: &mut AdmissionState,
        definition: &ToolDefinition,
        action: ProposedAction,
    ) -> Result<ProposedAction, ProtocolError> {
        if self.estop.is_active() {
            let reason = self
                .estop
                .reason()
                .unwrap_or_else(|| "emergency stop active".to_string());
            return Err(ProtocolError::emergency_stopped(reason));
        }

        if !definition.reentrant {
            let busy = admission
                .calls
                .values()
                .any(|entry| entry.record.tool_name == definition.name && !entry.record.is_terminal());
            if busy {
                return Err(ProtocolError::tool_busy(&definition.name));
            }
        }

        let state = self.robot_state.read().expect("robot state lock poisoned");
        for condition in &definition.preconditions {
            if !precondition_holds(condition, &state) {
                return Err(ProtocolError::precondition_failed(format!(
                    "Precondition not met: {} {} {}",
                    condition.field, condition.operator, condition.value
                )));
            }
        }

        let constraints = self.constraints.read().expect("constraint lock poisoned");
        let now = Instant::now();
        match evaluate_constraints(&action, &state, &constraints, false, &admission.rate, now) {
            Outcome::Allow => Ok(action),
            Outcome::Clamp {
                action,
                constraints: clamped_by,
            } => {
                info!(tool = %definition.name, constraints = ?clamped_by, "Action clamped by safety constraints");
                Ok(action)
            }
            Outcome::Reject { constraint, reason } => {
                debug!(tool = %definition.name, constraint = %constraint, "Action rejected by safety constraint");
                Err(ProtocolError::safety_violation(constraint, reason))
            }
            Outcome::EmergencyStop { constraint, reason } => {
                // Latch and cancel in place; we already hold the admission lock.
                self.estop.assert_stop(&reason, Some(constraint.clone()));
                for entry in admission.calls.values_mut() {
                    if !entry.record.is_terminal() {
                        entry
                            .record
                            .mark_cancelled(format!("Emergency stop: {}", reason));
                        entry.token.cancel();
                    }
                }
                Err(ProtocolError::safety_violation(constraint, reason))
            }
        }
    }

    fn allocate_id(
        &self,
        admission: &mut AdmissionState,
        supplied: Option<CallId>,
    ) -> Result<CallId, ProtocolError> {
        if let Some(id) = supplied {
            if admission.calls.contains_key(&id) {
                return Err(ProtocolError::invalid_params(format!(
                    "callId '{}' already in use",
                    id
                )));
            }
            return Ok(id);
        }
        loop {
            let id = CallId::new(format!(
                "call-{}",
                self.next_call.fetch_add(1, Ordering::Relaxed) + 1
            ));
            if !admission.calls.contains_key(&id) {
                return Ok(id);
            }
        }
    }

    fn start_locked(
        self: &Arc<Self>,
        admission: &mut AdmissionState,
        definition: &ToolDefinition,
        handler: Arc<dyn ToolHandlerPort>,
        action: ProposedAction,
        supplied_id: Option<CallId>,
    ) -> Result<CallToolAck, ProtocolError> {
        let call_id = self.allocate_id(admission, supplied_id)?;
        admission.rate.record(&definition.name, Instant::now());

        let record = ToolCallRecord::new(call_id.clone(), &definition.name, action.params.clone());
        let token = CancellationToken::new();
        admission.calls.insert(
            call_id.clone(),
            CallEntry {
                record,
                token: token.clone(),
            },
        );

        info!(call_id = %call_id, tool = %definition.name, "Tool call admitted");
        let engine = Arc::clone(self);
        let id = call_id.clone();
        tokio::spawn(async move {
            engine.run_call(id, handler, action.params, token).await;
        });

        Ok(CallToolAck {
            call_id,
            state: ToolState::Running,
        })
    }

    /// Drive one handler to its terminal state.
    async fn run_call(
        self: Arc<Self>,
        call_id: CallId,
        handler: Arc<dyn ToolHandlerPort>,
        arguments: serde_json::Value,
        token: CancellationToken,
    ) {
        let (progress_tx, mut progress_rx) = mpsc::unbounded_channel::<Progress>();
        let execution = handler.execute(arguments, progress_tx, token.clone());
        tokio::pin!(execution);

        let mut progress_open = true;
        let result = loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break None,
                sample = progress_rx.recv(), if progress_open => {
                    match sample {
                        Some(progress) => self.record_progress(&call_id, progress).await,
                        None => progress_open = false,
                    }
                }
                outcome = &mut execution => break Some(outcome),
            }
        };

        let record = match result {
            Some(outcome) => {
                // Flush progress reported just before completion.
                while let Ok(progress) = progress_rx.try_recv() {
                    self.record_progress(&call_id, progress).await;
                }
                let mut admission = self.admission.lock().expect("admission lock poisoned");
                let Some(entry) = admission.calls.get_mut(&call_id) else {
                    return;
                };
                match outcome {
                    Ok(value) => entry.record.mark_completed(value),
                    Err(error) => entry.record.mark_failed(error),
                }
                entry.record.clone()
            }
            None => {
                // Whoever cancelled the token marked the record first.
                let mut admission = self.admission.lock().expect("admission lock poisoned");
                let Some(entry) = admission.calls.get_mut(&call_id) else {
                    return;
                };
                entry.record.mark_cancelled("Cancelled");
                entry.record.clone()
            }
        };

        info!(
            call_id = %call_id,
            state = %record.state.as_str(),
            duration_secs = ?record.duration_secs(),
            "Tool call finished"
        );
        self.emit_result(&record).await;
    }

    async fn record_progress(&self, call_id: &CallId, progress: Progress) {
        let accepted = {
            let mut admission = self.admission.lock().expect("admission lock poisoned");
            match admission.calls.get_mut(call_id) {
                Some(entry) => {
                    let accepted = entry
                        .record
                        .update_progress(progress.value, progress.message.clone());
                    if !accepted && !entry.record.is_terminal() {
                        warn!(
                            call_id = %call_id,
                            value = progress.value,
                            current = entry.record.progress,
                            "Dropping regressed progress sample"
                        );
                    }
                    accepted
                }
                None => false,
            }
        };
        if !accepted {
            return;
        }

        let params = ToolProgressParams {
            call_id: call_id.clone(),
            progress: Some(progress.value.clamp(0.0, 1.0)),
            message: progress.message.unwrap_or_default(),
            state: ToolState::Running,
        };
        self.notify(method_names::TOOL_PROGRESS, &params).await;
    }

    async fn emit_result(&self, record: &ToolCallRecord) {
        let params = ToolResultParams {
            call_id: record.call_id.clone(),
            state: record.state,
            result: record.result.clone(),
            error: record.error.clone(),
            duration: record.duration_secs(),
        };
        self.notify(method_names::TOOL_RESULT, &params).await;
    }

    async fn notify<T: serde::Serialize>(&self, method: &str, params: &T) {
        let params = match serde_json::to_value(params) {
            Ok(value) => value,
            Err(err) => {
                warn!(method = %method, error = %err, "Failed to encode notification");
                return;
            }
        };
        if let Err(err) = self
            .outbound
            .send(OutboundMessage::Notification(Notification::new(method, params)))
            .await
        {
            warn!(method = %method, error = %err, "Notification not sent");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::engine::correlation::OutboundRequests;
    use crate::ports::outbound::OutboundError;
    use async_trait::async_trait;
    use robolink_domain::{
        Condition, ConstraintParams, Response, SafetyConstraint, SafetyLevel, SafetyMetadata,
        ViolationAction,
    };
    use serde_json::{Value, json};
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingOutbound {
        sent: Mutex<Vec<OutboundMessage>>,
    }

    #[async_trait]
    impl OutboundPort for RecordingOutbound {
        async fn send(&self, message: OutboundMessage) -> Result<(), OutboundError> {
            self.sent.lock().unwrap().push(message);
            Ok(())
        }
    }

    impl RecordingOutbound {
        fn notifications(&self, method: &str) -> Vec<Value> {
            self.sent
                .lock()
                .unwrap()
                .iter()
                .filter_map(|message| match message {
                    OutboundMessage::Notification(n) if n.method == method => {
                        Some(n.params.clone())
                    }
                    _ => None,
                })
                .collect()
        }

        fn first_request(&self) -> Option<robolink_domain::Request> {
            self.sent.lock().unwrap().iter().find_map(|m| match m {
                OutboundMessage::Request(r) => Some(r.clone()),
                _ => None,
            })
        }
    }

    /// Completes immediately with its arguments echoed back.
    struct EchoHandler;

    #[async_trait]
    impl ToolHandlerPort for EchoHandler {
        async fn execute(
            &self,
            arguments: Value,
            progress: crate::ports::tool_handler::ProgressSender,
            _cancel: CancellationToken,
        ) -> Result<Value, String> {
            let _ = progress.send(Progress::with_message(0.5, "halfway"));
            Ok(json!({"echo": arguments}))
        }
    }

    /// Runs until cancelled.
    struct BlockingHandler;

    #[async_trait]
    impl ToolHandlerPort for BlockingHandler {
        async fn execute(
            &self,
            _arguments: Value,
            _progress: crate::ports::tool_handler::ProgressSender,
            cancel: CancellationToken,
        ) -> Result<Value, String> {
            cancel.cancelled().await;
            Err("cancelled".to_string())
        }
    }

    /// Reports progress out of order.
    struct StutteringHandler;

    #[async_trait]
    impl ToolHandlerPort for StutteringHandler {
        async fn execute(
            &self,
            arguments: Value,
            progress: crate::ports::tool_handler::ProgressSender,
            _cancel: CancellationToken,
        ) -> Result<Value, String> {
            let _ = progress.send(Progress::at(0.8));
            let _ = progress.send(Progress::at(0.3));
            let _ = progress.send(Progress::at(0.9));
            Ok(arguments)
        }
    }

    struct FailingHandler;

    #[async_trait]
    impl ToolHandlerPort for FailingHandler {
        async fn execute(
            &self,
            _arguments: Value,
            _progress: crate::ports::tool_handler::ProgressSender,
            _cancel: CancellationToken,
        ) -> Result<Value, String> {
            Err("gripper jammed".to_string())
        }
    }

    struct Fixture {
        engine: Arc<ToolExecutionEngine>,
        outbound: Arc<RecordingOutbound>,
        correlator: Arc<OutboundRequests>,
        robot_state: Arc<RwLock<RobotState>>,
    }

    fn make_fixture(constraints: ConstraintSet) -> Fixture {
        let outbound: Arc<RecordingOutbound> = Arc::new(RecordingOutbound::default());
        let correlator = Arc::new(OutboundRequests::new());
        let config = EngineConfig::default();
        let confirmations = Arc::new(ConfirmationWorkflow::new(
            outbound.clone(),
            correlator.clone(),
            &config,
        ));

        let catalog = ToolCatalog::new()
            .register(ToolDefinition::new(
                "move_to",
                "Move the arm",
                SafetyMetadata::new(SafetyLevel::Normal),
            ))
            .register(ToolDefinition::new(
                "hold",
                "Hold until released",
                SafetyMetadata::new(SafetyLevel::Normal),
            ))
            .register(ToolDefinition::new(
                "grip",
                "Close the gripper",
                SafetyMetadata::new(SafetyLevel::Normal),
            ))
            .register(ToolDefinition::new(
                "calibrate",
                "Run the calibration sweep",
                SafetyMetadata::new(SafetyLevel::Normal),
            ))
            .register(
                ToolDefinition::new(
                    "activate_cutter",
                    "Spin up the cutter",
                    SafetyMetadata::new(SafetyLevel::Critical).with_confirmation(),
                )
                .with_precondition(Condition::new("workpiece_clamped", "==", json!(true))),
            );

        let mut handlers = HandlerRegistry::new();
        handlers.register("move_to", Arc::new(EchoHandler));
        handlers.register("hold", Arc::new(BlockingHandler));
        handlers.register("grip", Arc::new(FailingHandler));
        handlers.register("calibrate", Arc::new(StutteringHandler));
        handlers.register("activate_cutter", Arc::new(EchoHandler));

        let constraints = Arc::new(RwLock::new(constraints));
        let robot_state = Arc::new(RwLock::new(
            RobotState::new().with("workpiece_clamped", json!(true)),
        ));
        let estop = Arc::new(EmergencyStopCoordinator::new());
        let engine = Arc::new(ToolExecutionEngine::new(
            catalog,
            handlers,
            constraints,
            robot_state.clone(),
            estop,
            confirmations,
            outbound.clone(),
        ));
        Fixture {
            engine,
            outbound,
            correlator,
            robot_state,
        }
    }

    fn call(name: &str) -> CallToolParams {
        CallToolParams {
            name: name.to_string(),
            arguments: json!({}),
            call_id: None,
        }
    }

    async fn wait_terminal(engine: &Arc<ToolExecutionEngine>, call_id: &CallId) -> ToolCallRecord {
        for _ in 0..500 {
            if let Some(record) = engine.get_call(call_id)
                && record.is_terminal()
            {
                return record;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        panic!("call {} never reached a terminal state", call_id);
    }

    #[tokio::test]
    async fn test_call_completes_and_emits_result() {
        let fixture = make_fixture(ConstraintSet::new());
        let ack = fixture
            .engine
            .call_tool(CallToolParams {
                name: "move_to".to_string(),
                arguments: json!({"target": [1.0, 0.0, 0.5]}),
                call_id: None,
            })
            .await
            .unwrap();
        assert_eq!(ack.state, ToolState::Running);

        let record = wait_terminal(&fixture.engine, &ack.call_id).await;
        assert_eq!(record.state, ToolState::Completed);
        assert_eq!(record.result.unwrap()["echo"]["target"][0], json!(1.0));

        let results = fixture.outbound.notifications("arp.toolResult");
        assert_eq!(results.len(), 1);
        assert_eq!(results[0]["state"], json!("completed"));
        assert!(results[0]["duration"].is_number());
    }

    #[tokio::test]
    async fn test_progress_forwarded_before_result() {
        let fixture = make_fixture(ConstraintSet::new());
        let ack = fixture.engine.call_tool(call("move_to")).await.unwrap();
        wait_terminal(&fixture.engine, &ack.call_id).await;

        let progress = fixture.outbound.notifications("arp.toolProgress");
        assert_eq!(progress.len(), 1);
        assert_eq!(progress[0]["progress"], json!(0.5));
        assert_eq!(progress[0]["message"], json!("halfway"));
    }

    #[tokio::test]
    async fn test_unknown_tool_rejected() {
        let fixture = make_fixture(ConstraintSet::new());
        let err = fixture.engine.call_tool(call("warp")).await.unwrap_err();
        assert_eq!(err.code.as_i32(), -40003);
    }

    #[tokio::test]
    async fn test_non_reentrant_tool_is_busy_while_running() {
        let fixture = make_fixture(ConstraintSet::new());
        let ack = fixture.engine.call_tool(call("hold")).await.unwrap();

        let err = fixture.engine.call_tool(call("hold")).await.unwrap_err();
        assert_eq!(err.code.as_i32(), -40004);

        fixture.engine.cancel(&ack.call_id).unwrap();
        wait_terminal(&fixture.engine, &ack.call_id).await;

        // Terminal call releases the busy gate.
        fixture.engine.call_tool(call("hold")).await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_handler_marks_failed() {
        let fixture = make_fixture(ConstraintSet::new());
        let ack = fixture.engine.call_tool(call("grip")).await.unwrap();
        let record = wait_terminal(&fixture.engine, &ack.call_id).await;
        assert_eq!(record.state, ToolState::Failed);
        assert_eq!(record.error.as_deref(), Some("gripper jammed"));
    }

    #[tokio::test]
    async fn test_cancel_is_idempotent() {
        let fixture = make_fixture(ConstraintSet::new());
        let ack = fixture.engine.call_tool(call("hold")).await.unwrap();

        let first = fixture.engine.cancel(&ack.call_id).unwrap();
        assert_eq!(first.state, ToolState::Cancelled);
        let second = fixture.engine.cancel(&ack.call_id).unwrap();
        assert_eq!(second.state, ToolState::Cancelled);
        assert_eq!(second.error, first.error);

        let err = fixture
            .engine
            .cancel(&CallId::new("call-999"))
            .unwrap_err();
        assert_eq!(err.code.as_i32(), -32602);
    }

    #[tokio::test]
    async fn test_emergency_stop_cancels_and_blocks() {
        let fixture = make_fixture(ConstraintSet::new());
        let ack = fixture.engine.call_tool(call("hold")).await.unwrap();

        let cancelled = fixture.engine.emergency_stop("obstacle", Some("lidar".into()));
        assert_eq!(cancelled, vec![ack.call_id.clone()]);
        let record = wait_terminal(&fixture.engine, &ack.call_id).await;
        assert_eq!(record.state, ToolState::Cancelled);
        assert!(record.error.unwrap().contains("obstacle"));

        // No admission while latched.
        let err = fixture.engine.call_tool(call("move_to")).await.unwrap_err();
        assert_eq!(err.code.as_i32(), -40007);

        assert!(fixture.engine.clear_emergency_stop());
        fixture.engine.call_tool(call("move_to")).await.unwrap();
    }

    #[tokio::test]
    async fn test_safety_reject_blocks_admission() {
        let constraints = ConstraintSet::new().with(SafetyConstraint::new(
            "max_speed",
            ConstraintParams::VelocityLimit {
                max_linear: 1.0,
                max_angular: None,
            },
            ViolationAction::Reject,
        ));
        let fixture = make_fixture(constraints);

        let err = fixture
            .engine
            .call_tool(CallToolParams {
                name: "move_to".to_string(),
                arguments: json!({"velocity": 5.0}),
                call_id: None,
            })
            .await
            .unwrap_err();
        assert_eq!(err.code.as_i32(), -40001);
        assert_eq!(err.data.unwrap()["constraint"], json!("max_speed"));
    }

    #[tokio::test]
    async fn test_clamped_arguments_reach_handler() {
        let constraints = ConstraintSet::new().with(SafetyConstraint::new(
            "max_speed",
            ConstraintParams::VelocityLimit {
                max_linear: 1.0,
                max_angular: None,
            },
            ViolationAction::Clamp,
        ));
        let fixture = make_fixture(constraints);

        let ack = fixture
            .engine
            .call_tool(CallToolParams {
                name: "move_to".to_string(),
                arguments: json!({"velocity": 5.0}),
                call_id: None,
            })
            .await
            .unwrap();
        let record = wait_terminal(&fixture.engine, &ack.call_id).await;
        assert_eq!(record.state, ToolState::Completed);
        assert_eq!(record.result.unwrap()["echo"]["velocity"], json!(1.0));
        assert_eq!(record.params["velocity"], json!(1.0));
    }

    #[tokio::test]
    async fn test_rate_limit_rejects_burst() {
        let constraints = ConstraintSet::new().with(SafetyConstraint::new(
            "throttle",
            ConstraintParams::RateLimit {
                max_calls_per_second: 2,
            },
            ViolationAction::Reject,
        ));
        let fixture = make_fixture(constraints);

        fixture.engine.call_tool(call("move_to")).await.unwrap();
        fixture.engine.call_tool(call("move_to")).await.unwrap();
        let err = fixture.engine.call_tool(call("move_to")).await.unwrap_err();
        assert_eq!(err.code.as_i32(), -40001);
    }

    #[tokio::test]
    async fn test_precondition_gate() {
        let fixture = make_fixture(ConstraintSet::new());
        fixture
            .robot_state
            .write()
            .unwrap()
            .set("workpiece_clamped", json!(false));

        // Preflight fails before any confirmation is requested.
        let err = fixture
            .engine
            .call_tool(call("activate_cutter"))
            .await
            .unwrap_err();
        assert_eq!(err.code.as_i32(), -40002);
        assert!(fixture.outbound.first_request().is_none());
    }

    #[tokio::test]
    async fn test_confirmation_approved_runs_tool() {
        let fixture = make_fixture(ConstraintSet::new());
        let engine = fixture.engine.clone();
        let task = tokio::spawn(async move { engine.call_tool(call("activate_cutter")).await });

        // Answer the confirmation request once it appears.
        let request = loop {
            if let Some(request) = fixture.outbound.first_request() {
                break request;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        };
        assert_eq!(request.method, "arp.requestConfirmation");
        fixture.correlator.resolve(Response::success(
            request.id,
            json!({"confirmed": true, "respondedBy": "operator-1"}),
        ));

        let ack = task.await.unwrap().unwrap();
        let record = wait_terminal(&fixture.engine, &ack.call_id).await;
        assert_eq!(record.state, ToolState::Completed);
    }

    #[tokio::test]
    async fn test_confirmation_denied_fails_call() {
        let fixture = make_fixture(ConstraintSet::new());
        let engine = fixture.engine.clone();
        let task = tokio::spawn(async move { engine.call_tool(call("activate_cutter")).await });

        let request = loop {
            if let Some(request) = fixture.outbound.first_request() {
                break request;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        };
        fixture
            .correlator
            .resolve(Response::success(request.id, json!({"confirmed": false})));

        let err = task.await.unwrap().unwrap_err();
        assert_eq!(err.code.as_i32(), -40006);

        // A failed record exists and a result notification went out.
        let results = fixture.outbound.notifications("arp.toolResult");
        assert_eq!(results.len(), 1);
        assert_eq!(results[0]["state"], json!("failed"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_confirmation_timeout_fails_call() {
        let fixture = make_fixture(ConstraintSet::new());
        let engine = fixture.engine.clone();
        let task = tokio::spawn(async move { engine.call_tool(call("activate_cutter")).await });

        // Nobody answers; the timer runs down.
        let err = task.await.unwrap().unwrap_err();
        assert_eq!(err.code.as_i32(), -40005);

        // The request did go out and its waiter was reclaimed.
        let request = fixture.outbound.first_request().unwrap();
        assert_eq!(request.method, "arp.requestConfirmation");
        assert_eq!(fixture.correlator.pending_count(), 0);

        // The refused call leaves a failed record and a result notification.
        let results = fixture.outbound.notifications("arp.toolResult");
        assert_eq!(results.len(), 1);
        assert_eq!(results[0]["state"], json!("failed"));
    }

    #[tokio::test]
    async fn test_regressed_progress_dropped() {
        let fixture = make_fixture(ConstraintSet::new());
        let ack = fixture.engine.call_tool(call("calibrate")).await.unwrap();
        wait_terminal(&fixture.engine, &ack.call_id).await;

        let progress = fixture.outbound.notifications("arp.toolProgress");
        let values: Vec<_> = progress.iter().map(|p| p["progress"].clone()).collect();
        assert_eq!(values, vec![json!(0.8), json!(0.9)]);
    }

    #[tokio::test]
    async fn test_caller_supplied_id_collision() {
        let fixture = make_fixture(ConstraintSet::new());
        let supplied = CallId::new("my-call");
        fixture
            .engine
            .call_tool(CallToolParams {
                name: "hold".to_string(),
                arguments: json!({}),
                call_id: Some(supplied.clone()),
            })
            .await
            .unwrap();

        let err = fixture
            .engine
            .call_tool(CallToolParams {
                name: "move_to".to_string(),
                arguments: json!({}),
                call_id: Some(supplied),
            })
            .await
            .unwrap_err();
        assert_eq!(err.code.as_i32(), -32602);
    }

    #[tokio::test]
    async fn test_escalating_constraint_latches_estop() {
        let constraints = ConstraintSet::new().with(SafetyConstraint::new(
            "force_guard",
            ConstraintParams::ForceLimit {
                max_force: 10.0,
                max_torque: None,
            },
            ViolationAction::EmergencyStop,
        ));
        let fixture = make_fixture(constraints);

        let err = fixture
            .engine
            .call_tool(CallToolParams {
                name: "move_to".to_string(),
                arguments: json!({"force": 50.0}),
                call_id: None,
            })
            .await
            .unwrap_err();
        assert_eq!(err.code.as_i32(), -40001);
        assert!(fixture.engine.estop().is_active());
    }
}
