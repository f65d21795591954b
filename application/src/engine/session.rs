//! Protocol session.
//!
//! One session per connection: handshake, method dispatch, inbound
//! notification routing, and the shutdown drain. The session owns the
//! wiring of the engines and is the only place lifecycle state is
//! checked, so the engines below it can assume an initialized session.

use crate::config::EngineConfig;
use crate::engine::confirmation::ConfirmationWorkflow;
use crate::engine::correlation::OutboundRequests;
use crate::engine::estop::{EmergencyStopCoordinator, EstopStatus};
use crate::engine::execution::ToolExecutionEngine;
use crate::engine::streaming::ContextStreamManager;
use crate::ports::context_provider::ContextProviderPort;
use crate::ports::outbound::OutboundPort;
use crate::ports::tool_handler::{HandlerRegistry, ToolHandlerPort};
use robolink_domain::protocol::methods::{
    CallToolParams, CancelToolParams, EmergencyStopParams, GetConstraintParams, InitializeParams,
    InitializeResult, ListConstraintsResult, ListContextResult, ListToolsResult, PlanResult,
    RequestPlanParams, SetWorkspaceParams, ShutdownResult, SubscribeContextParams,
    SubscribeContextResult, UnsubscribeContextParams,
};
use robolink_domain::{
    Capabilities, ClientInfo, ConstraintParams, ConstraintSet, ContextSource, Notification,
    OutboundMessage, PROTOCOL_VERSION, ProtocolError, Request, Response, RobotState,
    SafetyConstraint, ServerInfo, SessionState, ToolCatalog, ToolDefinition, ViolationAction,
    method_names,
};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, info, warn};

/// Priority given to the workspace bound installed by `arp.setWorkspace`.
const WORKSPACE_CONSTRAINT_PRIORITY: i32 = 100;

pub struct ProtocolSession {
    state: RwLock<SessionState>,
    server_info: ServerInfo,
    capabilities: Capabilities,
    negotiated: Mutex<Option<Capabilities>>,
    client: Mutex<Option<ClientInfo>>,
    execution: Arc<ToolExecutionEngine>,
    streaming: Arc<ContextStreamManager>,
    constraints: Arc<RwLock<ConstraintSet>>,
    correlator: Arc<OutboundRequests>,
    outbound: Arc<dyn OutboundPort>,
    config: EngineConfig,
}

impl ProtocolSession {
    pub fn builder(server_info: ServerInfo) -> ProtocolSessionBuilder {
        ProtocolSessionBuilder::new(server_info)
    }

    pub fn state(&self) -> SessionState {
        *self.state.read().expect("session state lock poisoned")
    }

    pub fn execution(&self) -> &Arc<ToolExecutionEngine> {
        &self.execution
    }

    pub fn streaming(&self) -> &Arc<ContextStreamManager> {
        &self.streaming
    }

    pub fn estop_status(&self) -> EstopStatus {
        self.execution.estop().status()
    }

    /// Handle one inbound request, producing its response.
    pub async fn dispatch(&self, request: Request) -> Response {
        let id = request.id.clone();
        debug!(id = %id, method = %request.method, "Dispatching request");
        match self.handle(&request.method, request.params).await {
            Ok(result) => Response::success(id, result),
            Err(error) => {
                debug!(id = %id, code = error.code.as_i32(), "Request failed: {}", error.message);
                Response::failure(id, error)
            }
        }
    }

    /// Route one inbound notification. Unknown methods are logged and
    /// dropped, never answered.
    pub async fn dispatch_notification(&self, notification: Notification) {
        match notification.method.as_str() {
            method_names::EMERGENCY_STOP => {
                let params: EmergencyStopParams = match serde_json::from_value(notification.params)
                {
                    Ok(params) => params,
                    Err(_) => EmergencyStopParams {
                        reason: "unspecified".to_string(),
                        source: None,
                    },
                };
                // Honoured in every lifecycle state.
                self.execution.emergency_stop(&params.reason, params.source);
            }
            method_names::EMERGENCY_CLEAR => {
                if !self.execution.clear_emergency_stop() {
                    debug!("Emergency clear received while not stopped");
                }
            }
            other => {
                warn!(method = %other, "Ignoring unknown notification");
            }
        }
    }

    /// Route one inbound response to the engine request awaiting it.
    pub fn dispatch_response(&self, response: Response) {
        self.correlator.resolve(response);
    }

    async fn handle(&self, method: &str, params: Value) -> Result<Value, ProtocolError> {
        match method {
            method_names::INITIALIZE => self.initialize(parse(params)?),
            method_names::SHUTDOWN => self.shutdown().await,
            method_names::LIST_TOOLS => {
                self.require_ready()?;
                to_value(ListToolsResult {
                    tools: self.execution.catalog().all().cloned().collect(),
                })
            }
            method_names::CALL_TOOL => {
                self.require_ready()?;
                let params: CallToolParams = parse(params)?;
                let ack = self.execution.call_tool(params).await?;
                to_value(ack)
            }
            method_names::CANCEL_TOOL => {
                self.require_ready()?;
                let params: CancelToolParams = parse(params)?;
                let record = self.execution.cancel(&params.call_id)?;
                to_value(record)
            }
            method_names::LIST_CONTEXT => {
                self.require_ready()?;
                to_value(ListContextResult {
                    sources: self.streaming.list_sources(),
                })
            }
            method_names::SUBSCRIBE_CONTEXT => {
                self.require_ready()?;
                let params: SubscribeContextParams = parse(params)?;
                let subscriber = self
                    .client
                    .lock()
                    .expect("client lock poisoned")
                    .as_ref()
                    .map(|c| c.name.clone())
                    .unwrap_or_else(|| "client".to_string());
                let subscription_id =
                    self.streaming
                        .subscribe(subscriber, &params.source, params.max_rate)?;
                to_value(SubscribeContextResult { subscription_id })
            }
            method_names::UNSUBSCRIBE_CONTEXT => {
                self.require_ready()?;
                let params: UnsubscribeContextParams = parse(params)?;
                self.streaming.unsubscribe(&params.subscription_id)?;
                Ok(json!({"status": "ok"}))
            }
            method_names::LIST_CONSTRAINTS => {
                self.require_ready()?;
                let constraints = self
                    .constraints
                    .read()
                    .expect("constraint lock poisoned")
                    .all()
                    .cloned()
                    .collect();
                to_value(ListConstraintsResult { constraints })
            }
            method_names::GET_CONSTRAINT => {
                self.require_ready()?;
                let params: GetConstraintParams = parse(params)?;
                let constraint = self
                    .constraints
                    .read()
                    .expect("constraint lock poisoned")
                    .get(&params.name)
                    .cloned()
                    .ok_or_else(|| {
                        ProtocolError::invalid_params(format!(
                            "Unknown constraint '{}'",
                            params.name
                        ))
                    })?;
                to_value(constraint)
            }
            method_names::SET_WORKSPACE => {
                self.require_ready()?;
                let params: SetWorkspaceParams = parse(params)?;
                self.set_workspace(params)
            }
            other => Err(ProtocolError::method_not_found(other)),
        }
    }

    fn initialize(&self, params: InitializeParams) -> Result<Value, ProtocolError> {
        let mut state = self.state.write().expect("session state lock poisoned");
        if *state != SessionState::Uninitialized {
            return Err(ProtocolError::invalid_params("Session already initialized"));
        }
        if params.protocol_version != PROTOCOL_VERSION {
            warn!(
                client_version = %params.protocol_version,
                server_version = %PROTOCOL_VERSION,
                "Protocol version mismatch"
            );
        }

        let negotiated = self.capabilities.intersect(&params.capabilities);
        info!(
            client = %params.client_info.name,
            version = %params.client_info.version,
            "Session initialized"
        );
        *self.negotiated.lock().expect("negotiated lock poisoned") = Some(negotiated);
        *self.client.lock().expect("client lock poisoned") = Some(params.client_info);
        *state = SessionState::Initialized;

        to_value(InitializeResult {
            protocol_version: PROTOCOL_VERSION.to_string(),
            server_info: self.server_info.clone(),
            capabilities: negotiated,
        })
    }

    async fn shutdown(&self) -> Result<Value, ProtocolError> {
        {
            let mut state = self.state.write().expect("session state lock poisoned");
            match *state {
                SessionState::Uninitialized => {
                    *state = SessionState::Closed;
                    return to_value(ShutdownResult {
                        status: "ok".to_string(),
                    });
                }
                SessionState::Initialized => {
                    *state = SessionState::ShuttingDown;
                }
                SessionState::ShuttingDown | SessionState::Closed => {
                    return to_value(ShutdownResult {
                        status: "ok".to_string(),
                    });
                }
            }
        }

        let cancelled = self.execution.cancel_all("Session shutting down");
        if cancelled > 0 {
            info!(count = cancelled, "Cancelled running calls for shutdown");
        }
        if tokio::time::timeout(self.config.drain_timeout(), self.execution.wait_drained())
            .await
            .is_err()
        {
            warn!("Shutdown drain timed out with calls still running");
        }
        self.streaming.clear();

        *self.state.write().expect("session state lock poisoned") = SessionState::Closed;
        info!("Session closed");
        to_value(ShutdownResult {
            status: "ok".to_string(),
        })
    }

    fn set_workspace(&self, params: SetWorkspaceParams) -> Result<Value, ProtocolError> {
        let name = params.name.clone();
        let constraint = SafetyConstraint::new(
            params.name,
            ConstraintParams::from(params.bounds),
            ViolationAction::Reject,
        )
        .with_priority(WORKSPACE_CONSTRAINT_PRIORITY);
        self.constraints
            .write()
            .expect("constraint lock poisoned")
            .upsert(constraint);
        info!(workspace = %name, objects = params.objects.len(), "Workspace installed");
        Ok(json!({"status": "ok", "workspace": name}))
    }

    /// Ask the counterparty for a plan toward `goal`. Requires the
    /// negotiated planning capability.
    pub async fn request_plan(&self, params: RequestPlanParams) -> Result<PlanResult, ProtocolError> {
        self.require_ready()?;
        let planning = self
            .negotiated
            .lock()
            .expect("negotiated lock poisoned")
            .map(|caps| caps.planning)
            .unwrap_or(false);
        if !planning {
            return Err(ProtocolError::invalid_params(
                "Planning capability not negotiated",
            ));
        }

        let params = serde_json::to_value(&params)
            .map_err(|err| ProtocolError::invalid_params(err.to_string()))?;
        let (request, rx) = self.correlator.register(method_names::REQUEST_PLAN, params);
        let request_id = request.id.clone();
        self.outbound
            .send(OutboundMessage::Request(request))
            .await
            .map_err(|err| ProtocolError::invalid_params(format!("Plan request not sent: {err}")))?;

        match tokio::time::timeout(self.config.plan_timeout(), rx).await {
            Ok(Ok(response)) => match (response.result, response.error) {
                (Some(result), _) => serde_json::from_value(result)
                    .map_err(|err| ProtocolError::invalid_params(format!("Malformed plan: {err}"))),
                (None, Some(error)) => Err(ProtocolError::new(
                    robolink_domain::ErrorCode::from_i32(error.code)
                        .unwrap_or(robolink_domain::ErrorCode::InvalidParams),
                    error.message,
                )),
                (None, None) => Err(ProtocolError::invalid_params("Empty plan response")),
            },
            Ok(Err(_)) => Err(ProtocolError::invalid_params("Session closing")),
            Err(_) => {
                self.correlator.forget(&request_id);
                Err(ProtocolError::invalid_params("Plan request timed out"))
            }
        }
    }

    fn require_ready(&self) -> Result<(), ProtocolError> {
        let state = self.state();
        if state.accepts_operations() {
            Ok(())
        } else {
            Err(ProtocolError::not_initialized())
        }
    }
}

fn parse<T: DeserializeOwned>(params: Value) -> Result<T, ProtocolError> {
    serde_json::from_value(params).map_err(|err| ProtocolError::invalid_params(err.to_string()))
}

fn to_value<T: serde::Serialize>(value: T) -> Result<Value, ProtocolError> {
    serde_json::to_value(value).map_err(|err| ProtocolError::invalid_params(err.to_string()))
}

/// Wires catalog, handlers, constraints, context sources, and engines into
/// a ready [`ProtocolSession`].
pub struct ProtocolSessionBuilder {
    server_info: ServerInfo,
    capabilities: Capabilities,
    config: EngineConfig,
    catalog: ToolCatalog,
    handlers: HandlerRegistry,
    constraints: ConstraintSet,
    robot_state: RobotState,
    sources: Vec<(ContextSource, Option<Arc<dyn ContextProviderPort>>)>,
}

impl ProtocolSessionBuilder {
    pub fn new(server_info: ServerInfo) -> Self {
        Self {
            server_info,
            capabilities: Capabilities::default(),
            config: EngineConfig::default(),
            catalog: ToolCatalog::new(),
            handlers: HandlerRegistry::new(),
            constraints: ConstraintSet::new(),
            robot_state: RobotState::new(),
            sources: Vec::new(),
        }
    }

    pub fn capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Register one tool with its handler.
    pub fn tool(mut self, definition: ToolDefinition, handler: Arc<dyn ToolHandlerPort>) -> Self {
        self.handlers.register(definition.name.clone(), handler);
        self.catalog = self.catalog.register(definition);
        self
    }

    pub fn constraint(mut self, constraint: SafetyConstraint) -> Self {
        self.constraints.upsert(constraint);
        self
    }

    pub fn robot_state(mut self, state: RobotState) -> Self {
        self.robot_state = state;
        self
    }

    /// Declare a push-only context source.
    pub fn context_source(mut self, source: ContextSource) -> Self {
        self.sources.push((source, None));
        self
    }

    /// Declare a context source polled from a provider.
    pub fn provided_context_source(
        mut self,
        source: ContextSource,
        provider: Arc<dyn ContextProviderPort>,
    ) -> Self {
        self.sources.push((source, Some(provider)));
        self
    }

    pub fn build(self, outbound: Arc<dyn OutboundPort>) -> Arc<ProtocolSession> {
        let correlator = Arc::new(OutboundRequests::new());
        let confirmations = Arc::new(ConfirmationWorkflow::new(
            outbound.clone(),
            correlator.clone(),
            &self.config,
        ));
        let constraints = Arc::new(RwLock::new(self.constraints));
        let robot_state = Arc::new(RwLock::new(self.robot_state));
        let estop = Arc::new(EmergencyStopCoordinator::new());

        let execution = Arc::new(ToolExecutionEngine::new(
            self.catalog,
            self.handlers,
            constraints.clone(),
            robot_state.clone(),
            estop,
            confirmations,
            outbound.clone(),
        ));

        let mut streaming = ContextStreamManager::new(outbound.clone(), &self.config);
        for (source, provider) in self.sources {
            match provider {
                Some(provider) => streaming.add_provided_source(source, provider),
                None => streaming.add_source(source),
            }
        }

        Arc::new(ProtocolSession {
            state: RwLock::new(SessionState::Uninitialized),
            server_info: self.server_info,
            capabilities: self.capabilities,
            negotiated: Mutex::new(None),
            client: Mutex::new(None),
            execution,
            streaming: Arc::new(streaming),
            constraints,
            correlator,
            outbound,
            config: self.config,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::outbound::OutboundError;
    use crate::ports::tool_handler::{Progress, ProgressSender};
    use async_trait::async_trait;
    use robolink_domain::{SafetyLevel, SafetyMetadata};
    use serde_json::json;
    use tokio_util::sync::CancellationToken;

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

    struct EchoHandler;

    #[async_trait]
    impl crate::ports::tool_handler::ToolHandlerPort for EchoHandler {
        async fn execute(
            &self,
            arguments: Value,
            progress: ProgressSender,
            _cancel: CancellationToken,
        ) -> Result<Value, String> {
            let _ = progress.send(Progress::at(1.0));
            Ok(json!({"echo": arguments}))
        }
    }

    fn make_session() -> (Arc<ProtocolSession>, Arc<RecordingOutbound>) {
        let outbound = Arc::new(RecordingOutbound::default());
        let session = ProtocolSession::builder(ServerInfo {
            name: "test-arm".to_string(),
            version: "1.0.0".to_string(),
            robot_model: Some("UR5e".to_string()),
            robot_type: Some("arm".to_string()),
        })
        .tool(
            ToolDefinition::new(
                "move_to",
                "Move the arm",
                SafetyMetadata::new(SafetyLevel::Normal),
            ),
            Arc::new(EchoHandler),
        )
        .context_source(ContextSource::new(
            "odometry",
            "Robot odometry",
            robolink_domain::ContextDataType::Pose,
        ))
        .constraint(SafetyConstraint::new(
            "max_speed",
            ConstraintParams::VelocityLimit {
                max_linear: 1.0,
                max_angular: None,
            },
            ViolationAction::Reject,
        ))
        .build(outbound.clone());
        (session, outbound)
    }

    fn initialize_request(id: i64) -> Request {
        Request::new(
            id,
            method_names::INITIALIZE,
            json!({
                "protocolVersion": PROTOCOL_VERSION,
                "clientInfo": {"name": "test-agent", "version": "0.1.0"},
                "capabilities": {"planning": true},
            }),
        )
    }

    async fn initialized_session() -> (Arc<ProtocolSession>, Arc<RecordingOutbound>) {
        let (session, outbound) = make_session();
        let response = session.dispatch(initialize_request(1)).await;
        assert!(response.is_success());
        (session, outbound)
    }

    #[tokio::test]
    async fn test_initialize_handshake() {
        let (session, _outbound) = make_session();
        assert_eq!(session.state(), SessionState::Uninitialized);

        let response = session.dispatch(initialize_request(1)).await;
        let result = response.result.unwrap();
        assert_eq!(result["protocolVersion"], json!(PROTOCOL_VERSION));
        assert_eq!(result["serverInfo"]["robotModel"], json!("UR5e"));
        // Planning stays off: the server side did not offer it.
        assert_eq!(result["capabilities"]["planning"], json!(false));
        assert_eq!(session.state(), SessionState::Initialized);
    }

    #[tokio::test]
    async fn test_double_initialize_rejected() {
        let (session, _outbound) = initialized_session().await;
        let response = session.dispatch(initialize_request(2)).await;
        assert_eq!(response.error.unwrap().code, -32602);
    }

    #[tokio::test]
    async fn test_operations_require_initialize() {
        let (session, _outbound) = make_session();
        let response = session
            .dispatch(Request::new(1, method_names::LIST_TOOLS, json!({})))
            .await;
        assert_eq!(response.error.unwrap().code, -40009);
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let (session, _outbound) = initialized_session().await;
        let response = session
            .dispatch(Request::new(2, "arp.teleport", json!({})))
            .await;
        assert_eq!(response.error.unwrap().code, -32601);
    }

    #[tokio::test]
    async fn test_malformed_params() {
        let (session, _outbound) = initialized_session().await;
        let response = session
            .dispatch(Request::new(2, method_names::CALL_TOOL, json!({"bogus": 1})))
            .await;
        assert_eq!(response.error.unwrap().code, -32602);
    }

    #[tokio::test]
    async fn test_list_tools_and_call_flow() {
        let (session, _outbound) = initialized_session().await;

        let response = session
            .dispatch(Request::new(2, method_names::LIST_TOOLS, json!({})))
            .await;
        let tools = response.result.unwrap();
        assert_eq!(tools["tools"][0]["name"], json!("move_to"));

        let response = session
            .dispatch(Request::new(
                3,
                method_names::CALL_TOOL,
                json!({"name": "move_to", "arguments": {"target": [0.1, 0.2, 0.3]}}),
            ))
            .await;
        let ack = response.result.unwrap();
        assert_eq!(ack["state"], json!("running"));
        assert!(ack["callId"].as_str().is_some());
    }

    #[tokio::test]
    async fn test_safety_violation_surfaces_through_dispatch() {
        let (session, _outbound) = initialized_session().await;
        let response = session
            .dispatch(Request::new(
                2,
                method_names::CALL_TOOL,
                json!({"name": "move_to", "arguments": {"velocity": 9.0}}),
            ))
            .await;
        let error = response.error.unwrap();
        assert_eq!(error.code, -40001);
        assert_eq!(error.data.unwrap()["constraint"], json!("max_speed"));
    }

    #[tokio::test]
    async fn test_context_subscribe_roundtrip() {
        let (session, _outbound) = initialized_session().await;

        let response = session
            .dispatch(Request::new(
                2,
                method_names::SUBSCRIBE_CONTEXT,
                json!({"source": "odometry", "maxRate": 5.0}),
            ))
            .await;
        let sub_id = response.result.unwrap()["subscriptionId"]
            .as_str()
            .unwrap()
            .to_string();

        let response = session
            .dispatch(Request::new(
                3,
                method_names::UNSUBSCRIBE_CONTEXT,
                json!({"subscriptionId": sub_id}),
            ))
            .await;
        assert!(response.is_success());
    }

    #[tokio::test]
    async fn test_constraint_queries_and_workspace() {
        let (session, _outbound) = initialized_session().await;

        let response = session
            .dispatch(Request::new(2, method_names::LIST_CONSTRAINTS, json!({})))
            .await;
        let constraints = response.result.unwrap();
        assert_eq!(constraints["constraints"][0]["name"], json!("max_speed"));

        let response = session
            .dispatch(Request::new(
                3,
                method_names::SET_WORKSPACE,
                json!({
                    "name": "bench",
                    "bounds": {"min": [-1.0, -1.0, 0.0], "max": [1.0, 1.0, 1.5]},
                }),
            ))
            .await;
        assert!(response.is_success());

        let response = session
            .dispatch(Request::new(
                4,
                method_names::GET_CONSTRAINT,
                json!({"name": "bench"}),
            ))
            .await;
        assert_eq!(response.result.unwrap()["type"], json!("workspace_bound"));

        let response = session
            .dispatch(Request::new(
                5,
                method_names::GET_CONSTRAINT,
                json!({"name": "nope"}),
            ))
            .await;
        assert_eq!(response.error.unwrap().code, -32602);
    }

    #[tokio::test]
    async fn test_estop_notification_blocks_calls() {
        let (session, _outbound) = initialized_session().await;

        session
            .dispatch_notification(Notification::new(
                method_names::EMERGENCY_STOP,
                json!({"reason": "operator pressed the button"}),
            ))
            .await;
        assert!(session.estop_status().active);

        let response = session
            .dispatch(Request::new(
                2,
                method_names::CALL_TOOL,
                json!({"name": "move_to"}),
            ))
            .await;
        assert_eq!(response.error.unwrap().code, -40007);

        session
            .dispatch_notification(Notification::new(method_names::EMERGENCY_CLEAR, json!({})))
            .await;
        assert!(!session.estop_status().active);
    }

    #[tokio::test]
    async fn test_shutdown_closes_session() {
        let (session, _outbound) = initialized_session().await;
        let response = session
            .dispatch(Request::new(9, method_names::SHUTDOWN, json!({})))
            .await;
        assert_eq!(response.result.unwrap()["status"], json!("ok"));
        assert_eq!(session.state(), SessionState::Closed);

        // Post-shutdown operations are lifecycle errors.
        let response = session
            .dispatch(Request::new(10, method_names::LIST_TOOLS, json!({})))
            .await;
        assert_eq!(response.error.unwrap().code, -40009);
    }

    #[tokio::test]
    async fn test_request_plan_requires_capability() {
        let (session, _outbound) = make_session();
        // Handshake without the planning capability on the client side.
        session
            .dispatch(Request::new(
                1,
                method_names::INITIALIZE,
                json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "clientInfo": {"name": "agent", "version": "1.0"},
                }),
            ))
            .await;

        let err = session
            .request_plan(RequestPlanParams {
                goal: "stack the blocks".to_string(),
                current_state: None,
                available_tools: vec!["move_to".to_string()],
                constraints: vec![],
            })
            .await
            .unwrap_err();
        assert_eq!(err.code.as_i32(), -32602);
    }

    #[tokio::test]
    async fn test_request_plan_roundtrip() {
        let outbound = Arc::new(RecordingOutbound::default());
        let session = ProtocolSession::builder(ServerInfo {
            name: "test-arm".to_string(),
            version: "1.0.0".to_string(),
            robot_model: None,
            robot_type: None,
        })
        .capabilities(Capabilities {
            planning: true,
            ..Capabilities::default()
        })
        .build(outbound.clone());

        session
            .dispatch(Request::new(
                1,
                method_names::INITIALIZE,
                json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "clientInfo": {"name": "agent", "version": "1.0"},
                    "capabilities": {"planning": true},
                }),
            ))
            .await;

        let planner = session.clone();
        let task = tokio::spawn(async move {
            planner
                .request_plan(RequestPlanParams {
                    goal: "dock".to_string(),
                    current_state: None,
                    available_tools: vec![],
                    constraints: vec![],
                })
                .await
        });

        // Find the outbound plan request and answer it.
        let request = loop {
            let found = outbound.sent.lock().unwrap().iter().find_map(|m| match m {
                OutboundMessage::Request(r) if r.method == method_names::REQUEST_PLAN => {
                    Some(r.clone())
                }
                _ => None,
            });
            if let Some(request) = found {
                break request;
            }
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        };
        session.dispatch_response(Response::success(
            request.id,
            json!({"steps": [{"tool": "move_to", "params": {}}], "reasoning": "one hop"}),
        ));

        let plan = task.await.unwrap().unwrap();
        assert_eq!(plan.steps.len(), 1);
        assert_eq!(plan.steps[0].tool, "move_to");
    }

    #[tokio::test]
    async fn test_call_result_notification_reaches_outbound() {
        let (session, outbound) = initialized_session().await;
        let response = session
            .dispatch(Request::new(
                2,
                method_names::CALL_TOOL,
                json!({"name": "move_to", "arguments": {}}),
            ))
            .await;
        let call_id = response.result.unwrap()["callId"]
            .as_str()
            .unwrap()
            .to_string();

        // Wait for the spawned handler to finish and emit its result.
        let result = loop {
            let found = outbound.sent.lock().unwrap().iter().find_map(|m| match m {
                OutboundMessage::Notification(n) if n.method == method_names::TOOL_RESULT => {
                    Some(n.params.clone())
                }
                _ => None,
            });
            if let Some(params) = found {
                break params;
            }
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        };
        assert_eq!(result["callId"], json!(call_id));
        assert_eq!(result["state"], json!("completed"));
    }
}
