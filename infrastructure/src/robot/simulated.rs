//! Simulated robot arm.
//!
//! A fully in-process machine backend: handlers for a small tool set, an
//! odometry context provider, and a stock constraint set. Used by the
//! integration tests and as a wiring reference for real robot adapters.

use async_trait::async_trait;
use robolink_application::ports::context_provider::ContextProviderPort;
use robolink_application::ports::tool_handler::{Progress, ProgressSender, ToolHandlerPort};
use robolink_application::{EngineConfig, ProtocolSession, ProtocolSessionBuilder};
use robolink_domain::{
    Capabilities, Condition, ConstraintParams, ConstraintSet, ContextDataType, ContextSource,
    Position3D, RobotState, SafetyConstraint, SafetyLevel, SafetyMetadata, ServerInfo,
    ToolDefinition, ViolationAction,
};
use serde_json::{Value, json};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

const MOVE_STEPS: u32 = 10;

/// Mutable state of the simulated machine.
#[derive(Debug, Clone)]
pub struct ArmState {
    pub position: Position3D,
    pub gripper_open: bool,
    pub holding: Option<String>,
    pub cutter_active: bool,
}

impl Default for ArmState {
    fn default() -> Self {
        Self {
            position: Position3D::default(),
            gripper_open: true,
            holding: None,
            cutter_active: false,
        }
    }
}

/// Simulated arm backend.
///
/// `step_delay` paces motion so cancellation and progress reporting have
/// something to interrupt; tests shrink it.
pub struct SimulatedArm {
    state: Arc<RwLock<ArmState>>,
    step_delay: Duration,
}

impl SimulatedArm {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(ArmState::default())),
            step_delay: Duration::from_millis(100),
        }
    }

    pub fn with_step_delay(mut self, delay: Duration) -> Self {
        self.step_delay = delay;
        self
    }

    pub fn state(&self) -> ArmState {
        self.state.read().expect("arm state lock poisoned").clone()
    }

    /// Tool definitions with their handlers.
    pub fn tools(&self) -> Vec<(ToolDefinition, Arc<dyn ToolHandlerPort>)> {
        vec![
            (
                ToolDefinition::new(
                    "move_to",
                    "Move the end effector to a cartesian target",
                    SafetyMetadata::new(SafetyLevel::Normal),
                )
                .with_parameters(json!({
                    "type": "object",
                    "properties": {
                        "target": {"type": "array", "items": {"type": "number"}},
                        "velocity": {"type": "number"},
                    },
                    "required": ["target"],
                }))
                .with_estimated_duration(1.0),
                Arc::new(MoveToHandler {
                    state: self.state.clone(),
                    step_delay: self.step_delay,
                }),
            ),
            (
                ToolDefinition::new(
                    "grip",
                    "Open or close the gripper",
                    SafetyMetadata::new(SafetyLevel::Normal),
                )
                .with_parameters(json!({
                    "type": "object",
                    "properties": {"open": {"type": "boolean"}},
                    "required": ["open"],
                })),
                Arc::new(GripHandler {
                    state: self.state.clone(),
                }),
            ),
            (
                ToolDefinition::new(
                    "pick_up",
                    "Pick up a named object at the current position",
                    SafetyMetadata::new(SafetyLevel::Elevated),
                )
                .with_parameters(json!({
                    "type": "object",
                    "properties": {"object": {"type": "string"}},
                    "required": ["object"],
                }))
                .with_precondition(Condition::new("gripper_empty", "==", json!(true))),
                Arc::new(PickUpHandler {
                    state: self.state.clone(),
                    step_delay: self.step_delay,
                }),
            ),
            (
                ToolDefinition::new(
                    "activate_cutter",
                    "Run the cutting head for one cycle",
                    SafetyMetadata::new(SafetyLevel::Critical)
                        .with_confirmation()
                        .irreversible(),
                )
                .with_estimated_duration(2.0),
                Arc::new(CutterHandler {
                    state: self.state.clone(),
                    step_delay: self.step_delay,
                }),
            ),
        ]
    }

    /// Odometry source sampled from the arm state.
    pub fn odometry(&self) -> (ContextSource, Arc<dyn ContextProviderPort>) {
        (
            ContextSource::new("odometry", "End effector pose and gripper state", ContextDataType::Pose)
                .in_frame("world")
                .with_update_rate(10.0),
            Arc::new(OdometryProvider {
                state: self.state.clone(),
            }),
        )
    }

    /// Stock constraint set for the simulated cell.
    pub fn default_constraints() -> ConstraintSet {
        ConstraintSet::new()
            .with(
                SafetyConstraint::new(
                    "emergency_stop",
                    ConstraintParams::EmergencyStop,
                    ViolationAction::Reject,
                )
                .with_priority(1_000),
            )
            .with(
                SafetyConstraint::new(
                    "workspace",
                    ConstraintParams::WorkspaceBound {
                        min: [-1.0, -1.0, 0.0],
                        max: [1.0, 1.0, 1.5],
                        frame: "world".to_string(),
                    },
                    ViolationAction::Reject,
                )
                .with_priority(100),
            )
            .with(
                SafetyConstraint::new(
                    "max_speed",
                    ConstraintParams::VelocityLimit {
                        max_linear: 1.5,
                        max_angular: Some(3.14),
                    },
                    ViolationAction::Clamp,
                )
                .with_priority(50),
            )
            .with(
                SafetyConstraint::new(
                    "call_throttle",
                    ConstraintParams::RateLimit {
                        max_calls_per_second: 20,
                    },
                    ViolationAction::Reject,
                )
                .with_priority(10),
            )
    }

    /// Initial robot state the precondition gates read.
    pub fn initial_robot_state() -> RobotState {
        RobotState::new().with("gripper_empty", json!(true))
    }

    /// A fully wired session builder for this arm.
    pub fn session_builder(&self, config: EngineConfig) -> ProtocolSessionBuilder {
        let (odometry_source, odometry_provider) = self.odometry();
        let mut builder = ProtocolSession::builder(ServerInfo {
            name: "robolink-sim".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            robot_model: Some("sim-arm-6dof".to_string()),
            robot_type: Some("arm".to_string()),
        })
        .capabilities(Capabilities {
            confirmation: true,
            ..Capabilities::default()
        })
        .config(config)
        .robot_state(Self::initial_robot_state())
        .provided_context_source(odometry_source, odometry_provider);

        for constraint in Self::default_constraints().all().cloned() {
            builder = builder.constraint(constraint);
        }
        for (definition, handler) in self.tools() {
            builder = builder.tool(definition, handler);
        }
        builder
    }
}

impl Default for SimulatedArm {
    fn default() -> Self {
        Self::new()
    }
}

struct MoveToHandler {
    state: Arc<RwLock<ArmState>>,
    step_delay: Duration,
}

#[async_trait]
impl ToolHandlerPort for MoveToHandler {
    async fn execute(
        &self,
        arguments: Value,
        progress: ProgressSender,
        cancel: CancellationToken,
    ) -> Result<Value, String> {
        let target = parse_target(&arguments)?;
        let start = self
            .state
            .read()
            .expect("arm state lock poisoned")
            .position;

        for step in 1..=MOVE_STEPS {
            tokio::select! {
                _ = cancel.cancelled() => return Err("Motion interrupted".to_string()),
                _ = tokio::time::sleep(self.step_delay) => {}
            }
            let t = step as f64 / MOVE_STEPS as f64;
            let position = Position3D::new(
                start.x + (target.x - start.x) * t,
                start.y + (target.y - start.y) * t,
                start.z + (target.z - start.z) * t,
            );
            self.state.write().expect("arm state lock poisoned").position = position;
            let _ = progress.send(Progress::with_message(
                t,
                format!("waypoint {step}/{MOVE_STEPS}"),
            ));
        }

        debug!(x = target.x, y = target.y, z = target.z, "Motion complete");
        Ok(json!({"position": [target.x, target.y, target.z]}))
    }
}

struct GripHandler {
    state: Arc<RwLock<ArmState>>,
}

#[async_trait]
impl ToolHandlerPort for GripHandler {
    async fn execute(
        &self,
        arguments: Value,
        _progress: ProgressSender,
        _cancel: CancellationToken,
    ) -> Result<Value, String> {
        let open = arguments
            .get("open")
            .and_then(Value::as_bool)
            .ok_or_else(|| "Missing boolean argument 'open'".to_string())?;

        let mut state = self.state.write().expect("arm state lock poisoned");
        state.gripper_open = open;
        if open {
            state.holding = None;
        }
        Ok(json!({"gripperOpen": open}))
    }
}

struct PickUpHandler {
    state: Arc<RwLock<ArmState>>,
    step_delay: Duration,
}

#[async_trait]
impl ToolHandlerPort for PickUpHandler {
    async fn execute(
        &self,
        arguments: Value,
        progress: ProgressSender,
        cancel: CancellationToken,
    ) -> Result<Value, String> {
        let object = arguments
            .get("object")
            .and_then(Value::as_str)
            .ok_or_else(|| "Missing string argument 'object'".to_string())?
            .to_string();

        let _ = progress.send(Progress::with_message(0.3, "approaching"));
        tokio::select! {
            _ = cancel.cancelled() => return Err("Pick interrupted".to_string()),
            _ = tokio::time::sleep(self.step_delay) => {}
        }

        let mut state = self.state.write().expect("arm state lock poisoned");
        if state.holding.is_some() {
            return Err("Gripper already holding an object".to_string());
        }
        state.gripper_open = false;
        state.holding = Some(object.clone());
        let _ = progress.send(Progress::with_message(0.9, "grasped"));
        Ok(json!({"holding": object}))
    }
}

struct CutterHandler {
    state: Arc<RwLock<ArmState>>,
    step_delay: Duration,
}

#[async_trait]
impl ToolHandlerPort for CutterHandler {
    async fn execute(
        &self,
        _arguments: Value,
        progress: ProgressSender,
        cancel: CancellationToken,
    ) -> Result<Value, String> {
        self.state
            .write()
            .expect("arm state lock poisoned")
            .cutter_active = true;
        let _ = progress.send(Progress::with_message(0.5, "cutting"));

        let outcome = tokio::select! {
            _ = cancel.cancelled() => Err("Cut interrupted".to_string()),
            _ = tokio::time::sleep(self.step_delay) => Ok(json!({"cut": "complete"})),
        };

        // The blade always spins down, even on interruption.
        self.state
            .write()
            .expect("arm state lock poisoned")
            .cutter_active = false;
        outcome
    }
}

struct OdometryProvider {
    state: Arc<RwLock<ArmState>>,
}

#[async_trait]
impl ContextProviderPort for OdometryProvider {
    async fn sample(&self) -> Result<Value, String> {
        let state = self.state.read().expect("arm state lock poisoned");
        Ok(json!({
            "position": [state.position.x, state.position.y, state.position.z],
            "gripperOpen": state.gripper_open,
            "holding": state.holding,
        }))
    }
}

fn parse_target(arguments: &Value) -> Result<Position3D, String> {
    let coords = arguments
        .get("target")
        .and_then(Value::as_array)
        .ok_or_else(|| "Missing array argument 'target'".to_string())?;
    if coords.len() != 3 {
        return Err("Argument 'target' must be [x, y, z]".to_string());
    }
    let mut xyz = [0.0_f64; 3];
    for (slot, value) in xyz.iter_mut().zip(coords) {
        *slot = value
            .as_f64()
            .ok_or_else(|| "Argument 'target' must contain numbers".to_string())?;
    }
    Ok(Position3D::from(xyz))
}
