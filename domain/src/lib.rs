//! Domain layer for robolink
//!
//! This crate contains the protocol's core types, state machines, and the
//! safety evaluation algorithm. It has no dependencies on runtime or
//! transport concerns.
//!
//! # Core Concepts
//!
//! ## Tool Calls
//!
//! One admitted execution of a physical action, tracked through
//! `Running -> Completed | Failed | Cancelled`. Terminal states are
//! immutable and progress is non-decreasing.
//!
//! ## Safety Constraints
//!
//! Non-overridable rules gating every action before admission, evaluated in
//! descending priority order. The first violation's action (reject, clamp,
//! or emergency stop) decides the outcome.
//!
//! ## Emergency Stop
//!
//! A process-wide interrupt. While asserted, no new call is admitted and
//! running calls are cancelled; only an explicit administrative clear
//! resets it.

pub mod confirmation;
pub mod context;
pub mod core;
pub mod protocol;
pub mod safety;
pub mod session;
pub mod tool;

// Re-export commonly used types
pub use confirmation::entities::{ConfirmationId, ConfirmationRequest, ConfirmationResolution};
pub use context::entities::{
    ContextDataType, ContextSource, ContextSubscription, SubscriptionId,
};
pub use core::error::{ErrorCode, ProtocolError};
pub use core::geometry::{BoundingBox, CollisionZone, Pose, Position3D, Quaternion};
pub use protocol::messages::{
    ErrorObject, Notification, OutboundMessage, Request, RequestId, Response,
};
pub use protocol::methods::{
    CallToolAck, CallToolParams, CancelToolParams, Capabilities, ClientInfo,
    ConfirmationResponseParams, ContextUpdateParams, EmergencyStopParams, GetConstraintParams,
    InitializeParams, InitializeResult, ListConstraintsResult, ListContextResult,
    ListToolsResult, PROTOCOL_VERSION, PlanResult, PlanStep, RequestConfirmationParams,
    RequestPlanParams, ServerInfo, SetWorkspaceParams, ShutdownResult, SubscribeContextParams,
    SubscribeContextResult, ToolProgressParams, ToolResultParams, UnsubscribeContextParams,
    WorkspaceObject, names as method_names,
};
pub use safety::constraint::{
    ConstraintParams, ConstraintSet, ConstraintType, SafetyConstraint, ViolationAction,
};
pub use safety::engine::{
    Outcome, ProposedAction, RateWindow, RobotState, evaluate_constraints, precondition_holds,
};
pub use session::state::SessionState;
pub use tool::call::{CallId, ToolCallRecord, ToolState};
pub use tool::entities::{
    Condition, Effect, SafetyLevel, SafetyMetadata, ToolCatalog, ToolDefinition,
};
