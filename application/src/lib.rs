//! Application layer for robolink
//!
//! Hosts the protocol engine: session lifecycle and dispatch, tool call
//! execution, safety-gated admission, emergency stop coordination,
//! confirmation workflow, and context streaming. Infrastructure adapters
//! plug in through the ports module; this crate never touches a socket or
//! an encoding.

pub mod config;
pub mod engine;
pub mod ports;

pub use config::EngineConfig;
pub use engine::{
    ConfirmationWorkflow, ContextStreamManager, EmergencyStopCoordinator, EstopStatus,
    OutboundRequests, ProtocolSession, ProtocolSessionBuilder, ToolExecutionEngine,
};
pub use ports::{
    ContextProviderPort, HandlerRegistry, OutboundError, OutboundPort, Progress, ProgressSender,
    ToolHandlerPort,
};
