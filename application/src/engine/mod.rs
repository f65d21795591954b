//! Protocol engine components.

pub mod confirmation;
pub mod correlation;
pub mod estop;
pub mod execution;
pub mod session;
pub mod streaming;

pub use confirmation::ConfirmationWorkflow;
pub use correlation::OutboundRequests;
pub use estop::{EmergencyStopCoordinator, EstopStatus};
pub use execution::ToolExecutionEngine;
pub use session::{ProtocolSession, ProtocolSessionBuilder};
pub use streaming::ContextStreamManager;
