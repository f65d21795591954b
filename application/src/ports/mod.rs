//! Ports (interfaces) for infrastructure adapters.

pub mod context_provider;
pub mod outbound;
pub mod tool_handler;

pub use context_provider::ContextProviderPort;
pub use outbound::{OutboundError, OutboundPort};
pub use tool_handler::{HandlerRegistry, Progress, ProgressSender, ToolHandlerPort};
