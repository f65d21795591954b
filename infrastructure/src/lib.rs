//! Infrastructure layer for robolink
//!
//! This crate contains adapters that implement the ports defined in the
//! application layer: the wire codec and channel transport, configuration
//! file loading, tracing setup, and the simulated robot backend.

pub mod config;
pub mod logging;
pub mod robot;
pub mod transport;

// Re-export commonly used types
pub use config::{ConfigLoader, FileConfig, ServerSection};
pub use logging::init_tracing;
pub use robot::{ArmState, SimulatedArm};
pub use transport::{
    ChannelOutbound, FrameKind, InboundMessage, MessageRouter, classify_frame, decode_frame,
    encode_frame,
};
