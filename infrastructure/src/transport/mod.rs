//! Transport adapters: frame codec and the in-process channel transport.

pub mod channel;
pub mod codec;

pub use channel::{ChannelOutbound, MessageRouter};
pub use codec::{FrameKind, InboundMessage, classify_frame, decode_frame, encode_frame};
