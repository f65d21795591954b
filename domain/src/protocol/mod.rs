//! Protocol domain: message envelopes and method surface.

pub mod messages;
pub mod methods;
