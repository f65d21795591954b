//! Tool domain: definitions, catalog, and the per-call state machine.

pub mod call;
pub mod entities;
