//! Safety domain: constraint configuration and the evaluation algorithm.

pub mod constraint;
pub mod engine;
