//! Core domain primitives: protocol errors and geometry.

pub mod error;
pub mod geometry;
