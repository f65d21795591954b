//! Confirmation domain: the human-in-the-loop approval gate.

pub mod entities;
