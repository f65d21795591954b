//! Session domain: lifecycle state.

pub mod state;
