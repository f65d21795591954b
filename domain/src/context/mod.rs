//! Context domain: sensor/state stream descriptions and subscriptions.

pub mod entities;
