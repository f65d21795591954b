//! Engine tuning knobs.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Timeouts and rates the engine falls back to when the counterparty or
/// the source declaration does not supply its own.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    /// Seconds to wait for an operator verdict on a confirmation-gated call.
    pub confirmation_timeout_secs: f64,
    /// Seconds to wait for a planning response.
    pub plan_timeout_secs: f64,
    /// Milliseconds to wait for running calls to drain during shutdown.
    pub drain_timeout_ms: u64,
    /// Delivery rate (Hz) for subscriptions that name no rate and whose
    /// source declares no nominal rate.
    pub default_context_rate_hz: f64,
    /// Rate (Hz) at which provider sampling loops poll when the source
    /// declares no nominal rate.
    pub default_sample_rate_hz: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            confirmation_timeout_secs: 30.0,
            plan_timeout_secs: 60.0,
            drain_timeout_ms: 5_000,
            default_context_rate_hz: 1.0,
            default_sample_rate_hz: 10.0,
        }
    }
}

impl EngineConfig {
    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.confirmation_timeout_secs.max(0.0))
    }

    pub fn plan_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.plan_timeout_secs.max(0.0))
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }
}
