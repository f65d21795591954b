//! Context provider port
//!
//! Supplies fresh samples for one declared context source (pose, joint
//! state, sensor readings). The streaming manager polls providers at the
//! source's nominal rate and fans samples out to subscribers.

use async_trait::async_trait;
use serde_json::Value;

/// Port for sampling one context source.
#[async_trait]
pub trait ContextProviderPort: Send + Sync {
    /// Produce the current sample for this source.
    ///
    /// Errors are logged and the sample is skipped; the sampling loop
    /// keeps running.
    async fn sample(&self) -> Result<Value, String>;
}
