//! Context domain entities
//!
//! A [`ContextSource`] is a named stream of sensor/state data; a
//! [`ContextSubscription`] carries one subscriber's rate-limited view of a
//! source. The delivery policy is latest-wins: samples arriving faster than
//! the subscriber's `max_rate` are dropped, never buffered, because a stale
//! sample is worse than a missing one.

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Kind of data a context source produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextDataType {
    Pose,
    Joints,
    Pointcloud,
    Image,
    Imu,
    Custom,
}

/// Static description of one sensor/state stream the server exposes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextSource {
    /// Unique source name (e.g., "odometry")
    pub name: String,
    /// Human-readable description
    pub description: String,
    /// Kind of payload
    pub data_type: ContextDataType,
    /// Coordinate frame the data is expressed in, if spatial
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coordinate_frame: Option<String>,
    /// Nominal production rate in Hz, if known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update_rate: Option<f64>,
    /// Payload schema, if declared
    #[serde(rename = "schema", skip_serializing_if = "Option::is_none")]
    pub schema: Option<serde_json::Value>,
}

impl ContextSource {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        data_type: ContextDataType,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            data_type,
            coordinate_frame: None,
            update_rate: None,
            schema: None,
        }
    }

    pub fn in_frame(mut self, frame: impl Into<String>) -> Self {
        self.coordinate_frame = Some(frame.into());
        self
    }

    pub fn with_update_rate(mut self, hz: f64) -> Self {
        self.update_rate = Some(hz);
        self
    }
}

/// Unique identifier for a context subscription.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(String);

impl SubscriptionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One subscriber's rate-limited attachment to a source.
///
/// Lives from subscribe to unsubscribe (or session close). Rate gating is
/// per subscription: multiple subscribers to the same source are
/// independent and may see different effective rates.
#[derive(Debug, Clone)]
pub struct ContextSubscription {
    pub id: SubscriptionId,
    pub subscriber: String,
    pub source: String,
    /// Maximum delivery rate in Hz.
    pub max_rate: f64,
    last_delivered: Option<Instant>,
}

impl ContextSubscription {
    pub fn new(
        id: SubscriptionId,
        subscriber: impl Into<String>,
        source: impl Into<String>,
        max_rate: f64,
    ) -> Self {
        Self {
            id,
            subscriber: subscriber.into(),
            source: source.into(),
            max_rate,
            last_delivered: None,
        }
    }

    fn min_interval(&self) -> Duration {
        if self.max_rate > 0.0 {
            Duration::from_secs_f64(1.0 / self.max_rate)
        } else {
            Duration::from_secs(1)
        }
    }

    /// Whether a sample arriving at `now` should be delivered. The first
    /// sample always is.
    pub fn should_deliver(&self, now: Instant) -> bool {
        match self.last_delivered {
            None => true,
            Some(last) => now.duration_since(last) >= self.min_interval(),
        }
    }

    /// Record a delivery at `now`.
    pub fn mark_delivered(&mut self, now: Instant) {
        self.last_delivered = Some(now);
    }
}
