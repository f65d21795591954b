//! Safety constraint entities
//!
//! Constraints are process-wide configuration gating every action before
//! admission. The controlling agent cannot mutate them; enable/disable and
//! add/remove are administrative operations on the [`ConstraintSet`].

use crate::core::geometry::{BoundingBox, CollisionZone};
use serde::{Deserialize, Serialize};

/// Kind of safety constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintType {
    VelocityLimit,
    WorkspaceBound,
    ForceLimit,
    CollisionZone,
    EmergencyStop,
    RateLimit,
}

/// What happens when a constraint is violated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationAction {
    /// Reject the action with a safety-violation error.
    Reject,
    /// Adjust the offending numeric fields to the nearest in-bound value
    /// and keep evaluating.
    Clamp,
    /// Reject and assert the process-wide emergency stop.
    EmergencyStop,
}

/// Type-specific constraint parameters.
///
/// Serialized adjacently as `{"type": ..., "parameters": {...}}` to match
/// the wire shape of constraint listings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "parameters", rename_all = "snake_case")]
pub enum ConstraintParams {
    VelocityLimit {
        max_linear: f64,
        #[serde(skip_serializing_if = "Option::is_none")]
        max_angular: Option<f64>,
    },
    WorkspaceBound {
        min: [f64; 3],
        max: [f64; 3],
        #[serde(default = "default_frame")]
        frame: String,
    },
    ForceLimit {
        max_force: f64,
        #[serde(skip_serializing_if = "Option::is_none")]
        max_torque: Option<f64>,
    },
    CollisionZone {
        zones: Vec<CollisionZone>,
    },
    EmergencyStop,
    RateLimit {
        max_calls_per_second: u32,
    },
}

fn default_frame() -> String {
    "world".to_string()
}

impl ConstraintParams {
    pub fn kind(&self) -> ConstraintType {
        match self {
            ConstraintParams::VelocityLimit { .. } => ConstraintType::VelocityLimit,
            ConstraintParams::WorkspaceBound { .. } => ConstraintType::WorkspaceBound,
            ConstraintParams::ForceLimit { .. } => ConstraintType::ForceLimit,
            ConstraintParams::CollisionZone { .. } => ConstraintType::CollisionZone,
            ConstraintParams::EmergencyStop => ConstraintType::EmergencyStop,
            ConstraintParams::RateLimit { .. } => ConstraintType::RateLimit,
        }
    }
}

/// A protocol-level, non-overridable rule gating action admission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SafetyConstraint {
    pub name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub priority: i32,
    #[serde(flatten)]
    pub params: ConstraintParams,
    pub violation_action: ViolationAction,
}

fn default_enabled() -> bool {
    true
}

impl SafetyConstraint {
    pub fn new(name: impl Into<String>, params: ConstraintParams, action: ViolationAction) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            priority: 0,
            params,
            violation_action: action,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn kind(&self) -> ConstraintType {
        self.params.kind()
    }
}

/// Workspace bound built from a [`BoundingBox`], convenience for the
/// `setWorkspace` path.
impl From<BoundingBox> for ConstraintParams {
    fn from(bounds: BoundingBox) -> Self {
        ConstraintParams::WorkspaceBound {
            min: bounds.min,
            max: bounds.max,
            frame: bounds.frame,
        }
    }
}

/// Process-wide set of safety constraints.
///
/// Evaluation order is descending priority, ties broken by name ascending
/// for determinism.
#[derive(Debug, Clone, Default)]
pub struct ConstraintSet {
    constraints: Vec<SafetyConstraint>,
}

impl ConstraintSet {
    pub fn new() -> Self {
        Self {
            constraints: Vec::new(),
        }
    }

    /// Add or replace a constraint by name (administrative).
    pub fn upsert(&mut self, constraint: SafetyConstraint) {
        if let Some(existing) = self
            .constraints
            .iter_mut()
            .find(|c| c.name == constraint.name)
        {
            *existing = constraint;
        } else {
            self.constraints.push(constraint);
        }
        self.constraints
            .sort_by(|a, b| b.priority.cmp(&a.priority).then(a.name.cmp(&b.name)));
    }

    /// Builder-style registration for startup configuration.
    pub fn with(mut self, constraint: SafetyConstraint) -> Self {
        self.upsert(constraint);
        self
    }

    /// Remove a constraint by name (administrative). Returns it if present.
    pub fn remove(&mut self, name: &str) -> Option<SafetyConstraint> {
        let index = self.constraints.iter().position(|c| c.name == name)?;
        Some(self.constraints.remove(index))
    }

    /// Enable or disable a constraint (administrative). Returns `false` for
    /// an unknown name.
    pub fn set_enabled(&mut self, name: &str, enabled: bool) -> bool {
        match self.constraints.iter_mut().find(|c| c.name == name) {
            Some(c) => {
                c.enabled = enabled;
                true
            }
            None => false,
        }
    }

    pub fn get(&self, name: &str) -> Option<&SafetyConstraint> {
        self.constraints.iter().find(|c| c.name == name)
    }

    /// Enabled constraints in evaluation order.
    pub fn enabled_ordered(&self) -> impl Iterator<Item = &SafetyConstraint> {
        self.constraints.iter().filter(|c| c.enabled)
    }

    /// All constraints, evaluation order, including disabled ones.
    pub fn all(&self) -> impl Iterator<Item = &SafetyConstraint> {
        self.constraints.iter()
    }

    pub fn len(&self) -> usize {
        self.constraints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }
}
