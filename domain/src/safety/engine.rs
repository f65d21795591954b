//! Safety constraint evaluation
//!
//! The single authority every action passes through before admission.
//! [`evaluate_constraints`] is a pure function of the proposed action, the
//! robot state, the constraint set, and two pieces of engine-owned state
//! passed in explicitly: the emergency-stop flag and the per-tool
//! [`RateWindow`]. Nothing here can be bypassed or overridden by the
//! requesting party.

use crate::core::geometry::CollisionZone;
use crate::safety::constraint::{ConstraintParams, ConstraintSet, ViolationAction};
use crate::tool::entities::Condition;
use serde_json::Value;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// An action proposed for admission: tool name plus its parameters.
///
/// The numeric accessors read the conventional parameter names the
/// reference tools use (`target`, `velocity`/`speed`, `angular_velocity`,
/// `force`, `torque`); actions without a given field simply don't trigger
/// the corresponding constraint predicates.
#[derive(Debug, Clone, PartialEq)]
pub struct ProposedAction {
    pub tool: String,
    pub params: Value,
}

impl ProposedAction {
    pub fn new(tool: impl Into<String>, params: Value) -> Self {
        Self {
            tool: tool.into(),
            params,
        }
    }

    pub fn target(&self) -> Option<[f64; 3]> {
        let arr = self.params.get("target")?.as_array()?;
        if arr.len() < 3 {
            return None;
        }
        Some([arr[0].as_f64()?, arr[1].as_f64()?, arr[2].as_f64()?])
    }

    fn numeric(&self, key: &str) -> Option<f64> {
        self.params.get(key)?.as_f64()
    }

    pub fn linear_velocity(&self) -> Option<f64> {
        self.numeric("velocity").or_else(|| self.numeric("speed"))
    }

    pub fn angular_velocity(&self) -> Option<f64> {
        self.numeric("angular_velocity")
    }

    pub fn force(&self) -> Option<f64> {
        self.numeric("force")
    }

    pub fn torque(&self) -> Option<f64> {
        self.numeric("torque")
    }

    fn set_numeric(&mut self, key: &str, value: f64) {
        if let Some(obj) = self.params.as_object_mut() {
            obj.insert(key.to_string(), Value::from(value));
        }
    }

    fn set_target(&mut self, target: [f64; 3]) {
        if let Some(obj) = self.params.as_object_mut() {
            obj.insert("target".to_string(), serde_json::json!(target));
        }
    }
}

/// Snapshot of the robot state, a flat field map supplied by the hosting
/// application. Preconditions and constraint predicates read from it.
#[derive(Debug, Clone, Default)]
pub struct RobotState {
    fields: HashMap<String, Value>,
}

impl RobotState {
    pub fn new() -> Self {
        Self {
            fields: HashMap::new(),
        }
    }

    pub fn set(&mut self, field: impl Into<String>, value: Value) {
        self.fields.insert(field.into(), value);
    }

    pub fn with(mut self, field: impl Into<String>, value: Value) -> Self {
        self.set(field, value);
        self
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }
}

/// Whether a declared precondition holds against the current robot state.
pub fn precondition_holds(condition: &Condition, state: &RobotState) -> bool {
    let actual = state.get(&condition.field);
    match condition.operator.as_str() {
        "exists" => actual.is_some(),
        "==" => actual == Some(&condition.value),
        "!=" => actual != Some(&condition.value),
        ">" | ">=" | "<" | "<=" => {
            let (Some(a), Some(b)) = (
                actual.and_then(Value::as_f64),
                condition.value.as_f64(),
            ) else {
                return false;
            };
            match condition.operator.as_str() {
                ">" => a > b,
                ">=" => a >= b,
                "<" => a < b,
                _ => a <= b,
            }
        }
        // Unknown operators fail closed
        _ => false,
    }
}

/// Outcome of evaluating a proposed action against the constraint set.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// No constraint violated; admit the action as proposed.
    Allow,
    /// A reject-action constraint was violated.
    Reject { constraint: String, reason: String },
    /// One or more clamp-action constraints adjusted the action; the
    /// clamped action passed everything else.
    Clamp {
        action: ProposedAction,
        constraints: Vec<String>,
    },
    /// An emergency-stop-action constraint was violated; the coordinator
    /// must be signalled.
    EmergencyStop { constraint: String, reason: String },
}

/// Trailing-window admission counter per tool, backing `rate_limit`
/// constraints. Owned by the engine; passed into evaluation by reference.
#[derive(Debug, Default)]
pub struct RateWindow {
    admissions: HashMap<String, Vec<Instant>>,
}

const RATE_WINDOW: Duration = Duration::from_secs(1);

impl RateWindow {
    pub fn new() -> Self {
        Self {
            admissions: HashMap::new(),
        }
    }

    /// Record an admission of `tool` at `now`.
    pub fn record(&mut self, tool: &str, now: Instant) {
        let entries = self.admissions.entry(tool.to_string()).or_default();
        entries.retain(|t| now.duration_since(*t) < RATE_WINDOW);
        entries.push(now);
    }

    /// Admissions of `tool` within the trailing window ending at `now`.
    pub fn count(&self, tool: &str, now: Instant) -> usize {
        self.admissions
            .get(tool)
            .map(|entries| {
                entries
                    .iter()
                    .filter(|t| now.duration_since(**t) < RATE_WINDOW)
                    .count()
            })
            .unwrap_or(0)
    }
}

/// Evaluate a proposed action against the enabled constraints.
///
/// Constraints are visited in descending priority order (ties by name
/// ascending). The first violation's action decides:
///
/// - `reject` short-circuits with [`Outcome::Reject`];
/// - `clamp` adjusts only the offending numeric fields to the nearest
///   in-bound value and evaluation continues against the clamped action;
/// - `emergency_stop` short-circuits with [`Outcome::EmergencyStop`].
///
/// An `emergency_stop`-type constraint is always violated while
/// `estop_active` is set, so it blocks all admission as long as it outranks
/// (or shares the set with) every other constraint.
pub fn evaluate_constraints(
    action: &ProposedAction,
    _state: &RobotState,
    constraints: &ConstraintSet,
    estop_active: bool,
    rate: &RateWindow,
    now: Instant,
) -> Outcome {
    let mut current = action.clone();
    let mut clamped_by: Vec<String> = Vec::new();

    for constraint in constraints.enabled_ordered() {
        let violation = check_violation(&current, &constraint.params, estop_active, rate, now);
        let Some(violation) = violation else {
            continue;
        };

        match constraint.violation_action {
            ViolationAction::Reject => {
                return Outcome::Reject {
                    constraint: constraint.name.clone(),
                    reason: violation.reason,
                };
            }
            ViolationAction::EmergencyStop => {
                return Outcome::EmergencyStop {
                    constraint: constraint.name.clone(),
                    reason: violation.reason,
                };
            }
            ViolationAction::Clamp => match violation.clamp {
                Some(adjust) => {
                    adjust(&mut current);
                    clamped_by.push(constraint.name.clone());
                }
                // Not clampable (rate limits, the estop flag): degrade to reject
                None => {
                    return Outcome::Reject {
                        constraint: constraint.name.clone(),
                        reason: violation.reason,
                    };
                }
            },
        }
    }

    if clamped_by.is_empty() {
        Outcome::Allow
    } else {
        Outcome::Clamp {
            action: current,
            constraints: clamped_by,
        }
    }
}

/// A detected violation: the reason, plus how to clamp it when possible.
struct Violation {
    reason: String,
    clamp: Option<Box<dyn FnOnce(&mut ProposedAction)>>,
}

impl Violation {
    fn reject_only(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            clamp: None,
        }
    }

    fn clampable(
        reason: impl Into<String>,
        clamp: impl FnOnce(&mut ProposedAction) + 'static,
    ) -> Self {
        Self {
            reason: reason.into(),
            clamp: Some(Box::new(clamp)),
        }
    }
}

fn check_violation(
    action: &ProposedAction,
    params: &ConstraintParams,
    estop_active: bool,
    rate: &RateWindow,
    now: Instant,
) -> Option<Violation> {
    match params {
        ConstraintParams::VelocityLimit {
            max_linear,
            max_angular,
        } => {
            if let Some(v) = action.linear_velocity()
                && v > *max_linear
            {
                let limit = *max_linear;
                return Some(Violation::clampable(
                    format!("velocity {} exceeds limit {}", v, limit),
                    move |a| a.set_numeric("velocity", limit),
                ));
            }
            if let (Some(w), Some(max_w)) = (action.angular_velocity(), *max_angular)
                && w > max_w
            {
                return Some(Violation::clampable(
                    format!("angular velocity {} exceeds limit {}", w, max_w),
                    move |a| a.set_numeric("angular_velocity", max_w),
                ));
            }
            None
        }
        ConstraintParams::WorkspaceBound { min, max, .. } => {
            let target = action.target()?;
            let inside = (0..3).all(|i| target[i] >= min[i] && target[i] <= max[i]);
            if inside {
                return None;
            }
            let (min, max) = (*min, *max);
            Some(Violation::clampable(
                format!(
                    "target {:?} outside workspace bounds [{:?}, {:?}]",
                    target, min, max
                ),
                move |a| {
                    let mut clamped = target;
                    for i in 0..3 {
                        clamped[i] = clamped[i].clamp(min[i], max[i]);
                    }
                    a.set_target(clamped);
                },
            ))
        }
        ConstraintParams::ForceLimit {
            max_force,
            max_torque,
        } => {
            if let Some(f) = action.force()
                && f > *max_force
            {
                let limit = *max_force;
                return Some(Violation::clampable(
                    format!("force {} exceeds limit {}", f, limit),
                    move |a| a.set_numeric("force", limit),
                ));
            }
            if let (Some(t), Some(max_t)) = (action.torque(), *max_torque)
                && t > max_t
            {
                return Some(Violation::clampable(
                    format!("torque {} exceeds limit {}", t, max_t),
                    move |a| a.set_numeric("torque", max_t),
                ));
            }
            None
        }
        ConstraintParams::CollisionZone { zones } => {
            let target = action.target()?;
            let zone = zones.iter().find(|z| z.intersects(&target))?;
            let zone: CollisionZone = zone.clone();
            Some(Violation::clampable(
                format!(
                    "target {:?} intersects collision zone '{}' (center {:?}, radius {})",
                    target, zone.name, zone.center, zone.radius
                ),
                move |a| {
                    let pushed = zone.push_out(&target);
                    a.set_target(pushed);
                },
            ))
        }
        ConstraintParams::EmergencyStop => {
            if estop_active {
                Some(Violation::reject_only("emergency stop asserted"))
            } else {
                None
            }
        }
        ConstraintParams::RateLimit {
            max_calls_per_second,
        } => {
            let count = rate.count(&action.tool, now);
            if count >= *max_calls_per_second as usize {
                Some(Violation::reject_only(format!(
                    "{} calls to '{}' within the last second exceeds limit {}",
                    count, action.tool, max_calls_per_second
                )))
            } else {
                None
            }
        }
    }
}
