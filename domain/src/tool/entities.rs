//! Tool domain entities
//!
//! A [`ToolDefinition`] describes one physical action the robot can take,
//! including its [`SafetyMetadata`] and declared preconditions. Definitions
//! are immutable once registered in the [`ToolCatalog`].

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Safety level of a tool operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SafetyLevel {
    /// Routine operations (e.g., move within workspace, read state)
    Normal,
    /// Operations with meaningful physical consequences (e.g., grasping)
    Elevated,
    /// Operations that can cause harm (e.g., powered cutting tools)
    Critical,
}

impl SafetyLevel {
    pub fn as_str(&self) -> &str {
        match self {
            SafetyLevel::Normal => "normal",
            SafetyLevel::Elevated => "elevated",
            SafetyLevel::Critical => "critical",
        }
    }
}

impl std::fmt::Display for SafetyLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Safety classification attached to a tool definition
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SafetyMetadata {
    /// Risk classification of the operation
    pub level: SafetyLevel,
    /// Whether a human must approve each call before it runs
    #[serde(default)]
    pub requires_confirmation: bool,
    /// Whether the physical effect can be undone
    #[serde(default = "default_true")]
    pub reversible: bool,
    /// Free-form safety notes
    #[serde(default)]
    pub description: String,
}

fn default_true() -> bool {
    true
}

impl SafetyMetadata {
    pub fn new(level: SafetyLevel) -> Self {
        Self {
            level,
            requires_confirmation: false,
            reversible: true,
            description: String::new(),
        }
    }

    pub fn with_confirmation(mut self) -> Self {
        self.requires_confirmation = true;
        self
    }

    pub fn irreversible(mut self) -> Self {
        self.reversible = false;
        self
    }
}

/// Declared precondition on the robot state, checked before admission.
///
/// `operator` is one of `==`, `!=`, `>`, `>=`, `<`, `<=`, `exists`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Condition {
    pub field: String,
    pub operator: String,
    #[serde(default)]
    pub value: serde_json::Value,
}

impl Condition {
    pub fn new(
        field: impl Into<String>,
        operator: impl Into<String>,
        value: serde_json::Value,
    ) -> Self {
        Self {
            field: field.into(),
            operator: operator.into(),
            value,
        }
    }
}

/// Declared effect a successful call has on the robot state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Effect {
    pub field: String,
    pub action: String,
    #[serde(default)]
    pub value: serde_json::Value,
}

/// Definition of a physical tool exposed by the server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    /// Unique name of the tool (e.g., "move_to")
    pub name: String,
    /// Human-readable description
    pub description: String,
    /// JSON schema of the accepted parameters
    #[serde(default)]
    pub parameters: serde_json::Value,
    /// Safety classification
    pub safety: SafetyMetadata,
    /// Preconditions checked against the robot state before admission
    #[serde(default)]
    pub preconditions: Vec<Condition>,
    /// Declared state effects of a successful call
    #[serde(default)]
    pub effects: Vec<Effect>,
    /// Expected execution time in seconds, if known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_duration: Option<f64>,
    /// Whether multiple calls may run concurrently. Non-reentrant tools
    /// reject admission while a call is still running.
    #[serde(default)]
    pub reentrant: bool,
}

impl ToolDefinition {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        safety: SafetyMetadata,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: serde_json::Value::Object(serde_json::Map::new()),
            safety,
            preconditions: Vec::new(),
            effects: Vec::new(),
            estimated_duration: None,
            reentrant: false,
        }
    }

    pub fn with_parameters(mut self, schema: serde_json::Value) -> Self {
        self.parameters = schema;
        self
    }

    pub fn with_precondition(mut self, condition: Condition) -> Self {
        self.preconditions.push(condition);
        self
    }

    pub fn with_estimated_duration(mut self, seconds: f64) -> Self {
        self.estimated_duration = Some(seconds);
        self
    }

    pub fn reentrant(mut self) -> Self {
        self.reentrant = true;
        self
    }

    pub fn requires_confirmation(&self) -> bool {
        self.safety.requires_confirmation
    }
}

/// Registry of tool definitions, owned by the server side.
///
/// Definitions are registered at startup and never mutated afterwards.
#[derive(Debug, Clone, Default)]
pub struct ToolCatalog {
    tools: HashMap<String, ToolDefinition>,
}

impl ToolCatalog {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    pub fn register(mut self, tool: ToolDefinition) -> Self {
        self.tools.insert(tool.name.clone(), tool);
        self
    }

    pub fn get(&self, name: &str) -> Option<&ToolDefinition> {
        self.tools.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn all(&self) -> impl Iterator<Item = &ToolDefinition> {
        self.tools.values()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tools.keys().map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn confirmation_gated(&self) -> impl Iterator<Item = &ToolDefinition> {
        self.tools.values().filter(|t| t.requires_confirmation())
    }
}
