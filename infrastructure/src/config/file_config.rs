//! Configuration file schema.

use robolink_application::EngineConfig;
use robolink_domain::{Capabilities, SafetyConstraint, ServerInfo};
use serde::{Deserialize, Serialize};

/// `[server]` section: identity advertised at initialize.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ServerSection {
    pub name: String,
    pub version: String,
    pub robot_model: Option<String>,
    pub robot_type: Option<String>,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            name: "robolink-server".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            robot_model: None,
            robot_type: None,
        }
    }
}

impl ServerSection {
    pub fn server_info(&self) -> ServerInfo {
        ServerInfo {
            name: self.name.clone(),
            version: self.version.clone(),
            robot_model: self.robot_model.clone(),
            robot_type: self.robot_type.clone(),
        }
    }
}

/// Root of the configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub server: ServerSection,
    pub engine: EngineConfig,
    pub capabilities: Capabilities,
    /// Safety constraints installed at startup.
    pub constraints: Vec<SafetyConstraint>,
}
