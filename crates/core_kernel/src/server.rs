//! Server listener configuration

use serde::Deserialize;

/// Network settings for a service's listener
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ServerConfig {
    /// Service name, used in logs and health responses
    pub name: String,
    pub host: String,
    pub port: u16,
    /// Whether the RPC listener advertises its schema to clients
    #[serde(default)]
    pub reflection: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: "service".to_string(),
            host: "0.0.0.0".to_string(),
            port: 8080,
            reflection: false,
        }
    }
}

impl ServerConfig {
    /// Returns the `host:port` address to bind
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
