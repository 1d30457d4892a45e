//! User service configuration

use core_kernel::{CoreError, EndpointConfig, KafkaConfig, LoggingConfig, ServerConfig};
use infra_db::DbConfig;
use serde::Deserialize;
use std::path::Path;

/// Complete configuration of the user service
///
/// Loaded from `config.<SERVICE_ENV>.yaml` (or `config.default.yaml`) with
/// `${VAR:-default}` references resolved from the environment.
#[derive(Debug, Clone, Deserialize)]
pub struct UserServiceConfig {
    pub server: ServerConfig,
    pub db: DbConfig,
    #[serde(default)]
    pub endpoint: EndpointConfig,
    #[serde(default)]
    pub kafka: KafkaConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl UserServiceConfig {
    /// Loads configuration from the working directory
    pub fn load() -> Result<Self, CoreError> {
        core_kernel::config::load()
    }

    /// Loads configuration from `dir`
    pub fn load_from(dir: impl AsRef<Path>) -> Result<Self, CoreError> {
        core_kernel::config::load_from(dir)
    }
}
