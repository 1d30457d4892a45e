//! Deployment target flags

use serde::Deserialize;

const PROD_ENV: &str = "prod";

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct EndpointConfig {
    #[serde(rename = "target-env", default)]
    pub target_env: String,
}

impl EndpointConfig {
    pub fn is_prod(&self) -> bool {
        is_prod(&self.target_env)
    }
}

/// Returns true when `target_env` names the production environment
pub fn is_prod(target_env: &str) -> bool {
    target_env == PROD_ENV
}
