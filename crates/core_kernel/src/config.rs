//! YAML configuration loading
//!
//! Services keep their configuration in `config.<env>.yaml` files next to the
//! binary's working directory. Loading works in four steps:
//!
//! 1. `.env` is loaded into the process environment (a missing file is fine).
//! 2. `SERVICE_ENV` selects `config.<SERVICE_ENV>.yaml`; when the variable is
//!    unset or the file does not exist, `config.default.yaml` is used.
//! 3. Environment references in the file are replaced:
//!    `${VAR}` becomes the value of `VAR` (empty when unset) and
//!    `${VAR:-default}` becomes the value of `VAR` or `default`.
//! 4. The resulting YAML is deserialized into the caller's type.
//!
//! # Example
//!
//! ```rust,ignore
//! #[derive(serde::Deserialize)]
//! struct Config {
//!     server: core_kernel::ServerConfig,
//! }
//!
//! let config: Config = core_kernel::config::load()?;
//! ```

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::de::DeserializeOwned;
use std::path::Path;
use tracing::debug;

use crate::error::CoreError;

/// Environment variable selecting the configuration file
pub const SERVICE_ENV_VAR: &str = "SERVICE_ENV";

/// File used when no environment-specific file is available
pub const DEFAULT_CONFIG_FILE: &str = "config.default.yaml";

static CONFIG_FILE_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^config\.([a-zA-Z0-9]+)?\.yaml$").expect("valid file name pattern"));

static ENV_REFERENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{(\w+)(?::-([^}]*))?\}").expect("valid env reference pattern"));

/// Loads configuration from the current working directory
///
/// # Errors
///
/// Returns `CoreError` if the working directory cannot be resolved, the
/// configuration file is missing or rejected, or the YAML does not match `T`.
pub fn load<T: DeserializeOwned>() -> Result<T, CoreError> {
    let dir = std::env::current_dir().map_err(|e| CoreError::io(".", e))?;
    load_from(dir)
}

/// Loads configuration from the given directory
///
/// Behaves like [`load`] but resolves `.env` and `config.*.yaml` relative to
/// `dir` instead of the working directory.
pub fn load_from<T: DeserializeOwned>(dir: impl AsRef<Path>) -> Result<T, CoreError> {
    let dir = dir.as_ref();
    // Existing process variables win over .env entries.
    let _ = dotenvy::from_path(dir.join(".env"));

    let service_env = std::env::var(SERVICE_ENV_VAR).ok();
    let file_name = select_file_name(dir, service_env.as_deref());
    debug!(file = %file_name, dir = %dir.display(), "Loading configuration");

    let raw = read_config_file(dir, &file_name)?;
    let content = substitute_env(&raw, |name| std::env::var(name).ok());
    parse_yaml(&content)
}

/// Picks the configuration file name for the given service environment
pub fn select_file_name(dir: &Path, service_env: Option<&str>) -> String {
    if let Some(env) = service_env {
        let candidate = format!("config.{}.yaml", env);
        if dir.join(&candidate).is_file() {
            return candidate;
        }
    }
    DEFAULT_CONFIG_FILE.to_string()
}

/// Reads a configuration file after checking its name against the allowed pattern
pub fn read_config_file(dir: &Path, file_name: &str) -> Result<String, CoreError> {
    if !CONFIG_FILE_NAME.is_match(file_name) {
        return Err(CoreError::configuration(format!(
            "invalid config file: {}",
            file_name
        )));
    }

    let path = dir.join(file_name);
    if !path.is_file() {
        return Err(CoreError::configuration(format!(
            "file not found: {}",
            file_name
        )));
    }

    std::fs::read_to_string(&path).map_err(|e| CoreError::io(path, e))
}

/// Replaces `${VAR}` and `${VAR:-default}` references using `lookup`
///
/// A variable that is set (even to an empty string) always wins. An unset
/// variable falls back to a non-empty default, otherwise to an empty string.
pub fn substitute_env<F>(content: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    ENV_REFERENCE
        .replace_all(content, |caps: &Captures| {
            if let Some(value) = lookup(&caps[1]) {
                return value;
            }
            caps.get(2)
                .map(|default| default.as_str().to_string())
                .unwrap_or_default()
        })
        .into_owned()
}

/// Deserializes YAML text into `T`
pub fn parse_yaml<T: DeserializeOwned>(content: &str) -> Result<T, CoreError> {
    let settings = config::Config::builder()
        .add_source(config::File::from_str(content, config::FileFormat::Yaml))
        .build()?;
    Ok(settings.try_deserialize()?)
}
