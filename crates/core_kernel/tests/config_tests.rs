//! Tests for loading YAML configuration from a directory

use core_kernel::config::{load_from, DEFAULT_CONFIG_FILE};
use core_kernel::{EndpointConfig, KafkaConfig, LogFormat, LoggingConfig, ServerConfig};
use serde::Deserialize;
use std::fs;

#[derive(Debug, Deserialize)]
struct ServiceConfig {
    server: ServerConfig,
    #[serde(default)]
    endpoint: EndpointConfig,
    #[serde(default)]
    kafka: KafkaConfig,
    #[serde(default)]
    logging: LoggingConfig,
}

#[test]
fn test_load_default_file_with_substitution() {
    let dir = tempfile::tempdir().unwrap();
    std::env::set_var("CONFIG_TESTS_SERVER_NAME", "users");
    fs::write(
        dir.path().join(DEFAULT_CONFIG_FILE),
        r#"
server:
  name: ${CONFIG_TESTS_SERVER_NAME}
  host: ${CONFIG_TESTS_UNSET_HOST:-127.0.0.1}
  port: 9090
  reflection: true
endpoint:
  target-env: prod
kafka:
  brokers: localhost:9092
  group-id: users
logging:
  level: debug
  format: json
"#,
    )
    .unwrap();

    let config: ServiceConfig = load_from(dir.path()).unwrap();

    assert_eq!(config.server.name, "users");
    assert_eq!(config.server.host, "127.0.0.1");
    assert_eq!(config.server.port, 9090);
    assert!(config.server.reflection);
    assert_eq!(config.server.server_addr(), "127.0.0.1:9090");
    assert!(config.endpoint.is_prod());
    assert_eq!(config.kafka.group_id, "users");
    assert_eq!(config.logging.level, "debug");
    assert_eq!(config.logging.format, LogFormat::Json);
}

#[test]
fn test_load_reads_dotenv_file() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join(".env"), "CONFIG_TESTS_DOTENV_PORT=7070\n").unwrap();
    fs::write(
        dir.path().join(DEFAULT_CONFIG_FILE),
        "server:\n  name: users\n  host: localhost\n  port: ${CONFIG_TESTS_DOTENV_PORT:-1}\n",
    )
    .unwrap();

    let config: ServiceConfig = load_from(dir.path()).unwrap();

    assert_eq!(config.server.port, 7070);
}

#[test]
fn test_load_missing_file_fails() {
    let dir = tempfile::tempdir().unwrap();

    let err = load_from::<ServiceConfig>(dir.path()).unwrap_err();

    assert!(err.is_configuration());
    assert!(err.to_string().contains("file not found"));
}

#[test]
fn test_load_rejects_mismatched_shape() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join(DEFAULT_CONFIG_FILE),
        "server:\n  name: users\n  host: localhost\n  port: not-a-port\n",
    )
    .unwrap();

    let err = load_from::<ServiceConfig>(dir.path()).unwrap_err();

    assert!(!err.is_configuration());
}
