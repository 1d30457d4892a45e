//! User Service Integration Tests
//!
//! These tests exercise the service end to end: configuration files on
//! disk, startup against a real PostgreSQL container, the HTTP surface and
//! shutdown. Container-backed tests are ignored by default; run them with
//! `cargo test -p service_user -- --ignored`.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use core_kernel::{EndpointConfig, KafkaConfig, LoggingConfig, ServerConfig};
use infra_db::{DatabaseError, DbConfig};
use service_user::{App, ServiceError, UserServiceConfig};
use std::time::Duration;
use test_utils::{db_test, unreachable_profile};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tower::ServiceExt;

// ============================================================================
// TEST FIXTURES
// ============================================================================

fn service_config(db: DbConfig) -> UserServiceConfig {
    UserServiceConfig {
        server: ServerConfig {
            name: "user-service-test".to_string(),
            host: "127.0.0.1".to_string(),
            port: 0,
            reflection: false,
        },
        db,
        endpoint: EndpointConfig::default(),
        kafka: KafkaConfig::default(),
        logging: LoggingConfig::default(),
    }
}

async fn get(app: &App, uri: &str) -> (StatusCode, serde_json::Value) {
    let response = app
        .router()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

// ============================================================================
// CONFIGURATION FILES
// ============================================================================

mod configuration {
    use super::*;

    #[test]
    fn test_shipped_default_config_loads() {
        let dir = tempfile::tempdir().unwrap();
        let shipped = concat!(env!("CARGO_MANIFEST_DIR"), "/config.default.yaml");
        std::fs::copy(shipped, dir.path().join("config.default.yaml")).unwrap();

        let config = UserServiceConfig::load_from(dir.path()).unwrap();

        assert_eq!(config.server.name, "user-service");
        assert_eq!(config.db.primary.pool.max_conns_override(), Some(10));
        assert_eq!(
            config.db.primary.pool.health_check_period_override(),
            Some(Duration::from_secs(60))
        );
        assert_eq!(
            config.db.replica.application_name.as_deref(),
            Some("user-service-replica")
        );
        assert_eq!(config.kafka.topic("created"), "users.created");
        assert!(config.db.validate().is_ok());
    }

    #[test]
    fn test_missing_config_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();

        let err = UserServiceConfig::load_from(dir.path()).unwrap_err();

        assert!(err.is_configuration());
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_defaults_fill_unset_variables() {
        let dir = tempfile::tempdir().unwrap();
        let yaml = r#"
server:
  name: users
  host: 0.0.0.0
  port: ${USER_SERVICE_TEST_UNSET_PORT:-7000}
db:
  primary:
    host: ${USER_SERVICE_TEST_UNSET_HOST:-primary.local}
    port: 5432
    user: app
    password: "${USER_SERVICE_TEST_UNSET_PASSWORD}"
    dbname: users
  replica:
    host: replica.local
    port: 5432
    user: app
    dbname: users
"#;
        std::fs::write(dir.path().join("config.default.yaml"), yaml).unwrap();

        let config = UserServiceConfig::load_from(dir.path()).unwrap();

        assert_eq!(config.server.port, 7000);
        assert_eq!(config.db.primary.host, "primary.local");
        assert_eq!(config.db.primary.password, "");
        assert_eq!(config.db.replica.password, "");
    }
}

// ============================================================================
// LIFECYCLE
// ============================================================================

#[tokio::test]
async fn test_start_fails_when_database_unreachable() {
    let config = service_config(DbConfig::new(unreachable_profile(), unreachable_profile()));

    let err = App::start(config).await.err().unwrap();

    assert!(matches!(
        err,
        ServiceError::Database(DatabaseError::ConnectionFailed { .. })
    ));
}

db_test!(test_start_serves_health_and_stops, |db| {
    let app = App::start(service_config(db.db_config("svc"))).await.unwrap();

    let (status, body) = get(&app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["service"], "user-service-test");

    let (status, body) = get(&app, "/health/ready").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ready");

    let (status, body) = get(&app, "/health/pools").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["primary"]["max_connections"], 5);

    let primary = app.connections().primary().clone();
    app.stop().await.unwrap();
    assert!(primary.is_closed());
});

db_test!(test_serve_drains_and_closes_on_shutdown, |db| {
    let app = App::start(service_config(db.db_config("serve"))).await.unwrap();
    let primary = app.connections().primary().clone();
    let replica = app.connections().replica().clone();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let server = tokio::spawn(app.serve_on(listener, async move {
        let _ = stop_rx.await;
    }));

    let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(b"GET /health HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();
    assert!(response.starts_with("HTTP/1.1 200"));
    assert!(response.contains("user-service-test"));

    stop_tx.send(()).unwrap();
    server.await.unwrap().unwrap();

    assert!(primary.is_closed());
    assert!(replica.is_closed());
});
