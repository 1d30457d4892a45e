//! User Service
//!
//! This crate wires the shared building blocks into the user service:
//! configuration, the primary/replica database connections and an HTTP
//! health surface.
//!
//! # Architecture
//!
//! - **Config**: `UserServiceConfig`, loaded from YAML with environment substitution
//! - **App**: startup, serving and shutdown of the process
//! - **Handlers**: liveness, readiness and pool statistics endpoints
//! - **Error Handling**: startup errors and consistent HTTP error responses
//!
//! # Example
//!
//! ```rust,ignore
//! use service_user::{App, UserServiceConfig};
//!
//! let config = UserServiceConfig::load()?;
//! let app = App::start(config).await?;
//! app.serve(shutdown_signal()).await?;
//! ```

pub mod app;
pub mod config;
pub mod error;
pub mod handlers;

pub use app::App;
pub use config::UserServiceConfig;
pub use error::{ApiError, ServiceError};

use axum::{routing::get, Router};
use sqlx::PgPool;
use tower::ServiceBuilder;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use crate::handlers::health;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Service name reported by the health endpoints
    pub service: String,
    pub primary: PgPool,
    pub replica: PgPool,
}

/// Creates the service router
pub fn create_router(state: AppState) -> Router {
    let health_routes = Router::new()
        .route("/health", get(health::health_check))
        .route("/health/ready", get(health::readiness_check))
        .route("/health/pools", get(health::pool_stats));

    Router::new()
        .merge(health_routes)
        .fallback(handlers::not_found)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::x_request_id()),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
    use std::time::Duration;
    use tower::ServiceExt;

    /// Pools that never connect: the target port refuses connections
    fn unreachable_state() -> AppState {
        let options = PgConnectOptions::new()
            .host("127.0.0.1")
            .port(1)
            .username("app")
            .database("users");
        let pool = |max| {
            PgPoolOptions::new()
                .max_connections(max)
                .acquire_timeout(Duration::from_millis(500))
                .connect_lazy_with(options.clone())
        };

        AppState {
            service: "user-service".to_string(),
            primary: pool(4),
            replica: pool(6),
        }
    }

    async fn get_json(uri: &str) -> (StatusCode, serde_json::Value) {
        let response = create_router(unreachable_state())
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();

        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_health_reports_service_and_version() {
        let (status, body) = get_json("/health").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["service"], "user-service");
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn test_readiness_fails_when_pools_unreachable() {
        let (status, body) = get_json("/health/ready").await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"], "unavailable");
        let message = body["message"].as_str().unwrap();
        assert!(message.contains("primary"));
        assert!(message.contains("replica"));
    }

    #[tokio::test]
    async fn test_pool_stats_reports_both_pools() {
        let (status, body) = get_json("/health/pools").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["primary"]["max_connections"], 4);
        assert_eq!(body["replica"]["max_connections"], 6);
        assert_eq!(body["primary"]["closed"], false);
    }

    #[tokio::test]
    async fn test_unknown_route_is_not_found() {
        let (status, body) = get_json("/users/42").await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["message"], "/users/42");
    }

    #[tokio::test]
    async fn test_request_id_is_propagated() {
        let response = create_router(unreachable_state())
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .header("x-request-id", "req-123")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.headers()["x-request-id"], "req-123");
    }
}
