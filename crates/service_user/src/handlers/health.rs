//! Health check handlers

use axum::{extract::State, Json};
use infra_db::{ConnectionSetStats, PoolRole, PoolStats};
use serde::Serialize;
use sqlx::{Connection, PgPool};

use crate::error::ApiError;
use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

impl HealthResponse {
    fn new(status: &str, state: &AppState) -> Self {
        Self {
            status: status.to_string(),
            service: state.service.clone(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse::new("healthy", &state))
}

/// Readiness check (pings primary and replica)
pub async fn readiness_check(
    State(state): State<AppState>,
) -> Result<Json<HealthResponse>, ApiError> {
    let (primary, replica) = tokio::join!(
        ping(PoolRole::Primary, &state.primary),
        ping(PoolRole::Replica, &state.replica)
    );

    let failures: Vec<String> = [primary, replica]
        .into_iter()
        .filter_map(Result::err)
        .collect();
    if !failures.is_empty() {
        return Err(ApiError::Unavailable(failures.join("; ")));
    }

    Ok(Json(HealthResponse::new("ready", &state)))
}

/// Pool statistics for both pools
pub async fn pool_stats(State(state): State<AppState>) -> Json<ConnectionSetStats> {
    Json(ConnectionSetStats {
        primary: PoolStats::of(&state.primary),
        replica: PoolStats::of(&state.replica),
    })
}

async fn ping(role: PoolRole, pool: &PgPool) -> Result<(), String> {
    let result = match pool.acquire().await {
        Ok(mut conn) => conn.ping().await,
        Err(e) => Err(e),
    };

    result.map_err(|e| {
        tracing::warn!(role = %role, error = %e, "Readiness ping failed");
        format!("{}: {}", role, e)
    })
}
