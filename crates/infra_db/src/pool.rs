//! Database connection pool management
//!
//! This module turns a [`ConnectionProfile`] into a running PostgreSQL pool:
//! the profile's [`PoolPolicy`](crate::PoolPolicy) is overlaid on the SQLx
//! defaults, a [`PoolObserver`] is attached to connect/close events, and an
//! optional background task pings idle connections on a fixed period.

use serde::Serialize;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Connection;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::config::{ConnectionProfile, PoolPolicy};
use crate::error::DatabaseError;

/// Which side of the primary/replica pair a pool serves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PoolRole {
    Primary,
    Replica,
}

impl fmt::Display for PoolRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolRole::Primary => write!(f, "primary"),
            PoolRole::Replica => write!(f, "replica"),
        }
    }
}

/// Identifies a pool in observer callbacks and logs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolTarget {
    pub role: PoolRole,
    pub host: String,
    pub database: String,
}

impl PoolTarget {
    pub fn new(role: PoolRole, profile: &ConnectionProfile) -> Self {
        Self {
            role,
            host: profile.host.clone(),
            database: profile.dbname.clone(),
        }
    }
}

/// Advisory hooks for pool events
///
/// Observers are for logging and metrics only. A panicking hook is
/// contained and logged; it never fails the connection or close it reports.
pub trait PoolObserver: Send + Sync + 'static {
    /// Called after each new physical connection is established
    fn on_connect(&self, _target: &PoolTarget) {}

    /// Called when the pool is closed
    fn on_close(&self, _target: &PoolTarget) {}
}

/// Default observer that logs pool events through `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl PoolObserver for TracingObserver {
    fn on_connect(&self, target: &PoolTarget) {
        info!(
            role = %target.role,
            "Database connected: host={}, database={}",
            target.host, target.database
        );
    }

    fn on_close(&self, target: &PoolTarget) {
        info!(
            role = %target.role,
            "Database connection closing: host={}, database={}",
            target.host, target.database
        );
    }
}

/// Builds pool options from a policy, keeping SQLx defaults for unset fields
///
/// `connect-timeout` bounds how long acquiring a connection (including
/// establishing a new one) may take.
pub fn pool_options(policy: &PoolPolicy) -> PgPoolOptions {
    let mut options = PgPoolOptions::new();

    if let Some(max) = policy.max_conns_override() {
        options = options.max_connections(max);
    }
    if let Some(min) = policy.min_conns_override() {
        options = options.min_connections(min);
    }
    if let Some(lifetime) = policy.max_conn_lifetime_override() {
        options = options.max_lifetime(lifetime);
    }
    if let Some(idle) = policy.max_conn_idle_time_override() {
        options = options.idle_timeout(idle);
    }
    if let Some(timeout) = policy.connect_timeout_override() {
        options = options.acquire_timeout(timeout);
    }

    options
}

/// Point-in-time pool statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    /// Open connections, idle or in use
    pub size: u32,
    pub idle: usize,
    pub max_connections: u32,
    pub min_connections: u32,
    pub closed: bool,
}

impl PoolStats {
    pub fn of(pool: &PgPool) -> Self {
        Self {
            size: pool.size(),
            idle: pool.num_idle(),
            max_connections: pool.options().get_max_connections(),
            min_connections: pool.options().get_min_connections(),
            closed: pool.is_closed(),
        }
    }
}

/// A connected pool together with its observer and health-check task
pub struct ManagedPool {
    pool: PgPool,
    target: PoolTarget,
    observer: Arc<dyn PoolObserver>,
    health_check: Option<JoinHandle<()>>,
}

impl ManagedPool {
    /// Validates the profile and connects a pool for it
    ///
    /// The pool establishes its first connection before this returns, so an
    /// unreachable server fails here rather than on first use.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::Configuration` for an invalid profile and
    /// `DatabaseError::ConnectionFailed` if the server cannot be reached.
    pub async fn connect(
        role: PoolRole,
        profile: &ConnectionProfile,
        observer: Arc<dyn PoolObserver>,
    ) -> Result<Self, DatabaseError> {
        profile.validate()?;
        let connect_options = profile.connect_options()?;
        let target = PoolTarget::new(role, profile);

        info!(
            role = %role,
            host = %profile.host,
            database = %profile.dbname,
            max_connections = ?profile.pool.max_conns_override(),
            min_connections = ?profile.pool.min_conns_override(),
            "Creating database pool"
        );

        let hook_observer = Arc::clone(&observer);
        let hook_target = target.clone();
        let pool = pool_options(&profile.pool)
            .after_connect(move |_conn, _meta| {
                let observer = Arc::clone(&hook_observer);
                let target = hook_target.clone();
                Box::pin(async move {
                    notify(&target, "on_connect", || observer.on_connect(&target));
                    Ok(())
                })
            })
            .connect_with(connect_options)
            .await
            .map_err(|e| DatabaseError::connection_failed(role.to_string(), e))?;

        let health_check = profile
            .pool
            .health_check_period_override()
            .map(|period| spawn_health_check(pool.clone(), target.clone(), period));

        Ok(Self {
            pool,
            target,
            observer,
            health_check,
        })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn target(&self) -> &PoolTarget {
        &self.target
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats::of(&self.pool)
    }

    /// Stops the health check, closes every connection and notifies the observer
    pub async fn close(mut self) {
        if let Some(task) = self.health_check.take() {
            task.abort();
        }
        self.pool.close().await;
        notify(&self.target, "on_close", || self.observer.on_close(&self.target));
    }
}

/// Runs one observer hook, containing any panic it raises
fn notify(target: &PoolTarget, hook: &'static str, call: impl FnOnce()) {
    if std::panic::catch_unwind(AssertUnwindSafe(call)).is_err() {
        warn!(role = %target.role, hook, "Pool observer panicked");
    }
}

impl Drop for ManagedPool {
    fn drop(&mut self) {
        if let Some(task) = self.health_check.take() {
            task.abort();
        }
    }
}

impl fmt::Debug for ManagedPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagedPool")
            .field("target", &self.target)
            .field("stats", &self.stats())
            .field("health_check", &self.health_check.is_some())
            .finish()
    }
}

/// Pings one idle connection every `period` until the pool closes
///
/// A connection that fails its ping is detached and closed so it is not
/// handed out again. Failures are logged and never surfaced to callers.
fn spawn_health_check(pool: PgPool, target: PoolTarget, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        let closed = pool.close_event();
        tokio::pin!(closed);

        loop {
            tokio::select! {
                _ = &mut closed => break,
                _ = ticker.tick() => check_idle_connection(&pool, &target).await,
            }
        }

        debug!(role = %target.role, "Health check stopped");
    })
}

async fn check_idle_connection(pool: &PgPool, target: &PoolTarget) {
    let Some(mut conn) = pool.try_acquire() else {
        return;
    };

    match conn.ping().await {
        Ok(()) => debug!(role = %target.role, "Health check passed"),
        Err(e) => {
            warn!(
                role = %target.role,
                host = %target.host,
                error = %e,
                "Health check failed, discarding connection"
            );
            let _ = conn.detach().close().await;
        }
    }
}
