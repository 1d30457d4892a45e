//! Infrastructure Database Layer
//!
//! This crate provides the database infrastructure for services backed by a
//! PostgreSQL primary/replica pair, built on SQLx.
//!
//! # Architecture
//!
//! - [`config`]: connection profiles and pool policies, read from YAML
//! - [`pool`]: pool construction, observer hooks and idle-connection health checks
//! - [`connection`]: the primary/replica [`ConnectionSet`] opened at startup
//! - [`tx`]: the transactional execution engine ([`TxExecutor`])
//!
//! Services never see a raw transaction. They register a querier factory with
//! a [`TxExecutor`] and run units of work through it; the engine commits or
//! rolls back and reports the outcome.
//!
//! # Example
//!
//! ```rust,ignore
//! use infra_db::{ConnectionSet, PgTxManager};
//!
//! let connections = ConnectionSet::open(&config.db).await?;
//! let users = PgTxManager::new(connections.primary().clone(), |tx| UserQueries { tx });
//!
//! let id = users.exec_tx(|q| async move { q.create("ada").await }).await?;
//!
//! connections.close().await?;
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod pool;
pub mod tx;

pub use config::{ConnectionProfile, DbConfig, PoolPolicy};
pub use connection::{ConnectionSet, ConnectionSetStats};
pub use error::DatabaseError;
pub use pool::{
    pool_options, ManagedPool, PoolObserver, PoolRole, PoolStats, PoolTarget,
    TracingObserver,
};
pub use tx::{
    PgTxHandle, PgTxManager, Transactional, TxExecutor, TxHandle, TxManager, TxSource,
    DEFAULT_ROLLBACK_GRACE,
};
