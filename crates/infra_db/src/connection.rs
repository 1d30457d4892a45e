//! Primary/replica connection set
//!
//! A [`ConnectionSet`] is opened once at startup and closed once at
//! shutdown. Opening is all-or-nothing: when the replica cannot be opened,
//! the primary that was already opened is closed before the error is
//! returned. Closing consumes the set, so a closed set cannot be used or
//! reopened.

use serde::Serialize;
use sqlx::PgPool;
use std::future::Future;
use std::sync::Arc;
use tracing::info;

use crate::config::DbConfig;
use crate::error::DatabaseError;
use crate::pool::{ManagedPool, PoolObserver, PoolRole, PoolStats, TracingObserver};

/// The process-wide pair of pools: primary for writes, replica for reads
#[derive(Debug)]
pub struct ConnectionSet {
    primary: ManagedPool,
    replica: ManagedPool,
}

/// Statistics for both pools of a [`ConnectionSet`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConnectionSetStats {
    pub primary: PoolStats,
    pub replica: PoolStats,
}

impl ConnectionSet {
    /// Opens both pools, logging pool events through `tracing`
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::Configuration` if either profile is invalid
    /// (nothing is opened in that case) and `DatabaseError::ConnectionFailed`
    /// if either server cannot be reached.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// use infra_db::{ConnectionSet, DbConfig};
    ///
    /// let connections = ConnectionSet::open(&config.db).await?;
    /// // ... serve requests ...
    /// connections.close().await?;
    /// ```
    pub async fn open(config: &DbConfig) -> Result<Self, DatabaseError> {
        Self::open_with_observer(config, Arc::new(TracingObserver)).await
    }

    /// Opens both pools with a custom observer attached to each
    pub async fn open_with_observer(
        config: &DbConfig,
        observer: Arc<dyn PoolObserver>,
    ) -> Result<Self, DatabaseError> {
        config.validate()?;

        let primary =
            ManagedPool::connect(PoolRole::Primary, &config.primary, Arc::clone(&observer)).await?;

        // From here on the primary must be released on every failure path.
        let replica =
            match ManagedPool::connect(PoolRole::Replica, &config.replica, observer).await {
                Ok(replica) => replica,
                Err(err) => {
                    primary.close().await;
                    return Err(err);
                }
            };

        info!("Loaded Database");
        Ok(Self { primary, replica })
    }

    /// Pool for writes and read-your-writes queries
    pub fn primary(&self) -> &PgPool {
        self.primary.pool()
    }

    /// Pool for reads that tolerate replication lag
    pub fn replica(&self) -> &PgPool {
        self.replica.pool()
    }

    pub fn stats(&self) -> ConnectionSetStats {
        ConnectionSetStats {
            primary: self.primary.stats(),
            replica: self.replica.stats(),
        }
    }

    /// Closes the replica and primary pools
    ///
    /// Both pools are always closed; a failure while closing one does not
    /// stop the other from closing. Failures are reported together once
    /// both have finished.
    pub async fn close(self) -> Result<(), DatabaseError> {
        let Self { primary, replica } = self;
        close_both(primary.close(), replica.close()).await?;
        info!("Database connections closed");
        Ok(())
    }
}

/// Runs both close futures to completion on separate tasks
pub(crate) async fn close_both<P, R>(primary: P, replica: R) -> Result<(), DatabaseError>
where
    P: Future<Output = ()> + Send + 'static,
    R: Future<Output = ()> + Send + 'static,
{
    let replica = tokio::spawn(replica);
    let primary = tokio::spawn(primary);
    let (replica, primary) = tokio::join!(replica, primary);

    let failures: Vec<String> = [(PoolRole::Replica, replica), (PoolRole::Primary, primary)]
        .into_iter()
        .filter_map(|(role, result)| result.err().map(|e| format!("{}: {}", role, e)))
        .collect();

    if failures.is_empty() {
        Ok(())
    } else {
        Err(DatabaseError::CloseFailed(failures.join("; ")))
    }
}
