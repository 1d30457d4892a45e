//! Transactional execution engine
//!
//! [`TxExecutor`] runs a unit of work inside a transaction and hands the work
//! a caller-defined querier instead of a raw connection. The executor is
//! generic over the querier type: each service supplies a factory that wraps
//! a [`TxHandle`] in its own query object, so one engine backs every
//! repository shape.
//!
//! Each invocation moves through `Idle -> Begun -> Committed | RolledBack`:
//!
//! - if `begin` fails, its error is returned and nothing else happens;
//! - if the work returns `Ok`, the transaction is committed and a commit
//!   failure becomes the result;
//! - if the work returns `Err`, the transaction is rolled back and a
//!   rollback failure **replaces** the work's error;
//! - if the work panics or is cancelled, the transaction is rolled back
//!   before the panic resumes or `DatabaseError::Cancelled` is returned.
//!
//! Exactly one of commit or rollback is attempted once `Begun` is reached.
//!
//! A cancellation signal or deadline also bounds finalization. Once it has
//! fired, commit or rollback gets a short grace period
//! ([`TxExecutor::with_rollback_grace`]); after that the transaction is
//! dropped unfinished and `DatabaseError::Cancelled` is returned. Dropping a
//! SQLx transaction queues its rollback, which the pool flushes before the
//! connection is reused.
//!
//! # Example
//!
//! ```rust,ignore
//! use infra_db::{PgTxHandle, PgTxManager, DatabaseError};
//!
//! #[derive(Clone)]
//! struct UserQueries {
//!     tx: PgTxHandle,
//! }
//!
//! impl UserQueries {
//!     async fn create(&self, name: &str) -> Result<i64, DatabaseError> {
//!         let mut conn = self.tx.conn().await?;
//!         let id = sqlx::query_scalar("INSERT INTO users (name) VALUES ($1) RETURNING id")
//!             .bind(name)
//!             .fetch_one(&mut **conn)
//!             .await?;
//!         Ok(id)
//!     }
//! }
//!
//! let users = PgTxManager::new(connections.primary().clone(), |tx| UserQueries { tx });
//! let id = users
//!     .exec_tx(|q| async move { q.create("ada").await })
//!     .await?;
//! ```

use async_trait::async_trait;
use futures_util::FutureExt;
use sqlx::{PgPool, Postgres, Transaction};
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{MappedMutexGuard, Mutex, MutexGuard};
use tracing::debug;

use crate::error::DatabaseError;

/// Something transactions can be started on
#[async_trait]
pub trait TxSource: Send + Sync {
    type Tx: Transactional;

    /// Borrows a connection and begins a transaction on it
    async fn begin(&self) -> Result<Self::Tx, DatabaseError>;
}

/// A live transaction that can be finalized once
#[async_trait]
pub trait Transactional: Send + 'static {
    async fn commit(self) -> Result<(), DatabaseError>;

    async fn rollback(self) -> Result<(), DatabaseError>;
}

#[async_trait]
impl TxSource for PgPool {
    type Tx = Transaction<'static, Postgres>;

    async fn begin(&self) -> Result<Self::Tx, DatabaseError> {
        sqlx::Pool::begin(self).await.map_err(DatabaseError::Begin)
    }
}

#[async_trait]
impl Transactional for Transaction<'static, Postgres> {
    async fn commit(self) -> Result<(), DatabaseError> {
        Transaction::commit(self).await.map_err(DatabaseError::Commit)
    }

    async fn rollback(self) -> Result<(), DatabaseError> {
        Transaction::rollback(self).await.map_err(DatabaseError::Rollback)
    }
}

/// Shared access to the transaction of one engine invocation
///
/// Queriers hold a clone of the handle and lock it for each statement. When
/// the unit of work ends the engine takes the transaction out of the handle,
/// so any clone that outlives the invocation only ever sees
/// `DatabaseError::TransactionClosed`.
pub struct TxHandle<X> {
    slot: Arc<Mutex<Option<X>>>,
}

/// Handle over a PostgreSQL transaction
pub type PgTxHandle = TxHandle<Transaction<'static, Postgres>>;

impl<X> Clone for TxHandle<X> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<X> fmt::Debug for TxHandle<X> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TxHandle").finish_non_exhaustive()
    }
}

impl<X: Send> TxHandle<X> {
    fn new(tx: X) -> Self {
        Self {
            slot: Arc::new(Mutex::new(Some(tx))),
        }
    }

    /// Locks the transaction for one or more statements
    ///
    /// For a [`PgTxHandle`], `&mut **guard` is a `&mut PgConnection` and can
    /// be passed to any SQLx query as its executor. Hold the guard only as
    /// long as the statements need it.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::TransactionClosed` once the invocation that
    /// created this handle has finished.
    pub async fn conn(&self) -> Result<MappedMutexGuard<'_, X>, DatabaseError> {
        let guard = self.slot.lock().await;
        MutexGuard::try_map(guard, Option::as_mut).map_err(|_| DatabaseError::TransactionClosed)
    }

    /// Returns true while the owning invocation is still running
    pub async fn is_open(&self) -> bool {
        self.slot.lock().await.is_some()
    }

    async fn take(&self) -> Option<X> {
        self.slot.lock().await.take()
    }
}

enum Outcome<T, E> {
    Finished(Result<T, E>),
    Panicked(Box<dyn Any + Send>),
    Cancelled,
}

/// Time finalization may take once cancellation has fired
pub const DEFAULT_ROLLBACK_GRACE: Duration = Duration::from_secs(1);

/// Runs units of work in transactions begun on `S`, exposing them as `Q`
pub struct TxExecutor<S: TxSource, Q> {
    source: S,
    new_querier: Arc<dyn Fn(TxHandle<S::Tx>) -> Q + Send + Sync>,
    rollback_grace: Duration,
}

/// Engine over a PostgreSQL pool
pub type PgTxManager<Q> = TxExecutor<PgPool, Q>;

impl<S: TxSource + Clone, Q> Clone for TxExecutor<S, Q> {
    fn clone(&self) -> Self {
        Self {
            source: self.source.clone(),
            new_querier: Arc::clone(&self.new_querier),
            rollback_grace: self.rollback_grace,
        }
    }
}

impl<S: TxSource + fmt::Debug, Q> fmt::Debug for TxExecutor<S, Q> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TxExecutor")
            .field("source", &self.source)
            .field("rollback_grace", &self.rollback_grace)
            .finish_non_exhaustive()
    }
}

impl<S: TxSource, Q> TxExecutor<S, Q> {
    /// Creates an executor from a transaction source and a querier factory
    pub fn new<F>(source: S, new_querier: F) -> Self
    where
        F: Fn(TxHandle<S::Tx>) -> Q + Send + Sync + 'static,
    {
        Self {
            source,
            new_querier: Arc::new(new_querier),
            rollback_grace: DEFAULT_ROLLBACK_GRACE,
        }
    }

    /// Sets how long commit or rollback may run after cancellation fires
    pub fn with_rollback_grace(mut self, grace: Duration) -> Self {
        self.rollback_grace = grace;
        self
    }

    /// Runs `work` in a new transaction and commits or rolls back
    ///
    /// # Errors
    ///
    /// Returns, in order of precedence: the begin error; the rollback error
    /// if rolling back failed; the work's own error; the commit error.
    ///
    /// # Panics
    ///
    /// A panic inside `work` is resumed after the transaction is rolled back.
    pub async fn exec_tx<T, E, F, Fut>(&self, work: F) -> Result<T, E>
    where
        F: FnOnce(Q) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<DatabaseError>,
    {
        self.run(std::future::pending::<()>(), work).await
    }

    /// Like [`exec_tx`](Self::exec_tx), abandoning the work when `cancel` completes
    ///
    /// `cancel` governs waiting for `begin`, running the work and
    /// finalizing. If it fires while the work is running, the work is
    /// dropped, the transaction is rolled back, and `DatabaseError::Cancelled`
    /// is returned (or the rollback error, if rolling back failed). Commit or
    /// rollback still running when the grace period after `cancel` ends is
    /// abandoned and `DatabaseError::Cancelled` is returned.
    pub async fn exec_tx_until<C, T, E, F, Fut>(&self, cancel: C, work: F) -> Result<T, E>
    where
        C: Future<Output = ()>,
        F: FnOnce(Q) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<DatabaseError>,
    {
        self.run(cancel, work).await
    }

    /// Like [`exec_tx`](Self::exec_tx) with a deadline for begin, work and
    /// finalization
    pub async fn exec_tx_timeout<T, E, F, Fut>(&self, timeout: Duration, work: F) -> Result<T, E>
    where
        F: FnOnce(Q) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<DatabaseError>,
    {
        self.run(tokio::time::sleep(timeout), work).await
    }

    async fn run<C, T, E, F, Fut>(&self, cancel: C, work: F) -> Result<T, E>
    where
        C: Future<Output = ()>,
        F: FnOnce(Q) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<DatabaseError>,
    {
        tokio::pin!(cancel);

        let tx = tokio::select! {
            biased;
            begun = self.source.begin() => begun?,
            _ = &mut cancel => return Err(DatabaseError::Cancelled.into()),
        };
        debug!("Transaction begun");

        let handle = TxHandle::new(tx);
        let outcome = match std::panic::catch_unwind(AssertUnwindSafe(|| {
            (self.new_querier)(handle.clone())
        })) {
            Ok(querier) => {
                let work = AssertUnwindSafe(async move { work(querier).await }).catch_unwind();
                tokio::select! {
                    biased;
                    finished = work => match finished {
                        Ok(result) => Outcome::Finished(result),
                        Err(payload) => Outcome::Panicked(payload),
                    },
                    _ = &mut cancel => Outcome::Cancelled,
                }
            }
            Err(payload) => Outcome::Panicked(payload),
        };

        let Some(tx) = handle.take().await else {
            return Err(DatabaseError::TransactionClosed.into());
        };

        match outcome {
            Outcome::Finished(Ok(value)) => {
                match self.finalize(cancel.as_mut(), false, tx.commit()).await {
                    Some(committed) => committed?,
                    None => return Err(abandoned("commit")),
                }
                debug!("Transaction committed");
                Ok(value)
            }
            Outcome::Finished(Err(work_err)) => {
                match self.finalize(cancel.as_mut(), false, tx.rollback()).await {
                    Some(rolled_back) => rolled_back?,
                    None => return Err(abandoned("rollback")),
                }
                debug!("Transaction rolled back");
                Err(work_err)
            }
            Outcome::Cancelled => {
                match self.finalize(cancel.as_mut(), true, tx.rollback()).await {
                    Some(rolled_back) => rolled_back?,
                    None => return Err(abandoned("rollback")),
                }
                debug!("Transaction rolled back after cancellation");
                Err(DatabaseError::Cancelled.into())
            }
            Outcome::Panicked(payload) => {
                match self.finalize(cancel.as_mut(), false, tx.rollback()).await {
                    Some(Ok(())) => debug!("Transaction rolled back after panic"),
                    Some(Err(e)) => debug!(error = %e, "Rollback after panic failed"),
                    None => debug!("Rollback after panic abandoned"),
                }
                std::panic::resume_unwind(payload)
            }
        }
    }

    /// Drives a commit or rollback under the cancellation signal
    ///
    /// `step` runs unbounded until `cancel` fires, then for at most
    /// `rollback_grace`. `cancelled` says `cancel` has already completed and
    /// must not be polled again. Returns `None` if `step` was abandoned.
    async fn finalize<C, R>(
        &self,
        cancel: Pin<&mut C>,
        cancelled: bool,
        step: R,
    ) -> Option<Result<(), DatabaseError>>
    where
        C: Future<Output = ()>,
        R: Future<Output = Result<(), DatabaseError>>,
    {
        tokio::pin!(step);

        if !cancelled {
            tokio::select! {
                biased;
                done = &mut step => return Some(done),
                _ = cancel => {}
            }
        }

        tokio::time::timeout(self.rollback_grace, step).await.ok()
    }
}

fn abandoned<E: From<DatabaseError>>(step: &str) -> E {
    debug!(step, "Transaction finalization abandoned after cancellation");
    DatabaseError::Cancelled.into()
}

/// Transaction manager seam for services
///
/// Services depend on `TxManager<Q>` rather than a concrete executor so
/// tests can substitute their own implementation.
#[async_trait]
pub trait TxManager<Q: Send + 'static>: Send + Sync {
    /// Runs `work` in a new transaction; see [`TxExecutor::exec_tx`]
    async fn exec_tx<T, E, F, Fut>(&self, work: F) -> Result<T, E>
    where
        F: FnOnce(Q) -> Fut + Send,
        Fut: Future<Output = Result<T, E>> + Send,
        T: Send,
        E: From<DatabaseError> + Send;
}

#[async_trait]
impl<S, Q> TxManager<Q> for TxExecutor<S, Q>
where
    S: TxSource,
    Q: Send + 'static,
{
    async fn exec_tx<T, E, F, Fut>(&self, work: F) -> Result<T, E>
    where
        F: FnOnce(Q) -> Fut + Send,
        Fut: Future<Output = Result<T, E>> + Send,
        T: Send,
        E: From<DatabaseError> + Send,
    {
        self.run(std::future::pending::<()>(), work).await
    }
}
