//! Database error types
//!
//! This module defines the error types that can occur while opening pools,
//! running transactions and executing queries.

use thiserror::Error;

/// Errors that can occur during database operations
///
/// Configuration and connection failures surface from pool construction,
/// `Begin`/`Commit`/`Rollback` from the transaction engine, and the remaining
/// variants from queries issued through a querier.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// The connection profile or pool policy is invalid
    #[error("Invalid database configuration: {0}")]
    Configuration(String),

    /// Failed to establish a database connection
    #[error("Failed to connect to {target} database: {source}")]
    ConnectionFailed {
        target: String,
        #[source]
        source: sqlx::Error,
    },

    /// Beginning a transaction failed (includes waiting for a pooled connection)
    #[error("Failed to begin transaction: {0}")]
    Begin(#[source] sqlx::Error),

    /// Committing a transaction failed
    #[error("Failed to commit transaction: {0}")]
    Commit(#[source] sqlx::Error),

    /// Rolling back a transaction failed
    #[error("Failed to roll back transaction: {0}")]
    Rollback(#[source] sqlx::Error),

    /// The transaction handle was used after its unit of work finished
    #[error("Transaction is no longer open")]
    TransactionClosed,

    /// The caller cancelled the unit of work before it finished
    #[error("Transaction cancelled")]
    Cancelled,

    /// One or more pools failed to shut down cleanly
    #[error("Failed to close connection pools: {0}")]
    CloseFailed(String),

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Entity not found in database
    #[error("Entity not found: {0}")]
    NotFound(String),

    /// Unique constraint violation
    #[error("Duplicate entry: {0}")]
    DuplicateEntry(String),

    /// Foreign key constraint violation
    #[error("Foreign key violation: {0}")]
    ForeignKeyViolation(String),

    /// Check or exclusion constraint violation
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    /// Pool exhaustion - no available connections
    #[error("Connection pool exhausted")]
    PoolExhausted,

    /// Generic SQL error
    #[error("SQL error: {0}")]
    SqlError(#[from] sqlx::Error),
}

impl DatabaseError {
    /// Creates a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        DatabaseError::Configuration(message.into())
    }

    /// Creates a connection error for the named pool
    pub fn connection_failed(target: impl Into<String>, source: sqlx::Error) -> Self {
        DatabaseError::ConnectionFailed {
            target: target.into(),
            source,
        }
    }

    /// Creates a not found error for a specific entity type and identifier
    ///
    /// # Example
    ///
    /// ```rust
    /// use infra_db::DatabaseError;
    ///
    /// let error = DatabaseError::not_found("User", 42);
    /// assert!(error.to_string().contains("User"));
    /// ```
    pub fn not_found(entity: &str, id: impl std::fmt::Display) -> Self {
        DatabaseError::NotFound(format!("{} with id '{}' not found", entity, id))
    }

    /// Creates a duplicate entry error
    pub fn duplicate(entity: &str, field: &str, value: impl std::fmt::Display) -> Self {
        DatabaseError::DuplicateEntry(format!(
            "{} with {} '{}' already exists",
            entity, field, value
        ))
    }

    /// Checks if this error indicates a record was not found
    pub fn is_not_found(&self) -> bool {
        matches!(self, DatabaseError::NotFound(_))
    }

    /// Checks if this error is a constraint violation
    pub fn is_constraint_violation(&self) -> bool {
        matches!(
            self,
            DatabaseError::DuplicateEntry(_)
                | DatabaseError::ForeignKeyViolation(_)
                | DatabaseError::ConstraintViolation(_)
        )
    }

    /// Checks if this error is a connection-related issue
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            DatabaseError::ConnectionFailed { .. }
                | DatabaseError::PoolExhausted
                | DatabaseError::Begin(_)
        )
    }

    /// Checks if this error came from committing or rolling back
    pub fn is_finalization_error(&self) -> bool {
        matches!(self, DatabaseError::Commit(_) | DatabaseError::Rollback(_))
    }
}

/// Converts SQLx errors to more specific DatabaseError variants
///
/// This function analyzes the SQLx error and maps it to the appropriate
/// DatabaseError variant based on the PostgreSQL error code.
impl From<&sqlx::Error> for DatabaseError {
    fn from(error: &sqlx::Error) -> Self {
        match error {
            sqlx::Error::RowNotFound => DatabaseError::NotFound("Record not found".to_string()),
            sqlx::Error::PoolTimedOut => DatabaseError::PoolExhausted,
            sqlx::Error::Database(db_err) => {
                // https://www.postgresql.org/docs/current/errcodes-appendix.html
                match db_err.code().as_deref() {
                    Some("23505") => DatabaseError::DuplicateEntry(db_err.message().to_string()),
                    Some("23503") => {
                        DatabaseError::ForeignKeyViolation(db_err.message().to_string())
                    }
                    Some("23514") | Some("23P01") => {
                        DatabaseError::ConstraintViolation(db_err.message().to_string())
                    }
                    _ => DatabaseError::QueryFailed(db_err.message().to_string()),
                }
            }
            _ => DatabaseError::QueryFailed(error.to_string()),
        }
    }
}
