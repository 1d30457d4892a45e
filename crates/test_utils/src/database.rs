//! Database Test Utilities
//!
//! Provides helpers for database testing including testcontainer management
//! and connection profiles for integration tests.

use infra_db::{ConnectionProfile, DbConfig, PoolPolicy};
use sqlx::PgPool;
use std::time::Duration;
use testcontainers::{
    core::{IntoContainerPort, WaitFor},
    runners::AsyncRunner,
    ContainerAsync, GenericImage, ImageExt,
};

/// Default PostgreSQL image for testing
const POSTGRES_IMAGE: &str = "postgres";
const POSTGRES_TAG: &str = "16-alpine";
const POSTGRES_USER: &str = "test_user";
const POSTGRES_PASSWORD: &str = "test_password";
const POSTGRES_DB: &str = "users_test";

/// Schema used by the database integration tests
const TEST_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id BIGSERIAL PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
);
"#;

type TestResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// A wrapper around a PostgreSQL test container
pub struct TestDatabase {
    _container: ContainerAsync<GenericImage>,
    pub host: String,
    pub port: u16,
    pub pool: PgPool,
}

impl TestDatabase {
    /// Starts a new PostgreSQL container with the test schema applied
    ///
    /// # Errors
    ///
    /// Returns an error if the container fails to start or the schema fails to apply
    pub async fn new() -> TestResult<Self> {
        let container = GenericImage::new(POSTGRES_IMAGE, POSTGRES_TAG)
            .with_exposed_port(5432.tcp())
            .with_wait_for(WaitFor::message_on_stderr(
                "database system is ready to accept connections",
            ))
            .with_env_var("POSTGRES_USER", POSTGRES_USER)
            .with_env_var("POSTGRES_PASSWORD", POSTGRES_PASSWORD)
            .with_env_var("POSTGRES_DB", POSTGRES_DB)
            .start()
            .await?;

        let port = container.get_host_port_ipv4(5432).await?;
        let host = container.get_host().await?.to_string();

        let profile = profile_for(&host, port, "test_utils");
        let pool = infra_db::pool_options(&profile.pool)
            .connect_with(profile.connect_options()?)
            .await?;

        let test_db = Self {
            _container: container,
            host,
            port,
            pool,
        };
        test_db.init_schema().await?;

        Ok(test_db)
    }

    async fn init_schema(&self) -> TestResult<()> {
        sqlx::raw_sql(TEST_SCHEMA).execute(&self.pool).await?;
        Ok(())
    }

    /// Returns a reference to the administrative connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Connection profile for this container tagged with `application_name`
    ///
    /// The tag lets tests find the profile's sessions in `pg_stat_activity`.
    pub fn profile(&self, application_name: &str) -> ConnectionProfile {
        profile_for(&self.host, self.port, application_name)
    }

    /// Primary and replica profiles that both point at this container
    pub fn db_config(&self, application_name: &str) -> DbConfig {
        DbConfig::new(
            self.profile(&format!("{}-primary", application_name)),
            self.profile(&format!("{}-replica", application_name)),
        )
    }

    /// Number of server sessions opened with the given `application_name`
    pub async fn count_sessions(&self, application_name: &str) -> TestResult<i64> {
        let count = sqlx::query_scalar(
            "SELECT count(*) FROM pg_stat_activity WHERE application_name = $1",
        )
        .bind(application_name)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    /// Clears all data from the database while preserving the schema
    pub async fn clear_data(&self) -> TestResult<()> {
        sqlx::query("TRUNCATE TABLE users RESTART IDENTITY CASCADE")
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn profile_for(host: &str, port: u16, application_name: &str) -> ConnectionProfile {
    ConnectionProfile::new(host, port, POSTGRES_USER, POSTGRES_PASSWORD, POSTGRES_DB)
        .ssl_mode("disable")
        .application_name(application_name)
        .pool(
            PoolPolicy::default()
                .max_conns(5)
                .connect_timeout(Duration::from_secs(30)),
        )
}

/// Profile for a server that is guaranteed not to accept connections
///
/// Port 1 on the loopback interface is reserved and normally closed, so
/// connecting fails fast instead of waiting for a timeout.
pub fn unreachable_profile() -> ConnectionProfile {
    ConnectionProfile::new("127.0.0.1", 1, POSTGRES_USER, POSTGRES_PASSWORD, POSTGRES_DB)
        .ssl_mode("disable")
        .pool(PoolPolicy::default().connect_timeout(Duration::from_secs(2)))
}

/// Creates an isolated test database for a single test
///
/// Use this when tests need to count sessions or otherwise observe the server alone
pub async fn create_isolated_test_database() -> TestResult<TestDatabase> {
    TestDatabase::new().await
}

/// Helper macro for running database tests against an isolated container
///
/// Tests generated by this macro need Docker and are ignored by default.
#[macro_export]
macro_rules! db_test {
    ($name:ident, |$db:ident| $body:block) => {
        #[tokio::test]
        #[ignore = "requires Docker"]
        async fn $name() {
            let $db = $crate::database::create_isolated_test_database()
                .await
                .expect("Failed to create test database");
            $body
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_is_valid_and_tagged() {
        let profile = profile_for("localhost", 5432, "suite");

        assert!(profile.validate().is_ok());
        assert_eq!(profile.application_name.as_deref(), Some("suite"));
        assert!(profile.conn_string().contains("dbname=users_test"));
    }

    #[test]
    fn test_unreachable_profile_is_valid() {
        let profile = unreachable_profile();

        assert!(profile.validate().is_ok());
        assert_eq!(profile.port, 1);
    }
}
