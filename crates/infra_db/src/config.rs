//! Connection profiles and pool policies
//!
//! A [`DbConfig`] holds one [`ConnectionProfile`] for the primary (writes)
//! and one for the replica (reads). Each profile carries a [`PoolPolicy`]
//! whose fields are overrides: a field that is absent or zero keeps the
//! pool's built-in default.
//!
//! ```yaml
//! primary:
//!   host: localhost
//!   port: 5432
//!   user: app
//!   password: ${DB_PASSWORD}
//!   dbname: users
//!   ssl-mode: disable
//!   pool:
//!     max-conns: 20
//!     max-conn-idle-time: 5m
//! ```

use serde::Deserialize;
use sqlx::postgres::{PgConnectOptions, PgSslMode};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::DatabaseError;

/// Primary and replica connection profiles
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct DbConfig {
    pub primary: ConnectionProfile,
    pub replica: ConnectionProfile,
}

impl DbConfig {
    pub fn new(primary: ConnectionProfile, replica: ConnectionProfile) -> Self {
        Self { primary, replica }
    }

    /// Validates both profiles
    pub fn validate(&self) -> Result<(), DatabaseError> {
        self.primary
            .validate()
            .map_err(|e| prefixed("primary", e))?;
        self.replica
            .validate()
            .map_err(|e| prefixed("replica", e))
    }
}

fn prefixed(role: &str, error: DatabaseError) -> DatabaseError {
    match error {
        DatabaseError::Configuration(message) => {
            DatabaseError::Configuration(format!("{}: {}", role, message))
        }
        other => other,
    }
}

/// Connection settings for one PostgreSQL server
#[derive(Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct ConnectionProfile {
    pub host: String,
    pub port: u16,
    pub user: String,
    #[serde(default)]
    pub password: String,
    pub dbname: String,
    /// One of `disable`, `allow`, `prefer`, `require`, `verify-ca`,
    /// `verify-full`; empty keeps the driver default (`prefer`)
    #[serde(default)]
    pub ssl_mode: String,
    /// Reported to the server as `application_name`
    #[serde(default)]
    pub application_name: Option<String>,
    #[serde(default)]
    pub pool: PoolPolicy,
}

impl ConnectionProfile {
    /// Creates a profile with an empty pool policy and the default SSL mode
    ///
    /// # Example
    ///
    /// ```rust
    /// use infra_db::{ConnectionProfile, PoolPolicy};
    ///
    /// let profile = ConnectionProfile::new("localhost", 5432, "app", "secret", "users")
    ///     .ssl_mode("disable")
    ///     .pool(PoolPolicy::default().max_conns(20));
    ///
    /// assert_eq!(
    ///     profile.conn_string(),
    ///     "host=localhost port=5432 user=app password=secret dbname=users sslmode=disable"
    /// );
    /// ```
    pub fn new(
        host: impl Into<String>,
        port: u16,
        user: impl Into<String>,
        password: impl Into<String>,
        dbname: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            user: user.into(),
            password: password.into(),
            dbname: dbname.into(),
            ssl_mode: String::new(),
            application_name: None,
            pool: PoolPolicy::default(),
        }
    }

    pub fn ssl_mode(mut self, mode: impl Into<String>) -> Self {
        self.ssl_mode = mode.into();
        self
    }

    pub fn application_name(mut self, name: impl Into<String>) -> Self {
        self.application_name = Some(name.into());
        self
    }

    pub fn pool(mut self, policy: PoolPolicy) -> Self {
        self.pool = policy;
        self
    }

    /// Renders the libpq key/value connection string
    ///
    /// Key order and spacing match what existing tooling expects:
    /// `host=<H> port=<P> user=<U> password=<PW> dbname=<D> sslmode=<S>`.
    pub fn conn_string(&self) -> String {
        format!(
            "host={} port={} user={} password={} dbname={} sslmode={}",
            self.host, self.port, self.user, self.password, self.dbname, self.ssl_mode
        )
    }

    /// Checks the profile without touching the network
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::Configuration` for an empty host or database
    /// name, an unknown SSL mode, or an invalid pool policy.
    pub fn validate(&self) -> Result<(), DatabaseError> {
        if self.host.trim().is_empty() {
            return Err(DatabaseError::configuration("host must not be empty"));
        }
        if self.dbname.trim().is_empty() {
            return Err(DatabaseError::configuration("dbname must not be empty"));
        }
        self.parsed_ssl_mode()?;
        self.pool.validate()
    }

    fn parsed_ssl_mode(&self) -> Result<Option<PgSslMode>, DatabaseError> {
        if self.ssl_mode.is_empty() {
            return Ok(None);
        }
        PgSslMode::from_str(&self.ssl_mode).map(Some).map_err(|_| {
            DatabaseError::configuration(format!("unknown ssl-mode '{}'", self.ssl_mode))
        })
    }

    /// Builds the driver connect options for this profile
    pub fn connect_options(&self) -> Result<PgConnectOptions, DatabaseError> {
        let mut options = PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .database(&self.dbname);

        if !self.password.is_empty() {
            options = options.password(&self.password);
        }
        if let Some(mode) = self.parsed_ssl_mode()? {
            options = options.ssl_mode(mode);
        }
        if let Some(name) = &self.application_name {
            options = options.application_name(name);
        }

        Ok(options)
    }
}

impl fmt::Display for ConnectionProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "host={} port={} user={} password=*** dbname={} sslmode={}",
            self.host, self.port, self.user, self.dbname, self.ssl_mode
        )
    }
}

impl fmt::Debug for ConnectionProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionProfile")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"***")
            .field("dbname", &self.dbname)
            .field("ssl_mode", &self.ssl_mode)
            .field("application_name", &self.application_name)
            .field("pool", &self.pool)
            .finish()
    }
}

/// Pool sizing, lifetime and health-check overrides
///
/// Every field is optional. `None` and zero both mean "use the pool's
/// built-in default"; negative counts are rejected by [`PoolPolicy::validate`].
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case", default)]
pub struct PoolPolicy {
    pub max_conns: Option<i32>,
    pub min_conns: Option<i32>,
    #[serde(deserialize_with = "core_kernel::duration::deserialize_optional")]
    pub max_conn_lifetime: Option<Duration>,
    #[serde(deserialize_with = "core_kernel::duration::deserialize_optional")]
    pub max_conn_idle_time: Option<Duration>,
    #[serde(deserialize_with = "core_kernel::duration::deserialize_optional")]
    pub health_check_period: Option<Duration>,
    #[serde(deserialize_with = "core_kernel::duration::deserialize_optional")]
    pub connect_timeout: Option<Duration>,
}

impl PoolPolicy {
    pub fn max_conns(mut self, max: i32) -> Self {
        self.max_conns = Some(max);
        self
    }

    pub fn min_conns(mut self, min: i32) -> Self {
        self.min_conns = Some(min);
        self
    }

    pub fn max_conn_lifetime(mut self, lifetime: Duration) -> Self {
        self.max_conn_lifetime = Some(lifetime);
        self
    }

    pub fn max_conn_idle_time(mut self, idle: Duration) -> Self {
        self.max_conn_idle_time = Some(idle);
        self
    }

    pub fn health_check_period(mut self, period: Duration) -> Self {
        self.health_check_period = Some(period);
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Maximum connections, if overridden
    pub fn max_conns_override(&self) -> Option<u32> {
        positive_count(self.max_conns)
    }

    /// Minimum connections, if overridden
    pub fn min_conns_override(&self) -> Option<u32> {
        positive_count(self.min_conns)
    }

    pub fn max_conn_lifetime_override(&self) -> Option<Duration> {
        non_zero(self.max_conn_lifetime)
    }

    pub fn max_conn_idle_time_override(&self) -> Option<Duration> {
        non_zero(self.max_conn_idle_time)
    }

    pub fn health_check_period_override(&self) -> Option<Duration> {
        non_zero(self.health_check_period)
    }

    pub fn connect_timeout_override(&self) -> Option<Duration> {
        non_zero(self.connect_timeout)
    }

    /// Rejects negative counts and a minimum above the effective maximum
    pub fn validate(&self) -> Result<(), DatabaseError> {
        for (name, value) in [("max-conns", self.max_conns), ("min-conns", self.min_conns)] {
            if let Some(n) = value.filter(|n| *n < 0) {
                return Err(DatabaseError::configuration(format!(
                    "pool.{} must not be negative (got {})",
                    name, n
                )));
            }
        }

        if let Some(min) = self.min_conns_override() {
            let max = self
                .max_conns_override()
                .unwrap_or_else(|| sqlx::postgres::PgPoolOptions::new().get_max_connections());
            if min > max {
                return Err(DatabaseError::configuration(format!(
                    "pool.min-conns ({}) cannot exceed max-conns ({})",
                    min, max
                )));
            }
        }

        Ok(())
    }
}

fn positive_count(value: Option<i32>) -> Option<u32> {
    value.and_then(|n| u32::try_from(n).ok()).filter(|n| *n > 0)
}

fn non_zero(value: Option<Duration>) -> Option<Duration> {
    value.filter(|d| !d.is_zero())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile() -> ConnectionProfile {
        ConnectionProfile::new("db.internal", 5432, "app", "s3cret", "users").ssl_mode("disable")
    }

    #[test]
    fn test_conn_string_format() {
        assert_eq!(
            profile().conn_string(),
            "host=db.internal port=5432 user=app password=s3cret dbname=users sslmode=disable"
        );
    }

    #[test]
    fn test_display_and_debug_redact_password() {
        let profile = profile();
        assert!(!profile.to_string().contains("s3cret"));
        assert!(!format!("{:?}", profile).contains("s3cret"));
        assert!(profile.to_string().contains("dbname=users"));
    }

    #[test]
    fn test_validate_rejects_unknown_ssl_mode() {
        let err = profile().ssl_mode("sometimes").validate().unwrap_err();
        assert!(matches!(err, DatabaseError::Configuration(_)));
        assert!(err.to_string().contains("sometimes"));
    }

    #[test]
    fn test_validate_accepts_known_ssl_modes() {
        for mode in ["", "disable", "allow", "prefer", "require", "verify-ca", "verify-full"] {
            assert!(profile().ssl_mode(mode).validate().is_ok(), "{}", mode);
        }
    }

    #[test]
    fn test_validate_rejects_empty_host_and_dbname() {
        let mut missing_host = profile();
        missing_host.host = " ".to_string();
        assert!(missing_host.validate().is_err());

        let mut missing_db = profile();
        missing_db.dbname = String::new();
        assert!(missing_db.validate().is_err());
    }

    #[test]
    fn test_negative_pool_counts_rejected() {
        let err = PoolPolicy::default().max_conns(-1).validate().unwrap_err();
        assert!(err.to_string().contains("max-conns"));

        let err = PoolPolicy::default().min_conns(-3).validate().unwrap_err();
        assert!(err.to_string().contains("min-conns"));
    }

    #[test]
    fn test_min_above_max_rejected() {
        let err = PoolPolicy::default()
            .max_conns(2)
            .min_conns(5)
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("cannot exceed"));

        // The driver default maximum applies when max-conns is unset.
        assert!(PoolPolicy::default().min_conns(1000).validate().is_err());
    }

    #[test]
    fn test_zero_means_unset() {
        let policy = PoolPolicy {
            max_conns: Some(0),
            min_conns: Some(0),
            max_conn_lifetime: Some(Duration::ZERO),
            max_conn_idle_time: None,
            health_check_period: Some(Duration::ZERO),
            connect_timeout: Some(Duration::ZERO),
        };

        assert!(policy.validate().is_ok());
        assert_eq!(policy.max_conns_override(), None);
        assert_eq!(policy.min_conns_override(), None);
        assert_eq!(policy.max_conn_lifetime_override(), None);
        assert_eq!(policy.max_conn_idle_time_override(), None);
        assert_eq!(policy.health_check_period_override(), None);
        assert_eq!(policy.connect_timeout_override(), None);
    }

    #[test]
    fn test_db_config_validation_names_the_pool() {
        let config = DbConfig::new(profile(), profile().ssl_mode("bogus"));
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("replica"));
    }

    #[test]
    fn test_deserialize_profile_from_yaml() {
        let yaml = r#"
host: localhost
port: 5432
user: app
password: pw
dbname: users
ssl-mode: require
application-name: user-service
pool:
  max-conns: 20
  max-conn-lifetime: 1h
  max-conn-idle-time: 30m
  health-check-period: 0
  connect-timeout: 5
"#;
        let profile: ConnectionProfile = core_kernel::config::parse_yaml(yaml).unwrap();

        assert_eq!(profile.ssl_mode, "require");
        assert_eq!(profile.application_name.as_deref(), Some("user-service"));
        assert_eq!(profile.pool.max_conns_override(), Some(20));
        assert_eq!(profile.pool.min_conns, None);
        assert_eq!(profile.pool.max_conn_lifetime, Some(Duration::from_secs(3600)));
        assert_eq!(profile.pool.max_conn_idle_time, Some(Duration::from_secs(1800)));
        assert_eq!(profile.pool.health_check_period_override(), None);
        assert_eq!(profile.pool.connect_timeout, Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_deserialize_rejects_negative_duration() {
        let yaml = "host: h\nport: 1\nuser: u\ndbname: d\npool:\n  connect-timeout: -5s\n";
        let result: Result<ConnectionProfile, _> = core_kernel::config::parse_yaml(yaml);
        assert!(result.is_err());
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn min_within_max_is_valid(max in 1i32..=500, frac in 0.0f64..=1.0) {
                let min = (max as f64 * frac) as i32;
                let policy = PoolPolicy::default().max_conns(max).min_conns(min);
                prop_assert!(policy.validate().is_ok());
            }

            #[test]
            fn min_above_max_is_invalid(max in 1i32..=500, extra in 1i32..=500) {
                let policy = PoolPolicy::default().max_conns(max).min_conns(max + extra);
                prop_assert!(policy.validate().is_err());
            }

            #[test]
            fn password_never_rendered(password in "[a-zA-Z0-9]{8,24}") {
                let profile = ConnectionProfile::new("db", 5432, "app", password.clone(), "users");
                prop_assert!(!profile.to_string().contains(&password));
                let debug = format!("{:?}", profile);
                prop_assert!(!debug.contains(&password));
                prop_assert!(profile.conn_string().contains(&password));
            }
        }
    }
}
