//! Event-streaming client settings
//!
//! Only the configuration shape lives here; producers and consumers are built
//! by the services that need them.

use serde::Deserialize;
use std::fmt;

#[derive(Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case", default)]
pub struct KafkaConfig {
    /// Comma separated `host:port` list
    pub brokers: String,
    pub group_id: String,
    pub topic_prefix: String,
    pub security_protocol: String,
    pub sasl_mechanism: String,
    pub username: String,
    pub password: String,
    pub schema_registry: String,
}

impl KafkaConfig {
    /// Splits the broker list into individual addresses
    pub fn broker_list(&self) -> Vec<&str> {
        self.brokers
            .split(',')
            .map(str::trim)
            .filter(|b| !b.is_empty())
            .collect()
    }

    /// Prefixes a topic name with the configured prefix
    pub fn topic(&self, name: &str) -> String {
        if self.topic_prefix.is_empty() {
            name.to_string()
        } else {
            format!("{}.{}", self.topic_prefix, name)
        }
    }
}

impl fmt::Debug for KafkaConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KafkaConfig")
            .field("brokers", &self.brokers)
            .field("group_id", &self.group_id)
            .field("topic_prefix", &self.topic_prefix)
            .field("security_protocol", &self.security_protocol)
            .field("sasl_mechanism", &self.sasl_mechanism)
            .field("username", &self.username)
            .field("password", &"***")
            .field("schema_registry", &self.schema_registry)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_broker_list() {
        let config = KafkaConfig {
            brokers: "a:9092, b:9092,,".to_string(),
            ..Default::default()
        };
        assert_eq!(config.broker_list(), vec!["a:9092", "b:9092"]);
    }

    #[test]
    fn test_topic_prefix() {
        let mut config = KafkaConfig::default();
        assert_eq!(config.topic("users"), "users");
        config.topic_prefix = "shop".to_string();
        assert_eq!(config.topic("users"), "shop.users");
    }

    #[test]
    fn test_debug_hides_password() {
        let config = KafkaConfig {
            password: "hunter2".to_string(),
            ..Default::default()
        };
        assert!(!format!("{:?}", config).contains("hunter2"));
    }
}
