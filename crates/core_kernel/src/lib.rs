//! Core Kernel - shared foundations for the services
//!
//! This crate provides the building blocks every service binary uses:
//! - YAML configuration loading with `${VAR:-default}` environment substitution
//! - Duration parsing for configuration values
//! - Server, endpoint and event-streaming configuration shapes
//! - Tracing subscriber setup

pub mod config;
pub mod duration;
pub mod endpoint;
pub mod error;
pub mod kafka;
pub mod server;
pub mod telemetry;

pub use duration::{parse_duration, DurationError};
pub use endpoint::EndpointConfig;
pub use error::CoreError;
pub use kafka::KafkaConfig;
pub use server::ServerConfig;
pub use telemetry::{init_tracing, LogFormat, LoggingConfig};
