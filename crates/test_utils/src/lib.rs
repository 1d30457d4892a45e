//! Test Utilities Crate
//!
//! Provides shared test infrastructure for the user service test suite.
//!
//! # Modules
//!
//! - `database`: PostgreSQL container management and connection profiles

pub mod database;

pub use database::*;
