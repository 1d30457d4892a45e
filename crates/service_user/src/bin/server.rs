//! User Service - Server Binary
//!
//! This binary starts the user service.
//!
//! # Usage
//!
//! ```bash
//! # Run with config.default.yaml from the working directory
//! cargo run --bin user-service
//!
//! # Select config.prod.yaml and override values referenced as ${VAR}
//! SERVICE_ENV=prod DB_HOST=db.internal DB_PASSWORD=... cargo run --bin user-service
//! ```
//!
//! # Environment Variables
//!
//! * `SERVICE_ENV` - Selects `config.<SERVICE_ENV>.yaml` (default: `config.default.yaml`)
//! * `RUST_LOG` - Log filter, takes precedence over `logging.level`
//! * Any variable referenced from the YAML file as `${VAR}` or `${VAR:-default}`

use anyhow::Context;
use service_user::app::shutdown_signal;
use service_user::{App, UserServiceConfig};

/// Main entry point for the user service.
///
/// Loads configuration, initializes logging, opens the database connections
/// and serves until Ctrl+C or SIGTERM.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = UserServiceConfig::load().context("Failed to load configuration")?;

    core_kernel::init_tracing(&config.logging);

    tracing::info!(
        service = %config.server.name,
        addr = %config.server.server_addr(),
        db = %config.db.primary,
        "Configuration loaded"
    );

    let app = App::start(config)
        .await
        .context("Failed to start user service")?;

    app.serve(shutdown_signal()).await?;

    Ok(())
}
