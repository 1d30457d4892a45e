//! Process lifecycle: start, serve, stop

use axum::Router;
use infra_db::ConnectionSet;
use std::future::Future;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::config::UserServiceConfig;
use crate::error::ServiceError;
use crate::{create_router, AppState};

/// A started user service
///
/// Owns the database connections for the lifetime of the process. The
/// connections are closed exactly once, by [`App::stop`] or at the end of
/// [`App::serve`].
pub struct App {
    config: UserServiceConfig,
    connections: ConnectionSet,
    router: Router,
}

impl App {
    /// Opens the database connections and builds the router
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Database` if either pool cannot be opened.
    pub async fn start(config: UserServiceConfig) -> Result<Self, ServiceError> {
        info!(
            service = %config.server.name,
            prod = config.endpoint.is_prod(),
            "Starting user service"
        );

        let connections = ConnectionSet::open(&config.db).await?;
        let router = create_router(AppState {
            service: config.server.name.clone(),
            primary: connections.primary().clone(),
            replica: connections.replica().clone(),
        });

        Ok(Self {
            config,
            connections,
            router,
        })
    }

    pub fn config(&self) -> &UserServiceConfig {
        &self.config
    }

    pub fn connections(&self) -> &ConnectionSet {
        &self.connections
    }

    /// Returns a handle to the router, for serving or in-process requests
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Binds the configured address and serves until `shutdown` completes
    ///
    /// In-flight requests are drained before the connections are closed.
    /// The connections are closed even if serving fails.
    pub async fn serve<F>(self, shutdown: F) -> Result<(), ServiceError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = self.config.server.server_addr();
        let listener = match TcpListener::bind(&addr).await {
            Ok(listener) => listener,
            Err(source) => {
                if let Err(e) = self.stop().await {
                    warn!(error = %e, "Failed to close connections after bind failure");
                }
                return Err(ServiceError::Bind { addr, source });
            }
        };
        self.serve_on(listener, shutdown).await
    }

    /// Serves on an already bound listener until `shutdown` completes
    pub async fn serve_on<F>(self, listener: TcpListener, shutdown: F) -> Result<(), ServiceError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let local: Option<SocketAddr> = listener.local_addr().ok();
        info!(addr = ?local, "Server listening");

        let served = axum::serve(listener, self.router.clone())
            .with_graceful_shutdown(shutdown)
            .await;
        if let Err(e) = &served {
            warn!(error = %e, "Server stopped with an error");
        }

        self.stop().await?;
        served.map_err(ServiceError::Serve)
    }

    /// Closes the database connections
    pub async fn stop(self) -> Result<(), ServiceError> {
        let Self {
            connections,
            router,
            ..
        } = self;
        drop(router);

        connections.close().await?;
        info!("Server shutdown complete");
        Ok(())
    }
}

/// Waits for Ctrl+C or SIGTERM
///
/// This enables graceful shutdown of the server, allowing in-flight
/// requests to complete before the process exits.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
