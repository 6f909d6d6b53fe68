//! Master server with graceful shutdown
//!
//! Serves the JSON RPC surface on the configured address and drains on
//! Ctrl+C or SIGTERM.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use tokio::signal;
use tracing::{error, info};

use master_core::config::ServerConfig;
use master_core::{Error, Result};

use crate::http_api::create_router;
use crate::servicer::MasterServicer;

/// Master HTTP server
pub struct MasterServer {
    config: ServerConfig,
    servicer: Arc<MasterServicer>,
}

impl MasterServer {
    pub fn new(servicer: Arc<MasterServicer>) -> Self {
        Self {
            config: ServerConfig::default(),
            servicer,
        }
    }

    pub fn with_config(servicer: Arc<MasterServicer>, config: ServerConfig) -> Self {
        Self { config, servicer }
    }

    pub fn addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.config.bind_address, self.config.port)
            .parse()
            .map_err(|e| Error::InvalidArgument {
                message: format!("Bad bind address: {}", e),
            })
    }

    /// Run the server until shutdown signal
    pub async fn run(self) -> Result<()> {
        let addr = self.addr()?;
        let router = create_router(self.servicer)
            .layer(DefaultBodyLimit::max(self.config.max_receive_message_bytes));

        info!(address = %addr, "Starting master server");
        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!(address = %addr, "Master server listening");

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| {
                error!(error = %e, "Server error");
                Error::Io(e)
            })?;

        info!("Master server shutdown complete");
        Ok(())
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_addr() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_address, "0.0.0.0");
        assert_eq!(config.port, 50001);
    }
}
