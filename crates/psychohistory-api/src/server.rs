use crate::{create_router, AppState};
use psychohistory_core::{PsychoHistoryError, Result, Settings};
use std::net::SocketAddr;
use tokio::signal;
use tracing::info;

pub struct Server {
    state: AppState,
    addr: SocketAddr,
}

impl Server {
    pub fn new(settings: &Settings) -> Result<Self> {
        let addr: SocketAddr = format!("{}:{}", settings.host, settings.port)
            .parse()
            .map_err(|e| {
                PsychoHistoryError::Configuration(format!("invalid listen address: {e}"))
            })?;
        let state = AppState::from_settings(settings)?;
        Ok(Self { state, addr })
    }

    pub async fn run(self) -> Result<()> {
        let router = create_router(self.state);

        let listener = tokio::net::TcpListener::bind(self.addr)
            .await
            .map_err(|e| PsychoHistoryError::Configuration(format!("bind {}: {e}", self.addr)))?;

        info!("PsychoHistory API listening on http://{}", self.addr);
        info!("  GET  /health - liveness probe");
        info!("  POST /generate-tree/stream - stream a tree build");

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| PsychoHistoryError::Scheduler(format!("server error: {e}")))?;

        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down gracefully");
        },
        _ = terminate => {
            info!("Received SIGTERM, shutting down gracefully");
        },
    }
}
