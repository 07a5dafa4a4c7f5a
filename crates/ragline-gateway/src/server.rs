use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use ragline_core::App;
use ragline_steps::RetentionSweeper;
use tokio::sync::watch;

use crate::error::GatewayError;
use crate::router::build_router;

const DEFAULT_MAX_BODY_SIZE: usize = 1_048_576;

/// Shared handler state: the wired application and the server start time.
#[derive(Clone)]
pub struct AppState {
    pub app: App,
    pub started_at: Instant,
}

impl AppState {
    #[must_use]
    pub fn new(app: App) -> Self {
        Self {
            app,
            started_at: Instant::now(),
        }
    }
}

pub struct GatewayServer {
    addr: SocketAddr,
    max_body_size: usize,
    app: App,
    shutdown_rx: watch::Receiver<bool>,
}

impl GatewayServer {
    #[must_use]
    pub fn new(bind: &str, port: u16, app: App, shutdown_rx: watch::Receiver<bool>) -> Self {
        let ip: IpAddr = bind.parse().unwrap_or_else(|e| {
            tracing::warn!("invalid bind '{bind}': {e}, falling back to 127.0.0.1:{port}");
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        });
        let addr = SocketAddr::new(ip, port);

        if bind == "0.0.0.0" {
            tracing::warn!("gateway binding to 0.0.0.0 without authentication");
        }

        Self {
            addr,
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            app,
            shutdown_rx,
        }
    }

    /// Build from the `[gateway]` section of the application's config.
    #[must_use]
    pub fn from_app(app: App, shutdown_rx: watch::Receiver<bool>) -> Self {
        let gateway = app.config.gateway.clone();
        Self::new(&gateway.bind, gateway.port, app, shutdown_rx)
            .with_max_body_size(gateway.max_body_size)
    }

    #[must_use]
    pub fn with_max_body_size(mut self, size: usize) -> Self {
        self.max_body_size = size;
        self
    }

    #[must_use]
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Start the HTTP gateway and run until the shutdown signal flips to `true`.
    ///
    /// # Errors
    ///
    /// Returns an error if the server fails to bind or encounters a fatal I/O error.
    pub async fn serve(self) -> Result<(), GatewayError> {
        let steps = &self.app.config.steps;
        let mut sweeper = RetentionSweeper::new(
            Arc::clone(&self.app.step_store),
            steps.retention(),
            steps.purge_interval().max(Duration::from_secs(1)),
            self.shutdown_rx.clone(),
        );
        let sweeper = tokio::spawn(async move { sweeper.run().await });
        let result = self.serve_http().await;
        sweeper.abort();
        result
    }

    async fn serve_http(self) -> Result<(), GatewayError> {
        let router = build_router(AppState::new(self.app), self.max_body_size);

        let listener = tokio::net::TcpListener::bind(self.addr)
            .await
            .map_err(|e| GatewayError::Bind(self.addr.to_string(), e))?;
        tracing::info!("gateway listening on {}", self.addr);

        let mut shutdown_rx = self.shutdown_rx;
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                while !*shutdown_rx.borrow_and_update() {
                    if shutdown_rx.changed().await.is_err() {
                        std::future::pending::<()>().await;
                    }
                }
                tracing::info!("gateway shutting down");
            })
            .await
            .map_err(|e| GatewayError::Server(format!("{e}")))?;

        Ok(())
    }
}
