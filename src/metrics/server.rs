//! HTTP server for the Prometheus metrics endpoint.
//!
//! The pipeline itself is synchronous, so the server owns a small tokio
//! runtime on a background thread and is stopped through its handle.

use crate::metrics::MetricsRegistry;
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use std::thread::JoinHandle;
use thiserror::Error;
use tokio::sync::oneshot;
use tower_http::cors::CorsLayer;

/// Errors that can occur during metrics server operations.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind to address: {0}")]
    Bind(#[source] std::io::Error),

    #[error("failed to start metrics runtime: {0}")]
    Runtime(#[source] std::io::Error),

    #[error("server error: {0}")]
    Server(String),
}

/// Configuration for the metrics server.
#[derive(Debug, Clone)]
pub struct MetricsServerConfig {
    /// Address to bind the server to.
    pub bind_addr: SocketAddr,
}

impl Default for MetricsServerConfig {
    fn default() -> Self {
        Self::with_port(9090)
    }
}

impl MetricsServerConfig {
    /// Creates a loopback config with a custom port.
    pub fn with_port(port: u16) -> Self {
        Self {
            bind_addr: ([127, 0, 0, 1], port).into(),
        }
    }
}

/// HTTP server exposing a shared [`MetricsRegistry`].
pub struct MetricsServer {
    config: MetricsServerConfig,
    registry: Arc<MetricsRegistry>,
}

/// Running server; dropping it without [`shutdown`](Self::shutdown) leaves
/// the thread serving until the process exits.
pub struct MetricsServerHandle {
    local_addr: SocketAddr,
    shutdown: oneshot::Sender<()>,
    thread: JoinHandle<Result<(), ServerError>>,
}

impl MetricsServer {
    pub fn new(config: MetricsServerConfig, registry: Arc<MetricsRegistry>) -> Self {
        Self { config, registry }
    }

    /// Binds the address and starts serving on a dedicated thread.
    pub fn spawn(self) -> Result<MetricsServerHandle, ServerError> {
        let listener =
            std::net::TcpListener::bind(self.config.bind_addr).map_err(ServerError::Bind)?;
        listener.set_nonblocking(true).map_err(ServerError::Bind)?;
        let local_addr = listener.local_addr().map_err(ServerError::Bind)?;

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .map_err(ServerError::Runtime)?;
        let (shutdown, signal) = oneshot::channel();

        let thread = std::thread::Builder::new()
            .name("metrics-server".to_string())
            .spawn(move || runtime.block_on(self.serve(listener, signal)))
            .map_err(ServerError::Runtime)?;

        tracing::info!(addr = %local_addr, "Metrics server listening");
        Ok(MetricsServerHandle {
            local_addr,
            shutdown,
            thread,
        })
    }

    async fn serve(
        self,
        listener: std::net::TcpListener,
        signal: oneshot::Receiver<()>,
    ) -> Result<(), ServerError> {
        let app = Router::new()
            .route("/metrics", get(metrics_handler))
            .route("/health", get(health_handler))
            .layer(CorsLayer::permissive())
            .with_state(self.registry);

        let listener = tokio::net::TcpListener::from_std(listener).map_err(ServerError::Bind)?;

        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = signal.await;
            })
            .await
            .map_err(|e| ServerError::Server(e.to_string()))
    }
}

impl MetricsServerHandle {
    /// Address the server is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stops the server and waits for its thread.
    pub fn shutdown(self) -> Result<(), ServerError> {
        let _ = self.shutdown.send(());
        self.thread
            .join()
            .map_err(|_| ServerError::Server("metrics thread panicked".to_string()))?
    }
}

/// Handler for the /metrics endpoint.
async fn metrics_handler(State(registry): State<Arc<MetricsRegistry>>) -> impl IntoResponse {
    match registry.encode() {
        Ok(output) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            output,
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            format!("Failed to encode metrics: {}", e),
        ),
    }
}

/// Handler for the /health endpoint.
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::MetricsSnapshot;
    use std::io::{Read, Write};
    use std::net::TcpStream;
    use std::time::Duration;

    fn http_get(addr: SocketAddr, path: &str) -> String {
        let mut stream = TcpStream::connect(addr).unwrap();
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        write!(
            stream,
            "GET {} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
            path
        )
        .unwrap();

        let mut response = String::new();
        stream.read_to_string(&mut response).unwrap();
        response
    }

    #[test]
    fn test_config_default() {
        let config = MetricsServerConfig::default();
        assert_eq!(config.bind_addr.port(), 9090);
        assert!(config.bind_addr.ip().is_loopback());
    }

    #[test]
    fn test_spawn_and_shutdown() {
        let registry = Arc::new(MetricsRegistry::new().unwrap());
        let server = MetricsServer::new(MetricsServerConfig::with_port(0), registry);

        let handle = server.spawn().unwrap();
        assert_ne!(handle.local_addr().port(), 0);
        handle.shutdown().unwrap();
    }

    #[test]
    fn test_serves_current_values() {
        let registry = Arc::new(MetricsRegistry::new().unwrap());
        let server = MetricsServer::new(MetricsServerConfig::with_port(0), Arc::clone(&registry));
        let handle = server.spawn().unwrap();

        registry.update(&MetricsSnapshot {
            frames_acquired: 7,
            frames_saved: 5,
            ..Default::default()
        });

        let response = http_get(handle.local_addr(), "/metrics");
        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.contains("frame_relay_frames_acquired_total 7"));
        assert!(response.contains("frame_relay_frames_saved_total 5"));

        assert!(http_get(handle.local_addr(), "/health").ends_with("OK"));
        handle.shutdown().unwrap();
    }

    #[test]
    fn test_bind_conflict_reported_as_bind() {
        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = taken.local_addr().unwrap().port();
        let registry = Arc::new(MetricsRegistry::new().unwrap());

        let err = MetricsServer::new(MetricsServerConfig::with_port(port), registry)
            .spawn()
            .err()
            .unwrap();
        assert!(matches!(err, ServerError::Bind(_)));
    }
}
