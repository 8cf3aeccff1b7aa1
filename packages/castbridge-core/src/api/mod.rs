//! Channels between the browser extension and the bridge.
//!
//! - [`native`]: native messaging over stdin/stdout
//! - [`ws`]: the local WebSocket daemon
//!
//! Both are thin: they frame messages and hand them to a
//! [`BridgeRouter`](crate::router::BridgeRouter).

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::router::RouterContext;

pub mod native;
pub mod ws;
pub mod ws_connection;

pub use native::run_native_host;
pub use ws_connection::WsConnectionManager;

/// Errors that can occur when starting or running the daemon.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind to a TCP port.
    #[error("Failed to bind to port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("Server error: {0}")]
    Serve(#[from] std::io::Error),
}

/// Shared state for daemon handlers.
#[derive(Clone)]
pub struct DaemonState {
    pub ctx: RouterContext,
    pub connections: Arc<WsConnectionManager>,
}

impl DaemonState {
    pub fn new(ctx: RouterContext) -> Self {
        Self {
            ctx,
            connections: Arc::new(WsConnectionManager::new()),
        }
    }
}

/// Creates the daemon's axum router.
pub fn create_router(state: DaemonState) -> Router {
    Router::new().route("/", get(ws::ws_handler)).with_state(state)
}

/// Binds the daemon to loopback. Port 0 picks any free port.
pub async fn bind_daemon(port: u16) -> Result<(TcpListener, SocketAddr), ServerError> {
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind { port, source })?;
    let local = listener.local_addr()?;
    Ok((listener, local))
}

/// Serves the daemon until `shutdown` fires, then closes every connection.
pub async fn serve_daemon(
    listener: TcpListener,
    state: DaemonState,
    shutdown: CancellationToken,
) -> Result<(), ServerError> {
    if let Ok(addr) = listener.local_addr() {
        log::info!("[Server] Daemon listening on ws://{}", addr);
    }
    let connections = Arc::clone(&state.connections);
    let app = create_router(state);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.cancelled().await;
            connections.close_all();
        })
        .await?;
    log::info!("[Server] Daemon stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cast::transport::testing::HangingConnector;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn plain_get_is_refused_and_shutdown_stops_the_daemon() {
        let (listener, addr) = bind_daemon(0).await.unwrap();
        let shutdown = CancellationToken::new();
        let state = DaemonState::new(RouterContext::for_tests(Arc::new(HangingConnector)));
        let server = tokio::spawn(serve_daemon(listener, state, shutdown.clone()));

        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET / HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        assert!(response.starts_with("HTTP/1.1 4"), "got {response}");

        shutdown.cancel();
        server.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn occupied_port_is_a_bind_error() {
        let (_held, addr) = bind_daemon(0).await.unwrap();
        let err = bind_daemon(addr.port()).await.unwrap_err();
        assert!(matches!(err, ServerError::Bind { port, .. } if port == addr.port()));
    }
}
