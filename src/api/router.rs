//! HTTP router configuration.

use std::net::SocketAddr;

use axum::{
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{command, health, info, invoke, AppState};
use crate::error::ReplError;

/// Build the router. Commands are accepted at `path`.
pub fn create_router(state: AppState, path: &str) -> Router {
    let path = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    };

    Router::new()
        .route("/", get(info))
        .route("/health", get(health))
        .route(&path, post(command))
        .route("/invoke/{function}", post(invoke))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Bind `addr` and serve the router until the task is dropped or the
/// server fails.
pub async fn serve(addr: SocketAddr, state: AppState, path: &str) -> crate::Result<()> {
    let router = create_router(state, path);
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| ReplError::TransportBind {
            address: addr.to_string(),
            source,
        })?;

    tracing::info!("HTTP transport on http://{}{}", listener.local_addr()?, path);

    axum::serve(listener, router)
        .await
        .map_err(|e| ReplError::Io(std::io::Error::other(e.to_string())))?;

    Ok(())
}
