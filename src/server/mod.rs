//! HTTP surface of the chat relay.

pub mod handlers;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    Router,
    routing::{get, post},
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::relay::ChatRelay;
use handlers::{chat_handler, index_handler};

/// Shared, read-only state handed to every request.
#[derive(Clone)]
pub struct AppState {
    pub relay: Arc<ChatRelay>,
}

impl AppState {
    pub fn new(relay: ChatRelay) -> Self {
        Self {
            relay: Arc::new(relay),
        }
    }
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/chat", post(chat_handler))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Serve until Ctrl+C.
pub async fn serve(addr: SocketAddr, state: AppState) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    info!("chat relay listening on {}", addr);

    axum::serve(listener, create_app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("chat relay stopped");
    Ok(())
}

async fn shutdown_signal() {
    // An error here means no signal handler; just run until killed
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}
