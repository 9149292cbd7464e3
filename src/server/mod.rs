//! Agent HTTP service.
//!
//! ```text
//! GET  /                      liveness
//! POST /search                {text, user_id?} → {message}
//! GET  /get-pdf?file_name=…   stored PDF bytes, or 404 {error}
//! POST /session/rotate        → {session_id}
//! POST /memory/wipe           drop every session
//! ```
//!
//! The [`CancellationToken`] is wired to axum's graceful shutdown.

mod api;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::agent::ConversationAgent;
use crate::error::AppError;
use crate::rag::RagIndex;

/// Router state; cheap to clone.
#[derive(Clone)]
pub struct AgentState {
    pub agent: Arc<ConversationAgent>,
    pub index: Arc<RagIndex>,
}

pub fn build_router(state: AgentState) -> Router {
    Router::new()
        .route("/",               get(api::root))
        .route("/search",         post(api::search))
        .route("/get-pdf",        get(api::get_pdf))
        .route("/session/rotate", post(api::rotate_session))
        .route("/memory/wipe",    post(api::wipe_memory))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind `bind_addr` and serve until `shutdown` is cancelled.
pub async fn serve(
    bind_addr: &str,
    state: AgentState,
    shutdown: CancellationToken,
) -> Result<(), AppError> {
    let listener = TcpListener::bind(bind_addr)
        .await
        .map_err(|e| AppError::Http(format!("agent bind failed on {bind_addr}: {e}")))?;

    info!(%bind_addr, "agent service listening");

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| AppError::Http(format!("agent server error: {e}")))?;

    info!("agent service shut down");
    Ok(())
}
