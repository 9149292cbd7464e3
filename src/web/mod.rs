//! Web chat front end.
//!
//! Serves the chat page and a small JSON API that forwards to the agent
//! service. Keeps its own transcript and its own session key; clearing the
//! chat rotates the key so the agent starts a fresh conversation too.
//!
//! ```text
//! GET  /                        chat page
//! POST /api/send                {message} → {success, response}
//! GET  /api/history             {success, messages}
//! POST /api/clear               wipe transcript, rotate session key
//! GET  /api/get-pdf/{filename}  fetch from agent, cache under /static
//! GET  /static/*                cached PDFs
//! ```

mod api;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};
use tracing::info;

use crate::config::WebConfig;
use crate::error::AppError;

pub use api::{AGENT_NO_MESSAGE, AGENT_UNREACHABLE};

/// One line of the chat transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    /// `"user"` or `"bot"`.
    #[serde(rename = "type")]
    pub kind: String,
    pub content: String,
    /// Local wall-clock time, `HH:MM:SS`.
    pub timestamp: String,
}

pub struct WebState {
    client: reqwest::Client,
    agent_base_url: String,
    static_dir: PathBuf,
    request_timeout: Duration,
    pdf_timeout: Duration,
    transcript: Mutex<Vec<TranscriptEntry>>,
    session_key: RwLock<String>,
}

impl WebState {
    pub fn new(config: &WebConfig) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| AppError::Http(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            agent_base_url: config.agent_base_url(),
            static_dir: config.static_dir.clone(),
            request_timeout: Duration::from_secs(config.request_timeout_seconds),
            pdf_timeout: Duration::from_secs(config.pdf_timeout_seconds),
            transcript: Mutex::new(Vec::new()),
            session_key: RwLock::new(uuid::Uuid::new_v4().to_string()),
        })
    }

    pub async fn transcript(&self) -> Vec<TranscriptEntry> {
        self.transcript.lock().await.clone()
    }

    pub async fn session_key(&self) -> String {
        self.session_key.read().await.clone()
    }
}

pub fn build_router(state: Arc<WebState>) -> Router {
    let static_files = ServeDir::new(&state.static_dir);
    Router::new()
        .route("/",                       get(api::index))
        .route("/api/send",               post(api::send))
        .route("/api/history",            get(api::history))
        .route("/api/clear",              post(api::clear))
        .route("/api/get-pdf/{filename}", get(api::get_pdf))
        .nest_service("/static", static_files)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind `bind_addr` and serve until `shutdown` is cancelled.
pub async fn serve(
    bind_addr: &str,
    state: Arc<WebState>,
    shutdown: CancellationToken,
) -> Result<(), AppError> {
    let agent = state.agent_base_url.clone();
    let listener = TcpListener::bind(bind_addr)
        .await
        .map_err(|e| AppError::Http(format!("web bind failed on {bind_addr}: {e}")))?;

    info!(%bind_addr, %agent, "web service listening");

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| AppError::Http(format!("web server error: {e}")))?;

    info!("web service shut down");
    Ok(())
}
