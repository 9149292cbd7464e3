//! Web service handlers.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info, warn};

use super::{TranscriptEntry, WebState};

/// Bot reply when the agent cannot be reached or answers with an error status.
pub const AGENT_UNREACHABLE: &str = "System Error: Agent is unreachable.";
/// Bot reply when the agent answers 2xx without a `message` field.
pub const AGENT_NO_MESSAGE: &str = "Something is wrong with the agent";

const INDEX_HTML: &str = include_str!("index.html");

#[derive(Deserialize)]
pub(super) struct SendRequest {
    #[serde(default)]
    message: String,
}

fn json_failure(status: StatusCode, msg: impl std::fmt::Display) -> Response {
    (status, Json(json!({ "success": false, "error": msg.to_string() }))).into_response()
}

fn now_hms() -> String {
    chrono::Local::now().format("%H:%M:%S").to_string()
}

/// GET /
pub(super) async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

/// POST /api/send
pub(super) async fn send(
    State(state): State<Arc<WebState>>,
    Json(req): Json<SendRequest>,
) -> Response {
    if req.message.trim().is_empty() {
        return json_failure(StatusCode::BAD_REQUEST, "No message provided");
    }

    let timestamp = now_hms();
    let reply = ask_agent(&state, &req.message).await;

    let user = TranscriptEntry {
        kind: "user".into(),
        content: req.message,
        timestamp: timestamp.clone(),
    };
    let bot = TranscriptEntry { kind: "bot".into(), content: reply, timestamp };
    {
        let mut transcript = state.transcript.lock().await;
        transcript.push(user);
        transcript.push(bot.clone());
    }

    Json(json!({ "success": true, "response": bot })).into_response()
}

/// Forward one message to the agent's `/search` and extract the reply text.
async fn ask_agent(state: &WebState, text: &str) -> String {
    let url = format!("{}/search", state.agent_base_url);
    let user_id = state.session_key().await;

    let response = match state
        .client
        .post(&url)
        .timeout(state.request_timeout)
        .json(&json!({ "text": text, "user_id": user_id }))
        .send()
        .await
    {
        Ok(r) => r,
        Err(e) => {
            error!(%url, error = %e, "connection to agent failed");
            return AGENT_UNREACHABLE.to_string();
        }
    };

    let status = response.status();
    let body = match response.json::<serde_json::Value>().await {
        Ok(v) => v,
        Err(e) => {
            error!(%url, %status, error = %e, "agent returned a non-JSON body");
            return AGENT_UNREACHABLE.to_string();
        }
    };

    match body.get("message").and_then(|m| m.as_str()) {
        Some(message) => {
            if !status.is_success() {
                warn!(%status, "agent reported an error");
            }
            message.to_string()
        }
        None if status.is_success() => AGENT_NO_MESSAGE.to_string(),
        None => {
            error!(%status, "agent returned an error without a message");
            AGENT_UNREACHABLE.to_string()
        }
    }
}

/// GET /api/history
pub(super) async fn history(State(state): State<Arc<WebState>>) -> Response {
    Json(json!({ "success": true, "messages": state.transcript().await })).into_response()
}

/// POST /api/clear
pub(super) async fn clear(State(state): State<Arc<WebState>>) -> Response {
    state.transcript.lock().await.clear();
    let key = uuid::Uuid::new_v4().to_string();
    *state.session_key.write().await = key.clone();
    info!(session = %key, "chat cleared, new session");
    Json(json!({ "success": true, "message": "Chat history cleared" })).into_response()
}

/// Normalise a requested PDF name: drop any `#fragment`, ensure a `.pdf`
/// extension, refuse anything that is not a plain file name.
pub(super) fn sanitize_pdf_name(raw: &str) -> Option<String> {
    let name = raw.split('#').next().unwrap_or_default().trim();
    if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
        return None;
    }
    if name.to_lowercase().ends_with(".pdf") {
        Some(name.to_string())
    } else {
        Some(format!("{name}.pdf"))
    }
}

/// GET /api/get-pdf/{filename}
pub(super) async fn get_pdf(
    State(state): State<Arc<WebState>>,
    Path(filename): Path<String>,
) -> Response {
    let Some(filename) = sanitize_pdf_name(&filename) else {
        return json_failure(StatusCode::BAD_REQUEST, "Invalid file name");
    };

    let url = format!("{}/get-pdf", state.agent_base_url);
    info!(file = %filename, %url, "requesting PDF from agent");

    let response = match state
        .client
        .get(&url)
        .query(&[("file_name", filename.as_str())])
        .timeout(state.pdf_timeout)
        .send()
        .await
    {
        Ok(r) => r,
        Err(e) => {
            error!(file = %filename, error = %e, "PDF fetch failed");
            return json_failure(StatusCode::INTERNAL_SERVER_ERROR, e);
        }
    };

    if response.status() != StatusCode::OK {
        error!(file = %filename, status = %response.status(), "agent could not provide PDF");
        return json_failure(StatusCode::NOT_FOUND, "PDF not found on agent");
    }

    let bytes = match response.bytes().await {
        Ok(b) => b,
        Err(e) => {
            error!(file = %filename, error = %e, "PDF body read failed");
            return json_failure(StatusCode::INTERNAL_SERVER_ERROR, e);
        }
    };

    let target = state.static_dir.join(&filename);
    let written = async {
        tokio::fs::create_dir_all(&state.static_dir).await?;
        tokio::fs::write(&target, &bytes).await
    }
    .await;
    if let Err(e) = written {
        error!(path = %target.display(), error = %e, "failed to cache PDF");
        return json_failure(StatusCode::INTERNAL_SERVER_ERROR, e);
    }

    info!(file = %filename, path = %target.display(), "PDF cached");
    Json(json!({ "success": true, "path": format!("/static/{filename}") })).into_response()
}
