//! Agent service handlers.

use axum::{
    Json,
    extract::{Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info, warn};

use super::AgentState;

/// Reply sent when a chat turn fails for any reason.
pub const APOLOGY: &str =
    "Sorry, something went wrong while answering your question. Please try again.";

#[derive(Deserialize)]
pub(super) struct SearchRequest {
    text: String,
    #[serde(default, alias = "User_id")]
    user_id: Option<String>,
}

#[derive(Deserialize)]
pub(super) struct PdfQuery {
    file_name: String,
}

fn json_error(status: StatusCode, msg: impl std::fmt::Display) -> Response {
    (status, Json(json!({ "error": msg.to_string() }))).into_response()
}

/// GET /
pub(super) async fn root(State(state): State<AgentState>) -> Response {
    Json(json!({
        "status": "Online",
        "message": format!("docchat agent is running (llm: {})", state.agent.llm_name()),
    }))
    .into_response()
}

/// POST /search
pub(super) async fn search(
    State(state): State<AgentState>,
    Json(req): Json<SearchRequest>,
) -> Response {
    if req.text.trim().is_empty() {
        return json_error(StatusCode::BAD_REQUEST, "No text provided");
    }

    match state.agent.run_chat(req.user_id.as_deref(), &req.text).await {
        Ok(message) => Json(json!({ "message": message })).into_response(),
        Err(e) => {
            error!(user_id = ?req.user_id, error = %e, "chat turn failed");
            (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "message": APOLOGY }))).into_response()
        }
    }
}

/// GET /get-pdf?file_name=…
pub(super) async fn get_pdf(
    State(state): State<AgentState>,
    Query(query): Query<PdfQuery>,
) -> Response {
    let Some(path) = state.index.pdf_path(&query.file_name).await else {
        warn!(file = %query.file_name, "requested PDF not found");
        return json_error(StatusCode::NOT_FOUND, "File not found");
    };

    match tokio::fs::read(&path).await {
        Ok(bytes) => {
            info!(file = %query.file_name, bytes = bytes.len(), "serving PDF");
            (
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, "application/pdf".to_string()),
                    (
                        header::CONTENT_DISPOSITION,
                        format!("inline; filename=\"{}\"", query.file_name),
                    ),
                ],
                bytes,
            )
                .into_response()
        }
        Err(e) => {
            error!(path = %path.display(), error = %e, "failed to read PDF");
            json_error(StatusCode::NOT_FOUND, "File not found")
        }
    }
}

/// POST /session/rotate
pub(super) async fn rotate_session(State(state): State<AgentState>) -> Response {
    let session_id = state.agent.rotate_default_session().await;
    Json(json!({ "session_id": session_id })).into_response()
}

/// POST /memory/wipe
pub(super) async fn wipe_memory(State(state): State<AgentState>) -> Response {
    state.agent.wipe_all().await;
    Json(json!({ "success": true, "message": "All session memory wiped" })).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{ConversationAgent, ToolBox};
    use crate::config::Config;
    use crate::rag::{PDF_DIR, RagIndex};
    use crate::{embeddings, llm};
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use std::sync::Arc;
    use tempfile::TempDir;
    use tower::ServiceExt;

    async fn state() -> (TempDir, AgentState) {
        let temp = TempDir::new().unwrap();
        let cfg = Config::test_default(temp.path());
        let embedder = embeddings::build(&cfg.embeddings, None).unwrap();
        let index = Arc::new(RagIndex::open(temp.path(), &cfg.rag, embedder).await.unwrap());
        let llm = llm::providers::build(&cfg.llm, None).unwrap();
        let agent = Arc::new(ConversationAgent::new(
            llm,
            ToolBox::new(index.clone(), 3, 20),
            "system".into(),
            cfg.agent.max_tool_rounds,
        ));
        (temp, AgentState { agent, index })
    }

    async fn call(state: &AgentState, req: Request<Body>) -> (StatusCode, Vec<u8>) {
        let resp = super::super::build_router(state.clone()).oneshot(req).await.unwrap();
        let status = resp.status();
        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, body.to_vec())
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn root_reports_online() {
        let (_t, state) = state().await;
        let (status, body) = call(&state, Request::get("/").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        let v: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(v["status"], "Online");
    }

    #[tokio::test]
    async fn search_returns_message_field() {
        let (_t, state) = state().await;
        let (status, body) =
            call(&state, post_json("/search", json!({ "text": "hello", "user_id": "u1" }))).await;
        assert_eq!(status, StatusCode::OK);
        let v: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(v["message"], "[echo] hello");
        assert!(v.get("mesagge").is_none());
        assert_eq!(state.agent.sessions().get("u1").await.len(), 2);
    }

    #[tokio::test]
    async fn legacy_user_id_alias_is_accepted() {
        let (_t, state) = state().await;
        let (status, _) =
            call(&state, post_json("/search", json!({ "text": "hi", "User_id": "legacy" }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(state.agent.sessions().get("legacy").await.len(), 2);
    }

    #[tokio::test]
    async fn empty_text_is_rejected() {
        let (_t, state) = state().await;
        let (status, _) = call(&state, post_json("/search", json!({ "text": "  " }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn rotate_and_wipe() {
        let (_t, state) = state().await;
        call(&state, post_json("/search", json!({ "text": "one" }))).await;
        let old_key = state.agent.default_session_key().await;

        let (status, body) = call(&state, post_json("/session/rotate", json!({}))).await;
        assert_eq!(status, StatusCode::OK);
        let v: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_ne!(v["session_id"], old_key.as_str());
        assert_eq!(state.agent.sessions().get(&old_key).await.len(), 2);

        let (status, _) = call(&state, post_json("/memory/wipe", json!({}))).await;
        assert_eq!(status, StatusCode::OK);
        assert!(state.agent.sessions().get(&old_key).await.is_empty());
    }

    #[tokio::test]
    async fn get_pdf_serves_stored_file() {
        let (temp, state) = state().await;
        std::fs::write(temp.path().join(PDF_DIR).join("notes.pdf"), b"%PDF-1.4 fake").unwrap();

        let req = Request::get("/get-pdf?file_name=notes.pdf").body(Body::empty()).unwrap();
        let resp = build(&state).oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[header::CONTENT_TYPE], "application/pdf");
        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"%PDF-1.4 fake");
    }

    #[tokio::test]
    async fn get_pdf_missing_is_404_json() {
        let (_t, state) = state().await;
        for uri in ["/get-pdf?file_name=nope.pdf", "/get-pdf?file_name=..%2Fsecret.pdf"] {
            let (status, body) = call(&state, Request::get(uri).body(Body::empty()).unwrap()).await;
            assert_eq!(status, StatusCode::NOT_FOUND);
            let v: serde_json::Value = serde_json::from_slice(&body).unwrap();
            assert!(v["error"].is_string());
        }
    }

    fn build(state: &AgentState) -> axum::Router {
        super::super::build_router(state.clone())
    }
}
