//! OpenAI-compatible chat completion provider (`/v1/chat/completions`).
//!
//! Speaks the function-calling dialect: tool schemas go out in `tools`, tool
//! requests come back in `choices[0].message.tool_calls` with JSON-encoded
//! argument strings. All wire types are private to this module; callers only
//! see [`ChatMessage`], [`ToolSpec`] and [`AssistantTurn`].

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, trace};

use crate::llm::{AssistantTurn, ChatMessage, LlmUsage, ProviderError, ToolInvocation, ToolSpec};

// ── Public provider ───────────────────────────────────────────────────────────

/// Adapter for any HTTP endpoint implementing `/v1/chat/completions`.
///
/// Covers OpenAI, Gemini's OpenAI-compatible endpoint and local servers
/// (Ollama, LM Studio…). Constructed once at startup, then cheaply cloned
/// because `reqwest::Client` is an `Arc` internally.
#[derive(Debug, Clone)]
pub struct OpenAiCompatibleProvider {
    client: Client,
    api_base_url: String,
    model: String,
    temperature: f32,
    api_key: Option<String>,
}

impl OpenAiCompatibleProvider {
    /// Build a provider from config values and an optional API key.
    ///
    /// When `api_key` is present it is sent as `Authorization: Bearer <key>`.
    pub fn new(
        api_base_url: String,
        model: String,
        temperature: f32,
        timeout_seconds: u64,
        api_key: Option<String>,
    ) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_seconds))
            .build()
            .map_err(|e| ProviderError::Request(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, api_base_url, model, temperature, api_key })
    }

    /// One DECIDE round-trip: system prompt + history + tool schemas in,
    /// the model's text and/or tool invocations out.
    pub async fn chat(
        &self,
        system: Option<&str>,
        messages: &[ChatMessage],
        tools: &[ToolSpec],
    ) -> Result<AssistantTurn, ProviderError> {
        // gpt-5 family models reject an explicit temperature.
        let temperature = if self.model.starts_with("gpt-5") { None } else { Some(self.temperature) };

        let payload = ChatCompletionRequest {
            model: self.model.clone(),
            messages: to_wire_messages(system, messages),
            tools: tools.iter().map(WireTool::from).collect(),
            temperature,
        };

        debug!(
            model = %payload.model,
            messages = payload.messages.len(),
            tools = payload.tools.len(),
            "sending LLM request"
        );
        if tracing::enabled!(tracing::Level::TRACE) {
            let json = serde_json::to_string_pretty(&payload)
                .unwrap_or_else(|e| format!("<serialization failed: {e}>"));
            trace!(payload = %json, "full LLM request payload");
        }

        let mut req = self.client.post(&self.api_base_url).json(&payload);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let response = req.send().await.map_err(|e| {
            error!(url = %self.api_base_url, error = %e, "LLM HTTP request failed (transport)");
            ProviderError::Request(e.to_string())
        })?;

        let response = check_status(response).await?;

        let parsed = response.json::<ChatCompletionResponse>().await.map_err(|e| {
            error!(error = %e, "failed to deserialize LLM response");
            ProviderError::Malformed(format!("failed to parse response body: {e}"))
        })?;

        debug!(choices = parsed.choices.len(), "received LLM response");

        from_wire_response(parsed)
    }
}

// ── Conversions ───────────────────────────────────────────────────────────────

fn to_wire_messages(system: Option<&str>, messages: &[ChatMessage]) -> Vec<WireMessage> {
    let mut out = Vec::with_capacity(messages.len() + 1);
    if let Some(sys) = system {
        out.push(WireMessage::text("system", sys));
    }
    for msg in messages {
        let role = msg.role();
        out.push(match msg {
            ChatMessage::User { content } => WireMessage::text(role, content),
            ChatMessage::Assistant { content, tool_calls } => WireMessage {
                role: role.into(),
                content: if content.is_empty() && !tool_calls.is_empty() {
                    None
                } else {
                    Some(content.clone())
                },
                tool_calls: tool_calls.iter().map(WireToolCall::from).collect(),
                tool_call_id: None,
            },
            ChatMessage::Tool { tool_call_id, content } => WireMessage {
                role: role.into(),
                content: Some(content.clone()),
                tool_calls: Vec::new(),
                tool_call_id: Some(tool_call_id.clone()),
            },
        });
    }
    out
}

fn from_wire_response(parsed: ChatCompletionResponse) -> Result<AssistantTurn, ProviderError> {
    let usage = parsed.usage.map(|u| LlmUsage {
        input_tokens: u.prompt_tokens,
        output_tokens: u.completion_tokens,
    });

    let message = parsed
        .choices
        .into_iter()
        .next()
        .map(|c| c.message)
        .ok_or_else(|| ProviderError::Malformed("response has no choices".into()))?;

    let tool_calls = message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|call| {
            let raw = call.function.arguments.trim();
            let arguments = if raw.is_empty() {
                serde_json::Value::Object(Default::default())
            } else {
                serde_json::from_str(raw).map_err(|e| {
                    ProviderError::Malformed(format!(
                        "tool call '{}' has invalid JSON arguments: {e}",
                        call.function.name
                    ))
                })?
            };
            Ok(ToolInvocation { id: call.id, name: call.function.name, arguments })
        })
        .collect::<Result<Vec<_>, ProviderError>>()?;

    let content = message.content.map(|s| s.trim().to_string()).unwrap_or_default();
    if content.is_empty() && tool_calls.is_empty() {
        return Err(ProviderError::Malformed("empty content and no tool calls".into()));
    }

    Ok(AssistantTurn { content, tool_calls, usage })
}

// ── Private wire types ────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct WireMessage {
    role: String,
    content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<WireToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl WireMessage {
    fn text(role: &str, content: &str) -> Self {
        Self {
            role: role.into(),
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type", default = "function_kind")]
    kind: String,
    function: WireFunctionCall,
}

fn function_kind() -> String {
    "function".to_string()
}

impl From<&ToolInvocation> for WireToolCall {
    fn from(call: &ToolInvocation) -> Self {
        Self {
            id: call.id.clone(),
            kind: function_kind(),
            function: WireFunctionCall {
                name: call.name.clone(),
                arguments: call.arguments.to_string(),
            },
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct WireFunctionCall {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Serialize)]
struct WireTool {
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireFunctionSpec,
}

#[derive(Debug, Serialize)]
struct WireFunctionSpec {
    name: &'static str,
    description: &'static str,
    parameters: serde_json::Value,
}

impl From<&ToolSpec> for WireTool {
    fn from(spec: &ToolSpec) -> Self {
        Self {
            kind: "function",
            function: WireFunctionSpec {
                name: spec.name,
                description: spec.description,
                parameters: spec.parameters.clone(),
            },
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<UsageData>,
}

#[derive(Debug, Deserialize)]
struct UsageData {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<WireToolCall>>,
}

// Error envelope used by OpenAI and compatible APIs.
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
    #[serde(default)]
    code: Option<serde_json::Value>,
}

/// Consume the response and return it if successful, or a structured error.
pub(crate) async fn check_status(
    response: reqwest::Response,
) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<failed to read error body>".to_string());

    let message = if let Ok(env) = serde_json::from_str::<ErrorEnvelope>(&body) {
        let code = env
            .error
            .code
            .map(|v| match v {
                serde_json::Value::String(s) => format!(" [code={s}]"),
                other => format!(" [code={other}]"),
            })
            .unwrap_or_default();
        format!("HTTP {status}{code}: {}", env.error.message)
    } else {
        format!("HTTP {status}: {body}")
    };

    error!(%status, %message, "provider request returned HTTP error");
    Err(ProviderError::Request(message))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Json, Router, http::StatusCode, routing::post};
    use serde_json::json;

    fn response(value: serde_json::Value) -> ChatCompletionResponse {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn wire_messages_carry_tool_ids() {
        let history = vec![
            ChatMessage::user("what is an SVM?"),
            ChatMessage::Assistant {
                content: String::new(),
                tool_calls: vec![ToolInvocation {
                    id: "call_1".into(),
                    name: "search".into(),
                    arguments: json!({ "query": "svm" }),
                }],
            },
            ChatMessage::tool("call_1", "[]"),
        ];
        let wire = serde_json::to_value(to_wire_messages(Some("be brief"), &history)).unwrap();
        assert_eq!(wire[0]["role"], "system");
        assert_eq!(wire[2]["role"], "assistant");
        assert!(wire[2]["content"].is_null());
        assert_eq!(wire[2]["tool_calls"][0]["type"], "function");
        assert_eq!(wire[2]["tool_calls"][0]["function"]["arguments"], r#"{"query":"svm"}"#);
        assert_eq!(wire[3]["tool_call_id"], "call_1");
    }

    #[test]
    fn parses_tool_calls() {
        let turn = from_wire_response(response(json!({
            "choices": [{ "message": {
                "content": null,
                "tool_calls": [{
                    "id": "call_9",
                    "type": "function",
                    "function": { "name": "search_by_page", "arguments": "{\"pages\":[3,4]}" }
                }]
            }}],
            "usage": { "prompt_tokens": 12, "completion_tokens": 3 }
        })))
        .unwrap();
        assert_eq!(turn.content, "");
        assert_eq!(turn.tool_calls[0].name, "search_by_page");
        assert_eq!(turn.tool_calls[0].arguments, json!({ "pages": [3, 4] }));
        assert_eq!(turn.usage, Some(LlmUsage { input_tokens: 12, output_tokens: 3 }));
    }

    #[test]
    fn empty_arguments_become_empty_object() {
        let turn = from_wire_response(response(json!({
            "choices": [{ "message": { "tool_calls": [{
                "id": "c", "function": { "name": "search", "arguments": "" }
            }]}}]
        })))
        .unwrap();
        assert_eq!(turn.tool_calls[0].arguments, json!({}));
    }

    #[test]
    fn invalid_arguments_are_malformed() {
        let err = from_wire_response(response(json!({
            "choices": [{ "message": { "tool_calls": [{
                "id": "c", "function": { "name": "search", "arguments": "{not json" }
            }]}}]
        })))
        .unwrap_err();
        assert!(matches!(err, ProviderError::Malformed(_)));
    }

    #[test]
    fn empty_reply_is_malformed() {
        assert!(from_wire_response(response(json!({ "choices": [] }))).is_err());
        assert!(
            from_wire_response(response(json!({ "choices": [{ "message": { "content": "  " } }] })))
                .is_err()
        );
    }

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}/v1/chat/completions")
    }

    #[tokio::test]
    async fn chat_round_trip_against_local_server() {
        let router = Router::new().route(
            "/v1/chat/completions",
            post(|Json(body): Json<serde_json::Value>| async move {
                assert_eq!(body["tools"][0]["function"]["name"], "search");
                let last = body["messages"].as_array().unwrap().last().unwrap().clone();
                Json(json!({
                    "choices": [{ "message": { "content": format!("got {}", last["content"].as_str().unwrap()) } }]
                }))
            }),
        );
        let url = serve(router).await;
        let provider =
            OpenAiCompatibleProvider::new(url, "m".into(), 0.0, 5, Some("key".into())).unwrap();
        let tools = [ToolSpec {
            name: "search",
            description: "search",
            parameters: json!({ "type": "object" }),
        }];
        let turn = provider.chat(None, &[ChatMessage::user("ping")], &tools).await.unwrap();
        assert_eq!(turn.content, "got ping");
    }

    #[tokio::test]
    async fn http_error_envelope_is_reported() {
        let router = Router::new().route(
            "/v1/chat/completions",
            post(|| async {
                (
                    StatusCode::TOO_MANY_REQUESTS,
                    Json(json!({ "error": { "message": "slow down", "code": "rate_limit" } })),
                )
            }),
        );
        let url = serve(router).await;
        let provider = OpenAiCompatibleProvider::new(url, "m".into(), 0.0, 5, None).unwrap();
        let err = provider.chat(None, &[ChatMessage::user("ping")], &[]).await.unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("429"));
        assert!(msg.contains("slow down"));
        assert!(msg.contains("rate_limit"));
    }
}
