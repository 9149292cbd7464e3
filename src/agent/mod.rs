//! Session-scoped conversation agent.
//!
//! One call to [`ConversationAgent::run_chat`] drives the DECIDE/ACT loop for
//! a single user turn:
//!
//! ```text
//! DECIDE ──(tool calls)──▶ ACT ──(all results appended)──▶ DECIDE
//!    │
//!    └──(no tool calls)──▶ TERMINAL (reply)
//! ```
//!
//! The loop works on a copy of the session history while holding the
//! session's lock, and commits it only on TERMINAL. A failed turn therefore
//! leaves the history exactly as it was.

pub mod prompt;
pub mod session;
pub mod tools;

use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::llm::{ChatMessage, LlmProvider, ProviderError, ToolSpec};

pub use session::{Session, SessionStore};
pub use tools::{ToolBox, ToolCall, ToolError};

/// Session key that callers use to mean "the current default session".
pub const DEFAULT_SESSION_ALIAS: &str = "default_user";

#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Tool(#[from] ToolError),
    #[error("tool loop exceeded {rounds} rounds without a final answer")]
    ToolLoopExceeded { rounds: usize },
}

pub struct ConversationAgent {
    llm: LlmProvider,
    tools: ToolBox,
    tool_specs: Vec<ToolSpec>,
    sessions: SessionStore,
    system_prompt: String,
    max_tool_rounds: usize,
    default_key: RwLock<String>,
}

impl ConversationAgent {
    pub fn new(
        llm: LlmProvider,
        tools: ToolBox,
        system_prompt: String,
        max_tool_rounds: usize,
    ) -> Self {
        let tool_specs = tools.specs();
        Self {
            llm,
            tools,
            tool_specs,
            sessions: SessionStore::new(),
            system_prompt,
            max_tool_rounds,
            default_key: RwLock::new(new_session_key()),
        }
    }

    /// Answer `input` in the session named by `session_key`, replaying that
    /// session's history and running any tools the model asks for.
    ///
    /// `None`, an empty key or [`DEFAULT_SESSION_ALIAS`] select the current
    /// default session.
    pub async fn run_chat(
        &self,
        session_key: Option<&str>,
        input: &str,
    ) -> Result<String, AgentError> {
        let key = self.resolve_key(session_key).await;
        let mut session = self.sessions.lock(&key).await;

        let mut convo = session.messages.clone();
        convo.push(ChatMessage::user(input));
        let mut rounds = 0usize;

        loop {
            // DECIDE
            let turn = self
                .llm
                .chat(Some(&self.system_prompt), &convo, &self.tool_specs)
                .await?;
            session.llm_calls += 1;
            if let Some(usage) = turn.usage {
                debug!(
                    session = %key,
                    input_tokens = usage.input_tokens,
                    output_tokens = usage.output_tokens,
                    "llm usage"
                );
            }

            if turn.tool_calls.is_empty() {
                // TERMINAL
                let reply = turn.content.clone();
                convo.push(turn.into_message());
                session.messages = convo;
                info!(session = %key, rounds, llm_calls = session.llm_calls, "chat turn complete");
                return Ok(reply);
            }

            if rounds >= self.max_tool_rounds {
                warn!(session = %key, rounds, "tool loop cap reached");
                return Err(AgentError::ToolLoopExceeded { rounds });
            }
            rounds += 1;

            // ACT
            let calls = turn.tool_calls.clone();
            convo.push(turn.into_message());
            for invocation in &calls {
                let call = ToolCall::parse(&invocation.name, &invocation.arguments)?;
                debug!(session = %key, round = rounds, tool = call.name(), "running tool");
                let output = self.tools.execute(&call).await?;
                convo.push(ChatMessage::tool(invocation.id.clone(), output));
            }
        }
    }

    /// Point the default session at a fresh random key. The previous
    /// default session's history stays in the store, unreachable.
    pub async fn rotate_default_session(&self) -> String {
        let key = new_session_key();
        *self.default_key.write().await = key.clone();
        info!(session = %key, "default session rotated");
        key
    }

    pub async fn default_session_key(&self) -> String {
        self.default_key.read().await.clone()
    }

    /// Irreversibly drop every session's history.
    pub async fn wipe_all(&self) {
        self.sessions.clear_all().await;
        info!("all session memory wiped");
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn llm_name(&self) -> &'static str {
        self.llm.name()
    }

    async fn resolve_key(&self, requested: Option<&str>) -> String {
        match requested.map(str::trim) {
            Some(k) if !k.is_empty() && k != DEFAULT_SESSION_ALIAS => k.to_string(),
            _ => self.default_key.read().await.clone(),
        }
    }
}

fn new_session_key() -> String {
    uuid::Uuid::new_v4().to_string()
}
