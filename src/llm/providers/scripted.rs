//! Test-only provider that replays a queue of canned turns and records every
//! history it was shown.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::llm::{AssistantTurn, ChatMessage, ProviderError, ToolInvocation};

#[derive(Debug, Clone, Default)]
pub struct ScriptedProvider {
    turns: Arc<Mutex<VecDeque<AssistantTurn>>>,
    seen: Arc<Mutex<Vec<Vec<ChatMessage>>>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_text(&self, content: &str) -> &Self {
        self.push(AssistantTurn { content: content.into(), tool_calls: vec![], usage: None })
    }

    pub fn push_tool_call(&self, id: &str, name: &str, arguments: serde_json::Value) -> &Self {
        self.push(AssistantTurn {
            content: String::new(),
            tool_calls: vec![ToolInvocation { id: id.into(), name: name.into(), arguments }],
            usage: None,
        })
    }

    pub fn push(&self, turn: AssistantTurn) -> &Self {
        self.turns.lock().unwrap().push_back(turn);
        self
    }

    /// Histories passed to each `chat` call, oldest first.
    pub fn seen(&self) -> Vec<Vec<ChatMessage>> {
        self.seen.lock().unwrap().clone()
    }

    pub async fn chat(&self, messages: &[ChatMessage]) -> Result<AssistantTurn, ProviderError> {
        self.seen.lock().unwrap().push(messages.to_vec());
        self.turns
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| ProviderError::Request("script exhausted".into()))
    }
}
