//! Dummy LLM provider: answers with the latest user message prefixed with
//! `[echo]` and never requests tools. Used to exercise the full request path
//! without an API key.

use crate::llm::{AssistantTurn, ChatMessage, ProviderError};

#[derive(Debug, Clone)]
pub struct DummyProvider;

impl DummyProvider {
    pub async fn chat(&self, messages: &[ChatMessage]) -> Result<AssistantTurn, ProviderError> {
        let last_user = messages
            .iter()
            .rev()
            .find_map(|m| match m {
                ChatMessage::User { content } => Some(content.as_str()),
                _ => None,
            })
            .unwrap_or_default();

        Ok(AssistantTurn {
            content: format!("[echo] {last_user}"),
            tool_calls: Vec::new(),
            usage: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn echoes_latest_user_message() {
        let history = vec![
            ChatMessage::user("first"),
            ChatMessage::Assistant { content: "[echo] first".into(), tool_calls: vec![] },
            ChatMessage::user("second"),
        ];
        let turn = DummyProvider.chat(&history).await.unwrap();
        assert_eq!(turn.content, "[echo] second");
        assert!(turn.tool_calls.is_empty());
    }

    #[tokio::test]
    async fn empty_history() {
        let turn = DummyProvider.chat(&[]).await.unwrap();
        assert_eq!(turn.content, "[echo] ");
    }
}
