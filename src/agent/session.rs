//! In-memory session store.
//!
//! Each key owns an independent, append-only history behind its own async
//! mutex. A request holds that mutex for its whole DECIDE/ACT loop, so two
//! requests on the same key run one after the other while different keys
//! proceed in parallel. Nothing is evicted and nothing survives a restart.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::llm::ChatMessage;

#[derive(Debug, Default, Clone)]
pub struct Session {
    pub messages: Vec<ChatMessage>,
    /// LLM decisions made for this session.
    pub llm_calls: u64,
}

#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: Mutex<HashMap<String, Arc<Mutex<Session>>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exclusive access to `key`'s session, created empty on first use.
    /// A key keeps the same mutex for the life of the store.
    pub async fn lock(&self, key: &str) -> OwnedMutexGuard<Session> {
        let handle = {
            let mut sessions = self.sessions.lock().await;
            sessions.entry(key.to_string()).or_default().clone()
        };
        handle.lock_owned().await
    }

    /// Snapshot of `key`'s history; empty for an unseen key.
    pub async fn get(&self, key: &str) -> Vec<ChatMessage> {
        let handle = self.sessions.lock().await.get(key).cloned();
        match handle {
            Some(h) => h.lock().await.messages.clone(),
            None => Vec::new(),
        }
    }

    pub async fn append(&self, key: &str, message: ChatMessage) {
        self.lock(key).await.messages.push(message);
    }

    /// Empty one session's history.
    pub async fn clear(&self, key: &str) {
        let handle = self.sessions.lock().await.get(key).cloned();
        if let Some(h) = handle {
            *h.lock().await = Session::default();
        }
    }

    /// Empty every session's history. Irreversible.
    ///
    /// Each session is wiped under its own lock, queued behind requests
    /// already waiting on it. Once this returns, every key starts empty.
    pub async fn clear_all(&self) {
        let handles: Vec<_> = self.sessions.lock().await.values().cloned().collect();
        for h in handles {
            *h.lock().await = Session::default();
        }
    }
}
