//! The agent's tool set: a closed enum, parsed from the model's invocation
//! and dispatched directly. Both tools are read-only queries against the
//! [`RagIndex`]; neither touches conversation state.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::debug;

use crate::error::AppError;
use crate::llm::ToolSpec;
use crate::rag::RagIndex;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("unknown tool: {0}")]
    Unknown(String),
    #[error("bad arguments for {tool}: {reason}")]
    BadArguments { tool: &'static str, reason: String },
    #[error("tool failed: {0}")]
    Index(#[from] AppError),
}

/// A parsed tool invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolCall {
    /// Top-`k` chunks most similar to `query`; `k` is `None` when omitted.
    Search { query: String, k: Option<i64> },
    /// Full text of the given 1-based pages of the resident document.
    SearchByPage { pages: Vec<i64> },
}

#[derive(Deserialize)]
struct SearchArgs {
    query: String,
    #[serde(default)]
    k: Option<f64>,
}

#[derive(Deserialize)]
struct SearchByPageArgs {
    pages: Vec<i64>,
}

impl ToolCall {
    pub const SEARCH: &'static str = "search";
    pub const SEARCH_BY_PAGE: &'static str = "search_by_page";

    /// Names of every tool, in advertisement order.
    pub const NAMES: [&'static str; 2] = [Self::SEARCH, Self::SEARCH_BY_PAGE];

    pub fn parse(name: &str, arguments: &serde_json::Value) -> Result<Self, ToolError> {
        match name {
            Self::SEARCH => {
                let args: SearchArgs = serde_json::from_value(arguments.clone()).map_err(|e| {
                    ToolError::BadArguments { tool: Self::SEARCH, reason: e.to_string() }
                })?;
                Ok(Self::Search { query: args.query, k: args.k.map(|k| k.round() as i64) })
            }
            Self::SEARCH_BY_PAGE => {
                let args: SearchByPageArgs =
                    serde_json::from_value(arguments.clone()).map_err(|e| {
                        ToolError::BadArguments { tool: Self::SEARCH_BY_PAGE, reason: e.to_string() }
                    })?;
                Ok(Self::SearchByPage { pages: args.pages })
            }
            other => Err(ToolError::Unknown(other.to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Search { .. } => Self::SEARCH,
            Self::SearchByPage { .. } => Self::SEARCH_BY_PAGE,
        }
    }
}

/// One ranked search hit as the model sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub rank: usize,
    pub text: String,
    /// 1-based page number.
    pub page: usize,
    pub file: String,
    pub score: f32,
}

/// Executes [`ToolCall`]s against the index.
#[derive(Clone)]
pub struct ToolBox {
    index: Arc<RagIndex>,
    default_k: usize,
    max_k: usize,
}

impl ToolBox {
    pub fn new(index: Arc<RagIndex>, default_k: usize, max_k: usize) -> Self {
        Self { index, default_k, max_k: max_k.max(1) }
    }

    /// `k` as the search will use it: default when omitted, clamped to
    /// `[1, max_k]` otherwise.
    pub fn effective_k(&self, k: Option<i64>) -> usize {
        let requested = k.unwrap_or(self.default_k as i64);
        requested.clamp(1, self.max_k as i64) as usize
    }

    /// Tool schemas advertised to the model.
    pub fn specs(&self) -> Vec<ToolSpec> {
        vec![
            ToolSpec {
                name: ToolCall::SEARCH,
                description: "Semantic search over the indexed PDFs. Returns the most relevant \
                              text chunks, ranked, each with its file name and 1-based page number.",
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "query": { "type": "string", "description": "What to search for." },
                        "k": {
                            "type": "integer",
                            "description": format!(
                                "Number of chunks to return (default {}, max {}).",
                                self.default_k, self.max_k
                            )
                        }
                    },
                    "required": ["query"]
                }),
            },
            ToolSpec {
                name: ToolCall::SEARCH_BY_PAGE,
                description: "Returns the full text of specific pages of the loaded PDF, keyed \
                              by page number. Use it to summarise or quote whole pages.",
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "pages": {
                            "type": "array",
                            "items": { "type": "integer" },
                            "description": "1-based page numbers to retrieve."
                        }
                    },
                    "required": ["pages"]
                }),
            },
        ]
    }

    /// Run `call` and return its result as a JSON string for the tool message.
    pub async fn execute(&self, call: &ToolCall) -> Result<String, ToolError> {
        let value = match call {
            ToolCall::Search { query, k } => {
                let k = self.effective_k(*k);
                let hits: Vec<SearchHit> = self
                    .index
                    .search(query, k)
                    .await?
                    .into_iter()
                    .enumerate()
                    .map(|(i, hit)| SearchHit {
                        rank: i + 1,
                        text: hit.chunk.text,
                        page: hit.chunk.page + 1,
                        file: hit.chunk.source,
                        score: hit.score,
                    })
                    .collect();
                debug!(%query, k, hits = hits.len(), "search tool");
                serde_json::to_value(hits)
            }
            ToolCall::SearchByPage { pages } => {
                let found = self.index.search_by_page(pages).await;
                debug!(?pages, entries = found.len(), "search_by_page tool");
                serde_json::to_value(found)
            }
        };
        let value = value.map_err(|e| ToolError::BadArguments {
            tool: call.name(),
            reason: format!("cannot encode result: {e}"),
        })?;
        Ok(value.to_string())
    }
}
