//! Layered prompt builder.
//!
//! The system prompt is assembled from plain-text fragments under
//! `config/prompts/`. Layers are appended in order and joined with a blank
//! line; `{{key}}` variables are substituted once, at [`build()`](PromptBuilder::build).
//!
//! ```text
//! system.md   persona, answer format and citation rules; may use {{tools}}
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

const SEPARATOR: &str = "\n\n";

/// Used when `system.md` is missing.
pub const FALLBACK_SYSTEM_PROMPT: &str = "You are an expert research assistant. Answer \
questions based strictly on the indexed PDF documents, citing the file name and page of \
every fact you use. If the answer is not in the documents, say you do not have enough \
information.";

pub struct PromptBuilder {
    prompts_dir: PathBuf,
    parts: Vec<String>,
    vars: HashMap<String, String>,
}

impl PromptBuilder {
    pub fn new(prompts_dir: impl Into<PathBuf>) -> Self {
        Self { prompts_dir: prompts_dir.into(), parts: Vec::new(), vars: HashMap::new() }
    }

    /// Append `filename`, or `fallback` when the file is missing or blank.
    pub fn layer_or(mut self, filename: &str, fallback: &str) -> Self {
        let path = self.prompts_dir.join(filename);
        let text = match fs::read_to_string(&path) {
            Ok(text) if !text.trim().is_empty() => text,
            Ok(_) | Err(_) => {
                tracing::debug!(path = %path.display(), "prompt layer not found, using fallback");
                fallback.to_string()
            }
        };
        let trimmed = text.trim();
        if !trimmed.is_empty() {
            self.parts.push(trimmed.to_string());
        }
        self
    }

    /// Bind `{{tools}}` to a comma-separated list of tool names. When no
    /// layer mentions `{{tools}}`, a one-line tool sentence is appended.
    pub fn with_tools(mut self, tools: &[&str]) -> Self {
        let tools_str = if tools.is_empty() { "none".to_string() } else { tools.join(", ") };
        if !self.parts.iter().any(|p| p.contains("{{tools}}")) {
            self.parts.push("You have access to the following tools: {{tools}}".to_string());
        }
        self.vars.insert("tools".to_string(), tools_str);
        self
    }

    pub fn build(self) -> String {
        let mut prompt = self.parts.join(SEPARATOR);
        for (k, v) in &self.vars {
            let placeholder = format!("{{{{{}}}}}", k);
            prompt = prompt.replace(&placeholder, v);
        }
        prompt
    }
}

/// The agent's system prompt: `system.md` (or the inline fallback) with the
/// tool list bound.
pub fn system_prompt(prompts_dir: impl AsRef<Path>, tools: &[&str]) -> String {
    PromptBuilder::new(prompts_dir.as_ref())
        .layer_or("system.md", FALLBACK_SYSTEM_PROMPT)
        .with_tools(tools)
        .build()
}
