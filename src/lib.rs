//! docchat: retrieval-augmented chat over a folder of PDFs.
//!
//! Two services share this library:
//!   - `docchat-agent` owns the vector index and the conversation agent and
//!     exposes them over HTTP ([`server`]).
//!   - `docchat-web` serves the browser chat page and proxies to the agent
//!     ([`web`]).

pub mod agent;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod llm;
pub mod logger;
pub mod rag;
pub mod server;
pub mod web;
