//! `docchat-agent`: RAG agent service.
//!
//! Startup sequence:
//!   1. Load .env (if present)
//!   2. Load config
//!   3. Resolve effective log level (CLI `-v` flags > config) and init logger
//!   4. Build embedder, open the vector index (load or build)
//!   5. Ingest any `--add` PDFs
//!   6. Build LLM provider, tools, system prompt, conversation agent
//!   7. Spawn Ctrl-C → shutdown watcher
//!   8. Serve HTTP until shutdown

use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use docchat::agent::{ConversationAgent, ToolBox, ToolCall, prompt};
use docchat::error::AppError;
use docchat::rag::RagIndex;
use docchat::server::{self, AgentState};
use docchat::{config, embeddings, llm, logger};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), AppError> {
    // .env is optional.
    let _ = dotenvy::dotenv();

    let args = parse_cli_args();
    let config = config::load(args.config_path.as_deref())?;

    let effective_log_level = args.log_level.unwrap_or(config.log_level.as_str());
    logger::init(effective_log_level, args.log_level.is_some(), config.log_file.as_deref())?;

    info!(
        data_dir = %config.data_dir.display(),
        llm = %config.llm.provider,
        model = %config.llm.openai.model,
        embeddings = %config.embeddings.provider,
        index_mode = ?config.rag.index_mode,
        "config loaded"
    );

    let embedder = embeddings::build(&config.embeddings, config.embeddings_api_key.clone())?;
    let index = Arc::new(RagIndex::open(&config.data_dir, &config.rag, embedder).await?);

    if !args.add.is_empty() {
        let added = index.add_pdfs(&args.add).await;
        info!(requested = args.add.len(), added = added.len(), "startup PDFs added");
    }

    let llm = llm::providers::build(&config.llm, config.llm_api_key.clone())?;
    let tools = ToolBox::new(
        index.clone(),
        config.agent.default_search_k,
        config.agent.max_search_k,
    );
    let system_prompt = prompt::system_prompt(&config.agent.prompts_dir, &ToolCall::NAMES);
    let agent = Arc::new(ConversationAgent::new(
        llm,
        tools,
        system_prompt,
        config.agent.max_tool_rounds,
    ));

    info!(
        chunks = index.chunk_count().await?,
        resident = ?index.resident_document().await,
        "agent ready"
    );

    let shutdown = CancellationToken::new();
    let ctrlc_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("ctrl-c received, shutting down");
            ctrlc_token.cancel();
        }
    });

    server::serve(&config.agent.bind, AgentState { agent, index }, shutdown).await
}

struct CliArgs {
    log_level: Option<&'static str>,
    config_path: Option<PathBuf>,
    add: Vec<PathBuf>,
}

fn parse_cli_args() -> CliArgs {
    let mut verbosity = 0u8;
    let mut config_path = None;
    let mut add = Vec::new();

    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-h" | "--help" => {
                println!("Usage: docchat-agent [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -h, --help                 Print help");
                println!("  -f, --config <PATH>        Path to configuration file (default: config/default.toml)");
                println!("  -a, --add <PDF>            Add a PDF to the index before serving (repeatable)");
                println!("  -v, -vv, -vvv, -vvvv       Increase logging verbosity");
                std::process::exit(0);
            }
            "-f" | "--config" => match iter.next() {
                Some(path) => config_path = Some(PathBuf::from(path)),
                None => {
                    eprintln!("error: -f/--config requires a path argument");
                    std::process::exit(1);
                }
            },
            "-a" | "--add" => match iter.next() {
                Some(path) => add.push(PathBuf::from(path)),
                None => {
                    eprintln!("error: -a/--add requires a PDF path");
                    std::process::exit(1);
                }
            },
            "--verbose" => verbosity = verbosity.saturating_add(1),
            a if a.starts_with('-') && a.len() > 1 && a.chars().skip(1).all(|c| c == 'v') => {
                verbosity = verbosity.saturating_add((a.len() - 1) as u8);
            }
            other => {
                eprintln!("error: unexpected argument '{other}'");
                std::process::exit(1);
            }
        }
    }

    CliArgs { log_level: verbosity_level(verbosity), config_path, add }
}

fn verbosity_level(verbosity: u8) -> Option<&'static str> {
    match verbosity {
        0 => None,
        1 => Some("warn"),
        2 => Some("info"),
        3 => Some("debug"),
        _ => Some("trace"),
    }
}
