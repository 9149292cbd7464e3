//! Configuration loading with env-var overrides.
//!
//! Reads `config/default.toml` (or the file named by `DOCCHAT_CONFIG`), then
//! applies `DOCCHAT_DATA_DIR`, `DOCCHAT_LOG_LEVEL`, `AGENT_SERVICE_HOST` and
//! `AGENT_SERVICE_PORT` overrides. API keys are only ever read from the
//! environment.

use std::{
    env, fs,
    path::{Path, PathBuf},
};

use serde::Deserialize;

use crate::error::AppError;

/// Default config file, relative to the current working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Agent (chat) service configuration.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Socket address the agent HTTP service binds to.
    pub bind: String,
    /// Maximum DECIDE/ACT cycles per request before giving up.
    pub max_tool_rounds: usize,
    /// `k` used by the search tool when the model omits it.
    pub default_search_k: usize,
    /// Upper bound applied to any requested `k`.
    pub max_search_k: usize,
    /// Directory holding prompt templates.
    pub prompts_dir: PathBuf,
}

/// OpenAI / OpenAI-compatible chat provider configuration (`[llm.openai]`).
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// Full chat completions endpoint URL.
    pub api_base_url: String,
    pub model: String,
    pub temperature: f32,
    /// Per-request HTTP timeout in seconds.
    pub timeout_seconds: u64,
}

/// LLM configuration.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Active provider (`"dummy"`, `"openai"`). `default` in the TOML.
    pub provider: String,
    pub openai: OpenAiConfig,
}

/// OpenAI-compatible embeddings endpoint (`[embeddings.openai]`).
#[derive(Debug, Clone)]
pub struct OpenAiEmbeddingsConfig {
    /// Full embeddings endpoint URL.
    pub api_base_url: String,
    pub model: String,
    /// Number of texts sent per request.
    pub batch_size: usize,
    pub timeout_seconds: u64,
}

/// Embedding configuration.
#[derive(Debug, Clone)]
pub struct EmbeddingsConfig {
    /// Active embedder (`"openai"`, `"hashing"`). `default` in the TOML.
    pub provider: String,
    pub openai: OpenAiEmbeddingsConfig,
    /// Vector width of the offline hashing embedder.
    pub hashing_dimensions: usize,
}

/// How the vector index is brought up at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexMode {
    /// Open the existing store when present, otherwise build it.
    Auto,
    /// Open the existing store; never re-ingest.
    Load,
    /// Discard any existing store and ingest every PDF in the source folder.
    Build,
}

impl IndexMode {
    fn parse(s: &str) -> Result<Self, AppError> {
        match s {
            "auto" => Ok(Self::Auto),
            "load" => Ok(Self::Load),
            "build" => Ok(Self::Build),
            other => Err(AppError::Config(format!(
                "unknown rag.index_mode '{other}' (expected auto, load or build)"
            ))),
        }
    }
}

/// Retrieval index configuration.
#[derive(Debug, Clone)]
pub struct RagConfig {
    pub index_mode: IndexMode,
    /// Maximum chunk size in characters.
    pub chunk_size: usize,
    /// Characters shared between neighbouring chunks.
    pub chunk_overlap: usize,
}

/// Web (proxy) service configuration.
#[derive(Debug, Clone)]
pub struct WebConfig {
    pub bind: String,
    pub agent_host: String,
    pub agent_port: u16,
    /// Where proxied PDFs are cached and served from under `/static`.
    pub static_dir: PathBuf,
    pub request_timeout_seconds: u64,
    pub pdf_timeout_seconds: u64,
}

impl WebConfig {
    /// Base URL of the agent service, e.g. `http://127.0.0.1:8000`.
    pub fn agent_base_url(&self) -> String {
        format!("http://{}:{}", self.agent_host, self.agent_port)
    }
}

/// Fully-resolved configuration shared by both binaries.
#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    /// Optional log file; stderr when unset.
    pub log_file: Option<PathBuf>,
    /// Root for `pdf_files/` and `vector_store/` (already expanded, no `~`).
    pub data_dir: PathBuf,
    pub agent: AgentConfig,
    pub llm: LlmConfig,
    pub embeddings: EmbeddingsConfig,
    pub rag: RagConfig,
    pub web: WebConfig,
    /// From `LLM_API_KEY`. Never sourced from TOML.
    pub llm_api_key: Option<String>,
    /// From `EMBEDDINGS_API_KEY`, falling back to `LLM_API_KEY`.
    pub embeddings_api_key: Option<String>,
}

// ── Raw TOML shape ────────────────────────────────────────────────────────────

#[derive(Deserialize, Default)]
struct RawConfig {
    #[serde(default)]
    service: RawService,
    #[serde(default)]
    agent: RawAgent,
    #[serde(default)]
    llm: RawLlm,
    #[serde(default)]
    embeddings: RawEmbeddings,
    #[serde(default)]
    rag: RawRag,
    #[serde(default)]
    web: RawWeb,
}

#[derive(Deserialize)]
struct RawService {
    #[serde(default = "default_log_level")]
    log_level: String,
    #[serde(default)]
    log_file: Option<String>,
    #[serde(default = "default_data_dir")]
    data_dir: String,
}

impl Default for RawService {
    fn default() -> Self {
        Self { log_level: default_log_level(), log_file: None, data_dir: default_data_dir() }
    }
}

#[derive(Deserialize)]
struct RawAgent {
    #[serde(default = "default_agent_bind")]
    bind: String,
    #[serde(default = "default_max_tool_rounds")]
    max_tool_rounds: usize,
    #[serde(default = "default_search_k")]
    default_search_k: usize,
    #[serde(default = "default_max_search_k")]
    max_search_k: usize,
    #[serde(default = "default_prompts_dir")]
    prompts_dir: String,
}

impl Default for RawAgent {
    fn default() -> Self {
        Self {
            bind: default_agent_bind(),
            max_tool_rounds: default_max_tool_rounds(),
            default_search_k: default_search_k(),
            max_search_k: default_max_search_k(),
            prompts_dir: default_prompts_dir(),
        }
    }
}

#[derive(Deserialize)]
struct RawLlm {
    #[serde(rename = "default", default = "default_llm_provider")]
    provider: String,
    #[serde(default)]
    openai: RawOpenAiConfig,
}

impl Default for RawLlm {
    fn default() -> Self {
        Self { provider: default_llm_provider(), openai: RawOpenAiConfig::default() }
    }
}

#[derive(Deserialize)]
struct RawOpenAiConfig {
    #[serde(default = "default_openai_api_base_url")]
    api_base_url: String,
    #[serde(default = "default_openai_model")]
    model: String,
    #[serde(default)]
    temperature: f32,
    #[serde(default = "default_openai_timeout_seconds")]
    timeout_seconds: u64,
}

impl Default for RawOpenAiConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_openai_api_base_url(),
            model: default_openai_model(),
            temperature: 0.0,
            timeout_seconds: default_openai_timeout_seconds(),
        }
    }
}

#[derive(Deserialize)]
struct RawEmbeddings {
    #[serde(rename = "default", default = "default_embeddings_provider")]
    provider: String,
    #[serde(default)]
    openai: RawOpenAiEmbeddings,
    #[serde(default)]
    hashing: RawHashingEmbeddings,
}

impl Default for RawEmbeddings {
    fn default() -> Self {
        Self {
            provider: default_embeddings_provider(),
            openai: RawOpenAiEmbeddings::default(),
            hashing: RawHashingEmbeddings::default(),
        }
    }
}

#[derive(Deserialize)]
struct RawOpenAiEmbeddings {
    #[serde(default = "default_embeddings_api_base_url")]
    api_base_url: String,
    #[serde(default = "default_embeddings_model")]
    model: String,
    #[serde(default = "default_embeddings_batch_size")]
    batch_size: usize,
    #[serde(default = "default_embeddings_timeout_seconds")]
    timeout_seconds: u64,
}

impl Default for RawOpenAiEmbeddings {
    fn default() -> Self {
        Self {
            api_base_url: default_embeddings_api_base_url(),
            model: default_embeddings_model(),
            batch_size: default_embeddings_batch_size(),
            timeout_seconds: default_embeddings_timeout_seconds(),
        }
    }
}

#[derive(Deserialize)]
struct RawHashingEmbeddings {
    #[serde(default = "default_hashing_dimensions")]
    dimensions: usize,
}

impl Default for RawHashingEmbeddings {
    fn default() -> Self {
        Self { dimensions: default_hashing_dimensions() }
    }
}

#[derive(Deserialize)]
struct RawRag {
    #[serde(default = "default_index_mode")]
    index_mode: String,
    #[serde(default = "default_chunk_size")]
    chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    chunk_overlap: usize,
}

impl Default for RawRag {
    fn default() -> Self {
        Self {
            index_mode: default_index_mode(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

#[derive(Deserialize)]
struct RawWeb {
    #[serde(default = "default_web_bind")]
    bind: String,
    #[serde(default = "default_agent_host")]
    agent_host: String,
    #[serde(default = "default_agent_port")]
    agent_port: u16,
    #[serde(default = "default_static_dir")]
    static_dir: String,
    #[serde(default = "default_request_timeout_seconds")]
    request_timeout_seconds: u64,
    #[serde(default = "default_pdf_timeout_seconds")]
    pdf_timeout_seconds: u64,
}

impl Default for RawWeb {
    fn default() -> Self {
        Self {
            bind: default_web_bind(),
            agent_host: default_agent_host(),
            agent_port: default_agent_port(),
            static_dir: default_static_dir(),
            request_timeout_seconds: default_request_timeout_seconds(),
            pdf_timeout_seconds: default_pdf_timeout_seconds(),
        }
    }
}

fn default_log_level() -> String { "info".to_string() }
fn default_data_dir() -> String { "local_rag".to_string() }
fn default_agent_bind() -> String { "0.0.0.0:8000".to_string() }
fn default_max_tool_rounds() -> usize { 8 }
fn default_search_k() -> usize { 3 }
fn default_max_search_k() -> usize { 20 }
fn default_prompts_dir() -> String { "config/prompts".to_string() }
fn default_llm_provider() -> String { "openai".to_string() }
fn default_openai_api_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta/openai/chat/completions".to_string()
}
fn default_openai_model() -> String { "gemini-2.5-flash-lite".to_string() }
fn default_openai_timeout_seconds() -> u64 { 60 }
fn default_embeddings_provider() -> String { "openai".to_string() }
fn default_embeddings_api_base_url() -> String { "http://localhost:11434/v1/embeddings".to_string() }
fn default_embeddings_model() -> String { "bge-m3".to_string() }
fn default_embeddings_batch_size() -> usize { 64 }
fn default_embeddings_timeout_seconds() -> u64 { 120 }
fn default_hashing_dimensions() -> usize { 384 }
fn default_index_mode() -> String { "auto".to_string() }
fn default_chunk_size() -> usize { 1000 }
fn default_chunk_overlap() -> usize { 150 }
fn default_web_bind() -> String { "0.0.0.0:5000".to_string() }
fn default_agent_host() -> String { "127.0.0.1".to_string() }
fn default_agent_port() -> u16 { 8000 }
fn default_static_dir() -> String { "static".to_string() }
fn default_request_timeout_seconds() -> u64 { 120 }
fn default_pdf_timeout_seconds() -> u64 { 10 }

/// Env-var overrides applied on top of the TOML file.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub data_dir: Option<String>,
    pub log_level: Option<String>,
    pub agent_host: Option<String>,
    pub agent_port: Option<String>,
}

impl Overrides {
    fn from_env() -> Self {
        Self {
            data_dir: env::var("DOCCHAT_DATA_DIR").ok(),
            log_level: env::var("DOCCHAT_LOG_LEVEL").ok(),
            agent_host: env::var("AGENT_SERVICE_HOST").ok(),
            agent_port: env::var("AGENT_SERVICE_PORT").ok(),
        }
    }
}

/// Load config from `path` (or `DOCCHAT_CONFIG`, or the default path), then
/// apply env-var overrides.
pub fn load(path: Option<&Path>) -> Result<Config, AppError> {
    let env_path = env::var("DOCCHAT_CONFIG").ok().map(PathBuf::from);
    let path = path
        .map(Path::to_path_buf)
        .or(env_path)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));

    let mut config = load_from(&path, &Overrides::from_env())?;
    config.llm_api_key = env::var("LLM_API_KEY").ok().filter(|k| !k.is_empty());
    config.embeddings_api_key = env::var("EMBEDDINGS_API_KEY")
        .ok()
        .filter(|k| !k.is_empty())
        .or_else(|| config.llm_api_key.clone());
    Ok(config)
}

/// Internal loader: accepts an explicit path and overrides.
/// Tests pass overrides directly instead of mutating env vars.
pub fn load_from(path: &Path, overrides: &Overrides) -> Result<Config, AppError> {
    let raw = fs::read_to_string(path)
        .map_err(|e| AppError::Config(format!("cannot read {}: {e}", path.display())))?;

    let parsed: RawConfig = toml::from_str(&raw)
        .map_err(|e| AppError::Config(format!("parse error in {}: {e}", path.display())))?;

    resolve(parsed, overrides)
}

fn resolve(parsed: RawConfig, overrides: &Overrides) -> Result<Config, AppError> {
    let s = parsed.service;
    let data_dir = expand_home(overrides.data_dir.as_deref().unwrap_or(&s.data_dir));
    let log_level = overrides.log_level.clone().unwrap_or(s.log_level);

    // AGENT_SERVICE_PORT moves both ends: where the agent listens and where
    // the web front end calls it. AGENT_SERVICE_HOST only affects the caller.
    let port_override = match overrides.agent_port.as_deref() {
        Some(p) => Some(
            p.parse::<u16>()
                .map_err(|e| AppError::Config(format!("invalid AGENT_SERVICE_PORT '{p}': {e}")))?,
        ),
        None => None,
    };
    let agent_port = port_override.unwrap_or(parsed.web.agent_port);
    let agent_bind = match port_override {
        Some(port) => rebind_port(&parsed.agent.bind, port)?,
        None => parsed.agent.bind,
    };

    if parsed.rag.chunk_size == 0 {
        return Err(AppError::Config("rag.chunk_size must be > 0".into()));
    }
    if parsed.rag.chunk_overlap >= parsed.rag.chunk_size {
        return Err(AppError::Config(format!(
            "rag.chunk_overlap ({}) must be smaller than rag.chunk_size ({})",
            parsed.rag.chunk_overlap, parsed.rag.chunk_size
        )));
    }
    if parsed.agent.max_tool_rounds == 0 {
        return Err(AppError::Config("agent.max_tool_rounds must be > 0".into()));
    }
    if parsed.agent.max_search_k == 0 {
        return Err(AppError::Config("agent.max_search_k must be > 0".into()));
    }

    Ok(Config {
        log_level,
        log_file: s.log_file.as_deref().map(expand_home),
        data_dir,
        agent: AgentConfig {
            bind: agent_bind,
            max_tool_rounds: parsed.agent.max_tool_rounds,
            default_search_k: parsed.agent.default_search_k,
            max_search_k: parsed.agent.max_search_k,
            prompts_dir: PathBuf::from(parsed.agent.prompts_dir),
        },
        llm: LlmConfig {
            provider: parsed.llm.provider,
            openai: OpenAiConfig {
                api_base_url: parsed.llm.openai.api_base_url,
                model: parsed.llm.openai.model,
                temperature: parsed.llm.openai.temperature,
                timeout_seconds: parsed.llm.openai.timeout_seconds,
            },
        },
        embeddings: EmbeddingsConfig {
            provider: parsed.embeddings.provider,
            openai: OpenAiEmbeddingsConfig {
                api_base_url: parsed.embeddings.openai.api_base_url,
                model: parsed.embeddings.openai.model,
                batch_size: parsed.embeddings.openai.batch_size.max(1),
                timeout_seconds: parsed.embeddings.openai.timeout_seconds,
            },
            hashing_dimensions: parsed.embeddings.hashing.dimensions,
        },
        rag: RagConfig {
            index_mode: IndexMode::parse(&parsed.rag.index_mode)?,
            chunk_size: parsed.rag.chunk_size,
            chunk_overlap: parsed.rag.chunk_overlap,
        },
        web: WebConfig {
            bind: parsed.web.bind,
            agent_host: overrides.agent_host.clone().unwrap_or(parsed.web.agent_host),
            agent_port,
            static_dir: expand_home(&parsed.web.static_dir),
            request_timeout_seconds: parsed.web.request_timeout_seconds,
            pdf_timeout_seconds: parsed.web.pdf_timeout_seconds,
        },
        llm_api_key: None,
        embeddings_api_key: None,
    })
}

/// Replace the port of a `host:port` bind address.
fn rebind_port(bind: &str, port: u16) -> Result<String, AppError> {
    bind.rsplit_once(':')
        .map(|(host, _)| format!("{host}:{port}"))
        .ok_or_else(|| AppError::Config(format!("agent.bind '{bind}' has no port")))
}

/// Expand a leading `~` to the user's home directory.
/// Absolute or relative paths without `~` are returned unchanged.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}

// ── test helpers ──────────────────────────────────────────────────────────────

/// Offline `Config` for unit tests: dummy LLM, hashing embedder, no keys.
#[cfg(test)]
impl Config {
    pub fn test_default(data_dir: &Path) -> Self {
        let mut config = resolve(RawConfig::default(), &Overrides::default())
            .expect("built-in defaults are valid");
        config.data_dir = data_dir.to_path_buf();
        config.llm.provider = "dummy".into();
        config.embeddings.provider = "hashing".into();
        config.embeddings.hashing_dimensions = 64;
        config.web.static_dir = data_dir.join("static");
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const MINIMAL_TOML: &str = r#"
[service]
data_dir = "~/.docchat"
log_level = "info"
"#;

    fn write_toml(content: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    #[test]
    fn empty_file_uses_defaults() {
        let f = write_toml("");
        let cfg = load_from(f.path(), &Overrides::default()).unwrap();
        assert_eq!(cfg.agent.default_search_k, 3);
        assert_eq!(cfg.agent.max_search_k, 20);
        assert_eq!(cfg.rag.chunk_size, 1000);
        assert_eq!(cfg.rag.chunk_overlap, 150);
        assert_eq!(cfg.rag.index_mode, IndexMode::Auto);
        assert_eq!(cfg.llm.openai.model, "gemini-2.5-flash-lite");
        assert_eq!(cfg.web.pdf_timeout_seconds, 10);
    }

    #[test]
    fn tilde_data_dir_expands_to_home() {
        let home = dirs::home_dir().expect("home dir must exist in test env");
        let f = write_toml(MINIMAL_TOML);
        let cfg = load_from(f.path(), &Overrides::default()).unwrap();
        assert!(cfg.data_dir.starts_with(&home));
        assert!(cfg.data_dir.ends_with(".docchat"));
    }

    #[test]
    fn relative_path_unchanged() {
        assert_eq!(expand_home("relative/path"), PathBuf::from("relative/path"));
        assert_eq!(expand_home("/absolute/path"), PathBuf::from("/absolute/path"));
    }

    #[test]
    fn missing_file_errors() {
        let result = load_from(Path::new("/nonexistent/config.toml"), &Overrides::default());
        let msg = result.unwrap_err().to_string();
        assert!(msg.contains("config error"));
    }

    #[test]
    fn overrides_win_over_file() {
        let f = write_toml(MINIMAL_TOML);
        let overrides = Overrides {
            data_dir: Some("/tmp/docchat-override".into()),
            log_level: Some("debug".into()),
            agent_host: Some("agent".into()),
            agent_port: Some("9001".into()),
        };
        let cfg = load_from(f.path(), &overrides).unwrap();
        assert_eq!(cfg.data_dir, PathBuf::from("/tmp/docchat-override"));
        assert_eq!(cfg.log_level, "debug");
        assert_eq!(cfg.web.agent_base_url(), "http://agent:9001");
        assert_eq!(cfg.agent.bind, "0.0.0.0:9001");
    }

    #[test]
    fn port_override_moves_agent_bind() {
        let f = write_toml("[agent]\nbind = \"127.0.0.1:8000\"\n");
        let overrides = Overrides {
            agent_host: Some("agent.internal".into()),
            agent_port: Some("8100".into()),
            ..Default::default()
        };
        let cfg = load_from(f.path(), &overrides).unwrap();
        assert_eq!(cfg.agent.bind, "127.0.0.1:8100");
        assert_eq!(cfg.web.agent_base_url(), "http://agent.internal:8100");

        let untouched = load_from(f.path(), &Overrides::default()).unwrap();
        assert_eq!(untouched.agent.bind, "127.0.0.1:8000");
    }

    #[test]
    fn port_override_needs_a_bind_port() {
        let f = write_toml("[agent]\nbind = \"localhost\"\n");
        let overrides = Overrides { agent_port: Some("8100".into()), ..Default::default() };
        let err = load_from(f.path(), &overrides).unwrap_err();
        assert!(err.to_string().contains("agent.bind"));
    }

    #[test]
    fn bad_port_override_errors() {
        let f = write_toml(MINIMAL_TOML);
        let overrides = Overrides { agent_port: Some("eighty".into()), ..Default::default() };
        assert!(load_from(f.path(), &overrides).is_err());
    }

    #[test]
    fn overlap_must_be_smaller_than_chunk() {
        let f = write_toml("[rag]\nchunk_size = 100\nchunk_overlap = 100\n");
        let err = load_from(f.path(), &Overrides::default()).unwrap_err();
        assert!(err.to_string().contains("chunk_overlap"));
    }

    #[test]
    fn unknown_index_mode_errors() {
        let f = write_toml("[rag]\nindex_mode = \"sometimes\"\n");
        assert!(load_from(f.path(), &Overrides::default()).is_err());
    }

    #[test]
    fn llm_section_parses() {
        let f = write_toml(
            r#"
[llm]
default = "dummy"

[llm.openai]
model = "gpt-4o-mini"
temperature = 0.3
"#,
        );
        let cfg = load_from(f.path(), &Overrides::default()).unwrap();
        assert_eq!(cfg.llm.provider, "dummy");
        assert_eq!(cfg.llm.openai.model, "gpt-4o-mini");
        assert!((cfg.llm.openai.temperature - 0.3).abs() < f32::EPSILON);
    }
}
