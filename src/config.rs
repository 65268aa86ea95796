//! TOML configuration parsing and validation.
//!
//! The configuration file names the document directory, the index database,
//! and the remote providers used for embeddings and chat. Everything except
//! `[index]` and `[documents]` has defaults, so a minimal file is:
//!
//! ```toml
//! [index]
//! path = "./data/index.sqlite"
//!
//! [documents]
//! root = "./data/docs"
//! ```
//!
//! A few values can also come from the environment, which takes precedence
//! over the file (see [`apply_env_overrides`]).

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Overrides `[documents].root`.
pub const ENV_DOCS_DIR: &str = "SYLLABUS_DOCS_DIR";
/// Overrides `[index].path`.
pub const ENV_INDEX_PATH: &str = "SYLLABUS_INDEX_PATH";
/// Overrides the port of `[server].bind` (binds `0.0.0.0:$PORT`).
pub const ENV_PORT: &str = "PORT";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub index: IndexConfig,
    pub documents: DocumentsConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub prompt: PromptConfig,
    #[serde(default)]
    pub image: ImageConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DocumentsConfig {
    pub root: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,
}

fn default_include_globs() -> Vec<String> {
    vec!["**/*.pdf".to_string()]
}
fn default_max_file_bytes() -> u64 {
    200 * 1024 * 1024
}

/// Chunk sizes are measured in characters, not tokens.
#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    1000
}
fn default_chunk_overlap() -> usize {
    100
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
        }
    }
}

fn default_top_k() -> usize {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL override for the provider API (useful for proxies and tests).
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff_secs")]
    pub backoff_secs: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            url: None,
            batch_size: default_batch_size(),
            max_attempts: default_max_attempts(),
            backoff_secs: default_backoff_secs(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "gemini".to_string()
}
// Gemini caps batchEmbedContents at 100 requests per call.
fn default_batch_size() -> usize {
    95
}
fn default_max_attempts() -> u32 {
    5
}
fn default_backoff_secs() -> u64 {
    10
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatConfig {
    #[serde(default = "default_chat_base_url")]
    pub base_url: String,
    /// Environment variable holding the API key.
    #[serde(default = "default_chat_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_text_model")]
    pub text_model: String,
    #[serde(default = "default_vision_model")]
    pub vision_model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_chat_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_chat_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            base_url: default_chat_base_url(),
            api_key_env: default_chat_api_key_env(),
            text_model: default_text_model(),
            vision_model: default_vision_model(),
            temperature: default_temperature(),
            max_retries: default_chat_max_retries(),
            timeout_secs: default_chat_timeout_secs(),
        }
    }
}

fn default_chat_base_url() -> String {
    "https://api.groq.com/openai/v1".to_string()
}
fn default_chat_api_key_env() -> String {
    "GROQ_API_KEY".to_string()
}
fn default_text_model() -> String {
    "llama-3.1-8b-instant".to_string()
}
fn default_vision_model() -> String {
    "meta-llama/llama-4-scout-17b-16e-instruct".to_string()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_chat_max_retries() -> u32 {
    2
}
fn default_chat_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct PromptConfig {
    /// Curriculum named in the tutor persona.
    #[serde(default = "default_curriculum")]
    pub curriculum: String,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            curriculum: default_curriculum(),
        }
    }
}

fn default_curriculum() -> String {
    "SPPU engineering".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ImageConfig {
    #[serde(default = "default_max_dimension")]
    pub max_dimension: u32,
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            max_dimension: default_max_dimension(),
            jpeg_quality: default_jpeg_quality(),
        }
    }
}

fn default_max_dimension() -> u32 {
    1600
}
fn default_jpeg_quality() -> u8 {
    80
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Allowed CORS origins. Empty means any origin.
    #[serde(default)]
    pub cors_origins: Vec<String>,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            cors_origins: Vec::new(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}
fn default_max_upload_bytes() -> usize {
    10 * 1024 * 1024
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let mut config = parse_config(&content)?;
    apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
    Ok(config)
}

/// Parse and validate configuration text without touching the environment.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

/// Apply environment overrides using `lookup` to read variables.
///
/// Empty values are ignored.
pub fn apply_env_overrides<F>(config: &mut Config, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(dir) = lookup(ENV_DOCS_DIR) {
        config.documents.root = PathBuf::from(dir);
    }
    if let Some(path) = lookup(ENV_INDEX_PATH) {
        config.index.path = PathBuf::from(path);
    }
    if let Some(port) = lookup(ENV_PORT) {
        let port: u16 = port
            .trim()
            .parse()
            .with_context(|| format!("{} must be a port number, got '{}'", ENV_PORT, port))?;
        config.server.bind = format!("0.0.0.0:{}", port);
    }
    Ok(())
}

fn validate(config: &Config) -> Result<()> {
    // Validate chunking
    if config.chunking.chunk_size == 0 {
        bail!("chunking.chunk_size must be > 0");
    }
    if config.chunking.chunk_overlap >= config.chunking.chunk_size {
        bail!(
            "chunking.chunk_overlap ({}) must be smaller than chunking.chunk_size ({})",
            config.chunking.chunk_overlap,
            config.chunking.chunk_size
        );
    }

    // Validate retrieval
    if config.retrieval.top_k == 0 {
        bail!("retrieval.top_k must be >= 1");
    }

    // Validate embedding
    if config.embedding.batch_size == 0 {
        bail!("embedding.batch_size must be > 0");
    }
    if config.embedding.max_attempts == 0 {
        bail!("embedding.max_attempts must be >= 1");
    }
    match config.embedding.provider.as_str() {
        "disabled" | "gemini" => {}
        "openai" => {
            if config.embedding.model.is_none() {
                bail!("embedding.model must be specified when provider is 'openai'");
            }
        }
        other => bail!(
            "Unknown embedding provider: '{}'. Must be disabled, gemini, or openai.",
            other
        ),
    }
    if config.embedding.dims == Some(0) {
        bail!("embedding.dims must be > 0 when set");
    }

    // Validate image
    if config.image.max_dimension == 0 {
        bail!("image.max_dimension must be > 0");
    }
    if !(1..=100).contains(&config.image.jpeg_quality) {
        bail!("image.jpeg_quality must be in [1, 100]");
    }

    if !(0.0..=2.0).contains(&config.chat.temperature) {
        bail!("chat.temperature must be in [0.0, 2.0]");
    }

    Ok(())
}
