//! TOML configuration.
//!
//! Every section is optional; a missing config file yields the defaults.
//! The loaded [`Config`] is passed into each component when it is built,
//! nothing reads configuration from global state afterwards.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use ragchat_core::embedding::EmbeddingMode;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub local_index: LocalIndexConfig,
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatConfig {
    /// Use on-device embeddings and the local language model.
    #[serde(default)]
    pub local_mode: bool,
    /// Remote chat model.
    #[serde(default = "default_chat_model")]
    pub model: String,
    /// Carry earlier turns into later prompts.
    #[serde(default = "default_true")]
    pub keep_history: bool,
    /// Most recent turns carried over when `keep_history` is on.
    #[serde(default = "default_history_turns")]
    pub history_turns: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            local_mode: false,
            model: default_chat_model(),
            keep_history: true,
            history_turns: default_history_turns(),
        }
    }
}

fn default_chat_model() -> String {
    "gpt-3.5-turbo".to_string()
}
fn default_history_turns() -> usize {
    crate::chat::DEFAULT_HISTORY_TURNS
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Hits requested per index query.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            top_k: default_top_k(),
        }
    }
}

fn default_max_concurrency() -> usize {
    8
}
fn default_top_k() -> usize {
    10
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct EmbeddingConfig {
    /// `openai`, `ollama` or `local`. Unset follows `chat.local_mode`.
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL for the `ollama` provider.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub batch_size: Option<usize>,
    #[serde(default)]
    pub max_retries: Option<u32>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl EmbeddingConfig {
    pub fn batch_size(&self) -> usize {
        self.batch_size.unwrap_or(64)
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries.unwrap_or(5)
    }

    pub fn timeout_secs(&self) -> u64 {
        self.timeout_secs.unwrap_or(30)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LocalIndexConfig {
    #[serde(default = "default_index_path")]
    pub path: PathBuf,
}

impl Default for LocalIndexConfig {
    fn default() -> Self {
        Self {
            path: default_index_path(),
        }
    }
}

fn default_index_path() -> PathBuf {
    PathBuf::from("./data/ragchat.sqlite")
}

#[derive(Debug, Deserialize, Clone)]
pub struct RemoteConfig {
    #[serde(default = "default_remote_url")]
    pub base_url: String,
    /// Environment variable holding the bearer token.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_remote_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_remote_retries")]
    pub max_retries: u32,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: default_remote_url(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_remote_timeout(),
            max_retries: default_remote_retries(),
        }
    }
}

fn default_remote_url() -> String {
    "http://localhost:8080".to_string()
}
fn default_api_key_env() -> String {
    "RAGCHAT_API_KEY".to_string()
}
fn default_remote_timeout() -> u64 {
    60
}
fn default_remote_retries() -> u32 {
    2
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_ollama_url")]
    pub ollama_url: String,
    #[serde(default = "default_local_model")]
    pub local_model: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            ollama_url: default_ollama_url(),
            local_model: default_local_model(),
        }
    }
}

fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}
fn default_local_model() -> String {
    "llama2".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_chars")]
    pub chunk_chars: usize,
    #[serde(default = "default_overlap_chars")]
    pub overlap_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_chars: default_chunk_chars(),
            overlap_chars: default_overlap_chars(),
        }
    }
}

fn default_chunk_chars() -> usize {
    2048
}
fn default_overlap_chars() -> usize {
    80
}

impl Config {
    pub fn mode(&self) -> EmbeddingMode {
        EmbeddingMode::from_local_flag(self.chat.local_mode)
    }

    /// The embedding provider in effect, after applying the mode default.
    pub fn embedding_provider(&self) -> &str {
        match self.embedding.provider.as_deref() {
            Some(p) => p,
            None if self.chat.local_mode => "local",
            None => "openai",
        }
    }

    /// Parse and validate a TOML document.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(content).with_context(|| "Failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.search.max_concurrency == 0 {
            bail!("search.max_concurrency must be >= 1");
        }
        if self.search.top_k == 0 {
            bail!("search.top_k must be >= 1");
        }
        if self.chunking.chunk_chars == 0 {
            bail!("chunking.chunk_chars must be > 0");
        }
        if self.chunking.overlap_chars >= self.chunking.chunk_chars {
            bail!("chunking.overlap_chars must be smaller than chunking.chunk_chars");
        }
        if self.embedding.dims == Some(0) {
            bail!("embedding.dims must be > 0");
        }
        if self.embedding.batch_size == Some(0) {
            bail!("embedding.batch_size must be > 0");
        }

        match self.embedding_provider() {
            "openai" | "ollama" | "local" => {}
            other => bail!(
                "Unknown embedding provider: '{}'. Must be openai, ollama, or local.",
                other
            ),
        }
        if self.embedding_provider() == "ollama" && self.embedding.model.is_none() {
            bail!("embedding.model must be specified when provider is 'ollama'");
        }
        if self.embedding_provider() == "ollama" && self.embedding.dims.is_none() {
            bail!("embedding.dims must be specified when provider is 'ollama'");
        }
        Ok(())
    }
}

/// Load the config at `path`, or the defaults if no file exists there.
pub fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "no config file, using defaults");
        return Ok(Config::default());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    Config::from_toml(&content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = Config::from_toml("").unwrap();
        assert!(!cfg.chat.local_mode);
        assert_eq!(cfg.chat.model, "gpt-3.5-turbo");
        assert!(cfg.chat.keep_history);
        assert_eq!(cfg.chat.history_turns, 10);
        assert_eq!(cfg.search.max_concurrency, 8);
        assert_eq!(cfg.chunking.chunk_chars, 2048);
        assert_eq!(cfg.chunking.overlap_chars, 80);
        assert_eq!(cfg.llm.local_model, "llama2");
        assert_eq!(cfg.embedding_provider(), "openai");
        assert_eq!(cfg.mode(), EmbeddingMode::Remote);
    }

    #[test]
    fn test_local_mode_selects_local_provider() {
        let cfg = Config::from_toml("[chat]\nlocal_mode = true\n").unwrap();
        assert_eq!(cfg.embedding_provider(), "local");
        assert_eq!(cfg.mode(), EmbeddingMode::Local);
    }

    #[test]
    fn test_explicit_provider_wins() {
        let cfg = Config::from_toml(
            "[chat]\nlocal_mode = true\n[embedding]\nprovider = \"ollama\"\nmodel = \"nomic-embed-text\"\ndims = 768\n",
        )
        .unwrap();
        assert_eq!(cfg.embedding_provider(), "ollama");
    }

    #[test]
    fn test_rejects_zero_concurrency() {
        let err = Config::from_toml("[search]\nmax_concurrency = 0\n").unwrap_err();
        assert!(err.to_string().contains("max_concurrency"));
    }

    #[test]
    fn test_rejects_unknown_provider() {
        let err = Config::from_toml("[embedding]\nprovider = \"cohere\"\n").unwrap_err();
        assert!(err.to_string().contains("Unknown embedding provider"));
    }

    #[test]
    fn test_rejects_overlap_not_smaller_than_chunk() {
        assert!(Config::from_toml("[chunking]\nchunk_chars = 10\noverlap_chars = 10\n").is_err());
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let cfg = load_config(Path::new("/definitely/not/here/ragchat.toml")).unwrap();
        assert_eq!(cfg.search.top_k, 10);
    }
}
