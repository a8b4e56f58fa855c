use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub storage: StorageConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// SQLite database holding the active document session and its vectors.
    pub index_path: PathBuf,
    /// JSON interaction log.
    pub memory_path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_overlap")]
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            overlap: default_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    1000
}
fn default_overlap() -> usize {
    200
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Number of chunks handed back by the document search tool.
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
    4
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// `hashed` (local, deterministic), `openai`, or `disabled`.
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_dims")]
    pub dims: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: None,
            dims: default_dims(),
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_embedding_provider() -> String {
    "hashed".to_string()
}
fn default_dims() -> usize {
    384
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default)]
    pub temperature: f64,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_llm_retries")]
    pub max_retries: u32,
    /// Hard cap on think/act/observe iterations per query.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    /// How many malformed model turns to tolerate before giving up.
    #[serde(default = "default_max_parse_retries")]
    pub max_parse_retries: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: default_llm_model(),
            temperature: 0.0,
            timeout_secs: default_llm_timeout_secs(),
            max_retries: default_llm_retries(),
            max_iterations: default_max_iterations(),
            max_parse_retries: default_max_parse_retries(),
        }
    }
}

fn default_llm_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_llm_timeout_secs() -> u64 {
    60
}
fn default_llm_retries() -> u32 {
    3
}
fn default_max_iterations() -> u32 {
    12
}
fn default_max_parse_retries() -> u32 {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct MemoryConfig {
    /// Recent interactions fed to the reasoning loop for reference resolution.
    #[serde(default = "default_window_size")]
    pub window_size: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            window_size: default_window_size(),
        }
    }
}

fn default_window_size() -> usize {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct CaptureConfig {
    /// Packets decoded for the capture summary. Packets beyond the cap are
    /// still counted toward the total but not analyzed.
    #[serde(default = "default_max_analyzed_packets")]
    pub max_analyzed_packets: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            max_analyzed_packets: default_max_analyzed_packets(),
        }
    }
}

fn default_max_analyzed_packets() -> usize {
    1000
}

#[derive(Debug, Deserialize, Clone)]
pub struct ToolsConfig {
    #[serde(default = "default_web_results")]
    pub web_search_results: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            web_search_results: default_web_results(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_web_results() -> usize {
    3
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.chunking.chunk_size == 0 {
        anyhow::bail!("chunking.chunk_size must be > 0");
    }
    if config.chunking.overlap >= config.chunking.chunk_size {
        anyhow::bail!("chunking.overlap must be smaller than chunking.chunk_size");
    }
    if config.retrieval.top_k == 0 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }
    if config.llm.max_iterations == 0 {
        anyhow::bail!("llm.max_iterations must be >= 1");
    }
    if config.memory.window_size == 0 {
        anyhow::bail!("memory.window_size must be >= 1");
    }
    if config.capture.max_analyzed_packets == 0 {
        anyhow::bail!("capture.max_analyzed_packets must be >= 1");
    }

    match config.embedding.provider.as_str() {
        "hashed" | "openai" | "disabled" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be hashed, openai, or disabled.",
            other
        ),
    }

    if config.embedding.is_enabled() && config.embedding.dims == 0 {
        anyhow::bail!(
            "embedding.dims must be > 0 when provider is '{}'",
            config.embedding.provider
        );
    }
    if config.embedding.provider == "openai" && config.embedding.model.is_none() {
        anyhow::bail!("embedding.model must be specified for the openai provider");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_str: &str) -> Result<Config> {
        let config: Config = toml::from_str(toml_str)?;
        validate(&config)?;
        Ok(config)
    }

    const MINIMAL: &str = r#"
        [storage]
        index_path = "data/index.sqlite"
        memory_path = "data/memory.json"
    "#;

    #[test]
    fn minimal_config_uses_defaults() {
        let config = parse(MINIMAL).unwrap();
        assert_eq!(config.chunking.chunk_size, 1000);
        assert_eq!(config.chunking.overlap, 200);
        assert_eq!(config.retrieval.top_k, 4);
        assert_eq!(config.memory.window_size, 10);
        assert_eq!(config.capture.max_analyzed_packets, 1000);
        assert_eq!(config.embedding.provider, "hashed");
        assert_eq!(config.llm.max_iterations, 12);
    }

    #[test]
    fn overlap_must_be_smaller_than_chunk_size() {
        let bad = r#"
            [storage]
            index_path = "a.sqlite"
            memory_path = "m.json"

            [chunking]
            chunk_size = 100
            overlap = 100
        "#;
        assert!(parse(bad).is_err());
    }

    #[test]
    fn unknown_embedding_provider_rejected() {
        let bad = r#"
            [storage]
            index_path = "a.sqlite"
            memory_path = "m.json"

            [embedding]
            provider = "faiss"
        "#;
        assert!(parse(bad).is_err());
    }

    #[test]
    fn openai_provider_requires_model() {
        let bad = r#"
            [storage]
            index_path = "a.sqlite"
            memory_path = "m.json"

            [embedding]
            provider = "openai"
            dims = 1536
        "#;
        assert!(parse(bad).is_err());
    }
}
