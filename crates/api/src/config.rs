use anyhow::{Context, Result};
use extract::{OllamaConfig, RetryConfig};
use index::{Neo4jConfig, QdrantConfig, SearchConfig, SearchStrategy};
use resolve::ResolverConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

pub const CONFIG_ENV: &str = "KG_CONFIG";
pub const MODE_ENV: &str = "KG_MODE";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub mode: OperationMode,
    pub bind_addr: String,
    /// Upper bound on one `/generate` call, generation and resolution included.
    pub request_timeout_secs: u64,
    pub store: StoreBackend,
    pub llm: OllamaConfig,
    pub retry: RetryConfig,
    pub search: SearchConfig,
    pub qdrant: QdrantConfig,
    pub neo4j: Neo4jConfig,
    pub resolver: ResolverConfig,
    /// Backoff for connecting to the store and index at startup.
    pub connect: ConnectConfig,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum OperationMode {
    Fast,      // fewer attempts, short timeout
    Accurate,  // more attempts, ranked search
    Balanced,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    Neo4j,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectConfig {
    pub max_retries: usize,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for ConnectConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 1000,
            max_backoff_ms: 10000,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            mode: OperationMode::Balanced,
            bind_addr: "0.0.0.0:3000".to_string(),
            request_timeout_secs: 60,
            store: StoreBackend::Memory,
            llm: OllamaConfig::default(),
            retry: RetryConfig::default(),
            search: SearchConfig::default(),
            qdrant: QdrantConfig::default(),
            neo4j: Neo4jConfig::default(),
            resolver: ResolverConfig::default(),
            connect: ConnectConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn fast_mode() -> Self {
        Self {
            mode: OperationMode::Fast,
            request_timeout_secs: 30,
            retry: RetryConfig { max_attempts: 2 },
            resolver: ResolverConfig {
                max_concurrent_searches: 16,
                ..ResolverConfig::default()
            },
            connect: ConnectConfig {
                max_retries: 2,
                initial_backoff_ms: 500,
                max_backoff_ms: 5000,
            },
            ..Self::default()
        }
    }

    pub fn accurate_mode() -> Self {
        Self {
            mode: OperationMode::Accurate,
            request_timeout_secs: 120,
            retry: RetryConfig { max_attempts: 5 },
            search: SearchConfig {
                strategy: SearchStrategy::Ranked,
                ..SearchConfig::default()
            },
            resolver: ResolverConfig {
                max_concurrent_searches: 4,
                ..ResolverConfig::default()
            },
            connect: ConnectConfig {
                max_retries: 5,
                initial_backoff_ms: 2000,
                max_backoff_ms: 20000,
            },
            ..Self::default()
        }
    }

    pub fn preset(mode: OperationMode) -> Self {
        match mode {
            OperationMode::Fast => Self::fast_mode(),
            OperationMode::Accurate => Self::accurate_mode(),
            OperationMode::Balanced => Self::default(),
        }
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// File named by `KG_CONFIG` if set, otherwise the `KG_MODE` preset
    /// (`fast`, `accurate`, `balanced`), then `OLLAMA_URL` and `NEO4J_URI`
    /// overrides.
    pub fn load() -> Result<Self> {
        let mut config = match std::env::var(CONFIG_ENV) {
            Ok(path) => {
                info!(path = %path, "Loading configuration");
                Self::from_file(path)?
            }
            Err(_) => {
                let mode = std::env::var(MODE_ENV).ok();
                Self::preset(parse_mode(mode.as_deref())?)
            }
        };
        config.apply_overrides(|name| std::env::var(name).ok());
        Ok(config)
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(url) = var("OLLAMA_URL") {
            self.llm.base_url = url.clone();
            self.qdrant.embedding_url = url;
        }
        if let Some(uri) = var("NEO4J_URI") {
            self.neo4j.uri = uri;
        }
    }
}

fn parse_mode(raw: Option<&str>) -> Result<OperationMode> {
    match raw.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
        None | Some("") | Some("balanced") => Ok(OperationMode::Balanced),
        Some("fast") => Ok(OperationMode::Fast),
        Some("accurate") => Ok(OperationMode::Accurate),
        Some(other) => anyhow::bail!("Unknown {MODE_ENV} value {other:?}"),
    }
}
