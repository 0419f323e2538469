#[cfg(test)]
mod tests;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

use crate::embeddings::chunking::ChunkingConfig;

/// Environment variable overriding the application directory
pub const HOME_ENV_VAR: &str = "RAGCHAT_HOME";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub ollama: OllamaConfig,
    #[serde(default)]
    pub generator: GeneratorConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(skip)]
    pub base_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OllamaConfig {
    pub protocol: String,
    pub host: String,
    pub port: u16,
    pub embedding_model: String,
    pub batch_size: u32,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            protocol: "http".to_string(),
            host: "localhost".to_string(),
            port: 11434,
            embedding_model: "all-minilm:latest".to_string(),
            batch_size: 16,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Catalog name of the model loaded at startup
    pub default_model: String,
    /// Total token budget shared by prompt and completion
    pub context_window: usize,
    /// Upper bound on generated tokens per answer
    pub max_new_tokens: usize,
    /// Wall-clock limit for a single generation
    pub timeout_secs: u64,
    /// Catalog name -> model id known to the runtime
    pub models: BTreeMap<String, String>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        let models = BTreeMap::from([
            ("phi-2".to_string(), "phi:2.7b".to_string()),
            ("gemma-2-2b".to_string(), "gemma2:2b".to_string()),
        ]);

        Self {
            default_model: "phi-2".to_string(),
            context_window: 8192,
            max_new_tokens: 200,
            timeout_secs: 300,
            models,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Number of chunks retrieved per question
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self { top_k: 3 }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration directory not found or could not be created")]
    DirectoryError,
    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),
    #[error("Invalid port: {0} (must be between 1 and 65535)")]
    InvalidPort(u16),
    #[error("Invalid batch size: {0} (must be between 1 and 1000)")]
    InvalidBatchSize(u32),
    #[error("Invalid model name: {0} (cannot be empty)")]
    InvalidModel(String),
    #[error("Invalid protocol: {0} (must be 'http' or 'https')")]
    InvalidProtocol(String),
    #[error("Default model '{0}' is not in the model catalog")]
    UnknownDefaultModel(String),
    #[error("Invalid context window: {0} (must be between 256 and 131072)")]
    InvalidContextWindow(usize),
    #[error("Invalid max new tokens: {0} (must be between 1 and the context window)")]
    InvalidMaxNewTokens(usize),
    #[error("Invalid generation timeout: {0} (must be between 1 and 3600 seconds)")]
    InvalidTimeout(u64),
    #[error("Invalid top k: {0} (must be between 1 and 100)")]
    InvalidTopK(usize),
    #[error("Invalid chunk size: {0} (must be between 50 and 8192)")]
    InvalidChunkSize(usize),
    #[error("Chunk overlap ({0}) must be smaller than chunk size ({1})")]
    OverlapTooLarge(usize, usize),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl Config {
    /// Defaults rooted at `base_dir`
    #[inline]
    pub fn with_base_dir<P: AsRef<Path>>(base_dir: P) -> Self {
        Self {
            ollama: OllamaConfig::default(),
            generator: GeneratorConfig::default(),
            retrieval: RetrievalConfig::default(),
            chunking: ChunkingConfig::default(),
            base_dir: base_dir.as_ref().to_path_buf(),
        }
    }

    /// Application directory: `$RAGCHAT_HOME`, else the platform data directory
    #[inline]
    pub fn config_dir() -> Result<PathBuf, ConfigError> {
        resolve_config_dir(std::env::var_os(HOME_ENV_VAR), dirs::data_dir())
    }

    /// Load the configuration from the default application directory
    #[inline]
    pub fn load_default() -> Result<Self> {
        let config_dir = Self::config_dir()?;
        Self::load(config_dir)
    }

    #[inline]
    pub fn load<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let config_path = config_dir.as_ref().join("config.toml");

        if !config_path.exists() {
            return Ok(Self::with_base_dir(config_dir));
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;
        config.base_dir = config_dir.as_ref().to_path_buf();

        config
            .validate()
            .with_context(|| "Configuration validation failed")?;

        Ok(config)
    }

    #[inline]
    pub fn save(&self) -> Result<()> {
        self.validate()
            .context("Configuration validation failed before saving")?;

        let config_dir = self.get_base_dir();

        fs::create_dir_all(config_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                config_dir.display()
            )
        })?;

        let config_path = self.config_file_path();
        let content = toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

        Ok(())
    }

    /// Get the base directory for the application
    #[inline]
    pub fn get_base_dir(&self) -> &Path {
        &self.base_dir
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.ollama.validate()?;
        self.generator.validate()?;
        self.validate_retrieval_config()?;
        self.validate_chunking_config()?;
        Ok(())
    }

    fn validate_retrieval_config(&self) -> Result<(), ConfigError> {
        if !(1..=100).contains(&self.retrieval.top_k) {
            return Err(ConfigError::InvalidTopK(self.retrieval.top_k));
        }
        Ok(())
    }

    fn validate_chunking_config(&self) -> Result<(), ConfigError> {
        let config = &self.chunking;

        if !(50..=8192).contains(&config.chunk_size) {
            return Err(ConfigError::InvalidChunkSize(config.chunk_size));
        }

        if config.chunk_overlap >= config.chunk_size {
            return Err(ConfigError::OverlapTooLarge(
                config.chunk_overlap,
                config.chunk_size,
            ));
        }

        Ok(())
    }

    #[inline]
    pub fn ollama_url(&self) -> Result<Url, ConfigError> {
        self.ollama.ollama_url()
    }

    #[inline]
    pub fn config_file_path(&self) -> PathBuf {
        self.get_base_dir().join("config.toml")
    }

    /// Directory holding the vector index snapshot
    #[inline]
    pub fn index_dir(&self) -> PathBuf {
        self.get_base_dir().join("index")
    }

    /// Path of the SQLite response cache
    #[inline]
    pub fn cache_path(&self) -> PathBuf {
        self.get_base_dir().join("responses.db")
    }

    /// Directory of the content-addressed object store
    #[inline]
    pub fn objects_dir(&self) -> PathBuf {
        self.get_base_dir().join("objects")
    }

    /// Directory where fetched uploads are materialised
    #[inline]
    pub fn uploads_dir(&self) -> PathBuf {
        self.get_base_dir().join("uploads")
    }
}

fn resolve_config_dir(
    override_dir: Option<OsString>,
    data_dir: Option<PathBuf>,
) -> Result<PathBuf, ConfigError> {
    match override_dir {
        Some(dir) if !dir.is_empty() => Ok(PathBuf::from(dir)),
        _ => data_dir
            .map(|dir| dir.join("ragchat"))
            .ok_or(ConfigError::DirectoryError),
    }
}

impl OllamaConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.protocol != "http" && self.protocol != "https" {
            return Err(ConfigError::InvalidProtocol(self.protocol.clone()));
        }

        self.ollama_url()?;

        if self.port == 0 {
            return Err(ConfigError::InvalidPort(self.port));
        }

        if self.embedding_model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.embedding_model.clone()));
        }

        if self.batch_size == 0 || self.batch_size > 1000 {
            return Err(ConfigError::InvalidBatchSize(self.batch_size));
        }

        Ok(())
    }

    #[inline]
    pub fn ollama_url(&self) -> Result<Url, ConfigError> {
        let url_str = format!("{}://{}:{}", self.protocol, self.host, self.port);
        Url::parse(&url_str).map_err(|_| ConfigError::InvalidUrl(url_str))
    }

    #[inline]
    pub fn set_protocol(&mut self, protocol: String) -> Result<(), ConfigError> {
        if protocol != "http" && protocol != "https" {
            return Err(ConfigError::InvalidProtocol(protocol));
        }
        self.protocol = protocol;
        Ok(())
    }

    #[inline]
    pub fn set_host(&mut self, host: String) -> Result<(), ConfigError> {
        let temp_config = OllamaConfig {
            host: host.clone(),
            ..self.clone()
        };
        temp_config.validate()?;
        self.host = host;
        Ok(())
    }

    #[inline]
    pub fn set_port(&mut self, port: u16) -> Result<(), ConfigError> {
        if port == 0 {
            return Err(ConfigError::InvalidPort(port));
        }
        self.port = port;
        Ok(())
    }

    #[inline]
    pub fn set_embedding_model(&mut self, model: String) -> Result<(), ConfigError> {
        if model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(model));
        }
        self.embedding_model = model;
        Ok(())
    }

    #[inline]
    pub fn set_batch_size(&mut self, batch_size: u32) -> Result<(), ConfigError> {
        if batch_size == 0 || batch_size > 1000 {
            return Err(ConfigError::InvalidBatchSize(batch_size));
        }
        self.batch_size = batch_size;
        Ok(())
    }
}

impl GeneratorConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some((name, _)) = self
            .models
            .iter()
            .find(|(name, id)| name.trim().is_empty() || id.trim().is_empty())
        {
            return Err(ConfigError::InvalidModel(name.clone()));
        }

        if !self.models.contains_key(&self.default_model) {
            return Err(ConfigError::UnknownDefaultModel(self.default_model.clone()));
        }

        if !(256..=131_072).contains(&self.context_window) {
            return Err(ConfigError::InvalidContextWindow(self.context_window));
        }

        if self.max_new_tokens == 0 || self.max_new_tokens > self.context_window {
            return Err(ConfigError::InvalidMaxNewTokens(self.max_new_tokens));
        }

        if !(1..=3600).contains(&self.timeout_secs) {
            return Err(ConfigError::InvalidTimeout(self.timeout_secs));
        }

        Ok(())
    }

    /// Runtime model id for a catalog name
    #[inline]
    pub fn runtime_model(&self, name: &str) -> Option<&str> {
        self.models.get(name).map(String::as_str)
    }

    #[inline]
    pub fn set_default_model(&mut self, name: String) -> Result<(), ConfigError> {
        if !self.models.contains_key(&name) {
            return Err(ConfigError::UnknownDefaultModel(name));
        }
        self.default_model = name;
        Ok(())
    }

    /// Add or replace a catalog entry
    #[inline]
    pub fn register_model(&mut self, name: String, runtime_model: String) -> Result<(), ConfigError> {
        if name.trim().is_empty() {
            return Err(ConfigError::InvalidModel(name));
        }
        if runtime_model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(runtime_model));
        }
        self.models.insert(name, runtime_model);
        Ok(())
    }
}
