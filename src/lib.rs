use thiserror::Error;

pub type Result<T> = std::result::Result<T, RagError>;

#[derive(Error, Debug)]
pub enum RagError {
    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    #[error("Embedding dimension mismatch: index expects {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error(
        "Prompt too long: {tokens} tokens leaves no room in the {limit}-token context window. Reduce retrieved chunks."
    )]
    PromptTooLong { tokens: usize, limit: usize },

    #[error("Failed to load model '{model}': {reason}")]
    ModelLoadFailure { model: String, reason: String },

    #[error("No language model is loaded")]
    NoModelLoaded,

    #[error("Document error: {0}")]
    Document(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Generation error: {0}")]
    Generation(String),

    #[error("Generation cancelled")]
    Cancelled,

    #[error("Index persistence error: {0}")]
    Persistence(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Object store error: {0}")]
    Store(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl RagError {
    /// Stable name of the error kind, used in structured responses
    #[inline]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnsupportedFormat(_) => "UnsupportedFormat",
            Self::DimensionMismatch { .. } => "DimensionMismatch",
            Self::PromptTooLong { .. } => "PromptTooLong",
            Self::ModelLoadFailure { .. } => "ModelLoadFailure",
            Self::NoModelLoaded => "NoModelLoaded",
            Self::Document(_) => "Document",
            Self::Embedding(_) => "Embedding",
            Self::Generation(_) => "Generation",
            Self::Cancelled => "Cancelled",
            Self::Persistence(_) => "Persistence",
            Self::Cache(_) => "Cache",
            Self::Store(_) => "Store",
            Self::Config(_) => "Config",
            Self::Io(_) => "Io",
            Self::Other(_) => "Other",
        }
    }
}

pub mod cache;
pub mod commands;
pub mod config;
pub mod embeddings;
pub mod generator;
pub mod index;
pub mod pipeline;
pub mod service;
pub mod store;
