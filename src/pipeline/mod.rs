//! Ingestion and question answering over the vector index.
//!
//! The [`Pipeline`] owns the embedder, the index, the response cache and the
//! generator. Ingestion is the only writer of the index: it takes the write
//! lock for the append and keeps the read side while the snapshot is written,
//! so snapshots land in ingestion order. Queries only ever read it.


use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::cache::ResponseCache;
use crate::config::Config;
use crate::embeddings::chunking::{ChunkingConfig, DocumentFormat, chunk_document};
use crate::embeddings::{Embedder, OllamaClient};
use crate::generator::{Generator, LanguageModel, ModelHandle};
use crate::index::{Retrieval, VectorIndex, snapshot};
use crate::{RagError, Result};

/// Prompt sent to the model when retrieved context is available
#[inline]
pub fn build_prompt(context: &str, query: &str) -> String {
    format!("Context: {}\n\nQuestion: {}\nAnswer:", context, query)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PipelineState {
    Idle,
    Ingesting,
    Indexed,
    Answering,
}

impl fmt::Display for PipelineState {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Ingesting => "ingesting",
            Self::Indexed => "indexed",
            Self::Answering => "answering",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum AnswerMode {
    /// Generated from the question alone
    Direct,
    /// Generated from a prompt built around retrieved chunks
    Retrieval { chunks_used: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Answer {
    pub text: String,
    pub from_cache: bool,
    #[serde(flatten)]
    pub mode: AnswerMode,
}

/// Snapshot of what the pipeline is doing and holding
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineStatus {
    pub state: PipelineState,
    pub chunks: usize,
    pub dimension: Option<usize>,
    pub active_model: Option<String>,
    pub cached_responses: Option<u64>,
}

/// Everything a [`Pipeline`] is assembled from
pub struct PipelineParts {
    pub embedder: Arc<dyn Embedder>,
    pub generator: Generator,
    pub cache: ResponseCache,
    pub index: VectorIndex,
    /// Where index snapshots are written; `None` keeps the index in memory only
    pub index_dir: Option<PathBuf>,
    pub chunking: ChunkingConfig,
    pub top_k: usize,
}

pub struct Pipeline {
    embedder: Arc<dyn Embedder>,
    generator: Generator,
    cache: ResponseCache,
    index: Arc<RwLock<VectorIndex>>,
    index_dir: Option<PathBuf>,
    chunking: ChunkingConfig,
    top_k: usize,
    /// Catalog name loaded on demand instead of the configured default
    preferred_model: Option<String>,
    ingesting: AtomicUsize,
    answering: AtomicUsize,
}

/// Marks an operation as running for as long as it is alive
struct Activity<'a>(&'a AtomicUsize);

impl<'a> Activity<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for Activity<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Pipeline {
    #[inline]
    pub fn new(parts: PipelineParts) -> Self {
        Self {
            embedder: parts.embedder,
            generator: parts.generator,
            cache: parts.cache,
            index: Arc::new(RwLock::new(parts.index)),
            index_dir: parts.index_dir,
            chunking: parts.chunking,
            top_k: parts.top_k,
            preferred_model: None,
            ingesting: AtomicUsize::new(0),
            answering: AtomicUsize::new(0),
        }
    }

    /// Assemble a pipeline backed by Ollama from the application config.
    ///
    /// The last index snapshot is restored if one is present. No model is
    /// loaded until the first answer that misses the cache.
    #[inline]
    pub async fn open(config: &Config) -> Result<Self> {
        let client = Arc::new(OllamaClient::new(config)?);
        let cache = ResponseCache::open(config.cache_path())
            .await
            .map_err(|e| RagError::Cache(format!("{:#}", e)))?;

        let index_dir = config.index_dir();
        let dir = index_dir.clone();
        let loaded = tokio::task::spawn_blocking(move || snapshot::load(&dir))
            .await
            .map_err(|e| RagError::Persistence(format!("snapshot load task failed: {}", e)))?;
        let index = match loaded {
            Ok(Some(index)) => index,
            Ok(None) => VectorIndex::new(),
            Err(e) => {
                warn!(
                    "Ignoring unreadable index snapshot in {}: {}",
                    index_dir.display(),
                    e
                );
                VectorIndex::new()
            }
        };

        let embedder: Arc<dyn Embedder> = Arc::clone(&client) as Arc<dyn Embedder>;
        let model: Arc<dyn LanguageModel> = client as Arc<dyn LanguageModel>;

        Ok(Self::new(PipelineParts {
            embedder,
            generator: Generator::new(model, config.generator.clone()),
            cache,
            index,
            index_dir: Some(index_dir),
            chunking: config.chunking.clone(),
            top_k: config.retrieval.top_k,
        }))
    }

    /// Load `name` instead of the default model when one is first needed
    #[inline]
    pub fn prefer_model(&mut self, name: &str) {
        self.preferred_model = Some(name.to_string());
    }

    #[inline]
    pub async fn state(&self) -> PipelineState {
        if self.ingesting.load(Ordering::SeqCst) > 0 {
            PipelineState::Ingesting
        } else if self.answering.load(Ordering::SeqCst) > 0 {
            PipelineState::Answering
        } else if self.index.read().await.is_empty() {
            PipelineState::Idle
        } else {
            PipelineState::Indexed
        }
    }

    #[inline]
    pub async fn status(&self) -> PipelineStatus {
        let state = self.state().await;
        let (chunks, dimension) = {
            let index = self.index.read().await;
            (index.len(), index.dimension())
        };
        let cached_responses = match self.cache.len().await {
            Ok(count) => Some(count),
            Err(e) => {
                warn!("Could not count cached responses: {:#}", e);
                None
            }
        };

        PipelineStatus {
            state,
            chunks,
            dimension,
            active_model: self.generator.active_model().await.map(|h| h.name),
            cached_responses,
        }
    }

    #[inline]
    pub async fn index_len(&self) -> usize {
        self.index.read().await.len()
    }

    #[inline]
    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    #[inline]
    pub fn generator(&self) -> &Generator {
        &self.generator
    }

    /// Ingest a TXT or PDF file, returning the number of chunks indexed
    #[inline]
    pub async fn ingest_file(&self, path: &Path) -> Result<usize> {
        // Reject unsupported files before reading them
        DocumentFormat::from_path(path)?;

        let bytes = tokio::fs::read(path).await.map_err(|e| {
            RagError::Document(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        self.ingest_bytes(&name, bytes).await
    }

    /// Ingest a document held in memory; `name` decides its format
    #[inline]
    pub async fn ingest_bytes(&self, name: &str, bytes: Vec<u8>) -> Result<usize> {
        let _activity = Activity::enter(&self.ingesting);

        let format = DocumentFormat::from_path(Path::new(name))?;
        info!("Ingesting {} ({} bytes)", name, bytes.len());

        let chunking = self.chunking.clone();
        let source = name.to_string();
        let chunks = tokio::task::spawn_blocking(move || {
            chunk_document(&source, format, &bytes, &chunking)
        })
        .await
        .map_err(|e| RagError::Document(format!("chunking task failed: {}", e)))??;

        if chunks.is_empty() {
            info!("{} produced no chunks, nothing to index", name);
            return Ok(0);
        }

        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
        let embedder = Arc::clone(&self.embedder);
        let vectors = tokio::task::spawn_blocking(move || embedder.embed_documents(&texts))
            .await
            .map_err(|e| RagError::Embedding(format!("embedding task failed: {}", e)))?
            .map_err(|e| RagError::Embedding(format!("{:#}", e)))?;

        let count = chunks.len();
        let mut index = Arc::clone(&self.index).write_owned().await;
        index.add(chunks, vectors)?;
        let index = index.downgrade();
        let total = index.len();

        if let Some(dir) = self.index_dir.clone() {
            let saved = tokio::task::spawn_blocking(move || snapshot::save(&index, &dir))
                .await
                .map_err(|e| RagError::Persistence(format!("snapshot task failed: {}", e)))
                .and_then(|saved| saved);
            if let Err(e) = saved {
                warn!("Index snapshot failed, keeping in-memory index: {}", e);
            }
        }

        info!("Indexed {} chunks from {} ({} total)", count, name, total);
        Ok(count)
    }

    /// The `k` indexed chunks nearest to `query`
    #[inline]
    pub async fn retrieve(&self, query: &str, k: usize) -> Result<Retrieval> {
        if self.index.read().await.is_empty() {
            return Ok(Retrieval::NoDocuments);
        }

        let embedder = Arc::clone(&self.embedder);
        let text = query.to_string();
        let vector = tokio::task::spawn_blocking(move || embedder.embed_query(&text))
            .await
            .map_err(|e| RagError::Embedding(format!("embedding task failed: {}", e)))?
            .map_err(|e| RagError::Embedding(format!("{:#}", e)))?;

        self.index.read().await.search(&vector, k)
    }

    /// Answer from the model alone, without retrieval
    #[inline]
    pub async fn ask(&self, query: &str) -> Result<Answer> {
        let _activity = Activity::enter(&self.answering);
        self.answer_prompt(query, AnswerMode::Direct).await
    }

    /// Answer with the `top_k` most relevant chunks as context.
    ///
    /// With nothing indexed this is the same as [`Pipeline::ask`].
    #[inline]
    pub async fn rag_query(&self, query: &str) -> Result<Answer> {
        let _activity = Activity::enter(&self.answering);

        let retrieval = self.retrieve(query, self.top_k).await?;
        if retrieval.is_empty() {
            info!("No documents indexed, answering directly");
            return self.answer_prompt(query, AnswerMode::Direct).await;
        }

        let prompt = build_prompt(&retrieval.to_string(), query);
        let mode = AnswerMode::Retrieval {
            chunks_used: retrieval.hits().len(),
        };
        self.answer_prompt(&prompt, mode).await
    }

    /// Ingest `path`, then answer `query` against the updated index
    #[inline]
    pub async fn rag_query_file(&self, path: &Path, query: &str) -> Result<Answer> {
        self.ingest_file(path).await?;
        self.rag_query(query).await
    }

    #[inline]
    pub async fn switch_model(&self, name: &str) -> Result<ModelHandle> {
        self.generator.switch_model(name).await
    }

    /// Load the preferred model, or the configured default, unless a model
    /// is already active
    #[inline]
    pub async fn ensure_model_loaded(&self) -> Result<ModelHandle> {
        match self.generator.active_model().await {
            Some(handle) => Ok(handle),
            None => {
                let name = self
                    .preferred_model
                    .as_deref()
                    .unwrap_or(&self.generator.config().default_model);
                self.generator.switch_model(name).await
            }
        }
    }

    async fn answer_prompt(&self, prompt: &str, mode: AnswerMode) -> Result<Answer> {
        if let Some(text) = self.cached(prompt).await {
            return Ok(Answer {
                text,
                from_cache: true,
                mode,
            });
        }

        let max_tokens = self.generator.token_budget(prompt)?;
        self.ensure_model_loaded().await?;
        let text = self.generator.complete(prompt, max_tokens).await?;

        if let Err(e) = self.cache.put(prompt, &text).await {
            warn!("Failed to cache response: {:#}", e);
        }

        Ok(Answer {
            text,
            from_cache: false,
            mode,
        })
    }

    async fn cached(&self, prompt: &str) -> Option<String> {
        match self.cache.get(prompt).await {
            Ok(hit) => {
                if hit.is_some() {
                    debug!("Answering from cache");
                }
                hit
            }
            Err(e) => {
                warn!("Cache lookup failed, treating as miss: {:#}", e);
                None
            }
        }
    }
}
