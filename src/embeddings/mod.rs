// Embeddings module
// Chunking of source documents and the Ollama runtime client

pub mod chunking;
pub mod ollama;

pub use chunking::{
    ChunkingConfig, DocumentChunk, DocumentFormat, chunk_document, chunk_pdf, chunk_text,
    count_tokens,
};
pub use ollama::OllamaClient;

/// Maps text to fixed-length vectors.
///
/// Implementations are blocking; callers on the async runtime go through
/// `tokio::task::spawn_blocking`.
pub trait Embedder: Send + Sync {
    /// Embed a batch of document chunks, one vector per input, in input order
    fn embed_documents(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;

    /// Embed a single search query
    fn embed_query(&self, text: &str) -> anyhow::Result<Vec<f32>>;
}
