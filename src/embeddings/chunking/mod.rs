
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

use crate::{RagError, Result};

/// A contiguous span of a source document treated as one retrieval unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentChunk {
    /// Identifier of the source document (its file name)
    pub source: String,
    /// Ordinal of this chunk within its source document
    pub position: usize,
    /// The chunk text
    pub text: String,
}

/// Configuration for content chunking
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Window length in characters
    pub chunk_size: usize,
    /// Characters shared by consecutive windows
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            chunk_size: 500,
            chunk_overlap: 100,
        }
    }
}

/// Document formats accepted for ingestion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Txt,
    Pdf,
}

impl DocumentFormat {
    #[inline]
    pub fn from_extension(extension: &str) -> Result<Self> {
        match extension.to_ascii_lowercase().as_str() {
            "txt" => Ok(Self::Txt),
            "pdf" => Ok(Self::Pdf),
            other => Err(RagError::UnsupportedFormat(format!(".{}", other))),
        }
    }

    #[inline]
    pub fn from_path(path: &Path) -> Result<Self> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .ok_or_else(|| {
                RagError::UnsupportedFormat(format!("{} has no extension", path.display()))
            })?;
        Self::from_extension(extension)
    }
}

/// Chunk raw document bytes according to their format
#[inline]
pub fn chunk_document(
    source: &str,
    format: DocumentFormat,
    bytes: &[u8],
    config: &ChunkingConfig,
) -> Result<Vec<DocumentChunk>> {
    let chunks = match format {
        DocumentFormat::Txt => {
            let text = std::str::from_utf8(bytes).map_err(|e| {
                RagError::Document(format!("{} is not valid UTF-8: {}", source, e))
            })?;
            chunk_text(source, text, config)
        }
        DocumentFormat::Pdf => chunk_pdf(source, bytes)?,
    };

    debug!(
        "Chunked '{}' ({:?}) into {} chunks",
        source,
        format,
        chunks.len()
    );
    Ok(chunks)
}

/// Split text into overlapping windows of `chunk_size` characters
#[inline]
pub fn chunk_text(source: &str, text: &str, config: &ChunkingConfig) -> Vec<DocumentChunk> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    let chars: Vec<char> = text.chars().collect();
    let step = config.chunk_size.saturating_sub(config.chunk_overlap).max(1);

    let mut chunks = Vec::new();
    let mut start = 0;
    loop {
        let end = (start + config.chunk_size).min(chars.len());
        chunks.push(DocumentChunk {
            source: source.to_string(),
            position: chunks.len(),
            text: chars[start..end].iter().collect(),
        });

        if end == chars.len() {
            break;
        }
        start += step;
    }

    chunks
}

/// One chunk per PDF page, in page order
#[inline]
pub fn chunk_pdf(source: &str, bytes: &[u8]) -> Result<Vec<DocumentChunk>> {
    let document = lopdf::Document::load_mem(bytes)
        .map_err(|e| RagError::Document(format!("Failed to parse PDF {}: {}", source, e)))?;

    document
        .get_pages()
        .keys()
        .enumerate()
        .map(|(position, page_number)| {
            let text = document.extract_text(&[*page_number]).map_err(|e| {
                RagError::Document(format!(
                    "Failed to extract page {} of {}: {}",
                    page_number, source, e
                ))
            })?;
            Ok(DocumentChunk {
                source: source.to_string(),
                position,
                text,
            })
        })
        .collect()
}

/// Token count used by the generation budget: whitespace-delimited words
#[inline]
pub fn count_tokens(text: &str) -> usize {
    text.split_whitespace().count()
}
