// Vector index module
// Exact L2 nearest-neighbour search over embedded chunks, append-only


pub mod snapshot;

use std::fmt;
use tracing::debug;

use crate::embeddings::chunking::DocumentChunk;
use crate::{RagError, Result};

/// Text shown in place of context when nothing is indexed
pub const NO_DOCUMENTS_SENTINEL: &str = "No documents available.";

/// In-memory index pairing every vector with the chunk it was computed from
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VectorIndex {
    dimension: Option<usize>,
    vectors: Vec<Vec<f32>>,
    chunks: Vec<DocumentChunk>,
}

/// A chunk returned by a search together with its distance to the query
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub chunk: DocumentChunk,
    pub distance: f32,
}

/// Outcome of a similarity search
#[derive(Debug, Clone, PartialEq)]
pub enum Retrieval {
    Hits(Vec<SearchHit>),
    /// The index holds no documents
    NoDocuments,
}

impl Retrieval {
    #[inline]
    pub fn hits(&self) -> &[SearchHit] {
        match self {
            Self::Hits(hits) => hits,
            Self::NoDocuments => &[],
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.hits().is_empty()
    }
}

impl fmt::Display for Retrieval {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoDocuments => f.write_str(NO_DOCUMENTS_SENTINEL),
            Self::Hits(hits) => {
                for (i, hit) in hits.iter().enumerate() {
                    if i > 0 {
                        f.write_str("\n\n")?;
                    }
                    f.write_str(&hit.chunk.text)?;
                }
                Ok(())
            }
        }
    }
}

impl VectorIndex {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild an index from persisted parts, checking the pairing invariant
    #[inline]
    pub fn from_parts(
        dimension: Option<usize>,
        vectors: Vec<Vec<f32>>,
        chunks: Vec<DocumentChunk>,
    ) -> Result<Self> {
        if vectors.len() != chunks.len() {
            return Err(RagError::Persistence(format!(
                "{} vectors but {} chunks",
                vectors.len(),
                chunks.len()
            )));
        }

        match dimension {
            Some(expected) => {
                if let Some(actual) = vectors.iter().map(Vec::len).find(|len| *len != expected) {
                    return Err(RagError::DimensionMismatch { expected, actual });
                }
            }
            None if !vectors.is_empty() => {
                return Err(RagError::Persistence(
                    "vectors present without a dimension".to_string(),
                ));
            }
            None => {}
        }

        Ok(Self {
            dimension,
            vectors,
            chunks,
        })
    }

    /// Dimension fixed by the first batch, if any
    #[inline]
    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    #[inline]
    pub fn chunks(&self) -> &[DocumentChunk] {
        &self.chunks
    }

    #[inline]
    pub fn vectors(&self) -> &[Vec<f32>] {
        &self.vectors
    }

    /// Append a batch of chunks and their vectors.
    ///
    /// The batch is validated in full before anything is stored, so a rejected
    /// batch leaves the index exactly as it was.
    #[inline]
    pub fn add(&mut self, chunks: Vec<DocumentChunk>, vectors: Vec<Vec<f32>>) -> Result<()> {
        if chunks.len() != vectors.len() {
            return Err(RagError::Embedding(format!(
                "Received {} vectors for {} chunks",
                vectors.len(),
                chunks.len()
            )));
        }

        let Some(first) = vectors.first() else {
            debug!("Ignoring empty batch");
            return Ok(());
        };

        let expected = self.dimension.unwrap_or(first.len());
        if expected == 0 {
            return Err(RagError::Embedding("Embedding vectors are empty".to_string()));
        }
        if let Some(actual) = vectors.iter().map(Vec::len).find(|len| *len != expected) {
            return Err(RagError::DimensionMismatch { expected, actual });
        }

        self.dimension = Some(expected);
        self.vectors.extend(vectors);
        self.chunks.extend(chunks);

        debug!(
            "Index now holds {} chunks of dimension {}",
            self.chunks.len(),
            expected
        );
        Ok(())
    }

    /// The `k` chunks closest to `query` by Euclidean distance, nearest first
    #[inline]
    pub fn search(&self, query: &[f32], k: usize) -> Result<Retrieval> {
        let Some(dimension) = self.dimension.filter(|_| !self.is_empty()) else {
            return Ok(Retrieval::NoDocuments);
        };

        if query.len() != dimension {
            return Err(RagError::DimensionMismatch {
                expected: dimension,
                actual: query.len(),
            });
        }

        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(position, vector)| (position, squared_l2(query, vector)))
            .collect();

        // Stable sort keeps insertion order among equal distances
        scored.sort_by(|a, b| a.1.total_cmp(&b.1));
        scored.truncate(k);

        let hits = scored
            .into_iter()
            .map(|(position, squared)| SearchHit {
                chunk: self.chunks[position].clone(),
                distance: squared.sqrt(),
            })
            .collect();

        Ok(Retrieval::Hits(hits))
    }
}

fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}
