//! On-disk snapshots of a [`VectorIndex`].
//!
//! A snapshot is two files written together: a bincode blob with the vectors
//! and a JSON list of the chunks. Both carry the same snapshot id, and a load
//! only succeeds when the pair matches.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::VectorIndex;
use crate::embeddings::chunking::DocumentChunk;
use crate::{RagError, Result};

pub const VECTORS_FILE: &str = "vectors.bin";
pub const CHUNKS_FILE: &str = "chunks.json";

#[derive(Serialize)]
struct VectorBlobRef<'a> {
    snapshot: i64,
    dimension: Option<usize>,
    vectors: &'a [Vec<f32>],
}

#[derive(Deserialize)]
struct VectorBlob {
    snapshot: i64,
    dimension: Option<usize>,
    vectors: Vec<Vec<f32>>,
}

#[derive(Serialize)]
struct ChunkManifestRef<'a> {
    snapshot: i64,
    chunks: &'a [DocumentChunk],
}

#[derive(Deserialize)]
struct ChunkManifest {
    snapshot: i64,
    chunks: Vec<DocumentChunk>,
}

/// Write both artifacts of `index` into `dir`
#[inline]
pub fn save(index: &VectorIndex, dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).map_err(|e| {
        RagError::Persistence(format!(
            "Failed to create index directory {}: {}",
            dir.display(),
            e
        ))
    })?;

    let snapshot = Utc::now().timestamp_nanos_opt().unwrap_or_default();

    let blob = bincode::serialize(&VectorBlobRef {
        snapshot,
        dimension: index.dimension(),
        vectors: index.vectors(),
    })
    .map_err(|e| RagError::Persistence(format!("Failed to encode vectors: {}", e)))?;

    let manifest = serde_json::to_vec(&ChunkManifestRef {
        snapshot,
        chunks: index.chunks(),
    })
    .map_err(|e| RagError::Persistence(format!("Failed to encode chunks: {}", e)))?;

    let vectors_path = dir.join(VECTORS_FILE);
    let chunks_path = dir.join(CHUNKS_FILE);
    let vectors_tmp = temp_path(&vectors_path);
    let chunks_tmp = temp_path(&chunks_path);

    fs::write(&vectors_tmp, blob)?;
    fs::write(&chunks_tmp, manifest)?;
    fs::rename(&vectors_tmp, &vectors_path)?;
    fs::rename(&chunks_tmp, &chunks_path)?;

    info!(
        "Saved index snapshot with {} chunks to {}",
        index.len(),
        dir.display()
    );
    Ok(())
}

/// Load a snapshot from `dir`; `None` when either artifact is missing
#[inline]
pub fn load(dir: &Path) -> Result<Option<VectorIndex>> {
    let vectors_path = dir.join(VECTORS_FILE);
    let chunks_path = dir.join(CHUNKS_FILE);

    if !vectors_path.is_file() || !chunks_path.is_file() {
        debug!("No complete index snapshot in {}", dir.display());
        return Ok(None);
    }

    let blob: VectorBlob = bincode::deserialize(&fs::read(&vectors_path)?)
        .map_err(|e| RagError::Persistence(format!("Failed to decode vectors: {}", e)))?;
    let manifest: ChunkManifest = serde_json::from_slice(&fs::read(&chunks_path)?)
        .map_err(|e| RagError::Persistence(format!("Failed to decode chunks: {}", e)))?;

    if blob.snapshot != manifest.snapshot {
        return Err(RagError::Persistence(format!(
            "Snapshot mismatch between {} and {}",
            VECTORS_FILE, CHUNKS_FILE
        )));
    }

    let index = VectorIndex::from_parts(blob.dimension, blob.vectors, manifest.chunks)?;
    info!(
        "Loaded index snapshot with {} chunks from {}",
        index.len(),
        dir.display()
    );
    Ok(Some(index))
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".tmp");
    PathBuf::from(name)
}
