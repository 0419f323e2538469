// Test doubles shared by the pipeline and service integration tests

#![allow(dead_code, reason = "each test crate uses a different subset")]

use chrono::Utc;
use ragchat::cache::ResponseCache;
use ragchat::config::GeneratorConfig;
use ragchat::embeddings::{ChunkingConfig, Embedder};
use ragchat::generator::{Generator, LanguageModel, ModelHandle, TokenStream};
use ragchat::index::VectorIndex;
use ragchat::pipeline::{Pipeline, PipelineParts};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Three 20-character windows, one per keyword
pub const THREE_CHUNKS: &str = "rust rust rust rust python python pythonsqlite sqlite sqlite";

const KEYWORDS: [&str; 3] = ["rust", "python", "sqlite"];

/// Embeds text as keyword counts
#[derive(Default)]
pub struct KeywordEmbedder {
    pub calls: AtomicUsize,
}

impl Embedder for KeywordEmbedder {
    fn embed_documents(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts.iter().map(|text| keyword_vector(text)).collect())
    }

    fn embed_query(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(keyword_vector(text))
    }
}

fn keyword_vector(text: &str) -> Vec<f32> {
    KEYWORDS
        .iter()
        .map(|keyword| text.matches(keyword).count() as f32)
        .collect()
}

/// Answers every prompt with its generation number
#[derive(Default)]
pub struct CountingModel {
    pub loads: AtomicUsize,
    pub streams: AtomicUsize,
}

impl LanguageModel for CountingModel {
    fn load(&self, name: &str, runtime_model: &str) -> anyhow::Result<ModelHandle> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(ModelHandle {
            name: name.to_string(),
            runtime_model: runtime_model.to_string(),
            loaded_at: Utc::now(),
        })
    }

    fn stream(
        &self,
        handle: &ModelHandle,
        _prompt: &str,
        _max_tokens: usize,
    ) -> anyhow::Result<TokenStream> {
        let n = self.streams.fetch_add(1, Ordering::SeqCst) + 1;
        let fragments = vec![
            Ok(format!("answer #{}", n)),
            Ok(format!(" from {}", handle.name)),
        ];
        Ok(Box::new(fragments.into_iter()))
    }
}

pub struct TestPipeline {
    pub pipeline: Pipeline,
    pub embedder: Arc<KeywordEmbedder>,
    pub model: Arc<CountingModel>,
}

/// A pipeline over test doubles storing its cache and index under `dir`
pub async fn test_pipeline(dir: &Path) -> TestPipeline {
    let embedder = Arc::new(KeywordEmbedder::default());
    let model = Arc::new(CountingModel::default());

    let index_dir = dir.join("index");
    let index = ragchat::index::snapshot::load(&index_dir)
        .expect("snapshot should be readable")
        .unwrap_or_else(VectorIndex::new);

    let pipeline = Pipeline::new(PipelineParts {
        embedder: Arc::clone(&embedder) as Arc<dyn Embedder>,
        generator: Generator::new(
            Arc::clone(&model) as Arc<dyn LanguageModel>,
            GeneratorConfig::default(),
        ),
        cache: ResponseCache::open(dir.join("responses.db"))
            .await
            .expect("cache should open"),
        index,
        index_dir: Some(index_dir),
        chunking: ChunkingConfig {
            chunk_size: 20,
            chunk_overlap: 0,
        },
        top_k: 3,
    });
    pipeline
        .ensure_model_loaded()
        .await
        .expect("default model should load");

    TestPipeline {
        pipeline,
        embedder,
        model,
    }
}
