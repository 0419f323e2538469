use anyhow::{Context, Result};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::Config;
use crate::embeddings::OllamaClient;
use crate::pipeline::{Answer, AnswerMode, Pipeline};
use crate::service::serve_stdio;
use crate::store::{Cid, LocalObjectStore, ObjectStore};

/// Ingest a TXT or PDF file into the index
#[inline]
pub async fn ingest_document(path: &Path) -> Result<()> {
    let pipeline = open_pipeline().await?;

    let bar = spinner(&format!("Ingesting {}", path.display()));
    let result = pipeline.ingest_file(path).await;
    bar.finish_and_clear();

    let count = result.with_context(|| format!("Failed to ingest {}", path.display()))?;
    eprintln!(
        "{} Indexed {} chunks from {} ({} total)",
        style("✓").green(),
        count,
        path.display(),
        pipeline.index_len().await
    );
    Ok(())
}

/// Ask the model directly, without retrieval
#[inline]
pub async fn ask_question(query: &str, model: Option<&str>) -> Result<()> {
    let pipeline = open_pipeline_with(model).await?;

    let bar = spinner("Generating answer");
    let result = pipeline.ask(query).await;
    bar.finish_and_clear();

    print_answer(&result.context("Failed to answer question")?);
    Ok(())
}

/// Answer with retrieved context, optionally ingesting `file` first
#[inline]
pub async fn rag_question(query: &str, file: Option<&Path>, model: Option<&str>) -> Result<()> {
    let pipeline = open_pipeline_with(model).await?;

    let bar = spinner("Retrieving context and generating answer");
    let result = match file {
        Some(path) => pipeline.rag_query_file(path, query).await,
        None => pipeline.rag_query(query).await,
    };
    bar.finish_and_clear();

    print_answer(&result.context("Failed to answer question")?);
    Ok(())
}

/// Put a document into the object store and print its content id
#[inline]
pub async fn upload_document(path: &Path) -> Result<()> {
    let config = Config::load_default().context("Failed to load configuration")?;
    let store = LocalObjectStore::new(config.objects_dir());

    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let cid = store.store(bytes).await?;

    info!("Uploaded {} as {}", path.display(), cid);
    println!("{}", cid);
    Ok(())
}

/// Write the object stored under `cid` to `out`
#[inline]
pub async fn fetch_document(cid: &str, out: &Path) -> Result<()> {
    let config = Config::load_default().context("Failed to load configuration")?;
    let store = LocalObjectStore::new(config.objects_dir());

    let cid: Cid = cid.parse()?;
    let bytes = store.fetch(&cid).await?;
    tokio::fs::write(out, &bytes)
        .await
        .with_context(|| format!("Failed to write {}", out.display()))?;

    eprintln!(
        "{} Wrote {} bytes to {}",
        style("✓").green(),
        bytes.len(),
        out.display()
    );
    Ok(())
}

/// Fetch an uploaded document by content id and ingest it as `name`
#[inline]
pub async fn ingest_cid(cid: &str, name: &str) -> Result<()> {
    let config = Config::load_default().context("Failed to load configuration")?;
    let store = LocalObjectStore::new(config.objects_dir());

    let cid: Cid = cid.parse()?;
    let bytes = store.fetch(&cid).await?;

    let file_name = Path::new(name)
        .file_name()
        .with_context(|| format!("Invalid document name: {}", name))?;
    let uploads_dir = config.uploads_dir();
    tokio::fs::create_dir_all(&uploads_dir)
        .await
        .with_context(|| format!("Failed to create {}", uploads_dir.display()))?;
    let path = uploads_dir.join(file_name);
    tokio::fs::write(&path, &bytes)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;

    let pipeline = Pipeline::open(&config).await?;
    let bar = spinner(&format!("Ingesting {}", name));
    let result = pipeline.ingest_file(&path).await;
    bar.finish_and_clear();

    let count = result.with_context(|| format!("Failed to ingest {}", cid))?;
    eprintln!(
        "{} Indexed {} chunks from {} ({})",
        style("✓").green(),
        count,
        name,
        cid
    );
    Ok(())
}

/// Print the model catalog and which entries the runtime has available
#[inline]
pub async fn list_models() -> Result<()> {
    let config = Config::load_default().context("Failed to load configuration")?;
    let client = OllamaClient::new(&config)?;

    let available = tokio::task::spawn_blocking(move || client.list_models())
        .await
        .context("Model listing task failed")?;
    let available: Option<Vec<String>> = match available {
        Ok(models) => Some(models.into_iter().map(|m| m.name).collect()),
        Err(e) => {
            warn!("Could not reach Ollama: {:#}", e);
            None
        }
    };

    println!("Models:");
    for (name, runtime_model) in &config.generator.models {
        let marker = if *name == config.generator.default_model {
            "*"
        } else {
            " "
        };
        let availability = match &available {
            Some(names) if names.iter().any(|n| n == runtime_model) => {
                style("available").green()
            }
            Some(_) => style("not pulled").yellow(),
            None => style("unknown").dim(),
        };
        println!("{} {} → {} ({})", marker, name, runtime_model, availability);
    }
    Ok(())
}

/// Remove every cached response
#[inline]
pub async fn clear_cache() -> Result<()> {
    let config = Config::load_default().context("Failed to load configuration")?;
    let cache = crate::cache::ResponseCache::open(config.cache_path()).await?;

    let removed = cache.clear().await?;
    eprintln!("{} Removed {} cached responses", style("✓").green(), removed);
    Ok(())
}

#[inline]
pub async fn show_status() -> Result<()> {
    let config = Config::load_default().context("Failed to load configuration")?;

    println!("📊 ragchat Status Report");
    println!("{}", "=".repeat(50));
    println!();

    println!("🤖 Ollama Status:");
    let client = OllamaClient::new(&config)?;
    match tokio::task::spawn_blocking(move || client.health_check()).await? {
        Ok(()) => println!(
            "   ✅ Ollama: Connected ({}:{})",
            config.ollama.host, config.ollama.port
        ),
        Err(e) => println!("   ⚠️  Ollama: Unavailable - {:#}", e),
    }
    println!("   📋 Embedding Model: {}", config.ollama.embedding_model);
    println!("   🧠 Default Model: {}", config.generator.default_model);

    println!();
    println!("🔍 Index Status:");
    match Pipeline::open(&config).await {
        Ok(pipeline) => {
            let status = pipeline.status().await;
            println!("   State: {}", status.state);
            println!("   Chunks: {}", status.chunks);
            if let Some(dimension) = status.dimension {
                println!("   Dimension: {}", dimension);
            }
            if let Some(cached) = status.cached_responses {
                println!("   Cached responses: {}", cached);
            }
        }
        Err(e) => println!("   ❌ Failed to open pipeline - {}", e),
    }
    println!("   Location: {}", config.index_dir().display());

    Ok(())
}

/// Serve JSON-lines requests on stdio
#[inline]
pub async fn serve() -> Result<()> {
    let pipeline = Arc::new(open_pipeline().await?);

    if let Err(e) = pipeline.ensure_model_loaded().await {
        warn!("Starting without a loaded model: {}", e);
    }

    serve_stdio(pipeline).await
}

async fn open_pipeline() -> Result<Pipeline> {
    let config = Config::load_default().context("Failed to load configuration")?;
    Pipeline::open(&config)
        .await
        .context("Failed to open pipeline")
}

/// A pipeline that loads `model` instead of the default once it must generate
async fn open_pipeline_with(model: Option<&str>) -> Result<Pipeline> {
    let mut pipeline = open_pipeline().await?;
    if let Some(name) = model {
        info!("Using model {} for answers that miss the cache", name);
        pipeline.prefer_model(name);
    }
    Ok(pipeline)
}

fn print_answer(answer: &Answer) {
    println!("{}", answer.text);

    let mode = match answer.mode {
        AnswerMode::Direct => "direct".to_string(),
        AnswerMode::Retrieval { chunks_used } => format!("{} chunks of context", chunks_used),
    };
    let source = if answer.from_cache { ", cached" } else { "" };
    eprintln!("{}", style(format!("({}{})", mode, source)).dim());
}

fn spinner(message: &str) -> ProgressBar {
    if !console::user_attended_stderr() {
        return ProgressBar::hidden();
    }

    let bar = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner} {msg}") {
        bar.set_style(style);
    }
    bar.set_message(message.to_string());
    bar.enable_steady_tick(Duration::from_millis(100));
    bar
}
