use anyhow::Result;
use clap::{Parser, Subcommand};
use ragchat::commands::{
    ask_question, clear_cache, fetch_document, ingest_cid, ingest_document, list_models,
    rag_question, serve, show_status, upload_document,
};
use ragchat::config::{run_interactive_config, show_config};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "ragchat")]
#[command(about = "Chat with your documents using a local Ollama model")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure Ollama connection and generation settings
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Index a TXT or PDF document
    Ingest {
        /// Path of the document
        file: PathBuf,
    },
    /// Ask the model directly, without document context
    Ask {
        query: String,
        /// Catalog name of the model to answer with
        #[arg(long)]
        model: Option<String>,
    },
    /// Answer using the most relevant indexed chunks as context
    Rag {
        query: String,
        /// Ingest this document before answering
        #[arg(long)]
        file: Option<PathBuf>,
        /// Catalog name of the model to answer with
        #[arg(long)]
        model: Option<String>,
    },
    /// Store a document in the local object store and print its content id
    Upload {
        file: PathBuf,
    },
    /// Write a stored document to a file
    Fetch {
        cid: String,
        out: PathBuf,
    },
    /// Ingest a stored document by content id
    IngestCid {
        cid: String,
        /// File name to ingest it as; the extension decides the format
        #[arg(long)]
        name: String,
    },
    /// List configured models and whether Ollama has them
    Models,
    /// Remove every cached response
    CacheClear,
    /// Show Ollama, index and cache status
    Status,
    /// Serve JSON-lines requests on stdio
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config()?;
            } else {
                run_interactive_config()?;
            }
        }
        Commands::Ingest { file } => {
            ingest_document(&file).await?;
        }
        Commands::Ask { query, model } => {
            ask_question(&query, model.as_deref()).await?;
        }
        Commands::Rag { query, file, model } => {
            rag_question(&query, file.as_deref(), model.as_deref()).await?;
        }
        Commands::Upload { file } => {
            upload_document(&file).await?;
        }
        Commands::Fetch { cid, out } => {
            fetch_document(&cid, &out).await?;
        }
        Commands::IngestCid { cid, name } => {
            ingest_cid(&cid, &name).await?;
        }
        Commands::Models => {
            list_models().await?;
        }
        Commands::CacheClear => {
            clear_cache().await?;
        }
        Commands::Status => {
            show_status().await?;
        }
        Commands::Serve => {
            serve().await?;
        }
    }

    Ok(())
}
