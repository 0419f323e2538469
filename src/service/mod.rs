//! JSON-lines request serving over stdio.
//!
//! Each input line is one request object tagged by `op`. Requests run as
//! independent tasks and their responses are written by a single writer task,
//! one JSON object per line, in completion order. Failures are reported as
//! `{"kind", "message"}` payloads and never stop the server.

#[cfg(test)]
mod tests;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::pipeline::Pipeline;

/// Error kind reported for lines that are not valid requests
pub const BAD_REQUEST: &str = "BadRequest";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    /// Index a TXT or PDF file
    Ingest { path: PathBuf },
    /// Answer from the model alone, without retrieval
    Query { text: String },
    /// Same as `query`
    Ask { text: String },
    /// Optionally ingest `path` first, then answer with retrieved context
    RagQuery {
        text: String,
        #[serde(default)]
        path: Option<PathBuf>,
    },
    SwitchModel { name: String },
    Status,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    /// Echoed back unchanged in the response
    pub id: Value,
    pub operation: Operation,
}

impl Request {
    /// Parse one input line, or produce the `BadRequest` response for it
    #[inline]
    pub fn parse(line: &str) -> std::result::Result<Self, Response> {
        let value: Value = serde_json::from_str(line).map_err(|e| {
            Response::failure(Value::Null, BAD_REQUEST, format!("Invalid JSON: {}", e))
        })?;

        let id = value.get("id").cloned().unwrap_or(Value::Null);

        let operation = serde_json::from_value(value).map_err(|e| {
            Response::failure(id.clone(), BAD_REQUEST, format!("Invalid request: {}", e))
        })?;

        Ok(Self { id, operation })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub kind: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub id: Value,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorPayload>,
}

impl Response {
    #[inline]
    pub fn success(id: Value, data: Value) -> Self {
        Self {
            id,
            success: true,
            data: Some(data),
            error: None,
        }
    }

    #[inline]
    pub fn failure(id: Value, kind: &str, message: impl Into<String>) -> Self {
        Self {
            id,
            success: false,
            data: None,
            error: Some(ErrorPayload {
                kind: kind.to_string(),
                message: message.into(),
            }),
        }
    }
}

/// Run one request against the pipeline
#[inline]
pub async fn handle_request(pipeline: &Pipeline, request: Request) -> Response {
    let Request { id, operation } = request;
    debug!("Handling request {} ({:?})", id, operation);

    match execute(pipeline, operation).await {
        Ok(data) => Response::success(id, data),
        Err(e) => {
            warn!("Request {} failed: {}", id, e);
            Response::failure(id, e.kind(), e.to_string())
        }
    }
}

async fn execute(pipeline: &Pipeline, operation: Operation) -> crate::Result<Value> {
    let data = match operation {
        Operation::Ingest { path } => {
            let chunks = pipeline.ingest_file(&path).await?;
            json!({ "chunks": chunks })
        }
        Operation::Query { text } | Operation::Ask { text } => {
            to_value(&pipeline.ask(&text).await?)?
        }
        Operation::RagQuery { text, path } => {
            let answer = match path {
                Some(path) => pipeline.rag_query_file(&path, &text).await?,
                None => pipeline.rag_query(&text).await?,
            };
            to_value(&answer)?
        }
        Operation::SwitchModel { name } => {
            let handle = pipeline.switch_model(&name).await?;
            json!({
                "model": handle.name,
                "runtime_model": handle.runtime_model,
                "loaded_at": handle.loaded_at,
            })
        }
        Operation::Status => to_value(&pipeline.status().await)?,
    };
    Ok(data)
}

fn to_value<T: Serialize>(value: &T) -> crate::Result<Value> {
    serde_json::to_value(value).map_err(|e| anyhow::Error::from(e).into())
}

/// Serve requests from stdin, writing responses to stdout
#[inline]
pub async fn serve_stdio(pipeline: Arc<Pipeline>) -> Result<()> {
    info!("Starting request server on stdio");
    let reader = BufReader::new(tokio::io::stdin());
    serve(pipeline, reader, tokio::io::stdout()).await?;
    info!("Request server stopped");
    Ok(())
}

/// Serve requests from `reader` until EOF and return the writer once every
/// response has been written
#[inline]
pub async fn serve<R, W>(pipeline: Arc<Pipeline>, reader: R, writer: W) -> Result<W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, mut rx) = mpsc::unbounded_channel::<Response>();

    let writer_task = tokio::spawn(async move {
        let mut writer = writer;
        while let Some(response) = rx.recv().await {
            write_response(&mut writer, &response).await?;
        }
        Ok::<_, anyhow::Error>(writer)
    });

    let mut requests = JoinSet::new();
    let mut lines = reader.lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => {
                info!("EOF reached, waiting for {} requests", requests.len());
                break;
            }
            Err(e) => {
                error!("Error reading requests: {}", e);
                break;
            }
        };

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match Request::parse(line) {
            Ok(request) => {
                let pipeline = Arc::clone(&pipeline);
                let tx = tx.clone();
                requests.spawn(async move {
                    let response = handle_request(&pipeline, request).await;
                    if tx.send(response).is_err() {
                        warn!("Response writer closed, dropping response");
                    }
                });
            }
            Err(response) => {
                warn!("Rejected malformed request line");
                if tx.send(response).is_err() {
                    warn!("Response writer closed, dropping response");
                }
            }
        }
    }

    while let Some(joined) = requests.join_next().await {
        if let Err(e) = joined {
            error!("Request task failed: {}", e);
        }
    }
    drop(tx);

    writer_task.await.context("Response writer task failed")?
}

async fn write_response<W>(writer: &mut W, response: &Response) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let json = serde_json::to_string(response)?;
    writer.write_all(json.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}
