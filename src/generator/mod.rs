//! Text generation against the single active language model.
//!
//! The active [`ModelHandle`] sits behind an async `RwLock`. Generations hold
//! the read side for their whole run, a model switch takes the write side, so
//! a switch waits for in-flight answers and no answer starts halfway through a
//! switch.


use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::GeneratorConfig;
use crate::embeddings::chunking::count_tokens;
use crate::{RagError, Result};

/// A model the runtime has loaded and is ready to generate with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelHandle {
    /// Catalog name, e.g. `phi-2`
    pub name: String,
    /// Model id understood by the runtime, e.g. `phi:2.7b`
    pub runtime_model: String,
    pub loaded_at: DateTime<Utc>,
}

/// Completion fragments in generation order
pub type TokenStream = Box<dyn Iterator<Item = anyhow::Result<String>> + Send>;

/// Blocking access to a local model runtime.
pub trait LanguageModel: Send + Sync {
    /// Make `runtime_model` resident and return a handle to it
    fn load(&self, name: &str, runtime_model: &str) -> anyhow::Result<ModelHandle>;

    /// Start a completion of at most `max_tokens` tokens
    fn stream(
        &self,
        handle: &ModelHandle,
        prompt: &str,
        max_tokens: usize,
    ) -> anyhow::Result<TokenStream>;
}

pub struct Generator {
    backend: Arc<dyn LanguageModel>,
    active: Arc<RwLock<Option<ModelHandle>>>,
    config: GeneratorConfig,
}

impl Generator {
    /// A generator with no model loaded yet
    #[inline]
    pub fn new(backend: Arc<dyn LanguageModel>, config: GeneratorConfig) -> Self {
        Self {
            backend,
            active: Arc::new(RwLock::new(None)),
            config,
        }
    }

    #[inline]
    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    #[inline]
    pub async fn active_model(&self) -> Option<ModelHandle> {
        self.active.read().await.clone()
    }

    /// Replace the active model with the catalog entry `name`.
    ///
    /// On failure the previous handle stays active.
    #[inline]
    pub async fn switch_model(&self, name: &str) -> Result<ModelHandle> {
        let mut active = self.active.write().await;

        if let Some(handle) = active.as_ref().filter(|handle| handle.name == name) {
            debug!("Model {} is already active", name);
            return Ok(handle.clone());
        }

        let runtime_model = self
            .config
            .runtime_model(name)
            .ok_or_else(|| RagError::ModelLoadFailure {
                model: name.to_string(),
                reason: "not in the model catalog".to_string(),
            })?
            .to_string();

        info!("Switching model to {} ({})", name, runtime_model);

        let backend = Arc::clone(&self.backend);
        let model = name.to_string();
        let loaded = tokio::task::spawn_blocking(move || backend.load(&model, &runtime_model))
            .await
            .map_err(|e| RagError::ModelLoadFailure {
                model: name.to_string(),
                reason: format!("load task failed: {}", e),
            })?
            .map_err(|e| RagError::ModelLoadFailure {
                model: name.to_string(),
                reason: format!("{:#}", e),
            })?;

        *active = Some(loaded.clone());
        info!("Model {} is now active", name);
        Ok(loaded)
    }

    /// Number of new tokens a prompt may request, or `PromptTooLong`
    #[inline]
    pub fn token_budget(&self, prompt: &str) -> Result<usize> {
        let tokens = count_tokens(prompt);
        let limit = self.config.context_window;

        if tokens >= limit {
            return Err(RagError::PromptTooLong { tokens, limit });
        }

        Ok(self.config.max_new_tokens.min(limit - tokens))
    }

    /// Generate with as many new tokens as the context window leaves room for
    #[inline]
    pub async fn complete_within_budget(&self, prompt: &str) -> Result<String> {
        let max_tokens = self.token_budget(prompt)?;
        self.complete(prompt, max_tokens).await
    }

    /// Generate a full answer for `prompt`.
    ///
    /// Dropping the returned future, or running past the configured timeout,
    /// cancels the generation at its next fragment.
    #[inline]
    pub async fn complete(&self, prompt: &str, max_tokens: usize) -> Result<String> {
        let guard = Arc::clone(&self.active).read_owned().await;
        if guard.is_none() {
            return Err(RagError::NoModelLoaded);
        }

        let cancel = CancellationToken::new();
        let _cancel_on_drop = cancel.clone().drop_guard();

        let backend = Arc::clone(&self.backend);
        let prompt = prompt.to_string();
        let task = tokio::task::spawn_blocking(move || {
            let handle = guard.as_ref().ok_or(RagError::NoModelLoaded)?;
            let stream = backend
                .stream(handle, &prompt, max_tokens)
                .map_err(|e| RagError::Generation(format!("{:#}", e)))?;

            let mut answer = String::new();
            for fragment in stream {
                if cancel.is_cancelled() {
                    debug!("Generation cancelled after {} bytes", answer.len());
                    return Err(RagError::Cancelled);
                }
                let fragment = fragment.map_err(|e| RagError::Generation(format!("{:#}", e)))?;
                answer.push_str(&fragment);
            }
            Ok(answer)
        });

        let timeout = Duration::from_secs(self.config.timeout_secs);
        match tokio::time::timeout(timeout, task).await {
            Ok(joined) => joined
                .map_err(|e| RagError::Generation(format!("generation task failed: {}", e)))?,
            Err(_) => {
                warn!("Generation exceeded {:?}, cancelling", timeout);
                Err(RagError::Cancelled)
            }
        }
    }
}
