// Response cache
// Exact prompt string -> generated answer, persisted in SQLite


use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct ResponseCache {
    pool: Pool<Sqlite>,
}

impl ResponseCache {
    /// Open (or create) the cache database at `path`
    #[inline]
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create cache directory: {}", parent.display())
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open response cache: {}", path.display()))?;

        sqlx::migrate!("src/cache/migrations")
            .run(&pool)
            .await
            .context("Failed to run response cache migration")?;

        debug!("Response cache ready at {}", path.display());
        Ok(Self { pool })
    }

    /// Cached answer for exactly this prompt
    #[inline]
    pub async fn get(&self, prompt: &str) -> Result<Option<String>> {
        let answer = sqlx::query_scalar::<_, String>("SELECT answer FROM responses WHERE prompt = ?")
            .bind(prompt)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to read cached response")?;

        debug!(
            "Cache {} for prompt of {} bytes",
            if answer.is_some() { "hit" } else { "miss" },
            prompt.len()
        );
        Ok(answer)
    }

    /// Store `answer` under `prompt`, replacing any earlier answer
    #[inline]
    pub async fn put(&self, prompt: &str, answer: &str) -> Result<()> {
        sqlx::query("INSERT OR REPLACE INTO responses (prompt, answer, created_at) VALUES (?, ?, ?)")
            .bind(prompt)
            .bind(answer)
            .bind(Utc::now())
            .execute(&self.pool)
            .await
            .context("Failed to store response")?;
        Ok(())
    }

    #[inline]
    pub async fn len(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM responses")
            .fetch_one(&self.pool)
            .await
            .context("Failed to count cached responses")?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    #[inline]
    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    /// Drop every cached response, returning how many were removed
    #[inline]
    pub async fn clear(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM responses")
            .execute(&self.pool)
            .await
            .context("Failed to clear response cache")?;

        info!("Cleared {} cached responses", result.rows_affected());
        Ok(result.rows_affected())
    }
}
