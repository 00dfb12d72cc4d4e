//! SQLite-backed local source catalog.
//!
//! Each named source is a row in `collections` recording the embedding
//! model and dimensionality it was built with; its fragments live in
//! `points` with their vectors stored as little-endian `f32` BLOBs.
//! Search is brute-force cosine similarity over one collection.
//!
//! A collection built with a different model than the active provider is
//! rejected with [`IndexError::EmbeddingMismatch`] before any vector math.

use anyhow::Context;
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use ragchat_core::embedding::{blob_to_vec, embed_query, vec_to_blob, EmbeddingProvider};
use ragchat_core::error::IndexError;
use ragchat_core::index::memory::MemoryIndex;
use ragchat_core::index::SourceCatalog;
use ragchat_core::models::{Hit, HitPayload};

use crate::{db, migrate};

/// Recorded embedding settings of one collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionInfo {
    pub name: String,
    pub model: String,
    pub dims: usize,
}

/// Local catalog over a SQLite database.
pub struct SqliteCatalog {
    pool: SqlitePool,
    provider: Arc<dyn EmbeddingProvider>,
    limit: usize,
}

impl SqliteCatalog {
    pub fn new(pool: SqlitePool, provider: Arc<dyn EmbeddingProvider>, limit: usize) -> Self {
        Self {
            pool,
            provider,
            limit,
        }
    }

    /// Open the database at `path`, creating the schema if needed.
    pub async fn open(
        path: &Path,
        provider: Arc<dyn EmbeddingProvider>,
        limit: usize,
    ) -> anyhow::Result<Self> {
        let pool = db::connect(path).await?;
        migrate::run_migrations(&pool).await?;
        Ok(Self::new(pool, provider, limit))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Register a collection built with `model` / `dims`. Re-registering an
    /// existing name updates its recorded settings.
    pub async fn create_collection(
        &self,
        name: &str,
        model: &str,
        dims: usize,
    ) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO collections (name, model, dims) VALUES (?, ?, ?)
            ON CONFLICT(name) DO UPDATE SET model = excluded.model, dims = excluded.dims
            "#,
        )
        .bind(name)
        .bind(model)
        .bind(dims as i64)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to create collection '{}'", name))?;
        Ok(())
    }

    /// Embed `(source, data)` pairs with the active provider and append them
    /// to `collection`. Returns the number of points written.
    pub async fn add_points(
        &self,
        collection: &str,
        points: &[(String, String)],
    ) -> Result<usize, IndexError> {
        self.check_compatible(collection).await?;
        if points.is_empty() {
            return Ok(0);
        }

        let texts: Vec<String> = points.iter().map(|(_, data)| data.clone()).collect();
        let vectors = self.provider.embed(&texts).await?;
        if vectors.len() != points.len() {
            return Err(IndexError::Backend(anyhow::anyhow!(
                "embedding provider returned {} vectors for {} texts",
                vectors.len(),
                points.len()
            )));
        }

        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;
        for ((source, data), vector) in points.iter().zip(vectors.iter()) {
            sqlx::query(
                "INSERT INTO points (collection, source, data, embedding) VALUES (?, ?, ?, ?)",
            )
            .bind(collection)
            .bind(source)
            .bind(data)
            .bind(vec_to_blob(vector))
            .execute(&mut *tx)
            .await
            .context("Failed to insert point")?;
        }
        tx.commit().await.context("Failed to commit points")?;

        tracing::debug!(collection, points = points.len(), "added points");
        Ok(points.len())
    }

    pub async fn collection(&self, name: &str) -> Result<CollectionInfo, IndexError> {
        let row = sqlx::query("SELECT name, model, dims FROM collections WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to read collection")?
            .ok_or_else(|| IndexError::NotFound(name.to_string()))?;

        let dims: i64 = row.get("dims");
        Ok(CollectionInfo {
            name: row.get("name"),
            model: row.get("model"),
            dims: dims.max(0) as usize,
        })
    }

    async fn check_compatible(&self, name: &str) -> Result<CollectionInfo, IndexError> {
        let info = self.collection(name).await?;
        if info.model != self.provider.model_name() || info.dims != self.provider.dims() {
            return Err(IndexError::EmbeddingMismatch {
                source_name: name.to_string(),
                indexed: format!("{} ({} dims)", info.model, info.dims),
                active: format!(
                    "{} ({} dims)",
                    self.provider.model_name(),
                    self.provider.dims()
                ),
            });
        }
        Ok(info)
    }
}

#[async_trait]
impl SourceCatalog for SqliteCatalog {
    async fn list_sources(&self) -> Result<BTreeSet<String>, IndexError> {
        let rows = sqlx::query("SELECT name FROM collections")
            .fetch_all(&self.pool)
            .await
            .context("Failed to list local sources")?;
        Ok(rows.iter().map(|row| row.get::<String, _>("name")).collect())
    }

    async fn search(&self, source: &str, query: &str) -> Result<Vec<Hit>, IndexError> {
        let info = self.check_compatible(source).await?;
        let query_vec = embed_query(self.provider.as_ref(), query).await?;

        let rows = sqlx::query("SELECT source, data, embedding FROM points WHERE collection = ? ORDER BY id")
            .bind(source)
            .fetch_all(&self.pool)
            .await
            .context("Failed to read points")?;

        let mut index = MemoryIndex::new();
        for row in &rows {
            let blob: Vec<u8> = row.get("embedding");
            let vector = blob_to_vec(&blob);
            if vector.len() != info.dims {
                tracing::warn!(source, "skipping point with {} dims, expected {}", vector.len(), info.dims);
                continue;
            }
            index.insert(
                vector,
                HitPayload {
                    source: row.get("source"),
                    data: row.get("data"),
                },
            );
        }

        Ok(index.search(&query_vec, self.limit))
    }
}
