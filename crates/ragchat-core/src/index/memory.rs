//! In-memory vector index for transient materials and tests.
//!
//! Vector search is brute-force cosine similarity over all stored points.
//! Nothing here is persisted: an index lives as long as its owner.

use async_trait::async_trait;
use std::sync::Arc;

use crate::chunk::split_text;
use crate::embedding::{cosine_similarity, embed_query, EmbeddingProvider};
use crate::error::IndexError;
use crate::models::{Hit, HitPayload, TransientMaterial};
use crate::rank::by_score_desc;

use super::TransientIndex;

struct StoredPoint {
    vector: Vec<f32>,
    payload: HitPayload,
}

/// A flat list of `(vector, payload)` points.
#[derive(Default)]
pub struct MemoryIndex {
    points: Vec<StoredPoint>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn insert(&mut self, vector: Vec<f32>, payload: HitPayload) {
        self.points.push(StoredPoint { vector, payload });
    }

    /// The `limit` most similar points, best first. Equal scores keep
    /// insertion order.
    pub fn search(&self, query_vec: &[f32], limit: usize) -> Vec<Hit> {
        let mut hits: Vec<Hit> = self
            .points
            .iter()
            .map(|p| Hit {
                score: cosine_similarity(query_vec, &p.vector),
                payload: p.payload.clone(),
            })
            .collect();
        hits.sort_by(by_score_desc);
        hits.truncate(limit);
        hits
    }
}

/// Local-mode transient search: split the material, embed the pieces into a
/// fresh [`MemoryIndex`], and search it. The index is dropped afterwards.
pub struct InMemoryTransientIndex {
    provider: Arc<dyn EmbeddingProvider>,
    chunk_chars: usize,
    overlap_chars: usize,
    limit: usize,
}

impl InMemoryTransientIndex {
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        chunk_chars: usize,
        overlap_chars: usize,
        limit: usize,
    ) -> Self {
        Self {
            provider,
            chunk_chars,
            overlap_chars,
            limit,
        }
    }
}

#[async_trait]
impl TransientIndex for InMemoryTransientIndex {
    async fn search_material(
        &self,
        query: &str,
        material: &TransientMaterial,
    ) -> Result<Vec<Hit>, IndexError> {
        let chunks = split_text(&material.data, self.chunk_chars, self.overlap_chars);
        if chunks.is_empty() {
            return Ok(Vec::new());
        }

        let vectors = self.provider.embed(&chunks).await?;
        if vectors.len() != chunks.len() {
            return Err(IndexError::Backend(anyhow::anyhow!(
                "embedding provider returned {} vectors for {} chunks",
                vectors.len(),
                chunks.len()
            )));
        }

        let source = material.source().to_string();
        let mut index = MemoryIndex::new();
        for (data, vector) in chunks.into_iter().zip(vectors) {
            index.insert(
                vector,
                HitPayload {
                    source: source.clone(),
                    data,
                },
            );
        }

        let query_vec = embed_query(self.provider.as_ref(), query).await?;
        Ok(index.search(&query_vec, self.limit))
    }
}
