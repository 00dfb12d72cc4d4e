//! Embedding modes, the provider trait, and vector helpers.
//!
//! Providers themselves (OpenAI, Ollama, fastembed) live in the app crate.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where vectors are generated. A source must be searched in the same mode
/// it was indexed with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingMode {
    /// On-device model.
    Local,
    /// Remote embedding API.
    Remote,
}

impl EmbeddingMode {
    pub fn from_local_flag(local_mode: bool) -> Self {
        if local_mode {
            EmbeddingMode::Local
        } else {
            EmbeddingMode::Remote
        }
    }
}

impl fmt::Display for EmbeddingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmbeddingMode::Local => f.write_str("local"),
            EmbeddingMode::Remote => f.write_str("remote"),
        }
    }
}

/// Turns text into vectors. Built by the application from configuration.
///
/// `model_name` and `dims` identify the vector space; a stored collection
/// is only searchable with a provider reporting the same pair.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    fn model_name(&self) -> &str;
    fn dims(&self) -> usize;
    /// One vector per input text, in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Embed one query string.
pub async fn embed_query(provider: &dyn EmbeddingProvider, text: &str) -> Result<Vec<f32>> {
    match provider.embed(&[text.to_owned()]).await?.pop() {
        Some(vector) => Ok(vector),
        None => anyhow::bail!("{} returned no vector for the query", provider.model_name()),
    }
}

/// Pack a vector for a SQLite BLOB column, 4 little-endian bytes per value.
///
/// ```rust
/// use ragchat_core::embedding::{blob_to_vec, vec_to_blob};
///
/// let packed = vec_to_blob(&[0.5, -1.0]);
/// assert_eq!(packed.len(), 8);
/// assert_eq!(blob_to_vec(&packed), vec![0.5, -1.0]);
/// ```
pub fn vec_to_blob(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Inverse of [`vec_to_blob`]. A trailing partial value is ignored.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .filter_map(|bytes| bytes.try_into().ok().map(f32::from_le_bytes))
        .collect()
}

/// Cosine of the angle between `a` and `b`, in `[-1, 1]`.
///
/// Mismatched lengths, empty input, and zero vectors all score `0.0`.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let (dot, sq_a, sq_b) = a
        .iter()
        .zip(b)
        .fold((0.0f32, 0.0f32, 0.0f32), |(dot, sq_a, sq_b), (x, y)| {
            (dot + x * y, sq_a + x * x, sq_b + y * y)
        });
    let norm = (sq_a * sq_b).sqrt();
    if norm <= f32::EPSILON {
        0.0
    } else {
        dot / norm
    }
}
