//! Error types for index access and source search.
//!
//! Two layers:
//!
//! - [`IndexError`] is what a single index backend reports for one call.
//! - [`SearchError`] is what the orchestrator reports for a whole search.
//!   Only local-source failures become a `SearchError`; remote failures are
//!   absorbed into [`SourceWarning`]s.

use thiserror::Error;

use crate::embedding::EmbeddingMode;
use crate::models::Locality;

/// Failure of one index operation.
#[derive(Debug, Error)]
pub enum IndexError {
    /// The collection was built with a different embedding model than the
    /// one active for this session.
    #[error("source '{source_name}' was indexed with '{indexed}' but the active embedding model is '{active}'")]
    EmbeddingMismatch {
        source_name: String,
        indexed: String,
        active: String,
    },

    /// The collection does not exist in this catalog.
    #[error("source '{0}' not found")]
    NotFound(String),

    /// The backend could not be reached or answered with an error.
    #[error("source '{source_name}' unreachable: {message}")]
    Unreachable {
        source_name: String,
        message: String,
    },

    /// Any other backend failure (I/O, decoding, embedding).
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

impl IndexError {
    pub fn unreachable(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Unreachable {
            source_name: source_name.into(),
            message: message.into(),
        }
    }

    pub fn is_embedding_mismatch(&self) -> bool {
        matches!(self, IndexError::EmbeddingMismatch { .. })
    }
}

/// Failure that abandons a whole search call.
#[derive(Debug, Error)]
pub enum SearchError {
    /// A local source is incompatible with the active embedding mode.
    #[error("{}", mismatch_remedy(source_name, *mode))]
    EmbeddingMismatch {
        source_name: String,
        mode: EmbeddingMode,
        detail: String,
    },

    /// A local source failed for a reason other than a model mismatch.
    #[error("Local source '{source_name}' failed: {detail}. Re-add the source if the problem persists.")]
    LocalSource { source_name: String, detail: String },

    /// The local catalog could not be enumerated.
    #[error("Could not list {locality} sources: {detail}")]
    Catalog { locality: Locality, detail: String },
}

fn mismatch_remedy(source_name: &str, mode: EmbeddingMode) -> String {
    let (built_with, flip) = match mode {
        EmbeddingMode::Local => ("a remote embedding model", "local_mode = false"),
        EmbeddingMode::Remote => ("a local embedding model", "local_mode = true"),
    };
    format!(
        "Source: {source_name} was created with {built_with}. \
         Run with `{flip}` or delete and re-add the source `{source_name}` \
         so it is reindexed with the active embedding model."
    )
}

impl SearchError {
    /// Classify a local index failure: mismatches keep their remediation
    /// message, everything else is reported as a generic local failure.
    pub fn from_local(source_name: &str, mode: EmbeddingMode, err: IndexError) -> Self {
        if err.is_embedding_mismatch() {
            SearchError::EmbeddingMismatch {
                source_name: source_name.to_string(),
                mode,
                detail: err.to_string(),
            }
        } else {
            SearchError::LocalSource {
                source_name: source_name.to_string(),
                detail: err.to_string(),
            }
        }
    }
}

/// A soft failure recorded during a search that did not stop it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceWarning {
    /// Source label that failed (`"transient"` or the material label for
    /// transient searches).
    pub source: String,
    pub locality: Locality,
    /// Underlying error text.
    pub detail: String,
}

impl SourceWarning {
    /// The message shown to the user.
    pub fn user_message(&self) -> String {
        format!(
            "Failed to search in source: {}. Try again! You may need to re-add the source.",
            self.source
        )
    }
}
