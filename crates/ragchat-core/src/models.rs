//! Core data types shared by the search, ranking, and chat layers.
//!
//! | Type | Role |
//! |------|------|
//! | [`SourceRef`] | A named collection plus the catalog it lives in |
//! | [`TransientMaterial`] | Ad-hoc text supplied for one chat invocation |
//! | [`Hit`] | One retrieved fragment with score and attribution |
//! | [`ChatMessage`] | One entry of the prompt sent to the language model |

use serde::{Deserialize, Serialize};
use std::fmt;

/// Reserved label under which transient materials are searched remotely.
pub const TRANSIENT_SOURCE: &str = "transient";

/// Which catalog a named source belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locality {
    Local,
    Remote,
}

impl fmt::Display for Locality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locality::Local => f.write_str("local"),
            Locality::Remote => f.write_str("remote"),
        }
    }
}

/// A named knowledge collection and its locality.
///
/// Names are unique within one locality; the same name may exist in both
/// the local and the remote catalog, in which case it is two distinct refs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SourceRef {
    pub name: String,
    pub locality: Locality,
}

impl SourceRef {
    pub fn local(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            locality: Locality::Local,
        }
    }

    pub fn remote(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            locality: Locality::Remote,
        }
    }
}

/// In-memory text supplied for the current session only. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransientMaterial {
    /// Raw text content.
    pub data: String,
    /// Free-form metadata; always carries a string `source` label.
    pub metadata: serde_json::Value,
}

impl TransientMaterial {
    /// Build a material whose metadata is just `{"source": <label>}`.
    pub fn new(source: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            metadata: serde_json::json!({ "source": source.into() }),
        }
    }

    /// The `source` label from the metadata, or `""` if absent.
    pub fn source(&self) -> &str {
        self.metadata
            .get("source")
            .and_then(|s| s.as_str())
            .unwrap_or_default()
    }
}

/// Attribution and text of a retrieved fragment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HitPayload {
    pub source: String,
    pub data: String,
}

/// The result of one nearest-neighbour query against one source.
///
/// Higher `score` means more relevant. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hit {
    pub score: f32,
    pub payload: HitPayload,
}

impl Hit {
    pub fn new(score: f32, source: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            score,
            payload: HitPayload {
                source: source.into(),
                data: data.into(),
            },
        }
    }

    pub fn source(&self) -> &str {
        &self.payload.source
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One message of a model prompt. Sequence order is significant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}
