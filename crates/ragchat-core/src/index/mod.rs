//! Index capability traits.
//!
//! The orchestrator never talks to a database or an HTTP API directly; it
//! goes through these traits, so local (SQLite), remote (HTTP), and
//! in-memory backends are interchangeable and easy to fake in tests.
//!
//! | Trait | Used for |
//! |-------|----------|
//! | [`SourceCatalog`] | Enumerating and searching named collections |
//! | [`TransientIndex`] | Searching one ad-hoc material for one query |

pub mod memory;

use async_trait::async_trait;
use std::collections::BTreeSet;

use crate::error::IndexError;
use crate::models::{Hit, TransientMaterial};

/// A catalog of named, pre-indexed collections.
///
/// Implementations must be `Send + Sync`; remote catalogs are searched from
/// several concurrent tasks at once.
#[async_trait]
pub trait SourceCatalog: Send + Sync {
    /// Names of all collections in this catalog.
    async fn list_sources(&self) -> Result<BTreeSet<String>, IndexError>;

    /// Nearest-neighbour search of `query` against the collection `source`.
    ///
    /// An empty vector means "no hits"; failures are always `Err`.
    async fn search(&self, source: &str, query: &str) -> Result<Vec<Hit>, IndexError>;
}

/// Search over material that is never persisted.
#[async_trait]
pub trait TransientIndex: Send + Sync {
    async fn search_material(
        &self,
        query: &str,
        material: &TransientMaterial,
    ) -> Result<Vec<Hit>, IndexError>;
}
