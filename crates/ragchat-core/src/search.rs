//! Source search orchestration.
//!
//! [`SourceSearch::search`] fans one query out over the named sources the
//! user selected plus any transient materials, and returns every hit it
//! collected. It operates entirely through the [`SourceCatalog`] and
//! [`TransientIndex`] traits and runs under any async executor.
//!
//! # Algorithm
//!
//! 1. Partition the requested names by membership in the local and remote
//!    catalogs. A name present in both is searched in both.
//! 2. Search local sources one after another, in request order. Any local
//!    failure abandons the whole call (see [`SearchError`]).
//! 3. Search remote sources concurrently, at most `max_concurrency` at a
//!    time. A failing source is skipped and reported as a
//!    [`SourceWarning`]; results arrive in completion order.
//! 4. Search transient materials: sequentially in local embedding mode,
//!    concurrently under the reserved `"transient"` label in remote mode.
//!    Failures are skipped and reported, like remote sources.
//! 5. Concatenate local, remote, and transient hits.
//!
//! No deduplication or ranking happens here; see [`crate::rank`].

use futures::stream::{self, StreamExt};
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::embedding::EmbeddingMode;
use crate::error::{IndexError, SearchError, SourceWarning};
use crate::index::{SourceCatalog, TransientIndex};
use crate::models::{Hit, Locality, SourceRef, TransientMaterial, TRANSIENT_SOURCE};
use crate::progress::{SearchPhase, SearchProgress};

/// Default upper bound on concurrent remote searches.
pub const DEFAULT_MAX_CONCURRENCY: usize = 8;

/// Transient search backend, selected once per session from the embedding
/// mode.
#[derive(Clone)]
pub enum TransientBackend {
    /// Embed and search each material on-device, one at a time.
    Local(Arc<dyn TransientIndex>),
    /// Send each material to the remote index, concurrently.
    Remote(Arc<dyn TransientIndex>),
}

impl TransientBackend {
    pub fn mode(&self) -> EmbeddingMode {
        match self {
            TransientBackend::Local(_) => EmbeddingMode::Local,
            TransientBackend::Remote(_) => EmbeddingMode::Remote,
        }
    }
}

/// Requested source names split by catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Partition {
    pub local: Vec<SourceRef>,
    pub remote: Vec<SourceRef>,
    /// Names found in neither catalog.
    pub unknown: Vec<String>,
}

/// Split `names` by catalog membership, keeping request order and dropping
/// repeated names.
pub fn partition_sources(
    names: &[String],
    local: &BTreeSet<String>,
    remote: &BTreeSet<String>,
) -> Partition {
    let mut out = Partition::default();
    let mut seen = BTreeSet::new();
    for name in names {
        if !seen.insert(name.as_str()) {
            continue;
        }
        let in_local = local.contains(name);
        let in_remote = remote.contains(name);
        if in_local {
            out.local.push(SourceRef::local(name.clone()));
        }
        if in_remote {
            out.remote.push(SourceRef::remote(name.clone()));
        }
        if !in_local && !in_remote {
            out.unknown.push(name.clone());
        }
    }
    out
}

/// Everything a completed search produced.
#[derive(Debug, Clone, Default)]
pub struct SearchOutcome {
    /// Local hits (request order), then remote and transient hits
    /// (completion order).
    pub hits: Vec<Hit>,
    /// Sources that failed softly and were skipped.
    pub warnings: Vec<SourceWarning>,
    /// Requested names found in neither catalog.
    pub unknown: Vec<String>,
}

/// The source search orchestrator.
pub struct SourceSearch {
    local: Arc<dyn SourceCatalog>,
    remote: Arc<dyn SourceCatalog>,
    transient: TransientBackend,
    max_concurrency: usize,
}

impl SourceSearch {
    pub fn new(
        local: Arc<dyn SourceCatalog>,
        remote: Arc<dyn SourceCatalog>,
        transient: TransientBackend,
    ) -> Self {
        Self {
            local,
            remote,
            transient,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
        }
    }

    /// Bound the number of in-flight remote searches (minimum 1).
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    pub fn mode(&self) -> EmbeddingMode {
        self.transient.mode()
    }

    /// Enumerate both catalogs, tagged with locality.
    ///
    /// A failing local catalog is an error; a failing remote catalog is
    /// logged and treated as empty.
    pub async fn list_sources(&self) -> Result<Vec<SourceRef>, SearchError> {
        let (local, remote) = self.catalogs().await?;
        Ok(local
            .into_iter()
            .map(SourceRef::local)
            .chain(remote.into_iter().map(SourceRef::remote))
            .collect())
    }

    /// Fan `query` out over `sources` and `transient`; see the module docs.
    pub async fn search(
        &self,
        query: &str,
        sources: &[String],
        transient: &[TransientMaterial],
        progress: &dyn SearchProgress,
    ) -> Result<SearchOutcome, SearchError> {
        let mut outcome = SearchOutcome::default();

        if !sources.is_empty() {
            let (local, remote) = self.catalogs().await?;
            let partition = partition_sources(sources, &local, &remote);
            for name in &partition.unknown {
                tracing::warn!(source = %name, "source not found in local or remote catalog");
            }
            outcome.unknown = partition.unknown;

            if !partition.local.is_empty() {
                progress.phase(SearchPhase::Local);
                for source in &partition.local {
                    match self.local.search(&source.name, query).await {
                        Ok(hits) => {
                            tracing::debug!(source = %source.name, hits = hits.len(), "local search done");
                            outcome.hits.extend(hits);
                        }
                        Err(err) => {
                            tracing::warn!(source = %source.name, error = %err, "local search failed, abandoning search");
                            return Err(SearchError::from_local(&source.name, self.mode(), err));
                        }
                    }
                }
            }

            if !partition.remote.is_empty() {
                progress.phase(SearchPhase::Remote);
                let remote = &self.remote;
                let mut results = stream::iter(partition.remote.iter())
                    .map(|source| async move {
                        (source, remote.search(&source.name, query).await)
                    })
                    .buffer_unordered(self.max_concurrency);

                while let Some((source, result)) = results.next().await {
                    self.settle(
                        &source.name,
                        Locality::Remote,
                        result,
                        &mut outcome,
                        progress,
                    );
                }
            }
        }

        if !transient.is_empty() {
            progress.phase(SearchPhase::Transient);
            match &self.transient {
                TransientBackend::Local(index) => {
                    for material in transient {
                        let result = index.search_material(query, material).await;
                        self.settle(
                            material.source(),
                            Locality::Local,
                            result,
                            &mut outcome,
                            progress,
                        );
                    }
                }
                TransientBackend::Remote(index) => {
                    let mut results = stream::iter(transient.iter())
                        .map(|material| async move { index.search_material(query, material).await })
                        .buffer_unordered(self.max_concurrency);

                    while let Some(result) = results.next().await {
                        self.settle(
                            TRANSIENT_SOURCE,
                            Locality::Remote,
                            result,
                            &mut outcome,
                            progress,
                        );
                    }
                }
            }
        }

        Ok(outcome)
    }

    async fn catalogs(&self) -> Result<(BTreeSet<String>, BTreeSet<String>), SearchError> {
        let local = self
            .local
            .list_sources()
            .await
            .map_err(|err| SearchError::Catalog {
                locality: Locality::Local,
                detail: err.to_string(),
            })?;
        let remote = match self.remote.list_sources().await {
            Ok(names) => names,
            Err(err) => {
                tracing::warn!(error = %err, "could not list remote sources");
                BTreeSet::new()
            }
        };
        Ok((local, remote))
    }

    /// Absorb one soft-failing search result into `outcome`.
    fn settle(
        &self,
        source: &str,
        locality: Locality,
        result: Result<Vec<Hit>, IndexError>,
        outcome: &mut SearchOutcome,
        progress: &dyn SearchProgress,
    ) {
        match result {
            Ok(hits) => {
                tracing::debug!(source, %locality, hits = hits.len(), "search done");
                outcome.hits.extend(hits);
            }
            Err(err) => {
                tracing::warn!(source, %locality, error = %err, "source unreachable, consider re-adding it");
                let warning = SourceWarning {
                    source: source.to_string(),
                    locality,
                    detail: err.to_string(),
                };
                progress.warning(&warning);
                outcome.warnings.push(warning);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use futures::executor::block_on;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Catalog with canned per-source results and a call log.
    #[derive(Default)]
    struct FakeCatalog {
        results: HashMap<String, Result<Vec<Hit>, String>>,
        mismatched: Vec<String>,
        calls: Mutex<Vec<String>>,
        list_fails: bool,
    }

    impl FakeCatalog {
        fn with(mut self, name: &str, hits: Vec<Hit>) -> Self {
            self.results.insert(name.to_string(), Ok(hits));
            self
        }

        fn failing(mut self, name: &str) -> Self {
            self.results
                .insert(name.to_string(), Err("connection refused".to_string()));
            self
        }

        fn mismatched(mut self, name: &str) -> Self {
            self.results.insert(name.to_string(), Ok(Vec::new()));
            self.mismatched.push(name.to_string());
            self
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SourceCatalog for FakeCatalog {
        async fn list_sources(&self) -> Result<BTreeSet<String>, IndexError> {
            if self.list_fails {
                return Err(IndexError::unreachable("catalog", "down"));
            }
            Ok(self.results.keys().cloned().collect())
        }

        async fn search(&self, source: &str, _query: &str) -> Result<Vec<Hit>, IndexError> {
            self.calls.lock().unwrap().push(source.to_string());
            if self.mismatched.iter().any(|m| m == source) {
                return Err(IndexError::EmbeddingMismatch {
                    source_name: source.to_string(),
                    indexed: "remote-model".into(),
                    active: "local-model".into(),
                });
            }
            match self.results.get(source) {
                Some(Ok(hits)) => Ok(hits.clone()),
                Some(Err(msg)) => Err(IndexError::unreachable(source, msg.clone())),
                None => Err(IndexError::NotFound(source.to_string())),
            }
        }
    }

    /// Transient index that echoes the material back as one hit.
    struct EchoTransient {
        fail_on: Option<String>,
    }

    #[async_trait]
    impl TransientIndex for EchoTransient {
        async fn search_material(
            &self,
            _query: &str,
            material: &TransientMaterial,
        ) -> Result<Vec<Hit>, IndexError> {
            if self.fail_on.as_deref() == Some(material.source()) {
                return Err(IndexError::unreachable(material.source(), "boom"));
            }
            Ok(vec![Hit::new(0.5, material.source(), material.data.clone())])
        }
    }

    #[derive(Default)]
    struct RecordingProgress {
        phases: Mutex<Vec<SearchPhase>>,
        warnings: Mutex<Vec<String>>,
    }

    impl SearchProgress for RecordingProgress {
        fn phase(&self, phase: SearchPhase) {
            self.phases.lock().unwrap().push(phase);
        }
        fn warning(&self, warning: &SourceWarning) {
            self.warnings.lock().unwrap().push(warning.source.clone());
        }
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn echo_backend(local: bool) -> TransientBackend {
        let index: Arc<dyn TransientIndex> = Arc::new(EchoTransient { fail_on: None });
        if local {
            TransientBackend::Local(index)
        } else {
            TransientBackend::Remote(index)
        }
    }

    fn orchestrator(local: FakeCatalog, remote: FakeCatalog) -> (SourceSearch, Arc<FakeCatalog>, Arc<FakeCatalog>) {
        let local = Arc::new(local);
        let remote = Arc::new(remote);
        let search = SourceSearch::new(local.clone(), remote.clone(), echo_backend(false))
            .with_max_concurrency(2);
        (search, local, remote)
    }

    #[test]
    fn test_empty_request_returns_nothing() {
        let (search, local, remote) = orchestrator(
            FakeCatalog::default().with("a", vec![Hit::new(0.1, "a", "x")]),
            FakeCatalog::default(),
        );
        let out = block_on(search.search("q", &[], &[], &crate::progress::NoProgress)).unwrap();
        assert!(out.hits.is_empty());
        assert!(out.warnings.is_empty());
        assert!(local.calls().is_empty());
        assert!(remote.calls().is_empty());
    }

    #[test]
    fn test_remote_failure_is_isolated() {
        let remote = FakeCatalog::default()
            .with("r1", vec![Hit::new(0.9, "r1", "one")])
            .failing("r2")
            .with("r3", vec![Hit::new(0.7, "r3", "three")]);
        let (search, _, _) = orchestrator(FakeCatalog::default(), remote);
        let progress = RecordingProgress::default();

        let out = block_on(search.search("q", &names(&["r1", "r2", "r3"]), &[], &progress)).unwrap();

        let mut sources: Vec<&str> = out.hits.iter().map(|h| h.source()).collect();
        sources.sort();
        assert_eq!(sources, vec!["r1", "r3"]);
        assert_eq!(out.warnings.len(), 1);
        assert_eq!(out.warnings[0].source, "r2");
        assert_eq!(out.warnings[0].locality, Locality::Remote);
        assert_eq!(*progress.warnings.lock().unwrap(), vec!["r2".to_string()]);
        assert_eq!(*progress.phases.lock().unwrap(), vec![SearchPhase::Remote]);
    }

    #[test]
    fn test_local_failure_aborts_whole_call() {
        let local = FakeCatalog::default()
            .mismatched("l1")
            .with("l2", vec![Hit::new(0.9, "l2", "never returned")]);
        let remote = FakeCatalog::default().with("r1", vec![Hit::new(0.5, "r1", "x")]);
        let (search, local, remote) = orchestrator(local, remote);

        let err = block_on(search.search(
            "q",
            &names(&["l1", "l2", "r1"]),
            &[],
            &crate::progress::NoProgress,
        ))
        .unwrap_err();

        assert!(matches!(err, SearchError::EmbeddingMismatch { ref source_name, .. } if source_name == "l1"));
        assert_eq!(local.calls(), vec!["l1".to_string()]);
        assert!(remote.calls().is_empty());
    }

    #[test]
    fn test_local_sources_in_request_order_before_remote() {
        let local = FakeCatalog::default()
            .with("b", vec![Hit::new(0.1, "b", "b1")])
            .with("a", vec![Hit::new(0.2, "a", "a1")]);
        let remote = FakeCatalog::default().with("r", vec![Hit::new(0.3, "r", "r1")]);
        let (search, local, _) = orchestrator(local, remote);

        let out = block_on(search.search(
            "q",
            &names(&["b", "r", "a"]),
            &[],
            &crate::progress::NoProgress,
        ))
        .unwrap();
        let data: Vec<&str> = out.hits.iter().map(|h| h.payload.data.as_str()).collect();
        assert_eq!(data, vec!["b1", "a1", "r1"]);
        assert_eq!(local.calls(), vec!["b".to_string(), "a".to_string()]);
    }

    #[test]
    fn test_source_in_both_catalogs_is_searched_twice() {
        let local = FakeCatalog::default().with("docs", vec![Hit::new(0.4, "docs", "same")]);
        let remote = FakeCatalog::default().with("docs", vec![Hit::new(0.4, "docs", "same")]);
        let (search, local, remote) = orchestrator(local, remote);

        let out = block_on(search.search("q", &names(&["docs"]), &[], &crate::progress::NoProgress))
            .unwrap();
        assert_eq!(out.hits.len(), 2);
        assert_eq!(local.calls(), vec!["docs".to_string()]);
        assert_eq!(remote.calls(), vec!["docs".to_string()]);
    }

    #[test]
    fn test_unknown_sources_are_reported() {
        let (search, _, _) = orchestrator(FakeCatalog::default(), FakeCatalog::default());
        let out = block_on(search.search("q", &names(&["ghost"]), &[], &crate::progress::NoProgress))
            .unwrap();
        assert!(out.hits.is_empty());
        assert_eq!(out.unknown, vec!["ghost".to_string()]);
    }

    #[test]
    fn test_remote_catalog_listing_failure_is_soft() {
        let local = FakeCatalog::default().with("l", vec![Hit::new(0.4, "l", "x")]);
        let remote = FakeCatalog {
            list_fails: true,
            ..FakeCatalog::default()
        };
        let (search, _, _) = orchestrator(local, remote);
        let out = block_on(search.search("q", &names(&["l"]), &[], &crate::progress::NoProgress))
            .unwrap();
        assert_eq!(out.hits.len(), 1);
    }

    #[test]
    fn test_local_catalog_listing_failure_is_fatal() {
        let local = FakeCatalog {
            list_fails: true,
            ..FakeCatalog::default()
        };
        let (search, _, _) = orchestrator(local, FakeCatalog::default());
        let err = block_on(search.search("q", &names(&["x"]), &[], &crate::progress::NoProgress))
            .unwrap_err();
        assert!(matches!(err, SearchError::Catalog { locality: Locality::Local, .. }));
    }

    #[test]
    fn test_transient_local_mode_sequential() {
        let search = SourceSearch::new(
            Arc::new(FakeCatalog::default()),
            Arc::new(FakeCatalog::default()),
            echo_backend(true),
        );
        let progress = RecordingProgress::default();
        let materials = vec![
            TransientMaterial::new("a.md", "alpha"),
            TransientMaterial::new("b.md", "beta"),
        ];
        let out = block_on(search.search("q", &[], &materials, &progress)).unwrap();
        let data: Vec<&str> = out.hits.iter().map(|h| h.payload.data.as_str()).collect();
        assert_eq!(data, vec!["alpha", "beta"]);
        assert_eq!(*progress.phases.lock().unwrap(), vec![SearchPhase::Transient]);
        assert_eq!(search.mode(), EmbeddingMode::Local);
    }

    #[test]
    fn test_transient_remote_failure_is_isolated() {
        let search = SourceSearch::new(
            Arc::new(FakeCatalog::default()),
            Arc::new(FakeCatalog::default()),
            TransientBackend::Remote(Arc::new(EchoTransient {
                fail_on: Some("bad.md".into()),
            })),
        );
        let materials = vec![
            TransientMaterial::new("good.md", "fine"),
            TransientMaterial::new("bad.md", "broken"),
        ];
        let out = block_on(search.search("q", &[], &materials, &crate::progress::NoProgress)).unwrap();
        assert_eq!(out.hits.len(), 1);
        assert_eq!(out.hits[0].payload.data, "fine");
        assert_eq!(out.warnings.len(), 1);
        assert_eq!(out.warnings[0].source, TRANSIENT_SOURCE);
    }

    #[test]
    fn test_partition_dedupes_and_keeps_order() {
        let local: BTreeSet<String> = ["a", "b"].iter().map(|s| s.to_string()).collect();
        let remote: BTreeSet<String> = ["b", "c"].iter().map(|s| s.to_string()).collect();
        let p = partition_sources(&names(&["c", "b", "a", "b", "z"]), &local, &remote);
        assert_eq!(p.local, vec![SourceRef::local("b"), SourceRef::local("a")]);
        assert_eq!(p.remote, vec![SourceRef::remote("c"), SourceRef::remote("b")]);
        assert_eq!(p.unknown, vec!["z".to_string()]);
    }

    #[test]
    fn test_list_sources_tags_locality() {
        let (search, _, _) = orchestrator(
            FakeCatalog::default().with("l", Vec::new()),
            FakeCatalog::default().with("r", Vec::new()),
        );
        let refs = block_on(search.list_sources()).unwrap();
        assert_eq!(refs, vec![SourceRef::local("l"), SourceRef::remote("r")]);
    }

    /// Yields to the executor a few times so sibling searches get polled.
    struct Yield(u8);

    impl std::future::Future for Yield {
        type Output = ();

        fn poll(
            mut self: std::pin::Pin<&mut Self>,
            cx: &mut std::task::Context<'_>,
        ) -> std::task::Poll<()> {
            if self.0 == 0 {
                return std::task::Poll::Ready(());
            }
            self.0 -= 1;
            cx.waker().wake_by_ref();
            std::task::Poll::Pending
        }
    }

    /// Counts searches in flight and remembers the highest count seen.
    #[derive(Default)]
    struct InFlight {
        current: AtomicUsize,
        peak: AtomicUsize,
    }

    impl InFlight {
        async fn track<T>(&self, value: T) -> T {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            Yield(3).await;
            self.current.fetch_sub(1, Ordering::SeqCst);
            value
        }

        fn peak(&self) -> usize {
            self.peak.load(Ordering::SeqCst)
        }
    }

    struct SlowCatalog {
        names: BTreeSet<String>,
        in_flight: InFlight,
    }

    #[async_trait]
    impl SourceCatalog for SlowCatalog {
        async fn list_sources(&self) -> Result<BTreeSet<String>, IndexError> {
            Ok(self.names.clone())
        }

        async fn search(&self, source: &str, _query: &str) -> Result<Vec<Hit>, IndexError> {
            Ok(self.in_flight.track(vec![Hit::new(0.5, source, "x")]).await)
        }
    }

    #[derive(Default)]
    struct SlowTransient {
        in_flight: InFlight,
    }

    #[async_trait]
    impl TransientIndex for SlowTransient {
        async fn search_material(
            &self,
            _query: &str,
            material: &TransientMaterial,
        ) -> Result<Vec<Hit>, IndexError> {
            Ok(self
                .in_flight
                .track(vec![Hit::new(0.5, material.source(), material.data.clone())])
                .await)
        }
    }

    #[test]
    fn test_remote_searches_overlap_up_to_max_concurrency() {
        let requested = names(&["r1", "r2", "r3", "r4", "r5"]);
        let remote = Arc::new(SlowCatalog {
            names: requested.iter().cloned().collect(),
            in_flight: InFlight::default(),
        });
        let search = SourceSearch::new(
            Arc::new(FakeCatalog::default()),
            remote.clone(),
            echo_backend(false),
        )
        .with_max_concurrency(2);

        let out = block_on(search.search("q", &requested, &[], &crate::progress::NoProgress)).unwrap();

        assert_eq!(out.hits.len(), 5);
        assert_eq!(remote.in_flight.peak(), 2);
    }

    #[test]
    fn test_remote_transient_searches_overlap_up_to_max_concurrency() {
        let index = Arc::new(SlowTransient::default());
        let search = SourceSearch::new(
            Arc::new(FakeCatalog::default()),
            Arc::new(FakeCatalog::default()),
            TransientBackend::Remote(index.clone()),
        )
        .with_max_concurrency(2);
        let materials: Vec<TransientMaterial> = (0..5)
            .map(|i| TransientMaterial::new(format!("file{i}.md"), "text"))
            .collect();

        let out = block_on(search.search("q", &[], &materials, &crate::progress::NoProgress)).unwrap();

        assert_eq!(out.hits.len(), 5);
        assert_eq!(index.in_flight.peak(), 2);
    }

    #[test]
    fn test_local_transient_searches_do_not_overlap() {
        let index = Arc::new(SlowTransient::default());
        let search = SourceSearch::new(
            Arc::new(FakeCatalog::default()),
            Arc::new(FakeCatalog::default()),
            TransientBackend::Local(index.clone()),
        )
        .with_max_concurrency(4);
        let materials: Vec<TransientMaterial> = (0..3)
            .map(|i| TransientMaterial::new(format!("file{i}.md"), "text"))
            .collect();

        block_on(search.search("q", &[], &materials, &crate::progress::NoProgress)).unwrap();

        assert_eq!(index.in_flight.peak(), 1);
    }
}
