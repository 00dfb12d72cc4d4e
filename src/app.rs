//! Wiring from configuration to a running chat session.
//!
//! [`build_search`] assembles the local catalog, the remote index, and the
//! transient backend for the configured embedding mode. [`run_chat`] puts a
//! terminal front end and a Ctrl-C listener around them.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;

use ragchat_core::embedding::EmbeddingMode;
use ragchat_core::index::memory::InMemoryTransientIndex;
use ragchat_core::llm::LanguageModel;
use ragchat_core::search::{SourceSearch, TransientBackend};

use crate::chat::{ChatSession, StdinInput};
use crate::config::Config;
use crate::embedding;
use crate::interrupt::Interrupt;
use crate::llm::create_gateway;
use crate::local_index::SqliteCatalog;
use crate::remote_index::RemoteIndex;
use crate::terminal::TerminalView;
use crate::transient;

/// Everything a session needs to answer questions.
pub struct Backends {
    pub search: SourceSearch,
    pub gateway: Arc<dyn LanguageModel>,
}

/// Build the source search for `config`.
///
/// A provider that cannot be constructed does not fail startup; it only
/// fails the searches that need embeddings.
pub async fn build_search(config: &Config) -> Result<(SourceSearch, Arc<RemoteIndex>)> {
    let provider = embedding::create_provider_or_disabled(config);

    let local = SqliteCatalog::open(&config.local_index.path, provider.clone(), config.search.top_k)
        .await
        .with_context(|| {
            format!(
                "Failed to open local index at {}",
                config.local_index.path.display()
            )
        })?;
    let remote = Arc::new(RemoteIndex::new(&config.remote)?);

    let transient = match config.mode() {
        EmbeddingMode::Local => TransientBackend::Local(Arc::new(InMemoryTransientIndex::new(
            provider,
            config.chunking.chunk_chars,
            config.chunking.overlap_chars,
            config.search.top_k,
        ))),
        EmbeddingMode::Remote => TransientBackend::Remote(remote.clone()),
    };

    let search = SourceSearch::new(Arc::new(local), remote.clone(), transient)
        .with_max_concurrency(config.search.max_concurrency);
    Ok((search, remote))
}

pub async fn build_backends(config: &Config) -> Result<Backends> {
    let (search, remote) = build_search(config).await?;
    let gateway = create_gateway(config, &remote)?;
    tracing::debug!(
        mode = ?search.mode(),
        model = gateway.model_name(),
        "backends ready"
    );
    Ok(Backends { search, gateway })
}

/// Run an interactive chat over `sources` plus the given files and URLs
/// until the user exits.
pub async fn run_chat(
    config: &Config,
    sources: Vec<String>,
    files: Vec<PathBuf>,
    urls: Vec<String>,
) -> Result<()> {
    let transient = transient::load_all(&files, &urls).await?;
    let backends = build_backends(config).await?;

    let interrupt = Interrupt::new();
    interrupt.listen_for_ctrl_c();

    let view = TerminalView::new();
    view.banner(&sources, transient.len());

    let mut session = ChatSession::new(backends.search, backends.gateway, interrupt)
        .with_sources(sources)
        .with_transient(transient)
        .keep_history(config.chat.keep_history)
        .history_turns(config.chat.history_turns);

    let mut input = StdinInput::spawn();
    session.run(&mut input, &view).await
}
