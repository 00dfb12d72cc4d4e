//! # ragchat
//!
//! Retrieval-augmented chat over named knowledge sources.
//!
//! A question is searched against the chosen sources (a local SQLite
//! catalog, a remote index service, and any files or URLs supplied for the
//! session), the hits are ranked and packed into a prompt, and the answer is
//! streamed back from a language model and redrawn as it arrives.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌─────────────┐   ┌───────────┐
//! │  stdin   │──▶│ ChatSession  │──▶│ SourceSearch│──▶│ local     │
//! │ (lines)  │   │  (turns)     │   │ (fan-out)   │   │ remote    │
//! └──────────┘   └──────┬───────┘   └─────────────┘   │ transient │
//!                       │                             └───────────┘
//!                       ▼
//!                ┌──────────────┐   ┌──────────────┐
//!                │ LLM gateway  │──▶│ TerminalView │
//!                │ (stream)     │   │ (markdown)   │
//!                └──────────────┘   └──────────────┘
//! ```
//!
//! The orchestration, ranking, and prompt logic live in `ragchat-core`;
//! this crate supplies the concrete backends and the terminal.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`embedding`] | Embedding providers (OpenAI, Ollama, fastembed) |
//! | [`local_index`] | SQLite-backed local source catalog |
//! | [`remote_index`] | HTTP client for the remote index service |
//! | [`transient`] | Loading `--file` / `--url` material |
//! | [`llm`] | Ollama and remote language-model gateways |
//! | [`chat`] | Chat session driver |
//! | [`interrupt`] | Ctrl-C as an awaitable signal |
//! | [`terminal`] | Terminal front end |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod app;
pub mod chat;
pub mod config;
pub mod db;
pub mod embedding;
pub mod http;
pub mod interrupt;
pub mod llm;
pub mod local_index;
pub mod markdown;
pub mod migrate;
pub mod progress;
pub mod remote_index;
pub mod sources;
pub mod terminal;
pub mod transient;
