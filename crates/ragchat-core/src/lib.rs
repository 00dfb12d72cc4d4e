//! # ragchat core
//!
//! Runtime-agnostic logic for ragchat: data models, chunking, the index
//! and language-model traits, source search orchestration, ranking,
//! prompt construction, and streamed answer accumulation.
//!
//! This crate contains no tokio, sqlx, HTTP, or filesystem I/O. Backends
//! live in the `ragchat` application crate and plug in through the traits
//! in [`index`], [`embedding`], and [`llm`].

pub mod chunk;
pub mod embedding;
pub mod error;
pub mod index;
pub mod llm;
pub mod models;
pub mod progress;
pub mod prompt;
pub mod rank;
pub mod search;
