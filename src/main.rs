//! # ragchat CLI
//!
//! ## Usage
//!
//! ```bash
//! ragchat --config ./config/ragchat.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ragchat chat [SOURCES]...` | Chat with the named sources |
//! | `ragchat sources` | List local and remote sources |
//!
//! ## Examples
//!
//! ```bash
//! # Chat with a local and a remote source
//! ragchat chat handbook wiki
//!
//! # Add a file and a web page for this session only
//! ragchat chat handbook --file notes.md --url https://example.com/faq
//!
//! # Show diagnostics
//! RUST_LOG=ragchat=debug ragchat chat handbook
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use ragchat::{app, config, sources};

/// ragchat: retrieval-augmented chat over local and remote knowledge sources.
#[derive(Parser)]
#[command(name = "ragchat", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/ragchat.toml`. A missing file means defaults.
    #[arg(long, global = true, default_value = "./config/ragchat.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start an interactive chat.
    ///
    /// Every question is searched against the named sources plus any files
    /// and URLs given here. Type `exit` (or press Ctrl-D) to leave; Ctrl-C
    /// stops the answer being streamed.
    Chat {
        /// Source names, local or remote. See `ragchat sources`.
        sources: Vec<String>,

        /// Text file to search for this session only. Repeatable.
        #[arg(long = "file")]
        files: Vec<PathBuf>,

        /// Web page to search for this session only. Repeatable.
        #[arg(long = "url")]
        urls: Vec<String>,
    },

    /// List available sources and where they live.
    Sources,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Chat {
            sources,
            files,
            urls,
        } => {
            app::run_chat(&cfg, sources, files, urls).await?;
        }
        Commands::Sources => {
            sources::list_sources(&cfg).await?;
        }
    }

    Ok(())
}
