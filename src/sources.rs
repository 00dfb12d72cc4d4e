use anyhow::Result;

use ragchat_core::models::SourceRef;

use crate::app::build_search;
use crate::config::Config;

/// Print every source that can be passed to `ragchat chat`.
///
/// An unreachable remote catalog is logged and simply contributes no rows.
pub async fn list_sources(config: &Config) -> Result<()> {
    let (search, _) = build_search(config).await?;
    let sources = search.list_sources().await?;
    print!("{}", format_sources(&sources));
    Ok(())
}

fn format_sources(sources: &[SourceRef]) -> String {
    let mut out = format!("{:<24} {}\n", "SOURCE", "LOCALITY");
    if sources.is_empty() {
        out.push_str("(no sources available)\n");
    }
    for source in sources {
        out.push_str(&format!("{:<24} {}\n", source.name, source.locality));
    }
    out
}
