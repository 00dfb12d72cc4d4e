//! Loading transient materials from `--file` and `--url` arguments.
//!
//! Materials live for one chat invocation. A file is labelled with its path
//! as given, a URL with the URL itself.

use anyhow::{bail, Context, Result};
use std::path::Path;
use std::time::Duration;

use ragchat_core::models::TransientMaterial;

/// Read a UTF-8 text file.
pub async fn load_file(path: &Path) -> Result<TransientMaterial> {
    let data = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read file: {}", path.display()))?;
    if data.trim().is_empty() {
        bail!("File is empty: {}", path.display());
    }
    Ok(TransientMaterial::new(path.display().to_string(), data))
}

/// Fetch a URL's body as text.
pub async fn fetch_url(client: &reqwest::Client, url: &str) -> Result<TransientMaterial> {
    let parsed = reqwest::Url::parse(url).with_context(|| format!("Invalid URL: {}", url))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        bail!("Unsupported URL scheme '{}': {}", parsed.scheme(), url);
    }

    let response = client
        .get(parsed)
        .send()
        .await
        .with_context(|| format!("Failed to fetch {}", url))?;
    let status = response.status();
    if !status.is_success() {
        bail!("Failed to fetch {}: HTTP {}", url, status);
    }
    let data = response
        .text()
        .await
        .with_context(|| format!("Failed to read body of {}", url))?;
    Ok(TransientMaterial::new(url, data))
}

/// Load every file, then every URL, in argument order. The first failure
/// aborts loading.
pub async fn load_all(files: &[impl AsRef<Path>], urls: &[String]) -> Result<Vec<TransientMaterial>> {
    let mut materials = Vec::with_capacity(files.len() + urls.len());
    for file in files {
        materials.push(load_file(file.as_ref()).await?);
    }

    if !urls.is_empty() {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        for url in urls {
            materials.push(fetch_url(&client, url).await?);
        }
    }

    tracing::debug!(count = materials.len(), "loaded transient materials");
    Ok(materials)
}
