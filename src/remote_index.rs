//! HTTP client for the remote vector index.
//!
//! | Call | Request | Response |
//! |------|---------|----------|
//! | list | `GET {base}/sources` | `["name", ...]` |
//! | search | `POST {base}/search` `{collection_name, search_data}` | `[{score, payload: {source, data}}]` |
//! | transient | `POST {base}/search` with `collection_name = "transient"` plus `data` and `metadata` | same |
//!
//! Every failure is reported as [`IndexError::Unreachable`], which the
//! orchestrator turns into a per-source warning.

use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeSet;
use std::time::Duration;

use ragchat_core::error::IndexError;
use ragchat_core::index::{SourceCatalog, TransientIndex};
use ragchat_core::models::{Hit, TransientMaterial, TRANSIENT_SOURCE};

use crate::config::RemoteConfig;
use crate::http::send_with_retry;

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    collection_name: &'a str,
    search_data: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    metadata: Option<&'a serde_json::Value>,
}

/// Remote index catalog and transient search backend.
#[derive(Clone)]
pub struct RemoteIndex {
    base_url: String,
    api_key: Option<String>,
    max_retries: u32,
    timeout: Duration,
    client: reqwest::Client,
}

impl RemoteIndex {
    /// Build a client from configuration. The bearer token is read from
    /// the environment variable named by `api_key_env`, once.
    pub fn new(config: &RemoteConfig) -> anyhow::Result<Self> {
        let api_key = std::env::var(&config.api_key_env).ok();
        if api_key.is_none() {
            tracing::debug!(var = %config.api_key_env, "no remote API key set");
        }
        Self::with_api_key(config, api_key)
    }

    pub fn with_api_key(config: &RemoteConfig, api_key: Option<String>) -> anyhow::Result<Self> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            max_retries: config.max_retries,
            timeout,
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub(crate) fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref()
    }

    /// Per-request deadline for index calls.
    pub(crate) fn timeout(&self) -> Duration {
        self.timeout
    }

    pub(crate) fn max_retries(&self) -> u32 {
        self.max_retries
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    async fn post_search(&self, label: &str, request: &SearchRequest<'_>) -> Result<Vec<Hit>, IndexError> {
        let endpoint = format!("{}/search", self.base_url);
        let response = send_with_retry("Remote index", self.max_retries, || {
            self.authorize(self.client.post(&endpoint)).json(request)
        })
        .await
        .map_err(|e| IndexError::unreachable(label, e.to_string()))?;

        response
            .json::<Vec<Hit>>()
            .await
            .map_err(|e| IndexError::unreachable(label, format!("invalid search response: {}", e)))
    }
}

#[async_trait]
impl SourceCatalog for RemoteIndex {
    async fn list_sources(&self) -> Result<BTreeSet<String>, IndexError> {
        let endpoint = format!("{}/sources", self.base_url);
        let response = send_with_retry("Remote index", self.max_retries, || {
            self.authorize(self.client.get(&endpoint))
        })
        .await
        .map_err(|e| IndexError::unreachable("remote catalog", e.to_string()))?;

        let names: Vec<String> = response.json().await.map_err(|e| {
            IndexError::unreachable("remote catalog", format!("invalid sources response: {}", e))
        })?;
        Ok(names.into_iter().collect())
    }

    async fn search(&self, source: &str, query: &str) -> Result<Vec<Hit>, IndexError> {
        let request = SearchRequest {
            collection_name: source,
            search_data: query,
            data: None,
            metadata: None,
        };
        self.post_search(source, &request).await
    }
}

#[async_trait]
impl TransientIndex for RemoteIndex {
    async fn search_material(
        &self,
        query: &str,
        material: &TransientMaterial,
    ) -> Result<Vec<Hit>, IndexError> {
        let request = SearchRequest {
            collection_name: TRANSIENT_SOURCE,
            search_data: query,
            data: Some(&material.data),
            metadata: Some(&material.metadata),
        };
        self.post_search(TRANSIENT_SOURCE, &request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_request_omits_absent_fields() {
        let request = SearchRequest {
            collection_name: "docs",
            search_data: "what?",
            data: None,
            metadata: None,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json, serde_json::json!({"collection_name": "docs", "search_data": "what?"}));
    }

    #[test]
    fn test_transient_request_shape() {
        let material = TransientMaterial::new("notes.md", "body");
        let request = SearchRequest {
            collection_name: TRANSIENT_SOURCE,
            search_data: "q",
            data: Some(&material.data),
            metadata: Some(&material.metadata),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["collection_name"], "transient");
        assert_eq!(json["metadata"]["source"], "notes.md");
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let config = RemoteConfig {
            base_url: "http://example.test/api/".into(),
            ..RemoteConfig::default()
        };
        let index = RemoteIndex::with_api_key(&config, None).unwrap();
        assert_eq!(index.base_url(), "http://example.test/api");
    }
}
