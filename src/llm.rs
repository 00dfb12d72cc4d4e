//! Language-model gateways.
//!
//! - **[`OllamaChat`]** (local mode): `POST {ollama_url}/api/chat`. The
//!   streamed response is newline-delimited JSON; each line's
//!   `message.content` becomes one [`AnswerChunk::Text`].
//! - **[`RemoteChat`]** (remote mode): `POST {base_url}/llm` with
//!   `{model, messages, stream}`. The streamed response body is raw answer
//!   text, forwarded as [`AnswerChunk::Bytes`] exactly as received.
//!
//! The gateway is chosen once per session by [`create_gateway`].

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use std::sync::Arc;
use std::time::Duration;

use ragchat_core::llm::{AnswerChunk, AnswerStream, LanguageModel};
use ragchat_core::models::ChatMessage;

use crate::config::Config;
use crate::http::send_with_retry;
use crate::remote_index::RemoteIndex;

// ============ Ollama ============

/// Chat gateway for a local Ollama server.
pub struct OllamaChat {
    url: String,
    model: String,
    client: reqwest::Client,
}

impl OllamaChat {
    pub fn new(url: &str, model: &str) -> Result<Self> {
        // No overall timeout: local generation can legitimately take minutes.
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            url: url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            client,
        })
    }

    async fn post(&self, messages: &[ChatMessage], stream: bool) -> Result<reqwest::Response> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "stream": stream,
        });
        let endpoint = format!("{}/api/chat", self.url);
        send_with_retry("Ollama API", 0, || self.client.post(&endpoint).json(&body))
            .await
            .map_err(|e| anyhow::anyhow!("{} (is Ollama running at {}?)", e, self.url))
    }
}

#[async_trait]
impl LanguageModel for OllamaChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn stream(&self, messages: &[ChatMessage]) -> Result<AnswerStream> {
        let response = self.post(messages, true).await?;
        let bytes = response
            .bytes_stream()
            .map(|chunk| chunk.map(|b| b.to_vec()).map_err(anyhow::Error::from))
            .boxed();
        Ok(ndjson_text_chunks(bytes))
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let response = self.post(messages, false).await?;
        let json: serde_json::Value = response
            .json()
            .await
            .context("Invalid Ollama chat response")?;
        Ok(parse_ollama_message(&json)?.unwrap_or_default())
    }
}

/// Content of one Ollama chat response object. `Ok(None)` for objects that
/// carry no text (such as the final `done` line).
fn parse_ollama_message(json: &serde_json::Value) -> Result<Option<String>> {
    if let Some(err) = json.get("error").and_then(|e| e.as_str()) {
        bail!("Ollama error: {}", err);
    }
    Ok(json
        .get("message")
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .filter(|c| !c.is_empty())
        .map(str::to_string))
}

fn parse_ollama_line(line: &[u8]) -> Result<Option<String>> {
    let line = std::str::from_utf8(line).context("Ollama stream is not UTF-8")?;
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let json: serde_json::Value =
        serde_json::from_str(line).context("Invalid line in Ollama stream")?;
    parse_ollama_message(&json)
}

type ByteStream = BoxStream<'static, Result<Vec<u8>>>;

/// Re-split a byte stream on newlines and decode each NDJSON line into a
/// text chunk. A line split across network reads is reassembled first.
pub fn ndjson_text_chunks(bytes: ByteStream) -> AnswerStream {
    struct State {
        bytes: ByteStream,
        buf: Vec<u8>,
        finished: bool,
    }

    let state = State {
        bytes,
        buf: Vec::new(),
        finished: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            let line = if let Some(pos) = state.buf.iter().position(|b| *b == b'\n') {
                Some(state.buf.drain(..=pos).collect::<Vec<u8>>())
            } else if state.finished && !state.buf.is_empty() {
                Some(std::mem::take(&mut state.buf))
            } else {
                None
            };

            if let Some(line) = line {
                match parse_ollama_line(&line) {
                    Ok(Some(text)) => return Some((Ok(AnswerChunk::Text(text)), state)),
                    Ok(None) => continue,
                    Err(e) => {
                        state.finished = true;
                        state.buf.clear();
                        return Some((Err(e), state));
                    }
                }
            }

            if state.finished {
                return None;
            }

            match state.bytes.next().await {
                Some(Ok(chunk)) => state.buf.extend_from_slice(&chunk),
                Some(Err(e)) => {
                    state.finished = true;
                    state.buf.clear();
                    return Some((Err(e), state));
                }
                None => state.finished = true,
            }
        }
    })
    .boxed()
}

// ============ Remote ============

/// Chat gateway for the remote LLM endpoint. Shares the remote index's
/// base URL and credentials. Its own client applies the index timeout to
/// connecting only; the streamed body has no overall deadline.
pub struct RemoteChat {
    endpoint: String,
    model: String,
    api_key: Option<String>,
    max_retries: u32,
    client: reqwest::Client,
}

impl RemoteChat {
    pub fn new(remote: &RemoteIndex, model: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(remote.timeout())
            .build()?;
        Ok(Self {
            endpoint: format!("{}/llm", remote.base_url()),
            model: model.to_string(),
            api_key: remote.api_key().map(str::to_string),
            max_retries: remote.max_retries(),
            client,
        })
    }

    async fn post(&self, messages: &[ChatMessage], stream: bool) -> Result<reqwest::Response> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "stream": stream,
        });
        send_with_retry("Remote LLM", self.max_retries, || {
            let request = self.client.post(&self.endpoint).json(&body);
            match &self.api_key {
                Some(key) => request.bearer_auth(key),
                None => request,
            }
        })
        .await
    }
}

#[async_trait]
impl LanguageModel for RemoteChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn stream(&self, messages: &[ChatMessage]) -> Result<AnswerStream> {
        let response = self.post(messages, true).await?;
        Ok(response
            .bytes_stream()
            .map(|chunk| {
                chunk
                    .map(|b| AnswerChunk::Bytes(b.to_vec()))
                    .map_err(anyhow::Error::from)
            })
            .boxed())
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let response = self.post(messages, false).await?;
        response
            .text()
            .await
            .context("Failed to read remote LLM response")
    }
}

/// Build the gateway for this session: Ollama in local mode, the remote
/// endpoint otherwise.
pub fn create_gateway(config: &Config, remote: &RemoteIndex) -> Result<Arc<dyn LanguageModel>> {
    if config.chat.local_mode {
        Ok(Arc::new(OllamaChat::new(
            &config.llm.ollama_url,
            &config.llm.local_model,
        )?))
    } else {
        Ok(Arc::new(RemoteChat::new(remote, &config.chat.model)?))
    }
}
