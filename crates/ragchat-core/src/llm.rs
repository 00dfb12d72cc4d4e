//! Language-model gateway trait and streamed answer accumulation.
//!
//! Gateways hand back a stream of [`AnswerChunk`]s. Local models produce
//! already-decoded text; remote endpoints produce raw bytes whose UTF-8
//! sequences may be split across chunk boundaries. [`AnswerAccumulator`]
//! folds either kind into the same text.

use anyhow::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::models::ChatMessage;

/// One unit of a streamed answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnswerChunk {
    /// A decoded text fragment.
    Text(String),
    /// An encoded fragment that still needs UTF-8 decoding.
    Bytes(Vec<u8>),
}

/// A streamed answer. Errors end the answer early.
pub type AnswerStream = BoxStream<'static, Result<AnswerChunk>>;

/// A chat model the driver can prompt.
///
/// The model name and locality are fixed when the gateway is built.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Human-readable model identifier, for logs.
    fn model_name(&self) -> &str;

    /// Request a streamed answer.
    async fn stream(&self, messages: &[ChatMessage]) -> Result<AnswerStream>;

    /// Request a complete answer in one response.
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String>;
}

/// Accumulated answer text, decoding byte fragments incrementally.
#[derive(Debug, Default)]
pub struct AnswerAccumulator {
    text: String,
    /// Trailing bytes of an incomplete UTF-8 sequence.
    pending: Vec<u8>,
    chunks: usize,
}

impl AnswerAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one chunk. Returns `true` if the visible text grew.
    pub fn push(&mut self, chunk: AnswerChunk) -> bool {
        let before = self.text.len();
        self.chunks += 1;
        match chunk {
            AnswerChunk::Text(s) => {
                self.flush_pending();
                self.text.push_str(&s);
            }
            AnswerChunk::Bytes(b) => {
                self.pending.extend_from_slice(&b);
                self.decode_pending();
            }
        }
        self.text.len() > before
    }

    /// Text decoded so far. Bytes of an unfinished sequence are held back.
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Number of chunks pushed.
    pub fn chunk_count(&self) -> usize {
        self.chunks
    }

    /// Finish the answer; an unfinished trailing sequence becomes U+FFFD.
    pub fn finish(mut self) -> String {
        self.flush_pending();
        self.text
    }

    fn decode_pending(&mut self) {
        loop {
            let err = match std::str::from_utf8(&self.pending) {
                Ok(s) => {
                    self.text.push_str(s);
                    self.pending.clear();
                    return;
                }
                Err(e) => e,
            };
            let valid = err.valid_up_to();
            self.text
                .push_str(std::str::from_utf8(&self.pending[..valid]).unwrap_or_default());
            match err.error_len() {
                Some(bad) => {
                    self.text.push(char::REPLACEMENT_CHARACTER);
                    self.pending.drain(..valid + bad);
                }
                None => {
                    self.pending.drain(..valid);
                    return;
                }
            }
        }
    }

    fn flush_pending(&mut self) {
        if !self.pending.is_empty() {
            self.text.push_str(&String::from_utf8_lossy(&self.pending));
            self.pending.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn accumulate(chunks: Vec<AnswerChunk>) -> String {
        let mut acc = AnswerAccumulator::new();
        for c in chunks {
            acc.push(c);
        }
        acc.finish()
    }

    #[test]
    fn test_text_and_bytes_converge() {
        let answer = "Ferris says: héllo, grüß 世界 🦀!";
        let text_chunks: Vec<AnswerChunk> = answer
            .split_inclusive(' ')
            .map(|s| AnswerChunk::Text(s.to_string()))
            .collect();
        // Three-byte fragments cut straight through multi-byte sequences.
        let byte_chunks: Vec<AnswerChunk> = answer
            .as_bytes()
            .chunks(3)
            .map(|b| AnswerChunk::Bytes(b.to_vec()))
            .collect();

        let from_text = accumulate(text_chunks);
        let from_bytes = accumulate(byte_chunks);
        assert_eq!(from_text, answer);
        assert_eq!(from_bytes.as_bytes(), from_text.as_bytes());
    }

    #[test]
    fn test_single_byte_fragments() {
        let answer = "🦀🦀";
        let chunks = answer
            .bytes()
            .map(|b| AnswerChunk::Bytes(vec![b]))
            .collect();
        assert_eq!(accumulate(chunks), answer);
    }

    #[test]
    fn test_incomplete_sequence_is_held_back() {
        let mut acc = AnswerAccumulator::new();
        let crab = "🦀".as_bytes();
        assert!(acc.push(AnswerChunk::Bytes(b"hi ".to_vec())));
        assert!(!acc.push(AnswerChunk::Bytes(crab[..2].to_vec())));
        assert_eq!(acc.as_str(), "hi ");
        assert!(acc.push(AnswerChunk::Bytes(crab[2..].to_vec())));
        assert_eq!(acc.as_str(), "hi 🦀");
        assert_eq!(acc.chunk_count(), 3);
    }

    #[test]
    fn test_invalid_bytes_are_replaced() {
        let out = accumulate(vec![AnswerChunk::Bytes(vec![b'a', 0xff, b'b'])]);
        assert_eq!(out, "a\u{FFFD}b");
    }

    #[test]
    fn test_truncated_tail_on_finish() {
        let crab = "🦀".as_bytes();
        let out = accumulate(vec![AnswerChunk::Bytes(crab[..3].to_vec())]);
        assert_eq!(out, "\u{FFFD}");
    }
}
