//! Chat session driver.
//!
//! One turn walks through
//! `AWAITING_INPUT → SEARCHING → RANKING → PROMPTING → STREAMING → DONE`,
//! or straight to `TERMINATED` when the user types `exit`. The user
//! interrupt is honoured at every suspension point:
//!
//! | Interrupted while | Effect |
//! |-------------------|--------|
//! | awaiting input | session ends |
//! | searching | session ends, nothing was rendered |
//! | streaming | stream is dropped, the partial answer stays on screen and in the outcome |
//!
//! Interrupts are never reported as errors. A local source failure
//! abandons the current turn only; the session keeps running.

use anyhow::Result;
use async_trait::async_trait;
use futures::StreamExt;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;

use ragchat_core::llm::{AnswerAccumulator, LanguageModel};
use ragchat_core::models::{ChatMessage, TransientMaterial};
use ragchat_core::progress::SearchProgress;
use ragchat_core::prompt::build_messages;
use ragchat_core::rank::RankedContext;
use ragchat_core::search::SourceSearch;

use crate::interrupt::Interrupt;

/// Where a turn currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    AwaitingInput,
    Searching,
    Ranking,
    Prompting,
    Streaming,
    Done,
    Terminated,
}

/// The messages sent for one turn and the answer received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub messages: Vec<ChatMessage>,
    pub answer: String,
}

#[derive(Debug)]
pub enum TurnOutcome {
    /// The user typed `exit` or input ended.
    Exit,
    /// Interrupted while awaiting input or searching. Ends the session.
    Interrupted,
    /// The turn could not produce an answer (local source failure, model
    /// unreachable). The session continues.
    Abandoned(anyhow::Error),
    /// Interrupted mid-stream; `answer` holds what had arrived.
    Cancelled(Turn),
    Completed(Turn),
}

impl TurnOutcome {
    /// Whether the session should stop after this turn.
    pub fn ends_session(&self) -> bool {
        matches!(self, TurnOutcome::Exit | TurnOutcome::Interrupted)
    }
}

/// True for `exit` in any case with surrounding whitespace.
pub fn is_exit(utterance: &str) -> bool {
    utterance.trim().eq_ignore_ascii_case("exit")
}

/// Line-oriented user input.
#[async_trait]
pub trait InputSource: Send {
    /// Next line without its terminator, or `None` at end of input.
    async fn read_line(&mut self) -> Result<Option<String>>;
}

/// Read one utterance. A line ending in `\` continues on the next line.
pub async fn read_utterance(input: &mut dyn InputSource) -> Result<Option<String>> {
    let mut lines: Vec<String> = Vec::new();
    loop {
        let Some(line) = input.read_line().await? else {
            return Ok(if lines.is_empty() {
                None
            } else {
                Some(lines.join("\n"))
            });
        };
        match line.strip_suffix('\\') {
            Some(head) => lines.push(head.to_string()),
            None => {
                lines.push(line);
                return Ok(Some(lines.join("\n")));
            }
        }
    }
}

/// [`InputSource`] over any async buffered reader.
pub struct LineInput<R> {
    reader: R,
}

impl<R> LineInput<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }
}

#[async_trait]
impl<R: AsyncBufRead + Unpin + Send> InputSource for LineInput<R> {
    async fn read_line(&mut self) -> Result<Option<String>> {
        let mut line = String::new();
        if self.reader.read_line(&mut line).await? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim_end_matches(['\n', '\r']).to_string()))
    }
}

/// Standard input read on a dedicated thread.
///
/// Reads are delivered over a channel, so abandoning a pending read (on
/// interrupt) neither loses a line nor blocks process exit.
pub struct StdinInput {
    rx: mpsc::Receiver<std::io::Result<String>>,
}

impl StdinInput {
    pub fn spawn() -> Self {
        let (tx, rx) = mpsc::channel(1);
        std::thread::spawn(move || {
            let stdin = std::io::stdin();
            loop {
                let mut line = String::new();
                let result = match stdin.read_line(&mut line) {
                    Ok(0) => break,
                    Ok(_) => Ok(line),
                    Err(e) => Err(e),
                };
                let failed = result.is_err();
                if tx.blocking_send(result).is_err() || failed {
                    break;
                }
            }
        });
        Self { rx }
    }
}

#[async_trait]
impl InputSource for StdinInput {
    async fn read_line(&mut self) -> Result<Option<String>> {
        match self.rx.recv().await {
            Some(line) => Ok(Some(line?.trim_end_matches(['\n', '\r']).to_string())),
            None => Ok(None),
        }
    }
}

/// Everything the driver shows the user.
///
/// Search progress arrives through the [`SearchProgress`] supertrait.
pub trait ChatView: SearchProgress {
    /// Ready for the next utterance.
    fn prompt(&self);
    /// The search phase is over; clear any progress indicator.
    fn search_finished(&self);
    /// Show the full answer accumulated so far, replacing the previous
    /// rendering.
    fn render_answer(&self, text: &str);
    /// The answer is final.
    fn answer_finished(&self, text: &str, cancelled: bool);
    /// An error or notice for the user.
    fn notice(&self, message: &str);
    fn farewell(&self);
}

/// Turns kept for later prompts unless [`ChatSession::history_turns`] says otherwise.
pub const DEFAULT_HISTORY_TURNS: usize = 10;

/// A chat session over fixed sources and transient materials.
pub struct ChatSession {
    search: SourceSearch,
    gateway: Arc<dyn LanguageModel>,
    interrupt: Interrupt,
    sources: Vec<String>,
    transient: Vec<TransientMaterial>,
    keep_history: bool,
    history_turns: usize,
    history: Vec<ChatMessage>,
    state: TurnState,
}

impl ChatSession {
    pub fn new(search: SourceSearch, gateway: Arc<dyn LanguageModel>, interrupt: Interrupt) -> Self {
        Self {
            search,
            gateway,
            interrupt,
            sources: Vec::new(),
            transient: Vec::new(),
            keep_history: true,
            history_turns: DEFAULT_HISTORY_TURNS,
            history: Vec::new(),
            state: TurnState::AwaitingInput,
        }
    }

    pub fn with_sources(mut self, sources: Vec<String>) -> Self {
        self.sources = sources;
        self
    }

    pub fn with_transient(mut self, transient: Vec<TransientMaterial>) -> Self {
        self.transient = transient;
        self
    }

    /// Carry earlier turns into later prompts. Only the most recent
    /// [`history_turns`](Self::history_turns) question/answer pairs are kept.
    pub fn keep_history(mut self, keep: bool) -> Self {
        self.keep_history = keep;
        self
    }

    pub fn history_turns(mut self, turns: usize) -> Self {
        self.history_turns = turns;
        self
    }

    pub fn state(&self) -> TurnState {
        self.state
    }

    /// Prior questions and answers carried into later prompts.
    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    fn set_state(&mut self, state: TurnState) {
        tracing::debug!(from = ?self.state, to = ?state, "turn state");
        self.state = state;
    }

    /// Run turns until the user exits or interrupts outside a stream.
    pub async fn run<V: ChatView>(&mut self, input: &mut dyn InputSource, view: &V) -> Result<()> {
        loop {
            let outcome = self.turn(input, view).await;
            match &outcome {
                TurnOutcome::Abandoned(err) => tracing::warn!(error = %err, "turn abandoned"),
                TurnOutcome::Cancelled(turn) => {
                    tracing::info!(chars = turn.answer.len(), "answer cancelled")
                }
                _ => {}
            }
            if outcome.ends_session() {
                if matches!(outcome, TurnOutcome::Interrupted) {
                    view.farewell();
                }
                return Ok(());
            }
        }
    }

    /// One full turn, starting from `AWAITING_INPUT`.
    pub async fn turn<V: ChatView>(
        &mut self,
        input: &mut dyn InputSource,
        view: &V,
    ) -> TurnOutcome {
        self.set_state(TurnState::AwaitingInput);

        let utterance = loop {
            view.prompt();
            let read = tokio::select! {
                biased;
                _ = self.interrupt.triggered() => {
                    self.interrupt.reset();
                    self.set_state(TurnState::Terminated);
                    return TurnOutcome::Interrupted;
                }
                read = read_utterance(input) => read,
            };
            match read {
                Ok(Some(text)) if text.trim().is_empty() => continue,
                Ok(Some(text)) => break text,
                Ok(None) => {
                    view.farewell();
                    self.set_state(TurnState::Terminated);
                    return TurnOutcome::Exit;
                }
                Err(err) => {
                    tracing::warn!(error = %err, "failed to read input");
                    view.farewell();
                    self.set_state(TurnState::Terminated);
                    return TurnOutcome::Exit;
                }
            }
        };

        if is_exit(&utterance) {
            view.farewell();
            self.set_state(TurnState::Terminated);
            return TurnOutcome::Exit;
        }

        self.answer(&utterance, view).await
    }

    /// Search, rank, prompt and stream for one question.
    pub async fn answer<V: ChatView>(&mut self, question: &str, view: &V) -> TurnOutcome {
        self.set_state(TurnState::Searching);
        let searched = tokio::select! {
            biased;
            _ = self.interrupt.triggered() => None,
            result = self.search.search(question, &self.sources, &self.transient, view) => Some(result),
        };
        view.search_finished();

        let outcome = match searched {
            None => {
                self.interrupt.reset();
                self.set_state(TurnState::Terminated);
                return TurnOutcome::Interrupted;
            }
            Some(Ok(outcome)) => outcome,
            Some(Err(err)) => {
                view.notice(&err.to_string());
                self.set_state(TurnState::Terminated);
                return TurnOutcome::Abandoned(err.into());
            }
        };
        for name in &outcome.unknown {
            view.notice(&format!("Source not found: {}", name));
        }

        self.set_state(TurnState::Ranking);
        let ranked = RankedContext::from_hits(outcome.hits);
        tracing::debug!(hits = ranked.hits.len(), sources = ?ranked.sources, "ranked context");

        self.set_state(TurnState::Prompting);
        let history: &[ChatMessage] = if self.keep_history { &self.history } else { &[] };
        let messages = build_messages(history, &ranked, question);

        self.set_state(TurnState::Streaming);
        let requested = tokio::select! {
            biased;
            _ = self.interrupt.triggered() => None,
            stream = self.gateway.stream(&messages) => Some(stream),
        };
        let mut stream = match requested {
            None => {
                self.interrupt.reset();
                view.answer_finished("", true);
                self.set_state(TurnState::Terminated);
                return TurnOutcome::Cancelled(Turn {
                    messages,
                    answer: String::new(),
                });
            }
            Some(Ok(stream)) => stream,
            Some(Err(err)) => {
                view.notice(&format!("Failed to reach the language model: {}", err));
                self.set_state(TurnState::Terminated);
                return TurnOutcome::Abandoned(err);
            }
        };

        let mut accumulated = AnswerAccumulator::new();
        let cancelled = loop {
            tokio::select! {
                biased;
                _ = self.interrupt.triggered() => {
                    self.interrupt.reset();
                    break true;
                }
                next = stream.next() => match next {
                    Some(Ok(chunk)) => {
                        if accumulated.push(chunk) {
                            view.render_answer(accumulated.as_str());
                        }
                    }
                    Some(Err(err)) => {
                        tracing::warn!(error = %err, chunks = accumulated.chunk_count(), "answer stream failed");
                        view.notice("The answer was cut short by a connection error.");
                        break false;
                    }
                    None => break false,
                },
            }
        };
        drop(stream);

        let answer = accumulated.finish();
        view.answer_finished(&answer, cancelled);

        if self.keep_history && !answer.is_empty() {
            self.history.push(ChatMessage::user(question));
            self.history.push(ChatMessage::assistant(answer.clone()));
            let excess = self.history.len().saturating_sub(self.history_turns * 2);
            self.history.drain(..excess);
        }

        let turn = Turn { messages, answer };
        if cancelled {
            self.set_state(TurnState::Terminated);
            TurnOutcome::Cancelled(turn)
        } else {
            self.set_state(TurnState::Done);
            TurnOutcome::Completed(turn)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_exit() {
        assert!(is_exit("exit"));
        assert!(is_exit("Exit"));
        assert!(is_exit("  exit  "));
        assert!(is_exit("EXIT\n"));
        assert!(!is_exit("exit now"));
        assert!(!is_exit("exits"));
        assert!(!is_exit(""));
    }

    #[tokio::test]
    async fn test_read_utterance_continuation() {
        let mut input = LineInput::new(&b"first \\\nsecond\nthird\n"[..]);
        assert_eq!(
            read_utterance(&mut input).await.unwrap().as_deref(),
            Some("first \nsecond")
        );
        assert_eq!(read_utterance(&mut input).await.unwrap().as_deref(), Some("third"));
        assert_eq!(read_utterance(&mut input).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_read_utterance_eof_mid_continuation() {
        let mut input = LineInput::new(&b"dangling \\"[..]);
        assert_eq!(
            read_utterance(&mut input).await.unwrap().as_deref(),
            Some("dangling ")
        );
    }

    #[tokio::test]
    async fn test_line_input_strips_crlf() {
        let mut input = LineInput::new(&b"hello\r\n"[..]);
        assert_eq!(input.read_line().await.unwrap().as_deref(), Some("hello"));
    }
}
