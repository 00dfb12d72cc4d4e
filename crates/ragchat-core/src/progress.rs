//! Search progress reporting.
//!
//! The orchestrator announces each phase as it starts and every soft
//! failure as it happens, so a front end can keep the user informed while
//! network calls are in flight.

use crate::error::SourceWarning;

/// Phase of a source search.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SearchPhase {
    /// Sequential search of local collections.
    Local,
    /// Concurrent search of remote collections.
    Remote,
    /// Search of files and URLs supplied for this session.
    Transient,
}

impl SearchPhase {
    /// Label shown next to the progress indicator.
    pub fn label(self) -> &'static str {
        match self {
            SearchPhase::Local => "Searching through local sources...",
            SearchPhase::Remote => "Searching through remote sources...",
            SearchPhase::Transient => "Searching through files and urls...",
        }
    }
}

/// Receives search progress. Implementations must be cheap; they are
/// called inline from the search loop.
pub trait SearchProgress: Send + Sync {
    /// A phase is starting.
    fn phase(&self, phase: SearchPhase);

    /// A source failed softly and was skipped.
    fn warning(&self, _warning: &SourceWarning) {}
}

/// No-op reporter.
pub struct NoProgress;

impl SearchProgress for NoProgress {
    fn phase(&self, _phase: SearchPhase) {}
}
