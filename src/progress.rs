//! Search progress on stderr.
//!
//! Progress is emitted on **stderr** so stdout carries only answers. On a
//! terminal an `indicatif` spinner shows the current phase label; otherwise
//! each phase is one plain line.

use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::Write;
use std::sync::Mutex;
use std::time::Duration;

use ragchat_core::error::SourceWarning;
use ragchat_core::progress::{SearchPhase, SearchProgress};

/// How progress is shown.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    /// Plain lines, for pipes and logs.
    Lines,
    /// Animated spinner, for terminals.
    Spinner,
}

impl ProgressMode {
    /// Default: spinner when stderr is a TTY, otherwise plain lines.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Spinner
        } else {
            ProgressMode::Lines
        }
    }
}

/// Phase indicator for one search at a time.
pub struct SearchIndicator {
    mode: ProgressMode,
    spinner: Mutex<Option<ProgressBar>>,
}

impl SearchIndicator {
    pub fn new(mode: ProgressMode) -> Self {
        Self {
            mode,
            spinner: Mutex::new(None),
        }
    }

    /// Remove the spinner, if one is showing.
    pub fn clear(&self) {
        if let Ok(mut spinner) = self.spinner.lock() {
            if let Some(bar) = spinner.take() {
                bar.finish_and_clear();
            }
        }
    }

    fn spinner_message(&self, message: &'static str) {
        let Ok(mut spinner) = self.spinner.lock() else {
            return;
        };
        let bar = spinner.get_or_insert_with(|| {
            let bar = ProgressBar::new_spinner();
            if let Ok(template) = ProgressStyle::with_template("{spinner:.blue} {msg}") {
                bar.set_style(template);
            }
            bar.enable_steady_tick(Duration::from_millis(100));
            bar
        });
        bar.set_message(message);
    }
}

impl SearchProgress for SearchIndicator {
    fn phase(&self, phase: SearchPhase) {
        match self.mode {
            ProgressMode::Off => {}
            ProgressMode::Lines => {
                let _ = writeln!(std::io::stderr().lock(), "{}", phase.label());
            }
            ProgressMode::Spinner => self.spinner_message(phase.label()),
        }
    }

    fn warning(&self, warning: &SourceWarning) {
        if self.mode == ProgressMode::Off {
            return;
        }
        let line = style(warning.user_message()).red().bold().to_string();
        let spinner = self.spinner.lock().ok().and_then(|s| s.clone());
        match spinner {
            Some(bar) => bar.suspend(|| eprintln!("{}", line)),
            None => eprintln!("{}", line),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragchat_core::models::Locality;

    #[test]
    fn off_mode_is_silent_and_clear_is_idempotent() {
        let indicator = SearchIndicator::new(ProgressMode::Off);
        indicator.phase(SearchPhase::Remote);
        indicator.warning(&SourceWarning {
            source: "wiki".into(),
            locality: Locality::Remote,
            detail: "timeout".into(),
        });
        indicator.clear();
        indicator.clear();
        assert!(indicator.spinner.lock().unwrap().is_none());
    }

    #[test]
    fn spinner_is_created_lazily_and_cleared() {
        let indicator = SearchIndicator::new(ProgressMode::Spinner);
        assert!(indicator.spinner.lock().unwrap().is_none());
        indicator.phase(SearchPhase::Local);
        indicator.phase(SearchPhase::Transient);
        assert!(indicator.spinner.lock().unwrap().is_some());
        indicator.clear();
        assert!(indicator.spinner.lock().unwrap().is_none());
    }
}
