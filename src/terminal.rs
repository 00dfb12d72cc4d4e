//! Terminal front end for the chat driver.
//!
//! The streamed answer is redrawn in place: after every chunk the lines
//! written for the previous rendering are cleared and the answer is
//! rendered again from Markdown. While streaming only the tail that fits on
//! screen is drawn, since rows scrolled out of view cannot be cleared; the
//! full answer replaces it once the stream ends. When stdout is not a
//! terminal, nothing is drawn until the answer is final, and then it is
//! printed once as plain text.

use console::{style, Term};
use std::sync::Mutex;

use ragchat_core::error::SourceWarning;
use ragchat_core::progress::{SearchPhase, SearchProgress};

use crate::chat::ChatView;
use crate::markdown::render_markdown;
use crate::progress::{ProgressMode, SearchIndicator};

pub struct TerminalView {
    out: Term,
    interactive: bool,
    indicator: SearchIndicator,
    /// Screen rows occupied by the current answer rendering.
    drawn_rows: Mutex<usize>,
}

impl Default for TerminalView {
    fn default() -> Self {
        Self::new()
    }
}

impl TerminalView {
    pub fn new() -> Self {
        let interactive = atty::is(atty::Stream::Stdout);
        let mode = if interactive {
            ProgressMode::default_for_tty()
        } else {
            ProgressMode::Off
        };
        Self {
            out: Term::stdout(),
            interactive,
            indicator: SearchIndicator::new(mode),
            drawn_rows: Mutex::new(0),
        }
    }

    /// Greeting shown before the first prompt.
    pub fn banner(&self, sources: &[String], transient: usize) {
        if !self.interactive {
            return;
        }
        let mut line = format!("{}", style("Chatting with:").bold());
        if sources.is_empty() && transient == 0 {
            line.push_str(" no sources (answers come from the model alone)");
        } else {
            if !sources.is_empty() {
                line.push_str(&format!(" {}", sources.join(", ")));
            }
            if transient > 0 {
                line.push_str(&format!(" + {} file(s)/url(s)", transient));
            }
        }
        let _ = self.out.write_line(&line);
        let _ = self.out.write_line(&format!(
            "{}",
            style("Type `exit` to leave. End a line with \\ to continue it.").dim()
        ));
    }

    fn redraw(&self, text: &str, complete: bool) {
        let Ok(mut rows) = self.drawn_rows.lock() else {
            return;
        };
        if *rows > 0 {
            let _ = self.out.clear_last_lines(*rows);
        }
        let rendered = render_markdown(text, true);
        let (height, width) = self.out.size();
        if complete {
            let _ = self.out.write_line(&rendered);
            *rows = 0;
        } else {
            // Leave the last row for the cursor.
            let max_rows = (height as usize).saturating_sub(1).max(1);
            let (tail, tail_rows) = visible_tail(&rendered, width as usize, max_rows);
            let _ = self.out.write_line(tail);
            *rows = tail_rows;
        }
    }
}

/// The trailing whole lines of `text` that fit in `max_rows` screen rows,
/// with the rows they occupy. The last line is always kept.
fn visible_tail(text: &str, width: usize, max_rows: usize) -> (&str, usize) {
    let width = width.max(1);
    let mut start = text.len();
    let mut rows = 0;
    for (i, line) in text.rsplit('\n').enumerate() {
        let line_rows = console::measure_text_width(line).div_ceil(width).max(1);
        if i > 0 && rows + line_rows > max_rows {
            break;
        }
        rows += line_rows;
        // Lines before the last also take the newline that follows them.
        start -= line.len() + usize::from(i > 0);
    }
    (&text[start..], rows)
}

impl SearchProgress for TerminalView {
    fn phase(&self, phase: SearchPhase) {
        self.indicator.phase(phase);
    }

    fn warning(&self, warning: &SourceWarning) {
        self.indicator.warning(warning);
    }
}

impl ChatView for TerminalView {
    fn prompt(&self) {
        if self.interactive {
            let _ = self.out.write_str(&format!("{} ", style(">").green().bold()));
        }
    }

    fn search_finished(&self) {
        self.indicator.clear();
    }

    fn render_answer(&self, text: &str) {
        if self.interactive {
            self.redraw(text, false);
        }
    }

    fn answer_finished(&self, text: &str, cancelled: bool) {
        if self.interactive {
            self.redraw(text, true);
            if cancelled {
                let _ = self
                    .out
                    .write_line(&format!("{}", style("(answer interrupted)").dim()));
            }
            let _ = self.out.write_line("");
        } else {
            let _ = self.out.write_line(text);
        }
    }

    fn notice(&self, message: &str) {
        self.indicator.clear();
        eprintln!("{}", style(message).red().bold());
    }

    fn farewell(&self) {
        if self.interactive {
            let _ = self.out.write_line("");
        }
        let _ = self.out.write_line("Ending chat. Goodbye!");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rows_count_wrapping() {
        let rows = |text: &str, width| visible_tail(text, width, usize::MAX).1;
        assert_eq!(rows("abc", 80), 1);
        assert_eq!(rows("", 80), 1);
        assert_eq!(rows("a\n\nb", 80), 3);
        assert_eq!(rows(&"x".repeat(25), 10), 3);
    }

    #[test]
    fn test_rows_ignore_escape_codes() {
        let styled = style("hello").bold().force_styling(true).to_string();
        assert_eq!(visible_tail(&styled, 5, usize::MAX).1, 1);
    }

    #[test]
    fn test_visible_tail_fits_everything_when_short() {
        assert_eq!(visible_tail("a\nb\nc", 80, 10), ("a\nb\nc", 3));
    }

    #[test]
    fn test_visible_tail_drops_leading_lines() {
        let text = "one\ntwo\nthree\nfour";
        assert_eq!(visible_tail(text, 80, 2), ("three\nfour", 2));
        assert_eq!(visible_tail(text, 80, 1), ("four", 1));
    }

    #[test]
    fn test_visible_tail_counts_wrapped_rows() {
        let text = format!("head\n{}", "x".repeat(25));
        let (tail, rows) = visible_tail(&text, 10, 3);
        assert_eq!(tail, "x".repeat(25));
        assert_eq!(rows, 3);
    }

    #[test]
    fn test_visible_tail_counts_blank_lines() {
        assert_eq!(visible_tail("\nx", 80, 5), ("\nx", 2));
    }

    #[test]
    fn test_visible_tail_keeps_oversized_last_line() {
        let text = "x".repeat(50);
        assert_eq!(visible_tail(&text, 10, 2), (text.as_str(), 5));
    }
}
