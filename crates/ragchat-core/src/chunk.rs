//! Paragraph-boundary text splitter for transient materials.
//!
//! Splits text into pieces of at most `chunk_chars` bytes, preferring
//! paragraph (`\n\n`) boundaries, and seeds each new piece with up to
//! `overlap_chars` of trailing context from the previous one so that a
//! sentence straddling a boundary is still retrievable.
//!
//! # Algorithm
//!
//! 1. Split text on `\n\n` and drop empty paragraphs.
//! 2. Hard-split any paragraph longer than `chunk_chars` at the nearest
//!    newline or space boundary.
//! 3. Accumulate pieces into a buffer until the next one would overflow.
//! 4. On overflow, flush the buffer and start the next buffer with the
//!    word-aligned tail of the flushed one (the overlap), when it fits.
//!
//! # Example
//!
//! ```rust
//! use ragchat_core::chunk::split_text;
//!
//! let chunks = split_text("Hello world.\n\nSecond paragraph.", 2048, 80);
//! assert_eq!(chunks, vec!["Hello world.\n\nSecond paragraph.".to_string()]);
//! ```

/// Split `text` into overlapping chunks of at most `chunk_chars` bytes.
///
/// Returns an empty vector for blank input. `overlap_chars` is clamped to
/// half of `chunk_chars`; a `chunk_chars` of zero is treated as one.
pub fn split_text(text: &str, chunk_chars: usize, overlap_chars: usize) -> Vec<String> {
    let max_chars = chunk_chars.max(1);
    let overlap = overlap_chars.min(max_chars / 2);

    let mut pieces: Vec<&str> = Vec::new();
    for para in text.split("\n\n") {
        let trimmed = para.trim();
        if trimmed.is_empty() {
            continue;
        }
        if trimmed.len() > max_chars {
            pieces.extend(hard_split(trimmed, max_chars));
        } else {
            pieces.push(trimmed);
        }
    }

    let mut chunks = Vec::new();
    let mut buf = String::new();

    for piece in pieces {
        let would_be = if buf.is_empty() {
            piece.len()
        } else {
            buf.len() + 2 + piece.len()
        };

        if would_be > max_chars && !buf.is_empty() {
            let carried = tail(&buf, overlap).to_string();
            chunks.push(std::mem::take(&mut buf));
            if !carried.is_empty() && carried.len() + 2 + piece.len() <= max_chars {
                buf = carried;
            }
        }

        if !buf.is_empty() {
            buf.push_str("\n\n");
        }
        buf.push_str(piece);
    }

    if !buf.is_empty() {
        chunks.push(buf);
    }

    chunks
}

/// Hard-split an oversized paragraph at newline/space boundaries.
fn hard_split(text: &str, max_chars: usize) -> Vec<&str> {
    let mut out = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        let split_at = snap_to_char_boundary(remaining, remaining.len().min(max_chars));
        let split_at = if split_at == 0 {
            next_char_boundary(remaining)
        } else {
            split_at
        };
        let actual_split = if split_at < remaining.len() {
            remaining[..split_at]
                .rfind('\n')
                .or_else(|| remaining[..split_at].rfind(' '))
                .map(|pos| pos + 1)
                .unwrap_or(split_at)
        } else {
            split_at
        };

        let piece = remaining[..actual_split].trim();
        if !piece.is_empty() {
            out.push(piece);
        }
        remaining = &remaining[actual_split..];
    }

    out
}

/// The last `n` bytes of `s`, advanced to a char boundary and then past the
/// first whitespace so the overlap never starts mid-word.
fn tail(s: &str, n: usize) -> &str {
    if n == 0 {
        return "";
    }
    if s.len() <= n {
        return s;
    }
    let mut start = s.len() - n;
    while !s.is_char_boundary(start) {
        start += 1;
    }
    let window = &s[start..];
    if s[..start].ends_with(char::is_whitespace) {
        return window.trim_start();
    }
    match window.find(char::is_whitespace) {
        Some(pos) => window[pos..].trim_start(),
        None => window,
    }
}

/// Snap a byte index back to the nearest valid UTF-8 char boundary.
fn snap_to_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut i = index;
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

fn next_char_boundary(s: &str) -> usize {
    s.char_indices().nth(1).map(|(i, _)| i).unwrap_or(s.len())
}
