//! Markdown to styled terminal text.
//!
//! Covers what chat answers actually contain: headings, paragraphs,
//! emphasis, inline and fenced code, lists, block quotes, links, and rules.
//! Anything else is rendered as its plain text.

use console::Style;
use pulldown_cmark::{CodeBlockKind, Event, HeadingLevel, Options, Parser, Tag};

/// Render `markdown` for a terminal. `colors` off yields plain text with
/// the same layout.
pub fn render_markdown(markdown: &str, colors: bool) -> String {
    let mut renderer = Renderer::new(colors);
    let parser = Parser::new_ext(markdown, Options::ENABLE_STRIKETHROUGH | Options::ENABLE_TABLES);
    for event in parser {
        renderer.event(event);
    }
    renderer.finish()
}

type StyleFn = fn(Style) -> Style;

/// An open element. Every `Start` event pushes one, its `End` pops it.
enum Open {
    Paragraph,
    Heading,
    Quote,
    CodeBlock,
    List,
    Item,
    Styled,
    Link(String),
    Other,
}

struct Renderer {
    out: String,
    colors: bool,
    open: Vec<Open>,
    styles: Vec<StyleFn>,
    /// One entry per open list: `Some(n)` for ordered lists.
    lists: Vec<Option<u64>>,
    quote_depth: usize,
    in_code_block: bool,
    at_line_start: bool,
}

impl Renderer {
    fn new(colors: bool) -> Self {
        Self {
            out: String::new(),
            colors,
            open: Vec::new(),
            styles: Vec::new(),
            lists: Vec::new(),
            quote_depth: 0,
            in_code_block: false,
            at_line_start: true,
        }
    }

    fn finish(mut self) -> String {
        let trimmed = self.out.trim_end().len();
        self.out.truncate(trimmed);
        self.out
    }

    fn paint(&self, style: Style, text: &str) -> String {
        if self.colors {
            style.force_styling(true).apply_to(text).to_string()
        } else {
            text.to_string()
        }
    }

    fn write(&mut self, text: &str) {
        for (i, line) in text.split('\n').enumerate() {
            if i > 0 {
                self.newline();
            }
            if line.is_empty() {
                continue;
            }
            self.line_prefix();
            let style = self.styles.iter().fold(Style::new(), |acc, apply| apply(acc));
            let painted = if self.styles.is_empty() {
                line.to_string()
            } else {
                self.paint(style, line)
            };
            self.out.push_str(&painted);
        }
    }

    fn line_prefix(&mut self) {
        if !self.at_line_start {
            return;
        }
        self.at_line_start = false;
        for _ in 0..self.quote_depth {
            let bar = self.paint(Style::new().dim(), "│ ");
            self.out.push_str(&bar);
        }
        if self.in_code_block {
            self.out.push_str("    ");
        }
    }

    fn newline(&mut self) {
        self.out.push('\n');
        self.at_line_start = true;
    }

    /// End the current block with one blank line (none inside lists).
    fn block_break(&mut self) {
        if self.out.is_empty() {
            return;
        }
        if !self.at_line_start {
            self.newline();
        }
        if !self.out.ends_with("\n\n") && self.lists.is_empty() {
            self.newline();
        }
    }

    fn event(&mut self, event: Event<'_>) {
        match event {
            Event::Start(tag) => {
                let open = self.start(tag);
                self.open.push(open);
            }
            Event::End(_) => {
                if let Some(open) = self.open.pop() {
                    self.end(open);
                }
            }
            Event::Text(text) => self.write(&text),
            Event::Code(code) => {
                self.line_prefix();
                let painted = self.paint(Style::new().cyan(), &code);
                self.out.push_str(&painted);
            }
            Event::SoftBreak => self.write(" "),
            Event::HardBreak => self.newline(),
            Event::Rule => {
                self.block_break();
                let rule = self.paint(Style::new().dim(), &"─".repeat(40));
                self.out.push_str(&rule);
                self.newline();
            }
            Event::TaskListMarker(done) => self.write(if done { "[x] " } else { "[ ] " }),
            Event::Html(html) | Event::InlineHtml(html) => self.write(&html),
            _ => {}
        }
    }

    fn start(&mut self, tag: Tag<'_>) -> Open {
        match tag {
            Tag::Paragraph => Open::Paragraph,
            Tag::Heading { level, .. } => {
                self.block_break();
                let apply: StyleFn = match level {
                    HeadingLevel::H1 => |s| s.bold().underlined(),
                    _ => |s| s.bold(),
                };
                self.styles.push(apply);
                Open::Heading
            }
            Tag::BlockQuote(_) => {
                self.block_break();
                self.quote_depth += 1;
                Open::Quote
            }
            Tag::CodeBlock(kind) => {
                self.block_break();
                if let CodeBlockKind::Fenced(lang) = kind {
                    if !lang.is_empty() {
                        self.line_prefix();
                        let label = self.paint(Style::new().dim(), &lang);
                        self.out.push_str(&label);
                        self.newline();
                    }
                }
                self.in_code_block = true;
                self.styles.push(|s| s.cyan());
                Open::CodeBlock
            }
            Tag::List(start) => {
                if self.lists.is_empty() {
                    self.block_break();
                } else if !self.at_line_start {
                    self.newline();
                }
                self.lists.push(start);
                Open::List
            }
            Tag::Item => {
                if !self.at_line_start {
                    self.newline();
                }
                let depth = self.lists.len().saturating_sub(1);
                let marker = match self.lists.last_mut() {
                    Some(Some(n)) => {
                        let marker = format!("{}. ", n);
                        *n += 1;
                        marker
                    }
                    _ => "• ".to_string(),
                };
                self.line_prefix();
                self.out.push_str(&"  ".repeat(depth));
                self.out.push_str(&marker);
                Open::Item
            }
            Tag::Emphasis => {
                self.styles.push(|s| s.italic());
                Open::Styled
            }
            Tag::Strong => {
                self.styles.push(|s| s.bold());
                Open::Styled
            }
            Tag::Strikethrough => {
                self.styles.push(|s| s.strikethrough());
                Open::Styled
            }
            Tag::Link { dest_url, .. } => {
                self.styles.push(|s| s.blue().underlined());
                Open::Link(dest_url.to_string())
            }
            _ => Open::Other,
        }
    }

    fn end(&mut self, open: Open) {
        match open {
            Open::Paragraph => {
                if self.lists.is_empty() {
                    self.block_break();
                }
            }
            Open::Heading => {
                self.styles.pop();
                self.block_break();
            }
            Open::Quote => {
                self.quote_depth = self.quote_depth.saturating_sub(1);
                self.block_break();
            }
            Open::CodeBlock => {
                self.styles.pop();
                self.in_code_block = false;
                self.block_break();
            }
            Open::List => {
                self.lists.pop();
                if self.lists.is_empty() {
                    self.block_break();
                }
            }
            Open::Item => {
                if !self.at_line_start {
                    self.newline();
                }
            }
            Open::Styled => {
                self.styles.pop();
            }
            Open::Link(url) => {
                self.styles.pop();
                let shown = self.paint(Style::new().dim(), &format!(" ({})", url));
                self.out.push_str(&shown);
            }
            Open::Other => {}
        }
    }
}
