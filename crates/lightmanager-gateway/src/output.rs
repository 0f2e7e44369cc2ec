//! Output sinks.
//!
//! The command engine writes all of its output through an [`OutputSink`].
//! [`PlainSink`] passes text straight to a writer (TCP socket, stdout);
//! [`HtmlSink`] escapes text and turns line breaks into `<br />` for the
//! HTTP front-end.

use std::io::{self, Write};

/// Destination for command output.
pub trait OutputSink {
    /// Write text, transformed as the sink requires.
    fn write_text(&mut self, text: &str) -> io::Result<()>;

    /// Write text without any transformation.
    fn write_verbatim(&mut self, text: &str) -> io::Result<()>;

    /// Whether output ends up in an HTML document.
    fn is_html(&self) -> bool {
        false
    }
}

/// Writes text unchanged.
#[derive(Debug)]
pub struct PlainSink<W: Write> {
    writer: W,
}

impl<W: Write> PlainSink<W> {
    /// Wrap a writer.
    pub fn new(writer: W) -> Self {
        PlainSink { writer }
    }

    /// Unwrap the writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> OutputSink for PlainSink<W> {
    fn write_text(&mut self, text: &str) -> io::Result<()> {
        self.write_verbatim(text)
    }

    fn write_verbatim(&mut self, text: &str) -> io::Result<()> {
        self.writer.write_all(text.as_bytes())?;
        self.writer.flush()
    }
}

/// Escapes text for an HTML body.
pub struct HtmlSink<'a> {
    inner: &'a mut dyn OutputSink,
}

impl<'a> HtmlSink<'a> {
    /// Wrap another sink.
    pub fn new(inner: &'a mut dyn OutputSink) -> Self {
        HtmlSink { inner }
    }
}

impl OutputSink for HtmlSink<'_> {
    fn write_text(&mut self, text: &str) -> io::Result<()> {
        self.inner.write_verbatim(&escape_html(text))
    }

    fn write_verbatim(&mut self, text: &str) -> io::Result<()> {
        self.inner.write_verbatim(text)
    }

    fn is_html(&self) -> bool {
        true
    }
}

/// Escape `&`, `<` and `>` and append `<br />` to every line break.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 16);
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\r' if chars.peek() == Some(&'\n') => {
                chars.next();
                out.push_str("<br />\r\n");
            }
            '\n' => out.push_str("<br />\n"),
            c => out.push(c),
        }
    }
    out
}

/// Escape `&`, `<` and `>` only, keeping line breaks.
pub fn escape_preformatted(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
