//! Minimal HTTP on the command port.
//!
//! A browser (or `curl`) can send `GET /cmd=<commands> HTTP/1.1` to the
//! command port. The request line is recognized among ordinary command
//! lines, the commands are URL-decoded and executed, and the output comes
//! back as a small HTML page. Exactly one request is answered per
//! connection; the connection is closed afterwards.

use std::io;
use std::sync::Arc;

use chrono::Utc;
use lightmanager_metrics::metric_defs;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::engine::{CommandEngine, Outcome};
use crate::help::{help_body, help_title};
use crate::output::{escape_preformatted, HtmlSink, OutputSink};
use crate::session::ClientSession;
use crate::{PROGRAM_NAME, VERSION};

const HTTP_MARKER: &str = "HTTP/1.";
const COMMAND_PREFIX: &str = "/cmd=";

/// Why an HTTP request could not be served.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HttpError {
    /// The request line has no path.
    #[error("request has no path")]
    MissingPath,

    /// The path does not contain `/cmd=`.
    #[error("request path '{0}' has no /cmd= part")]
    MissingCommand(String),

    /// A `%` is not followed by two hex digits.
    #[error("invalid percent escape at offset {0}")]
    InvalidEscape(usize),

    /// The decoded command is not UTF-8.
    #[error("decoded command is not valid UTF-8")]
    InvalidUtf8,
}

/// Whether a line is an HTTP request line.
pub fn is_http_request(line: &str) -> bool {
    line.get(..3).is_some_and(|start| start.eq_ignore_ascii_case("GET"))
        && line.contains(HTTP_MARKER)
}

/// Whether the start and end of a dropped overlong line belong to a
/// request line.
pub fn is_truncated_http_request(head: &str, tail: &str) -> bool {
    head.get(..3).is_some_and(|start| start.eq_ignore_ascii_case("GET"))
        && tail.contains(HTTP_MARKER)
}

fn find_ignore_case(haystack: &str, needle: &str) -> Option<usize> {
    haystack
        .as_bytes()
        .windows(needle.len())
        .position(|window| window.eq_ignore_ascii_case(needle.as_bytes()))
}

/// Extract and decode the command line of a request.
pub fn parse_request(line: &str) -> Result<String, HttpError> {
    let end = line.find(HTTP_MARKER).unwrap_or(line.len());
    let start = line[..end].find('/').ok_or(HttpError::MissingPath)?;
    let path = line[start..end].trim();
    debug!("HTTP path '{}'", path);

    let offset = find_ignore_case(path, COMMAND_PREFIX)
        .ok_or_else(|| HttpError::MissingCommand(path.to_string()))?;
    url_decode(&path[offset + COMMAND_PREFIX.len()..])
}

/// Decode `%XX` escapes and `+` as space.
pub fn url_decode(input: &str) -> Result<String, HttpError> {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' => {
                let hex = bytes
                    .get(i + 1..i + 3)
                    .filter(|h| h.iter().all(u8::is_ascii_hexdigit))
                    .and_then(|h| std::str::from_utf8(h).ok())
                    .and_then(|h| u8::from_str_radix(h, 16).ok())
                    .ok_or(HttpError::InvalidEscape(i))?;
                out.push(hex);
                i += 3;
            }
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8(out).map_err(|_| HttpError::InvalidUtf8)
}

fn write_headers(sink: &mut dyn OutputSink, status: u16, reason: &str) -> io::Result<()> {
    let date = Utc::now().format("%a %b %d %H:%M:%S %Y GMT").to_string();
    sink.write_verbatim(&format!(
        "HTTP/1.1 {status} {reason}\r\n\
         Date: {date}\r\n\
         Server: {PROGRAM_NAME} WEB v{VERSION}\r\n\
         Last-Modified: {date}\r\n\
         Content-Language: en\r\n\
         Cache-Control: no-store, no-cache, must-revalidate, post-check=0, pre-check=0\r\n\
         Pragma: no-cache\r\n\
         Connection: close\r\n\
         Content-Type: text/html\r\n\
         Access-Control-Allow-Origin: *\r\n\
         \r\n"
    ))
}

fn write_html_header(sink: &mut dyn OutputSink, title: &str) -> io::Result<()> {
    sink.write_verbatim(&format!(
        "<!DOCTYPE HTML PUBLIC \"-//W3C//DTD HTML 4.01 Transitional//EN\"\r\n\
         \x20      \"http://www.w3.org/TR/html4/loose.dtd\">\r\n\
         <html>\r\n\
         <head>\r\n\
         <title>{title}</title>\r\n\
         </head>\r\n\
         <body>\r\n"
    ))
}

fn write_html_footer(sink: &mut dyn OutputSink) -> io::Result<()> {
    sink.write_verbatim("</body>\r\n</html>\r\n")
}

/// Serves HTTP requests and hands every other line to the engine.
#[derive(Debug, Clone)]
pub struct HttpFrontEnd {
    engine: Arc<CommandEngine>,
}

impl HttpFrontEnd {
    /// Wrap an engine.
    pub fn new(engine: Arc<CommandEngine>) -> Self {
        HttpFrontEnd { engine }
    }

    /// The wrapped engine.
    pub fn engine(&self) -> &Arc<CommandEngine> {
        &self.engine
    }

    /// Execute one input line, answering it as HTTP if it is a request.
    pub fn execute(
        &self,
        line: &str,
        session: &mut ClientSession,
        sink: &mut dyn OutputSink,
    ) -> io::Result<Outcome> {
        if !is_http_request(line) {
            return self.engine.execute(line, session, sink);
        }

        match parse_request(line) {
            Ok(commands) => {
                info!("{}: HTTP command '{}'", session.peer(), commands);
                self.respond_ok(&commands, session, sink)?;
            }
            Err(err) => {
                warn!("{}: bad HTTP request: {}", session.peer(), err);
                respond_bad_request(sink)?;
            }
        }
        Ok(Outcome::HandledAsHttp)
    }

    /// Answer a request line that was too long to be read with
    /// `400 Bad Request`. Nothing is executed.
    pub fn reject_oversized(
        &self,
        session: &ClientSession,
        length: usize,
        sink: &mut dyn OutputSink,
    ) -> io::Result<Outcome> {
        warn!("{}: HTTP request line of {} bytes rejected", session.peer(), length);
        respond_bad_request(sink)?;
        Ok(Outcome::HandledAsHttp)
    }

    fn respond_ok(
        &self,
        commands: &str,
        session: &ClientSession,
        sink: &mut dyn OutputSink,
    ) -> io::Result<()> {
        metrics::counter!(metric_defs::HTTP_REQUESTS.name, "status" => "200").increment(1);
        write_headers(sink, 200, "OK")?;
        write_html_header(sink, PROGRAM_NAME)?;

        let mut request_session = ClientSession::new(session.peer());
        let outcome = self
            .engine
            .execute(commands, &mut request_session, &mut HtmlSink::new(&mut *sink))?;
        if matches!(outcome, Outcome::Disconnect | Outcome::Shutdown) {
            warn!("{}: {:?} ignored in HTTP request", session.peer(), outcome);
        }

        write_html_footer(sink)
    }
}

fn respond_bad_request(sink: &mut dyn OutputSink) -> io::Result<()> {
    metrics::counter!(metric_defs::HTTP_REQUESTS.name, "status" => "400").increment(1);
    write_headers(sink, 400, "Bad Request")?;
    write_html_header(sink, "Error 400 - Bad Request")?;
    sink.write_verbatim(
        "<h1>Error 400 - Bad Request</h1>\r\n\
         The request cannot be fulfilled due to bad syntax.\r\n\
         \r\n\
         Usage&colon; <pre>http&colon;//&lt;server&gt;/cmd=<span style=\"color:blue;\">command</span>\
         [&amp;<span style=\"color:blue;\">command</span>[...]]</pre>\r\n\
         \r\n\
         For possible commands see help below\r\n\
         <pre>\r\n",
    )?;
    sink.write_verbatim(&escape_preformatted(&help_title()))?;
    sink.write_verbatim(&escape_preformatted(&help_body()))?;
    sink.write_verbatim("</pre>\r\n")?;
    write_html_footer(sink)
}
