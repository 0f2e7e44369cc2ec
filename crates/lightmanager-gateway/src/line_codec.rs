//! Line splitting for the command protocol.
//!
//! Clients end lines with `\r`, `\n` or both. Empty lines are dropped. A line
//! longer than the configured maximum is never buffered whole: once the limit
//! is crossed the codec discards input up to the next terminator and then
//! reports the overlong line once, with short excerpts of its start and end.

use bytes::BytesMut;

/// Bytes kept from each end of a dropped line.
pub const EXCERPT_LEN: usize = 16;

/// One decoded unit of input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineEvent {
    /// A complete line without its terminator.
    Line(String),
    /// A line exceeded the maximum length and was dropped.
    Overlong {
        /// Length of the dropped line in bytes.
        length: usize,
        /// First bytes of the line.
        head: String,
        /// Last bytes of the line.
        tail: String,
    },
}

fn is_terminator(byte: u8) -> bool {
    byte == b'\r' || byte == b'\n'
}

/// What is left of a line while it is being discarded.
#[derive(Debug, Default)]
struct Discarded {
    length: usize,
    head: Vec<u8>,
    tail: Vec<u8>,
}

impl Discarded {
    fn absorb(&mut self, chunk: &[u8]) {
        self.length += chunk.len();
        let wanted = EXCERPT_LEN.saturating_sub(self.head.len()).min(chunk.len());
        self.head.extend_from_slice(&chunk[..wanted]);
        self.tail.extend_from_slice(chunk);
        if self.tail.len() > EXCERPT_LEN {
            self.tail.drain(..self.tail.len() - EXCERPT_LEN);
        }
    }

    fn into_event(self) -> LineEvent {
        LineEvent::Overlong {
            length: self.length,
            head: String::from_utf8_lossy(&self.head).into_owned(),
            tail: String::from_utf8_lossy(&self.tail).into_owned(),
        }
    }
}

/// Accumulates received bytes and yields complete lines.
#[derive(Debug)]
pub struct LineCodec {
    buffer: BytesMut,
    max_length: usize,
    /// The current overlong line, while it is being dropped.
    discarded: Option<Discarded>,
}

impl LineCodec {
    /// Create a codec accepting lines of up to `max_length` bytes.
    pub fn new(max_length: usize) -> Self {
        LineCodec {
            buffer: BytesMut::with_capacity(max_length.min(4096) + 1),
            max_length,
            discarded: None,
        }
    }

    /// Add received data to the buffer.
    pub fn push(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Try to decode the next line or overlong notice.
    ///
    /// Returns `None` when more data is needed.
    pub fn decode(&mut self) -> Option<LineEvent> {
        loop {
            let Some(end) = self.buffer.iter().position(|&b| is_terminator(b)) else {
                if self.buffer.len() > self.max_length {
                    let dropped = self.buffer.split();
                    self.discarded.get_or_insert_with(Discarded::default).absorb(&dropped);
                }
                return None;
            };

            let line = self.buffer.split_to(end);
            self.skip_terminators();

            if self.discarded.is_some() || line.len() > self.max_length {
                let mut dropped = self.discarded.take().unwrap_or_default();
                dropped.absorb(&line);
                return Some(dropped.into_event());
            }
            if line.is_empty() {
                continue;
            }
            return Some(LineEvent::Line(String::from_utf8_lossy(&line).into_owned()));
        }
    }

    fn skip_terminators(&mut self) {
        let count = self.buffer.iter().take_while(|&&b| is_terminator(b)).count();
        let _ = self.buffer.split_to(count);
    }

    /// Number of buffered bytes.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }
}
