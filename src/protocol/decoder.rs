//! Incremental framing of the streamed response body.
//!
//! [`StreamDecoder`] consumes raw byte chunks as they arrive and yields
//! complete line-delimited records. A record split across chunk boundaries
//! is buffered until its terminator arrives; a chunk carrying several
//! records yields them all at once. Malformed lines are logged and skipped
//! so one corrupt record cannot lose the remainder of the answer.

use super::event::StreamEvent;
use tracing::{debug, warn};

/// Incremental newline-delimited record decoder.
///
/// Feed chunks of bytes via [`push`](Self::push) and collect emitted events.
/// Call [`finish`](Self::finish) when the upstream signals end-of-stream.
#[derive(Debug, Default)]
pub struct StreamDecoder {
    line_buffer: String,
}

impl StreamDecoder {
    /// Create a new decoder for one response stream.
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a chunk of bytes into the decoder.
    ///
    /// Returns every complete record framed by this chunk, in stream order.
    /// Empty and whitespace-only lines are skipped; lines that fail to parse
    /// are skipped with a warning.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        let text = String::from_utf8_lossy(chunk);
        let mut events = Vec::new();

        for ch in text.chars() {
            if ch == '\n' {
                let line = std::mem::take(&mut self.line_buffer);
                // Handle \r\n by stripping trailing \r
                let line = line.strip_suffix('\r').unwrap_or(&line);
                if line.trim().is_empty() {
                    continue;
                }
                match StreamEvent::parse(line) {
                    Ok(event) => events.push(event),
                    Err(e) => warn!(%e, "skipping malformed record"),
                }
            } else {
                self.line_buffer.push(ch);
            }
        }

        events
    }

    /// Signal end-of-stream.
    ///
    /// A buffered partial line at this point means the transmission was
    /// truncated mid-record; it is discarded rather than parsed. Returns
    /// `true` if anything was discarded.
    pub fn finish(&mut self) -> bool {
        let discarded = !self.line_buffer.trim().is_empty();
        if discarded {
            debug!(
                len = self.line_buffer.len(),
                "discarding partial record at end of stream"
            );
        }
        self.line_buffer.clear();
        discarded
    }
}
