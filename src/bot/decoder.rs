//! Incremental decoder for `data: …` event streams.
//!
//! The transport delivers byte buffers; each buffer holds zero or more
//! whole newline-delimited records:
//!
//! ```text
//! data: {"choices":[{"delta":{"content":"Hel"}}]}
//! data: {"choices":[{"delta":{"content":"lo"}}]}
//!
//! data: [DONE]
//! ```
//!
//! [`StreamDecoder`] is a push-driven state machine: every call to
//! [`StreamDecoder::feed`] reports the text of that buffer as one chunk to a
//! [`StreamSink`], and the terminal token triggers exactly one completion.

use serde_json::Value;
use tracing::{trace, warn};

use super::request::WireShape;

/// Record prefix stripped from each line.
pub const DATA_PREFIX: &str = "data: ";
/// Literal marking the end of the stream.
pub const TERMINAL_TOKEN: &str = "[DONE]";

/// Pulls the text fragment out of one parsed record.
pub type Extractor = fn(&Value) -> Option<&str>;

/// Extracts `choices[0].text` (legacy completion records).
pub fn completion_text(record: &Value) -> Option<&str> {
    record.pointer("/choices/0/text")?.as_str()
}

/// Extracts `choices[0].delta.content` (chat records).
pub fn chat_delta_text(record: &Value) -> Option<&str> {
    record.pointer("/choices/0/delta/content")?.as_str()
}

impl WireShape {
    /// Extractor matching this wire shape.
    #[must_use]
    pub fn extractor(self) -> Extractor {
        match self {
            Self::Completion => completion_text,
            Self::Chat => chat_delta_text,
        }
    }
}

/// Receives decoder notifications.
///
/// Both methods run on the task that feeds the decoder, so they must not
/// block for long.
pub trait StreamSink {
    /// Called with the text decoded from one buffer.
    fn on_chunk(&mut self, chunk: &str);

    /// Called once, with the full text, when the terminal token arrives.
    fn on_complete(&mut self, full_text: &str) {
        let _ = full_text;
    }
}

/// Sink that discards everything.
#[derive(Debug, Default)]
pub struct NullSink;

impl StreamSink for NullSink {
    fn on_chunk(&mut self, _chunk: &str) {}
}

/// Result of feeding one buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeStatus {
    /// More data is expected.
    Streaming,
    /// The terminal token has been seen.
    Done,
}

impl DecodeStatus {
    /// Returns true once the stream has completed.
    #[must_use]
    pub const fn is_done(self) -> bool {
        matches!(self, Self::Done)
    }
}

/// Push-based decoder over a stream of byte buffers.
#[derive(Debug)]
pub struct StreamDecoder {
    extract: Extractor,
    text: String,
    done: bool,
    skipped: usize,
}

impl StreamDecoder {
    /// Creates a decoder with a custom extractor.
    #[must_use]
    pub const fn new(extract: Extractor) -> Self {
        Self {
            extract,
            text: String::new(),
            done: false,
            skipped: 0,
        }
    }

    /// Creates a decoder for the given wire shape.
    #[must_use]
    pub fn for_shape(shape: WireShape) -> Self {
        Self::new(shape.extractor())
    }

    /// Decodes one buffer, notifying `sink`.
    ///
    /// Buffers fed after completion are ignored.
    pub fn feed<S: StreamSink + ?Sized>(&mut self, buffer: &[u8], sink: &mut S) -> DecodeStatus {
        if self.done {
            return DecodeStatus::Done;
        }

        let data = String::from_utf8_lossy(buffer);
        let mut batch = String::new();

        for line in data.split('\n') {
            let line = line.trim_end_matches('\r');
            if line.is_empty() {
                continue;
            }
            let payload = line.strip_prefix(DATA_PREFIX).unwrap_or(line);

            if payload == TERMINAL_TOKEN {
                if !batch.is_empty() {
                    sink.on_chunk(&batch);
                }
                self.done = true;
                trace!(len = self.text.len(), "stream complete");
                sink.on_complete(&self.text);
                return DecodeStatus::Done;
            }

            match serde_json::from_str::<Value>(payload) {
                Ok(record) => {
                    if let Some(fragment) = (self.extract)(&record) {
                        batch.push_str(fragment);
                        self.text.push_str(fragment);
                    }
                }
                Err(e) => {
                    self.skipped += 1;
                    warn!(error = %e, record = payload, "skipping malformed stream record");
                }
            }
        }

        if !batch.is_empty() {
            sink.on_chunk(&batch);
        }
        DecodeStatus::Streaming
    }

    /// Returns true once the terminal token has been seen.
    #[must_use]
    pub const fn is_done(&self) -> bool {
        self.done
    }

    /// Text decoded so far.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Number of records skipped because they were not valid JSON.
    #[must_use]
    pub const fn skipped(&self) -> usize {
        self.skipped
    }

    /// Consumes the decoder, returning the decoded text.
    #[must_use]
    pub fn into_text(self) -> String {
        self.text
    }
}
