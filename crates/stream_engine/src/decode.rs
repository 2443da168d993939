use encoding_rs::{CoderResult, Decoder, UTF_8};
use serde_json::Value;

use engine_logging::{engine_debug, engine_warn};
use stream_core::StreamFrame;

/// Default bound on a single buffered record.
pub const DEFAULT_MAX_RECORD_BYTES: usize = 1_048_576;

/// How records are recognised inside the decoded text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Framing {
    /// Marker a line must start with to carry a record. One space after the
    /// marker is optional.
    pub prefix: String,
    /// Record body (or bare line) that marks the graceful end of the stream.
    pub sentinel: Option<String>,
    /// JSON field naming the frame kind.
    pub kind_field: String,
    pub max_record_bytes: usize,
}

impl Default for Framing {
    fn default() -> Self {
        Self {
            prefix: "data:".to_string(),
            sentinel: Some("[DONE]".to_string()),
            kind_field: "type".to_string(),
            max_record_bytes: DEFAULT_MAX_RECORD_BYTES,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    Frame(StreamFrame),
    /// The end sentinel was seen; nothing after it is decoded.
    Sentinel,
    /// End of input. Any incomplete trailing fragment was discarded.
    Closed,
    Failed(DecodeError),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("record exceeds {limit} bytes without a delimiter ({buffered} buffered)")]
    RecordTooLarge { limit: usize, buffered: usize },
}

enum Line {
    Ignored,
    Sentinel,
    Frame(StreamFrame),
}

/// Incremental newline-delimited record decoder.
///
/// Bytes are decoded as UTF-8 with a streaming decoder, so a chunk boundary
/// inside a multibyte character produces the same text as an unsplit stream.
/// Complete lines are turned into frames in delimiter order; the trailing
/// incomplete line is carried over to the next [`FrameDecoder::push`].
pub struct FrameDecoder {
    framing: Framing,
    utf8: Decoder,
    carry: String,
    finished: bool,
}

impl FrameDecoder {
    pub fn new(framing: Framing) -> Self {
        Self {
            framing,
            utf8: UTF_8.new_decoder_with_bom_removal(),
            carry: String::new(),
            finished: false,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Feeds one chunk and returns every record it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Decoded> {
        if self.finished {
            return Vec::new();
        }
        self.decode_into_carry(chunk, false);
        let mut out = self.drain_lines();
        if !self.finished && self.carry.len() > self.framing.max_record_bytes {
            let err = DecodeError::RecordTooLarge {
                limit: self.framing.max_record_bytes,
                buffered: self.carry.len(),
            };
            engine_warn!("Stream decoder overflow: {}", err);
            self.finished = true;
            self.carry.clear();
            out.push(Decoded::Failed(err));
        }
        out
    }

    /// Signals end of input. The carried fragment is dropped unless it is
    /// exactly the sentinel.
    pub fn finish(&mut self) -> Vec<Decoded> {
        let mut out = Vec::with_capacity(2);
        if !self.finished {
            self.decode_into_carry(&[], true);
            let fragment = std::mem::take(&mut self.carry);
            let fragment = fragment.trim_end_matches('\r');
            if !fragment.is_empty() {
                if let Line::Sentinel = self.classify_line(fragment) {
                    out.push(Decoded::Sentinel);
                } else {
                    engine_debug!(
                        "Discarding {} byte incomplete record at end of stream",
                        fragment.len()
                    );
                }
            }
        }
        self.finished = true;
        self.carry.clear();
        out.push(Decoded::Closed);
        out
    }

    fn decode_into_carry(&mut self, mut bytes: &[u8], last: bool) {
        loop {
            let needed = self
                .utf8
                .max_utf8_buffer_length(bytes.len())
                .unwrap_or(bytes.len().saturating_mul(3))
                .max(4);
            self.carry.reserve(needed);
            let (result, read, _had_replacements) =
                self.utf8.decode_to_string(bytes, &mut self.carry, last);
            bytes = &bytes[read..];
            match result {
                CoderResult::InputEmpty => break,
                CoderResult::OutputFull => continue,
            }
        }
    }

    fn drain_lines(&mut self) -> Vec<Decoded> {
        let mut out = Vec::new();
        let mut consumed = 0;
        while let Some(offset) = self.carry[consumed..].find('\n') {
            let end = consumed + offset;
            let line = self.carry[consumed..end].trim_end_matches('\r');
            consumed = end + 1;
            match self.classify_line(line) {
                Line::Ignored => {}
                Line::Frame(frame) => out.push(Decoded::Frame(frame)),
                Line::Sentinel => {
                    self.finished = true;
                    out.push(Decoded::Sentinel);
                    break;
                }
            }
        }
        if self.finished {
            self.carry.clear();
        } else {
            self.carry.drain(..consumed);
        }
        out
    }

    fn classify_line(&self, line: &str) -> Line {
        if self.is_sentinel(line) {
            return Line::Sentinel;
        }
        let Some(body) = line.strip_prefix(self.framing.prefix.as_str()) else {
            return Line::Ignored;
        };
        let body = body.strip_prefix(' ').unwrap_or(body);
        if self.is_sentinel(body) {
            return Line::Sentinel;
        }
        Line::Frame(self.frame_from_body(body))
    }

    fn is_sentinel(&self, text: &str) -> bool {
        self.framing
            .sentinel
            .as_deref()
            .is_some_and(|sentinel| text.trim() == sentinel)
    }

    fn frame_from_body(&self, body: &str) -> StreamFrame {
        if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(body) {
            let kind = map
                .get(&self.framing.kind_field)
                .and_then(Value::as_str)
                .map(str::to_owned);
            if let Some(kind) = kind {
                return StreamFrame::new(kind, Value::Object(map));
            }
        }
        engine_warn!("Malformed stream record shown as text ({} bytes)", body.len());
        StreamFrame::fallback_text(body)
    }
}
