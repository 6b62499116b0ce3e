// Server-sent events decoder.
//
// Incremental parser for the `text/event-stream` format. Bytes arrive in
// arbitrary chunks from the HTTP body; this module provides:
//
// - `SseFrame` for a dispatched event
// - `SseDecoder::feed()` turning a chunk into zero or more frames
// - `parse_field()` for a single field line
//
// Line endings may be LF, CRLF or CR, and a CRLF pair may be split across
// two chunks. Lines are decoded as UTF-8 only once complete, so multi-byte
// characters split across chunks survive. A line longer than
// `MAX_LINE_BYTES` is dropped whole.

use tracing::warn;

/// Longest line kept in memory while waiting for its terminator.
pub const MAX_LINE_BYTES: usize = 1 << 20;

/// Event type used when a frame carries no `event:` field.
pub const DEFAULT_EVENT_TYPE: &str = "message";

/// One dispatched server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    /// Event type (`message` unless the server named one).
    pub event: String,
    /// Data lines joined with `\n`.
    pub data: String,
    /// Last event id in effect when the frame was dispatched.
    pub id: Option<String>,
}

impl SseFrame {
    /// Whether an EventSource `onmessage` handler would receive this frame.
    pub fn is_message(&self) -> bool {
        self.event == DEFAULT_EVENT_TYPE
    }
}

/// A parsed `field: value` line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field<'a> {
    Data(&'a str),
    Event(&'a str),
    Id(&'a str),
    Retry(&'a str),
    /// Line starting with `:`.
    Comment,
    /// Unrecognized field name; ignored by the decoder.
    Unknown,
}

/// Split a non-empty line into its field. A single space after the colon is
/// not part of the value.
pub fn parse_field(line: &str) -> Field<'_> {
    if line.starts_with(':') {
        return Field::Comment;
    }

    let (name, value) = match line.find(':') {
        Some(pos) => {
            let value = &line[pos + 1..];
            (&line[..pos], value.strip_prefix(' ').unwrap_or(value))
        }
        None => (line, ""),
    };

    match name {
        "data" => Field::Data(value),
        "event" => Field::Event(value),
        "id" => Field::Id(value),
        "retry" => Field::Retry(value),
        _ => Field::Unknown,
    }
}

/// Incremental `text/event-stream` decoder.
#[derive(Debug, Default)]
pub struct SseDecoder {
    /// Bytes of the current, not yet terminated line.
    line: Vec<u8>,
    /// Previous chunk ended on `\r`; a leading `\n` belongs to that break.
    skip_lf: bool,
    /// Still looking at the very first bytes of the stream (BOM check).
    at_start: bool,
    /// Current line exceeded `MAX_LINE_BYTES`; drop bytes until its end.
    overlong: bool,
    data: String,
    event: String,
    has_data: bool,
    last_id: Option<String>,
}

const BOM: &[u8] = b"\xEF\xBB\xBF";

impl SseDecoder {
    pub fn new() -> Self {
        Self {
            at_start: true,
            ..Self::default()
        }
    }

    /// Feed one body chunk and collect every frame it completes.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        let mut frames = Vec::new();
        // An empty read must not consume a pending CR's line feed.
        if chunk.is_empty() {
            return frames;
        }
        let mut bytes = chunk;

        if self.at_start {
            self.line.extend_from_slice(bytes);
            if self.line.len() < BOM.len() && BOM.starts_with(&self.line) {
                // Could still become a BOM; wait for more bytes.
                return frames;
            }
            self.at_start = false;
            let pending = std::mem::take(&mut self.line);
            let rest = pending.strip_prefix(BOM).unwrap_or(&pending);
            return self.feed_bytes(rest, frames);
        }

        if self.skip_lf {
            self.skip_lf = false;
            if let Some(rest) = bytes.strip_prefix(b"\n") {
                bytes = rest;
            }
        }

        self.feed_bytes(bytes, frames)
    }

    fn feed_bytes(&mut self, bytes: &[u8], mut frames: Vec<SseFrame>) -> Vec<SseFrame> {
        let mut i = 0;
        while i < bytes.len() {
            match bytes[i] {
                b'\n' => {
                    self.terminate_line(&mut frames);
                    i += 1;
                }
                b'\r' => {
                    self.terminate_line(&mut frames);
                    if i + 1 < bytes.len() {
                        if bytes[i + 1] == b'\n' {
                            i += 1;
                        }
                    } else {
                        self.skip_lf = true;
                    }
                    i += 1;
                }
                b => {
                    if !self.overlong {
                        if self.line.len() < MAX_LINE_BYTES {
                            self.line.push(b);
                        } else {
                            warn!(limit = MAX_LINE_BYTES, "dropping overlong event-stream line");
                            self.line = Vec::new();
                            self.overlong = true;
                        }
                    }
                    i += 1;
                }
            }
        }
        frames
    }

    fn terminate_line(&mut self, frames: &mut Vec<SseFrame>) {
        if self.overlong {
            self.overlong = false;
            return;
        }
        self.end_line(frames);
    }

    fn end_line(&mut self, frames: &mut Vec<SseFrame>) {
        let raw = std::mem::take(&mut self.line);
        let line = String::from_utf8_lossy(&raw);

        if line.is_empty() {
            if let Some(frame) = self.dispatch() {
                frames.push(frame);
            }
            return;
        }

        match parse_field(&line) {
            Field::Data(value) => {
                self.data.push_str(value);
                self.data.push('\n');
                self.has_data = true;
            }
            Field::Event(value) => self.event = value.to_owned(),
            Field::Id(value) => {
                if !value.contains('\0') {
                    self.last_id = Some(value.to_owned());
                }
            }
            // No reconnect, so the announced delay has no use.
            Field::Retry(_) | Field::Comment | Field::Unknown => {}
        }
    }

    fn dispatch(&mut self) -> Option<SseFrame> {
        let event = std::mem::take(&mut self.event);
        if !self.has_data {
            return None;
        }
        self.has_data = false;

        let mut data = std::mem::take(&mut self.data);
        if data.ends_with('\n') {
            data.pop();
        }

        Some(SseFrame {
            event: if event.is_empty() {
                DEFAULT_EVENT_TYPE.to_owned()
            } else {
                event
            },
            data,
            id: self.last_id.clone(),
        })
    }

    /// End of stream. An event without its terminating blank line is
    /// discarded, as browsers do.
    pub fn finish(&mut self) {
        self.line.clear();
        self.data.clear();
        self.event.clear();
        self.has_data = false;
        self.skip_lf = false;
        self.overlong = false;
    }
}
