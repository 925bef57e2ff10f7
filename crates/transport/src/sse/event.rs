//! Server-Sent Events value model, text parser and serializer.
//!
//! The wire format is UTF-8 text: `field: value` lines terminated by `\n`
//! or `\r\n`, one event ended by a blank line. Recognized fields are
//! `event`, `id`, `retry` and `data`; a line starting with `:` is a comment
//! and is kept verbatim as data. No length prefix exists, delimiting relies
//! entirely on the blank line.

use std::fmt;

use thiserror::Error;

/// Field name an event reports when none was set
const DEFAULT_EVENT_TYPE: &str = "message";

/// One server-sent event.
///
/// Immutable once parsed; built incrementally from `field: value` lines.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SseEvent {
    /// Event type; empty means the default `message` type
    pub event_type: String,
    /// Payload, possibly multi-line (joined with `\n`)
    pub data: String,
    pub id: Option<String>,
    /// Reconnection delay hint in milliseconds
    pub retry: Option<u32>,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SseParseError {
    #[error("input contains no event")]
    Empty,

    #[error("input is not valid utf-8")]
    Utf8,
}

impl SseEvent {
    pub fn new<T: Into<String>, D: Into<String>>(event_type: T, data: D) -> Self {
        Self { event_type: event_type.into(), data: data.into(), id: None, retry: None }
    }

    pub fn with_id<I: Into<String>>(mut self, id: I) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_retry(mut self, retry_ms: u32) -> Self {
        self.retry = Some(retry_ms);
        self
    }

    /// The event type, defaulting to `message` when none was set.
    pub fn event_type_or_default(&self) -> &str {
        if self.event_type.is_empty() { DEFAULT_EVENT_TYPE } else { &self.event_type }
    }

    /// Parses the entire input as one event, ignoring blank lines.
    pub fn parse(input: &[u8]) -> Result<SseEvent, SseParseError> {
        let text = str::from_utf8(input).map_err(|_| SseParseError::Utf8)?;

        let mut builder = EventBuilder::new();
        for line in lines(text) {
            builder.feed(line);
        }
        builder.finish().ok_or(SseParseError::Empty)
    }

    /// Parses a blank-line delimited sequence of events.
    ///
    /// Unterminated trailing fields still yield a final event, so input cut
    /// off before the last blank line is not silently dropped.
    pub fn parse_stream(input: &[u8]) -> Result<Vec<SseEvent>, SseParseError> {
        let text = str::from_utf8(input).map_err(|_| SseParseError::Utf8)?;

        let mut events = Vec::new();
        let mut builder = EventBuilder::new();
        for line in lines(text) {
            if line.is_empty() {
                if let Some(event) = builder.finish() {
                    events.push(event);
                }
                builder = EventBuilder::new();
            } else {
                builder.feed(line);
            }
        }
        if let Some(event) = builder.finish() {
            events.push(event);
        }
        Ok(events)
    }

    /// Serializes the event in wire form, blank-line terminated.
    pub fn serialize(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for SseEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.event_type.is_empty() {
            writeln!(f, "event: {}", self.event_type)?;
        }
        if let Some(id) = &self.id {
            writeln!(f, "id: {id}")?;
        }
        if let Some(retry) = &self.retry {
            writeln!(f, "retry: {retry}")?;
        }
        for line in self.data.split('\n') {
            writeln!(f, "data: {line}")?;
        }
        writeln!(f)
    }
}

/// Splits on `\n` and strips a trailing `\r` per line, so `\r\n` terminated
/// input parses identically. A trailing newline does not produce a phantom
/// empty line.
fn lines(text: &str) -> impl Iterator<Item = &str> {
    let text = text.strip_suffix('\n').unwrap_or(text);
    text.split('\n').map(|line| line.strip_suffix('\r').unwrap_or(line))
}

/// Accumulates `field: value` lines into one event.
struct EventBuilder {
    event_type: String,
    data_lines: Vec<String>,
    id: Option<String>,
    retry: Option<u32>,
    seen_field: bool,
}

impl EventBuilder {
    fn new() -> Self {
        Self { event_type: String::new(), data_lines: Vec::new(), id: None, retry: None, seen_field: false }
    }

    fn feed(&mut self, line: &str) {
        if line.is_empty() {
            return;
        }
        // Comment lines are carried verbatim as data
        if line.starts_with(':') {
            self.seen_field = true;
            self.data_lines.push(line.to_owned());
            return;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            // A line without a colon is a field with an empty value
            None => (line, ""),
        };

        self.seen_field = true;
        match field {
            "event" => self.event_type = value.to_owned(),
            "id" => self.id = Some(value.to_owned()),
            // Malformed retry values are dropped, not an error
            "retry" => self.retry = value.parse().ok().or(self.retry),
            "data" => self.data_lines.push(value.to_owned()),
            // Unknown fields are ignored per the SSE processing model
            _ => {}
        }
    }

    fn finish(self) -> Option<SseEvent> {
        if !self.seen_field {
            return None;
        }
        Some(SseEvent {
            event_type: self.event_type,
            data: self.data_lines.join("\n"),
            id: self.id,
            retry: self.retry,
        })
    }
}
