//! Server-Sent Events Wire Parser
//!
//! Incremental parser for the `text/event-stream` format shared by the
//! HTTP+SSE and Streamable HTTP bindings. Bytes are fed in as they
//! arrive from the network; complete events come out. Partial lines,
//! including multi-byte UTF-8 sequences split across chunks, are held
//! until their terminator arrives.
//!
//! The recognized fields are `event:`, `data:`, and `id:`; comment
//! lines (leading `:`) and unknown fields are ignored, and both `\n`
//! and `\r\n` terminators are accepted.

// Layer 1: Standard library imports
// (none)

// Layer 2: Third-party crate imports
use bytes::BytesMut;

// Layer 3: Internal module imports
// (none)

/// One parsed SSE event
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SseEvent {
    /// Event id, when the stream is resumable
    pub id: Option<String>,
    /// Event name; `None` means the default `message` event
    pub event: Option<String>,
    /// Event payload; multi-line data is joined with `\n`
    pub data: String,
}

impl SseEvent {
    /// The effective event name (`message` when unnamed)
    pub fn name(&self) -> &str {
        self.event.as_deref().unwrap_or("message")
    }
}

/// Incremental SSE parser
///
/// # Examples
///
/// ```rust
/// use conduit_mcp::transport::SseParser;
///
/// let mut parser = SseParser::new();
/// let events = parser.feed(b"event: endpoint\ndata: /messages?id=1\n\n");
/// assert_eq!(events.len(), 1);
/// assert_eq!(events[0].name(), "endpoint");
/// assert_eq!(events[0].data, "/messages?id=1");
/// ```
#[derive(Debug, Default)]
pub struct SseParser {
    /// Unconsumed bytes, ending mid-line or mid-character
    buffer: BytesMut,
    /// Fields of the event currently being assembled
    pending: PendingEvent,
}

#[derive(Debug, Default)]
struct PendingEvent {
    id: Option<String>,
    event: Option<String>,
    data_lines: Vec<String>,
}

impl PendingEvent {
    fn is_empty(&self) -> bool {
        self.id.is_none() && self.event.is_none() && self.data_lines.is_empty()
    }

    fn take(&mut self) -> SseEvent {
        SseEvent {
            id: self.id.take(),
            event: self.event.take(),
            data: std::mem::take(&mut self.data_lines).join("\n"),
        }
    }
}

impl SseParser {
    /// Create an empty parser
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes; returns every event completed by this chunk
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(bytes);
        let mut events = Vec::new();

        while let Some(newline) = self.buffer.iter().position(|b| *b == b'\n') {
            let mut line = self.buffer.split_to(newline + 1);
            // Drop the terminator, tolerating \r\n.
            line.truncate(newline);
            if line.last() == Some(&b'\r') {
                line.truncate(line.len() - 1);
            }

            let Ok(line) = std::str::from_utf8(&line) else {
                // Lines are complete here, so invalid UTF-8 is genuine
                // garbage; skip the line rather than poisoning the stream.
                continue;
            };

            if line.is_empty() {
                if !self.pending.is_empty() {
                    events.push(self.pending.take());
                }
                continue;
            }
            if line.starts_with(':') {
                continue;
            }

            let (field, value) = match line.split_once(':') {
                Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
                None => (line, ""),
            };

            match field {
                "event" => self.pending.event = Some(value.to_string()),
                "data" => self.pending.data_lines.push(value.to_string()),
                "id" => self.pending.id = Some(value.to_string()),
                _ => {}
            }
        }

        events
    }
}

/// Render one event in wire format (server side)
pub fn format_event(event: &SseEvent) -> String {
    let mut out = String::new();
    if let Some(id) = &event.id {
        out.push_str("id: ");
        out.push_str(id);
        out.push('\n');
    }
    if let Some(name) = &event.event {
        out.push_str("event: ");
        out.push_str(name);
        out.push('\n');
    }
    for line in event.data.split('\n') {
        out.push_str("data: ");
        out.push_str(line);
        out.push('\n');
    }
    out.push('\n');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_complete_event() {
        let mut parser = SseParser::new();
        let events = parser.feed(b"id: 3\nevent: message\ndata: {\"x\":1}\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].id.as_deref(), Some("3"));
        assert_eq!(events[0].name(), "message");
        assert_eq!(events[0].data, r#"{"x":1}"#);
    }

    #[test]
    fn default_event_name_is_message() {
        let mut parser = SseParser::new();
        let events = parser.feed(b"data: payload\n\n");
        assert_eq!(events[0].name(), "message");
    }

    #[test]
    fn handles_split_chunks() {
        let mut parser = SseParser::new();
        assert!(parser.feed(b"data: hel").is_empty());
        assert!(parser.feed(b"lo\n").is_empty());
        let events = parser.feed(b"\n");
        assert_eq!(events[0].data, "hello");
    }

    #[test]
    fn handles_byte_at_a_time_multibyte() {
        let mut parser = SseParser::new();
        let wire = "data: €10\n\n".as_bytes();
        let mut events = Vec::new();
        for byte in wire {
            events.extend(parser.feed(&[*byte]));
        }
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "€10");
    }

    #[test]
    fn joins_multi_line_data() {
        let mut parser = SseParser::new();
        let events = parser.feed(b"data: line1\ndata: line2\n\n");
        assert_eq!(events[0].data, "line1\nline2");
    }

    #[test]
    fn skips_comments_and_tolerates_crlf() {
        let mut parser = SseParser::new();
        let events = parser.feed(b": keep-alive\r\nevent: endpoint\r\ndata: /post\r\n\r\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].name(), "endpoint");
        assert_eq!(events[0].data, "/post");
    }

    #[test]
    fn multiple_events_in_one_chunk() {
        let mut parser = SseParser::new();
        let events = parser.feed(b"id: 1\ndata: a\n\nid: 2\ndata: b\n\n");
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].id.as_deref(), Some("2"));
    }

    #[test]
    fn format_round_trip() {
        let event = SseEvent {
            id: Some("7".to_string()),
            event: Some("message".to_string()),
            data: "{\"jsonrpc\":\"2.0\"}".to_string(),
        };
        let wire = format_event(&event);
        let mut parser = SseParser::new();
        let parsed = parser.feed(wire.as_bytes());
        assert_eq!(parsed, vec![event]);
    }
}
