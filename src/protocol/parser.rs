//! Incremental newline-delimited JSON decoder.
//!
//! Tolerant reader: a malformed or unrecognizable line is dropped and decoding
//! continues with the next one. The parser never fails.

use super::events::AgentEvent;

/// Splits a byte stream into lines and decodes each into an [`AgentEvent`].
///
/// Bytes after the last `\n` are kept until the next [`feed`](Self::feed) or
/// until [`flush`](Self::flush) is called at end of stream.
#[derive(Debug, Default)]
pub struct EventLineParser {
    pending: Vec<u8>,
}

impl EventLineParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `chunk` and decode every line it completes.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<AgentEvent> {
        self.pending.extend_from_slice(chunk);

        let Some(last_newline) = self.pending.iter().rposition(|&b| b == b'\n') else {
            return Vec::new();
        };

        let rest = self.pending.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.pending, rest);

        complete
            .split(|&b| b == b'\n')
            .filter_map(decode_line)
            .collect()
    }

    /// Decode whatever remains buffered as a final, unterminated line.
    pub fn flush(&mut self) -> Option<AgentEvent> {
        let remaining = std::mem::take(&mut self.pending);
        decode_line(&remaining)
    }

    /// Number of bytes waiting for a line terminator.
    pub fn buffered_len(&self) -> usize {
        self.pending.len()
    }
}

fn decode_line(line: &[u8]) -> Option<AgentEvent> {
    let line = line.trim_ascii();
    if line.is_empty() {
        return None;
    }
    match serde_json::from_slice::<AgentEvent>(line) {
        Ok(event) => Some(event),
        Err(e) => {
            tracing::trace!(error = %e, line = %String::from_utf8_lossy(line), "Dropping undecodable event line");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STREAM: &str = "{\"type\":\"message_end\"}\n{garbled\n{\"type\":\"agent_end\"}\n";

    #[test]
    fn malformed_line_is_dropped_for_every_split_point() {
        let bytes = STREAM.as_bytes();
        for split in 0..=bytes.len() {
            let mut parser = EventLineParser::new();
            let mut events = parser.feed(&bytes[..split]);
            events.extend(parser.feed(&bytes[split..]));
            events.extend(parser.flush());

            assert_eq!(
                events,
                vec![AgentEvent::MessageEnd { message: None }, AgentEvent::AgentEnd],
                "split at byte {split}"
            );
        }
    }

    #[test]
    fn partial_line_waits_for_terminator() {
        let mut parser = EventLineParser::new();
        assert!(parser.feed(b"{\"type\":\"agent").is_empty());
        assert_eq!(parser.buffered_len(), 14);
        assert_eq!(parser.feed(b"_end\"}\n"), vec![AgentEvent::AgentEnd]);
        assert_eq!(parser.buffered_len(), 0);
    }

    #[test]
    fn flush_decodes_unterminated_final_line() {
        let mut parser = EventLineParser::new();
        assert!(parser.feed(b"{\"type\":\"agent_end\"}").is_empty());
        assert_eq!(parser.flush(), Some(AgentEvent::AgentEnd));
        assert_eq!(parser.flush(), None);
    }

    #[test]
    fn blank_and_crlf_lines_are_handled() {
        let mut parser = EventLineParser::new();
        let events = parser.feed(b"\n   \n{\"type\":\"agent_end\"}\r\n");
        assert_eq!(events, vec![AgentEvent::AgentEnd]);
    }

    #[test]
    fn string_content_and_null_tool_name_are_kept() {
        let mut parser = EventLineParser::new();
        let events = parser.feed(
            b"{\"type\":\"message_end\",\"message\":{\"role\":\"user\",\"content\":\"plain string prompt\"}}\n\
              {\"type\":\"tool_execution_start\",\"toolName\":null,\"args\":{}}\n",
        );

        assert_eq!(events.len(), 2);
        let AgentEvent::MessageEnd { message: Some(message) } = &events[0] else {
            panic!("expected message_end, got {:?}", events[0]);
        };
        assert_eq!(message.first_text(), Some("plain string prompt"));
        assert!(matches!(
            &events[1],
            AgentEvent::ToolExecutionStart { tool_name: None, .. }
        ));
    }

    #[test]
    fn non_object_json_and_unknown_types() {
        let mut parser = EventLineParser::new();
        let events = parser.feed(b"42\n\"text\"\n{\"no_type\":1}\n{\"type\":\"turn_end\"}\n");
        assert_eq!(events, vec![AgentEvent::Unknown]);
    }
}
