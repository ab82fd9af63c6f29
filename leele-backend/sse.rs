//! Line framing for `text/event-stream` bodies.
//!
//! Network reads do not respect line boundaries, so both the provider stream
//! reader and the `ask` client push raw chunks into a [`LineBuffer`] and only
//! act on complete lines. A multi-byte UTF-8 character split across two reads
//! is held back until its line is complete.

/// Accumulates raw bytes and yields complete `\n`-terminated lines.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every line it completed, without the
    /// trailing `\n` / `\r\n`.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let mut line: Vec<u8> = self.pending.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            lines.push(String::from_utf8_lossy(&line).into_owned());
        }
        lines
    }

    /// Flush whatever is left once the body has ended.
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.pending);
        Some(String::from_utf8_lossy(&rest).into_owned())
    }
}

/// The payload of a `data:` line, or `None` for comments, event names and blanks.
pub fn data_payload(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(str::trim)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_line_is_carried_over() {
        let mut buf = LineBuffer::new();
        assert!(buf.push(b"data: {\"a\"").is_empty());
        let lines = buf.push(b":1}\n\ndata: x");
        assert_eq!(lines, vec!["data: {\"a\":1}".to_string(), String::new()]);
        assert_eq!(buf.finish().as_deref(), Some("data: x"));
        assert!(buf.finish().is_none());
    }

    #[test]
    fn test_crlf_is_stripped() {
        let mut buf = LineBuffer::new();
        assert_eq!(buf.push(b"data: one\r\n"), vec!["data: one".to_string()]);
    }

    #[test]
    fn test_split_utf8_character_survives() {
        let text = "data: caf\u{e9}\n";
        let bytes = text.as_bytes();
        // split inside the two-byte encoding of 'é'
        let split = bytes.len() - 2;
        let mut buf = LineBuffer::new();
        assert!(buf.push(&bytes[..split]).is_empty());
        assert_eq!(buf.push(&bytes[split..]), vec!["data: caf\u{e9}".to_string()]);
    }

    #[test]
    fn test_data_payload() {
        assert_eq!(data_payload("data: [DONE]"), Some("[DONE]"));
        assert_eq!(data_payload("data:{}"), Some("{}"));
        assert_eq!(data_payload(": keep-alive"), None);
        assert_eq!(data_payload("event: done"), None);
        assert_eq!(data_payload(""), None);
    }
}
