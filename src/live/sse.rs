//! Server-sent events framing.
//!
//! Incremental decoder for `text/event-stream` bodies: chunks may split lines
//! and events anywhere. Only `data`, `event` and `id` fields are kept; comments
//! and `retry` are ignored since a failed stream is never reconnected.

use thiserror::Error;

/// Longest line accepted before the stream is treated as broken.
pub const MAX_LINE_BYTES: usize = 64 * 1024;

/// One dispatched server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamMessage {
    /// `event:` field, if the server named the event.
    pub event: Option<String>,
    /// `id:` field, if present.
    pub id: Option<String>,
    /// Joined `data:` lines.
    pub data: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("event stream line exceeds {limit} bytes")]
pub struct LineTooLong {
    pub limit: usize,
}

#[derive(Debug)]
pub struct SseDecoder {
    pending: Vec<u8>,
    max_line: usize,
    data: Vec<String>,
    event: Option<String>,
    id: Option<String>,
}

impl Default for SseDecoder {
    fn default() -> Self {
        Self::with_max_line(MAX_LINE_BYTES)
    }
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_line(max_line: usize) -> Self {
        Self {
            pending: Vec::new(),
            max_line,
            data: Vec::new(),
            event: None,
            id: None,
        }
    }

    /// Feed a chunk of the body, returning every event completed by it.
    ///
    /// A line longer than the limit yields a trailing `Err`; the partial line
    /// is discarded.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Result<StreamMessage, LineTooLong>> {
        self.pending.extend_from_slice(chunk);
        let mut out = Vec::new();

        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            if pos > self.max_line {
                return self.overflow(out);
            }
            let mut line: Vec<u8> = self.pending.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            let line = String::from_utf8_lossy(&line);
            if let Some(message) = self.process_line(&line) {
                out.push(Ok(message));
            }
        }

        if self.pending.len() > self.max_line {
            return self.overflow(out);
        }
        out
    }

    fn overflow(
        &mut self,
        mut out: Vec<Result<StreamMessage, LineTooLong>>,
    ) -> Vec<Result<StreamMessage, LineTooLong>> {
        self.pending = Vec::new();
        out.push(Err(LineTooLong { limit: self.max_line }));
        out
    }

    fn process_line(&mut self, line: &str) -> Option<StreamMessage> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "data" => self.data.push(value.to_string()),
            "event" => self.event = Some(value.to_string()),
            "id" => self.id = Some(value.to_string()),
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<StreamMessage> {
        let event = self.event.take();
        if self.data.is_empty() {
            return None;
        }
        let data = std::mem::take(&mut self.data).join("\n");
        Some(StreamMessage { event, id: self.id.clone(), data })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(decoder: &mut SseDecoder, chunk: &[u8]) -> Vec<StreamMessage> {
        decoder.feed(chunk).into_iter().map(Result::unwrap).collect()
    }

    #[test]
    fn test_single_event() {
        let mut decoder = SseDecoder::new();
        let messages = feed(&mut decoder, b"data: {\"type\":\"run_started\"}\n\n");
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].data, "{\"type\":\"run_started\"}");
        assert_eq!(messages[0].event, None);
    }

    #[test]
    fn test_event_split_across_chunks() {
        let mut decoder = SseDecoder::new();
        assert!(feed(&mut decoder, b"event: ingest\r\nda").is_empty());
        assert!(feed(&mut decoder, b"ta: {\"n\":1}\r\n").is_empty());
        let messages = feed(&mut decoder, b"\r\n");
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].event.as_deref(), Some("ingest"));
        assert_eq!(messages[0].data, "{\"n\":1}");
    }

    #[test]
    fn test_multiline_data_and_comments() {
        let mut decoder = SseDecoder::new();
        let messages = feed(&mut decoder, b": keepalive\n\ndata: a\ndata: b\nid: 7\n\n");
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].data, "a\nb");
        assert_eq!(messages[0].id.as_deref(), Some("7"));
    }

    #[test]
    fn test_several_events_in_one_chunk_keep_order() {
        let mut decoder = SseDecoder::new();
        let messages = feed(&mut decoder, b"data: 1\n\ndata: 2\n\ndata: 3\n\n");
        let data: Vec<_> = messages.iter().map(|m| m.data.as_str()).collect();
        assert_eq!(data, ["1", "2", "3"]);
    }

    #[test]
    fn test_unterminated_line_over_limit_fails() {
        let mut decoder = SseDecoder::with_max_line(16);
        assert!(decoder.feed(b"data: 0123456789").is_empty());

        let out = decoder.feed(b"abcdef");
        let expected: Vec<Result<StreamMessage, LineTooLong>> = vec![Err(LineTooLong { limit: 16 })];
        assert_eq!(out, expected);
        assert!(decoder.pending.is_empty());
    }

    #[test]
    fn test_completed_events_come_before_overflow() {
        let mut decoder = SseDecoder::with_max_line(16);
        let out = decoder.feed(b"data: ok\n\ndata: aaaaaaaaaaaaaaaaaaaaaa\n\n");

        assert_eq!(out.len(), 2);
        assert_eq!(out[0].as_ref().unwrap().data, "ok");
        assert_eq!(out[1], Err(LineTooLong { limit: 16 }));
    }

    #[test]
    fn test_default_limit() {
        let mut decoder = SseDecoder::new();
        let long = format!("data: {}\n\n", "x".repeat(MAX_LINE_BYTES - 16));
        let out = decoder.feed(long.as_bytes());
        assert_eq!(out.len(), 1);
        assert!(out[0].is_ok());
    }
}
