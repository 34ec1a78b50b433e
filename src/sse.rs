//! Incremental Server-Sent-Events decoder.
//!
//! Feed raw bytes as they arrive with [`SseDecoder::push`]; complete event
//! payloads (the joined `data:` lines) come out in arrival order. Bytes are
//! buffered until a full line is available, so multi-byte UTF-8 sequences
//! split across network chunks decode correctly.

/// Stream terminator used by the proxy.
pub const DONE: &str = "[DONE]";

#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    data: Vec<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consumes `bytes` and returns every event completed by them.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);

        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = self.buffer.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            if let Some(event) = self.handle_line(&String::from_utf8_lossy(&line)) {
                events.push(event);
            }
        }
        events
    }

    /// Flushes an event left unterminated when the stream ends.
    pub fn finish(&mut self) -> Option<String> {
        if !self.buffer.is_empty() {
            let line = std::mem::take(&mut self.buffer);
            let line = String::from_utf8_lossy(&line).trim_end_matches('\r').to_string();
            if let Some(event) = self.handle_line(&line) {
                return Some(event);
            }
        }
        self.dispatch()
    }

    fn handle_line(&mut self, line: &str) -> Option<String> {
        if line.is_empty() {
            return self.dispatch();
        }
        // Only `data` matters here; comments, `event`, `id` and `retry` are skipped.
        if let Some(value) = line.strip_prefix("data:") {
            self.data
                .push(value.strip_prefix(' ').unwrap_or(value).to_string());
        }
        None
    }

    fn dispatch(&mut self) -> Option<String> {
        if self.data.is_empty() {
            return None;
        }
        Some(std::mem::take(&mut self.data).join("\n"))
    }
}
