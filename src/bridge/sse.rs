//! Server-Sent Events framing for agent output.

use super::process::AgentEvent;

/// One decoded SSE message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseMessage {
    /// `event:` field; `None` means the default `message` event.
    pub event: Option<String>,
    pub data: String,
}

impl SseMessage {
    pub fn is(&self, event: &str) -> bool {
        self.event.as_deref() == Some(event)
    }
}

/// Frame an agent event for the wire.
pub fn encode(event: &AgentEvent) -> String {
    match event {
        AgentEvent::Line(line) => format!("data: {line}\n\n"),
        AgentEvent::Exit { code } => format!(
            "event: done\ndata: {}\n\n",
            serde_json::json!({ "exit_code": code })
        ),
        AgentEvent::TimedOut => format!(
            "event: error\ndata: {}\n\n",
            serde_json::json!({ "error": "Agent process timed out" })
        ),
    }
}

/// Incremental decoder; feed it raw body chunks as they arrive.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buf: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) -> Vec<SseMessage> {
        self.buf.extend_from_slice(bytes);
        let mut out = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.buf.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_end_matches(['\n', '\r']);

            if line.is_empty() {
                if let Some(msg) = self.take() {
                    out.push(msg);
                }
                continue;
            }
            if line.starts_with(':') {
                continue;
            }
            let (field, value) = match line.split_once(':') {
                Some((f, v)) => (f, v.strip_prefix(' ').unwrap_or(v)),
                None => (line, ""),
            };
            match field {
                "event" => self.event = Some(value.to_string()),
                "data" => self.data.push(value.to_string()),
                _ => {}
            }
        }
        out
    }

    /// Flush a trailing message that was not terminated by a blank line.
    pub fn finish(&mut self) -> Option<SseMessage> {
        if !self.buf.is_empty() {
            // Terminates the pending field line; cannot complete a message by itself.
            self.push(b"\n");
        }
        self.take()
    }

    fn take(&mut self) -> Option<SseMessage> {
        if self.data.is_empty() && self.event.is_none() {
            return None;
        }
        Some(SseMessage {
            event: self.event.take(),
            data: std::mem::take(&mut self.data).join("\n"),
        })
    }
}
