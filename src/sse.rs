//! Server-sent event helpers shared by the LLM stream, peer invocations and the CLI.
//!
//! Network chunks do not respect line boundaries, so [`SseLineBuffer`] keeps
//! the trailing partial line between pushes and only yields complete `data:`
//! payloads.

use serde_json::Value;

/// Accumulates raw bytes and yields the payload of each complete `data:` line.
#[derive(Debug, Default)]
pub struct SseLineBuffer {
    pending: Vec<u8>,
}

impl SseLineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one network chunk; returns the `data:` payloads it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);
        let mut out = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            if let Some(data) = data_payload(&line) {
                out.push(data.to_string());
            }
        }
        out
    }

    /// Flush a final unterminated line once the stream has ended.
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let line = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        data_payload(&line).map(str::to_string)
    }
}

/// Strip the `data:` prefix (and one optional space) from an SSE line.
pub fn data_payload(line: &str) -> Option<&str> {
    let line = line.trim_end_matches(['\r', '\n']);
    let rest = line.strip_prefix("data:")?;
    let rest = rest.strip_prefix(' ').unwrap_or(rest);
    if rest.is_empty() { None } else { Some(rest) }
}

/// Recover plain text from one streamed fragment.
///
/// Accepts a bare JSON string, an A2A-style `{content: {parts: [{text}]}}`
/// or `{parts: [...]}` object, a Bedrock-style
/// `{event: {contentBlockDelta: {delta: {text}}}}` delta, or a flat `{text}`.
/// Payloads that are not JSON at all are returned verbatim.
pub fn unwrap_text(payload: &str) -> Option<String> {
    match serde_json::from_str::<Value>(payload) {
        Ok(value) => text_from_value(&value),
        Err(_) => Some(payload.to_string()),
    }
}

pub fn text_from_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Object(map) => {
            if let Some(text) = map
                .get("event")
                .and_then(|e| e.get("contentBlockDelta"))
                .and_then(|d| d.get("delta"))
                .and_then(|d| d.get("text"))
                .and_then(Value::as_str)
            {
                return Some(text.to_string());
            }
            if let Some(parts) = map
                .get("content")
                .and_then(|c| c.get("parts"))
                .or_else(|| map.get("parts"))
                .and_then(Value::as_array)
            {
                let joined: String = parts
                    .iter()
                    .filter_map(|p| p.get("text").and_then(Value::as_str))
                    .collect();
                return if joined.is_empty() { None } else { Some(joined) };
            }
            map.get("text").and_then(Value::as_str).map(str::to_string)
        }
        _ => None,
    }
}
