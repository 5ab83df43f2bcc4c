//! Incremental decoder for OpenAI-style server-sent completion events.

use super::CompletionError;
use serde::Deserialize;

/// Event decoded from a `data:` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SseEvent {
    /// A content fragment.
    Delta(String),
    /// The `[DONE]` sentinel.
    Done,
}

/// Buffers raw bytes until complete lines are available.
#[derive(Debug, Default)]
pub(crate) struct SseDecoder {
    pending: Vec<u8>,
}

impl SseDecoder {
    /// Feed a network chunk and return every event completed by it.
    pub(crate) fn feed(&mut self, bytes: &[u8]) -> Result<Vec<SseEvent>, CompletionError> {
        self.pending.extend_from_slice(bytes);
        let mut events = Vec::new();
        while let Some(newline) = self.pending.iter().position(|byte| *byte == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=newline).collect();
            let line = String::from_utf8_lossy(&line);
            if let Some(event) = parse_line(line.trim_end())? {
                events.push(event);
            }
        }
        Ok(events)
    }
}

#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Default, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

fn parse_line(line: &str) -> Result<Option<SseEvent>, CompletionError> {
    let Some(data) = line.strip_prefix("data:") else {
        return Ok(None);
    };
    let data = data.trim();
    if data.is_empty() {
        return Ok(None);
    }
    if data == "[DONE]" {
        return Ok(Some(SseEvent::Done));
    }

    let chunk: StreamChunk = serde_json::from_str(data)
        .map_err(|err| CompletionError::Api(format!("malformed stream chunk: {err}")))?;
    Ok(chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta.content)
        .filter(|content| !content.is_empty())
        .map(SseEvent::Delta))
}
