//! Server-Sent Events framing and typed decoding of push payloads.

use anyhow::{Context, Result, bail};
use serde_json::Value;

use crate::api::models::{TaskCompletion, TaskPatch, TaskRecord, TaskRef};
use crate::constants::TAB_ID_PARAM;

/// One dispatched SSE event: its name and the joined `data:` lines.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SseFrame {
    pub event: String,
    pub data: String,
}

/// Upper bound for an unterminated line or one event's joined data.
pub const MAX_PENDING_BYTES: usize = 1024 * 1024;

/// Incremental SSE parser fed with raw body chunks.
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
}

impl SseParser {
    /// Consume a chunk, returning every frame it completed. Fails once the
    /// peer has sent more than [`MAX_PENDING_BYTES`] without ending a line
    /// or an event.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<SseFrame>> {
        self.buffer.extend_from_slice(chunk);
        let mut frames = Vec::new();
        while let Some(newline_index) = self.buffer.iter().position(|byte| *byte == b'\n') {
            let mut line = self.buffer.drain(..=newline_index).collect::<Vec<_>>();
            line.pop();
            if matches!(line.last(), Some(b'\r')) {
                line.pop();
            }
            let line = String::from_utf8_lossy(&line).into_owned();
            if let Some(frame) = self.line(&line) {
                frames.push(frame);
            }
        }
        let pending = self.buffer.len() + self.data.iter().map(String::len).sum::<usize>();
        if pending > MAX_PENDING_BYTES {
            bail!("push event exceeds {MAX_PENDING_BYTES} bytes");
        }
        Ok(frames)
    }

    /// Flush whatever is buffered once the stream has ended.
    pub fn finish(&mut self) -> Option<SseFrame> {
        if !self.buffer.is_empty() {
            let rest = std::mem::take(&mut self.buffer);
            let line = String::from_utf8_lossy(&rest).into_owned();
            if let Some(frame) = self.line(line.trim_end_matches('\r')) {
                return Some(frame);
            }
        }
        self.dispatch()
    }

    fn line(&mut self, line: &str) -> Option<SseFrame> {
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
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            // `id` and `retry` are not used: reconnection timing is ours.
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseFrame> {
        let event = self.event.take();
        if self.data.is_empty() {
            return None;
        }
        let data = std::mem::take(&mut self.data).join("\n");
        Some(SseFrame {
            event: event.unwrap_or_else(|| "message".to_string()),
            data,
        })
    }
}

/// Typed push event.
#[derive(Clone, Debug, PartialEq)]
pub enum PushEvent {
    Connected,
    TaskCreated(TaskRecord),
    TaskUpdated(TaskPatch),
    TaskDeleted(TaskRef),
    TaskCompleted(TaskCompletion),
}

impl PushEvent {
    #[cfg(feature = "debug-logs")]
    pub fn kind(&self) -> &'static str {
        match self {
            PushEvent::Connected => "connected",
            PushEvent::TaskCreated(_) => "task_created",
            PushEvent::TaskUpdated(_) => "task_updated",
            PushEvent::TaskDeleted(_) => "task_deleted",
            PushEvent::TaskCompleted(_) => "task_completed",
        }
    }
}

/// A decoded event together with the push identity that originated it.
#[derive(Clone, Debug, PartialEq)]
pub struct Inbound {
    pub event: PushEvent,
    pub origin: Option<String>,
}

/// Decode a frame. Unknown event names yield `Ok(None)`; a known name with a
/// payload that does not fit is an error.
pub fn decode(frame: &SseFrame) -> Result<Option<Inbound>> {
    const KNOWN: [&str; 5] = [
        "connected",
        "task_created",
        "task_updated",
        "task_deleted",
        "task_completed",
    ];
    if !KNOWN.contains(&frame.event.as_str()) {
        return Ok(None);
    }
    let payload: Value = if frame.data.trim().is_empty() {
        Value::Null
    } else {
        serde_json::from_str(&frame.data)
            .with_context(|| format!("parse `{}` payload", frame.event))?
    };
    let origin = payload
        .get(TAB_ID_PARAM)
        .and_then(Value::as_str)
        .map(str::to_string);

    let event = match frame.event.as_str() {
        "connected" => PushEvent::Connected,
        "task_created" => PushEvent::TaskCreated(typed(&frame.event, payload)?),
        "task_updated" => PushEvent::TaskUpdated(typed(&frame.event, payload)?),
        "task_deleted" => PushEvent::TaskDeleted(typed(&frame.event, payload)?),
        "task_completed" => PushEvent::TaskCompleted(typed(&frame.event, payload)?),
        _ => return Ok(None),
    };
    Ok(Some(Inbound { event, origin }))
}

fn typed<T: serde::de::DeserializeOwned>(event: &str, payload: Value) -> Result<T> {
    serde_json::from_value(payload).with_context(|| format!("decode `{event}` payload"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::RemoteId;

    #[test]
    fn frames_survive_arbitrary_chunking() {
        let stream = b"event: connected\ndata: {\"tabId\":\"t1\"}\n\n: keep-alive\n\nevent: task_deleted\r\ndata: {\"id\": 9}\r\n\r\n";
        let mut parser = SseParser::default();
        let mut frames = Vec::new();
        for chunk in stream.chunks(7) {
            frames.extend(parser.feed(chunk).unwrap());
        }
        assert_eq!(
            frames,
            vec![
                SseFrame {
                    event: "connected".to_string(),
                    data: "{\"tabId\":\"t1\"}".to_string()
                },
                SseFrame {
                    event: "task_deleted".to_string(),
                    data: "{\"id\": 9}".to_string()
                },
            ]
        );
        assert_eq!(parser.finish(), None);
    }

    #[test]
    fn endless_line_is_refused_past_the_cap() {
        let mut parser = SseParser::default();
        let chunk = vec![b'x'; 64 * 1024];
        let mut fed = 0;
        let err = loop {
            match parser.feed(&chunk) {
                Ok(frames) => assert!(frames.is_empty()),
                Err(err) => break err,
            }
            fed += chunk.len();
            assert!(fed <= MAX_PENDING_BYTES);
        };
        assert!(err.to_string().contains("exceeds"));
    }

    #[test]
    fn multi_line_data_is_joined_and_trailing_frame_flushed() {
        let mut parser = SseParser::default();
        let frames = parser.feed(b"data: a\ndata: b\n\ndata: tail").unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].data, "a\nb");
        let tail = parser.finish().unwrap();
        assert_eq!(tail.event, "message");
        assert_eq!(tail.data, "tail");
    }

    #[test]
    fn decode_types_known_events_and_skips_unknown() {
        let created = decode(&SseFrame {
            event: "task_created".to_string(),
            data: r#"{"id": 42, "text": "Buy milk", "xp": 10, "tabId": "t9"}"#.to_string(),
        })
        .unwrap()
        .unwrap();
        assert_eq!(created.origin.as_deref(), Some("t9"));
        match created.event {
            PushEvent::TaskCreated(record) => assert_eq!(record.id, RemoteId::from(42)),
            other => panic!("unexpected {other:?}"),
        }

        let unknown = decode(&SseFrame {
            event: "friend_online".to_string(),
            data: "{}".to_string(),
        })
        .unwrap();
        assert!(unknown.is_none());

        assert!(
            decode(&SseFrame {
                event: "task_deleted".to_string(),
                data: r#"{"text": "no id"}"#.to_string(),
            })
            .is_err()
        );
    }
}
