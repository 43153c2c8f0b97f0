// SPDX-FileCopyrightText: 2026 KobeAI Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Classification of decoded lines into typed stream frames.
//!
//! Unnamed and `message` events are handled line by line: every `data:` line
//! is classified as soon as it is complete. `done` and `error` events may span
//! several `data:` lines (multi-line text is split by the server), so their
//! lines are collected until the blank line that ends the event.

use serde_json::Value;
use tracing::{debug, warn};

/// The body of a content-bearing frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Text to append to the response assembled so far.
    ContentDelta(String),
    /// Text that replaces the response assembled so far.
    FullReplace(String),
    /// A well-formed frame that carries no content.
    Ignorable,
}

/// One classified unit of the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Payload(Payload),
    /// Liveness-only traffic: comments, keep-alive markers, the
    /// connection-established placeholder.
    KeepAlive,
    /// Normal end of stream.
    Done,
    /// The server reported a failure in-band.
    ServerError(String),
    /// Fields with no meaning for this client (`id:`, `retry:`, stray lines).
    Ignored,
}

/// Named events whose data is buffered until the event ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Buffered {
    Done,
    Error,
}

#[derive(Debug)]
enum EventKind {
    Default,
    Init,
    Buffered(Buffered, Vec<String>),
}

/// Stateful line classifier. Keeps the current `event:` name between lines.
#[derive(Debug)]
pub struct FrameClassifier {
    keepalive_markers: Vec<String>,
    placeholder: String,
    event: EventKind,
}

impl FrameClassifier {
    pub fn new(keepalive_markers: Vec<String>, placeholder: impl Into<String>) -> Self {
        Self {
            keepalive_markers,
            placeholder: placeholder.into(),
            event: EventKind::Default,
        }
    }

    /// Classify one complete line (terminator already removed).
    pub fn classify(&mut self, line: &str) -> Vec<Frame> {
        if line.is_empty() {
            return self.end_event();
        }
        if let Some(comment) = line.strip_prefix(':') {
            debug!(comment = comment.trim(), "sse comment");
            return vec![Frame::KeepAlive];
        }

        let (field, value) = split_field(line);
        match field {
            "data" => self.classify_data(value),
            "event" => {
                // A new name implicitly ends a buffered event that had no blank line.
                let mut frames = self.end_event();
                self.event = match value.trim() {
                    "done" => EventKind::Buffered(Buffered::Done, Vec::new()),
                    "error" => EventKind::Buffered(Buffered::Error, Vec::new()),
                    "init" => EventKind::Init,
                    _ => EventKind::Default,
                };
                if frames.is_empty() {
                    frames.push(Frame::Ignored);
                }
                frames
            }
            "id" | "retry" => vec![Frame::Ignored],
            _ if self.is_keepalive_text(line) => vec![Frame::KeepAlive],
            _ => {
                debug!(line, "ignoring non-field line");
                vec![Frame::Ignored]
            }
        }
    }

    /// Flush a buffered event left open when the body ended.
    pub fn finish(&mut self) -> Vec<Frame> {
        self.end_event()
    }

    fn classify_data(&mut self, body: &str) -> Vec<Frame> {
        if body.trim() == "[DONE]" {
            return vec![Frame::Done];
        }
        if let EventKind::Buffered(_, lines) = &mut self.event {
            lines.push(body.to_string());
            return vec![Frame::Ignored];
        }
        if matches!(self.event, EventKind::Init) || body.trim() == self.placeholder {
            return vec![Frame::KeepAlive];
        }
        let payloads = decode_payload(body);
        let has_delta = payloads
            .iter()
            .any(|p| matches!(p, Payload::ContentDelta(_)));
        if !has_delta && self.is_keepalive_text(body) {
            return vec![Frame::KeepAlive];
        }
        payloads.into_iter().map(Frame::Payload).collect()
    }

    fn end_event(&mut self) -> Vec<Frame> {
        match std::mem::replace(&mut self.event, EventKind::Default) {
            EventKind::Buffered(kind, lines) => {
                let text = lines.join("\n");
                match kind {
                    Buffered::Error => {
                        let message = if text.trim().is_empty() {
                            "server reported an error".to_string()
                        } else {
                            text
                        };
                        vec![Frame::ServerError(message)]
                    }
                    Buffered::Done if text.is_empty() => vec![Frame::Done],
                    Buffered::Done => {
                        vec![Frame::Payload(Payload::FullReplace(text)), Frame::Done]
                    }
                }
            }
            EventKind::Default | EventKind::Init => Vec::new(),
        }
    }

    fn is_keepalive_text(&self, text: &str) -> bool {
        self.keepalive_markers
            .iter()
            .any(|marker| text.contains(marker.as_str()))
    }
}

/// Split `field: value`, removing at most one space after the colon.
fn split_field(line: &str) -> (&str, &str) {
    match line.split_once(':') {
        Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
        None => (line, ""),
    }
}

/// Decode a `data:` body into payloads.
///
/// JSON bodies may hold several concatenated values; each is decoded on its
/// own. A JSON string or a non-JSON body replaces the response. Malformed
/// JSON is skipped.
pub fn decode_payload(body: &str) -> Vec<Payload> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return vec![Payload::Ignorable];
    }

    if trimmed.starts_with('{') || trimmed.starts_with('[') || trimmed.starts_with('"') {
        let mut payloads = Vec::new();
        let stream = serde_json::Deserializer::from_str(trimmed).into_iter::<Value>();
        for value in stream {
            match value {
                Ok(value) => payloads.push(payload_from_value(&value)),
                Err(e) => {
                    warn!(error = %e, "skipping malformed stream frame");
                    payloads.push(Payload::Ignorable);
                    break;
                }
            }
        }
        return payloads;
    }

    vec![Payload::FullReplace(body.to_string())]
}

fn payload_from_value(value: &Value) -> Payload {
    match value {
        Value::String(text) => Payload::FullReplace(text.clone()),
        Value::Array(items) => {
            let text: String = items
                .iter()
                .filter_map(|item| match payload_from_value(item) {
                    Payload::ContentDelta(text) => Some(text),
                    _ => None,
                })
                .collect();
            if text.is_empty() {
                Payload::Ignorable
            } else {
                Payload::ContentDelta(text)
            }
        }
        Value::Object(_) => {
            let content =
                delta_content(value).or_else(|| value.get("data").and_then(delta_content));
            match content {
                Some(text) if !text.is_empty() => Payload::ContentDelta(text.to_string()),
                _ => Payload::Ignorable,
            }
        }
        _ => Payload::Ignorable,
    }
}

fn delta_content(value: &Value) -> Option<&str> {
    value
        .get("choices")?
        .get(0)?
        .get("delta")?
        .get("content")?
        .as_str()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> FrameClassifier {
        FrameClassifier::new(vec!["keep-alive".to_string()], "连接已建立")
    }

    fn delta(text: &str) -> Frame {
        Frame::Payload(Payload::ContentDelta(text.to_string()))
    }

    #[test]
    fn top_level_and_nested_deltas() {
        let mut c = classifier();
        assert_eq!(
            c.classify(r#"data: {"choices":[{"delta":{"content":"Hel"}}]}"#),
            vec![delta("Hel")]
        );
        assert_eq!(
            c.classify(r#"data:{"data":{"choices":[{"delta":{"content":"lo"}}]}}"#),
            vec![delta("lo")]
        );
    }

    #[test]
    fn array_of_objects_is_one_delta() {
        let line = r#"data: [{"choices":[{"delta":{"content":"a"}}]},{"choices":[{"delta":{"content":"b"}}]}]"#;
        assert_eq!(classifier().classify(line), vec![delta("ab")]);
    }

    #[test]
    fn concatenated_values_are_parsed_in_sequence() {
        let line = r#"data: {"choices":[{"delta":{"content":"a"}}]}{"choices":[{"delta":{"content":"b"}}]}"#;
        assert_eq!(classifier().classify(line), vec![delta("a"), delta("b")]);
    }

    #[test]
    fn done_marker() {
        assert_eq!(classifier().classify("data: [DONE]"), vec![Frame::Done]);
        assert_eq!(classifier().classify("data:[DONE]"), vec![Frame::Done]);
    }

    #[test]
    fn string_payloads_replace() {
        let mut c = classifier();
        assert_eq!(
            c.classify(r#"data: "full text""#),
            vec![Frame::Payload(Payload::FullReplace("full text".into()))]
        );
        assert_eq!(
            c.classify("data: plain words"),
            vec![Frame::Payload(Payload::FullReplace("plain words".into()))]
        );
    }

    #[test]
    fn liveness_frames() {
        let mut c = classifier();
        assert_eq!(c.classify(": keep-alive"), vec![Frame::KeepAlive]);
        assert_eq!(c.classify("data: keep-alive"), vec![Frame::KeepAlive]);
        assert_eq!(c.classify("data: 连接已建立"), vec![Frame::KeepAlive]);
        assert_eq!(c.classify("keep-alive ping"), vec![Frame::KeepAlive]);
    }

    #[test]
    fn delta_mentioning_marker_is_still_content() {
        let line = r#"data: {"choices":[{"delta":{"content":"HTTP keep-alive"}}]}"#;
        assert_eq!(classifier().classify(line), vec![delta("HTTP keep-alive")]);
    }

    #[test]
    fn init_event_is_liveness() {
        let mut c = classifier();
        assert_eq!(c.classify("event: init"), vec![Frame::Ignored]);
        assert_eq!(c.classify("data: hello"), vec![Frame::KeepAlive]);
        assert!(c.classify("").is_empty());
    }

    #[test]
    fn malformed_json_is_skipped() {
        assert_eq!(
            classifier().classify(r#"data: {"choices":[{"delta""#),
            vec![Frame::Payload(Payload::Ignorable)]
        );
        assert_eq!(
            classifier().classify(r#"data: {"choices":[{"delta":{}}]}"#),
            vec![Frame::Payload(Payload::Ignorable)]
        );
    }

    #[test]
    fn done_event_carries_full_text_across_lines() {
        let mut c = classifier();
        c.classify("event: done");
        assert_eq!(c.classify("data: line one"), vec![Frame::Ignored]);
        assert_eq!(c.classify("data: line two"), vec![Frame::Ignored]);
        assert_eq!(
            c.classify(""),
            vec![
                Frame::Payload(Payload::FullReplace("line one\nline two".into())),
                Frame::Done
            ]
        );
    }

    #[test]
    fn error_event_becomes_server_error() {
        let mut c = classifier();
        c.classify("event:error");
        c.classify("data:未收到有效的响应数据");
        assert_eq!(
            c.classify(""),
            vec![Frame::ServerError("未收到有效的响应数据".into())]
        );
    }

    #[test]
    fn open_event_is_flushed_on_finish() {
        let mut c = classifier();
        c.classify("event: done");
        c.classify("data: final");
        assert_eq!(
            c.finish(),
            vec![Frame::Payload(Payload::FullReplace("final".into())), Frame::Done]
        );
        assert!(c.finish().is_empty());
    }

    #[test]
    fn id_and_retry_are_ignored() {
        let mut c = classifier();
        assert_eq!(c.classify("id: 7"), vec![Frame::Ignored]);
        assert_eq!(c.classify("retry: 1000"), vec![Frame::Ignored]);
    }
}
