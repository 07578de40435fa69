use crate::types::StreamFrame;
use serde_json::Value;

pub const DEFAULT_EVENT: &str = "message";
/// The only terminal event name; its data is the final result of a stream.
pub const RETURN_EVENT: &str = "return";

/// A decoded frame plus the JSON error for its data lines, if any.
pub struct DecodedFrame {
    pub frame: StreamFrame,
    pub data_error: Option<serde_json::Error>,
}

/// Decodes one raw event-stream frame (without its terminating blank line).
///
/// `event:` sets the event name (trimmed, defaulting to `"message"`).
/// `data:` lines are collected in order with one leading space stripped,
/// joined with `\n` and parsed as JSON; invalid JSON yields `Null`.
pub fn parse_frame(raw: &str) -> StreamFrame {
    decode_frame(raw).frame
}

pub fn decode_frame(raw: &str) -> DecodedFrame {
    let mut event = String::new();
    let mut data_lines: Vec<&str> = Vec::new();

    for line in raw.split('\n') {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if let Some(rest) = line.strip_prefix("event:") {
            event = rest.trim().to_string();
        } else if let Some(rest) = line.strip_prefix("data:") {
            data_lines.push(rest.strip_prefix(' ').unwrap_or(rest));
        }
    }

    if event.is_empty() {
        event = DEFAULT_EVENT.to_string();
    }

    let (data, data_error) = if data_lines.is_empty() {
        (Value::Null, None)
    } else {
        match serde_json::from_str::<Value>(&data_lines.join("\n")) {
            Ok(data) => (data, None),
            Err(error) => (Value::Null, Some(error)),
        }
    };

    DecodedFrame {
        frame: StreamFrame { event, data },
        data_error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_missing_event_defaults_to_message() {
        let frame = parse_frame("data: {\"a\":1}");
        assert_eq!(frame.event, "message");
        assert_eq!(frame.data, json!({"a": 1}));

        let blank_event = parse_frame("event:   \ndata: 1");
        assert_eq!(blank_event.event, "message");
    }

    #[test]
    fn test_event_name_is_trimmed() {
        let frame = parse_frame("event:  token  \ndata: \"x\"");
        assert_eq!(frame.event, "token");
        assert_eq!(frame.data, json!("x"));
    }

    #[test]
    fn test_multiple_data_lines_join_with_newline() {
        let frame = parse_frame("event: return\ndata: {\"ok\":\ndata: true}");
        assert_eq!(frame.data, json!({"ok": true}));

        let text = parse_frame("data: \"a\\nb\"");
        assert_eq!(text.data, json!("a\nb"));
    }

    #[test]
    fn test_only_one_leading_space_is_stripped() {
        let spaced = decode_frame("data:  \"x\"");
        assert_eq!(spaced.frame.data, json!("x"));
        assert!(spaced.data_error.is_none());

        let unspaced = parse_frame("data:42");
        assert_eq!(unspaced.data, json!(42));
    }

    #[test]
    fn test_invalid_json_yields_null_data() {
        let decoded = decode_frame("event: token\ndata: {invalid json}");
        assert_eq!(decoded.frame.event, "token");
        assert_eq!(decoded.frame.data, Value::Null);
        assert!(decoded.data_error.is_some());
    }

    #[test]
    fn test_frame_without_data_is_null_without_error() {
        let decoded = decode_frame("event: ping");
        assert_eq!(decoded.frame.data, Value::Null);
        assert!(decoded.data_error.is_none());
    }

    #[test]
    fn test_carriage_returns_are_ignored() {
        let frame = parse_frame("event: token\r\ndata: {\"output\":\"Hi\"}\r");
        assert_eq!(frame.event, "token");
        assert_eq!(frame.data, json!({"output": "Hi"}));
    }

    #[test]
    fn test_comment_lines_are_ignored() {
        let frame = parse_frame(": keep-alive\nevent: token\ndata: 1");
        assert_eq!(frame, StreamFrame::new("token", json!(1)));
    }
}
