//! Streaming events.
//!
//! `StreamEvent` is everything that crosses the streaming boundary between
//! the orchestrator and its caller. The HTTP layer writes one JSON-encoded
//! event per SSE frame:
//! - `text_delta`: partial text from the model
//! - `tool_use_requested`: the model finished a tool-use block
//! - `tool_result`: a tool invocation completed
//! - `provider_error`: the provider reported an error; the run ends
//! - `round_complete`: a provider round finished, with its assembled message
//! - `aborted`: the run stopped on a fatal error or the round limit

use serde::{Deserialize, Serialize};

use crate::message::Message;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum StreamEvent {
    /// Partial text token from the model.
    TextDelta { text: String },

    /// The model requested a tool invocation.
    ToolUseRequested {
        id: String,
        tool_id: String,
        operation_id: String,
        input: serde_json::Value,
    },

    /// A tool invocation completed.
    ToolResult {
        tool_use_id: String,
        tool_id: String,
        operation_id: String,
        output: String,
        is_error: bool,
    },

    /// Provider-side failure, reclassified from the provider payload.
    ProviderError(ProviderErrorInfo),

    /// A provider round finished.
    RoundComplete { round: u32, message: Message },

    /// The run stopped before converging.
    Aborted { reason: String },
}

impl StreamEvent {
    /// Event name, as used for logging and SSE `event:` fields.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::TextDelta { .. } => "text_delta",
            Self::ToolUseRequested { .. } => "tool_use_requested",
            Self::ToolResult { .. } => "tool_result",
            Self::ProviderError(_) => "provider_error",
            Self::RoundComplete { .. } => "round_complete",
            Self::Aborted { .. } => "aborted",
        }
    }

    pub fn text_delta(text: impl Into<String>) -> Self {
        Self::TextDelta { text: text.into() }
    }
}

/// A structured provider error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderErrorInfo {
    /// HTTP status code, when one was known or could be recovered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<u16>,

    /// Human-readable summary.
    pub message: String,

    /// The provider's JSON error body, when the payload was JSON.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,
}

impl ProviderErrorInfo {
    /// Build from a known HTTP status and the raw response body.
    pub fn from_status(status: u16, body: &str) -> Self {
        match serde_json::from_str::<serde_json::Value>(body.trim()) {
            Ok(json) => Self {
                code: Some(status),
                message: summarize_body(&json).unwrap_or_else(|| format!("HTTP {status}")),
                body: Some(json),
            },
            Err(_) => Self {
                code: Some(status),
                message: if body.trim().is_empty() {
                    format!("HTTP {status}")
                } else {
                    body.trim().to_string()
                },
                body: None,
            },
        }
    }

    /// Parse an opaque error string.
    ///
    /// Two shapes are recognized: `"<3-digit status> <json>"` and a bare JSON
    /// body. Anything else is kept verbatim as the message.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();

        if let Some((prefix, rest)) = trimmed.split_once(' ')
            && prefix.len() == 3
            && prefix.bytes().all(|b| b.is_ascii_digit())
            && let Ok(status) = prefix.parse::<u16>()
            && let Ok(json) = serde_json::from_str::<serde_json::Value>(rest.trim())
        {
            return Self {
                code: Some(status),
                message: summarize_body(&json).unwrap_or_else(|| format!("HTTP {status}")),
                body: Some(json),
            };
        }

        if let Ok(json @ serde_json::Value::Object(_)) =
            serde_json::from_str::<serde_json::Value>(trimmed)
        {
            return Self {
                code: None,
                message: summarize_body(&json).unwrap_or_else(|| trimmed.to_string()),
                body: Some(json),
            };
        }

        Self {
            code: None,
            message: trimmed.to_string(),
            body: None,
        }
    }
}

/// Pull a readable message out of `{"type":"error","error":{"type":..,"message":..}}`.
fn summarize_body(json: &serde_json::Value) -> Option<String> {
    let error = json.get("error").unwrap_or(json);
    error
        .get("message")
        .and_then(|m| m.as_str())
        .or_else(|| error.get("type").and_then(|t| t.as_str()))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::ContentBlock;

    fn roundtrip(event: StreamEvent) {
        let json = serde_json::to_string(&event).unwrap();
        let parsed: StreamEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, event, "round-trip mismatch for {json}");
    }

    #[test]
    fn every_variant_roundtrips() {
        roundtrip(StreamEvent::text_delta("Hello"));
        roundtrip(StreamEvent::ToolUseRequested {
            id: "toolu_1".into(),
            tool_id: "exa".into(),
            operation_id: "search".into(),
            input: serde_json::json!({"query": "X"}),
        });
        roundtrip(StreamEvent::ToolResult {
            tool_use_id: "toolu_1".into(),
            tool_id: "exa".into(),
            operation_id: "search".into(),
            output: "results".into(),
            is_error: false,
        });
        roundtrip(StreamEvent::ProviderError(ProviderErrorInfo::parse(
            r#"429 {"type":"error","error":{"type":"rate_limit_error"}}"#,
        )));
        roundtrip(StreamEvent::RoundComplete {
            round: 1,
            message: crate::message::Message::assistant("m", vec![ContentBlock::text("hi")]),
        });
        roundtrip(StreamEvent::Aborted {
            reason: "boom".into(),
        });
    }

    #[test]
    fn text_delta_wire_shape() {
        let json = serde_json::to_string(&StreamEvent::text_delta("Hi")).unwrap();
        assert_eq!(json, r#"{"type":"text_delta","text":"Hi"}"#);
    }

    #[test]
    fn tool_result_uses_camel_case_fields() {
        let json = serde_json::to_value(StreamEvent::ToolResult {
            tool_use_id: "t".into(),
            tool_id: "exa".into(),
            operation_id: "search".into(),
            output: "o".into(),
            is_error: true,
        })
        .unwrap();
        assert_eq!(json["type"], "tool_result");
        assert_eq!(json["toolUseId"], "t");
        assert_eq!(json["isError"], true);
    }

    #[test]
    fn provider_error_flattens_info() {
        let json = serde_json::to_value(StreamEvent::ProviderError(ProviderErrorInfo {
            code: Some(529),
            message: "Overloaded".into(),
            body: None,
        }))
        .unwrap();
        assert_eq!(json["type"], "provider_error");
        assert_eq!(json["code"], 529);
        assert_eq!(json["message"], "Overloaded");
    }

    #[test]
    fn parse_status_prefixed_payload() {
        let info = ProviderErrorInfo::parse(
            r#"429 {"type":"error","error":{"type":"rate_limit_error"}}"#,
        );
        assert_eq!(info.code, Some(429));
        assert_eq!(info.message, "rate_limit_error");
        assert_eq!(info.body.unwrap()["error"]["type"], "rate_limit_error");
    }

    #[test]
    fn parse_plain_json_payload() {
        let info = ProviderErrorInfo::parse(
            r#"{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#,
        );
        assert_eq!(info.code, None);
        assert_eq!(info.message, "Overloaded");
        assert!(info.body.is_some());
    }

    #[test]
    fn parse_falls_back_to_raw_message() {
        let info = ProviderErrorInfo::parse("connection reset by peer");
        assert_eq!(info.code, None);
        assert_eq!(info.message, "connection reset by peer");
        assert!(info.body.is_none());
    }

    #[test]
    fn parse_numeric_word_without_json_is_raw() {
        let info = ProviderErrorInfo::parse("500 Internal Server Error");
        assert_eq!(info.code, None);
        assert_eq!(info.message, "500 Internal Server Error");
    }

    #[test]
    fn from_status_with_non_json_body() {
        let info = ProviderErrorInfo::from_status(502, "Bad Gateway");
        assert_eq!(info.code, Some(502));
        assert_eq!(info.message, "Bad Gateway");
        assert!(info.body.is_none());
    }
}
