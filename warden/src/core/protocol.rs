//! Wire protocol for model output.
//!
//! The model must answer with a single JSON object discriminated by `type`:
//!
//! ```json
//! {"type": "final", "content": "..."}
//! {"type": "tool_call", "name": "echo", "args": {"text": "hi"}}
//! {"type": "tool_calls", "calls": [{"name": "echo", "args": {}}]}
//! ```
//!
//! [`parse`] is the only validator of that text. It never constructs a
//! partially populated [`Action`]: every failure maps to one stable
//! [`ProtocolError`] reason code.

use serde_json::{Map, Value};
use thiserror::Error;

use crate::core::types::Payload;

/// Parsed, validated model decision.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Final { content: String },
    ToolCall(ToolCall),
    ToolCalls { calls: Vec<ToolCall> },
}

/// One requested tool invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub name: String,
    pub args: Payload,
}

impl Action {
    /// Requested calls in submission order (empty for `Final`).
    pub fn calls(&self) -> &[ToolCall] {
        match self {
            Action::Final { .. } => &[],
            Action::ToolCall(call) => std::slice::from_ref(call),
            Action::ToolCalls { calls } => calls,
        }
    }

    /// Stable label for logs and events.
    pub fn kind(&self) -> &'static str {
        match self {
            Action::Final { .. } => "final",
            Action::ToolCall(_) => "tool_call",
            Action::ToolCalls { .. } => "tool_calls",
        }
    }
}

/// Reason a raw model output was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("invalid_json")]
    InvalidJson,
    #[error("root_must_be_object")]
    RootMustBeObject,
    #[error("unknown_or_missing_type")]
    UnknownOrMissingType,
    #[error("final_missing_content")]
    FinalMissingContent,
    #[error("tool_call_missing_name")]
    ToolCallMissingName,
    #[error("tool_call_args_must_be_object")]
    ToolCallArgsMustBeObject,
    #[error("tool_calls_missing_calls")]
    ToolCallsMissingCalls,
    #[error("tool_calls_item_must_be_object")]
    ToolCallsItemMustBeObject,
    #[error("tool_calls_item_missing_name")]
    ToolCallsItemMissingName,
    #[error("tool_calls_item_args_must_be_object")]
    ToolCallsItemArgsMustBeObject,
}

impl ProtocolError {
    /// Stable reason code (same text as `Display`).
    pub fn reason(&self) -> &'static str {
        match self {
            ProtocolError::InvalidJson => "invalid_json",
            ProtocolError::RootMustBeObject => "root_must_be_object",
            ProtocolError::UnknownOrMissingType => "unknown_or_missing_type",
            ProtocolError::FinalMissingContent => "final_missing_content",
            ProtocolError::ToolCallMissingName => "tool_call_missing_name",
            ProtocolError::ToolCallArgsMustBeObject => "tool_call_args_must_be_object",
            ProtocolError::ToolCallsMissingCalls => "tool_calls_missing_calls",
            ProtocolError::ToolCallsItemMustBeObject => "tool_calls_item_must_be_object",
            ProtocolError::ToolCallsItemMissingName => "tool_calls_item_missing_name",
            ProtocolError::ToolCallsItemArgsMustBeObject => "tool_calls_item_args_must_be_object",
        }
    }
}

/// Validate raw model text against the three-shape action protocol.
pub fn parse(raw: &str) -> Result<Action, ProtocolError> {
    let value: Value = serde_json::from_str(raw).map_err(|_| ProtocolError::InvalidJson)?;
    let Value::Object(mut root) = value else {
        return Err(ProtocolError::RootMustBeObject);
    };

    match root.get("type").and_then(Value::as_str) {
        Some("final") => match root.remove("content") {
            Some(Value::String(content)) => Ok(Action::Final { content }),
            _ => Err(ProtocolError::FinalMissingContent),
        },
        Some("tool_call") => {
            let call = parse_call(
                &mut root,
                ProtocolError::ToolCallMissingName,
                ProtocolError::ToolCallArgsMustBeObject,
            )?;
            Ok(Action::ToolCall(call))
        }
        Some("tool_calls") => {
            let items = match root.remove("calls") {
                Some(Value::Array(items)) if !items.is_empty() => items,
                _ => return Err(ProtocolError::ToolCallsMissingCalls),
            };
            let mut calls = Vec::with_capacity(items.len());
            for item in items {
                let Value::Object(mut item) = item else {
                    return Err(ProtocolError::ToolCallsItemMustBeObject);
                };
                calls.push(parse_call(
                    &mut item,
                    ProtocolError::ToolCallsItemMissingName,
                    ProtocolError::ToolCallsItemArgsMustBeObject,
                )?);
            }
            Ok(Action::ToolCalls { calls })
        }
        _ => Err(ProtocolError::UnknownOrMissingType),
    }
}

fn parse_call(
    object: &mut Map<String, Value>,
    missing_name: ProtocolError,
    args_not_object: ProtocolError,
) -> Result<ToolCall, ProtocolError> {
    let name = match object.remove("name") {
        Some(Value::String(name)) => name,
        _ => return Err(missing_name),
    };
    let args = match object.remove("args") {
        Some(Value::Object(args)) => args,
        _ => return Err(args_not_object),
    };
    Ok(ToolCall { name, args })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_final() {
        let action = parse(r#"{"type":"final","content":"ok"}"#).expect("parse");
        assert_eq!(
            action,
            Action::Final {
                content: "ok".to_string()
            }
        );
    }

    #[test]
    fn final_content_is_returned_verbatim() {
        for content in ["", "  padded  ", "line1\nline2", "{\"type\":\"final\"}", "ünïcödé"] {
            let raw = json!({"type": "final", "content": content}).to_string();
            assert_eq!(
                parse(&raw).expect("parse"),
                Action::Final {
                    content: content.to_string()
                }
            );
        }
    }

    #[test]
    fn parses_tool_call_with_empty_args() {
        let action = parse(r#"{"type":"tool_call","name":"echo","args":{}}"#).expect("parse");
        assert_eq!(action.calls().len(), 1);
        assert_eq!(action.calls()[0].name, "echo");
        assert!(action.calls()[0].args.is_empty());
    }

    #[test]
    fn parses_tool_calls_in_order() {
        let action = parse(
            r#"{"type":"tool_calls","calls":[{"name":"a","args":{"x":1}},{"name":"b","args":{}}]}"#,
        )
        .expect("parse");
        let names: Vec<&str> = action.calls().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(action.kind(), "tool_calls");
    }

    #[test]
    fn rejects_each_malformed_shape_with_specific_reason() {
        let cases = [
            ("{not json", ProtocolError::InvalidJson),
            ("", ProtocolError::InvalidJson),
            ("[1,2]", ProtocolError::RootMustBeObject),
            ("\"final\"", ProtocolError::RootMustBeObject),
            ("42", ProtocolError::RootMustBeObject),
            ("{}", ProtocolError::UnknownOrMissingType),
            (r#"{"type":"answer"}"#, ProtocolError::UnknownOrMissingType),
            (r#"{"type":3}"#, ProtocolError::UnknownOrMissingType),
            (r#"{"type":"final"}"#, ProtocolError::FinalMissingContent),
            (r#"{"type":"final","content":7}"#, ProtocolError::FinalMissingContent),
            (r#"{"type":"tool_call","args":{}}"#, ProtocolError::ToolCallMissingName),
            (
                r#"{"type":"tool_call","name":1,"args":{}}"#,
                ProtocolError::ToolCallMissingName,
            ),
            (
                r#"{"type":"tool_call","name":"echo"}"#,
                ProtocolError::ToolCallArgsMustBeObject,
            ),
            (
                r#"{"type":"tool_call","name":"echo","args":[]}"#,
                ProtocolError::ToolCallArgsMustBeObject,
            ),
            (r#"{"type":"tool_calls"}"#, ProtocolError::ToolCallsMissingCalls),
            (
                r#"{"type":"tool_calls","calls":[]}"#,
                ProtocolError::ToolCallsMissingCalls,
            ),
            (
                r#"{"type":"tool_calls","calls":{}}"#,
                ProtocolError::ToolCallsMissingCalls,
            ),
            (
                r#"{"type":"tool_calls","calls":["echo"]}"#,
                ProtocolError::ToolCallsItemMustBeObject,
            ),
            (
                r#"{"type":"tool_calls","calls":[{"args":{}}]}"#,
                ProtocolError::ToolCallsItemMissingName,
            ),
            (
                r#"{"type":"tool_calls","calls":[{"name":"echo","args":null}]}"#,
                ProtocolError::ToolCallsItemArgsMustBeObject,
            ),
        ];

        for (raw, expected) in cases {
            assert_eq!(parse(raw), Err(expected), "input: {raw}");
        }
    }

    #[test]
    fn later_invalid_item_rejects_whole_batch() {
        let raw = r#"{"type":"tool_calls","calls":[{"name":"a","args":{}},{"name":"b"}]}"#;
        assert_eq!(
            parse(raw),
            Err(ProtocolError::ToolCallsItemArgsMustBeObject)
        );
    }

    #[test]
    fn reason_matches_display() {
        assert_eq!(ProtocolError::InvalidJson.to_string(), "invalid_json");
        assert_eq!(
            ProtocolError::ToolCallsItemArgsMustBeObject.reason(),
            ProtocolError::ToolCallsItemArgsMustBeObject.to_string()
        );
    }
}
