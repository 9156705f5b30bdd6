//! Shared deterministic types for the orchestration core.
//!
//! These types define stable contracts between the loop, the registry and the
//! tools. They carry no I/O and serialize the same way on every run.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Structured payload exchanged with tools (`args` in, result fields out).
pub type Payload = Map<String, Value>;

/// Speaker of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One `(role, content)` entry of a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Append-only conversation owned by a single loop run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Conversation {
    turns: Vec<Turn>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    /// Content of the most recent `user` turn, if any.
    pub fn last_user_content(&self) -> Option<&str> {
        self.turns
            .iter()
            .rev()
            .find(|turn| turn.role == Role::User)
            .map(|turn| turn.content.as_str())
    }
}

/// Capability required to run a tool.
///
/// The set is closed. There is no ordering between levels; only the
/// permission policy decides what each mode grants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionLevel {
    Read,
    Write,
    System,
    Network,
    Delete,
}

impl PermissionLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            PermissionLevel::Read => "read",
            PermissionLevel::Write => "write",
            PermissionLevel::System => "system",
            PermissionLevel::Network => "network",
            PermissionLevel::Delete => "delete",
        }
    }
}

impl fmt::Display for PermissionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Uniform record produced for every tool invocation.
///
/// `blocked` always implies `!success`. When `error` is set the payload is
/// empty; otherwise the payload carries the tool's result fields.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutcome {
    success: bool,
    blocked: bool,
    error: Option<String>,
    payload: Payload,
}

impl ToolOutcome {
    /// Invocation refused or aborted before producing a result.
    pub fn blocked(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            blocked: true,
            error: Some(reason.into()),
            payload: Payload::new(),
        }
    }

    /// Invocation that ran and produced `payload`.
    pub fn completed(payload: Payload) -> Self {
        Self {
            success: true,
            blocked: false,
            error: None,
            payload,
        }
    }

    /// Normalize a raw tool payload.
    ///
    /// `success`, `blocked` and `error` keys are lifted out of the payload when
    /// present with the right type, so tools can override the defaults
    /// (`success=true`, `blocked=false`). A tool may report `success=false`
    /// without being blocked, which stays a distinct outcome. A string
    /// `error` replaces the result fields: the remaining payload is dropped.
    pub fn from_payload(mut payload: Payload) -> Self {
        let success = take_bool(&mut payload, "success").unwrap_or(true);
        let blocked = take_bool(&mut payload, "blocked").unwrap_or(false);
        let error = match payload.remove("error") {
            Some(Value::String(text)) => Some(text),
            Some(other) => {
                payload.insert("error".to_string(), other);
                None
            }
            None => None,
        };

        if blocked {
            return Self {
                success: false,
                blocked: true,
                error: Some(error.unwrap_or_else(|| "blocked".to_string())),
                payload: Payload::new(),
            };
        }

        if error.is_some() {
            payload.clear();
        }
        Self {
            success,
            blocked: false,
            error,
            payload,
        }
    }

    pub fn success(&self) -> bool {
        self.success
    }

    pub fn is_blocked(&self) -> bool {
        self.blocked
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Flatten into a single JSON object that always carries `success` and
    /// `blocked`. Keys serialize in sorted order.
    pub fn to_payload(&self) -> Payload {
        let mut merged = self.payload.clone();
        merged.insert("success".to_string(), Value::Bool(self.success));
        merged.insert("blocked".to_string(), Value::Bool(self.blocked));
        if let Some(error) = &self.error {
            merged.insert("error".to_string(), Value::String(error.clone()));
        }
        merged
    }

    /// Compact JSON text used in `[tool_result]` turns.
    pub fn normalized(&self) -> String {
        canonical(&Value::Object(self.to_payload())).to_string()
    }
}

/// Rebuild `value` with object keys inserted in sorted order at every depth.
pub fn canonical(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = Map::new();
            for key in keys {
                sorted.insert(key.clone(), canonical(&map[key.as_str()]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonical).collect()),
        other => other.clone(),
    }
}

fn take_bool(payload: &mut Payload, key: &str) -> Option<bool> {
    match payload.get(key) {
        Some(Value::Bool(flag)) => {
            let flag = *flag;
            payload.remove(key);
            Some(flag)
        }
        _ => None,
    }
}
