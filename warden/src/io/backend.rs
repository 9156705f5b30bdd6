//! Model backend abstraction.
//!
//! The [`ModelBackend`] trait decouples the ReAct loop from inference. The
//! offline backends here need no model: [`NullBackend`] reacts to keywords and
//! [`ScriptedFileBackend`] replays canned responses from disk.

use std::fs;
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result, anyhow};
use serde_json::{Value, json};
use tracing::debug;

use crate::core::types::Conversation;
use crate::react::{REPAIR_PREFIX, TOOL_BLOCKED_PREFIX, TOOL_RESULT_PREFIX};

/// Produces one raw response for the conversation so far.
pub trait ModelBackend: Send + Sync {
    fn generate(&self, conversation: &Conversation) -> Result<String>;
}

/// Deterministic keyword-driven backend for demos and tests.
#[derive(Debug, Default)]
pub struct NullBackend {
    broken_once: AtomicBool,
}

impl NullBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ModelBackend for NullBackend {
    fn generate(&self, conversation: &Conversation) -> Result<String> {
        let last_user = conversation.last_user_content().unwrap_or("");
        let lowered = last_user.to_lowercase();

        if lowered.contains("break_json") && !self.broken_once.swap(true, Ordering::SeqCst) {
            return Ok("{this is not valid json".to_string());
        }
        if last_user.starts_with(REPAIR_PREFIX) {
            return Ok(final_answer("Recovered after protocol repair."));
        }
        if last_user.starts_with(TOOL_BLOCKED_PREFIX) {
            return Ok(final_answer("Tool blocked; proceeding safely."));
        }
        if let Some(rest) = last_user.strip_prefix(TOOL_RESULT_PREFIX) {
            return Ok(final_answer(&summarize_tool_result(rest)));
        }

        let action = if lowered.contains("batch") {
            json!({
                "type": "tool_calls",
                "calls": [
                    {"name": "echo", "args": {"text": "first"}},
                    {"name": "echo", "args": {"text": "second"}},
                ],
            })
        } else if lowered.contains("use_tool") {
            json!({"type": "tool_call", "name": "echo", "args": {"text": "hi"}})
        } else if lowered.contains("file_write") {
            json!({
                "type": "tool_call",
                "name": "file_write",
                "args": {"path": "demo.txt", "content": "hello from tool"},
            })
        } else if lowered.contains("file_read") {
            json!({"type": "tool_call", "name": "file_read", "args": {"path": "demo.txt"}})
        } else if lowered.contains("shell_block") {
            json!({
                "type": "tool_call",
                "name": "shell",
                "args": {"cmd": ["bash", "-c", "echo hi"]},
            })
        } else {
            return Ok(final_answer(&format!("NullBackend: {last_user}")));
        };
        Ok(action.to_string())
    }
}

fn final_answer(content: &str) -> String {
    json!({"type": "final", "content": content}).to_string()
}

fn summarize_tool_result(raw: &str) -> String {
    let parsed: Value = serde_json::from_str(raw.trim()).unwrap_or_else(|_| json!({"echo": ""}));
    if let Some(echo) = parsed.get("echo") {
        return format!("Tool returned: {}", echo.as_str().unwrap_or_default());
    }
    if parsed.get("written").and_then(Value::as_bool) == Some(true) {
        return "Write completed.".to_string();
    }
    if let Some(content) = parsed.get("content") {
        return format!("Read: {}", content.as_str().unwrap_or_default());
    }
    "Tool completed.".to_string()
}

/// Replays raw responses from a file, one per non-empty line.
///
/// Once the script runs out, every further call is an error.
#[derive(Debug)]
pub struct ScriptedFileBackend {
    remaining: Mutex<Vec<String>>,
}

impl ScriptedFileBackend {
    pub fn load(path: &Path) -> Result<Self> {
        let contents =
            fs::read_to_string(path).with_context(|| format!("read script {}", path.display()))?;
        let responses = contents
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(str::to_string)
            .collect::<Vec<_>>();
        debug!(path = %path.display(), responses = responses.len(), "loaded model script");
        Ok(Self::from_responses(responses))
    }

    pub fn from_responses(responses: Vec<String>) -> Self {
        let mut remaining = responses;
        remaining.reverse();
        Self {
            remaining: Mutex::new(remaining),
        }
    }
}

impl ModelBackend for ScriptedFileBackend {
    fn generate(&self, _conversation: &Conversation) -> Result<String> {
        let mut remaining = self
            .remaining
            .lock()
            .map_err(|_| anyhow!("scripted backend lock poisoned"))?;
        remaining
            .pop()
            .ok_or_else(|| anyhow!("model script exhausted"))
    }
}
