//! Tools the model can invoke, and the registry that gates them.

pub mod echo;
pub mod files;
pub mod registry;
pub mod shell;

use std::fmt;

use anyhow::{Result, anyhow};
use jsonschema::Validator;
use serde_json::Value;

use crate::core::types::{Payload, PermissionLevel};

pub use echo::EchoTool;
pub use files::{FileReadTool, FileWriteTool};
pub use registry::ToolRegistry;
pub use shell::ShellTool;

/// A side-effecting capability exposed to the model.
///
/// Implementations must be safe to share across runs; `run` may fail or
/// panic, the registry turns both into blocked outcomes.
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON Schema for the `args` object.
    fn parameters(&self) -> &Value;

    /// Access this tool needs. Registration rejects a tool whose level
    /// differs from its guardrail entry.
    fn permission_level(&self) -> PermissionLevel;

    /// Check `args` before `run`; `Err` carries the message shown to the model.
    fn validate(&self, args: &Payload) -> Result<(), String> {
        let schema = ParamSchema::new(self.parameters().clone()).map_err(|err| err.to_string())?;
        schema.check(args)
    }

    fn run(&self, args: &Payload) -> Result<Payload>;
}

impl fmt::Debug for dyn Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tool").field("name", &self.name()).finish()
    }
}

/// A parameter schema compiled once.
pub struct ParamSchema {
    value: Value,
    validator: Validator,
}

impl fmt::Debug for ParamSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParamSchema")
            .field("value", &self.value)
            .finish_non_exhaustive()
    }
}

impl ParamSchema {
    pub fn new(value: Value) -> Result<Self> {
        let validator =
            jsonschema::validator_for(&value).map_err(|err| anyhow!("invalid schema: {err}"))?;
        Ok(Self { value, validator })
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Validate `args`; every violation is reported, joined with `"; "`.
    pub fn check(&self, args: &Payload) -> Result<(), String> {
        let instance = Value::Object(args.clone());
        if self.validator.is_valid(&instance) {
            return Ok(());
        }
        let messages = self
            .validator
            .iter_errors(&instance)
            .map(|err| err.to_string())
            .collect::<Vec<_>>();
        Err(messages.join("; "))
    }
}

/// Fetch a required string argument. Schema validation runs first, so a
/// miss here means the schema and the tool disagree.
pub(crate) fn str_arg<'a>(args: &'a Payload, key: &str) -> Result<&'a str> {
    args.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow!("argument '{key}' must be a string"))
}
