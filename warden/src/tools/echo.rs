use anyhow::Result;
use serde_json::{Value, json};

use crate::core::guardrails::ECHO;
use crate::core::types::{Payload, PermissionLevel};
use crate::tools::{ParamSchema, Tool, str_arg};

/// Returns `{"echo": text}`.
#[derive(Debug)]
pub struct EchoTool {
    schema: ParamSchema,
}

impl EchoTool {
    pub fn new() -> Result<Self> {
        let schema = ParamSchema::new(json!({
            "type": "object",
            "properties": {"text": {"type": "string"}},
            "required": ["text"],
            "additionalProperties": false,
        }))?;
        Ok(Self { schema })
    }
}

impl Tool for EchoTool {
    fn name(&self) -> &str {
        ECHO
    }

    fn description(&self) -> &str {
        "Echoes provided text."
    }

    fn parameters(&self) -> &Value {
        self.schema.value()
    }

    fn permission_level(&self) -> PermissionLevel {
        PermissionLevel::Read
    }

    fn validate(&self, args: &Payload) -> Result<(), String> {
        self.schema.check(args)
    }

    fn run(&self, args: &Payload) -> Result<Payload> {
        let mut out = Payload::new();
        out.insert("echo".to_string(), Value::String(str_arg(args, "text")?.to_string()));
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn echoes_text() {
        let tool = EchoTool::new().expect("tool");
        let mut args = Payload::new();
        args.insert("text".to_string(), json!("hi"));
        assert!(tool.validate(&args).is_ok());
        assert_eq!(tool.run(&args).expect("run")["echo"], "hi");
    }

    #[test]
    fn rejects_non_string_text() {
        let tool = EchoTool::new().expect("tool");
        let mut args = Payload::new();
        args.insert("text".to_string(), json!(5));
        assert!(tool.validate(&args).is_err());
    }
}
