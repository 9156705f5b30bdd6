use std::time::Duration;

use anyhow::{Result, anyhow};
use serde_json::{Value, json};

use crate::core::guardrails::SHELL;
use crate::core::types::{Payload, PermissionLevel};
use crate::io::sandbox::Sandbox;
use crate::tools::{ParamSchema, Tool};

/// Runs an argument vector through the sandbox.
///
/// The returned payload carries the sandbox's own `success`, `blocked` and
/// `error` fields so the registry reports sandbox refusals as blocked.
#[derive(Debug)]
pub struct ShellTool {
    sandbox: Sandbox,
    schema: ParamSchema,
}

impl ShellTool {
    pub fn new(sandbox: Sandbox) -> Result<Self> {
        let schema = ParamSchema::new(json!({
            "type": "object",
            "properties": {
                "cmd": {"type": "array", "items": {"type": "string"}},
                "timeout_secs": {"type": "integer", "minimum": 1},
            },
            "required": ["cmd"],
            "additionalProperties": false,
        }))?;
        Ok(Self { sandbox, schema })
    }
}

impl Tool for ShellTool {
    fn name(&self) -> &str {
        SHELL
    }

    fn description(&self) -> &str {
        "Execute a restricted command in the sandbox."
    }

    fn parameters(&self) -> &Value {
        self.schema.value()
    }

    fn permission_level(&self) -> PermissionLevel {
        PermissionLevel::System
    }

    fn validate(&self, args: &Payload) -> Result<(), String> {
        self.schema.check(args)
    }

    fn run(&self, args: &Payload) -> Result<Payload> {
        let argv = args
            .get("cmd")
            .and_then(Value::as_array)
            .ok_or_else(|| anyhow!("argument 'cmd' must be an array of strings"))?
            .iter()
            .map(|item| {
                item.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| anyhow!("argument 'cmd' must be an array of strings"))
            })
            .collect::<Result<Vec<_>>>()?;
        let timeout = args
            .get("timeout_secs")
            .and_then(Value::as_u64)
            .map(Duration::from_secs);

        Ok(self.sandbox.execute_with_timeout(&argv, timeout).to_payload())
    }
}
