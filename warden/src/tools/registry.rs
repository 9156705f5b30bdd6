//! Tool registry and its authorization pipeline.
//!
//! `execute` never fails. Each invocation passes, in order:
//!
//! 1. guardrail lookup (unknown names are blocked)
//! 2. permission check against the guardrail's required level
//! 3. registration check
//! 4. argument validation
//! 5. `run` inside a fault boundary that catches errors and panics

use std::any::Any;
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};

use anyhow::{Result, bail};
use tracing::{debug, info, instrument, warn};

use crate::core::guardrails::GuardrailTable;
use crate::core::permissions::PermissionPolicy;
use crate::core::types::{Payload, ToolOutcome, canonical};
use crate::tools::Tool;

#[derive(Debug)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Box<dyn Tool>>,
    guardrails: GuardrailTable,
    permissions: PermissionPolicy,
}

impl ToolRegistry {
    /// Empty registry using the default guardrail table.
    pub fn new(permissions: PermissionPolicy) -> Self {
        Self::with_guardrails(permissions, GuardrailTable::default())
    }

    pub fn with_guardrails(permissions: PermissionPolicy, guardrails: GuardrailTable) -> Self {
        Self {
            tools: BTreeMap::new(),
            guardrails,
            permissions,
        }
    }

    /// Register `tool` under its name. A later registration with the same
    /// name replaces the earlier one.
    ///
    /// A tool whose declared level disagrees with its guardrail entry is
    /// rejected: the guardrail level is what gets enforced.
    pub fn register(&mut self, tool: Box<dyn Tool>) -> Result<()> {
        let name = tool.name().to_string();
        let declared = tool.permission_level();
        if let Some(required) = self.guardrails.required_level(&name) {
            if required != declared {
                bail!("tool {name} declares {declared} access but its guardrail requires {required}");
            }
        }
        if self.tools.insert(name.clone(), tool).is_some() {
            debug!(tool = %name, "replaced previously registered tool");
        }
        Ok(())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tools.keys().map(String::as_str)
    }

    /// One line per registered tool, sorted by name.
    pub fn describe_tools(&self) -> String {
        if self.tools.is_empty() {
            return "No tools enabled.".to_string();
        }
        self.tools
            .values()
            .map(|tool| {
                format!(
                    "- {}: {} | schema={}",
                    tool.name(),
                    tool.description(),
                    canonical(tool.parameters())
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[instrument(skip_all, fields(tool = name))]
    pub fn execute(&self, name: &str, args: &Payload) -> ToolOutcome {
        let Some(level) = self.guardrails.required_level(name) else {
            info!("unknown tool");
            return ToolOutcome::blocked(format!("unknown tool: {name}"));
        };
        if !self.permissions.is_allowed(level, Some(name)) {
            info!(level = %level, mode = %self.permissions.mode(), "permission denied");
            return ToolOutcome::blocked(format!("permission denied for {name}"));
        }
        let Some(tool) = self.tools.get(name) else {
            info!("tool not enabled");
            return ToolOutcome::blocked(format!("tool not enabled: {name}"));
        };
        if let Err(message) = tool.validate(args) {
            info!(message = %message, "invalid tool arguments");
            return ToolOutcome::blocked(message);
        }

        match panic::catch_unwind(AssertUnwindSafe(|| tool.run(args))) {
            Ok(Ok(payload)) => {
                let outcome = ToolOutcome::from_payload(payload);
                debug!(
                    success = outcome.success(),
                    blocked = outcome.is_blocked(),
                    "tool finished"
                );
                outcome
            }
            Ok(Err(err)) => {
                warn!(err = %format!("{err:#}"), "tool failed");
                ToolOutcome::blocked(format!("{err:#}"))
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                warn!(message = %message, "tool panicked");
                ToolOutcome::blocked(message)
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(text) = panic.downcast_ref::<&str>() {
        format!("tool panicked: {text}")
    } else if let Some(text) = panic.downcast_ref::<String>() {
        format!("tool panicked: {text}")
    } else {
        "tool panicked".to_string()
    }
}
