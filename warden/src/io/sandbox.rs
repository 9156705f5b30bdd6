//! Sandboxed command executor.
//!
//! Commands run as an argument vector (never through a shell) after passing an
//! ordered set of gates. Each gate short-circuits with a blocked outcome:
//!
//! 1. empty command
//! 2. joined command text matches a dangerous pattern
//! 3. first token not an exact member of the allow-list
//! 4. any token equal to, or containing, a blocked token
//!
//! Surviving commands run inside the fixed working directory under a hard
//! wall-clock timeout. A non-zero exit is a normal, successful outcome; only a
//! timeout or launch failure is reported as blocked.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use regex::Regex;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::core::types::{Payload, ToolOutcome};
use crate::io::config::SafetyConfig;
use crate::io::process::run_command_with_timeout;

pub const EMPTY_COMMAND: &str = "empty command";
pub const DANGEROUS_PATTERN: &str = "dangerous pattern blocked";
pub const NOT_ALLOWLISTED: &str = "command not in allowlist";
pub const BLOCKED_TOKEN: &str = "blocked token in command";
pub const TIMED_OUT: &str = "command timed out";

/// Immutable execution policy.
#[derive(Debug, Clone)]
pub struct SandboxPolicy {
    pub working_dir: PathBuf,
    pub timeout: Duration,
    pub allowed_commands: BTreeSet<String>,
    pub blocked_tokens: Vec<String>,
    pub dangerous_patterns: Vec<Regex>,
    pub output_limit_bytes: usize,
}

impl SandboxPolicy {
    /// Build a policy from the `[safety]` config section.
    pub fn from_config(cfg: &SafetyConfig) -> Result<Self> {
        let dangerous_patterns = compile_patterns(&cfg.dangerous_patterns)?;
        Ok(Self {
            working_dir: cfg.sandbox.working_dir.clone(),
            timeout: Duration::from_secs(cfg.sandbox.timeout_secs),
            allowed_commands: cfg.sandbox.allowed_commands.iter().cloned().collect(),
            blocked_tokens: cfg.sandbox.blocked_tokens.clone(),
            dangerous_patterns,
            output_limit_bytes: cfg.sandbox.output_limit_bytes,
        })
    }
}

/// Compile dangerous-pattern regexes, naming the offending pattern on failure.
pub fn compile_patterns(patterns: &[String]) -> Result<Vec<Regex>> {
    patterns
        .iter()
        .map(|pattern| {
            Regex::new(pattern).map_err(|err| anyhow!("invalid dangerous pattern '{pattern}': {err}"))
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct Sandbox {
    policy: SandboxPolicy,
}

impl Sandbox {
    pub fn new(policy: SandboxPolicy) -> Self {
        Self { policy }
    }

    /// Apply the pre-execution gates without running anything.
    ///
    /// Returns the blocking reason of the first gate that fails.
    pub fn check(&self, command: &[String]) -> Result<(), &'static str> {
        let Some(program) = command.first() else {
            return Err(EMPTY_COMMAND);
        };

        let joined = command.join(" ");
        if self
            .policy
            .dangerous_patterns
            .iter()
            .any(|pattern| pattern.is_match(&joined))
        {
            return Err(DANGEROUS_PATTERN);
        }

        if !self.policy.allowed_commands.contains(program) {
            return Err(NOT_ALLOWLISTED);
        }

        let has_blocked_token = command.iter().any(|token| {
            self.policy
                .blocked_tokens
                .iter()
                .any(|blocked| token == blocked || token.contains(blocked.as_str()))
        });
        if has_blocked_token {
            return Err(BLOCKED_TOKEN);
        }

        Ok(())
    }

    /// Run `command` under the policy timeout.
    pub fn execute(&self, command: &[String]) -> ToolOutcome {
        self.execute_with_timeout(command, None)
    }

    /// Run `command`; `timeout` may only shorten the policy timeout.
    #[instrument(skip_all, fields(program = command.first().map(String::as_str).unwrap_or("")))]
    pub fn execute_with_timeout(&self, command: &[String], timeout: Option<Duration>) -> ToolOutcome {
        if let Err(reason) = self.check(command) {
            info!(reason, "sandbox blocked command");
            return ToolOutcome::blocked(reason);
        }

        let timeout = timeout
            .map(|requested| requested.min(self.policy.timeout))
            .unwrap_or(self.policy.timeout);

        match self.spawn(command, timeout) {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(err = %format!("{err:#}"), "sandboxed command failed to launch");
                ToolOutcome::blocked(format!("{err:#}"))
            }
        }
    }

    fn spawn(&self, command: &[String], timeout: Duration) -> Result<ToolOutcome> {
        ensure_dir(&self.policy.working_dir)?;

        let mut cmd = Command::new(&command[0]);
        cmd.args(&command[1..]).current_dir(&self.policy.working_dir);

        let output = run_command_with_timeout(cmd, timeout, self.policy.output_limit_bytes)
            .with_context(|| format!("launch {}", command[0]))?;

        if output.timed_out {
            return Ok(ToolOutcome::blocked(TIMED_OUT));
        }

        debug!(exit_code = ?output.status.code(), "sandboxed command finished");
        let mut payload = Payload::new();
        payload.insert("stdout".to_string(), Value::String(output.stdout_lossy()));
        payload.insert("stderr".to_string(), Value::String(output.stderr_lossy()));
        payload.insert(
            "returncode".to_string(),
            output.status.code().map_or(Value::Null, Value::from),
        );
        Ok(ToolOutcome::completed(payload))
    }
}

fn ensure_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path)
        .with_context(|| format!("create sandbox working dir {}", path.display()))
}
