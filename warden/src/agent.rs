//! Agent assembly: wires config into a registry, a backend, an event sink
//! and the ReAct loop.

use std::num::NonZeroUsize;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, instrument};

use crate::core::guardrails::{FILE_READ, FILE_WRITE, SHELL};
use crate::core::permissions::{Confirmer, DenyConfirmer, PermissionPolicy};
use crate::io::backend::{ModelBackend, NullBackend, ScriptedFileBackend};
use crate::io::config::{BackendKind, WardenConfig};
use crate::io::events::{EventSink, JsonlEventLog, NoopSink, new_run_id};
use crate::io::prompt::PromptEngine;
use crate::io::sandbox::{Sandbox, SandboxPolicy};
use crate::react::{ReactLoop, RunIds, RunOutcome};
use crate::tools::{EchoTool, FileReadTool, FileWriteTool, ShellTool, ToolRegistry};

pub struct Agent {
    registry: ToolRegistry,
    backend: Box<dyn ModelBackend>,
    sink: Box<dyn EventSink>,
    system_prompt: String,
    max_steps: NonZeroUsize,
}

/// Build the tool registry described by `cfg`. `echo` is always registered.
pub fn build_registry(cfg: &WardenConfig, confirmer: Box<dyn Confirmer>) -> Result<ToolRegistry> {
    let policy = PermissionPolicy::with_confirmer(cfg.safety.permission_mode, confirmer);
    let mut registry = ToolRegistry::new(policy);
    registry.register(Box::new(EchoTool::new()?))?;

    let access = &cfg.tools.file_access;
    for name in &cfg.tools.enabled {
        match name.as_str() {
            FILE_READ => registry.register(Box::new(FileReadTool::new(
                access.allowed_read_paths.clone(),
            )?))?,
            FILE_WRITE => registry.register(Box::new(FileWriteTool::new(
                access.allowed_write_paths.clone(),
            )?))?,
            SHELL => {
                let policy = SandboxPolicy::from_config(&cfg.safety)?;
                registry.register(Box::new(ShellTool::new(Sandbox::new(policy))?))?;
            }
            _ => {}
        }
    }
    debug!(tools = ?registry.names().collect::<Vec<_>>(), "registry built");
    Ok(registry)
}

/// Construct the configured model backend.
pub fn build_backend(cfg: &WardenConfig) -> Result<Box<dyn ModelBackend>> {
    match cfg.model.backend {
        BackendKind::Null => Ok(Box::new(NullBackend::new())),
        BackendKind::Scripted => {
            let path = cfg
                .model
                .script_path
                .as_deref()
                .ok_or_else(|| anyhow!("model.script_path is required for the scripted backend"))?;
            Ok(Box::new(ScriptedFileBackend::load(path)?))
        }
    }
}

fn build_sink(cfg: &WardenConfig) -> Result<Box<dyn EventSink>> {
    if cfg.observability.enabled {
        Ok(Box::new(JsonlEventLog::open(&cfg.observability)?))
    } else {
        Ok(Box::new(NoopSink))
    }
}

impl Agent {
    /// Assemble an agent with the default (always deny) confirmer.
    pub fn from_config(cfg: &WardenConfig) -> Result<Self> {
        Self::with_confirmer(cfg, Box::new(DenyConfirmer))
    }

    pub fn with_confirmer(cfg: &WardenConfig, confirmer: Box<dyn Confirmer>) -> Result<Self> {
        cfg.validate()?;
        let registry = build_registry(cfg, confirmer)?;
        let backend = build_backend(cfg)?;
        let sink = build_sink(cfg)?;
        Self::assemble(cfg, registry, backend, sink)
    }

    /// Assemble from prebuilt parts; prompts and `max_steps` still come from
    /// `cfg`.
    pub fn assemble(
        cfg: &WardenConfig,
        registry: ToolRegistry,
        backend: Box<dyn ModelBackend>,
        sink: Box<dyn EventSink>,
    ) -> Result<Self> {
        let max_steps = NonZeroUsize::new(cfg.agent.max_steps)
            .ok_or_else(|| anyhow!("agent.max_steps must be > 0"))?;
        let system_prompt = PromptEngine::new()?
            .render_system(&cfg.prompts, &registry.describe_tools())
            .context("build system prompt")?;
        Ok(Self {
            registry,
            backend,
            sink,
            system_prompt,
            max_steps,
        })
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// Answer one user message with a fresh run id.
    pub fn respond(&self, user_message: &str, session_id: &str) -> Result<String> {
        Ok(self.run(user_message, session_id)?.answer)
    }

    /// Like [`Agent::respond`] but returns the full run outcome.
    #[instrument(skip_all, fields(session_id = session_id))]
    pub fn run(&self, user_message: &str, session_id: &str) -> Result<RunOutcome> {
        let run_id = new_run_id();
        let ids = RunIds {
            run_id: &run_id,
            session_id,
        };
        let outcome = ReactLoop::new(
            self.backend.as_ref(),
            &self.registry,
            self.sink.as_ref(),
            self.max_steps,
        )
        .run(&self.system_prompt, user_message, ids)?;
        info!(
            run_id = %run_id,
            stop = ?outcome.stop,
            model_calls = outcome.model_calls,
            "run finished"
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::permissions::PermissionMode;
    use crate::react::LoopStop;
    use crate::test_support::{RecordingSink, ScriptedBackend, TestWorkspace};
    use std::fs;

    fn agent(ws: &TestWorkspace, mutate: impl FnOnce(&mut WardenConfig)) -> Agent {
        let mut cfg = ws.config();
        mutate(&mut cfg);
        Agent::from_config(&cfg).expect("agent")
    }

    #[test]
    fn plain_message_round_trips_through_null_backend() {
        let ws = TestWorkspace::new().expect("workspace");
        let agent = agent(&ws, |_| {});
        assert_eq!(agent.respond("hello", "s1").expect("respond"), "NullBackend: hello");
    }

    #[test]
    fn echo_tool_round_trip() {
        let ws = TestWorkspace::new().expect("workspace");
        let agent = agent(&ws, |_| {});
        let outcome = agent.run("please use_tool now", "s1").expect("run");
        assert_eq!(outcome.answer, "Tool returned: hi");
        assert!(
            outcome
                .conversation
                .turns()
                .iter()
                .any(|turn| turn.content.starts_with("[tool_result]"))
        );
    }

    #[test]
    fn file_write_needs_write_permission() {
        let ws = TestWorkspace::new().expect("workspace");
        let denied = agent(&ws, |_| {});
        assert_eq!(
            denied.respond("file_write demo", "s1").expect("respond"),
            "Tool blocked; proceeding safely."
        );
        assert!(!ws.workspace().join("demo.txt").exists());

        let allowed = agent(&ws, |cfg| cfg.safety.permission_mode = PermissionMode::Auto);
        assert_eq!(
            allowed.respond("file_write demo", "s1").expect("respond"),
            "Write completed."
        );
        assert_eq!(
            fs::read_to_string(ws.workspace().join("demo.txt")).expect("read"),
            "hello from tool"
        );
        assert_eq!(
            allowed.respond("file_read demo", "s1").expect("respond"),
            "Read: hello from tool"
        );
    }

    #[test]
    fn shell_is_blocked_even_in_auto_mode() {
        let ws = TestWorkspace::new().expect("workspace");
        let agent = agent(&ws, |cfg| {
            cfg.safety.permission_mode = PermissionMode::Auto;
            cfg.tools.enabled.push(SHELL.to_string());
        });
        assert_eq!(
            agent.respond("shell_block", "s1").expect("respond"),
            "Tool blocked; proceeding safely."
        );
    }

    #[test]
    fn broken_json_is_repaired_once() {
        let ws = TestWorkspace::new().expect("workspace");
        let agent = agent(&ws, |_| {});
        assert_eq!(
            agent.respond("break_json", "s1").expect("respond"),
            "Recovered after protocol repair."
        );
    }

    #[test]
    fn events_land_in_the_log_dir() {
        let ws = TestWorkspace::new().expect("workspace");
        let agent = agent(&ws, |_| {});
        agent.respond("hello", "s1").expect("respond");
        let logs = fs::read_dir(ws.root().join("logs"))
            .expect("log dir")
            .count();
        assert_eq!(logs, 1);
    }

    #[test]
    fn system_prompt_lists_enabled_tools() {
        let ws = TestWorkspace::new().expect("workspace");
        let agent = agent(&ws, |cfg| cfg.tools.enabled.clear());
        assert!(agent.system_prompt().contains("- echo: Echoes provided text."));
        assert!(!agent.system_prompt().contains("file_read"));
    }

    #[test]
    fn assembled_agent_uses_injected_parts() {
        let ws = TestWorkspace::new().expect("workspace");
        let cfg = ws.config();
        let registry = build_registry(&cfg, Box::new(DenyConfirmer)).expect("registry");
        let backend = ScriptedBackend::new([r#"{"type":"final","content":"scripted"}"#]);
        let agent = Agent::assemble(
            &cfg,
            registry,
            Box::new(backend),
            Box::new(RecordingSink::new()),
        )
        .expect("agent");
        let outcome = agent.run("hi", "s9").expect("run");
        assert_eq!(outcome.answer, "scripted");
        assert_eq!(outcome.stop, LoopStop::Final);
    }
}
