//! Agent configuration stored in `warden.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result, anyhow, bail};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::guardrails::{ECHO, FILE_READ, FILE_WRITE, SHELL};
use crate::core::permissions::PermissionMode;
use crate::io::sandbox::compile_patterns;

pub const DEFAULT_CONFIG_FILE: &str = "warden.toml";

pub const ENV_MAX_STEPS: &str = "WARDEN_AGENT_MAX_STEPS";
pub const ENV_BACKEND: &str = "WARDEN_MODEL_BACKEND";
pub const ENV_PERMISSION_MODE: &str = "WARDEN_SAFETY_PERMISSION_MODE";

const KNOWN_TOOLS: [&str; 4] = [ECHO, FILE_READ, FILE_WRITE, SHELL];

/// Agent configuration (TOML).
///
/// Intended to be edited by humans. Every section is optional; missing fields
/// take the defaults below.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WardenConfig {
    pub agent: AgentSettings,
    pub model: ModelConfig,
    pub safety: SafetyConfig,
    pub tools: ToolsConfig,
    pub prompts: PromptsConfig,
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AgentSettings {
    /// Tool-executing iterations allowed before the forced final answer.
    pub max_steps: usize,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self { max_steps: 6 }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Deterministic offline backend.
    #[default]
    Null,
    /// Replays raw responses from `script_path`.
    Scripted,
}

impl BackendKind {
    pub fn as_str(self) -> &'static str {
        match self {
            BackendKind::Null => "null",
            BackendKind::Scripted => "scripted",
        }
    }
}

impl FromStr for BackendKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "null" => Ok(BackendKind::Null),
            "scripted" => Ok(BackendKind::Scripted),
            other => Err(anyhow!(
                "model backend must be one of: null, scripted (got '{other}')"
            )),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ModelConfig {
    pub backend: BackendKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub script_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SafetyConfig {
    pub permission_mode: PermissionMode,
    /// Regexes searched against the space-joined command line.
    pub dangerous_patterns: Vec<String>,
    pub sandbox: SandboxConfig,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            permission_mode: PermissionMode::Deny,
            dangerous_patterns: ["rm -rf", "mkfs", "dd if=", r":\(\)\{"]
                .into_iter()
                .map(String::from)
                .collect(),
            sandbox: SandboxConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SandboxConfig {
    pub working_dir: PathBuf,
    pub timeout_secs: u64,
    pub allowed_commands: Vec<String>,
    pub blocked_tokens: Vec<String>,
    /// Truncate captured stdout/stderr beyond this many bytes.
    pub output_limit_bytes: usize,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            working_dir: PathBuf::from("workspace"),
            timeout_secs: 20,
            allowed_commands: ["ls", "cat", "grep", "find", "python", "git"]
                .into_iter()
                .map(String::from)
                .collect(),
            blocked_tokens: [";", "|", "&", ">", "<", "$", "`"]
                .into_iter()
                .map(String::from)
                .collect(),
            output_limit_bytes: 100_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ToolsConfig {
    /// Tools registered besides `echo`, which is always available.
    pub enabled: Vec<String>,
    pub file_access: FileAccessConfig,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            enabled: vec![FILE_READ.to_string(), FILE_WRITE.to_string()],
            file_access: FileAccessConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FileAccessConfig {
    pub allowed_read_paths: Vec<PathBuf>,
    pub allowed_write_paths: Vec<PathBuf>,
}

impl Default for FileAccessConfig {
    fn default() -> Self {
        Self {
            allowed_read_paths: vec![PathBuf::from("workspace")],
            allowed_write_paths: vec![PathBuf::from("workspace")],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PromptsConfig {
    pub system_base: String,
    pub tool_instructions: String,
}

impl Default for PromptsConfig {
    fn default() -> Self {
        Self {
            system_base: "You are Warden, a careful assistant that can use tools to help the user."
                .to_string(),
            tool_instructions: concat!(
                "Reply with exactly one JSON object and nothing else. ",
                "Use {\"type\":\"final\",\"content\":\"...\"} to answer, ",
                "{\"type\":\"tool_call\",\"name\":\"...\",\"args\":{...}} to call one tool, or ",
                "{\"type\":\"tool_calls\",\"calls\":[{\"name\":\"...\",\"args\":{...}}]} to call several."
            )
            .to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub enabled: bool,
    pub log_dir: PathBuf,
    pub rotate_daily: bool,
    pub include_payloads: bool,
    pub redact_secrets: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            log_dir: PathBuf::from("logs"),
            rotate_daily: true,
            include_payloads: true,
            redact_secrets: true,
        }
    }
}

impl WardenConfig {
    pub fn validate(&self) -> Result<()> {
        if self.agent.max_steps == 0 {
            bail!("agent.max_steps must be > 0");
        }
        let sandbox = &self.safety.sandbox;
        if sandbox.timeout_secs == 0 {
            bail!("safety.sandbox.timeout_secs must be > 0");
        }
        if sandbox.output_limit_bytes == 0 {
            bail!("safety.sandbox.output_limit_bytes must be > 0");
        }
        if sandbox.blocked_tokens.iter().any(String::is_empty) {
            bail!("safety.sandbox.blocked_tokens must not contain empty strings");
        }
        compile_patterns(&self.safety.dangerous_patterns).context("safety.dangerous_patterns")?;
        if self.model.backend == BackendKind::Scripted && self.model.script_path.is_none() {
            bail!("model.script_path is required for the scripted backend");
        }
        for name in &self.tools.enabled {
            if !KNOWN_TOOLS.contains(&name.as_str()) {
                bail!(
                    "tools.enabled names unknown tool '{name}' (known: {})",
                    KNOWN_TOOLS.join(", ")
                );
            }
        }
        Ok(())
    }

    /// Apply `WARDEN_*` overrides using `lookup` to read variables.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(ENV_MAX_STEPS) {
            self.agent.max_steps = raw
                .trim()
                .parse()
                .with_context(|| format!("{ENV_MAX_STEPS} must be a positive integer (got '{raw}')"))?;
            debug!(max_steps = self.agent.max_steps, "env override");
        }
        if let Some(raw) = lookup(ENV_BACKEND) {
            self.model.backend = raw.parse::<BackendKind>().context(ENV_BACKEND)?;
            debug!(backend = self.model.backend.as_str(), "env override");
        }
        if let Some(raw) = lookup(ENV_PERMISSION_MODE) {
            self.safety.permission_mode = raw
                .parse::<PermissionMode>()
                .context(ENV_PERMISSION_MODE)?;
            debug!(mode = self.safety.permission_mode.as_str(), "env override");
        }
        Ok(())
    }
}

/// Load config from a TOML file, then apply process environment overrides.
///
/// If the file is missing, starts from `WardenConfig::default()`.
pub fn load_config(path: &Path) -> Result<WardenConfig> {
    load_config_with_env(path, |key| std::env::var(key).ok())
}

/// Like [`load_config`] but with an injectable environment lookup.
pub fn load_config_with_env<F>(path: &Path, lookup: F) -> Result<WardenConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let mut cfg = if path.exists() {
        let contents =
            fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?
    } else {
        debug!(path = %path.display(), "config file missing, using defaults");
        WardenConfig::default()
    };
    cfg.apply_env_overrides(lookup)?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &WardenConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config_with_env(&temp.path().join("missing.toml"), no_env).expect("load");
        assert_eq!(cfg, WardenConfig::default());
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("nested/warden.toml");
        let mut cfg = WardenConfig::default();
        cfg.safety.permission_mode = PermissionMode::Ask;
        cfg.tools.enabled.push(SHELL.to_string());
        write_config(&path, &cfg).expect("write");
        assert!(!path.with_extension("toml.tmp").exists());
        let loaded = load_config_with_env(&path, no_env).expect("load");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("warden.toml");
        fs::write(
            &path,
            "[agent]\nmax_steps = 4\n\n[safety.sandbox]\nallowed_commands = [\"ls\"]\n",
        )
        .expect("write");

        let cfg = load_config_with_env(&path, no_env).expect("load");
        assert_eq!(cfg.agent.max_steps, 4);
        assert_eq!(cfg.safety.sandbox.allowed_commands, vec!["ls".to_string()]);
        assert_eq!(cfg.safety.sandbox.timeout_secs, 20);
        assert_eq!(cfg.safety.permission_mode, PermissionMode::Deny);
    }

    #[test]
    fn env_overrides_apply_after_file() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("warden.toml");
        fs::write(&path, "[agent]\nmax_steps = 4\n").expect("write");

        let env: HashMap<&str, &str> = HashMap::from([
            (ENV_MAX_STEPS, "9"),
            (ENV_PERMISSION_MODE, "auto"),
        ]);
        let cfg = load_config_with_env(&path, |key| env.get(key).map(|v| v.to_string()))
            .expect("load");
        assert_eq!(cfg.agent.max_steps, 9);
        assert_eq!(cfg.safety.permission_mode, PermissionMode::Auto);
        assert_eq!(cfg.model.backend, BackendKind::Null);
    }

    #[test]
    fn bad_env_value_is_an_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let err = load_config_with_env(&temp.path().join("missing.toml"), |key| {
            (key == ENV_BACKEND).then(|| "gpt".to_string())
        })
        .unwrap_err();
        assert!(format!("{err:#}").contains("null, scripted"));
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut cfg = WardenConfig::default();
        cfg.agent.max_steps = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = WardenConfig::default();
        cfg.safety.dangerous_patterns.push("(oops".to_string());
        assert!(cfg.validate().is_err());

        let mut cfg = WardenConfig::default();
        cfg.model.backend = BackendKind::Scripted;
        assert!(cfg.validate().is_err());

        let mut cfg = WardenConfig::default();
        cfg.tools.enabled.push("http_get".to_string());
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("http_get"));

        let mut cfg = WardenConfig::default();
        cfg.safety.sandbox.blocked_tokens.push(String::new());
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn default_validates() {
        WardenConfig::default().validate().expect("default config is valid");
    }
}
