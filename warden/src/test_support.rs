//! Test helpers: a scripted model backend, a recording event sink and a
//! throwaway workspace with a config file.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result, anyhow};

use crate::core::types::Conversation;
use crate::io::backend::ModelBackend;
use crate::io::config::{DEFAULT_CONFIG_FILE, WardenConfig, write_config};
use crate::io::events::{Event, EventKind, EventSink};

/// Backend that replays raw responses in order and records every
/// conversation it was shown. Errors once the script runs out.
#[derive(Debug, Default)]
pub struct ScriptedBackend {
    script: Mutex<Vec<String>>,
    seen: Mutex<Vec<Conversation>>,
}

impl ScriptedBackend {
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut script: Vec<String> = responses.into_iter().map(Into::into).collect();
        script.reverse();
        Self {
            script: Mutex::new(script),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Number of `generate` calls so far.
    pub fn calls(&self) -> usize {
        self.seen.lock().map(|seen| seen.len()).unwrap_or_default()
    }

    /// Conversation snapshot passed to each call, in call order.
    pub fn conversations(&self) -> Vec<Conversation> {
        self.seen.lock().map(|seen| seen.clone()).unwrap_or_default()
    }
}

impl ModelBackend for ScriptedBackend {
    fn generate(&self, conversation: &Conversation) -> Result<String> {
        self.seen
            .lock()
            .map_err(|_| anyhow!("scripted backend lock poisoned"))?
            .push(conversation.clone());
        self.script
            .lock()
            .map_err(|_| anyhow!("scripted backend lock poisoned"))?
            .pop()
            .ok_or_else(|| anyhow!("scripted backend exhausted"))
    }
}

/// Sink that keeps every event in memory.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<Event>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn kinds(&self) -> Vec<EventKind> {
        self.events().iter().map(|e| e.event_type).collect()
    }
}

impl EventSink for RecordingSink {
    fn record(&self, event: &Event) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}

/// Temporary directory holding a `workspace/` root and a config whose paths
/// all point inside the temp dir.
pub struct TestWorkspace {
    temp: tempfile::TempDir,
}

impl TestWorkspace {
    pub fn new() -> Result<Self> {
        let temp = tempfile::tempdir().context("create temp dir")?;
        fs::create_dir_all(temp.path().join("workspace")).context("create workspace")?;
        Ok(Self { temp })
    }

    pub fn root(&self) -> &Path {
        self.temp.path()
    }

    pub fn workspace(&self) -> PathBuf {
        self.root().join("workspace")
    }

    pub fn config_path(&self) -> PathBuf {
        self.root().join(DEFAULT_CONFIG_FILE)
    }

    /// Default config rebased onto this temp dir.
    pub fn config(&self) -> WardenConfig {
        let mut cfg = WardenConfig::default();
        cfg.safety.sandbox.working_dir = self.workspace();
        cfg.tools.file_access.allowed_read_paths = vec![self.workspace()];
        cfg.tools.file_access.allowed_write_paths = vec![self.workspace()];
        cfg.observability.log_dir = self.root().join("logs");
        cfg
    }

    pub fn write_config(&self, cfg: &WardenConfig) -> Result<PathBuf> {
        let path = self.config_path();
        write_config(&path, cfg)?;
        Ok(path)
    }
}
