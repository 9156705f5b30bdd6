//! Structured run events and the JSONL event log.
//!
//! Every phase of a run reports to an [`EventSink`]. Sinks never fail the
//! caller: write errors are logged through `tracing` and dropped.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::warn;

use crate::core::redact::redact;
use crate::core::types::canonical;
use crate::io::config::ObservabilityConfig;

/// Data keys carrying model text or tool payloads.
const PAYLOAD_KEYS: [&str; 4] = ["args", "content", "payload", "raw"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    RunStarted,
    ModelOutput,
    ProtocolError,
    RepairRequested,
    ToolCall,
    ToolResult,
    ToolBlocked,
    BudgetExhausted,
    FinalAnswer,
    RunAborted,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::RunStarted => "run_started",
            EventKind::ModelOutput => "model_output",
            EventKind::ProtocolError => "protocol_error",
            EventKind::RepairRequested => "repair_requested",
            EventKind::ToolCall => "tool_call",
            EventKind::ToolResult => "tool_result",
            EventKind::ToolBlocked => "tool_blocked",
            EventKind::BudgetExhausted => "budget_exhausted",
            EventKind::FinalAnswer => "final_answer",
            EventKind::RunAborted => "run_aborted",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    pub ts: String,
    pub event_type: EventKind,
    pub run_id: String,
    pub session_id: String,
    pub data: Value,
}

impl Event {
    pub fn new(
        event_type: EventKind,
        run_id: impl Into<String>,
        session_id: impl Into<String>,
        data: Value,
    ) -> Self {
        Self {
            ts: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            event_type,
            run_id: run_id.into(),
            session_id: session_id.into(),
            data,
        }
    }
}

/// Destination for run events.
pub trait EventSink: Send + Sync {
    fn record(&self, event: &Event);
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl EventSink for NoopSink {
    fn record(&self, _event: &Event) {}
}

/// Fresh run id: UTC timestamp plus a process-local counter.
pub fn new_run_id() -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("run-{}-{seq:04}", Utc::now().format("%Y%m%dT%H%M%S%.3fZ"))
}

/// Appends events as JSON lines under `log_dir`.
#[derive(Debug)]
pub struct JsonlEventLog {
    log_dir: PathBuf,
    rotate_daily: bool,
    include_payloads: bool,
    redact_secrets: bool,
    lock: Mutex<()>,
}

impl JsonlEventLog {
    /// Create the log directory and the sink.
    pub fn open(cfg: &ObservabilityConfig) -> Result<Self> {
        fs::create_dir_all(&cfg.log_dir)
            .with_context(|| format!("create log dir {}", cfg.log_dir.display()))?;
        Ok(Self {
            log_dir: cfg.log_dir.clone(),
            rotate_daily: cfg.rotate_daily,
            include_payloads: cfg.include_payloads,
            redact_secrets: cfg.redact_secrets,
            lock: Mutex::new(()),
        })
    }

    /// File the next event goes to.
    pub fn current_path(&self) -> PathBuf {
        if self.rotate_daily {
            let day = Utc::now().format("%Y-%m-%d");
            self.log_dir.join(format!("events-{day}.jsonl"))
        } else {
            self.log_dir.join("events.jsonl")
        }
    }

    fn render(&self, event: &Event) -> Result<String> {
        let mut data = event.data.clone();
        if !self.include_payloads {
            strip_payloads(&mut data);
        }
        if self.redact_secrets {
            data = redact(&data);
        }
        let record = Event {
            data,
            ..event.clone()
        };
        let value = serde_json::to_value(&record).context("serialize event")?;
        let mut line = canonical(&value).to_string();
        line.push('\n');
        Ok(line)
    }

    fn append(&self, path: &Path, line: &str) -> Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("open event log {}", path.display()))?;
        file.write_all(line.as_bytes())
            .with_context(|| format!("append event log {}", path.display()))
    }
}

impl EventSink for JsonlEventLog {
    fn record(&self, event: &Event) {
        let path = self.current_path();
        let result = self
            .render(event)
            .and_then(|line| self.append(&path, &line));
        if let Err(err) = result {
            warn!(err = %format!("{err:#}"), event = event.event_type.as_str(), "event log write failed");
        }
    }
}

fn strip_payloads(data: &mut Value) {
    if let Value::Object(map) = data {
        let stripped: Map<String, Value> = std::mem::take(map)
            .into_iter()
            .filter(|(key, _)| !PAYLOAD_KEYS.contains(&key.as_str()))
            .collect();
        *map = stripped;
    }
}
