//! Text file tools confined to configured root directories.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde_json::{Value, json};
use tracing::debug;

use crate::core::guardrails::{FILE_READ, FILE_WRITE};
use crate::core::types::{Payload, PermissionLevel};
use crate::io::paths::resolve_in_roots;
use crate::tools::{ParamSchema, Tool, str_arg};

/// Reads UTF-8 text below one of the read roots.
#[derive(Debug)]
pub struct FileReadTool {
    roots: Vec<PathBuf>,
    schema: ParamSchema,
}

impl FileReadTool {
    pub fn new(roots: Vec<PathBuf>) -> Result<Self> {
        let schema = ParamSchema::new(json!({
            "type": "object",
            "properties": {"path": {"type": "string"}},
            "required": ["path"],
            "additionalProperties": false,
        }))?;
        Ok(Self { roots, schema })
    }
}

impl Tool for FileReadTool {
    fn name(&self) -> &str {
        FILE_READ
    }

    fn description(&self) -> &str {
        "Read text from an allowed file path."
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
        let user_path = str_arg(args, "path")?;
        let path = resolve_in_roots(&self.roots, user_path)?;
        let content =
            fs::read_to_string(&path).with_context(|| format!("read {user_path}"))?;
        debug!(path = %path.display(), bytes = content.len(), "file read");

        let mut out = Payload::new();
        out.insert("content".to_string(), Value::String(content));
        Ok(out)
    }
}

/// Writes UTF-8 text below one of the write roots, creating parent
/// directories as needed.
#[derive(Debug)]
pub struct FileWriteTool {
    roots: Vec<PathBuf>,
    schema: ParamSchema,
}

impl FileWriteTool {
    pub fn new(roots: Vec<PathBuf>) -> Result<Self> {
        let schema = ParamSchema::new(json!({
            "type": "object",
            "properties": {
                "path": {"type": "string"},
                "content": {"type": "string"},
            },
            "required": ["path", "content"],
            "additionalProperties": false,
        }))?;
        Ok(Self { roots, schema })
    }
}

impl Tool for FileWriteTool {
    fn name(&self) -> &str {
        FILE_WRITE
    }

    fn description(&self) -> &str {
        "Write text content to an allowed file path."
    }

    fn parameters(&self) -> &Value {
        self.schema.value()
    }

    fn permission_level(&self) -> PermissionLevel {
        PermissionLevel::Write
    }

    fn validate(&self, args: &Payload) -> Result<(), String> {
        self.schema.check(args)
    }

    fn run(&self, args: &Payload) -> Result<Payload> {
        let user_path = str_arg(args, "path")?;
        let content = str_arg(args, "content")?;

        for root in &self.roots {
            fs::create_dir_all(root)
                .with_context(|| format!("create write root {}", root.display()))?;
        }
        let path = resolve_in_roots(&self.roots, user_path)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("create parent of {user_path}"))?;
        }
        fs::write(&path, content).with_context(|| format!("write {user_path}"))?;
        debug!(path = %path.display(), bytes = content.len(), "file written");

        let mut out = Payload::new();
        out.insert("written".to_string(), Value::Bool(true));
        out.insert("bytes".to_string(), Value::from(content.len()));
        Ok(out)
    }
}
