//! Static guardrail table: tool name → required permission level.
//!
//! The table is the first gate of the registry pipeline. A name missing from
//! it is rejected before permission checks, validation or execution.

use std::collections::BTreeMap;

use crate::core::types::PermissionLevel;

/// Built-in tool names known to the default table.
pub const ECHO: &str = "echo";
pub const FILE_READ: &str = "file_read";
pub const FILE_WRITE: &str = "file_write";
pub const SHELL: &str = "shell";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardrailTable {
    levels: BTreeMap<String, PermissionLevel>,
}

impl GuardrailTable {
    /// Table with no entries; every tool is unknown.
    pub fn empty() -> Self {
        Self {
            levels: BTreeMap::new(),
        }
    }

    /// Add or replace an entry.
    pub fn with(mut self, name: impl Into<String>, level: PermissionLevel) -> Self {
        self.levels.insert(name.into(), level);
        self
    }

    /// Required level for `name`, or `None` for unknown tools.
    pub fn required_level(&self, name: &str) -> Option<PermissionLevel> {
        self.levels.get(name).copied()
    }

}

impl Default for GuardrailTable {
    fn default() -> Self {
        Self::empty()
            .with(SHELL, PermissionLevel::System)
            .with(FILE_READ, PermissionLevel::Read)
            .with(FILE_WRITE, PermissionLevel::Write)
            .with(ECHO, PermissionLevel::Read)
    }
}
