//! Permission policy: which capability levels a mode grants.
//!
//! | mode | read  | write | system/network/delete |
//! |------|-------|-------|-----------------------|
//! | deny | allow | deny  | deny                  |
//! | auto | allow | allow | deny                  |
//! | ask  | allow | allow | confirmer decides     |

use std::fmt;
use std::str::FromStr;

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::types::PermissionLevel;

/// Global permission knob.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionMode {
    #[default]
    Deny,
    Auto,
    Ask,
}

impl PermissionMode {
    pub fn as_str(self) -> &'static str {
        match self {
            PermissionMode::Deny => "deny",
            PermissionMode::Auto => "auto",
            PermissionMode::Ask => "ask",
        }
    }
}

impl fmt::Display for PermissionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PermissionMode {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.trim() {
            "deny" => Ok(PermissionMode::Deny),
            "auto" => Ok(PermissionMode::Auto),
            "ask" => Ok(PermissionMode::Ask),
            other => Err(anyhow!(
                "permission mode must be one of: deny, auto, ask (got '{other}')"
            )),
        }
    }
}

/// Human-in-the-loop seam consulted in `ask` mode for elevated levels.
pub trait Confirmer: Send + Sync {
    fn confirm(&self, level: PermissionLevel, action_label: Option<&str>) -> bool;
}

/// Confirmer that refuses everything. Used when no interactive UI exists.
#[derive(Debug, Clone, Copy, Default)]
pub struct DenyConfirmer;

impl Confirmer for DenyConfirmer {
    fn confirm(&self, _level: PermissionLevel, _action_label: Option<&str>) -> bool {
        false
    }
}

/// Pure function of `(mode, level)` plus the injected confirmer.
pub struct PermissionPolicy {
    mode: PermissionMode,
    confirmer: Box<dyn Confirmer>,
}

impl PermissionPolicy {
    /// Policy with the default (always deny) confirmer.
    pub fn new(mode: PermissionMode) -> Self {
        Self::with_confirmer(mode, Box::new(DenyConfirmer))
    }

    pub fn with_confirmer(mode: PermissionMode, confirmer: Box<dyn Confirmer>) -> Self {
        Self { mode, confirmer }
    }

    pub fn mode(&self) -> PermissionMode {
        self.mode
    }

    pub fn is_allowed(&self, level: PermissionLevel, action_label: Option<&str>) -> bool {
        let baseline = matches!(level, PermissionLevel::Read | PermissionLevel::Write);
        match self.mode {
            PermissionMode::Deny => level == PermissionLevel::Read,
            PermissionMode::Auto => baseline,
            PermissionMode::Ask => baseline || self.confirmer.confirm(level, action_label),
        }
    }
}

impl fmt::Debug for PermissionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PermissionPolicy")
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}
