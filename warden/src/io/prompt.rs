//! System prompt rendering.

use anyhow::{Context, Result};
use minijinja::{Environment, context};
use tracing::debug;

use crate::io::config::PromptsConfig;

const SYSTEM_TEMPLATE: &str = include_str!("prompts/system.md");

/// Template engine wrapper around minijinja.
pub struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    pub fn new() -> Result<Self> {
        let mut env = Environment::new();
        env.add_template("system", SYSTEM_TEMPLATE)
            .context("load system prompt template")?;
        Ok(Self { env })
    }

    /// Render the system prompt from config text and the tool description
    /// block.
    pub fn render_system(&self, prompts: &PromptsConfig, tools: &str) -> Result<String> {
        let template = self.env.get_template("system")?;
        let rendered = template
            .render(context! {
                system_base => prompts.system_base.trim(),
                tool_instructions => prompts.tool_instructions.trim(),
                tools => tools.trim(),
            })
            .context("render system prompt")?;
        debug!(bytes = rendered.len(), "rendered system prompt");
        Ok(rendered)
    }
}
