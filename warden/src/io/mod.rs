//! Side-effecting operations: config, processes, filesystem, model backends.

pub mod backend;
pub mod config;
pub mod confirm;
pub mod events;
pub mod paths;
pub mod process;
pub mod prompt;
pub mod sandbox;
