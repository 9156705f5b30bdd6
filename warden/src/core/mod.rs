//! Pure logic shared by the engine.
//!
//! Core modules are free of I/O side effects. They operate on in-memory data
//! and return deterministic outputs suitable for tests.

pub mod guardrails;
pub mod permissions;
pub mod protocol;
pub mod redact;
pub mod types;
