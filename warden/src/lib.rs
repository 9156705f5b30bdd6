//! Trust-boundary tool orchestration for a ReAct agent.
//!
//! Untrusted model output is parsed into a strict action protocol, and every
//! tool it requests passes a layered authorization pipeline before touching
//! the filesystem or spawning a process. The crate keeps a strict separation:
//!
//! - **[`core`]**: Pure logic (protocol parsing, permissions, guardrails,
//!   redaction). No I/O.
//! - **[`io`]**: Side effects (config, processes, sandbox, path confinement,
//!   event log, model backends).
//!
//! [`tools`] holds the tool trait and registry, [`react`] the control loop and
//! [`agent`] wires everything from configuration.

pub mod agent;
pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod react;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod tools;
