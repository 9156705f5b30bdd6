//! Stable exit codes for `warden` CLI commands.

/// Command succeeded.
pub const OK: i32 = 0;
/// Invalid config, arguments or paths, or any other error.
pub const INVALID: i32 = 1;
/// The sandbox or the registry blocked the request.
pub const BLOCKED: i32 = 2;
