//! Stable exit codes for the bootstrap CLI.

/// Command succeeded; the tool is ready to run.
pub const OK: i32 = 0;
/// Bootstrap aborted (fetch, checkout, missing build tool, build failure, I/O).
pub const FAILED: i32 = 1;
/// Unknown resource name or invalid invocation.
pub const USAGE: i32 = 2;
/// The checkout was mutated and the launcher must start over (`--no-reexec`).
pub const RESTART: i32 = 75;
