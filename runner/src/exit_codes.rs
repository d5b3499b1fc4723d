//! Stable exit codes for the migration runner CLI.

/// Every recognized unit is resolved.
pub const OK: i32 = 0;
/// A unit failed, or a commit/metadata/hybrid step failed mid-run.
pub const FAILED: i32 = 1;
/// Invalid arguments, configuration, or project layout. Also used by clap for usage errors.
pub const INVALID: i32 = 2;
