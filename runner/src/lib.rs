//! Incremental, file-by-file migration orchestrator.
//!
//! A feature's unit tree holds one placeholder file per variable or function.
//! The runner fills each placeholder through an external translator, builds,
//! repairs with a bounded fix loop, and checkpoints every step in git so an
//! interrupted run resumes by rescanning. The architecture enforces a strict
//! separation:
//!
//! - **[`core`]**: Pure, deterministic logic (classification, path conventions,
//!   diagnostic attribution, fix budget). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (config, processes, git, external tools).
//!   Behind traits so tests can script them.
//!
//! Orchestration modules ([`feature`], [`step`], [`orchestrator`]) coordinate
//! core logic with I/O.

pub mod core;
pub mod error;
pub mod exit_codes;
pub mod feature;
pub mod io;
pub mod logging;
pub mod orchestrator;
pub mod step;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
