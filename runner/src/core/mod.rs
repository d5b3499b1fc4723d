//! Deterministic, pure logic shared by the migration workflow.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data and return deterministic outputs suitable for tests.

pub mod diagnostics;
pub mod fix_budget;
pub mod progress;
pub mod types;
pub mod unit;
