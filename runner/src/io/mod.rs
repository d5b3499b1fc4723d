//! I/O adapters for the migration workflow.

pub mod config;
pub mod gateway;
pub mod git;
pub mod hybrid;
pub mod process;
pub mod unit_store;
