//! Terminal failure kinds of a migration run.
//!
//! These travel inside `anyhow::Error`; callers use
//! `err.downcast_ref::<WorkflowError>()` to tell a unit failure from an
//! unexpected I/O error.

use std::path::PathBuf;

use thiserror::Error;

use crate::core::types::UnitState;

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("source counterpart {source_path} missing for unit {unit}")]
    MissingSource { unit: String, source_path: PathBuf },

    #[error("translator produced empty content for unit {unit}")]
    EmptyTranslation { unit: String },

    #[error("fixer produced empty content for unit {unit} (attempt {attempt})")]
    EmptyFix { unit: String, attempt: u32 },

    #[error(
        "unit {unit} still fails to build after {attempts} fix attempts (implicated: {})",
        display_paths(implicated)
    )]
    MaxFixIterationsExceeded {
        unit: String,
        attempts: u32,
        diagnostic_text: String,
        implicated: Vec<PathBuf>,
    },

    #[error(
        "build failed without implicating unit {unit} (implicated: {})",
        display_paths(implicated)
    )]
    UnattributedBuildFailure {
        unit: String,
        diagnostic_text: String,
        implicated: Vec<PathBuf>,
    },

    #[error("initialization of feature {feature} failed: {reason}")]
    InitFailure { feature: String, reason: String },

    #[error("checkpoint commit '{message}' failed: {reason}")]
    CommitFailure { message: String, reason: String },

    #[error("metadata update for feature {feature} failed: {reason}")]
    MetadataUpdateFailure { feature: String, reason: String },

    #[error("gate build for feature {feature} failed")]
    GateBuildFailure {
        feature: String,
        diagnostic_text: String,
    },

    #[error("hybrid {phase} command failed: {reason}")]
    HybridBuildFailure { phase: String, reason: String },

    #[error("unit {unit} was resolved earlier in this run but is empty again")]
    UnitReverted { unit: String },
}

impl WorkflowError {
    /// Short machine-friendly name of the failure kind.
    pub fn kind(&self) -> &'static str {
        match self {
            WorkflowError::MissingSource { .. } => "missing_source",
            WorkflowError::EmptyTranslation { .. } => "empty_translation",
            WorkflowError::EmptyFix { .. } => "empty_fix",
            WorkflowError::MaxFixIterationsExceeded { .. } => "max_fix_iterations_exceeded",
            WorkflowError::UnattributedBuildFailure { .. } => "unattributed_build_failure",
            WorkflowError::InitFailure { .. } => "init_failure",
            WorkflowError::CommitFailure { .. } => "commit_failure",
            WorkflowError::MetadataUpdateFailure { .. } => "metadata_update_failure",
            WorkflowError::GateBuildFailure { .. } => "gate_build_failure",
            WorkflowError::HybridBuildFailure { .. } => "hybrid_build_failure",
            WorkflowError::UnitReverted { .. } => "unit_reverted",
        }
    }
}

/// Context attached when a unit leaves the state machine through `Failed`.
#[derive(Debug, Error)]
#[error("unit {unit} failed while {state}")]
pub struct UnitFailed {
    pub unit: String,
    pub state: UnitState,
}

fn display_paths(paths: &[PathBuf]) -> String {
    if paths.is_empty() {
        return "none".to_string();
    }
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_fix_message_lists_paths() {
        let err = WorkflowError::MaxFixIterationsExceeded {
            unit: "fun_bad.rs".to_string(),
            attempts: 3,
            diagnostic_text: "boom".to_string(),
            implicated: vec![PathBuf::from("src/fun_bad.rs")],
        };
        assert_eq!(
            err.to_string(),
            "unit fun_bad.rs still fails to build after 3 fix attempts (implicated: src/fun_bad.rs)"
        );
        assert_eq!(err.kind(), "max_fix_iterations_exceeded");
    }

    #[test]
    fn downcasts_through_anyhow_context() {
        let err = anyhow::Error::new(WorkflowError::EmptyTranslation {
            unit: "var_a.rs".to_string(),
        })
        .context("processing var_a.rs");
        let kind = err.downcast_ref::<WorkflowError>().map(WorkflowError::kind);
        assert_eq!(kind, Some("empty_translation"));
    }
}
