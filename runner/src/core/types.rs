//! Shared deterministic types for the migration workflow.
//!
//! These types define the contracts between the pure core, the I/O adapters,
//! and the orchestrator. They hold no handles to external state.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Kind of a translation unit, derived from its filename prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitKind {
    Variable,
    Function,
}

impl UnitKind {
    /// Operation name passed to the translator tool.
    pub fn as_str(self) -> &'static str {
        match self {
            UnitKind::Variable => "variable",
            UnitKind::Function => "function",
        }
    }
}

impl fmt::Display for UnitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of classifying a unit filename.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Recognized(UnitKind),
    Unrecognized,
}

/// One file in the unit tree whose content is still a placeholder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslationUnit {
    /// Path of the migrated-representation file (possibly empty).
    pub target_path: PathBuf,
    /// Filename of `target_path`, used in logs and commit messages.
    pub name: String,
    pub classification: Classification,
}

impl TranslationUnit {
    pub fn kind(&self) -> Option<UnitKind> {
        match self.classification {
            Classification::Recognized(kind) => Some(kind),
            Classification::Unrecognized => None,
        }
    }
}

/// Outcome of one build tool invocation. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildAttempt {
    pub success: bool,
    /// Combined stdout/stderr of the build tool.
    pub diagnostic_text: String,
}

impl BuildAttempt {
    pub fn passed() -> Self {
        Self {
            success: true,
            diagnostic_text: String::new(),
        }
    }

    pub fn failed(diagnostic_text: impl Into<String>) -> Self {
        Self {
            success: false,
            diagnostic_text: diagnostic_text.into(),
        }
    }
}

/// What to do when a unit's source counterpart is missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MissingSourcePolicy {
    /// Fail the run immediately.
    #[default]
    Abort,
    /// Re-run the initializer once and retry path resolution.
    AutoReinitialize,
}

/// What to do when the build fails without implicating the unit under repair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UnattributedFailurePolicy {
    /// Treat the unit as provisionally verified and keep going.
    #[default]
    Proceed,
    /// Fail the unit.
    Fail,
}

/// What to do when the gate verification before the first unit fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GateFailurePolicy {
    /// Log the failure, skip the gate commit and start translating.
    #[default]
    Warn,
    /// Fail the run before any unit is touched.
    Abort,
}

/// Per-unit workflow states. `Failed` is reported through `WorkflowError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitState {
    Pending,
    Translating,
    Translated,
    Building,
    Fixing,
    Verified,
    Committed,
    MetadataUpdating,
    MetadataCommitted,
    HybridBuilding,
    Done,
}

impl fmt::Display for UnitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UnitState::Pending => "pending",
            UnitState::Translating => "translating",
            UnitState::Translated => "translated",
            UnitState::Building => "building",
            UnitState::Fixing => "fixing",
            UnitState::Verified => "verified",
            UnitState::Committed => "committed",
            UnitState::MetadataUpdating => "metadata_updating",
            UnitState::MetadataCommitted => "metadata_committed",
            UnitState::HybridBuilding => "hybrid_building",
            UnitState::Done => "done",
        };
        f.write_str(name)
    }
}
