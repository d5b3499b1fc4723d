//! Per-unit workflow: translate, build/fix, checkpoint, metadata, hybrid build.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::core::diagnostics::{extract_implicated_paths, implicates};
use crate::core::fix_budget::FixBudget;
use crate::core::types::{
    MissingSourcePolicy, TranslationUnit, UnattributedFailurePolicy, UnitKind, UnitState,
};
use crate::core::unit::{is_unresolved, source_counterpart};
use crate::error::{UnitFailed, WorkflowError};
use crate::feature::FeaturePaths;
use crate::io::config::MigrateConfig;
use crate::io::gateway::ToolGateway;
use crate::io::git::Checkpointer;
use crate::io::hybrid::{HybridPlan, HybridRunner, run_hybrid_build};

/// Policies that shape a single unit's run.
#[derive(Debug, Clone)]
pub struct StepConfig {
    pub max_fix_attempts: u32,
    pub on_missing_source: MissingSourcePolicy,
    pub on_unattributed_failure: UnattributedFailurePolicy,
}

impl Default for StepConfig {
    fn default() -> Self {
        Self::from(&MigrateConfig::default())
    }
}

impl From<&MigrateConfig> for StepConfig {
    fn from(config: &MigrateConfig) -> Self {
        Self {
            max_fix_attempts: config.max_fix_attempts,
            on_missing_source: config.on_missing_source,
            on_unattributed_failure: config.on_unattributed_failure,
        }
    }
}

/// What happened to one unit that reached `Done`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitReport {
    pub unit: String,
    pub kind: UnitKind,
    pub fix_attempts: u32,
    /// Accepted although the last build failed elsewhere in the tree.
    pub provisional: bool,
}

/// Commit message for a translated unit.
pub fn translate_message(unit: &str, feature: &str) -> String {
    format!("Translate {unit} (feature: {feature})")
}

/// Commit message for the metadata refresh that follows a translation.
pub fn metadata_message(unit: &str) -> String {
    format!("Update unit metadata after translating {unit}")
}

pub fn initialize_message(feature: &str) -> String {
    format!("Initialize feature {feature}")
}

pub fn reinitialize_message(feature: &str) -> String {
    format!("Reinitialize feature {feature}")
}

pub fn gate_message(feature: &str) -> String {
    format!("Gate verification passed for {feature}")
}

/// Commit through `checkpointer`, turning any failure into a run-fatal `CommitFailure`.
pub fn checkpoint<C: Checkpointer + ?Sized>(checkpointer: &C, message: &str) -> Result<bool> {
    checkpointer.commit_if_dirty(message).map_err(|err| {
        WorkflowError::CommitFailure {
            message: message.to_string(),
            reason: format!("{err:#}"),
        }
        .into()
    })
}

/// Drives one unit through the state machine.
pub struct UnitStep<'a, G: ?Sized, C: ?Sized, H: ?Sized> {
    pub paths: &'a FeaturePaths,
    pub gateway: &'a G,
    pub checkpointer: &'a C,
    pub hybrid_runner: &'a H,
    pub hybrid_plan: &'a HybridPlan,
    pub config: &'a StepConfig,
}

impl<G, C, H> UnitStep<'_, G, C, H>
where
    G: ToolGateway + ?Sized,
    C: Checkpointer + ?Sized,
    H: HybridRunner + ?Sized,
{
    /// Run `unit` from `Pending` to `Done`.
    ///
    /// Any failure leaves the unit in `Failed`; the error carries a
    /// [`UnitFailed`] context naming the state it failed in.
    pub fn run(&self, unit: &TranslationUnit) -> Result<UnitReport> {
        let mut state = UnitState::Pending;
        self.drive(unit, &mut state).map_err(|err| {
            error!(unit = %unit.name, state = %state, err = %format!("{err:#}"), "unit failed");
            err.context(UnitFailed {
                unit: unit.name.clone(),
                state,
            })
        })
    }

    fn drive(&self, unit: &TranslationUnit, state: &mut UnitState) -> Result<UnitReport> {
        let kind = unit
            .kind()
            .ok_or_else(|| anyhow!("unit {} has no recognized kind", unit.name))?;

        let source_path = self.resolve_source(unit)?;
        let source = fs::read(&source_path)
            .with_context(|| format!("read source {}", source_path.display()))?;
        if std::str::from_utf8(&source).is_err() {
            debug!(unit = %unit.name, "source is not valid UTF-8, passing raw bytes");
        }

        advance(unit, state, UnitState::Translating);
        let content = self.gateway.translate(kind, &source)?;
        if is_unresolved(&content) {
            return Err(WorkflowError::EmptyTranslation {
                unit: unit.name.clone(),
            }
            .into());
        }
        write_unit(&unit.target_path, &content)?;
        advance(unit, state, UnitState::Translated);

        let (fix_attempts, provisional) = self.build_until_verified(unit, state)?;
        advance(unit, state, UnitState::Verified);

        checkpoint(
            self.checkpointer,
            &translate_message(&unit.name, &self.paths.name),
        )?;
        advance(unit, state, UnitState::Committed);

        advance(unit, state, UnitState::MetadataUpdating);
        self.gateway
            .update_metadata(self.paths)
            .map_err(|err| metadata_failure(err, &self.paths.name))?;
        checkpoint(self.checkpointer, &metadata_message(&unit.name))?;
        advance(unit, state, UnitState::MetadataCommitted);

        advance(unit, state, UnitState::HybridBuilding);
        run_hybrid_build(self.hybrid_runner, self.hybrid_plan)?;
        advance(unit, state, UnitState::Done);

        Ok(UnitReport {
            unit: unit.name.clone(),
            kind,
            fix_attempts,
            provisional,
        })
    }

    /// Source counterpart of `unit`, re-initializing the feature once if the
    /// policy allows it.
    fn resolve_source(&self, unit: &TranslationUnit) -> Result<PathBuf> {
        let source_path = source_counterpart(&unit.target_path, &self.paths.source_ext);
        if source_path.is_file() {
            return Ok(source_path);
        }
        warn!(unit = %unit.name, source = %source_path.display(), "source counterpart missing");

        if self.config.on_missing_source == MissingSourcePolicy::AutoReinitialize {
            info!(feature = %self.paths.name, "re-initializing feature");
            self.gateway.initialize(self.paths)?;
            checkpoint(self.checkpointer, &reinitialize_message(&self.paths.name))?;
            if source_path.is_file() {
                return Ok(source_path);
            }
        }

        Err(WorkflowError::MissingSource {
            unit: unit.name.clone(),
            source_path,
        }
        .into())
    }

    /// Alternate build and fix until the build passes or stops implicating the
    /// unit. Returns the fix attempts used and whether acceptance was provisional.
    fn build_until_verified(
        &self,
        unit: &TranslationUnit,
        state: &mut UnitState,
    ) -> Result<(u32, bool)> {
        let mut budget = FixBudget::new(self.config.max_fix_attempts);
        loop {
            advance(unit, state, UnitState::Building);
            let attempt = self.gateway.build(&self.paths.unit_tree)?;
            if attempt.success {
                return Ok((budget.used(), false));
            }

            if !implicates(&attempt.diagnostic_text, &unit.target_path) {
                let implicated = extract_implicated_paths(&attempt.diagnostic_text);
                match self.config.on_unattributed_failure {
                    UnattributedFailurePolicy::Proceed => {
                        warn!(
                            unit = %unit.name,
                            implicated = implicated.len(),
                            "build fails elsewhere in the tree, accepting unit provisionally"
                        );
                        return Ok((budget.used(), true));
                    }
                    UnattributedFailurePolicy::Fail => {
                        return Err(WorkflowError::UnattributedBuildFailure {
                            unit: unit.name.clone(),
                            diagnostic_text: attempt.diagnostic_text,
                            implicated,
                        }
                        .into());
                    }
                }
            }

            if budget.is_exhausted() {
                return Err(WorkflowError::MaxFixIterationsExceeded {
                    unit: unit.name.clone(),
                    attempts: budget.used(),
                    implicated: extract_implicated_paths(&attempt.diagnostic_text),
                    diagnostic_text: attempt.diagnostic_text,
                }
                .into());
            }

            advance(unit, state, UnitState::Fixing);
            budget.consume();
            info!(unit = %unit.name, attempt = budget.used(), max = budget.max(), "fixing build errors");
            let current = fs::read_to_string(&unit.target_path)
                .with_context(|| format!("read {}", unit.target_path.display()))?;
            let fixed = self.gateway.fix(&current, &attempt.diagnostic_text)?;
            if is_unresolved(&fixed) {
                return Err(WorkflowError::EmptyFix {
                    unit: unit.name.clone(),
                    attempt: budget.used(),
                }
                .into());
            }
            write_unit(&unit.target_path, &fixed)?;
            advance(unit, state, UnitState::Translated);
        }
    }
}

fn advance(unit: &TranslationUnit, state: &mut UnitState, next: UnitState) {
    debug!(unit = %unit.name, from = %state, to = %next, "unit state");
    *state = next;
}

fn write_unit(path: &Path, content: &str) -> Result<()> {
    fs::write(path, content).with_context(|| format!("write {}", path.display()))
}

/// Keep typed gateway errors, wrap anything else as a metadata failure.
pub(crate) fn metadata_failure(err: anyhow::Error, feature: &str) -> anyhow::Error {
    if err.downcast_ref::<WorkflowError>().is_some() {
        return err;
    }
    WorkflowError::MetadataUpdateFailure {
        feature: feature.to_string(),
        reason: format!("{err:#}"),
    }
    .into()
}
