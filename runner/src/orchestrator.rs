//! Top-level migration loop for one feature.
//!
//! Initializes the feature if needed and runs the gate verification once,
//! then repeatedly rescans the unit tree
//! and drives the first recognized unresolved unit through [`UnitStep`] until
//! none remain. There is no persisted run state: progress lives in git and is
//! rediscovered by scanning.

use std::collections::BTreeSet;
use std::path::PathBuf;

use anyhow::Result;
use serde::Serialize;
use tracing::{info, warn};

use crate::core::progress::Progress;
use crate::core::types::{Classification, GateFailurePolicy, TranslationUnit};
use crate::error::WorkflowError;
use crate::feature::FeaturePaths;
use crate::io::config::MigrateConfig;
use crate::io::gateway::ToolGateway;
use crate::io::git::Checkpointer;
use crate::io::hybrid::{HybridPlan, HybridRunner, run_hybrid_build};
use crate::io::unit_store::UnitStore;
use crate::step::{
    StepConfig, UnitReport, UnitStep, checkpoint, gate_message, initialize_message,
    metadata_failure,
};

/// Summary of a completed run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub feature: String,
    /// Whether this run created the unit tree.
    pub initialized: bool,
    /// Whether the gate verification passed and was committed.
    pub gate_passed: bool,
    /// Recognized units in the tree when the run started.
    pub total_units: usize,
    /// Units that were already resolved when the run started.
    pub already_resolved: usize,
    pub translated: Vec<UnitReport>,
    /// Unresolved units with an unrecognized filename prefix.
    pub skipped: Vec<String>,
}

pub struct Orchestrator<'a, G: ?Sized, C: ?Sized, H: ?Sized> {
    paths: &'a FeaturePaths,
    config: &'a MigrateConfig,
    gateway: &'a G,
    checkpointer: &'a C,
    hybrid_runner: &'a H,
}

impl<'a, G, C, H> Orchestrator<'a, G, C, H>
where
    G: ToolGateway + ?Sized,
    C: Checkpointer + ?Sized,
    H: HybridRunner + ?Sized,
{
    pub fn new(
        paths: &'a FeaturePaths,
        config: &'a MigrateConfig,
        gateway: &'a G,
        checkpointer: &'a C,
        hybrid_runner: &'a H,
    ) -> Self {
        Self {
            paths,
            config,
            gateway,
            checkpointer,
            hybrid_runner,
        }
    }

    /// Migrate every recognized unresolved unit of the feature.
    ///
    /// `on_unit` is called after each unit reaches `Done`. The first unit
    /// failure aborts the run; units committed before it stay committed.
    pub fn run<F: FnMut(&UnitReport)>(&self, mut on_unit: F) -> Result<RunReport> {
        let feature = &self.paths.name;
        let initialized = self.ensure_initialized()?;
        let plan = HybridPlan::new(self.config, self.paths);
        let gate_passed = self.verify_gate(&plan)?;

        let store = UnitStore::new(&self.paths.unit_tree, self.paths.target_ext.as_str());
        let counts = store.counts()?;
        let already_resolved = counts.total - counts.unresolved;
        let mut progress = Progress::new(counts.total, already_resolved);
        info!(
            feature = %feature,
            total = counts.total,
            already_resolved,
            unrecognized = counts.unrecognized,
            "starting migration, {:.1}% resolved",
            progress.percent()
        );

        let step_config = StepConfig::from(self.config);
        let step = UnitStep {
            paths: self.paths,
            gateway: self.gateway,
            checkpointer: self.checkpointer,
            hybrid_runner: self.hybrid_runner,
            hybrid_plan: &plan,
            config: &step_config,
        };

        let mut resolved: BTreeSet<PathBuf> = BTreeSet::new();
        let mut skipped_paths: BTreeSet<PathBuf> = BTreeSet::new();
        let mut skipped = Vec::new();
        let mut translated = Vec::new();

        loop {
            let mut next: Option<TranslationUnit> = None;
            for unit in store.scan_unresolved()? {
                match unit.classification {
                    Classification::Unrecognized => {
                        if skipped_paths.insert(unit.target_path.clone()) {
                            warn!(
                                unit = %unit.name,
                                "unrecognized unit kind, skipping"
                            );
                            skipped.push(unit.name.clone());
                        }
                    }
                    Classification::Recognized(_) => {
                        if resolved.contains(&unit.target_path) {
                            return Err(WorkflowError::UnitReverted { unit: unit.name }.into());
                        }
                        if next.is_none() {
                            next = Some(unit);
                        }
                    }
                }
            }

            let Some(unit) = next else {
                break;
            };
            info!(
                "[{}/{}] translating {} ({:.1}% resolved)",
                progress.position(),
                progress.total(),
                self.paths.relative(&unit.target_path).display(),
                progress.percent()
            );
            let report = step.run(&unit)?;
            progress.mark_resolved();
            resolved.insert(unit.target_path);
            on_unit(&report);
            translated.push(report);
        }

        info!(
            feature = %feature,
            translated = translated.len(),
            skipped = skipped.len(),
            "no recognized unresolved units remain"
        );
        Ok(RunReport {
            feature: feature.clone(),
            initialized,
            gate_passed,
            total_units: counts.total,
            already_resolved,
            translated,
            skipped,
        })
    }

    /// Create the unit tree once and checkpoint it. Returns whether it ran.
    fn ensure_initialized(&self) -> Result<bool> {
        if self.paths.unit_tree_exists()? {
            return Ok(false);
        }
        info!(feature = %self.paths.name, "unit tree missing, initializing feature");
        self.gateway.initialize(self.paths)?;
        checkpoint(self.checkpointer, &initialize_message(&self.paths.name))?;
        Ok(true)
    }

    /// Verify the tree before touching any unit and commit the result.
    ///
    /// Runs the build, the metadata update and the hybrid phases, stopping at
    /// the first failure. The tree often does not build while placeholders
    /// remain, so unless `on_gate_failure = "abort"` a failure only skips the
    /// gate commit. Returns whether the gate passed.
    fn verify_gate(&self, plan: &HybridPlan) -> Result<bool> {
        let Err(err) = self.gate_steps(plan) else {
            checkpoint(self.checkpointer, &gate_message(&self.paths.name))?;
            info!(feature = %self.paths.name, "gate verification passed");
            return Ok(true);
        };
        match self.config.on_gate_failure {
            GateFailurePolicy::Abort => Err(err),
            GateFailurePolicy::Warn => {
                warn!(
                    err = %format!("{err:#}"),
                    "gate verification failed, skipping gate commit and continuing"
                );
                Ok(false)
            }
        }
    }

    fn gate_steps(&self, plan: &HybridPlan) -> Result<()> {
        let attempt = self.gateway.build(&self.paths.unit_tree)?;
        if !attempt.success {
            return Err(WorkflowError::GateBuildFailure {
                feature: self.paths.name.clone(),
                diagnostic_text: attempt.diagnostic_text,
            }
            .into());
        }
        self.gateway
            .update_metadata(self.paths)
            .map_err(|err| metadata_failure(err, &self.paths.name))?;
        run_hybrid_build(self.hybrid_runner, plan)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::BuildAttempt;
    use crate::io::config::PhaseCommand;
    use crate::test_support::{RecordingCheckpointer, ScriptedGateway, ScriptedHybrid, TestRepo};

    fn with_phase(config: &mut MigrateConfig, phase: &str) {
        let command = Some(PhaseCommand {
            command: format!("make {phase}"),
            dir: None,
        });
        let commands = config.feature.entry("default".to_string()).or_default();
        match phase {
            "clean" => commands.clean = command,
            "build" => commands.build = command,
            _ => commands.test = command,
        }
    }

    #[test]
    fn processes_units_in_path_order() {
        let repo = TestRepo::new("demo").expect("repo");
        repo.add_unit("var_b", "int b;").expect("unit");
        repo.add_unit("fun_a", "void a(void);").expect("unit");
        repo.add_resolved("var_done.rs", "static DONE: i32 = 1;\n").expect("resolved");
        let gateway = ScriptedGateway::new().with_translation("// translated\n");
        let checkpointer = RecordingCheckpointer::new();
        let hybrid = ScriptedHybrid::passing();
        let config = MigrateConfig::default();

        let mut seen = Vec::new();
        let report = Orchestrator::new(repo.paths(), &config, &gateway, &checkpointer, &hybrid)
            .run(|u| seen.push(u.unit.clone()))
            .expect("run");

        assert_eq!(seen, vec!["fun_a.rs".to_string(), "var_b.rs".to_string()]);
        assert!(!report.initialized);
        assert!(report.gate_passed);
        assert_eq!(report.total_units, 3);
        assert_eq!(report.already_resolved, 1);
        assert_eq!(report.translated.len(), 2);
        // Gate build plus one verification build per unit.
        assert_eq!(gateway.build_calls(), 3);
    }

    #[test]
    fn initializes_missing_unit_tree() {
        let repo = TestRepo::without_unit_tree("demo").expect("repo");
        let gateway = ScriptedGateway::new().with_initialize_file("var_k.c", "int k;");
        let checkpointer = RecordingCheckpointer::new();
        let config = MigrateConfig::default();

        let report = Orchestrator::new(
            repo.paths(),
            &config,
            &gateway,
            &checkpointer,
            &ScriptedHybrid::passing(),
        )
        .run(|_| {})
        .expect("run");

        assert!(report.initialized);
        assert_eq!(gateway.initialize_calls(), 1);
        assert_eq!(
            checkpointer.messages(),
            vec![
                "Initialize feature demo".to_string(),
                "Gate verification passed for demo".to_string(),
            ]
        );
    }

    #[test]
    fn gate_runs_build_update_and_hybrid_before_committing() {
        let repo = TestRepo::new("demo").expect("repo");
        let mut config = MigrateConfig::default();
        with_phase(&mut config, "build");
        with_phase(&mut config, "test");
        let gateway = ScriptedGateway::new();
        let checkpointer = RecordingCheckpointer::new();
        let hybrid = ScriptedHybrid::passing();

        let report = Orchestrator::new(repo.paths(), &config, &gateway, &checkpointer, &hybrid)
            .run(|_| {})
            .expect("run");

        assert!(report.gate_passed);
        assert_eq!(gateway.build_calls(), 1);
        assert_eq!(gateway.metadata_updates(), 1);
        assert_eq!(hybrid.phases(), vec!["build", "test"]);
        assert_eq!(
            checkpointer.messages(),
            vec!["Gate verification passed for demo".to_string()]
        );
    }

    #[test]
    fn gate_stops_at_first_failing_step() {
        let repo = TestRepo::new("demo").expect("repo");
        let mut config = MigrateConfig::default();
        with_phase(&mut config, "build");

        let gateway = ScriptedGateway::new().with_default_build(BuildAttempt::failed("error: placeholders"));
        let hybrid = ScriptedHybrid::passing();
        let checkpointer = RecordingCheckpointer::new();
        let report = Orchestrator::new(repo.paths(), &config, &gateway, &checkpointer, &hybrid)
            .run(|_| {})
            .expect("run");
        assert!(!report.gate_passed);
        assert_eq!(gateway.metadata_updates(), 0);
        assert!(hybrid.phases().is_empty());
        assert!(checkpointer.messages().is_empty());

        let gateway = ScriptedGateway::new().with_failing_update();
        let checkpointer = RecordingCheckpointer::new();
        let report = Orchestrator::new(repo.paths(), &config, &gateway, &checkpointer, &hybrid)
            .run(|_| {})
            .expect("run");
        assert!(!report.gate_passed);
        assert!(hybrid.phases().is_empty());
        assert!(checkpointer.messages().is_empty());
    }

    #[test]
    fn gate_failure_aborts_when_configured() {
        let repo = TestRepo::new("demo").expect("repo");
        repo.add_unit("var_a", "int a;").expect("unit");
        let config = MigrateConfig {
            on_gate_failure: GateFailurePolicy::Abort,
            ..MigrateConfig::default()
        };
        let gateway = ScriptedGateway::new()
            .with_translation("static A: i32 = 0;\n")
            .with_builds(vec![BuildAttempt::failed("error: placeholders")]);
        let checkpointer = RecordingCheckpointer::new();

        let err = Orchestrator::new(
            repo.paths(),
            &config,
            &gateway,
            &checkpointer,
            &ScriptedHybrid::passing(),
        )
        .run(|_| {})
        .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<WorkflowError>(),
            Some(WorkflowError::GateBuildFailure { feature, .. }) if feature == "demo"
        ));
        assert!(gateway.translate_inputs().is_empty());
        assert!(checkpointer.messages().is_empty());
    }

    #[test]
    fn progress_total_counts_recognized_units_only() {
        let repo = TestRepo::new("demo").expect("repo");
        repo.add_unit("var_a", "int a;").expect("unit");
        repo.add_placeholder("other_thing.rs").expect("placeholder");
        repo.add_resolved("lib.rs", "pub mod units;\n").expect("resolved");
        let gateway = ScriptedGateway::new().with_translation("static A: i32 = 0;\n");
        let config = MigrateConfig::default();

        let report = Orchestrator::new(
            repo.paths(),
            &config,
            &gateway,
            &RecordingCheckpointer::new(),
            &ScriptedHybrid::passing(),
        )
        .run(|_| {})
        .expect("run");

        assert_eq!(report.total_units, 1);
        assert_eq!(report.already_resolved, 0);
        assert_eq!(report.skipped, vec!["other_thing.rs".to_string()]);
    }

    #[test]
    fn gate_build_failure_is_not_fatal() {
        let repo = TestRepo::new("demo").expect("repo");
        repo.add_unit("var_a", "int a;").expect("unit");
        let gateway = ScriptedGateway::new()
            .with_translation("static A: i32 = 0;\n")
            .with_builds(vec![BuildAttempt::failed("error: placeholders"), BuildAttempt::passed()]);
        let config = MigrateConfig::default();

        let report = Orchestrator::new(
            repo.paths(),
            &config,
            &gateway,
            &RecordingCheckpointer::new(),
            &ScriptedHybrid::passing(),
        )
        .run(|_| {})
        .expect("run");

        assert_eq!(report.translated.len(), 1);
        assert!(!report.translated[0].provisional);
        assert!(!report.gate_passed);
        assert_eq!(gateway.metadata_updates(), 1);
    }

    #[test]
    fn reverted_unit_aborts_run() {
        let repo = TestRepo::new("demo").expect("repo");
        repo.add_unit("var_a", "int a;").expect("unit");
        repo.add_unit("var_b", "int b;").expect("unit");
        let gateway = ScriptedGateway::new()
            .with_translation("static V: i32 = 0;\n")
            // The gate takes the first update, var_a.rs the second.
            .with_revert_on_update(2, repo.paths().unit_tree.join("var_a.rs"));
        let config = MigrateConfig::default();

        let err = Orchestrator::new(
            repo.paths(),
            &config,
            &gateway,
            &RecordingCheckpointer::new(),
            &ScriptedHybrid::passing(),
        )
        .run(|_| {})
        .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<WorkflowError>(),
            Some(WorkflowError::UnitReverted { unit }) if unit == "var_a.rs"
        ));
    }

    #[test]
    fn hybrid_failure_stops_run() {
        let repo = TestRepo::new("demo").expect("repo");
        repo.add_unit("var_a", "int a;").expect("unit");
        repo.add_unit("var_b", "int b;").expect("unit");
        let mut config = MigrateConfig::default();
        with_phase(&mut config, "test");
        let gateway = ScriptedGateway::new().with_translation("static V: i32 = 0;\n");
        let hybrid = ScriptedHybrid::failing_phase("test");

        let mut done = 0;
        let err = Orchestrator::new(
            repo.paths(),
            &config,
            &gateway,
            &RecordingCheckpointer::new(),
            &hybrid,
        )
        .run(|_| done += 1)
        .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<WorkflowError>(),
            Some(WorkflowError::HybridBuildFailure { phase, .. }) if phase == "test"
        ));
        assert_eq!(done, 0);
        // Once during the gate, which only warns, then for var_a.rs.
        assert_eq!(hybrid.phases(), vec!["test", "test"]);
    }
}
