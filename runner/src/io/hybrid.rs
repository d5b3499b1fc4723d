//! Hybrid build adapter: the project's own clean/build/test commands, run
//! against a tree mixing original and migrated units.

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, info, instrument, warn};

use crate::error::WorkflowError;
use crate::feature::FeaturePaths;
use crate::io::config::{FeatureCommands, MigrateConfig};
use crate::io::process::run_command;

/// Points the project's build scripts at the feature directory.
pub const FEATURE_ROOT_ENV: &str = "C2RUST_FEATURE_ROOT";
/// Preload variable set for the build phase only.
pub const PRELOAD_ENV: &str = "LD_PRELOAD";

const TAIL_LINES: usize = 40;

/// One hybrid phase ready to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseRequest {
    pub phase: &'static str,
    pub command: String,
    pub workdir: PathBuf,
    pub env: Vec<(&'static str, OsString)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhaseOutcome {
    Pass,
    /// Failed, with the tail of the phase output.
    Fail(String),
}

pub trait HybridRunner {
    fn run_phase(&self, request: &PhaseRequest) -> Result<PhaseOutcome>;
}

/// Runs each phase through `sh -c` in its configured directory.
pub struct ShellHybridRunner {
    timeout: Option<Duration>,
    output_limit_bytes: usize,
}

impl ShellHybridRunner {
    pub fn new(config: &MigrateConfig) -> Self {
        Self {
            timeout: config.tool_timeout(),
            output_limit_bytes: config.output_limit_bytes,
        }
    }
}

impl HybridRunner for ShellHybridRunner {
    #[instrument(skip_all, fields(phase = request.phase))]
    fn run_phase(&self, request: &PhaseRequest) -> Result<PhaseOutcome> {
        debug!(command = %request.command, workdir = %request.workdir.display(), "running hybrid phase");
        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(&request.command)
            .current_dir(&request.workdir);
        for (key, value) in &request.env {
            cmd.env(key, value);
        }
        let out = run_command(cmd, self.timeout, self.output_limit_bytes)
            .with_context(|| format!("run hybrid {} phase", request.phase))?;
        if out.success() {
            Ok(PhaseOutcome::Pass)
        } else {
            Ok(PhaseOutcome::Fail(out.tail(request.phase, TAIL_LINES)))
        }
    }
}

/// The hybrid phases configured for one feature, resolved once per run.
#[derive(Debug, Clone)]
pub struct HybridPlan {
    project_root: PathBuf,
    feature_dir: PathBuf,
    preload_lib: Option<PathBuf>,
    commands: Option<FeatureCommands>,
}

impl HybridPlan {
    pub fn new(config: &MigrateConfig, feature: &FeaturePaths) -> Self {
        let commands = config.feature_commands(&feature.name).cloned();
        if commands.is_none() {
            warn!(
                feature = %feature.name,
                "no hybrid build commands configured, hybrid phases will be skipped"
            );
        }
        Self {
            project_root: feature.project_root.clone(),
            feature_dir: feature.feature_dir.clone(),
            preload_lib: config.hybrid.resolve_preload_lib(),
            commands,
        }
    }

    /// Configured phases in clean, build, test order.
    pub fn requests(&self) -> Vec<PhaseRequest> {
        let Some(commands) = &self.commands else {
            return Vec::new();
        };
        commands
            .phases()
            .into_iter()
            .filter_map(|(phase, cmd)| {
                let cmd = cmd?;
                let workdir = match &cmd.dir {
                    Some(dir) => self.project_root.join(dir),
                    None => self.project_root.clone(),
                };
                let mut env = vec![(FEATURE_ROOT_ENV, self.feature_dir.clone().into_os_string())];
                if phase == "build"
                    && let Some(lib) = &self.preload_lib
                {
                    env.push((PRELOAD_ENV, lib.clone().into_os_string()));
                }
                Some(PhaseRequest {
                    phase,
                    command: cmd.command.clone(),
                    workdir,
                    env,
                })
            })
            .collect()
    }
}

/// Run every configured phase in order, stopping at the first failure.
///
/// Returns the number of phases that ran.
pub fn run_hybrid_build<R: HybridRunner + ?Sized>(runner: &R, plan: &HybridPlan) -> Result<usize> {
    let requests = plan.requests();
    for request in &requests {
        info!(phase = request.phase, "hybrid phase");
        match runner.run_phase(request)? {
            PhaseOutcome::Pass => {}
            PhaseOutcome::Fail(reason) => {
                return Err(WorkflowError::HybridBuildFailure {
                    phase: request.phase.to_string(),
                    reason,
                }
                .into());
            }
        }
    }
    Ok(requests.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::config::{LayoutConfig, PhaseCommand};
    use std::cell::RefCell;
    use std::fs;

    fn phase(command: &str, dir: Option<&str>) -> Option<PhaseCommand> {
        Some(PhaseCommand {
            command: command.to_string(),
            dir: dir.map(str::to_string),
        })
    }

    fn plan(root: &std::path::Path, commands: FeatureCommands, preload: Option<&str>) -> HybridPlan {
        let paths = FeaturePaths::new(root, "demo", &LayoutConfig::default()).expect("paths");
        let mut config = MigrateConfig::default();
        config.feature.insert("demo".to_string(), commands);
        config.hybrid.preload_lib = preload.map(PathBuf::from);
        HybridPlan::new(&config, &paths)
    }

    struct RecordingRunner {
        fail_phase: Option<&'static str>,
        seen: RefCell<Vec<&'static str>>,
    }

    impl HybridRunner for RecordingRunner {
        fn run_phase(&self, request: &PhaseRequest) -> Result<PhaseOutcome> {
            self.seen.borrow_mut().push(request.phase);
            if self.fail_phase == Some(request.phase) {
                return Ok(PhaseOutcome::Fail("make: *** [all] Error 2".to_string()));
            }
            Ok(PhaseOutcome::Pass)
        }
    }

    #[test]
    fn preload_only_on_build_phase() {
        let commands = FeatureCommands {
            clean: phase("make clean", None),
            build: phase("make", Some("src")),
            test: phase("make test", None),
        };
        let plan = plan(std::path::Path::new("/work"), commands, Some("/opt/libhybrid.so"));
        let requests = plan.requests();
        assert_eq!(requests.len(), 3);
        assert_eq!(requests[1].workdir, PathBuf::from("/work/src"));
        for request in &requests {
            assert!(request.env.contains(&(
                FEATURE_ROOT_ENV,
                OsString::from("/work/.c2rust/demo")
            )));
            let has_preload = request.env.iter().any(|(k, _)| *k == PRELOAD_ENV);
            assert_eq!(has_preload, request.phase == "build", "{}", request.phase);
        }
    }

    #[test]
    fn missing_phases_are_skipped() {
        let commands = FeatureCommands {
            test: phase("make test", None),
            ..FeatureCommands::default()
        };
        let plan = plan(std::path::Path::new("/work"), commands, None);
        let runner = RecordingRunner {
            fail_phase: None,
            seen: RefCell::new(Vec::new()),
        };
        assert_eq!(run_hybrid_build(&runner, &plan).expect("run"), 1);
        assert_eq!(*runner.seen.borrow(), vec!["test"]);
    }

    #[test]
    fn no_feature_table_runs_nothing() {
        let paths = FeaturePaths::new("/work", "demo", &LayoutConfig::default()).expect("paths");
        let plan = HybridPlan::new(&MigrateConfig::default(), &paths);
        assert!(plan.requests().is_empty());
    }

    #[test]
    fn failing_phase_stops_the_sequence() {
        let commands = FeatureCommands {
            clean: phase("make clean", None),
            build: phase("make", None),
            test: phase("make test", None),
        };
        let plan = plan(std::path::Path::new("/work"), commands, None);
        let runner = RecordingRunner {
            fail_phase: Some("build"),
            seen: RefCell::new(Vec::new()),
        };
        let err = run_hybrid_build(&runner, &plan).unwrap_err();
        match err.downcast_ref::<WorkflowError>() {
            Some(WorkflowError::HybridBuildFailure { phase, reason }) => {
                assert_eq!(phase, "build");
                assert!(reason.contains("Error 2"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(*runner.seen.borrow(), vec!["clean", "build"]);
    }

    #[test]
    fn shell_runner_exports_feature_root() {
        let temp = tempfile::tempdir().expect("tempdir");
        let commands = FeatureCommands {
            build: phase("echo \"$C2RUST_FEATURE_ROOT\" > seen.txt", None),
            ..FeatureCommands::default()
        };
        let plan = plan(temp.path(), commands, None);
        let runner = ShellHybridRunner::new(&MigrateConfig::default());
        run_hybrid_build(&runner, &plan).expect("run");
        let seen = fs::read_to_string(temp.path().join("seen.txt")).expect("read");
        assert_eq!(seen.trim(), temp.path().join(".c2rust/demo").display().to_string());
    }
}
