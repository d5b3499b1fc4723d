//! External tool gateway.
//!
//! The [`ToolGateway`] trait decouples the per-unit state machine from the
//! real initializer, updater, build tool and translator. Tests use scripted
//! gateways that return predetermined content without spawning processes.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use minijinja::Environment;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::core::types::{BuildAttempt, UnitKind};
use crate::error::WorkflowError;
use crate::feature::FeaturePaths;
use crate::io::config::{MigrateConfig, ToolsConfig};
use crate::io::process::{CommandOutput, Retain, run_command_retaining};

/// Operation kind passed to the translator for repair calls.
pub const FIX_KIND: &str = "fix";

const TAIL_LINES: usize = 20;

/// Abstraction over the external migration tools.
pub trait ToolGateway {
    /// Create the feature's unit tree. Fails unless the tree exists afterwards.
    fn initialize(&self, feature: &FeaturePaths) -> Result<()>;

    /// Translate source content for a unit of `kind`.
    ///
    /// The source is passed as raw bytes since legacy sources need not be
    /// UTF-8. Returns whatever the tool produced; rejecting empty content is
    /// up to the caller.
    fn translate(&self, kind: UnitKind, source_content: &[u8]) -> Result<String>;

    /// Repair `current_content` so that `diagnostic_text` goes away.
    fn fix(&self, current_content: &str, diagnostic_text: &str) -> Result<String>;

    /// Build the unit tree. A failing build is `Ok` with its diagnostic; when
    /// output must be truncated the end is kept.
    fn build(&self, unit_tree: &Path) -> Result<BuildAttempt>;

    /// Refresh downstream metadata after a unit was resolved.
    fn update_metadata(&self, feature: &FeaturePaths) -> Result<()>;
}

/// Variables available to argv templates.
#[derive(Debug, Default, Serialize)]
struct ToolVars<'a> {
    feature: &'a str,
    kind: &'a str,
    input: String,
    output: String,
    error: String,
}

/// Gateway that shells out to the configured tools.
pub struct CommandGateway {
    tools: ToolsConfig,
    feature: String,
    workdir: PathBuf,
    timeout: Option<Duration>,
    output_limit_bytes: usize,
}

impl CommandGateway {
    pub fn new(config: &MigrateConfig, feature: &FeaturePaths) -> Self {
        Self {
            tools: config.tools.clone(),
            feature: feature.name.clone(),
            workdir: feature.project_root.clone(),
            timeout: config.tool_timeout(),
            output_limit_bytes: config.output_limit_bytes,
        }
    }

    fn run_tool(
        &self,
        label: &str,
        template: &[String],
        vars: &ToolVars<'_>,
        cwd: &Path,
        retain: Retain,
    ) -> Result<CommandOutput> {
        let argv = render_argv(label, template, vars)?;
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| anyhow!("{label} command is empty"))?;
        debug!(tool = label, program = %program, cwd = %cwd.display(), "running tool");
        let mut cmd = Command::new(program);
        cmd.args(args).current_dir(cwd);
        run_command_retaining(cmd, self.timeout, self.output_limit_bytes, retain)
            .with_context(|| format!("run {label} tool"))
    }

    /// Run the translator with content handed over through a private temp dir.
    fn convert(&self, kind: &str, input: &[u8], diagnostic: Option<&str>) -> Result<String> {
        let scratch = tempfile::tempdir().context("create translator scratch dir")?;
        let input_path = scratch.path().join("input");
        let output_path = scratch.path().join("output");
        fs::write(&input_path, input)
            .with_context(|| format!("write {}", input_path.display()))?;

        let mut vars = ToolVars {
            feature: &self.feature,
            kind,
            input: input_path.display().to_string(),
            output: output_path.display().to_string(),
            ..ToolVars::default()
        };
        let (label, template) = match diagnostic {
            Some(text) => {
                let error_path = scratch.path().join("error");
                fs::write(&error_path, text)
                    .with_context(|| format!("write {}", error_path.display()))?;
                vars.error = error_path.display().to_string();
                ("fix", &self.tools.fix)
            }
            None => ("translate", &self.tools.translate),
        };

        let out = self.run_tool(label, template, &vars, &self.workdir, Retain::Head)?;
        if !out.success() {
            return Err(anyhow!(
                "{label} tool failed (exit {:?}):\n{}",
                out.status.code(),
                out.tail(label, TAIL_LINES)
            ));
        }
        match fs::read(&output_path) {
            Ok(bytes) => Ok(String::from_utf8(bytes).unwrap_or_else(|err| {
                warn!(tool = label, "tool output is not valid UTF-8, replacing invalid bytes");
                String::from_utf8_lossy(err.as_bytes()).into_owned()
            })),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(tool = label, "tool exited successfully without writing output");
                Ok(String::new())
            }
            Err(e) => Err(e).with_context(|| format!("read {}", output_path.display())),
        }
    }
}

impl ToolGateway for CommandGateway {
    #[instrument(skip_all, fields(feature = %feature.name))]
    fn initialize(&self, feature: &FeaturePaths) -> Result<()> {
        info!("initializing feature");
        let vars = ToolVars {
            feature: &feature.name,
            ..ToolVars::default()
        };
        let out = self.run_tool(
            "initialize",
            &self.tools.initialize,
            &vars,
            &feature.project_root,
            Retain::Head,
        )?;
        if !out.success() {
            return Err(WorkflowError::InitFailure {
                feature: feature.name.clone(),
                reason: out.tail("initialize", TAIL_LINES),
            }
            .into());
        }
        // The initializer's exit status alone is not trusted.
        if !feature.unit_tree_exists()? {
            return Err(WorkflowError::InitFailure {
                feature: feature.name.clone(),
                reason: format!(
                    "initializer succeeded but {} does not exist",
                    feature.unit_tree.display()
                ),
            }
            .into());
        }
        Ok(())
    }

    #[instrument(skip_all, fields(kind = %kind))]
    fn translate(&self, kind: UnitKind, source_content: &[u8]) -> Result<String> {
        self.convert(kind.as_str(), source_content, None)
    }

    #[instrument(skip_all)]
    fn fix(&self, current_content: &str, diagnostic_text: &str) -> Result<String> {
        self.convert(FIX_KIND, current_content.as_bytes(), Some(diagnostic_text))
    }

    #[instrument(skip_all)]
    fn build(&self, unit_tree: &Path) -> Result<BuildAttempt> {
        let vars = ToolVars {
            feature: &self.feature,
            ..ToolVars::default()
        };
        let out = self.run_tool("build", &self.tools.build, &vars, unit_tree, Retain::Tail)?;
        if out.success() {
            debug!("build passed");
            return Ok(BuildAttempt::passed());
        }
        debug!(exit_code = ?out.status.code(), "build failed");
        Ok(BuildAttempt::failed(out.combined_text("build")))
    }

    #[instrument(skip_all, fields(feature = %feature.name))]
    fn update_metadata(&self, feature: &FeaturePaths) -> Result<()> {
        let vars = ToolVars {
            feature: &feature.name,
            ..ToolVars::default()
        };
        let out = self.run_tool(
            "update",
            &self.tools.update,
            &vars,
            &feature.project_root,
            Retain::Head,
        )?;
        if !out.success() {
            return Err(WorkflowError::MetadataUpdateFailure {
                feature: feature.name.clone(),
                reason: out.tail("update", TAIL_LINES),
            }
            .into());
        }
        Ok(())
    }
}

fn render_argv(label: &str, template: &[String], vars: &ToolVars<'_>) -> Result<Vec<String>> {
    let env = Environment::new();
    template
        .iter()
        .map(|arg| {
            env.render_str(arg, vars)
                .with_context(|| format!("render {label} argument '{arg}'"))
        })
        .collect()
}
