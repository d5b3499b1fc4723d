//! Migration runner CLI.
//!
//! Migrates one feature's unit tree placeholder by placeholder, committing
//! after every step. Re-running after a failure resumes where it stopped.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, ValueEnum};
use tracing::{error, info, warn};

use migrate_runner::core::types::MissingSourcePolicy;
use migrate_runner::error::WorkflowError;
use migrate_runner::exit_codes;
use migrate_runner::feature::{FeaturePaths, validate_feature_name};
use migrate_runner::io::config::{MigrateConfig, default_config_path, load_config};
use migrate_runner::io::gateway::CommandGateway;
use migrate_runner::io::git::Git;
use migrate_runner::io::hybrid::ShellHybridRunner;
use migrate_runner::logging;
use migrate_runner::orchestrator::{Orchestrator, RunReport};

#[derive(Parser)]
#[command(
    name = "migrate-runner",
    version,
    about = "Incremental file-by-file migration orchestrator"
)]
struct Cli {
    /// Feature to migrate (directory name under `.c2rust/`).
    #[arg(long)]
    feature: String,

    /// Project root; must be inside a git work tree.
    #[arg(long, default_value = ".")]
    project_root: PathBuf,

    /// Config file. Defaults to `<project-root>/.c2rust/config.toml`.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override `max_fix_attempts` from the config file.
    #[arg(long)]
    max_fix_attempts: Option<u32>,

    /// Override `on_missing_source` from the config file.
    #[arg(long, value_enum)]
    on_missing_source: Option<MissingSourceArg>,

    /// Print the run report as JSON on stdout.
    #[arg(long)]
    json: bool,

    /// Increase log verbosity (-v debug, -vv trace). `RUST_LOG` takes precedence.
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum MissingSourceArg {
    Abort,
    AutoReinitialize,
}

impl From<MissingSourceArg> for MissingSourcePolicy {
    fn from(arg: MissingSourceArg) -> Self {
        match arg {
            MissingSourceArg::Abort => MissingSourcePolicy::Abort,
            MissingSourceArg::AutoReinitialize => MissingSourcePolicy::AutoReinitialize,
        }
    }
}

fn main() {
    let cli = Cli::parse();

    let (paths, config) = match prepare(&cli) {
        Ok(prepared) => prepared,
        Err(err) => {
            eprintln!("{err:#}");
            std::process::exit(exit_codes::INVALID);
        }
    };

    let log_dir = paths
        .project_root
        .join(&config.layout.base_dir)
        .join("output");
    match logging::open_log_file(&log_dir) {
        Ok((path, file)) => {
            logging::init(cli.verbose, Some(file));
            info!(path = %path.display(), "log file created");
        }
        Err(err) => {
            logging::init(cli.verbose, None);
            warn!(err = %format!("{err:#}"), "run log file unavailable, logging to stderr only");
        }
    }

    match migrate(&paths, &config) {
        Ok(report) => {
            if cli.json {
                match serde_json::to_string_pretty(&report) {
                    Ok(json) => println!("{json}"),
                    Err(err) => {
                        eprintln!("serialize run report: {err}");
                        std::process::exit(exit_codes::FAILED);
                    }
                }
            }
            std::process::exit(exit_codes::OK);
        }
        Err(err) => {
            if let Some(kind) = err.downcast_ref::<WorkflowError>().map(WorkflowError::kind) {
                error!(kind, "migration failed");
            }
            eprintln!("{err:#}");
            std::process::exit(exit_codes::FAILED);
        }
    }
}

/// Resolve the project, config and feature layout before anything runs.
fn prepare(cli: &Cli) -> Result<(FeaturePaths, MigrateConfig)> {
    validate_feature_name(&cli.feature)?;
    let root = cli
        .project_root
        .canonicalize()
        .with_context(|| format!("resolve project root {}", cli.project_root.display()))?;

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| default_config_path(&root));
    let mut config = load_config(&config_path)?;
    if let Some(max) = cli.max_fix_attempts {
        config.max_fix_attempts = max;
    }
    if let Some(policy) = cli.on_missing_source {
        config.on_missing_source = policy.into();
    }
    config.validate().context("invalid command-line overrides")?;

    Git::new(&root).ensure_repository()?;
    let paths = FeaturePaths::new(&root, &cli.feature, &config.layout)?;
    Ok((paths, config))
}

fn migrate(paths: &FeaturePaths, config: &MigrateConfig) -> Result<RunReport> {
    let gateway = CommandGateway::new(config, paths);
    let git = Git::new(&paths.project_root);
    let hybrid = ShellHybridRunner::new(config);

    let report = Orchestrator::new(paths, config, &gateway, &git, &hybrid).run(|unit| {
        info!(
            unit = %unit.unit,
            fix_attempts = unit.fix_attempts,
            provisional = unit.provisional,
            "unit done"
        );
    })?;
    info!(
        feature = %report.feature,
        translated = report.translated.len(),
        skipped = report.skipped.len(),
        "migration complete"
    );
    Ok(report)
}
