//! Migration configuration, by default `<project>/.c2rust/config.toml`.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::types::{GateFailurePolicy, MissingSourcePolicy, UnattributedFailurePolicy};

/// Feature table consulted when the named feature has none of its own.
pub const DEFAULT_FEATURE_KEY: &str = "default";

/// Environment variable consulted when `hybrid.preload_lib` is unset.
pub const PRELOAD_LIB_ENV: &str = "C2RUST_HYBRID_BUILD_LIB";

/// Migration configuration (TOML).
///
/// Read once per run by the CLI and handed to the orchestrator. Missing
/// fields fall back to the defaults below.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MigrateConfig {
    /// Maximum fix-loop iterations per unit.
    pub max_fix_attempts: u32,

    pub on_missing_source: MissingSourcePolicy,

    pub on_unattributed_failure: UnattributedFailurePolicy,

    /// Whether a failing gate verification stops the run.
    pub on_gate_failure: GateFailurePolicy,

    /// Truncate captured tool stdout/stderr beyond this many bytes.
    pub output_limit_bytes: usize,

    /// Optional wall-clock limit for each external tool call.
    pub tool_timeout_secs: Option<u64>,

    pub layout: LayoutConfig,

    pub tools: ToolsConfig,

    pub hybrid: HybridConfig,

    /// Per-feature clean/build/test commands, keyed by feature name.
    pub feature: BTreeMap<String, FeatureCommands>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LayoutConfig {
    /// Directory under the project root holding one directory per feature.
    pub base_dir: String,
    /// Unit tree directory inside a feature directory.
    pub unit_dir: String,
    pub source_ext: String,
    pub target_ext: String,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            base_dir: ".c2rust".to_string(),
            unit_dir: "rust".to_string(),
            source_ext: "c".to_string(),
            target_ext: "rs".to_string(),
        }
    }
}

/// Argv templates for the external tools.
///
/// Each argument is rendered with `feature`, `kind`, `input`, `output`
/// and `error` in scope. `kind` is `variable` or `function` for translation
/// and `fix` for repairs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ToolsConfig {
    pub initialize: Vec<String>,
    pub update: Vec<String>,
    pub build: Vec<String>,
    pub translate: Vec<String>,
    pub fix: Vec<String>,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        let translate = argv(&[
            "translate-and-fix",
            "--type",
            "{{ kind }}",
            "--input",
            "{{ input }}",
            "--output",
            "{{ output }}",
        ]);
        let mut fix = translate.clone();
        fix.extend(argv(&["--error", "{{ error }}"]));
        Self {
            initialize: argv(&["code-analyse", "--init", "--feature", "{{ feature }}"]),
            update: argv(&["code-analyse", "--update", "--feature", "{{ feature }}"]),
            build: argv(&["cargo", "build"]),
            translate,
            fix,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HybridConfig {
    /// Library preloaded into the hybrid build phase.
    pub preload_lib: Option<PathBuf>,
}

impl HybridConfig {
    /// Configured preload library, else the `C2RUST_HYBRID_BUILD_LIB` variable.
    pub fn resolve_preload_lib(&self) -> Option<PathBuf> {
        self.preload_lib.clone().or_else(|| {
            std::env::var_os(PRELOAD_LIB_ENV)
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FeatureCommands {
    pub clean: Option<PhaseCommand>,
    pub build: Option<PhaseCommand>,
    pub test: Option<PhaseCommand>,
}

/// One hybrid phase: a shell command and the directory it runs in.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PhaseCommand {
    pub command: String,
    /// Relative to the project root; defaults to the project root.
    #[serde(default)]
    pub dir: Option<String>,
}

impl Default for MigrateConfig {
    fn default() -> Self {
        Self {
            max_fix_attempts: 10,
            on_missing_source: MissingSourcePolicy::default(),
            on_unattributed_failure: UnattributedFailurePolicy::default(),
            on_gate_failure: GateFailurePolicy::default(),
            output_limit_bytes: 1_000_000,
            tool_timeout_secs: None,
            layout: LayoutConfig::default(),
            tools: ToolsConfig::default(),
            hybrid: HybridConfig::default(),
            feature: BTreeMap::new(),
        }
    }
}

impl MigrateConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_fix_attempts == 0 {
            return Err(anyhow!("max_fix_attempts must be > 0"));
        }
        if self.output_limit_bytes == 0 {
            return Err(anyhow!("output_limit_bytes must be > 0"));
        }
        if self.tool_timeout_secs == Some(0) {
            return Err(anyhow!("tool_timeout_secs must be > 0 when set"));
        }
        for (name, value) in [
            ("layout.base_dir", &self.layout.base_dir),
            ("layout.unit_dir", &self.layout.unit_dir),
            ("layout.source_ext", &self.layout.source_ext),
            ("layout.target_ext", &self.layout.target_ext),
        ] {
            if value.trim().is_empty() {
                return Err(anyhow!("{name} must not be empty"));
            }
        }
        if self.layout.source_ext == self.layout.target_ext {
            return Err(anyhow!("layout.source_ext and layout.target_ext must differ"));
        }
        for (name, template) in [
            ("tools.initialize", &self.tools.initialize),
            ("tools.update", &self.tools.update),
            ("tools.build", &self.tools.build),
            ("tools.translate", &self.tools.translate),
            ("tools.fix", &self.tools.fix),
        ] {
            validate_argv(name, template)?;
        }
        for (feature, commands) in &self.feature {
            for (phase, cmd) in commands.phases() {
                if let Some(cmd) = cmd
                    && cmd.command.trim().is_empty()
                {
                    return Err(anyhow!("feature.{feature}.{phase}.command must not be empty"));
                }
            }
        }
        Ok(())
    }

    pub fn tool_timeout(&self) -> Option<Duration> {
        self.tool_timeout_secs.map(Duration::from_secs)
    }

    /// Commands for `feature`, falling back to `[feature.default]`.
    pub fn feature_commands(&self, feature: &str) -> Option<&FeatureCommands> {
        self.feature
            .get(feature)
            .or_else(|| self.feature.get(DEFAULT_FEATURE_KEY))
    }
}

impl FeatureCommands {
    /// Phases in execution order.
    pub fn phases(&self) -> [(&'static str, Option<&PhaseCommand>); 3] {
        [
            ("clean", self.clean.as_ref()),
            ("build", self.build.as_ref()),
            ("test", self.test.as_ref()),
        ]
    }
}

/// Default config location for a project root.
pub fn default_config_path(project_root: &Path) -> PathBuf {
    project_root
        .join(LayoutConfig::default().base_dir)
        .join("config.toml")
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `MigrateConfig::default()`.
pub fn load_config(path: &Path) -> Result<MigrateConfig> {
    if !path.exists() {
        debug!(path = %path.display(), "config missing, using defaults");
        let cfg = MigrateConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: MigrateConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

fn validate_argv(name: &str, template: &[String]) -> Result<()> {
    match template.first() {
        Some(program) if !program.trim().is_empty() => {}
        _ => return Err(anyhow!("{name} must be a non-empty array")),
    }
    let env = minijinja::Environment::new();
    for arg in template {
        env.template_from_str(arg)
            .with_context(|| format!("{name}: invalid template '{arg}'"))?;
    }
    Ok(())
}

fn argv(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|p| p.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, MigrateConfig::default());
    }

    #[test]
    fn parses_feature_commands_and_policies() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        fs::write(
            &path,
            r#"
max_fix_attempts = 3
on_missing_source = "auto-reinitialize"
on_gate_failure = "abort"

[feature.default.test]
command = "make check"

[feature.net.build]
command = "make -j4"
dir = "src"
"#,
        )
        .expect("write");

        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.max_fix_attempts, 3);
        assert_eq!(cfg.on_missing_source, MissingSourcePolicy::AutoReinitialize);
        assert_eq!(cfg.on_gate_failure, GateFailurePolicy::Abort);
        let net = cfg.feature_commands("net").expect("net commands");
        let build = net.build.as_ref().expect("build phase");
        assert_eq!(build.command, "make -j4");
        assert_eq!(build.dir.as_deref(), Some("src"));
        assert!(net.test.is_none());

        let fallback = cfg.feature_commands("other").expect("default commands");
        assert_eq!(
            fallback.test.as_ref().map(|c| c.command.as_str()),
            Some("make check")
        );
    }

    #[test]
    fn rejects_zero_fix_attempts() {
        let cfg = MigrateConfig {
            max_fix_attempts: 0,
            ..MigrateConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_bad_template() {
        let mut cfg = MigrateConfig::default();
        cfg.tools.translate = vec!["tool".to_string(), "{{ input".to_string()];
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("tools.translate"));
    }

    #[test]
    fn rejects_empty_build_argv() {
        let mut cfg = MigrateConfig::default();
        cfg.tools.build = Vec::new();
        assert!(cfg.validate().is_err());
    }
}
