//! Test-only helpers: a throwaway git project with a feature unit tree, plus
//! scripted stand-ins for the external tools.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result, anyhow};
use tempfile::TempDir;

use crate::core::types::{BuildAttempt, UnitKind};
use crate::error::WorkflowError;
use crate::feature::FeaturePaths;
use crate::io::config::LayoutConfig;
use crate::io::gateway::ToolGateway;
use crate::io::git::{Checkpointer, Git};
use crate::io::hybrid::{HybridRunner, PhaseOutcome, PhaseRequest};

/// Temporary git repository laid out like a project under migration.
pub struct TestRepo {
    temp: TempDir,
    paths: FeaturePaths,
}

impl TestRepo {
    /// Repository with an empty unit tree for `feature`.
    pub fn new(feature: &str) -> Result<Self> {
        let repo = Self::without_unit_tree(feature)?;
        fs::create_dir_all(&repo.paths.unit_tree)
            .with_context(|| format!("create {}", repo.paths.unit_tree.display()))?;
        Ok(repo)
    }

    /// Repository where `feature` has not been initialized yet.
    pub fn without_unit_tree(feature: &str) -> Result<Self> {
        let temp = tempfile::tempdir().context("tempdir")?;
        for args in [
            vec!["init", "-q"],
            vec!["config", "user.name", "Migrate Test"],
            vec!["config", "user.email", "migrate-test@local.invalid"],
            vec!["config", "commit.gpgsign", "false"],
            vec!["commit", "-q", "--allow-empty", "-m", "Initial commit"],
        ] {
            let status = Command::new("git")
                .args(&args)
                .current_dir(temp.path())
                .status()
                .with_context(|| format!("git {}", args.join(" ")))?;
            if !status.success() {
                return Err(anyhow!("git {} failed", args.join(" ")));
            }
        }
        let paths = FeaturePaths::new(temp.path(), feature, &LayoutConfig::default())?;
        Ok(Self { temp, paths })
    }

    pub fn root(&self) -> &Path {
        self.temp.path()
    }

    pub fn paths(&self) -> &FeaturePaths {
        &self.paths
    }

    pub fn git(&self) -> Git {
        Git::new(self.root())
    }

    /// Empty `<stem>.rs` placeholder with `<stem>.c` holding `source`.
    pub fn add_unit(&self, stem: &str, source: &str) -> Result<PathBuf> {
        let target = self.add_placeholder(&format!("{stem}.rs"))?;
        write(&self.paths.unit_tree.join(format!("{stem}.c")), source)?;
        Ok(target)
    }

    /// Like [`TestRepo::add_unit`] with a source that need not be UTF-8.
    pub fn add_unit_bytes(&self, stem: &str, source: &[u8]) -> Result<PathBuf> {
        let target = self.add_placeholder(&format!("{stem}.rs"))?;
        let path = self.paths.unit_tree.join(format!("{stem}.c"));
        fs::write(&path, source).with_context(|| format!("write {}", path.display()))?;
        Ok(target)
    }

    /// Empty unit file without a source counterpart.
    pub fn add_placeholder(&self, name: &str) -> Result<PathBuf> {
        let path = self.paths.unit_tree.join(name);
        write(&path, "")?;
        Ok(path)
    }

    pub fn add_resolved(&self, name: &str, content: &str) -> Result<PathBuf> {
        let path = self.paths.unit_tree.join(name);
        write(&path, content)?;
        Ok(path)
    }

    /// Empty `<stem>.rs` again.
    pub fn reset_unit(&self, stem: &str) -> Result<()> {
        write(&self.paths.unit_tree.join(format!("{stem}.rs")), "")
    }

    pub fn read_unit(&self, name: &str) -> Result<String> {
        let path = self.paths.unit_tree.join(name);
        fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))
    }

    pub fn commit_all(&self, message: &str) -> Result<bool> {
        self.git().commit_if_dirty(message)
    }
}

/// Compiler-style failure pointing at `file`.
pub fn failing_build(file: &str) -> BuildAttempt {
    BuildAttempt::failed(format!(
        "error[E0425]: cannot find value `x` in this scope\n --> src/{file}:3:5\n  |\n3 |     x\n  |     ^ not found in this scope\n"
    ))
}

/// Gateway returning scripted content and recording every call.
pub struct ScriptedGateway {
    translation: Option<String>,
    fix: Option<String>,
    builds: RefCell<VecDeque<BuildAttempt>>,
    default_build: BuildAttempt,
    initialize_files: Vec<(String, String)>,
    revert_on_update: Option<(usize, PathBuf)>,
    fail_update: bool,
    initialize_calls: Cell<usize>,
    build_calls: Cell<usize>,
    metadata_updates: Cell<usize>,
    translate_sources: RefCell<Vec<Vec<u8>>>,
    fix_diagnostics: RefCell<Vec<String>>,
}

impl Default for ScriptedGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self {
            translation: None,
            fix: None,
            builds: RefCell::new(VecDeque::new()),
            default_build: BuildAttempt::passed(),
            initialize_files: Vec::new(),
            revert_on_update: None,
            fail_update: false,
            initialize_calls: Cell::new(0),
            build_calls: Cell::new(0),
            metadata_updates: Cell::new(0),
            translate_sources: RefCell::new(Vec::new()),
            fix_diagnostics: RefCell::new(Vec::new()),
        }
    }

    pub fn with_translation(mut self, content: &str) -> Self {
        self.translation = Some(content.to_string());
        self
    }

    pub fn with_fix(mut self, content: &str) -> Self {
        self.fix = Some(content.to_string());
        self
    }

    /// Build results returned in order before falling back to the default.
    pub fn with_builds(self, builds: Vec<BuildAttempt>) -> Self {
        self.builds.borrow_mut().extend(builds);
        self
    }

    pub fn with_default_build(mut self, build: BuildAttempt) -> Self {
        self.default_build = build;
        self
    }

    /// File written into the unit tree by `initialize`.
    pub fn with_initialize_file(mut self, name: &str, content: &str) -> Self {
        self.initialize_files
            .push((name.to_string(), content.to_string()));
        self
    }

    /// Empty `path` during the `nth` metadata update (1-based).
    pub fn with_revert_on_update(mut self, nth: usize, path: PathBuf) -> Self {
        self.revert_on_update = Some((nth, path));
        self
    }

    /// Every metadata update fails.
    pub fn with_failing_update(mut self) -> Self {
        self.fail_update = true;
        self
    }

    pub fn initialize_calls(&self) -> usize {
        self.initialize_calls.get()
    }

    pub fn build_calls(&self) -> usize {
        self.build_calls.get()
    }

    pub fn fix_calls(&self) -> usize {
        self.fix_diagnostics.borrow().len()
    }

    pub fn metadata_updates(&self) -> usize {
        self.metadata_updates.get()
    }

    /// Translator inputs, lossily decoded.
    pub fn translate_inputs(&self) -> Vec<String> {
        self.translate_sources
            .borrow()
            .iter()
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
            .collect()
    }

    pub fn translate_sources(&self) -> Vec<Vec<u8>> {
        self.translate_sources.borrow().clone()
    }

    pub fn fix_diagnostics(&self) -> Vec<String> {
        self.fix_diagnostics.borrow().clone()
    }
}

impl ToolGateway for ScriptedGateway {
    fn initialize(&self, feature: &FeaturePaths) -> Result<()> {
        self.initialize_calls.set(self.initialize_calls.get() + 1);
        fs::create_dir_all(&feature.unit_tree)
            .with_context(|| format!("create {}", feature.unit_tree.display()))?;
        for (name, content) in &self.initialize_files {
            write(&feature.unit_tree.join(name), content)?;
        }
        Ok(())
    }

    fn translate(&self, _kind: UnitKind, source_content: &[u8]) -> Result<String> {
        self.translate_sources
            .borrow_mut()
            .push(source_content.to_vec());
        self.translation
            .clone()
            .ok_or_else(|| anyhow!("no scripted translation"))
    }

    fn fix(&self, _current_content: &str, diagnostic_text: &str) -> Result<String> {
        self.fix_diagnostics
            .borrow_mut()
            .push(diagnostic_text.to_string());
        self.fix.clone().ok_or_else(|| anyhow!("no scripted fix"))
    }

    fn build(&self, _unit_tree: &Path) -> Result<BuildAttempt> {
        self.build_calls.set(self.build_calls.get() + 1);
        Ok(self
            .builds
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| self.default_build.clone()))
    }

    fn update_metadata(&self, feature: &FeaturePaths) -> Result<()> {
        let count = self.metadata_updates.get() + 1;
        self.metadata_updates.set(count);
        if self.fail_update {
            return Err(WorkflowError::MetadataUpdateFailure {
                feature: feature.name.clone(),
                reason: "code-analyse exited with status 1".to_string(),
            }
            .into());
        }
        if let Some((nth, path)) = &self.revert_on_update
            && *nth == count
        {
            write(path, "")?;
        }
        Ok(())
    }
}

/// Hybrid runner that records phases and optionally fails one of them.
pub struct ScriptedHybrid {
    fail_phase: Option<&'static str>,
    seen: RefCell<Vec<&'static str>>,
}

impl ScriptedHybrid {
    pub fn passing() -> Self {
        Self {
            fail_phase: None,
            seen: RefCell::new(Vec::new()),
        }
    }

    pub fn failing_phase(phase: &'static str) -> Self {
        Self {
            fail_phase: Some(phase),
            seen: RefCell::new(Vec::new()),
        }
    }

    pub fn phases(&self) -> Vec<&'static str> {
        self.seen.borrow().clone()
    }
}

impl HybridRunner for ScriptedHybrid {
    fn run_phase(&self, request: &PhaseRequest) -> Result<PhaseOutcome> {
        self.seen.borrow_mut().push(request.phase);
        if self.fail_phase == Some(request.phase) {
            return Ok(PhaseOutcome::Fail(format!("{} exited with status 2", request.phase)));
        }
        Ok(PhaseOutcome::Pass)
    }
}

/// Checkpointer that records messages instead of committing.
pub struct RecordingCheckpointer {
    fail: bool,
    messages: RefCell<Vec<String>>,
}

impl Default for RecordingCheckpointer {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingCheckpointer {
    pub fn new() -> Self {
        Self {
            fail: false,
            messages: RefCell::new(Vec::new()),
        }
    }

    /// Every commit attempt fails.
    pub fn failing() -> Self {
        Self {
            fail: true,
            messages: RefCell::new(Vec::new()),
        }
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.borrow().clone()
    }
}

impl Checkpointer for RecordingCheckpointer {
    fn commit_if_dirty(&self, message: &str) -> Result<bool> {
        if self.fail {
            return Err(anyhow!("unable to create '.git/index.lock': File exists"));
        }
        self.messages.borrow_mut().push(message.to_string());
        Ok(true)
    }
}

fn write(path: &Path, contents: &str) -> Result<()> {
    fs::write(path, contents).with_context(|| format!("write {}", path.display()))
}
