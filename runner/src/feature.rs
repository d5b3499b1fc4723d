//! Canonical paths for a feature being migrated.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};

use crate::io::config::LayoutConfig;

/// Paths of one feature inside a project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeaturePaths {
    pub name: String,
    pub project_root: PathBuf,
    /// `<project>/<base_dir>/<feature>`
    pub feature_dir: PathBuf,
    /// `<feature_dir>/<unit_dir>`, one file per translation unit.
    pub unit_tree: PathBuf,
    pub source_ext: String,
    pub target_ext: String,
}

impl FeaturePaths {
    pub fn new(project_root: impl Into<PathBuf>, name: &str, layout: &LayoutConfig) -> Result<Self> {
        validate_feature_name(name)?;
        let project_root = project_root.into();
        let feature_dir = project_root.join(&layout.base_dir).join(name);
        let unit_tree = feature_dir.join(&layout.unit_dir);
        Ok(Self {
            name: name.to_string(),
            project_root,
            feature_dir,
            unit_tree,
            source_ext: layout.source_ext.clone(),
            target_ext: layout.target_ext.clone(),
        })
    }

    /// Whether the unit tree exists. Errors if the path exists but is not a directory.
    pub fn unit_tree_exists(&self) -> Result<bool> {
        match fs::metadata(&self.unit_tree) {
            Ok(meta) if meta.is_dir() => Ok(true),
            Ok(_) => Err(anyhow!(
                "unit tree path exists but is not a directory: {}",
                self.unit_tree.display()
            )),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e).with_context(|| format!("access {}", self.unit_tree.display())),
        }
    }

    /// Path relative to the project root, for log lines and commit messages.
    pub fn relative<'a>(&self, path: &'a Path) -> &'a Path {
        path.strip_prefix(&self.project_root).unwrap_or(path)
    }
}

/// Reject names that could escape the feature base directory.
pub fn validate_feature_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(anyhow!("feature name must not be empty"));
    }
    if name.contains('/') || name.contains('\\') || name.contains("..") {
        return Err(anyhow!(
            "invalid feature name '{name}': must be a simple directory name without path separators or '..'"
        ));
    }
    Ok(())
}
