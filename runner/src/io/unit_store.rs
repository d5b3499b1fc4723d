//! Read-only view of a feature's unit tree.
//!
//! Resolution state is recomputed from file contents on every scan and never
//! cached, so a scan always matches the tree even after a crashed run.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;
use walkdir::WalkDir;

use crate::core::types::{Classification, TranslationUnit};
use crate::core::unit::{classify, is_unresolved};

/// Unit counts. `total` and `unresolved` cover recognized units only, since
/// unrecognized ones are never translated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeCounts {
    pub total: usize,
    pub unresolved: usize,
    pub unrecognized: usize,
}

/// Enumerates translation units below a unit tree root.
#[derive(Debug, Clone)]
pub struct UnitStore {
    root: PathBuf,
    target_ext: String,
}

impl UnitStore {
    pub fn new(root: impl Into<PathBuf>, target_ext: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            target_ext: target_ext.into(),
        }
    }

    /// Every unresolved unit, in lexicographic path order. Performs no writes.
    pub fn scan_unresolved(&self) -> Result<Vec<TranslationUnit>> {
        let mut units = Vec::new();
        for path in self.unit_files()? {
            if !is_unresolved(&read_unit(&path)?) {
                continue;
            }
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            units.push(TranslationUnit {
                classification: classify(&path),
                target_path: path,
                name,
            });
        }
        debug!(root = %self.root.display(), unresolved = units.len(), "scanned unit tree");
        Ok(units)
    }

    pub fn counts(&self) -> Result<TreeCounts> {
        let mut counts = TreeCounts {
            total: 0,
            unresolved: 0,
            unrecognized: 0,
        };
        for path in self.unit_files()? {
            if classify(&path) == Classification::Unrecognized {
                counts.unrecognized += 1;
                continue;
            }
            counts.total += 1;
            if is_unresolved(&read_unit(&path)?) {
                counts.unresolved += 1;
            }
        }
        Ok(counts)
    }

    fn unit_files(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in WalkDir::new(&self.root).sort_by_file_name() {
            let entry =
                entry.with_context(|| format!("walk unit tree {}", self.root.display()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some(self.target_ext.as_str()) {
                files.push(path.to_path_buf());
            }
        }
        files.sort();
        Ok(files)
    }
}

fn read_unit(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("read unit {}", path.display()))
}
