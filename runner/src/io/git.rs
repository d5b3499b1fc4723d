//! Git checkpointing for the migration workflow.
//!
//! Every completed workflow step is committed immediately, so a crashed run is
//! resumed by rescanning the tree. We keep a small, explicit wrapper around
//! `git` subprocess calls.

use std::path::PathBuf;
use std::process::{Command, Output};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, instrument};

/// Durable checkpoints of workflow progress.
pub trait Checkpointer {
    /// Stage every working-tree change and commit it with `message`.
    ///
    /// Returns `Ok(false)` without committing when nothing changed, so calling
    /// it twice in a row is a no-op the second time.
    fn commit_if_dirty(&self, message: &str) -> Result<bool>;
}

/// Wrapper for executing git commands in a working directory.
#[derive(Debug, Clone)]
pub struct Git {
    workdir: PathBuf,
}

impl Git {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }

    /// Fail unless the working directory is inside a git work tree.
    pub fn ensure_repository(&self) -> Result<()> {
        let out = self
            .run_capture(&["rev-parse", "--is-inside-work-tree"])
            .with_context(|| format!("{} is not a git repository", self.workdir.display()))?;
        if out.trim() != "true" {
            return Err(anyhow!(
                "{} is not inside a git work tree",
                self.workdir.display()
            ));
        }
        Ok(())
    }

    /// Stage all changes (respects .gitignore).
    pub fn add_all(&self) -> Result<()> {
        self.run_checked(&["add", "-A"])?;
        Ok(())
    }

    /// True if there is anything staged for commit.
    pub fn has_staged_changes(&self) -> Result<bool> {
        let out = self.run_checked(&["diff", "--cached", "--name-only"])?;
        Ok(!String::from_utf8_lossy(&out.stdout).trim().is_empty())
    }

    /// Commit staged changes with a message.
    ///
    /// If there are no staged changes, this returns Ok(false) and does nothing.
    #[instrument(skip_all)]
    pub fn commit_staged(&self, message: &str) -> Result<bool> {
        if !self.has_staged_changes()? {
            debug!("no staged changes, skipping commit");
            return Ok(false);
        }
        debug!("committing staged changes");
        self.run_checked(&["commit", "-m", message])?;
        Ok(true)
    }

    /// Subjects of the most recent `count` commits, newest first.
    pub fn recent_subjects(&self, count: usize) -> Result<Vec<String>> {
        let arg = format!("-{count}");
        let out = self.run_capture(&["log", &arg, "--format=%s"])?;
        Ok(out.lines().map(str::to_string).collect())
    }

    /// Files touched by the commit at HEAD.
    pub fn head_changed_files(&self) -> Result<Vec<String>> {
        let out = self.run_capture(&["show", "--name-only", "--format=", "HEAD"])?;
        Ok(out
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(str::to_string)
            .collect())
    }

    fn run_capture(&self, args: &[&str]) -> Result<String> {
        let output = self.run_checked(args)?;
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    fn run_checked(&self, args: &[&str]) -> Result<Output> {
        let output = self.run(args)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("git {} failed: {}", args.join(" "), stderr.trim()));
        }
        Ok(output)
    }

    fn run(&self, args: &[&str]) -> Result<Output> {
        Command::new("git")
            .args(args)
            .current_dir(&self.workdir)
            .output()
            .with_context(|| format!("spawn git {}", args.join(" ")))
    }
}

impl Checkpointer for Git {
    #[instrument(skip_all, fields(commit = message))]
    fn commit_if_dirty(&self, message: &str) -> Result<bool> {
        self.add_all()?;
        let committed = self.commit_staged(message)?;
        if committed {
            info!(commit = message, "checkpoint committed");
        }
        Ok(committed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn init_repo() -> tempfile::TempDir {
        let temp = tempfile::tempdir().expect("tempdir");
        for args in [
            vec!["init", "-q"],
            vec!["config", "user.name", "Migrate Test"],
            vec!["config", "user.email", "migrate-test@local.invalid"],
            vec!["config", "commit.gpgsign", "false"],
        ] {
            let status = Command::new("git")
                .args(&args)
                .current_dir(temp.path())
                .status()
                .expect("git");
            assert!(status.success());
        }
        temp
    }

    #[test]
    fn commit_if_dirty_is_idempotent() {
        let temp = init_repo();
        let git = Git::new(temp.path());
        fs::write(temp.path().join("var_a.rs"), "static A: i32 = 1;\n").expect("write");

        assert!(git.commit_if_dirty("translate var_a.rs").expect("first commit"));
        assert!(!git.commit_if_dirty("translate var_a.rs").expect("second commit"));
        assert_eq!(
            git.recent_subjects(5).expect("log"),
            vec!["translate var_a.rs".to_string()]
        );
        assert_eq!(
            git.head_changed_files().expect("show"),
            vec!["var_a.rs".to_string()]
        );
    }

    #[test]
    fn ensure_repository_rejects_plain_directory() {
        let temp = tempfile::tempdir().expect("tempdir");
        let git = Git::new(temp.path());
        assert!(git.ensure_repository().is_err());
    }
}
