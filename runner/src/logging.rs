//! Tracing setup for the migration runner.
//!
//! Log output goes to stderr so stdout stays free for the `--json` run
//! report. Each run also writes a plain-text copy to
//! `<base_dir>/output/translate_<timestamp>.log`. Durable progress is
//! recorded in git commits, not in logs.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::{Local, NaiveDateTime};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Filter used when `RUST_LOG` is unset, by `-v` count.
pub fn default_directive(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "migrate_runner=info",
        1 => "migrate_runner=debug",
        _ => "migrate_runner=trace",
    }
}

/// Run log location inside `log_dir` for a run started at `started`.
pub fn log_file_path(log_dir: &Path, started: NaiveDateTime) -> PathBuf {
    log_dir.join(format!("translate_{}.log", started.format("%Y%m%d_%H%M%S")))
}

/// Create `log_dir` and a fresh run log inside it.
///
/// The directory gets a `.gitignore` of its own so checkpoint commits never
/// pick up log files.
pub fn open_log_file(log_dir: &Path) -> Result<(PathBuf, File)> {
    fs::create_dir_all(log_dir).with_context(|| format!("create {}", log_dir.display()))?;
    let ignore = log_dir.join(".gitignore");
    if !ignore.exists() {
        fs::write(&ignore, "*\n").with_context(|| format!("write {}", ignore.display()))?;
    }
    let path = log_file_path(log_dir, Local::now().naive_local());
    let file = File::create(&path).with_context(|| format!("create {}", path.display()))?;
    Ok((path, file))
}

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG` if set, otherwise uses [`default_directive`].
/// Output: stderr, compact format, plus `log_file` without ANSI colors.
///
/// # Example
/// ```bash
/// RUST_LOG=migrate_runner=debug migrate-runner --feature net
/// ```
pub fn init(verbosity: u8, log_file: Option<File>) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbosity)));
    let file_layer = log_file.map(|file| {
        fmt::layer()
            .with_writer(Mutex::new(file))
            .with_ansi(false)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .with(file_layer)
        .init();
}
