//! Progress counters for operator-facing log lines.

/// Resolved-unit progress across a run, including units resolved by earlier runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Progress {
    resolved: usize,
    total: usize,
}

impl Progress {
    /// `already_resolved` is clamped to `total`.
    pub fn new(total: usize, already_resolved: usize) -> Self {
        Self {
            resolved: already_resolved.min(total),
            total,
        }
    }

    pub fn mark_resolved(&mut self) {
        self.resolved += 1;
        if self.resolved > self.total {
            self.total = self.resolved;
        }
    }

    /// 1-indexed position of the unit about to be processed.
    pub fn position(&self) -> usize {
        self.resolved + 1
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        self.resolved as f64 / self.total as f64 * 100.0
    }
}
