//! Bounded fix-attempt counter for a single unit.

/// Counts fix-loop iterations for one unit against a fixed maximum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixBudget {
    used: u32,
    max: u32,
}

impl FixBudget {
    pub fn new(max: u32) -> Self {
        Self { used: 0, max }
    }

    pub fn used(&self) -> u32 {
        self.used
    }

    pub fn max(&self) -> u32 {
        self.max
    }

    pub fn is_exhausted(&self) -> bool {
        self.used >= self.max
    }

    /// Record one fix attempt. Saturates at `max`.
    pub fn consume(&mut self) {
        if self.used < self.max {
            self.used += 1;
        }
    }
}
