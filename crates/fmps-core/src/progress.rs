//! Batched statistics reported to the scheduler.

use serde::{Deserialize, Serialize};

/// Net model-growth statistics accumulated between emissions.
///
/// `new_w` is the signed count of zero-crossings of linear weights since the
/// last reset; `new_v` is the net number of embedding slots that went live.
/// Both are monotone approximations under concurrent updaters; small drift
/// is accepted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    /// Net newly non-zero linear weights.
    pub new_w: i64,
    /// Net newly live embedding slots.
    pub new_v: i64,
}

impl Progress {
    /// Creates a report from raw counter values.
    pub fn new(new_w: i64, new_v: i64) -> Self {
        Self { new_w, new_v }
    }

    /// True when there is nothing to report.
    pub fn is_empty(&self) -> bool {
        self.new_w == 0 && self.new_v == 0
    }

    /// Folds another report into this one.
    pub fn merge(&mut self, other: &Progress) {
        self.new_w += other.new_w;
        self.new_v += other.new_v;
    }
}
