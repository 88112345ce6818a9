//! Per-feature regularization schedule.
//!
//! Rare features start under weaker pressure: every penalty is a base
//! value plus an increment that scales with how often the feature has been
//! seen in gradient pushes.

use fmps_core::EmbeddingConfig;
use serde::{Deserialize, Serialize};

/// Effective penalties at a single update.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegFactors {
    /// Pointwise L1 penalty.
    pub l1: f32,
    /// Pointwise L2 penalty.
    pub l2: f32,
    /// Group L1/2 penalty.
    pub l1_2: f32,
}

/// Derives effective `{l1, l2, l1_2}` from base + per-occurrence increments.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegSchedule {
    base_l1: f32,
    base_l2: f32,
    base_l1_2: f32,
    inc_l1: f32,
    inc_l2: f32,
    inc_l1_2: f32,
}

impl RegSchedule {
    /// Builds the schedule from the embedding options.
    pub fn from_config(config: &EmbeddingConfig) -> Self {
        Self {
            base_l1: config.lambda_l1,
            base_l2: config.lambda_l2,
            base_l1_2: config.lambda_l1_2,
            inc_l1: config.lambda_l1_incremental,
            inc_l2: config.lambda_l2_incremental,
            inc_l1_2: config.lambda_l1_2_incremental,
        }
    }

    /// Effective penalties for a feature seen `occurrence` times.
    #[inline]
    pub fn effective(&self, occurrence: u32) -> RegFactors {
        let occ = occurrence as f32;
        RegFactors {
            l1: self.base_l1 + occ * self.inc_l1,
            l2: self.base_l2 + occ * self.inc_l2,
            l1_2: self.base_l1_2 + occ * self.inc_l1_2,
        }
    }

    /// True when a group penalty can ever apply.
    #[inline]
    pub fn has_group_penalty(&self) -> bool {
        self.base_l1_2 > 0.0 || self.inc_l1_2 > 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schedule(base: f32, inc: f32) -> RegSchedule {
        let config = EmbeddingConfig {
            lambda_l1: base,
            lambda_l2: 2.0 * base,
            lambda_l1_2: 3.0 * base,
            lambda_l1_incremental: inc,
            lambda_l2_incremental: 2.0 * inc,
            lambda_l1_2_incremental: 3.0 * inc,
            ..EmbeddingConfig::default()
        };
        RegSchedule::from_config(&config)
    }

    #[test]
    fn test_base_only_at_zero_occurrences() {
        let s = schedule(0.1, 0.01);
        let f = s.effective(0);
        assert!((f.l1 - 0.1).abs() < 1e-7);
        assert!((f.l2 - 0.2).abs() < 1e-7);
        assert!((f.l1_2 - 0.3).abs() < 1e-7);
    }

    #[test]
    fn test_penalty_grows_with_occurrence() {
        let s = schedule(0.1, 0.01);
        let f = s.effective(10);
        assert!((f.l1 - 0.2).abs() < 1e-6);
        assert!((f.l2 - 0.4).abs() < 1e-6);
        assert!((f.l1_2 - 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_group_penalty_detection() {
        assert!(!schedule(0.0, 0.0).has_group_penalty());
        assert!(schedule(0.1, 0.0).has_group_penalty());
        assert!(schedule(0.0, 0.01).has_group_penalty());
    }
}
