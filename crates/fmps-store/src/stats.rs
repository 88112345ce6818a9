//! Process-wide model-growth counters.
//!
//! Shards share one [`StoreStats`] through an `Arc`; all traffic is
//! relaxed atomics. Only the reporter observes and resets the counters,
//! tolerating small drift under concurrent updaters.

use std::sync::atomic::{AtomicI64, Ordering};

use fmps_core::Progress;

/// Net counts of newly non-zero linear weights and newly live embedding
/// slots since the last emission.
#[derive(Debug, Default)]
pub struct StoreStats {
    new_w: AtomicI64,
    new_v: AtomicI64,
}

impl StoreStats {
    /// Creates zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a signed delta to the linear-weight counter.
    #[inline]
    pub fn add_w(&self, delta: i64) {
        self.new_w.fetch_add(delta, Ordering::Relaxed);
    }

    /// Adds a signed delta to the embedding-slot counter.
    #[inline]
    pub fn add_v(&self, delta: i64) {
        self.new_v.fetch_add(delta, Ordering::Relaxed);
    }

    /// Reads the counters without resetting them.
    pub fn snapshot(&self) -> Progress {
        Progress::new(
            self.new_w.load(Ordering::Relaxed),
            self.new_v.load(Ordering::Relaxed),
        )
    }

    /// Reads and resets the counters for one batched emission.
    pub fn take(&self) -> Progress {
        Progress::new(
            self.new_w.swap(0, Ordering::Relaxed),
            self.new_v.swap(0, Ordering::Relaxed),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let stats = StoreStats::new();
        stats.add_w(1);
        stats.add_w(1);
        stats.add_w(-1);
        stats.add_v(8);
        assert_eq!(stats.snapshot(), Progress::new(1, 8));
    }

    #[test]
    fn test_take_resets() {
        let stats = StoreStats::new();
        stats.add_w(3);
        stats.add_v(-2);
        assert_eq!(stats.take(), Progress::new(3, -2));
        assert_eq!(stats.snapshot(), Progress::default());
    }

    #[test]
    fn test_shared_across_threads() {
        use std::sync::Arc;

        let stats = Arc::new(StoreStats::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let stats = Arc::clone(&stats);
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        stats.add_w(1);
                        stats.add_v(2);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(stats.take(), Progress::new(4000, 8000));
    }
}
