//! Per-operation timing monitor.
//!
//! Buckets handled operations into push-count / push-grad / pull and logs
//! mean latencies every `log_every` operations.

use std::time::{Duration, Instant};

use fmps_core::PUSH_FEA_CNT;

const KIND_TOTAL: usize = 0;
const KIND_PUSH_CNT: usize = 1;
const KIND_PUSH_GRAD: usize = 2;
const KIND_PULL: usize = 3;

#[derive(Debug)]
pub(crate) struct Perf {
    started: Option<Instant>,
    kind: usize,
    time: [Duration; 4],
    count: [u64; 4],
    log_every: u64,
}

impl Perf {
    pub(crate) fn new(log_every: u64) -> Self {
        Self {
            started: None,
            kind: KIND_TOTAL,
            time: [Duration::ZERO; 4],
            count: [0; 4],
            log_every: log_every.max(1),
        }
    }

    pub(crate) fn start(&mut self, push: bool, cmd: i32) {
        self.kind = if push {
            if cmd == PUSH_FEA_CNT {
                KIND_PUSH_CNT
            } else {
                KIND_PUSH_GRAD
            }
        } else {
            KIND_PULL
        };
        self.started = Some(Instant::now());
    }

    pub(crate) fn stop(&mut self) {
        let Some(started) = self.started.take() else {
            return;
        };
        self.time[self.kind] += started.elapsed();
        self.count[self.kind] += 1;
        self.count[KIND_TOTAL] += 1;
        if self.count[KIND_TOTAL] % self.log_every == 0 {
            tracing::info!(
                "push feacnt: {} x {:?}, push grad: {} x {:?}, pull: {} x {:?}",
                self.count[KIND_PUSH_CNT],
                self.mean(KIND_PUSH_CNT),
                self.count[KIND_PUSH_GRAD],
                self.mean(KIND_PUSH_GRAD),
                self.count[KIND_PULL],
                self.mean(KIND_PULL),
            );
        }
    }

    fn mean(&self, kind: usize) -> Duration {
        self.time[kind] / self.count[kind].max(1) as u32
    }
}
