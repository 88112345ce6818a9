//! The per-shard update handle.
//!
//! One handle serves one shard: the transport routes each key to exactly
//! one shard and invokes its handlers serially, so nothing here locks.
//! The handle owns the bound optimizers, the resize policy, the per-shard
//! RNG used for fresh embedding slots, and the statistics plumbing shared
//! with the other shards.

use std::sync::Arc;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use fmps_core::{FeaId, Progress, ServerConfig, BIAS_KEY, PUSH_FEA_CNT};
use fmps_optimizer::{AuxRequirements, EmbeddingOptimizer, LinearOptimizer, RegSchedule};

use crate::entry::Entry;
use crate::error::{Result, StoreError};
use crate::perf::Perf;
use crate::stats::StoreStats;

/// Callback invoked with each batched statistics emission.
pub type Reporter = Box<dyn Fn(Progress) + Send + Sync>;

/// Dispatches transport messages onto entries.
pub struct UpdateHandle {
    config: ServerConfig,
    w_opt: LinearOptimizer,
    v_opt: EmbeddingOptimizer,
    schedule: RegSchedule,
    stats: Arc<StoreStats>,
    reporter: Option<Reporter>,
    rng: SmallRng,
    perf: Perf,
    /// Latched by `start`: the current batch is a feature-count push.
    push_count: bool,
    finish_calls: usize,
}

impl UpdateHandle {
    /// Builds a handle with a freshly seeded per-shard RNG.
    pub fn new(config: ServerConfig, stats: Arc<StoreStats>) -> Result<Self> {
        Self::build(config, stats, SmallRng::from_entropy())
    }

    /// Builds a handle with a caller-chosen RNG seed, for reproducible
    /// embedding initialization.
    pub fn with_seed(config: ServerConfig, stats: Arc<StoreStats>, seed: u64) -> Result<Self> {
        Self::build(config, stats, SmallRng::seed_from_u64(seed))
    }

    fn build(config: ServerConfig, stats: Arc<StoreStats>, rng: SmallRng) -> Result<Self> {
        config.validate()?;
        let w_opt = LinearOptimizer::new(&config.linear, config.embedding.nu);
        let v_opt = EmbeddingOptimizer::new(&config.embedding);
        let schedule = RegSchedule::from_config(&config.embedding);
        let perf = Perf::new(config.perf_log_every);
        Ok(Self {
            config,
            w_opt,
            v_opt,
            schedule,
            stats,
            reporter: None,
            rng,
            perf,
            push_count: false,
            finish_calls: 0,
        })
    }

    /// Installs the scheduler-facing statistics callback.
    pub fn set_reporter(&mut self, reporter: impl Fn(Progress) + Send + Sync + 'static) {
        self.reporter = Some(Box::new(reporter));
    }

    /// The shard configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Shared statistics counters.
    pub fn stats(&self) -> &Arc<StoreStats> {
        &self.stats
    }

    /// Aux buffers the bound embedding optimizer needs.
    pub fn aux_requirements(&self) -> AuxRequirements {
        self.v_opt.aux_requirements()
    }

    /// Marks the start of a message batch.
    pub fn start(&mut self, push: bool, cmd: i32) {
        self.push_count = push && cmd == PUSH_FEA_CNT;
        self.perf.start(push, cmd);
    }

    /// Applies one received payload to `entry`.
    ///
    /// Returns whether the store should keep the entry (always true here;
    /// the return mirrors the transport's keep/drop contract).
    pub fn push(
        &mut self,
        key: FeaId,
        recv: &[f32],
        entry: &mut Entry,
        _is_new: bool,
    ) -> Result<bool> {
        if recv.is_empty() {
            tracing::error!(key, "push with empty payload");
            return Err(StoreError::EmptyPayload { key });
        }

        if self.push_count {
            // First-pass counts may be truncated by a wire filter; exact
            // fidelity is not required.
            entry.add_fea_cnt(recv[0] as u32);
            self.attempt_resize(key, entry);
        } else {
            if recv.len() > entry.size() {
                tracing::error!(
                    key,
                    len = recv.len(),
                    size = entry.size(),
                    "gradient longer than entry"
                );
                return Err(StoreError::GradientTooLong {
                    key,
                    len: recv.len(),
                    size: entry.size(),
                });
            }
            entry.bump_occurrence();
            self.update_w(key, entry, recv[0])?;
            if recv.len() > 1 && entry.size() > 1 {
                self.update_v(key, entry, &recv[1..])?;
            }
        }
        Ok(true)
    }

    /// Fills `send` with the entry's pull response.
    ///
    /// Embedding-suppressed features (scalar-only, or L1-killed under
    /// `l1_shrk`) contribute a single float to keep traffic down.
    pub fn pull(&self, _key: FeaId, entry: &Entry, send: &mut Vec<f32>) {
        send.clear();
        let w0 = entry.w0();
        if entry.size() == 1 || (self.config.linear.l1_shrk && w0 == 0.0) {
            send.push(w0);
        } else {
            send.extend_from_slice(entry.weights());
        }
    }

    /// Marks the end of a message batch and drives the batched emission.
    pub fn finish(&mut self) {
        self.report();
        self.perf.stop();
    }

    fn report(&mut self) {
        // Reduce communication frequency: one emission per num_servers
        // finishes.
        self.finish_calls += 1;
        if self.finish_calls >= self.config.num_servers {
            if let Some(reporter) = &self.reporter {
                reporter(self.stats.take());
                self.finish_calls = 0;
            }
        }
    }

    fn update_w(&mut self, key: FeaId, entry: &mut Entry, g: f32) -> Result<()> {
        let mut state = entry.w_state();
        let before = state.w;
        self.w_opt
            .update(&mut state, g, entry.minibatch_occurrence());
        if !state.w.is_finite() || !state.cg.is_finite() || !state.z.is_finite() {
            tracing::error!(key, "linear update degenerated");
            return Err(StoreError::NumericalDegeneracy { key });
        }
        entry.set_w_state(&state);

        if before == 0.0 && state.w != 0.0 {
            self.stats.add_w(1);
            self.attempt_resize(key, entry);
        } else if before != 0.0 && state.w == 0.0 {
            self.stats.add_w(-1);
        }
        Ok(())
    }

    fn update_v(&mut self, key: FeaId, entry: &mut Entry, grads: &[f32]) -> Result<()> {
        let reg = self.schedule.effective(entry.minibatch_occurrence());
        let use_group = reg.l1_2 > 0.0
            && (!self.config.embedding.l1_2_only_small
                || entry.size() < self.config.embedding.max_size());
        let size = entry.size();
        let was_active = entry.active_embedding();

        let Some(mut state) = entry.v_state() else {
            return Ok(());
        };
        let decided = self.v_opt.update(&mut state, grads, &reg, use_group);
        if state.w.iter().any(|v| !v.is_finite()) {
            tracing::error!(key, "embedding update degenerated");
            return Err(StoreError::NumericalDegeneracy { key });
        }
        drop(state);

        if let Some(active) = decided {
            if active != was_active {
                let slots = (size - 1) as i64;
                self.stats.add_v(if active { slots } else { -slots });
                entry.set_active_embedding(active);
            }
        }
        Ok(())
    }

    /// Grows the embedding when the feature has earned it.
    fn attempt_resize(&mut self, key: FeaId, entry: &mut Entry) {
        let v = &self.config.embedding;
        if v.dim == 0
            || entry.fea_cnt() < v.threshold
            || entry.size() >= v.max_size()
            || (self.config.linear.l1_shrk && entry.w0() == 0.0)
            || (!self.config.linear.learn_bias_embedding && key == BIAS_KEY)
        {
            return;
        }

        let target = if v.threshold_step == 0 {
            v.max_size()
        } else {
            // Grow in increments so memory tracks the observed count.
            (entry.size() + v.threshold_step as usize)
                .min(v.max_size())
                .min(entry.fea_cnt() as usize + 1)
        };
        if target <= entry.size() {
            return;
        }

        let was_active = entry.active_embedding();
        let aux = self.v_opt.aux_requirements();
        let (lo, hi) = (v.v_min(), v.v_max());
        let rng = &mut self.rng;
        let old_size = entry.grow(target, aux, || rng.gen_range(lo..=hi));

        // A previously inactive embedding is counted whole; a live one
        // only contributes the newly added slots.
        let added = if was_active {
            (target - old_size) as i64
        } else {
            (target - 1) as i64
        };
        self.stats.add_v(added);
        entry.set_active_embedding(true);
    }
}

impl std::fmt::Debug for UpdateHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpdateHandle")
            .field("config", &self.config)
            .field("push_count", &self.push_count)
            .field("finish_calls", &self.finish_calls)
            .finish()
    }
}
