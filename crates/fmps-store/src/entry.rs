//! Per-feature state stored on a server shard.
//!
//! Most features never earn an embedding, so the entry is a tagged
//! representation: a scalar-only form holding its three floats in place,
//! and an embedded form owning heap arrays. The scalar form replaces the
//! source system's pointer-aliasing trick with the same memory footprint
//! and none of the aliasing.

use fmps_optimizer::{AuxRequirements, VState, WState};

/// Per-feature parameter state.
///
/// Layout contract for the array form (`size > 1`):
/// `w[0]` is the linear weight, `w[1..]` the embedding; `sqc_grad[0]` is
/// the linear second moment, `sqc_grad[1]` the linear FTRL dual, and
/// `sqc_grad[2..]` the per-coordinate embedding accumulators. The scalar
/// form stores exactly the first three of those slots inline.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    /// Cumulative observed count, pushed by workers during the first pass.
    fea_cnt: u32,
    /// Number of gradient pushes seen.
    minibatch_occurrence: u32,
    /// True once the embedding holds live (non-group-zeroed) weights.
    active_embedding: bool,
    /// Running power of `nu` for the linear weight's bias correction.
    nu_pow_w: f32,
    /// Running power of `mu` for the embedding's bias correction.
    mu_pow_v: f32,
    /// Running power of `nu` for the embedding's bias correction.
    nu_pow_v: f32,
    state: EntryState,
}

#[derive(Debug, Clone, PartialEq)]
enum EntryState {
    Scalar {
        w: f32,
        cg: f32,
        z: f32,
    },
    Embedded {
        /// Length `size`.
        w: Box<[f32]>,
        /// Length `size + 1`.
        cg: Box<[f32]>,
        /// FTRL dual for the embedding, length `size - 1`.
        dual: Option<Box<[f32]>>,
        /// First-moment buffer, length `size - 1`.
        momentum: Option<Box<[f32]>>,
        /// Pre-momentum iterate, length `size - 1`.
        prev: Option<Box<[f32]>>,
    },
}

impl Default for Entry {
    fn default() -> Self {
        Self::new()
    }
}

impl Entry {
    /// Fresh scalar-only entry for a never-seen key.
    pub fn new() -> Self {
        Self {
            fea_cnt: 0,
            minibatch_occurrence: 0,
            active_embedding: false,
            nu_pow_w: 1.0,
            mu_pow_v: 1.0,
            nu_pow_v: 1.0,
            state: EntryState::Scalar {
                w: 0.0,
                cg: 0.0,
                z: 0.0,
            },
        }
    }

    /// Current entry size: `1` for scalar-only, `1 + embedding length`
    /// otherwise.
    #[inline]
    pub fn size(&self) -> usize {
        match &self.state {
            EntryState::Scalar { .. } => 1,
            EntryState::Embedded { w, .. } => w.len(),
        }
    }

    /// Cumulative observed feature count.
    #[inline]
    pub fn fea_cnt(&self) -> u32 {
        self.fea_cnt
    }

    /// Adds a worker-reported (possibly truncated) count.
    #[inline]
    pub fn add_fea_cnt(&mut self, count: u32) {
        self.fea_cnt = self.fea_cnt.saturating_add(count);
    }

    /// Number of gradient pushes seen so far.
    #[inline]
    pub fn minibatch_occurrence(&self) -> u32 {
        self.minibatch_occurrence
    }

    /// Records one more gradient push.
    #[inline]
    pub fn bump_occurrence(&mut self) {
        self.minibatch_occurrence = self.minibatch_occurrence.saturating_add(1);
    }

    /// The linear weight `w[0]`.
    #[inline]
    pub fn w0(&self) -> f32 {
        match &self.state {
            EntryState::Scalar { w, .. } => *w,
            EntryState::Embedded { w, .. } => w[0],
        }
    }

    /// All weights: `w[0]` alone for scalar entries, the full vector
    /// otherwise.
    #[inline]
    pub fn weights(&self) -> &[f32] {
        match &self.state {
            EntryState::Scalar { w, .. } => std::slice::from_ref(w),
            EntryState::Embedded { w, .. } => w,
        }
    }

    /// Accumulator slots in checkpoint order: `[sqc_grad[0], z]` for a
    /// scalar entry, `sqc_grad[0..size+1]` otherwise.
    pub fn accumulators(&self) -> Vec<f32> {
        match &self.state {
            EntryState::Scalar { cg, z, .. } => vec![*cg, *z],
            EntryState::Embedded { cg, .. } => cg.to_vec(),
        }
    }

    /// True when the entry carries no information worth persisting.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.size() == 1 && self.w0() == 0.0
    }

    /// True once the embedding has been initialized and not group-zeroed.
    #[inline]
    pub fn active_embedding(&self) -> bool {
        self.active_embedding
    }

    /// Flips the embedding liveness flag.
    #[inline]
    pub fn set_active_embedding(&mut self, active: bool) {
        self.active_embedding = active;
    }

    /// Snapshot of the linear-weight state for an optimizer step.
    pub fn w_state(&self) -> WState {
        match &self.state {
            EntryState::Scalar { w, cg, z } => WState {
                w: *w,
                cg: *cg,
                z: *z,
                nu_pow: self.nu_pow_w,
            },
            EntryState::Embedded { w, cg, .. } => WState {
                w: w[0],
                cg: cg[0],
                z: cg[1],
                nu_pow: self.nu_pow_w,
            },
        }
    }

    /// Writes an updated linear-weight state back.
    pub fn set_w_state(&mut self, state: &WState) {
        self.nu_pow_w = state.nu_pow;
        match &mut self.state {
            EntryState::Scalar { w, cg, z } => {
                *w = state.w;
                *cg = state.cg;
                *z = state.z;
            }
            EntryState::Embedded { w, cg, .. } => {
                w[0] = state.w;
                cg[0] = state.cg;
                cg[1] = state.z;
            }
        }
    }

    /// Mutable view of the embedding state, or `None` for scalar entries.
    pub fn v_state(&mut self) -> Option<VState<'_>> {
        let mu_pow = &mut self.mu_pow_v;
        let nu_pow = &mut self.nu_pow_v;
        match &mut self.state {
            EntryState::Scalar { .. } => None,
            EntryState::Embedded {
                w,
                cg,
                dual,
                momentum,
                prev,
            } => Some(VState {
                w: &mut w[1..],
                cg: &mut cg[2..],
                dual: dual.as_deref_mut(),
                momentum: momentum.as_deref_mut(),
                prev: prev.as_deref_mut(),
                mu_pow,
                nu_pow,
            }),
        }
    }

    /// Grows the entry to `new_size` weights, initializing fresh embedding
    /// slots from `init` and zeroing their accumulators. Existing state is
    /// carried over; sizes only ever grow, so a smaller `new_size` is a
    /// no-op. Returns the previous size.
    pub fn grow(
        &mut self,
        new_size: usize,
        aux: AuxRequirements,
        mut init: impl FnMut() -> f32,
    ) -> usize {
        let old_size = self.size();
        if new_size <= old_size {
            return old_size;
        }

        let mut w = vec![0.0f32; new_size].into_boxed_slice();
        let mut cg = vec![0.0f32; new_size + 1].into_boxed_slice();
        let mut dual = None;
        let mut momentum = None;
        let mut prev = None;

        match &self.state {
            EntryState::Scalar {
                w: w0,
                cg: cg0,
                z: z0,
            } => {
                w[0] = *w0;
                cg[0] = *cg0;
                cg[1] = *z0;
            }
            EntryState::Embedded {
                w: old_w,
                cg: old_cg,
                dual: old_dual,
                momentum: old_m,
                prev: old_p,
            } => {
                w[..old_size].copy_from_slice(old_w);
                cg[..old_size + 1].copy_from_slice(old_cg);
                dual = old_dual.as_deref().map(|b| grow_aux(b, new_size - 1));
                momentum = old_m.as_deref().map(|b| grow_aux(b, new_size - 1));
                prev = old_p.as_deref().map(|b| grow_aux(b, new_size - 1));
            }
        }

        for slot in w[old_size..].iter_mut() {
            *slot = init();
        }

        self.state = EntryState::Embedded {
            w,
            cg,
            dual,
            momentum,
            prev,
        };
        self.ensure_aux(aux);
        old_size
    }

    /// Allocates any aux buffer the bound embedding optimizer needs and
    /// this entry does not have yet. No-op for scalar entries.
    pub fn ensure_aux(&mut self, aux: AuxRequirements) {
        if let EntryState::Embedded {
            w,
            dual,
            momentum,
            prev,
            ..
        } = &mut self.state
        {
            let n = w.len() - 1;
            if aux.dual && dual.is_none() {
                *dual = Some(vec![0.0; n].into_boxed_slice());
            }
            if aux.momentum && momentum.is_none() {
                *momentum = Some(vec![0.0; n].into_boxed_slice());
            }
            if aux.prev && prev.is_none() {
                *prev = Some(vec![0.0; n].into_boxed_slice());
            }
        }
    }

    /// Rebuilds an entry from checkpointed weights and accumulators.
    ///
    /// `accumulators` is `None` when the checkpoint was written without
    /// full state; the slots are then re-zeroed (a warm start, not a true
    /// resume). Aux buffers and bias-correction powers always restart.
    pub fn from_checkpoint(weights: &[f32], accumulators: Option<&[f32]>) -> Self {
        let size = weights.len();
        let state = if size == 1 {
            let (cg, z) = match accumulators {
                Some(acc) => (acc[0], acc[1]),
                None => (0.0, 0.0),
            };
            EntryState::Scalar {
                w: weights[0],
                cg,
                z,
            }
        } else {
            let cg = match accumulators {
                Some(acc) => acc.to_vec().into_boxed_slice(),
                None => vec![0.0; size + 1].into_boxed_slice(),
            };
            EntryState::Embedded {
                w: weights.to_vec().into_boxed_slice(),
                cg,
                dual: None,
                momentum: None,
                prev: None,
            }
        };
        Self {
            fea_cnt: 0,
            minibatch_occurrence: 0,
            active_embedding: size > 1,
            nu_pow_w: 1.0,
            mu_pow_v: 1.0,
            nu_pow_v: 1.0,
            state,
        }
    }
}

fn grow_aux(old: &[f32], new_len: usize) -> Box<[f32]> {
    let mut buf = vec![0.0f32; new_len];
    buf[..old.len()].copy_from_slice(old);
    buf.into_boxed_slice()
}
