//! Update rules for the linear weight `w[0]`.
//!
//! All four rules share the same mutable state: the weight itself, one
//! second-moment accumulator and one FTRL dual slot. The AdaGrad-family
//! accumulator stores `sqrt(sum g^2)`; the RMSProp-backed rule stores the
//! EMA value directly and bias-corrects it through the entry's running
//! power of `nu`.

use fmps_core::{AlgoW, LinearConfig};
use serde::{Deserialize, Serialize};

use crate::prox::prox;

/// Mutable per-feature state consumed by a linear-weight update.
///
/// Mirrors slots `w[0]`, `sqc_grad[0]` and `sqc_grad[1]` of the entry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WState {
    /// The linear weight.
    pub w: f32,
    /// Second-moment accumulator.
    pub cg: f32,
    /// FTRL dual variable.
    pub z: f32,
    /// Running power of `nu` for bias correction.
    pub nu_pow: f32,
}

impl WState {
    /// Fresh state for a never-touched feature.
    pub fn zeroed() -> Self {
        Self {
            w: 0.0,
            cg: 0.0,
            z: 0.0,
            nu_pow: 1.0,
        }
    }
}

/// A linear-weight update rule, bound once per shard.
#[derive(Debug, Clone, Copy)]
pub struct LinearOptimizer {
    algo: AlgoW,
    alpha: f32,
    beta: f32,
    lambda_l1: f32,
    lambda_l2: f32,
    nu: f32,
}

impl LinearOptimizer {
    /// Binds the rule selected by `config`. `nu` is the EMA decay used by
    /// the RMSProp-backed variant (the embedding's `lr_nu` option).
    pub fn new(config: &LinearConfig, nu: f32) -> Self {
        Self {
            algo: config.algo_w,
            alpha: config.alpha,
            beta: config.beta,
            lambda_l1: config.lambda_l1,
            lambda_l2: config.lambda_l2,
            nu,
        }
    }

    /// The bound algorithm.
    #[inline]
    pub fn algo(&self) -> AlgoW {
        self.algo
    }

    /// Applies one gradient to the state in place.
    ///
    /// `occurrence` is the feature's minibatch occurrence count; only the
    /// adaptive FTRL variant scales its penalties by it.
    pub fn update(&self, state: &mut WState, g: f32, occurrence: u32) {
        match self.algo {
            AlgoW::AdagradW => self.update_adagrad(state, g),
            AlgoW::FtrlDmlc => self.update_ftrl(state, g, self.lambda_l1, self.lambda_l2),
            AlgoW::FtrlW => {
                let occ = occurrence as f32;
                self.update_ftrl(state, g, self.lambda_l1 * occ, self.lambda_l2 * occ)
            }
            AlgoW::FtrlDmlcRmsprop => self.update_ftrl_rmsprop(state, g),
        }
    }

    fn update_adagrad(&self, state: &mut WState, g: f32) {
        let w = state.w;
        state.cg = (state.cg * state.cg + g * g).sqrt();
        let eta = self.alpha / (self.beta + state.cg);
        state.w = prox(w / eta - g, eta, self.lambda_l1, self.lambda_l2);
    }

    fn update_ftrl(&self, state: &mut WState, g: f32, l1: f32, l2: f32) {
        let cg_new = (state.cg * state.cg + g * g).sqrt();
        state.z += g - (cg_new - state.cg) / self.alpha * state.w;
        state.cg = cg_new;
        state.w = prox(-state.z, self.alpha / (cg_new + self.beta), l1, l2);
    }

    fn update_ftrl_rmsprop(&self, state: &mut WState, g: f32) {
        // n_0 = 0: there is no corrected moment before the first update.
        let n_old = if state.nu_pow < 1.0 {
            (state.cg / (1.0 - state.nu_pow)).sqrt()
        } else {
            0.0
        };
        state.nu_pow *= self.nu;
        state.cg = self.nu * state.cg + (1.0 - self.nu) * g * g;
        let n_new = (state.cg / (1.0 - state.nu_pow)).sqrt();

        state.z += g - (n_new - n_old) / self.alpha * state.w;
        state.w = prox(
            -state.z,
            self.alpha / (n_new + self.beta),
            self.lambda_l1,
            self.lambda_l2,
        );
    }
}
