//! Update rules for the embedding coordinates `w[1..]`.
//!
//! Every rule runs the same per-coordinate skeleton and differs in how the
//! second moment is kept (AdaGrad root-of-sum vs bias-corrected EMA),
//! whether a first moment is kept, where the prox lands, and whether a
//! reverse prox pass follows a momentum extrapolation.
//!
//! Bias-correction divisors come from the entry's own running powers of
//! `mu` and `nu`, never from a global step counter: a feature touched on
//! irregular steps must see `mu^t` with `t` equal to its own update count.

use fmps_core::{AlgoV, EmbeddingConfig};
use serde::{Deserialize, Serialize};

use crate::prox::{prox, prox_group};
use crate::schedule::RegFactors;

/// Which auxiliary per-coordinate buffers an algorithm needs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuxRequirements {
    /// FTRL dual vector.
    pub dual: bool,
    /// First-moment (momentum/velocity) vector.
    pub momentum: bool,
    /// Stored pre-momentum iterate for reverse-prox variants.
    pub prev: bool,
}

/// Mutable view of one entry's embedding state during an update.
///
/// `w` and `cg` cover the embedding coordinates only (the linear weight
/// and its accumulators are handled by [`crate::LinearOptimizer`]). The
/// aux buffers are present exactly when the bound algorithm requires them.
pub struct VState<'a> {
    /// Embedding coordinates.
    pub w: &'a mut [f32],
    /// Per-coordinate second-moment accumulators.
    pub cg: &'a mut [f32],
    /// FTRL dual vector.
    pub dual: Option<&'a mut [f32]>,
    /// First-moment vector.
    pub momentum: Option<&'a mut [f32]>,
    /// Stored pre-momentum iterate.
    pub prev: Option<&'a mut [f32]>,
    /// Running power of `mu`, multiplied here when the rule uses it.
    pub mu_pow: &'a mut f32,
    /// Running power of `nu`, multiplied here when the rule uses it.
    pub nu_pow: &'a mut f32,
}

/// An embedding update rule, bound once per shard.
#[derive(Debug, Clone, Copy)]
pub struct EmbeddingOptimizer {
    algo: AlgoV,
    alpha: f32,
    beta: f32,
    nu: f32,
    mu: f32,
}

impl EmbeddingOptimizer {
    /// Binds the rule selected by `config`.
    pub fn new(config: &EmbeddingConfig) -> Self {
        Self {
            algo: config.algo_v,
            alpha: config.alpha,
            beta: config.beta,
            nu: config.nu,
            mu: config.mu,
        }
    }

    /// The bound algorithm.
    #[inline]
    pub fn algo(&self) -> AlgoV {
        self.algo
    }

    /// Aux buffers the bound algorithm needs on every embedding entry.
    pub fn aux_requirements(&self) -> AuxRequirements {
        match self.algo {
            AlgoV::AdagradVLinearized | AlgoV::AdagradV | AlgoV::Rmsprop => {
                AuxRequirements::default()
            }
            AlgoV::Ftrl | AlgoV::FtrlRmsprop => AuxRequirements {
                dual: true,
                ..AuxRequirements::default()
            },
            AlgoV::Adam | AlgoV::Nag | AlgoV::Momentum | AlgoV::Nadam => AuxRequirements {
                momentum: true,
                ..AuxRequirements::default()
            },
            AlgoV::NagProxMomentum | AlgoV::NadamProxMomentum => AuxRequirements {
                momentum: true,
                prev: true,
                ..AuxRequirements::default()
            },
            AlgoV::FtrlAdam | AlgoV::FtrlNadam => AuxRequirements {
                dual: true,
                momentum: true,
                ..AuxRequirements::default()
            },
        }
    }

    /// Applies one gradient slice to the embedding state in place.
    ///
    /// `grads` may cover a prefix of the coordinates (a short push); only
    /// those coordinates accumulate, but a group prox always spans the
    /// whole dual vector. `use_group` selects the group prox for the FTRL
    /// family; rules without a dual ignore it.
    ///
    /// Returns `Some(active)` when a group prox decided embedding
    /// liveness, `None` otherwise.
    ///
    /// # Panics
    ///
    /// Panics if `grads` is longer than the embedding or if an aux buffer
    /// required by the bound algorithm is missing; both are programmer
    /// errors on the caller's side.
    pub fn update(
        &self,
        state: &mut VState<'_>,
        grads: &[f32],
        reg: &RegFactors,
        use_group: bool,
    ) -> Option<bool> {
        assert!(grads.len() <= state.w.len());
        match self.algo {
            AlgoV::AdagradVLinearized => {
                self.adagrad_linearized(state, grads, reg);
                None
            }
            AlgoV::AdagradV => {
                self.adagrad_proximal(state, grads, reg);
                None
            }
            AlgoV::Ftrl => self.ftrl_adagrad(state, grads, reg, use_group),
            AlgoV::Rmsprop => {
                self.rmsprop(state, grads, reg);
                None
            }
            AlgoV::Adam => {
                self.adam(state, grads, reg);
                None
            }
            AlgoV::Nag => {
                self.nag(state, grads, reg);
                None
            }
            AlgoV::NagProxMomentum => {
                self.nag_prox_momentum(state, grads, reg);
                None
            }
            AlgoV::Momentum => {
                self.momentum(state, grads, reg);
                None
            }
            AlgoV::FtrlRmsprop => self.ftrl_rmsprop(state, grads, reg, use_group),
            AlgoV::Nadam => {
                self.nadam(state, grads, reg);
                None
            }
            AlgoV::NadamProxMomentum => {
                self.nadam_prox_momentum(state, grads, reg);
                None
            }
            AlgoV::FtrlAdam => self.ftrl_ema(state, grads, reg, use_group, false),
            AlgoV::FtrlNadam => self.ftrl_ema(state, grads, reg, use_group, true),
        }
    }

    /// AdaGrad accumulation: `cg <- sqrt(cg^2 + g^2)`, `eta = a/(cg + b)`.
    #[inline]
    fn adagrad_eta(&self, cg: &mut f32, g: f32) -> f32 {
        *cg = (*cg * *cg + g * g).sqrt();
        self.alpha / (*cg + self.beta)
    }

    /// EMA accumulation with bias correction; `nu_pow` must already hold
    /// `nu^t` for the current step `t`.
    #[inline]
    fn ema_eta(&self, cg: &mut f32, g: f32, nu_pow: f32) -> f32 {
        *cg = self.nu * *cg + (1.0 - self.nu) * g * g;
        let n_hat = (*cg / (1.0 - nu_pow)).sqrt();
        self.alpha / (n_hat + self.beta)
    }

    fn adagrad_linearized(&self, state: &mut VState<'_>, grads: &[f32], reg: &RegFactors) {
        for (i, &g) in grads.iter().enumerate() {
            let grad = g + reg.l2 * state.w[i];
            let eta = self.adagrad_eta(&mut state.cg[i], grad);
            state.w[i] -= eta * grad;
        }
    }

    fn adagrad_proximal(&self, state: &mut VState<'_>, grads: &[f32], reg: &RegFactors) {
        for (i, &g) in grads.iter().enumerate() {
            let eta = self.adagrad_eta(&mut state.cg[i], g);
            state.w[i] = prox(state.w[i] / eta - g, eta, reg.l1, reg.l2);
        }
    }

    fn ftrl_adagrad(
        &self,
        state: &mut VState<'_>,
        grads: &[f32],
        reg: &RegFactors,
        use_group: bool,
    ) -> Option<bool> {
        let dual = state.dual.as_deref_mut().expect("ftrl dual buffer");
        for (i, &g) in grads.iter().enumerate() {
            let cg_old = state.cg[i];
            let cg_new = (cg_old * cg_old + g * g).sqrt();
            dual[i] += g - (cg_new - cg_old) / self.alpha * state.w[i];
            state.cg[i] = cg_new;
        }
        if use_group {
            let etas: Vec<f32> = state
                .cg
                .iter()
                .map(|&cg| self.alpha / (cg + self.beta))
                .collect();
            Some(prox_group(dual, &etas, reg.l1, reg.l2, reg.l1_2, state.w))
        } else {
            for i in 0..grads.len() {
                let eta = self.alpha / (state.cg[i] + self.beta);
                state.w[i] = prox(-dual[i], eta, reg.l1, reg.l2);
            }
            None
        }
    }

    fn rmsprop(&self, state: &mut VState<'_>, grads: &[f32], reg: &RegFactors) {
        *state.nu_pow *= self.nu;
        let nu_pow = *state.nu_pow;
        for (i, &g) in grads.iter().enumerate() {
            let eta = self.ema_eta(&mut state.cg[i], g, nu_pow);
            state.w[i] = prox(state.w[i] / eta - g, eta, reg.l1, reg.l2);
        }
    }

    fn adam(&self, state: &mut VState<'_>, grads: &[f32], reg: &RegFactors) {
        let m = state.momentum.as_deref_mut().expect("adam momentum buffer");
        *state.mu_pow *= self.mu;
        *state.nu_pow *= self.nu;
        let (mu_pow, nu_pow) = (*state.mu_pow, *state.nu_pow);
        for (i, &g) in grads.iter().enumerate() {
            m[i] = self.mu * m[i] + (1.0 - self.mu) * g;
            let m_hat = m[i] / (1.0 - mu_pow);
            let eta = self.ema_eta(&mut state.cg[i], g, nu_pow);
            state.w[i] = prox(state.w[i] / eta - m_hat, eta, reg.l1, reg.l2);
        }
    }

    fn nag(&self, state: &mut VState<'_>, grads: &[f32], reg: &RegFactors) {
        let m = state.momentum.as_deref_mut().expect("nag momentum buffer");
        for (i, &g) in grads.iter().enumerate() {
            let eta = self.adagrad_eta(&mut state.cg[i], g);
            m[i] = self.mu * m[i] + g;
            // Look-ahead: descend along the gradient plus the advanced
            // velocity, then prox.
            let g_nag = g + self.mu * m[i];
            state.w[i] = prox(state.w[i] / eta - g_nag, eta, reg.l1, reg.l2);
        }
    }

    fn nag_prox_momentum(&self, state: &mut VState<'_>, grads: &[f32], reg: &RegFactors) {
        let m = state.momentum.as_deref_mut().expect("nag momentum buffer");
        let prev = state.prev.as_deref_mut().expect("nag prev buffer");
        for (i, &g) in grads.iter().enumerate() {
            let eta = self.adagrad_eta(&mut state.cg[i], g);
            m[i] = self.mu * m[i] + g;
            // Prox once for the momentum descent step...
            let w_plain = prox(state.w[i] / eta - m[i], eta, reg.l1, reg.l2);
            // ...extrapolate against the stored pre-momentum iterate...
            let w_extra = w_plain + self.mu * (w_plain - prev[i]);
            prev[i] = w_plain;
            // ...and prox again so the extrapolated point honors the
            // penalty (the reverse proximal step).
            state.w[i] = prox(w_extra / eta, eta, reg.l1, reg.l2);
        }
    }

    fn momentum(&self, state: &mut VState<'_>, grads: &[f32], reg: &RegFactors) {
        let m = state
            .momentum
            .as_deref_mut()
            .expect("momentum velocity buffer");
        *state.mu_pow *= self.mu;
        let mu_pow = *state.mu_pow;
        for (i, &g) in grads.iter().enumerate() {
            let eta = self.adagrad_eta(&mut state.cg[i], g);
            m[i] = self.mu * m[i] + g;
            // Non-dampened accumulation: correcting by (1-mu)/(1-mu^t)
            // keeps the step on the gradient's scale from the first touch.
            let m_hat = m[i] * (1.0 - self.mu) / (1.0 - mu_pow);
            state.w[i] = prox(state.w[i] / eta - m_hat, eta, reg.l1, reg.l2);
        }
    }

    fn ftrl_rmsprop(
        &self,
        state: &mut VState<'_>,
        grads: &[f32],
        reg: &RegFactors,
        use_group: bool,
    ) -> Option<bool> {
        let dual = state.dual.as_deref_mut().expect("ftrl dual buffer");
        let nu_pow_old = *state.nu_pow;
        *state.nu_pow *= self.nu;
        let nu_pow_new = *state.nu_pow;
        for (i, &g) in grads.iter().enumerate() {
            let n_old = corrected_root(state.cg[i], nu_pow_old);
            state.cg[i] = self.nu * state.cg[i] + (1.0 - self.nu) * g * g;
            let n_new = corrected_root(state.cg[i], nu_pow_new);
            dual[i] += g - (n_new - n_old) / self.alpha * state.w[i];
        }
        self.ftrl_solve_ema(state, grads.len(), reg, use_group, nu_pow_new)
    }

    /// Shared FTRL-over-EMA drive for the Adam and Nadam first moments.
    fn ftrl_ema(
        &self,
        state: &mut VState<'_>,
        grads: &[f32],
        reg: &RegFactors,
        use_group: bool,
        nesterov: bool,
    ) -> Option<bool> {
        let dual = state.dual.as_deref_mut().expect("ftrl dual buffer");
        let m = state.momentum.as_deref_mut().expect("adam momentum buffer");
        *state.mu_pow *= self.mu;
        let mu_pow = *state.mu_pow;
        let nu_pow_old = *state.nu_pow;
        *state.nu_pow *= self.nu;
        let nu_pow_new = *state.nu_pow;
        for (i, &g) in grads.iter().enumerate() {
            m[i] = self.mu * m[i] + (1.0 - self.mu) * g;
            let drive = if nesterov {
                // Nesterov look-ahead: pre-subtract the current corrected
                // moment, post-add the advanced one.
                let m_ahead = m[i] / (1.0 - mu_pow * self.mu);
                let g_hat = g / (1.0 - mu_pow);
                self.mu * m_ahead + (1.0 - self.mu) * g_hat
            } else {
                m[i] / (1.0 - mu_pow)
            };
            let n_old = corrected_root(state.cg[i], nu_pow_old);
            state.cg[i] = self.nu * state.cg[i] + (1.0 - self.nu) * g * g;
            let n_new = corrected_root(state.cg[i], nu_pow_new);
            dual[i] += drive - (n_new - n_old) / self.alpha * state.w[i];
        }
        self.ftrl_solve_ema(state, grads.len(), reg, use_group, nu_pow_new)
    }

    /// Closes an FTRL-over-EMA update: pointwise prox on the touched
    /// coordinates, or a group prox across the whole dual vector.
    fn ftrl_solve_ema(
        &self,
        state: &mut VState<'_>,
        touched: usize,
        reg: &RegFactors,
        use_group: bool,
        nu_pow: f32,
    ) -> Option<bool> {
        let dual = state.dual.as_deref_mut().expect("ftrl dual buffer");
        if use_group {
            let etas: Vec<f32> = state
                .cg
                .iter()
                .map(|&cg| self.alpha / (corrected_root(cg, nu_pow) + self.beta))
                .collect();
            Some(prox_group(dual, &etas, reg.l1, reg.l2, reg.l1_2, state.w))
        } else {
            for i in 0..touched {
                let eta = self.alpha / (corrected_root(state.cg[i], nu_pow) + self.beta);
                state.w[i] = prox(-dual[i], eta, reg.l1, reg.l2);
            }
            None
        }
    }

    fn nadam(&self, state: &mut VState<'_>, grads: &[f32], reg: &RegFactors) {
        let m = state
            .momentum
            .as_deref_mut()
            .expect("nadam momentum buffer");
        *state.mu_pow *= self.mu;
        *state.nu_pow *= self.nu;
        let (mu_pow, nu_pow) = (*state.mu_pow, *state.nu_pow);
        for (i, &g) in grads.iter().enumerate() {
            m[i] = self.mu * m[i] + (1.0 - self.mu) * g;
            let m_bar = self.nesterov_drive(m[i], g, mu_pow);
            let eta = self.ema_eta(&mut state.cg[i], g, nu_pow);
            state.w[i] = prox(state.w[i] / eta - m_bar, eta, reg.l1, reg.l2);
        }
    }

    fn nadam_prox_momentum(&self, state: &mut VState<'_>, grads: &[f32], reg: &RegFactors) {
        let m = state
            .momentum
            .as_deref_mut()
            .expect("nadam momentum buffer");
        let prev = state.prev.as_deref_mut().expect("nadam prev buffer");
        *state.mu_pow *= self.mu;
        *state.nu_pow *= self.nu;
        let (mu_pow, nu_pow) = (*state.mu_pow, *state.nu_pow);
        for (i, &g) in grads.iter().enumerate() {
            m[i] = self.mu * m[i] + (1.0 - self.mu) * g;
            let m_bar = self.nesterov_drive(m[i], g, mu_pow);
            let eta = self.ema_eta(&mut state.cg[i], g, nu_pow);
            let w_plain = prox(state.w[i] / eta - m_bar, eta, reg.l1, reg.l2);
            let w_extra = w_plain + self.mu * (w_plain - prev[i]);
            prev[i] = w_plain;
            state.w[i] = prox(w_extra / eta, eta, reg.l1, reg.l2);
        }
    }

    /// Nesterov look-ahead first moment: blends the one-step-ahead
    /// corrected moment with the correction of the raw gradient.
    #[inline]
    fn nesterov_drive(&self, m: f32, g: f32, mu_pow: f32) -> f32 {
        let m_ahead = m / (1.0 - mu_pow * self.mu);
        let g_hat = g / (1.0 - mu_pow);
        self.mu * m_ahead + (1.0 - self.mu) * g_hat
    }
}

/// Bias-corrected root of an EMA accumulator; zero before the first step.
#[inline]
fn corrected_root(cg: f32, nu_pow: f32) -> f32 {
    if nu_pow < 1.0 {
        (cg / (1.0 - nu_pow)).sqrt()
    } else {
        0.0
    }
}
