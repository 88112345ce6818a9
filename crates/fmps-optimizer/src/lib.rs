//! Proximal optimizers for the FM parameter-server update path.
//!
//! This crate holds the numeric core of the server: the closed-form
//! proximal solvers, the per-feature regularization schedule, and the
//! update rules for the linear weight and the latent embedding. Everything
//! here operates on plain slices and small value structs; the entry layout
//! and dispatch live in `fmps-store`.
//!
//! # Overview
//!
//! - [`prox`] / [`prox_group`] — pointwise and group soft-thresholds
//!   shared by all rules.
//! - [`RegSchedule`] — derives effective `{l1, l2, l1_2}` from base values
//!   plus per-occurrence increments.
//! - [`LinearOptimizer`] — the `w[0]` rules (AdaGrad, two FTRL-Proximal
//!   flavors, FTRL over RMSProp).
//! - [`EmbeddingOptimizer`] — the thirteen embedding rules, from plain
//!   AdaGrad through the FTRL/Nadam hybrids.
//!
//! # Example
//!
//! ```
//! use fmps_core::{AlgoW, LinearConfig};
//! use fmps_optimizer::{LinearOptimizer, WState};
//!
//! let config = LinearConfig {
//!     alpha: 0.1,
//!     lambda_l1: 0.1,
//!     algo_w: AlgoW::FtrlDmlc,
//!     ..LinearConfig::default()
//! };
//! let optimizer = LinearOptimizer::new(&config, 0.999);
//!
//! let mut state = WState::zeroed();
//! optimizer.update(&mut state, 0.5, 1);
//! assert!(state.w < 0.0);
//! ```

mod embedding;
mod linear;
mod prox;
mod schedule;

pub use embedding::{AuxRequirements, EmbeddingOptimizer, VState};
pub use linear::{LinearOptimizer, WState};
pub use prox::{prox, prox_group};
pub use schedule::{RegFactors, RegSchedule};
