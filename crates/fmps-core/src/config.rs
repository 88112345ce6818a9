//! Server configuration for the linear weight and the latent embedding.
//!
//! The shapes here mirror the options a scheduler hands to every server
//! shard at startup. Validation happens once, before the first message:
//! after that the update path trusts the values.

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

/// Update rule for the linear weight `w[0]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlgoW {
    /// Proximal AdaGrad on the raw weight.
    AdagradW,
    /// FTRL-Proximal with `l1`/`l2` scaled by the feature's
    /// minibatch occurrence count.
    FtrlW,
    /// Canonical FTRL-Proximal; regularizers are used as configured.
    FtrlDmlc,
    /// FTRL-Proximal over an RMSProp (bias-corrected EMA) second moment.
    FtrlDmlcRmsprop,
}

impl Default for AlgoW {
    fn default() -> Self {
        AlgoW::FtrlW
    }
}

/// Update rule for the embedding coordinates `w[1..]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlgoV {
    /// AdaGrad with the L2 penalty linearized into the gradient; no prox.
    AdagradVLinearized,
    /// Proximal AdaGrad.
    AdagradV,
    /// FTRL-Proximal over an AdaGrad second moment.
    Ftrl,
    /// Proximal RMSProp (bias-corrected EMA second moment).
    Rmsprop,
    /// Adam: EMA moments, bias-corrected, prox on the first-moment step.
    Adam,
    /// Nesterov-accelerated gradient over an AdaGrad second moment.
    Nag,
    /// NAG with a stored pre-momentum iterate and a second prox pass.
    NagProxMomentum,
    /// Heavy-ball momentum over an AdaGrad second moment.
    Momentum,
    /// FTRL-Proximal over an RMSProp second moment.
    FtrlRmsprop,
    /// Adam with a Nesterov look-ahead first moment.
    Nadam,
    /// Nadam with a stored pre-momentum iterate and a second prox pass.
    NadamProxMomentum,
    /// FTRL dual driven by the bias-corrected Adam first moment.
    FtrlAdam,
    /// FTRL dual driven by the Nesterov look-ahead first moment.
    FtrlNadam,
}

impl Default for AlgoV {
    fn default() -> Self {
        AlgoV::AdagradV
    }
}

/// Options for the linear weight `w[0]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearConfig {
    /// Learning-rate numerator `alpha` in `eta = alpha / (beta + cg)`.
    pub alpha: f32,
    /// Learning-rate offset `beta`.
    pub beta: f32,
    /// L1 penalty on `w[0]`.
    pub lambda_l1: f32,
    /// L2 penalty on `w[0]`.
    pub lambda_l2: f32,
    /// When true, a feature whose `w[0]` has been shrunk to zero is denied
    /// embedding memory and pulls return only the scalar weight.
    pub l1_shrk: bool,
    /// Allow the reserved bias key to grow an embedding.
    pub learn_bias_embedding: bool,
    /// Which update rule drives `w[0]`.
    pub algo_w: AlgoW,
}

impl Default for LinearConfig {
    fn default() -> Self {
        Self {
            alpha: 0.01,
            beta: 1.0,
            lambda_l1: 0.0,
            lambda_l2: 0.0,
            l1_shrk: false,
            learn_bias_embedding: false,
            algo_w: AlgoW::default(),
        }
    }
}

impl LinearConfig {
    /// Validates the linear-weight options.
    pub fn validate(&self) -> Result<()> {
        check_positive("lr_eta", self.alpha)?;
        check_positive("lr_beta", self.beta)?;
        check_non_negative("lambda_l1", self.lambda_l1)?;
        check_non_negative("lambda_l2", self.lambda_l2)?;
        Ok(())
    }
}

/// Options for the latent embedding `w[1..]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Embedding dimension. Zero disables embedding learning entirely.
    pub dim: usize,
    /// Observed-count threshold a feature must reach before its embedding
    /// is allocated.
    pub threshold: u32,
    /// Growth increment per resize. Zero allocates the full dimension at
    /// once.
    pub threshold_step: u32,
    /// Base L1 penalty on embedding coordinates.
    pub lambda_l1: f32,
    /// Base L2 penalty on embedding coordinates.
    pub lambda_l2: f32,
    /// Base group (L1/2) penalty across the whole embedding.
    pub lambda_l1_2: f32,
    /// Per-occurrence increment added to `lambda_l1`.
    pub lambda_l1_incremental: f32,
    /// Per-occurrence increment added to `lambda_l2`.
    pub lambda_l2_incremental: f32,
    /// Per-occurrence increment added to `lambda_l1_2`.
    pub lambda_l1_2_incremental: f32,
    /// Fresh slots are drawn uniformly from `[-init_scale, init_scale]`.
    pub init_scale: f32,
    /// Learning-rate numerator for the embedding.
    pub alpha: f32,
    /// Learning-rate offset for the embedding.
    pub beta: f32,
    /// EMA decay `nu` for RMSProp-family second moments.
    pub nu: f32,
    /// Momentum decay `mu` for first moments.
    pub mu: f32,
    /// Restrict the group prox to embeddings still below full dimension.
    pub l1_2_only_small: bool,
    /// Which update rule drives the embedding.
    pub algo_v: AlgoV,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            dim: 0,
            threshold: 0,
            threshold_step: 0,
            lambda_l1: 0.0,
            lambda_l2: 0.0,
            lambda_l1_2: 0.0,
            lambda_l1_incremental: 0.0,
            lambda_l2_incremental: 0.0,
            lambda_l1_2_incremental: 0.0,
            init_scale: 0.01,
            alpha: 0.01,
            beta: 1.0,
            nu: 0.999,
            mu: 0.9,
            l1_2_only_small: false,
            algo_v: AlgoV::default(),
        }
    }
}

impl EmbeddingConfig {
    /// Lower bound for fresh embedding slots.
    #[inline]
    pub fn v_min(&self) -> f32 {
        -self.init_scale
    }

    /// Upper bound for fresh embedding slots.
    #[inline]
    pub fn v_max(&self) -> f32 {
        self.init_scale
    }

    /// Largest entry size: the linear weight plus the full embedding.
    #[inline]
    pub fn max_size(&self) -> usize {
        self.dim + 1
    }

    /// Validates the embedding options.
    pub fn validate(&self) -> Result<()> {
        check_positive("embedding.lr_eta", self.alpha)?;
        check_positive("embedding.lr_beta", self.beta)?;
        check_non_negative("embedding.lambda_l1", self.lambda_l1)?;
        check_non_negative("embedding.lambda_l2", self.lambda_l2)?;
        check_non_negative("embedding.lambda_l1_2", self.lambda_l1_2)?;
        check_non_negative("embedding.lambda_l1_incremental", self.lambda_l1_incremental)?;
        check_non_negative("embedding.lambda_l2_incremental", self.lambda_l2_incremental)?;
        check_non_negative(
            "embedding.lambda_l1_2_incremental",
            self.lambda_l1_2_incremental,
        )?;
        check_non_negative("embedding.init_scale", self.init_scale)?;
        check_decay("embedding.lr_nu", self.nu)?;
        check_decay("embedding.momentum_mu", self.mu)?;
        Ok(())
    }
}

/// Complete per-shard configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Linear-weight options.
    pub linear: LinearConfig,
    /// Embedding options.
    pub embedding: EmbeddingConfig,
    /// Number of server shards in the job; statistics are emitted once per
    /// this many `finish()` calls to damp scheduler traffic.
    pub num_servers: usize,
    /// Emit a perf summary line every this many handled operations.
    pub perf_log_every: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            linear: LinearConfig::default(),
            embedding: EmbeddingConfig::default(),
            num_servers: 1,
            perf_log_every: 1000,
        }
    }
}

impl ServerConfig {
    /// Validates all options.
    pub fn validate(&self) -> Result<()> {
        self.linear.validate()?;
        self.embedding.validate()?;
        if self.num_servers == 0 {
            return Err(ConfigError::Invalid {
                message: "num_servers must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

fn check_positive(name: &'static str, value: f32) -> Result<()> {
    if value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::NonPositiveLearningRate { name, value })
    }
}

fn check_non_negative(name: &'static str, value: f32) -> Result<()> {
    if value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::NegativeRegularizer { name, value })
    }
}

fn check_decay(name: &'static str, value: f32) -> Result<()> {
    if (0.0..1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::DecayOutOfRange { name, value })
    }
}
