//! Sharded parameter store and update engine for an async FM learner.
//!
//! Workers stream sparse feature gradients at the store through three
//! message kinds: first-pass feature-count pushes, mini-batch gradient
//! pushes, and weight pulls. Each feature owns a compact [`Entry`] whose
//! representation graduates from scalar-only to scalar-plus-embedding as
//! the feature proves frequent; the [`UpdateHandle`] routes every message
//! through the bound proximal optimizer and keeps the scheduler informed
//! of model growth.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use fmps_core::{ServerConfig, PUSH_FEA_CNT};
//! use fmps_store::{SgdStore, StoreStats, UpdateHandle};
//!
//! let mut config = ServerConfig::default();
//! config.embedding.dim = 4;
//! config.embedding.threshold = 2;
//!
//! let stats = Arc::new(StoreStats::new());
//! let handle = UpdateHandle::new(config, Arc::clone(&stats)).unwrap();
//! let mut store = SgdStore::new(handle);
//!
//! // First data pass: workers push observed counts.
//! store.start(true, PUSH_FEA_CNT);
//! store.push(7, &[2.0]).unwrap();
//! store.finish();
//!
//! // The feature crossed the threshold, so it now owns an embedding.
//! assert_eq!(store.entry(7).unwrap().size(), 5);
//!
//! // Training: push a gradient, pull the weights back.
//! store.start(true, 0);
//! store.push(7, &[0.5, 0.1, -0.1, 0.0, 0.2]).unwrap();
//! store.finish();
//!
//! let mut send = Vec::new();
//! store.start(false, 0);
//! store.pull(7, &mut send);
//! store.finish();
//! assert_eq!(send.len(), 5);
//! ```

mod entry;
mod error;
mod handle;
mod perf;
mod stats;
mod store;

pub use entry::Entry;
pub use error::{Result, StoreError};
pub use handle::{Reporter, UpdateHandle};
pub use stats::StoreStats;
pub use store::SgdStore;
