//! Byte-exact checkpointing for the FM parameter store.
//!
//! The entry layout is fixed (see [`serialization`]): a restored entry is
//! indistinguishable from its pre-serialization state in full-state mode,
//! while the default mode persists weights only and re-zeroes accumulators
//! on load as a warm-start hint. Global file framing beyond the per-store
//! count/key scheme is the transport's concern.

pub mod checkpointer;
pub mod error;
pub mod serialization;

pub use checkpointer::{load_from_path, save_to_path};
pub use error::{CheckpointError, Result};
pub use serialization::{read_entry, read_store, write_entry, write_store};
