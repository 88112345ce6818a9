//! File-level checkpoint helpers.
//!
//! The caller owns quiescence: taking `&mut SgdStore` (or `&SgdStore`
//! with no concurrent writer, which the shard model guarantees) means no
//! update is in flight while the bytes are written.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use fmps_core::Progress;
use fmps_store::SgdStore;

use crate::error::Result;
use crate::serialization::{read_store, write_store};

/// Saves a shard's model to `path`.
pub fn save_to_path(path: &Path, store: &SgdStore, full_state: bool) -> Result<()> {
    tracing::info!(?path, full_state, entries = store.len(), "saving model");
    let mut out = BufWriter::new(File::create(path)?);
    write_store(&mut out, store, full_state)?;
    out.flush()?;
    Ok(())
}

/// Replaces a shard's model from `path` and returns the statistics report
/// the caller should forward to the scheduler.
pub fn load_from_path(path: &Path, store: &mut SgdStore, full_state: bool) -> Result<Progress> {
    tracing::info!(?path, full_state, "loading model");
    let mut input = BufReader::new(File::open(path)?);
    let progress = read_store(&mut input, store, full_state)?;
    tracing::info!(
        entries = store.len(),
        new_w = progress.new_w,
        new_v = progress.new_v,
        "model loaded"
    );
    Ok(progress)
}
