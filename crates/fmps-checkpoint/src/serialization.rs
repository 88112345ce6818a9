//! Byte-exact entry codec and store-level framing.
//!
//! Per-entry layout, all little-endian:
//!
//! ```text
//! size: i32
//! w[0..size]: f32          (one float for scalar entries)
//! sqc_grad: f32 * k        (only in full-state mode; k = 2 for scalar
//!                           entries, size + 1 otherwise)
//! ```
//!
//! Store framing: entry count as `u64`, then `key: u64` followed by the
//! entry payload, keys ascending so a save is deterministic. Entries with
//! nothing to say (scalar, zero weight) are skipped.
//!
//! Without full state the accumulators are re-zeroed on load: a warm
//! start, not a true resume. With it, a restored entry is byte-identical
//! to its pre-serialization state.

use std::io::{Read, Write};

use fmps_core::Progress;
use fmps_store::{Entry, SgdStore};

use crate::error::{CheckpointError, Result};

/// Writes one entry in the checkpoint layout.
pub fn write_entry(out: &mut impl Write, entry: &Entry, full_state: bool) -> Result<()> {
    let size = entry.size() as i32;
    out.write_all(&size.to_le_bytes())?;
    for &w in entry.weights() {
        out.write_all(&w.to_le_bytes())?;
    }
    if full_state {
        for &slot in &entry.accumulators() {
            out.write_all(&slot.to_le_bytes())?;
        }
    }
    Ok(())
}

/// Reads one entry written by [`write_entry`].
///
/// `max_size` bounds the plausible entry size (`dim + 1` for the shard's
/// configuration); anything outside `1..=max_size` is a corrupt or
/// mismatched checkpoint.
pub fn read_entry(input: &mut impl Read, full_state: bool, max_size: usize) -> Result<Entry> {
    let size = read_i32(input)?;
    if size < 1 || size as usize > max_size {
        return Err(CheckpointError::ImplausibleSize {
            size: size as i64,
            max_size,
        });
    }
    let size = size as usize;

    let mut weights = vec![0.0f32; size];
    for slot in weights.iter_mut() {
        *slot = read_f32(input)?;
    }

    let accumulators = if full_state {
        let len = if size == 1 { 2 } else { size + 1 };
        let mut acc = vec![0.0f32; len];
        for slot in acc.iter_mut() {
            *slot = read_f32(input)?;
        }
        Some(acc)
    } else {
        None
    };

    Ok(Entry::from_checkpoint(&weights, accumulators.as_deref()))
}

/// Serializes a quiesced store: count, then key-ordered entries.
pub fn write_store(out: &mut impl Write, store: &SgdStore, full_state: bool) -> Result<()> {
    let mut live: Vec<(u64, &Entry)> = store
        .iter()
        .filter(|(_, entry)| !entry.is_empty())
        .map(|(&key, entry)| (key, entry))
        .collect();
    live.sort_unstable_by_key(|(key, _)| *key);

    out.write_all(&(live.len() as u64).to_le_bytes())?;
    for (key, entry) in live {
        out.write_all(&key.to_le_bytes())?;
        write_entry(out, entry, full_state)?;
    }
    Ok(())
}

/// Replaces the store's contents from a checkpoint stream.
///
/// Rebuilds the `new_w`/`new_V` statistics the restored model represents,
/// adds them to the shared counters, and returns them so the caller can
/// make the post-load report to the scheduler.
pub fn read_store(input: &mut impl Read, store: &mut SgdStore, full_state: bool) -> Result<Progress> {
    store.clear();
    let max_size = store.handle().config().embedding.max_size();

    let count = read_u64(input)?;
    let mut progress = Progress::default();
    for _ in 0..count {
        let key = read_u64(input)?;
        let entry = read_entry(input, full_state, max_size)?;
        if entry.size() > 1 {
            progress.new_v += (entry.size() - 1) as i64;
        }
        if entry.w0() != 0.0 {
            progress.new_w += 1;
        }
        store.insert_entry(key, entry);
    }

    let stats = store.handle().stats();
    stats.add_w(progress.new_w);
    stats.add_v(progress.new_v);
    Ok(progress)
}

fn read_i32(input: &mut impl Read) -> Result<i32> {
    let mut buf = [0u8; 4];
    input.read_exact(&mut buf)?;
    Ok(i32::from_le_bytes(buf))
}

fn read_f32(input: &mut impl Read) -> Result<f32> {
    let mut buf = [0u8; 4];
    input.read_exact(&mut buf)?;
    Ok(f32::from_le_bytes(buf))
}

fn read_u64(input: &mut impl Read) -> Result<u64> {
    let mut buf = [0u8; 8];
    input.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}
