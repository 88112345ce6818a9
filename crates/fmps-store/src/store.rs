//! The sharded key-value store one server owns.

use std::collections::HashMap;

use fmps_core::FeaId;

use crate::entry::Entry;
use crate::error::Result;
use crate::handle::UpdateHandle;

/// One shard's worth of per-feature entries plus its update handle.
///
/// The transport invokes `start`/`push`/`pull`/`finish` serially; the
/// `&mut self` receivers encode the single-writer discipline, and a
/// quiesced shard is exactly one the caller holds `&mut` on.
#[derive(Debug)]
pub struct SgdStore {
    handle: UpdateHandle,
    entries: HashMap<FeaId, Entry>,
}

impl SgdStore {
    /// Creates an empty store around a bound handle.
    pub fn new(handle: UpdateHandle) -> Self {
        Self {
            handle,
            entries: HashMap::new(),
        }
    }

    /// The shard's update handle.
    pub fn handle(&self) -> &UpdateHandle {
        &self.handle
    }

    /// Mutable access to the handle (reporter installation).
    pub fn handle_mut(&mut self) -> &mut UpdateHandle {
        &mut self.handle
    }

    /// Marks the start of a message batch.
    pub fn start(&mut self, push: bool, cmd: i32) {
        self.handle.start(push, cmd);
    }

    /// Applies one pushed payload, creating the entry on first sight.
    pub fn push(&mut self, key: FeaId, recv: &[f32]) -> Result<()> {
        let is_new = !self.entries.contains_key(&key);
        let entry = self.entries.entry(key).or_default();
        let keep = self.handle.push(key, recv, entry, is_new)?;
        if !keep {
            self.entries.remove(&key);
        }
        Ok(())
    }

    /// Answers one pull, creating the entry on first sight.
    pub fn pull(&mut self, key: FeaId, send: &mut Vec<f32>) {
        let entry = self.entries.entry(key).or_default();
        self.handle.pull(key, entry, send);
    }

    /// Marks the end of a message batch.
    pub fn finish(&mut self) {
        self.handle.finish();
    }

    /// Number of entries currently stored.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no entry exists yet.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Looks up an entry without creating it.
    pub fn entry(&self, key: FeaId) -> Option<&Entry> {
        self.entries.get(&key)
    }

    /// Mutable entry lookup without creation.
    pub fn entry_mut(&mut self, key: FeaId) -> Option<&mut Entry> {
        self.entries.get_mut(&key)
    }

    /// Iterates all entries in unspecified order.
    pub fn iter(&self) -> impl Iterator<Item = (&FeaId, &Entry)> + '_ {
        self.entries.iter()
    }

    /// Inserts a reconstructed entry, backfilling any aux buffer the bound
    /// embedding optimizer needs.
    pub fn insert_entry(&mut self, key: FeaId, mut entry: Entry) {
        entry.ensure_aux(self.handle.aux_requirements());
        self.entries.insert(key, entry);
    }

    /// Drops every entry (checkpoint replacement or teardown).
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
