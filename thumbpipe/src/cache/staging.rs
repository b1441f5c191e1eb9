//! Staging record for deferred disk cache writes.
//!
//! `store`, `remove` and `remove_all` never touch the filesystem directly.
//! They record the change in a [`StagedBatch`], which the disk I/O executor
//! later swaps out and applies in one pass. Within a batch the latest change
//! per key wins, and a `remove_all` discards every change staged before it
//! while keeping any change staged after it:
//!
//! ```text
//! store(a) store(b) remove_all() store(c)   ==>   clear_all = true, changes = {c: Add}
//! ```
//!
//! When the batch is applied the directory is cleared first and the
//! surviving per-key changes are written afterwards, so `c` ends up on disk
//! while `a` and `b` do not.

use crate::cache::{CacheKey, EncodedBytes};
use std::collections::HashMap;
use std::sync::Arc;

/// A pending change for one key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum StagedChange {
    Add(EncodedBytes),
    Remove,
}

/// What a batch knows about a key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum StagedLookup {
    /// The batch will write these bytes
    Present(EncodedBytes),
    /// The batch will delete the key, directly or through a clear
    Absent,
    /// The batch does not affect the key; ask the next layer
    Unknown,
}

/// One batch of changes that will be applied together.
#[derive(Debug, Clone, Default)]
pub(crate) struct StagedBatch {
    changes: HashMap<CacheKey, StagedChange>,
    clear_all: bool,
}

impl StagedBatch {
    pub(crate) fn stage_add(&mut self, key: CacheKey, bytes: EncodedBytes) {
        self.changes.insert(key, StagedChange::Add(bytes));
    }

    pub(crate) fn stage_remove(&mut self, key: CacheKey) {
        self.changes.insert(key, StagedChange::Remove);
    }

    pub(crate) fn stage_clear_all(&mut self) {
        self.changes.clear();
        self.clear_all = true;
    }

    pub(crate) fn lookup(&self, key: &CacheKey) -> StagedLookup {
        match self.changes.get(key) {
            Some(StagedChange::Add(bytes)) => StagedLookup::Present(Arc::clone(bytes)),
            Some(StagedChange::Remove) => StagedLookup::Absent,
            None if self.clear_all => StagedLookup::Absent,
            None => StagedLookup::Unknown,
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.changes.is_empty() && !self.clear_all
    }

    pub(crate) fn clear_all(&self) -> bool {
        self.clear_all
    }

    pub(crate) fn changes(&self) -> impl Iterator<Item = (&CacheKey, &StagedChange)> {
        self.changes.iter()
    }

    pub(crate) fn len(&self) -> usize {
        self.changes.len()
    }
}

/// All staged state guarded by the disk cache's staging lock.
#[derive(Debug, Default)]
pub(crate) struct StagingRecord {
    /// Changes not yet picked up by a flush
    pub(crate) pending: StagedBatch,
    /// Batch currently being written; readers still consult it
    pub(crate) in_flight: Option<Arc<StagedBatch>>,
    /// A flush is scheduled or running
    pub(crate) flush_scheduled: bool,
}

impl StagingRecord {
    /// Resolve a key against pending changes first, then the in-flight batch.
    pub(crate) fn lookup(&self, key: &CacheKey) -> StagedLookup {
        match self.pending.lookup(key) {
            StagedLookup::Unknown => self
                .in_flight
                .as_ref()
                .map_or(StagedLookup::Unknown, |batch| batch.lookup(key)),
            known => known,
        }
    }

    /// Swap out the pending batch and mark it in flight.
    ///
    /// Returns `None` if nothing is pending.
    pub(crate) fn begin_flush(&mut self) -> Option<Arc<StagedBatch>> {
        if self.pending.is_empty() {
            return None;
        }
        let batch = Arc::new(std::mem::take(&mut self.pending));
        self.in_flight = Some(Arc::clone(&batch));
        Some(batch)
    }

    /// Retire the in-flight batch.
    ///
    /// Returns true if more changes accumulated meanwhile and another flush
    /// should run straight away. Otherwise the schedule flag is released.
    pub(crate) fn finish_flush(&mut self) -> bool {
        self.in_flight = None;
        if self.pending.is_empty() {
            self.flush_scheduled = false;
            false
        } else {
            true
        }
    }

    /// Mark a flush as scheduled. Returns true if the caller must schedule it.
    pub(crate) fn request_flush(&mut self) -> bool {
        !std::mem::replace(&mut self.flush_scheduled, true)
    }
}
