//! In-memory snapshot storage.

use std::collections::BTreeMap;

use super::CheckpointStorage;
use crate::error::{CheckpointError, CheckpointResult};
use crate::schedule::StorageTier;
use crate::snapshot::Snapshot;

/// Snapshots held in a map, optionally limited to `capacity` entries.
///
/// # Example
///
/// ```
/// use adjoint_checkpoint::{CheckpointStorage, MemoryStorage, Snapshot};
///
/// let mut storage = MemoryStorage::with_capacity(1);
/// storage.store(Snapshot::new(4)).unwrap();
/// assert!(storage.store(Snapshot::new(8)).is_err());
/// assert_eq!(storage.load(4).unwrap().block(), 4);
/// ```
#[derive(Clone, Debug, Default)]
pub struct MemoryStorage {
    snapshots: BTreeMap<usize, Snapshot>,
    capacity: Option<usize>,
}

impl MemoryStorage {
    /// Creates unbounded storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates storage holding at most `capacity` snapshots.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            snapshots: BTreeMap::new(),
            capacity: Some(capacity),
        }
    }

    /// Total approximate size of the held snapshots in bytes.
    pub fn memory_usage(&self) -> usize {
        self.snapshots.values().map(Snapshot::memory_size).sum()
    }

    /// Nearest snapshot at or before `block`.
    pub fn nearest_before(&self, block: usize) -> Option<usize> {
        self.snapshots.range(..=block).next_back().map(|(&b, _)| b)
    }
}

impl CheckpointStorage for MemoryStorage {
    fn store(&mut self, snapshot: Snapshot) -> CheckpointResult<()> {
        let block = snapshot.block();
        if let Some(capacity) = self.capacity {
            if !self.snapshots.contains_key(&block) && self.snapshots.len() >= capacity {
                return Err(CheckpointError::StorageFull {
                    tier: StorageTier::Fast,
                    capacity,
                });
            }
        }
        self.snapshots.insert(block, snapshot);
        Ok(())
    }

    fn load(&self, block: usize) -> CheckpointResult<Snapshot> {
        self.snapshots
            .get(&block)
            .cloned()
            .ok_or(CheckpointError::NotFound { block })
    }

    fn discard(&mut self, block: usize) -> CheckpointResult<bool> {
        Ok(self.snapshots.remove(&block).is_some())
    }

    fn contains(&self, block: usize) -> bool {
        self.snapshots.contains_key(&block)
    }

    fn len(&self) -> usize {
        self.snapshots.len()
    }

    fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    fn blocks(&self) -> Vec<usize> {
        self.snapshots.keys().copied().collect()
    }

    fn clear(&mut self) -> CheckpointResult<()> {
        self.snapshots.clear();
        Ok(())
    }
}
