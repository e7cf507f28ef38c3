//! Two-tier snapshot storage.

use std::collections::BTreeMap;
use std::path::PathBuf;

use tracing::{debug, warn};

use super::{CheckpointStorage, DiskStorage, MemoryStorage};
use crate::budget::MemoryBudget;
use crate::error::{CheckpointError, CheckpointResult};
use crate::schedule::StorageTier;
use crate::snapshot::Snapshot;

/// Routes snapshots to an in-memory fast tier or an on-disk slow tier.
///
/// The slow tier's directory is created on the first slow store. Each tier
/// may be limited to a number of slots, and the fast tier to a
/// [`MemoryBudget`].
///
/// # Example
///
/// ```
/// use adjoint_checkpoint::{Snapshot, StorageTier, TieredStorage};
///
/// let mut storage = TieredStorage::new().with_capacity(StorageTier::Fast, 1);
/// storage.store(Snapshot::new(2), StorageTier::Fast).unwrap();
/// assert!(storage.store(Snapshot::new(3), StorageTier::Fast).is_err());
/// storage.discard(2).unwrap();
/// assert!(storage.stored().is_empty());
/// ```
#[derive(Debug, Default)]
pub struct TieredStorage {
    fast: MemoryStorage,
    slow: Option<DiskStorage>,
    disk_directory: Option<PathBuf>,
    index: BTreeMap<usize, StorageTier>,
    fast_capacity: Option<usize>,
    slow_capacity: Option<usize>,
    budget: Option<MemoryBudget>,
}

impl TieredStorage {
    /// Creates unbounded storage with slow-tier files under the system temp
    /// directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Places slow-tier files under `directory`.
    pub fn with_disk_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.disk_directory = Some(directory.into());
        self
    }

    /// Limits `tier` to `capacity` snapshots.
    pub fn with_capacity(mut self, tier: StorageTier, capacity: usize) -> Self {
        match tier {
            StorageTier::Fast => self.fast_capacity = Some(capacity),
            StorageTier::Slow => self.slow_capacity = Some(capacity),
        }
        self
    }

    /// Sets a memory budget for the fast tier.
    pub fn with_memory_budget(mut self, budget: MemoryBudget) -> Self {
        self.budget = Some(budget);
        self
    }

    /// Slot limit of `tier`, if any.
    pub fn capacity(&self, tier: StorageTier) -> Option<usize> {
        match tier {
            StorageTier::Fast => self.fast_capacity,
            StorageTier::Slow => self.slow_capacity,
        }
    }

    /// Held snapshots and their tiers.
    #[inline]
    pub fn stored(&self) -> &BTreeMap<usize, StorageTier> {
        &self.index
    }

    /// Tier holding `block`, if any.
    pub fn tier_of(&self, block: usize) -> Option<StorageTier> {
        self.index.get(&block).copied()
    }

    /// Number of snapshots held in `tier`.
    pub fn tier_len(&self, tier: StorageTier) -> usize {
        self.index.values().filter(|&&t| t == tier).count()
    }

    /// Approximate fast-tier usage in bytes.
    pub fn memory_usage(&self) -> usize {
        self.fast.memory_usage()
    }

    /// Stores `snapshot` in `tier`, moving it out of the other tier if it
    /// was held there.
    ///
    /// # Errors
    ///
    /// - [`CheckpointError::StorageFull`] if `tier` has no free slot
    /// - [`CheckpointError::MemoryExceeded`] if a fast store would exceed
    ///   the memory budget
    /// - [`CheckpointError::Io`] if a slow store fails
    pub fn store(&mut self, snapshot: Snapshot, tier: StorageTier) -> CheckpointResult<()> {
        let block = snapshot.block();
        let previous = self.tier_of(block);
        if previous != Some(tier) {
            if let Some(capacity) = self.capacity(tier) {
                if self.tier_len(tier) >= capacity {
                    return Err(CheckpointError::StorageFull { tier, capacity });
                }
            }
        }

        match tier {
            StorageTier::Fast => {
                if let Some(budget) = self.budget {
                    let current = self.fast.memory_usage() + snapshot.memory_size();
                    if !budget.is_within_budget(current) {
                        return Err(CheckpointError::MemoryExceeded {
                            current,
                            max: budget.max_bytes(),
                        });
                    }
                    if budget.is_warning(current) {
                        warn!(
                            usage = current,
                            percentage = budget.usage_percentage(current),
                            remaining = budget.remaining(current),
                            "Fast checkpoint tier nearing its memory budget"
                        );
                    }
                }
                self.fast.store(snapshot)?;
            }
            StorageTier::Slow => {
                if self.slow.is_none() {
                    self.slow = Some(DiskStorage::new(self.disk_directory.as_deref())?);
                }
                if let Some(slow) = &mut self.slow {
                    slow.store(snapshot)?;
                }
            }
        }

        if let Some(old) = previous.filter(|&t| t != tier) {
            self.remove_from(block, old)?;
        }
        self.index.insert(block, tier);
        debug!(block, %tier, "Stored snapshot");
        Ok(())
    }

    /// Loads the snapshot of `block` from whichever tier holds it.
    ///
    /// # Errors
    ///
    /// [`CheckpointError::NotFound`] if no tier holds `block`.
    pub fn load(&self, block: usize) -> CheckpointResult<Snapshot> {
        match self.tier_of(block) {
            Some(StorageTier::Fast) => self.fast.load(block),
            Some(StorageTier::Slow) => self
                .slow
                .as_ref()
                .ok_or(CheckpointError::NotFound { block })?
                .load(block),
            None => Err(CheckpointError::NotFound { block }),
        }
    }

    /// Releases the snapshot of `block`. Returns `true` if one was held.
    pub fn discard(&mut self, block: usize) -> CheckpointResult<bool> {
        match self.index.remove(&block) {
            Some(tier) => {
                self.remove_from(block, tier)?;
                debug!(block, %tier, "Discarded snapshot");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Releases every snapshot.
    pub fn clear(&mut self) -> CheckpointResult<()> {
        self.fast.clear()?;
        if let Some(slow) = &mut self.slow {
            slow.clear()?;
        }
        self.index.clear();
        Ok(())
    }

    fn remove_from(&mut self, block: usize, tier: StorageTier) -> CheckpointResult<()> {
        match tier {
            StorageTier::Fast => {
                self.fast.discard(block)?;
            }
            StorageTier::Slow => {
                if let Some(slow) = &mut self.slow {
                    slow.discard(block)?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adjoint_core::VariableId;

    fn snapshot(block: usize, len: usize) -> Snapshot {
        let mut s = Snapshot::new(block);
        s.insert(VariableId::from_raw(1), vec![block as f64; len]);
        s
    }

    // ========================================
    // Routing
    // ========================================

    #[test]
    fn test_tiers_are_independent() {
        let parent = tempfile::tempdir().unwrap();
        let mut storage = TieredStorage::new()
            .with_disk_directory(parent.path())
            .with_capacity(StorageTier::Fast, 1)
            .with_capacity(StorageTier::Slow, 1);
        storage.store(snapshot(1, 2), StorageTier::Fast).unwrap();
        storage.store(snapshot(2, 2), StorageTier::Slow).unwrap();
        assert_eq!(storage.tier_of(1), Some(StorageTier::Fast));
        assert_eq!(storage.tier_of(2), Some(StorageTier::Slow));
        assert_eq!(storage.load(2).unwrap(), snapshot(2, 2));
        assert!(matches!(
            storage.store(snapshot(3, 2), StorageTier::Slow),
            Err(CheckpointError::StorageFull {
                tier: StorageTier::Slow,
                capacity: 1
            })
        ));
    }

    #[test]
    fn test_move_between_tiers() {
        let parent = tempfile::tempdir().unwrap();
        let mut storage = TieredStorage::new().with_disk_directory(parent.path());
        storage.store(snapshot(4, 3), StorageTier::Fast).unwrap();
        storage.store(snapshot(4, 3), StorageTier::Slow).unwrap();
        assert_eq!(storage.tier_len(StorageTier::Fast), 0);
        assert_eq!(storage.tier_len(StorageTier::Slow), 1);
        assert_eq!(storage.memory_usage(), 0);
        assert_eq!(storage.load(4).unwrap(), snapshot(4, 3));
    }

    #[test]
    fn test_no_disk_until_slow_store() {
        let mut storage = TieredStorage::new();
        storage.store(snapshot(1, 1), StorageTier::Fast).unwrap();
        assert!(storage.slow.is_none());
    }

    #[test]
    fn test_discard_and_clear() {
        let parent = tempfile::tempdir().unwrap();
        let mut storage = TieredStorage::new().with_disk_directory(parent.path());
        storage.store(snapshot(1, 1), StorageTier::Fast).unwrap();
        storage.store(snapshot(2, 1), StorageTier::Slow).unwrap();
        assert!(storage.discard(2).unwrap());
        assert!(!storage.discard(2).unwrap());
        assert!(matches!(
            storage.load(2),
            Err(CheckpointError::NotFound { block: 2 })
        ));
        storage.clear().unwrap();
        assert!(storage.stored().is_empty());
    }

    // ========================================
    // Memory budget
    // ========================================

    #[test]
    fn test_memory_budget_exceeded() {
        let one = snapshot(1, 100).memory_size();
        let mut storage =
            TieredStorage::new().with_memory_budget(MemoryBudget::new(one + one / 2));
        storage.store(snapshot(1, 100), StorageTier::Fast).unwrap();
        let result = storage.store(snapshot(2, 100), StorageTier::Fast);
        assert!(matches!(
            result,
            Err(CheckpointError::MemoryExceeded { .. })
        ));
        assert!(storage.tier_of(2).is_none());
    }

    #[test]
    fn test_store_above_warning_threshold_succeeds() {
        let one = snapshot(1, 100).memory_size();
        let budget = MemoryBudget::new(one).with_warning_threshold(0.5);
        assert!(budget.is_warning(one));
        assert_eq!(budget.remaining(one), 0);
        let mut storage = TieredStorage::new().with_memory_budget(budget);
        storage.store(snapshot(1, 100), StorageTier::Fast).unwrap();
        assert_eq!(storage.memory_usage(), one);
    }
}
