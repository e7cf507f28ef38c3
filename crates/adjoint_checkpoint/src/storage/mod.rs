//! Snapshot storage backends.
//!
//! - [`MemoryStorage`]: snapshots held in memory (the fast tier)
//! - [`DiskStorage`]: snapshots written to a private directory (the slow
//!   tier), removed when the storage is dropped
//! - [`TieredStorage`]: routes each snapshot to a tier and enforces
//!   per-tier slot limits and the fast-tier memory budget

mod disk;
mod memory;
mod tiered;

use std::fmt;

pub use disk::DiskStorage;
pub use memory::MemoryStorage;
pub use tiered::TieredStorage;

use crate::error::CheckpointResult;
use crate::snapshot::Snapshot;

/// A store of block snapshots keyed by block index.
pub trait CheckpointStorage: fmt::Debug {
    /// Stores `snapshot`, replacing any earlier snapshot of the same block.
    ///
    /// # Errors
    ///
    /// [`CheckpointError::StorageFull`](crate::CheckpointError::StorageFull)
    /// if the storage is at capacity, or an I/O error for disk storage.
    fn store(&mut self, snapshot: Snapshot) -> CheckpointResult<()>;

    /// Loads the snapshot of `block`.
    ///
    /// # Errors
    ///
    /// [`CheckpointError::NotFound`](crate::CheckpointError::NotFound) if
    /// no snapshot is held for `block`.
    fn load(&self, block: usize) -> CheckpointResult<Snapshot>;

    /// Removes the snapshot of `block`. Returns `true` if one was held.
    fn discard(&mut self, block: usize) -> CheckpointResult<bool>;

    /// Returns `true` if a snapshot of `block` is held.
    fn contains(&self, block: usize) -> bool;

    /// Number of snapshots held.
    fn len(&self) -> usize;

    /// Returns `true` if nothing is held.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of snapshots, if bounded.
    fn capacity(&self) -> Option<usize>;

    /// Blocks with a snapshot, in increasing order.
    fn blocks(&self) -> Vec<usize>;

    /// Removes every snapshot.
    fn clear(&mut self) -> CheckpointResult<()> {
        for block in self.blocks() {
            self.discard(block)?;
        }
        Ok(())
    }
}
