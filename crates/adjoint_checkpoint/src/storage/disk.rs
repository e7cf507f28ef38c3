//! Out-of-core snapshot storage.
//!
//! Each snapshot is one little-endian binary file `snapshot_{block}.bin`:
//!
//! ```text
//! block: u64, count: u64,
//! count x (id: u64, len: u64, len x f64)
//! ```

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use adjoint_core::VariableId;
use tracing::{debug, warn};

use super::CheckpointStorage;
use crate::error::{CheckpointError, CheckpointResult};
use crate::schedule::StorageTier;
use crate::snapshot::Snapshot;

static NEXT_DIRECTORY: AtomicUsize = AtomicUsize::new(0);

/// Snapshots written to files in a private directory.
///
/// The directory is created under the given parent (or the system temp
/// directory) and is removed with its contents when the storage is
/// dropped.
///
/// # Example
///
/// ```
/// use adjoint_checkpoint::{CheckpointStorage, DiskStorage, Snapshot};
/// use adjoint_core::VariableId;
///
/// let mut storage = DiskStorage::new(None).unwrap();
/// let mut snapshot = Snapshot::new(5);
/// snapshot.insert(VariableId::from_raw(1), vec![0.5, 1.5]);
/// storage.store(snapshot.clone()).unwrap();
/// assert_eq!(storage.load(5).unwrap(), snapshot);
/// ```
#[derive(Debug)]
pub struct DiskStorage {
    directory: PathBuf,
    blocks: BTreeSet<usize>,
    capacity: Option<usize>,
}

impl DiskStorage {
    /// Creates a private directory under `parent`, or under the system
    /// temp directory when `None`.
    ///
    /// # Errors
    ///
    /// [`CheckpointError::Io`] if the directory cannot be created.
    pub fn new(parent: Option<&Path>) -> CheckpointResult<Self> {
        let parent = parent.map_or_else(std::env::temp_dir, Path::to_path_buf);
        let directory = parent.join(format!(
            "adjoint-checkpoints-{}-{}",
            std::process::id(),
            NEXT_DIRECTORY.fetch_add(1, Ordering::Relaxed)
        ));
        fs::create_dir_all(&directory)
            .map_err(|source| CheckpointError::Io { block: 0, source })?;
        debug!(directory = %directory.display(), "Created disk checkpoint storage");
        Ok(Self {
            directory,
            blocks: BTreeSet::new(),
            capacity: None,
        })
    }

    /// Limits the number of snapshots on disk.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity);
        self
    }

    /// Directory holding the snapshot files.
    #[inline]
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn path(&self, block: usize) -> PathBuf {
        self.directory.join(format!("snapshot_{}.bin", block))
    }
}

impl CheckpointStorage for DiskStorage {
    fn store(&mut self, snapshot: Snapshot) -> CheckpointResult<()> {
        let block = snapshot.block();
        if let Some(capacity) = self.capacity {
            if !self.blocks.contains(&block) && self.blocks.len() >= capacity {
                return Err(CheckpointError::StorageFull {
                    tier: StorageTier::Slow,
                    capacity,
                });
            }
        }
        fs::write(self.path(block), encode(&snapshot))
            .map_err(|source| CheckpointError::Io { block, source })?;
        self.blocks.insert(block);
        Ok(())
    }

    fn load(&self, block: usize) -> CheckpointResult<Snapshot> {
        if !self.blocks.contains(&block) {
            return Err(CheckpointError::NotFound { block });
        }
        let bytes =
            fs::read(self.path(block)).map_err(|source| CheckpointError::Io { block, source })?;
        decode(block, &bytes)
    }

    fn discard(&mut self, block: usize) -> CheckpointResult<bool> {
        if !self.blocks.remove(&block) {
            return Ok(false);
        }
        fs::remove_file(self.path(block))
            .map_err(|source| CheckpointError::Io { block, source })?;
        Ok(true)
    }

    fn contains(&self, block: usize) -> bool {
        self.blocks.contains(&block)
    }

    fn len(&self) -> usize {
        self.blocks.len()
    }

    fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    fn blocks(&self) -> Vec<usize> {
        self.blocks.iter().copied().collect()
    }
}

impl Drop for DiskStorage {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_dir_all(&self.directory) {
            warn!(
                directory = %self.directory.display(),
                error = %e,
                "Failed to remove checkpoint directory"
            );
        }
    }
}

fn encode(snapshot: &Snapshot) -> Vec<u8> {
    let payload: usize = snapshot.iter().map(|(_, v)| 16 + 8 * v.len()).sum();
    let mut bytes = Vec::with_capacity(16 + payload);
    bytes.extend_from_slice(&(snapshot.block() as u64).to_le_bytes());
    bytes.extend_from_slice(&(snapshot.len() as u64).to_le_bytes());
    for (id, values) in snapshot.iter() {
        bytes.extend_from_slice(&id.as_u64().to_le_bytes());
        bytes.extend_from_slice(&(values.len() as u64).to_le_bytes());
        for v in values {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
    }
    bytes
}

struct Reader<'a> {
    block: usize,
    bytes: &'a [u8],
}

impl Reader<'_> {
    fn word(&mut self) -> CheckpointResult<[u8; 8]> {
        if self.bytes.len() < 8 {
            return Err(CheckpointError::Corrupt {
                block: self.block,
                message: "unexpected end of file".to_string(),
            });
        }
        let (head, rest) = self.bytes.split_at(8);
        self.bytes = rest;
        let mut word = [0u8; 8];
        word.copy_from_slice(head);
        Ok(word)
    }

    fn u64(&mut self) -> CheckpointResult<u64> {
        self.word().map(u64::from_le_bytes)
    }

    fn f64(&mut self) -> CheckpointResult<f64> {
        self.word().map(f64::from_le_bytes)
    }
}

fn decode(block: usize, bytes: &[u8]) -> CheckpointResult<Snapshot> {
    let mut reader = Reader { block, bytes };
    let stored_block = reader.u64()?;
    if stored_block != block as u64 {
        return Err(CheckpointError::Corrupt {
            block,
            message: format!("file holds block {}", stored_block),
        });
    }
    let count = reader.u64()?;
    let mut snapshot = Snapshot::new(block);
    for _ in 0..count {
        let id = VariableId::from_raw(reader.u64()?);
        let len = reader.u64()? as usize;
        if len > reader.bytes.len() / 8 {
            return Err(CheckpointError::Corrupt {
                block,
                message: format!("entry length {} exceeds file size", len),
            });
        }
        let values = (0..len)
            .map(|_| reader.f64())
            .collect::<CheckpointResult<Vec<f64>>>()?;
        if !snapshot.insert(id, values) {
            return Err(CheckpointError::Corrupt {
                block,
                message: format!("duplicate entry {}", id),
            });
        }
    }
    if !reader.bytes.is_empty() {
        return Err(CheckpointError::Corrupt {
            block,
            message: format!("{} trailing bytes", reader.bytes.len()),
        });
    }
    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(block: usize) -> Snapshot {
        let mut snapshot = Snapshot::new(block);
        snapshot.insert(VariableId::from_raw(2), vec![1.0, -2.5, f64::MIN_POSITIVE]);
        snapshot.insert(VariableId::from_raw(11), vec![]);
        snapshot.insert(VariableId::from_raw(4), vec![3.25]);
        snapshot
    }

    #[test]
    fn test_store_load_is_bitwise() {
        let parent = tempfile::tempdir().unwrap();
        let mut storage = DiskStorage::new(Some(parent.path())).unwrap();
        storage.store(sample(7)).unwrap();
        assert!(storage.directory().join("snapshot_7.bin").exists());
        assert_eq!(storage.load(7).unwrap(), sample(7));
    }

    #[test]
    fn test_directory_removed_on_drop() {
        let parent = tempfile::tempdir().unwrap();
        let directory = {
            let mut storage = DiskStorage::new(Some(parent.path())).unwrap();
            storage.store(sample(1)).unwrap();
            storage.directory().to_path_buf()
        };
        assert!(!directory.exists());
    }

    #[test]
    fn test_discard_removes_file() {
        let parent = tempfile::tempdir().unwrap();
        let mut storage = DiskStorage::new(Some(parent.path())).unwrap();
        storage.store(sample(3)).unwrap();
        assert!(storage.discard(3).unwrap());
        assert!(!storage.directory().join("snapshot_3.bin").exists());
        assert!(matches!(
            storage.load(3),
            Err(CheckpointError::NotFound { block: 3 })
        ));
    }

    #[test]
    fn test_capacity() {
        let parent = tempfile::tempdir().unwrap();
        let mut storage = DiskStorage::new(Some(parent.path())).unwrap().with_capacity(1);
        storage.store(sample(1)).unwrap();
        assert!(matches!(
            storage.store(sample(2)),
            Err(CheckpointError::StorageFull {
                tier: StorageTier::Slow,
                capacity: 1
            })
        ));
    }

    #[test]
    fn test_truncated_file_is_corrupt() {
        let bytes = encode(&sample(2));
        assert!(matches!(
            decode(2, &bytes[..bytes.len() - 3]),
            Err(CheckpointError::Corrupt { block: 2, .. })
        ));
    }

    #[test]
    fn test_wrong_block_is_corrupt() {
        let bytes = encode(&sample(2));
        assert!(matches!(
            decode(5, &bytes),
            Err(CheckpointError::Corrupt { block: 5, .. })
        ));
    }
}
