//! Error types for checkpoint schedules and storage.

use thiserror::Error;

use crate::schedule::StorageTier;

/// Errors that can occur during checkpoint operations.
#[derive(Debug, Error)]
pub enum CheckpointError {
    /// No snapshot is stored for the requested block.
    #[error("Checkpoint not found for block {block}")]
    NotFound {
        /// The block that was requested
        block: usize,
    },

    /// A storage tier has no free slot.
    #[error("Checkpoint storage is full ({tier} tier, capacity: {capacity})")]
    StorageFull {
        /// The tier that was full
        tier: StorageTier,
        /// Maximum number of snapshots in the tier
        capacity: usize,
    },

    /// Schedule parameters are inconsistent.
    #[error("Invalid checkpoint schedule: {message}")]
    InvalidSchedule {
        /// Description of the issue
        message: String,
    },

    /// A block index lies beyond what the schedule was built for.
    #[error("Block {block} exceeds the schedule's block count ({max})")]
    BlockCountExceeded {
        /// Offending block index
        block: usize,
        /// Number of blocks the schedule supports
        max: usize,
    },

    /// Fast-tier memory budget exceeded.
    #[error("Memory budget exceeded: {current} bytes > {max} bytes")]
    MemoryExceeded {
        /// Usage after the rejected store
        current: usize,
        /// Maximum allowed
        max: usize,
    },

    /// Reading or writing a slow-tier file failed.
    #[error("Checkpoint I/O failed for block {block}: {source}")]
    Io {
        /// Block being read or written
        block: usize,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// A slow-tier file could not be decoded.
    #[error("Corrupt checkpoint for block {block}: {message}")]
    Corrupt {
        /// Block being read
        block: usize,
        /// Description of the issue
        message: String,
    },
}

/// Result type for checkpoint operations.
pub type CheckpointResult<T> = Result<T, CheckpointError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = CheckpointError::StorageFull {
            tier: StorageTier::Fast,
            capacity: 3,
        };
        assert_eq!(
            err.to_string(),
            "Checkpoint storage is full (fast tier, capacity: 3)"
        );

        let err = CheckpointError::BlockCountExceeded { block: 10, max: 10 };
        assert!(err.to_string().contains("Block 10"));
    }

    #[test]
    fn test_io_source() {
        use std::error::Error;
        let err = CheckpointError::Io {
            block: 2,
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        };
        assert!(err.source().is_some());
    }
}
