//! Memory budget for the fast checkpoint tier.

/// Memory budget for snapshots held in memory.
///
/// Used to size periodic schedules and to warn when the fast tier grows
/// towards its limit.
///
/// # Example
///
/// ```rust
/// use adjoint_checkpoint::MemoryBudget;
///
/// let budget = MemoryBudget::from_mb(64);
///
/// // 1000 blocks, each snapshot about 1 MB
/// let period = budget.recommended_period(1000, 1024 * 1024);
/// assert_eq!(period, 16);
/// ```
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MemoryBudget {
    /// Maximum memory usage in bytes
    max_bytes: usize,

    /// Warning threshold as a fraction (0.0 to 1.0)
    warning_threshold: f64,
}

impl MemoryBudget {
    /// Creates a budget of `max_bytes` with a warning threshold of 80%.
    pub fn new(max_bytes: usize) -> Self {
        Self {
            max_bytes,
            warning_threshold: 0.8,
        }
    }

    /// Creates a budget from megabytes.
    #[inline]
    pub fn from_mb(mb: usize) -> Self {
        Self::new(mb * 1024 * 1024)
    }

    /// Sets the warning threshold as a fraction of maximum.
    ///
    /// # Panics
    ///
    /// Panics if threshold is not in [0.0, 1.0].
    pub fn with_warning_threshold(mut self, threshold: f64) -> Self {
        assert!(
            (0.0..=1.0).contains(&threshold),
            "Warning threshold must be between 0.0 and 1.0"
        );
        self.warning_threshold = threshold;
        self
    }

    /// Returns the maximum memory in bytes.
    #[inline]
    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Returns the warning threshold.
    #[inline]
    pub fn warning_threshold(&self) -> f64 {
        self.warning_threshold
    }

    /// Returns `true` if `current_usage` is within budget.
    #[inline]
    pub fn is_within_budget(&self, current_usage: usize) -> bool {
        current_usage <= self.max_bytes
    }

    /// Returns `true` if `current_usage` exceeds the warning threshold.
    #[inline]
    pub fn is_warning(&self, current_usage: usize) -> bool {
        let threshold_bytes = (self.max_bytes as f64 * self.warning_threshold) as usize;
        current_usage > threshold_bytes
    }

    /// Number of blocks between snapshots so that a periodic schedule over
    /// `n_blocks` blocks fits in the budget.
    ///
    /// # Arguments
    ///
    /// * `n_blocks` - Total number of blocks
    /// * `snapshot_bytes` - Approximate size of one snapshot in bytes
    pub fn recommended_period(&self, n_blocks: usize, snapshot_bytes: usize) -> usize {
        if n_blocks == 0 || snapshot_bytes == 0 {
            return 1;
        }
        let max_snapshots = self.max_bytes / snapshot_bytes;
        if max_snapshots == 0 {
            return n_blocks;
        }
        n_blocks.div_ceil(max_snapshots).max(1)
    }

    /// Bytes left after `current_usage`, or 0 if over budget.
    #[inline]
    pub fn remaining(&self, current_usage: usize) -> usize {
        self.max_bytes.saturating_sub(current_usage)
    }

    /// Usage as a percentage of the budget.
    #[inline]
    pub fn usage_percentage(&self, current_usage: usize) -> f64 {
        if self.max_bytes == 0 {
            return 100.0;
        }
        (current_usage as f64 / self.max_bytes as f64) * 100.0
    }
}

impl Default for MemoryBudget {
    /// 1 GB.
    fn default() -> Self {
        Self::from_mb(1024)
    }
}
