//! Queue node configuration.

use frontier_store::DEFAULT_SEGMENT_CAPACITY;
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for a queue node and its proxy.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Root directory for this node's stores and snapshots.
    pub data_dir: PathBuf,

    /// Number of priority classes (`0..n_priorities`).
    ///
    /// May be 0, in which case the node owns only the incremental lane and
    /// every priority put/get fails with `InvalidPriority`.
    pub n_priorities: usize,

    /// Capacity of newly created segment files.
    pub segment_capacity: usize,

    /// Whether stores sync the mapping after every single put.
    pub flush_each_put: bool,

    /// Processing-time budget for priority class 0.
    ///
    /// Class `p` gets `dwell_base / 2^p`; higher priorities are expected to
    /// turn around faster.
    pub dwell_base: Duration,

    /// Buffered items per proxy bucket before an automatic flush.
    pub batch_threshold: usize,

    /// Number of backup replicas per item.
    pub copies: usize,

    /// Expected number of distinct labels for the dedup gate.
    ///
    /// 0 disables deduplication entirely.
    pub dedup_capacity: u64,

    /// Target false-positive rate for the dedup gate.
    pub dedup_error_rate: f64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("frontier_data"),
            n_priorities: 2,
            segment_capacity: DEFAULT_SEGMENT_CAPACITY,
            flush_each_put: true,
            dwell_base: Duration::from_secs(300),
            batch_threshold: 20,
            copies: 1,
            dedup_capacity: 1_000_000,
            dedup_error_rate: 0.001,
        }
    }
}

impl QueueConfig {
    /// Creates a configuration rooted at `data_dir` with default values.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    /// Sets the number of priority classes.
    #[must_use]
    pub const fn n_priorities(mut self, value: usize) -> Self {
        self.n_priorities = value;
        self
    }

    /// Sets the segment capacity for new segment files.
    #[must_use]
    pub const fn segment_capacity(mut self, bytes: usize) -> Self {
        self.segment_capacity = bytes;
        self
    }

    /// Sets whether each single put syncs immediately.
    #[must_use]
    pub const fn flush_each_put(mut self, value: bool) -> Self {
        self.flush_each_put = value;
        self
    }

    /// Sets the class-0 dwell budget.
    #[must_use]
    pub const fn dwell_base(mut self, value: Duration) -> Self {
        self.dwell_base = value;
        self
    }

    /// Sets the proxy batch threshold.
    #[must_use]
    pub const fn batch_threshold(mut self, value: usize) -> Self {
        self.batch_threshold = value;
        self
    }

    /// Sets the number of backup replicas per item.
    #[must_use]
    pub const fn copies(mut self, value: usize) -> Self {
        self.copies = value;
        self
    }

    /// Sets the dedup gate capacity (0 disables the gate).
    #[must_use]
    pub const fn dedup_capacity(mut self, value: u64) -> Self {
        self.dedup_capacity = value;
        self
    }

    /// Sets the dedup gate false-positive rate.
    #[must_use]
    pub const fn dedup_error_rate(mut self, value: f64) -> Self {
        self.dedup_error_rate = value;
        self
    }

    /// Returns the dwell budget for a priority class.
    ///
    /// Follows the exponential schedule `dwell_base / 2^priority`.
    #[must_use]
    pub fn dwell_budget(&self, priority: usize) -> Duration {
        match u32::try_from(priority)
            .ok()
            .and_then(|p| 2u32.checked_pow(p))
        {
            Some(divisor) => self.dwell_base / divisor,
            None => Duration::ZERO,
        }
    }
}
