use std::fmt;

use crate::config::BatchKey;

/// Identity of a worker slot in a batch's pool, e.g. `batch-1-thread-2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkerId {
    pub batch: BatchKey,
    /// One-based slot number.
    pub index: usize,
}

impl WorkerId {
    pub fn new(batch: BatchKey, index: usize) -> Self {
        Self { batch, index }
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-thread-{}", self.batch, self.index)
    }
}
