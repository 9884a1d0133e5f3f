//! Pooled outcome records. Records cycle between the workers and the
//! aggregator for the whole run so the hot path stays allocation-free.

use parking_lot::Mutex;
use std::time::Duration;

/// One invocation's outcome on its way to the aggregator. Mutable and
/// reused; a record lives for the span of one invocation plus one
/// aggregation step.
#[derive(Debug, Default)]
pub struct OutcomeRecord {
    pub cost: Duration,
    pub code: Vec<String>,
    pub error: String,
    pub counting: Vec<String>,
    pub read_bytes: u64,
    pub write_bytes: u64,
}

impl OutcomeRecord {
    pub fn reset(&mut self) {
        self.cost = Duration::ZERO;
        self.code.clear();
        self.error.clear();
        self.counting.clear();
        self.read_bytes = 0;
        self.write_bytes = 0;
    }
}

/// Concurrency-safe free list of records. Acquire/release never touch the
/// aggregate lock.
#[derive(Debug, Default)]
pub struct RecordPool {
    free: Mutex<Vec<Box<OutcomeRecord>>>,
}

impl RecordPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pops a record off the free list (or allocates one) and resets it.
    pub fn acquire(&self) -> Box<OutcomeRecord> {
        let mut record = self.free.lock().pop().unwrap_or_default();
        record.reset();
        record
    }

    pub fn release(&self, record: Box<OutcomeRecord>) {
        self.free.lock().push(record);
    }
}
