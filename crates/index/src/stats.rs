//! Index statistics.

use core::sync::atomic::{AtomicUsize, Ordering};

/// Counters maintained by an index.
#[derive(Debug, Default)]
pub struct IndexStats {
    /// Number of indexed entries.
    total_entries: AtomicUsize,
    /// Number of lookups answered.
    lookups: AtomicUsize,
    /// Number of query read-locks currently held.
    active_readers: AtomicUsize,
}

impl IndexStats {
    /// Creates a new empty stats instance.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of indexed entries.
    pub fn total_entries(&self) -> usize {
        self.total_entries.load(Ordering::Relaxed)
    }

    /// Returns the number of lookups answered.
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::Relaxed)
    }

    /// Returns the number of query read-locks currently held.
    pub fn active_readers(&self) -> usize {
        self.active_readers.load(Ordering::Acquire)
    }

    pub(crate) fn set_total_entries(&self, count: usize) {
        self.total_entries.store(count, Ordering::Relaxed);
    }

    pub(crate) fn record_lookup(&self) {
        self.lookups.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn reader_acquired(&self) {
        self.active_readers.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn reader_released(&self) {
        self.active_readers.fetch_sub(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reader_tracking() {
        let stats = IndexStats::new();
        stats.reader_acquired();
        stats.reader_acquired();
        assert_eq!(stats.active_readers(), 2);
        stats.reader_released();
        assert_eq!(stats.active_readers(), 1);
    }

    #[test]
    fn test_lookup_count() {
        let stats = IndexStats::new();
        stats.record_lookup();
        stats.set_total_entries(7);
        assert_eq!(stats.lookups(), 1);
        assert_eq!(stats.total_entries(), 7);
    }
}
