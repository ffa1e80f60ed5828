//! Region entries.
//!
//! An entry pairs a key with the value stored under it. Entries are shared between the
//! owning region, its indexes and any query currently iterating them; a query that
//! reaches an entry after it was destroyed sees UNDEFINED instead of stale data.

use crate::value::Value;
use core::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared handle to a region entry.
pub type EntryRef = Arc<RegionEntry>;

/// A key/value pair stored in a region.
#[derive(Debug)]
pub struct RegionEntry {
    key: Value,
    value: Value,
    /// Version number for change detection. Incremented on each update of the key.
    version: u64,
    destroyed: AtomicBool,
}

impl RegionEntry {
    /// Creates a new live entry.
    pub fn new(key: Value, value: Value, version: u64) -> Self {
        Self {
            key,
            value,
            version,
            destroyed: AtomicBool::new(false),
        }
    }

    /// Creates a shared entry handle.
    pub fn shared(key: Value, value: Value, version: u64) -> EntryRef {
        Arc::new(Self::new(key, value, version))
    }

    /// Returns the key.
    #[inline]
    pub fn key(&self) -> &Value {
        &self.key
    }

    /// Returns the value.
    #[inline]
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Returns the version number.
    #[inline]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Marks the entry as destroyed.
    pub fn mark_destroyed(&self) {
        self.destroyed.store(true, Ordering::Release);
    }

    /// Returns true once the entry has been destroyed.
    #[inline]
    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }
}
