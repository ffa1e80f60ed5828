//! Local (non-partitioned) regions.

use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::sync::Arc;
use tessera_core::{
    EntryRef, Error, IndexHandle, IndexRef, QueryRegion, RegionEntry, Result, Value,
};
use tessera_index::{KeyExtractor, RangeIndex};

/// A map-like region holding entries and the indexes defined over them.
///
/// Mutations are serialized by a writer mutex that is held across the entry map
/// update and the index updates; the entry map lock itself is released before
/// any index lock is taken, so a query holding index read-locks can keep
/// reading entries while a writer waits.
#[derive(Debug)]
pub struct LocalRegion {
    name: String,
    entries: RwLock<BTreeMap<Value, EntryRef>>,
    indexes: RwLock<Vec<Arc<RangeIndex>>>,
    writer: Mutex<()>,
    next_version: AtomicU64,
    destroyed: AtomicBool,
}

impl LocalRegion {
    /// Creates an empty region.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: RwLock::new(BTreeMap::new()),
            indexes: RwLock::new(Vec::new()),
            writer: Mutex::new(()),
            next_version: AtomicU64::new(1),
            destroyed: AtomicBool::new(false),
        }
    }

    fn check_live(&self) -> Result<()> {
        if self.is_destroyed() {
            Err(Error::region_destroyed(&self.name))
        } else {
            Ok(())
        }
    }

    /// Stores a value under a key, returning the previous value.
    pub fn put(&self, key: impl Into<Value>, value: impl Into<Value>) -> Result<Option<Value>> {
        self.check_live()?;
        let key = key.into();
        let _writer = self.writer.lock();
        let version = self.next_version.fetch_add(1, Ordering::Relaxed);
        let entry = RegionEntry::shared(key.clone(), value.into(), version);
        let old = self.entries.write().insert(key, Arc::clone(&entry));

        for index in self.indexes.read().iter() {
            if let Some(old) = &old {
                index.remove(old);
            }
            index.insert(&entry);
        }
        Ok(old.map(|e| e.value().clone()))
    }

    /// Removes the entry under a key, returning its value. The removed entry is
    /// marked destroyed so in-flight queries holding it see UNDEFINED.
    pub fn remove(&self, key: &Value) -> Result<Option<Value>> {
        self.check_live()?;
        let _writer = self.writer.lock();
        let Some(old) = self.entries.write().remove(key) else {
            return Ok(None);
        };
        old.mark_destroyed();
        for index in self.indexes.read().iter() {
            index.remove(&old);
        }
        Ok(Some(old.value().clone()))
    }

    /// Removes every entry.
    pub fn clear(&self) -> Result<()> {
        self.check_live()?;
        let _writer = self.writer.lock();
        let old = core::mem::take(&mut *self.entries.write());
        for entry in old.values() {
            entry.mark_destroyed();
        }
        for index in self.indexes.read().iter() {
            index.rebuild(core::iter::empty())?;
        }
        Ok(())
    }

    /// Destroys the region. Every entry is marked destroyed and later reads fail.
    pub fn destroy(&self) {
        let _writer = self.writer.lock();
        if self.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }
        let old = core::mem::take(&mut *self.entries.write());
        for entry in old.values() {
            entry.mark_destroyed();
        }
        self.indexes.write().clear();
        tracing::debug!(region = %self.name, entries = old.len(), "region destroyed");
    }

    /// Creates an index over the region's current and future entries.
    pub fn create_index(
        &self,
        name: &str,
        expression: &str,
        extractor: KeyExtractor,
    ) -> Result<Arc<RangeIndex>> {
        self.check_live()?;
        let _writer = self.writer.lock();
        let mut indexes = self.indexes.write();
        if indexes.iter().any(|i| i.name() == name) {
            return Err(Error::index_exists(&self.name, name));
        }
        let index = Arc::new(RangeIndex::new(name, &self.name, expression, extractor));
        index.rebuild(self.entries.read().values())?;
        indexes.push(Arc::clone(&index));
        tracing::debug!(region = %self.name, index = name, entries = index.len(), "index created");
        Ok(index)
    }

    /// Drops an index by name.
    pub fn remove_index(&self, name: &str) -> Result<()> {
        let _writer = self.writer.lock();
        let mut indexes = self.indexes.write();
        let before = indexes.len();
        indexes.retain(|i| i.name() != name);
        if indexes.len() == before {
            return Err(Error::index_not_found(&self.name, name));
        }
        Ok(())
    }

    /// Returns a typed index handle by name.
    pub fn index(&self, name: &str) -> Option<Arc<RangeIndex>> {
        self.indexes.read().iter().find(|i| i.name() == name).cloned()
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns true if the region holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl QueryRegion for LocalRegion {
    fn name(&self) -> &str {
        &self.name
    }

    fn get_entry(&self, key: &Value) -> Option<EntryRef> {
        self.entries.read().get(key).cloned()
    }

    fn entries(&self) -> Result<Vec<EntryRef>> {
        self.check_live()?;
        Ok(self.entries.read().values().cloned().collect())
    }

    fn size(&self) -> usize {
        self.len()
    }

    fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    fn indexes(&self) -> Vec<IndexRef> {
        self.indexes
            .read()
            .iter()
            .map(|i| Arc::clone(i) as IndexRef)
            .collect()
    }
}
