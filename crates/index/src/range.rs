//! Ordered range index.

use crate::extractor::KeyExtractor;
use crate::stats::IndexStats;
use hashbrown::HashMap;
use parking_lot::{ArcRwLockReadGuard, RawRwLock, RwLock};
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;
use tessera_core::{EntryRef, Error, IndexHandle, IndexLookup, IndexView, Result, Value};

/// Index contents guarded by the index lock.
#[derive(Debug, Default)]
struct IndexData {
    keys: BTreeMap<Value, Vec<EntryRef>>,
    /// Entry address -> indexed key, for removal.
    reverse: HashMap<usize, Value>,
    /// Type rank -> number of indexed entries with a key of that rank.
    ranks: HashMap<u8, usize>,
    /// Entry address -> key evaluation failure.
    failures: HashMap<usize, String>,
}

impl IndexData {
    fn insert(&mut self, key: Value, entry: EntryRef) {
        let addr = entry_addr(&entry);
        self.failures.remove(&addr);
        if let Some(old) = self.reverse.insert(addr, key.clone()) {
            self.detach(&old, addr);
        }
        *self.ranks.entry(key.type_rank()).or_default() += 1;
        self.keys.entry(key).or_default().push(entry);
    }

    /// Records an entry whose key could not be evaluated, replacing any key it
    /// had.
    fn fail(&mut self, entry: &EntryRef, message: String) {
        self.remove(entry);
        self.failures.insert(entry_addr(entry), message);
    }

    fn remove(&mut self, entry: &EntryRef) -> bool {
        let addr = entry_addr(entry);
        let failed = self.failures.remove(&addr).is_some();
        match self.reverse.remove(&addr) {
            Some(key) => {
                self.detach(&key, addr);
                true
            }
            None => failed,
        }
    }

    fn detach(&mut self, key: &Value, addr: usize) {
        if let Some(entries) = self.keys.get_mut(key) {
            let before = entries.len();
            entries.retain(|e| entry_addr(e) != addr);
            let removed = entries.len() < before;
            let empty = entries.is_empty();
            if removed {
                self.forget_rank(key.type_rank());
            }
            if empty {
                self.keys.remove(key);
            }
        }
    }

    fn forget_rank(&mut self, rank: u8) {
        if let Some(count) = self.ranks.get_mut(&rank) {
            *count -= 1;
            if *count == 0 {
                self.ranks.remove(&rank);
            }
        }
    }

    /// Returns an indexed non-null key that cannot be ordered against `bound`.
    fn incomparable_key(&self, bound: &Value) -> Option<&Value> {
        let rank = self.ranks.keys().copied().find(|&r| {
            r != Value::Undefined.type_rank()
                && r != Value::Null.type_rank()
                && (r != bound.type_rank() || !bound.is_orderable())
        })?;
        self.keys.keys().find(|k| k.type_rank() == rank)
    }

    fn len(&self) -> usize {
        self.reverse.len()
    }
}

fn entry_addr(entry: &EntryRef) -> usize {
    Arc::as_ptr(entry) as usize
}

/// An ordered index over one region.
///
/// Writers (region mutations) take the lock exclusively; queries hold a shared
/// read-lock through a `RangeIndexView` for as long as they use the index.
#[derive(Debug)]
pub struct RangeIndex {
    name: String,
    region_name: String,
    expression: String,
    extractor: KeyExtractor,
    data: Arc<RwLock<IndexData>>,
    stats: Arc<IndexStats>,
}

impl RangeIndex {
    /// Creates an empty index.
    ///
    /// `expression` is the canonical indexed expression relative to a region
    /// value, matched by the query engine against filter operands.
    pub fn new(
        name: impl Into<String>,
        region_name: impl Into<String>,
        expression: impl Into<String>,
        extractor: KeyExtractor,
    ) -> Self {
        Self {
            name: name.into(),
            region_name: region_name.into(),
            expression: expression.into(),
            extractor,
            data: Arc::new(RwLock::new(IndexData::default())),
            stats: Arc::new(IndexStats::new()),
        }
    }

    /// Indexes an entry. Entries whose key is UNDEFINED are skipped; entries
    /// whose key fails to evaluate are recorded and make lookups fail.
    pub fn insert(&self, entry: &EntryRef) {
        let key = self.extractor.extract(entry.value());
        let mut data = self.data.write();
        match key {
            Ok(Some(key)) => data.insert(key, Arc::clone(entry)),
            Ok(None) => return,
            Err(message) => {
                tracing::warn!(index = %self.name, key = ?entry.key(), %message, "index key evaluation failed");
                data.fail(entry, message);
            }
        }
        self.stats.set_total_entries(data.len());
    }

    /// Removes an entry. Returns true if it was indexed.
    pub fn remove(&self, entry: &EntryRef) -> bool {
        let mut data = self.data.write();
        let removed = data.remove(entry);
        self.stats.set_total_entries(data.len());
        removed
    }

    /// Replaces the index contents with the given entries. Fails, leaving the
    /// index unchanged, if any key cannot be evaluated.
    pub fn rebuild<'a>(&self, entries: impl IntoIterator<Item = &'a EntryRef>) -> Result<()> {
        let mut fresh = IndexData::default();
        for entry in entries {
            let key = self
                .extractor
                .extract(entry.value())
                .map_err(|message| Error::key_evaluation(&self.name, message))?;
            if let Some(key) = key {
                fresh.insert(key, Arc::clone(entry));
            }
        }
        let mut data = self.data.write();
        *data = fresh;
        self.stats.set_total_entries(data.len());
        tracing::debug!(index = %self.name, entries = data.len(), "index rebuilt");
        Ok(())
    }

    /// Returns the number of indexed entries.
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    /// Returns true if nothing is indexed.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the index statistics.
    pub fn stats(&self) -> &IndexStats {
        &self.stats
    }

    /// Returns the key extractor.
    pub fn extractor(&self) -> &KeyExtractor {
        &self.extractor
    }
}

impl IndexHandle for RangeIndex {
    fn name(&self) -> &str {
        &self.name
    }

    fn region_name(&self) -> &str {
        &self.region_name
    }

    fn indexed_expression(&self) -> &str {
        &self.expression
    }

    fn acquire_read_lock_for_query(&self) -> Box<dyn IndexView> {
        // Recursive so a nested subquery on the same thread never waits behind a
        // queued writer while the outer query holds the lock.
        let guard = self.data.read_arc_recursive();
        self.stats.reader_acquired();
        Box::new(RangeIndexView {
            name: self.name.clone(),
            guard,
            stats: Arc::clone(&self.stats),
        })
    }
}

/// A read-locked view of a `RangeIndex`. The lock is released on drop.
pub struct RangeIndexView {
    name: String,
    guard: ArcRwLockReadGuard<RawRwLock, IndexData>,
    stats: Arc<IndexStats>,
}

impl Drop for RangeIndexView {
    fn drop(&mut self) {
        self.stats.reader_released();
    }
}

impl IndexView for RangeIndexView {
    fn index_name(&self) -> &str {
        &self.name
    }

    fn lookup(
        &self,
        lookup: &IndexLookup,
        descending: bool,
        limit: Option<usize>,
    ) -> Result<Vec<EntryRef>> {
        self.stats.record_lookup();
        if let Some(message) = self.guard.failures.values().next() {
            return Err(Error::key_evaluation(&self.name, message.clone()));
        }
        let limit = limit.unwrap_or(usize::MAX);
        let keys = &self.guard.keys;
        match lookup {
            IndexLookup::All => Ok(collect(keys.iter(), descending, limit)),
            IndexLookup::Equal(value) => {
                let hits: Vec<_> = value
                    .numeric_forms()
                    .iter()
                    .filter_map(|v| keys.get_key_value(v))
                    .collect();
                Ok(collect(hits.into_iter(), descending, limit))
            }
            IndexLookup::In(values) => {
                let mut forms: Vec<Value> = values.iter().flat_map(Value::numeric_forms).collect();
                forms.sort();
                forms.dedup();
                let hits: Vec<_> = forms.iter().filter_map(|v| keys.get_key_value(v)).collect();
                Ok(collect(hits.into_iter(), descending, limit))
            }
            IndexLookup::Range { lower, upper } => {
                for bound in [lower, upper] {
                    let (Bound::Included(v) | Bound::Excluded(v)) = bound else {
                        continue;
                    };
                    if v.is_null() || v.is_undefined() {
                        return Ok(Vec::new());
                    }
                    if let Some(key) = self.guard.incomparable_key(v) {
                        return Err(Error::type_mismatch(key.data_type(), v.data_type()));
                    }
                }
                let (lower, upper) = (widen(lower, true), widen(upper, false));
                if !is_valid_range(&lower, &upper) {
                    return Ok(Vec::new());
                }
                let range = keys
                    .range((lower, upper))
                    .filter(|(k, _)| lookup.matches(k));
                Ok(collect(range, descending, limit))
            }
        }
    }

    fn size(&self) -> usize {
        self.guard.len()
    }
}

fn collect<'a, I>(iter: I, descending: bool, limit: usize) -> Vec<EntryRef>
where
    I: DoubleEndedIterator<Item = (&'a Value, &'a Vec<EntryRef>)>,
{
    if descending {
        take_entries(iter.rev(), limit)
    } else {
        take_entries(iter, limit)
    }
}

fn take_entries<'a>(
    iter: impl Iterator<Item = (&'a Value, &'a Vec<EntryRef>)>,
    limit: usize,
) -> Vec<EntryRef> {
    iter.flat_map(|(_, entries)| entries.iter())
        .filter(|e| !e.is_destroyed())
        .take(limit)
        .cloned()
        .collect()
}

/// Stretches a numeric bound over every representation of its value, so keys
/// equal to it under widening fall inside the scanned range. `matches` then
/// applies the exact bound.
fn widen(bound: &Bound<Value>, lower: bool) -> Bound<Value> {
    match bound {
        Bound::Included(v) | Bound::Excluded(v) if v.is_numeric() => {
            let forms = v.numeric_forms();
            let edge = if lower { forms.first() } else { forms.last() };
            edge.cloned().map_or(Bound::Unbounded, Bound::Included)
        }
        other => other.clone(),
    }
}

/// `BTreeMap::range` panics on inverted or empty-exclusive bounds.
fn is_valid_range(lower: &Bound<Value>, upper: &Bound<Value>) -> bool {
    match (lower, upper) {
        (Bound::Unbounded, _) | (_, Bound::Unbounded) => true,
        (Bound::Included(l), Bound::Included(u)) => l <= u,
        (Bound::Included(l), Bound::Excluded(u)) | (Bound::Excluded(l), Bound::Included(u)) => {
            l < u
        }
        (Bound::Excluded(l), Bound::Excluded(u)) => l < u,
    }
}
