//! Partitioned regions.

use crate::local::LocalRegion;
use crate::routing::bucket_for_key;
use core::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tessera_core::{
    BucketId, EntryRef, Error, IndexRef, PartitionInfo, QueryRegion, RegionRef, Result, Value,
};
use tessera_index::{KeyExtractor, RangeIndex};

/// A region whose entries are spread over a fixed number of buckets.
///
/// Each bucket is a `LocalRegion` carrying the partitioned region's name, so a
/// query compiled against `/name` runs unchanged against a single bucket.
#[derive(Debug)]
pub struct PartitionedRegion {
    name: String,
    buckets: Vec<Arc<LocalRegion>>,
    colocated_with: Option<String>,
    destroyed: AtomicBool,
}

impl PartitionedRegion {
    /// Creates a partitioned region with `bucket_count` empty buckets.
    pub fn new(name: impl Into<String>, bucket_count: usize) -> Result<Self> {
        if bucket_count == 0 {
            return Err(Error::invalid_operation(
                "partitioned region needs at least one bucket",
            ));
        }
        let name = name.into();
        let buckets = (0..bucket_count)
            .map(|_| Arc::new(LocalRegion::new(name.clone())))
            .collect();
        Ok(Self {
            name,
            buckets,
            colocated_with: None,
            destroyed: AtomicBool::new(false),
        })
    }

    /// Declares this region co-located with another partitioned region.
    pub fn colocated_with(mut self, region: impl Into<String>) -> Self {
        self.colocated_with = Some(region.into());
        self
    }

    /// Returns the number of buckets.
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Returns the bucket a key routes to.
    pub fn bucket_of(&self, key: &Value) -> BucketId {
        bucket_for_key(key, self.buckets.len())
    }

    /// Returns a bucket's local region.
    pub fn local_bucket(&self, bucket: BucketId) -> Option<&Arc<LocalRegion>> {
        self.buckets.get(bucket)
    }

    fn route(&self, key: &Value) -> Result<&Arc<LocalRegion>> {
        if self.is_destroyed() {
            return Err(Error::region_destroyed(&self.name));
        }
        let bucket = self.bucket_of(key);
        self.buckets
            .get(bucket)
            .ok_or_else(|| Error::invalid_operation(format!("bucket {} out of range", bucket)))
    }

    /// Stores a value in the bucket its key routes to.
    pub fn put(&self, key: impl Into<Value>, value: impl Into<Value>) -> Result<Option<Value>> {
        let key = key.into();
        self.route(&key)?.put(key, value)
    }

    /// Removes the entry under a key.
    pub fn remove(&self, key: &Value) -> Result<Option<Value>> {
        self.route(key)?.remove(key)
    }

    /// Creates the same index on every bucket.
    pub fn create_index(
        &self,
        name: &str,
        expression: &str,
        extractor: KeyExtractor,
    ) -> Result<Vec<Arc<RangeIndex>>> {
        if self.is_destroyed() {
            return Err(Error::region_destroyed(&self.name));
        }
        self.buckets
            .iter()
            .map(|b| b.create_index(name, expression, extractor.clone()))
            .collect()
    }

    /// Destroys every bucket.
    pub fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }
        for bucket in &self.buckets {
            bucket.destroy();
        }
        tracing::debug!(region = %self.name, buckets = self.buckets.len(), "partitioned region destroyed");
    }
}

impl QueryRegion for PartitionedRegion {
    fn name(&self) -> &str {
        &self.name
    }

    fn get_entry(&self, key: &Value) -> Option<EntryRef> {
        self.route(key).ok()?.get_entry(key)
    }

    fn entries(&self) -> Result<Vec<EntryRef>> {
        if self.is_destroyed() {
            return Err(Error::region_destroyed(&self.name));
        }
        let mut all = Vec::with_capacity(self.size());
        for bucket in &self.buckets {
            all.extend(bucket.entries()?);
        }
        Ok(all)
    }

    fn size(&self) -> usize {
        self.buckets.iter().map(|b| b.len()).sum()
    }

    fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    /// Indexes live on the buckets; the partitioned view exposes none.
    fn indexes(&self) -> Vec<IndexRef> {
        Vec::new()
    }

    fn partition(&self) -> Option<PartitionInfo> {
        Some(PartitionInfo {
            bucket_count: self.buckets.len(),
            colocated_with: self.colocated_with.clone(),
        })
    }

    fn bucket(&self, bucket: BucketId) -> Option<RegionRef> {
        self.buckets
            .get(bucket)
            .map(|b| Arc::clone(b) as RegionRef)
    }
}
