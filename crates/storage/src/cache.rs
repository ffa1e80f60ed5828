//! Region registry.
//!
//! The `RegionCache` maps region names to regions. Names are stored without the
//! leading `/`; lookups accept either form.

use crate::local::LocalRegion;
use crate::partitioned::PartitionedRegion;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use tessera_core::{Error, QueryRegion, RegionRef, Result};
use tessera_index::{KeyExtractor, RangeIndex};

/// A region registered in the cache.
#[derive(Clone, Debug)]
pub enum RegionHandle {
    Local(Arc<LocalRegion>),
    Partitioned(Arc<PartitionedRegion>),
}

impl RegionHandle {
    /// Returns the region as a query-facing handle.
    pub fn as_region(&self) -> RegionRef {
        match self {
            RegionHandle::Local(r) => Arc::clone(r) as RegionRef,
            RegionHandle::Partitioned(r) => Arc::clone(r) as RegionRef,
        }
    }

    /// Creates an index on the region (on every bucket when partitioned).
    pub fn create_index(
        &self,
        name: &str,
        expression: &str,
        extractor: KeyExtractor,
    ) -> Result<Vec<Arc<RangeIndex>>> {
        match self {
            RegionHandle::Local(r) => Ok(vec![r.create_index(name, expression, extractor)?]),
            RegionHandle::Partitioned(r) => r.create_index(name, expression, extractor),
        }
    }

    fn destroy(&self) {
        match self {
            RegionHandle::Local(r) => r.destroy(),
            RegionHandle::Partitioned(r) => r.destroy(),
        }
    }
}

fn normalize(name: &str) -> &str {
    name.trim_start_matches('/')
}

/// Cache managing named regions.
#[derive(Debug, Default)]
pub struct RegionCache {
    /// Region name -> region mapping.
    regions: RwLock<BTreeMap<String, RegionHandle>>,
}

impl RegionCache {
    /// Creates a new empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    fn register(&self, name: &str, handle: RegionHandle) -> Result<()> {
        let mut regions = self.regions.write();
        if regions.contains_key(name) {
            return Err(Error::region_exists(name));
        }
        regions.insert(name.to_owned(), handle);
        Ok(())
    }

    /// Creates a local region.
    pub fn create_region(&self, name: &str) -> Result<Arc<LocalRegion>> {
        let name = normalize(name);
        let region = Arc::new(LocalRegion::new(name));
        self.register(name, RegionHandle::Local(Arc::clone(&region)))?;
        Ok(region)
    }

    /// Creates a partitioned region. When `colocated_with` is given the named
    /// region must already exist, be partitioned, and have the same bucket count.
    pub fn create_partitioned_region(
        &self,
        name: &str,
        bucket_count: usize,
        colocated_with: Option<&str>,
    ) -> Result<Arc<PartitionedRegion>> {
        let name = normalize(name);
        let mut region = PartitionedRegion::new(name, bucket_count)?;
        if let Some(parent) = colocated_with {
            let parent = normalize(parent);
            match self.handle(parent) {
                Some(RegionHandle::Partitioned(p)) if p.bucket_count() == bucket_count => {}
                Some(RegionHandle::Partitioned(_)) => {
                    return Err(Error::invalid_operation(format!(
                        "colocated region {} must have {} buckets",
                        parent, bucket_count
                    )))
                }
                Some(RegionHandle::Local(_)) => {
                    return Err(Error::invalid_operation(format!(
                        "colocated region {} is not partitioned",
                        parent
                    )))
                }
                None => return Err(Error::region_not_found(parent)),
            }
            region = region.colocated_with(parent);
        }
        let region = Arc::new(region);
        self.register(name, RegionHandle::Partitioned(Arc::clone(&region)))?;
        Ok(region)
    }

    /// Destroys and unregisters a region.
    pub fn destroy_region(&self, name: &str) -> Result<()> {
        let name = normalize(name);
        let handle = self
            .regions
            .write()
            .remove(name)
            .ok_or_else(|| Error::region_not_found(name))?;
        handle.destroy();
        Ok(())
    }

    /// Gets a registered region handle.
    pub fn handle(&self, name: &str) -> Option<RegionHandle> {
        self.regions.read().get(normalize(name)).cloned()
    }

    /// Gets a region as a query-facing handle.
    pub fn region(&self, name: &str) -> Option<RegionRef> {
        self.handle(name).map(|h| h.as_region())
    }

    /// Checks if a region exists.
    pub fn has_region(&self, name: &str) -> bool {
        self.regions.read().contains_key(normalize(name))
    }

    /// Returns all region names.
    pub fn region_names(&self) -> Vec<String> {
        self.regions.read().keys().cloned().collect()
    }

    /// Returns the number of regions.
    pub fn region_count(&self) -> usize {
        self.regions.read().len()
    }

    /// Returns the total entry count across all regions.
    pub fn total_entry_count(&self) -> usize {
        self.regions
            .read()
            .values()
            .map(|h| h.as_region().size())
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_core::Value;

    #[test]
    fn test_cache_create_region() {
        let cache = RegionCache::new();
        cache.create_region("/users").unwrap();
        assert!(cache.has_region("users"));
        assert!(cache.has_region("/users"));
        assert_eq!(cache.region_names(), vec!["users".to_string()]);
    }

    #[test]
    fn test_cache_create_duplicate_region() {
        let cache = RegionCache::new();
        cache.create_region("users").unwrap();
        let err = cache.create_region("users").unwrap_err();
        assert!(matches!(err, Error::RegionExists { .. }));
    }

    #[test]
    fn test_cache_destroy_region() {
        let cache = RegionCache::new();
        let region = cache.create_region("users").unwrap();
        cache.destroy_region("/users").unwrap();
        assert!(!cache.has_region("users"));
        assert!(region.is_destroyed());
        assert!(cache.destroy_region("users").is_err());
    }

    #[test]
    fn test_cache_colocation_rules() {
        let cache = RegionCache::new();
        cache.create_partitioned_region("portfolios", 4, None).unwrap();
        cache.create_region("local").unwrap();

        let positions = cache
            .create_partitioned_region("positions", 4, Some("/portfolios"))
            .unwrap();
        assert_eq!(
            positions.partition().unwrap().colocated_with.as_deref(),
            Some("portfolios")
        );

        assert!(cache.create_partitioned_region("a", 3, Some("portfolios")).is_err());
        assert!(cache.create_partitioned_region("b", 4, Some("local")).is_err());
        assert!(cache.create_partitioned_region("c", 4, Some("missing")).is_err());
    }

    #[test]
    fn test_cache_total_entry_count() {
        let cache = RegionCache::new();
        let users = cache.create_region("users").unwrap();
        let trades = cache.create_partitioned_region("trades", 2, None).unwrap();
        users.put(1, "Alice").unwrap();
        trades.put(1, 1).unwrap();
        trades.put(2, 2).unwrap();
        assert_eq!(cache.total_entry_count(), 3);
        assert_eq!(cache.region("trades").unwrap().size(), 2);
        assert!(cache.region("nope").is_none());
        assert_eq!(cache.region("users").unwrap().get(&Value::Int(1)), Some("Alice".into()));
    }
}
