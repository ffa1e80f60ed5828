//! Query engine configuration.

use serde::{Deserialize, Serialize};

/// Tunables for query execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Allow WHERE clauses to be answered from indexes.
    pub index_usage: bool,
    /// Allow the `entrySet` / `key IN` bulk-fetch path.
    pub bulk_fetch: bool,
    /// Run bucket-local evaluations on the rayon pool.
    pub parallel_buckets: bool,
    /// Allow LIMIT (and ORDER BY) to be pushed into index lookups.
    pub limit_pushdown: bool,
    /// Log a summary line for every query, as if it carried `<trace>`.
    pub trace_all: bool,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            index_usage: true,
            bulk_fetch: true,
            parallel_buckets: true,
            limit_pushdown: true,
            trace_all: false,
        }
    }
}

impl QueryConfig {
    pub fn with_index_usage(mut self, enabled: bool) -> Self {
        self.index_usage = enabled;
        self
    }

    pub fn with_bulk_fetch(mut self, enabled: bool) -> Self {
        self.bulk_fetch = enabled;
        self
    }

    pub fn with_parallel_buckets(mut self, enabled: bool) -> Self {
        self.parallel_buckets = enabled;
        self
    }

    pub fn with_limit_pushdown(mut self, enabled: bool) -> Self {
        self.limit_pushdown = enabled;
        self
    }

    pub fn with_trace_all(mut self, enabled: bool) -> Self {
        self.trace_all = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = QueryConfig::default();
        assert!(config.index_usage);
        assert!(config.bulk_fetch);
        assert!(!config.trace_all);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: QueryConfig = serde_json::from_str(r#"{"index_usage": false}"#).unwrap();
        assert_eq!(config, QueryConfig::default().with_index_usage(false));
    }

    #[test]
    fn test_builder() {
        let config = QueryConfig::default()
            .with_parallel_buckets(false)
            .with_trace_all(true);
        assert!(!config.parallel_buckets);
        assert!(config.trace_all);
    }
}
