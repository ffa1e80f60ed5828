//! Test fixtures shared by unit tests.

use crate::config::QueryConfig;
use crate::context::{CancellationToken, ExecutionContext, QueryEnv};
use crate::method::{AllowAllAuthorizer, TypeRegistry};
use crate::optimizer::compile;
use std::sync::Arc;
use tessera_storage::RegionCache;

pub(crate) fn env_with_regions(names: &[&str]) -> QueryEnv {
    let cache = Arc::new(RegionCache::new());
    for name in names {
        cache.create_region(name).unwrap();
    }
    env_for(cache)
}

pub(crate) fn env_for(cache: Arc<RegionCache>) -> QueryEnv {
    QueryEnv {
        cache,
        registry: Arc::new(TypeRegistry::new()),
        authorizer: Arc::new(AllowAllAuthorizer),
        config: QueryConfig::default(),
    }
}

pub(crate) fn with_context<F>(env: &QueryEnv, text: &str, f: F)
where
    F: FnOnce(&mut ExecutionContext<'_>),
{
    let query = compile(text).unwrap();
    let mut ctx = ExecutionContext::new(&query, env, &[], CancellationToken::new());
    f(&mut ctx);
}
