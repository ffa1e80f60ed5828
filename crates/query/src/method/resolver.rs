//! Most-specific method selection with a process-wide memo.

use super::{MethodDescriptor, TypeRegistry};
use crate::error::{QueryError, Result};
use dashmap::DashMap;
use once_cell::sync::Lazy;
use std::sync::Arc;
use tessera_core::ObjectType;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct ResolutionKey {
    registry: u64,
    class: String,
    method: String,
    args: Vec<ObjectType>,
}

#[derive(Clone, Debug)]
enum Resolution {
    Method(Arc<MethodDescriptor>),
    NotFound,
    Ambiguous(Vec<String>),
}

static RESOLUTIONS: Lazy<DashMap<ResolutionKey, Resolution>> = Lazy::new(DashMap::new);

/// Resolves `class.method(args)` to the most specific applicable method.
///
/// Results (including failures) are memoized per registry, receiver class, method
/// name and argument types. Concurrent resolvers of the same key may both compute;
/// the first insert wins.
pub fn resolve_method(
    registry: &TypeRegistry,
    class: &str,
    method: &str,
    args: &[ObjectType],
) -> Result<Arc<MethodDescriptor>> {
    let key = ResolutionKey {
        registry: registry.id(),
        class: class.to_owned(),
        method: method.to_owned(),
        args: args.to_vec(),
    };
    let resolution = match RESOLUTIONS.get(&key) {
        Some(hit) => hit.clone(),
        None => {
            let computed = resolve_uncached(registry, class, method, args);
            tracing::debug!(class, method, ?args, ?computed, "resolved method");
            RESOLUTIONS.entry(key).or_insert(computed).clone()
        }
    };
    match resolution {
        Resolution::Method(m) => Ok(m),
        Resolution::NotFound => Err(QueryError::unresolved(format!(
            "no applicable method {}({}) on class {}",
            method,
            type_list(args),
            class
        ))),
        Resolution::Ambiguous(candidates) => Err(QueryError::Ambiguity {
            class: class.to_owned(),
            method: method.to_owned(),
            candidates,
        }),
    }
}

/// Number of memoized resolutions.
pub fn resolution_cache_len() -> usize {
    RESOLUTIONS.len()
}

fn type_list(args: &[ObjectType]) -> String {
    args.iter().map(|a| a.class_name()).collect::<Vec<_>>().join(", ")
}

fn resolve_uncached(
    registry: &TypeRegistry,
    class: &str,
    method: &str,
    args: &[ObjectType],
) -> Resolution {
    // Collect candidates from the most derived class up; an override hides the
    // ancestor method with identical parameters.
    let mut candidates: Vec<Arc<MethodDescriptor>> = Vec::new();
    for ancestor in registry.lineage(class) {
        let Some(descriptor) = registry.class(&ancestor) else {
            continue;
        };
        for m in descriptor.methods() {
            if m.name() != method || m.params().len() != args.len() {
                continue;
            }
            if candidates.iter().all(|c| c.params() != m.params()) {
                candidates.push(m.clone());
            }
        }
    }

    if let Some(exact) = candidates.iter().find(|c| c.params() == args) {
        return Resolution::Method(exact.clone());
    }

    let applicable: Vec<&Arc<MethodDescriptor>> = candidates
        .iter()
        .filter(|c| {
            args.iter()
                .zip(c.params())
                .all(|(arg, param)| registry.is_assignable(arg, param))
        })
        .collect();

    let maximal: Vec<&Arc<MethodDescriptor>> = applicable
        .iter()
        .enumerate()
        .filter(|(i, c)| {
            !applicable
                .iter()
                .enumerate()
                .any(|(j, other)| *i != j && more_specific(registry, other, c))
        })
        .map(|(_, c)| *c)
        .collect();

    match maximal.len() {
        0 => Resolution::NotFound,
        1 => Resolution::Method(maximal[0].clone()),
        _ => Resolution::Ambiguous(maximal.iter().map(|m| m.signature()).collect()),
    }
}

/// Returns true if `a` is strictly more specific than `b`.
fn more_specific(registry: &TypeRegistry, a: &MethodDescriptor, b: &MethodDescriptor) -> bool {
    let params_at_least = a
        .params()
        .iter()
        .zip(b.params())
        .all(|(pa, pb)| registry.is_assignable(pa, pb));
    let params_strict = a.params() != b.params();
    let class_at_least = registry.is_subclass(a.declaring_class(), b.declaring_class());
    params_at_least && class_at_least && (params_strict || a.declaring_class() != b.declaring_class())
}
