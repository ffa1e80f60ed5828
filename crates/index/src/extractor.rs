//! Key extraction for indexes.

use core::fmt;
use std::sync::Arc;
use tessera_core::Value;

type ExtractFn = dyn Fn(&Value) -> Result<Option<Value>, String> + Send + Sync;

/// Derives the indexed key from an entry value.
///
/// `Ok(None)` means the key is UNDEFINED for that value and the entry is left
/// out of the index. `Err` means the key could not be computed at all; the
/// index records the failure and refuses lookups until the entry goes away.
#[derive(Clone)]
pub struct KeyExtractor {
    description: Arc<str>,
    extract: Arc<ExtractFn>,
}

impl KeyExtractor {
    /// Creates an extractor from a closure that cannot fail.
    pub fn new<F>(description: impl AsRef<str>, extract: F) -> Self
    where
        F: Fn(&Value) -> Option<Value> + Send + Sync + 'static,
    {
        Self::fallible(description, move |value| Ok(extract(value)))
    }

    /// Creates an extractor from a closure that may fail with a message.
    pub fn fallible<F>(description: impl AsRef<str>, extract: F) -> Self
    where
        F: Fn(&Value) -> Result<Option<Value>, String> + Send + Sync + 'static,
    {
        Self {
            description: Arc::from(description.as_ref()),
            extract: Arc::new(extract),
        }
    }

    /// Creates an extractor that follows a dotted attribute path
    /// (`status`, `position.secId`). An empty path indexes the value itself.
    pub fn path(path: &str) -> Self {
        let segments: Vec<String> = path
            .split('.')
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
            .collect();
        Self::new(path, move |value| {
            let mut current = value;
            for segment in &segments {
                current = current.field(segment)?;
            }
            match current {
                Value::Undefined => None,
                v => Some(v.clone()),
            }
        })
    }

    /// Extracts the key for a value.
    pub fn extract(&self, value: &Value) -> Result<Option<Value>, String> {
        (self.extract)(value)
    }

    /// Returns the description given at construction.
    pub fn description(&self) -> &str {
        &self.description
    }
}

impl fmt::Debug for KeyExtractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("KeyExtractor").field(&self.description).finish()
    }
}
