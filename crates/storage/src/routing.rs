//! Key-to-bucket routing.

use core::hash::{Hash, Hasher};
use tessera_core::{BucketId, Value};

/// FNV-1a hasher. Stable across processes, unlike the std `RandomState`.
struct FnvHasher {
    state: u64,
}

impl FnvHasher {
    const FNV_OFFSET: u64 = 0xcbf29ce484222325;
    const FNV_PRIME: u64 = 0x100000001b3;

    fn new() -> Self {
        Self {
            state: Self::FNV_OFFSET,
        }
    }
}

impl Hasher for FnvHasher {
    fn finish(&self) -> u64 {
        self.state
    }

    fn write(&mut self, bytes: &[u8]) {
        for byte in bytes {
            self.state ^= *byte as u64;
            self.state = self.state.wrapping_mul(Self::FNV_PRIME);
        }
    }
}

/// Returns the bucket a key is stored in.
pub fn bucket_for_key(key: &Value, bucket_count: usize) -> BucketId {
    if bucket_count <= 1 {
        return 0;
    }
    let mut hasher = FnvHasher::new();
    key.hash(&mut hasher);
    (hasher.finish() % bucket_count as u64) as BucketId
}
