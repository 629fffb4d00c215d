//! In-memory [`KvEngine`] backed by [`DashMap`].
//!
//! Grounded in `server-rust/src/storage/engines/hashmap.rs`'s
//! `HashMapStorage`: sharded, lock-free-for-readers map with the same
//! put/get/remove/len/clear test coverage, minus the cursor-pagination and
//! eviction-sampling methods this domain doesn't need.

use dashmap::DashMap;
use sharedlock_core::LockRecord;

use crate::engine::KvEngine;

/// `DashMap`-backed engine. The default backend; suitable for a single
/// process or as the cache in front of a durable backend.
pub struct MemoryEngine {
    entries: DashMap<String, LockRecord>,
}

impl MemoryEngine {
    /// Creates a new, empty engine.
    #[must_use]
    pub fn new() -> Self {
        Self { entries: DashMap::new() }
    }
}

impl Default for MemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl KvEngine for MemoryEngine {
    fn get(&self, key: &str) -> anyhow::Result<Option<LockRecord>> {
        Ok(self.entries.get(key).map(|r| r.clone()))
    }

    fn put(&self, key: &str, record: LockRecord) -> anyhow::Result<()> {
        self.entries.insert(key.to_string(), record);
        Ok(())
    }

    fn remove(&self, key: &str) -> anyhow::Result<()> {
        self.entries.remove(key);
        Ok(())
    }

    fn len(&self) -> anyhow::Result<usize> {
        Ok(self.entries.len())
    }

    fn snapshot(&self) -> anyhow::Result<Vec<(String, LockRecord)>> {
        Ok(self.entries.iter().map(|e| (e.key().clone(), e.value().clone())).collect())
    }
}
