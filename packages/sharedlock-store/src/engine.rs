//! Layer 1: the raw, synchronous key-value engine a backend is built over.
//!
//! Mirrors `server-rust/src/storage/engine.rs`'s `StorageEngine` trait,
//! trimmed to what a lock backend actually needs: point get/put/remove and a
//! point-in-time snapshot for the background sweep. Cursor-paginated
//! iteration and eviction-sampling, which that trait exposes for map
//! eviction, have no counterpart here -- a lock record set is swept
//! outright, never paged. Unlike that trait, every method here returns
//! `anyhow::Result`: the in-memory engine never fails, but the durable
//! `redb` backend can hit real I/O errors that must propagate rather than
//! panic.

use sharedlock_core::LockRecord;

/// Synchronous key-value storage for [`LockRecord`]s.
///
/// Implementations are wrapped in `Arc<dyn KvEngine>` and shared across
/// async boundaries; every method must be safe to call concurrently from
/// multiple tasks.
pub trait KvEngine: Send + Sync + 'static {
    /// Retrieves the record stored at `key`, if any.
    fn get(&self, key: &str) -> anyhow::Result<Option<LockRecord>>;

    /// Inserts or replaces the record at `key`.
    fn put(&self, key: &str, record: LockRecord) -> anyhow::Result<()>;

    /// Removes the record at `key`, if any.
    fn remove(&self, key: &str) -> anyhow::Result<()>;

    /// Number of keys currently stored.
    fn len(&self) -> anyhow::Result<usize>;

    /// Whether the engine holds no keys.
    fn is_empty(&self) -> anyhow::Result<bool> {
        Ok(self.len()? == 0)
    }

    /// A point-in-time snapshot of every `(key, record)` pair. Used by the
    /// background sweep; concurrent mutation during iteration is tolerated.
    fn snapshot(&self) -> anyhow::Result<Vec<(String, LockRecord)>>;
}
