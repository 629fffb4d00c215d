//! Layer 2: [`MemoryLockStore`], the `StorageContract` implementation every
//! embedder actually drives a [`Provider`](sharedlock_core::Provider) with.
//!
//! Orchestrates a [`KvEngine`] (Layer 1) the same way
//! `server-rust/src/storage/impls/default_record_store.rs`'s
//! `DefaultRecordStore` orchestrates a `StorageEngine`: one engine
//! read-modify-write per public method, serialized behind a lock so
//! concurrent callers never observe a half-applied transition. The lock is
//! coarse (one per store, not per key) because a `KvEngine` exposes no
//! atomic compare-and-swap primitive of its own -- correctness, not
//! throughput, is the goal here; a sharded-lock or per-key-lock variant is a
//! reasonable follow-up if contention ever shows up in practice.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use sharedlock_core::clock::{Expiry, Instant};
use sharedlock_core::record::{LockRecord, Slots};
use sharedlock_core::storage::{decide_put_writer, AddReaderSlotOutcome, PutWriterDecision, PutWriterOutcome, StorageContract};

use crate::engine::KvEngine;

/// `StorageContract` backed by any [`KvEngine`].
pub struct MemoryLockStore {
    engine: Arc<dyn KvEngine>,
    guard: Mutex<()>,
}

impl MemoryLockStore {
    /// Wraps `engine` as a [`StorageContract`].
    #[must_use]
    pub fn new(engine: Arc<dyn KvEngine>) -> Self {
        Self { engine, guard: Mutex::new(()) }
    }

    /// Convenience constructor over the default in-memory engine.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(crate::engines::memory::MemoryEngine::new()))
    }

    fn current(&self, key: &str) -> anyhow::Result<LockRecord> {
        Ok(self.engine.get(key)?.unwrap_or_default())
    }
}

#[async_trait]
impl StorageContract for MemoryLockStore {
    async fn try_put_writer(
        &self,
        key: &str,
        owner_id: &str,
        expires_at: Expiry,
        now: Instant,
    ) -> anyhow::Result<PutWriterOutcome> {
        let _lock = self.guard.lock();
        let current = self.current(key)?;
        match decide_put_writer(&current, owner_id, now) {
            PutWriterDecision::Replace => {
                self.engine.put(key, LockRecord::Writer { owner_id: owner_id.to_string(), expires_at })?;
                Ok(PutWriterOutcome::acquired())
            }
            PutWriterDecision::RenewSameOwner => Ok(PutWriterOutcome::acquired()),
            PutWriterDecision::Blocked(outcome) => Ok(outcome),
        }
    }

    async fn try_add_reader_slot(
        &self,
        key: &str,
        owner_id: &str,
        expires_at: Expiry,
        requested_limit: u32,
        now: Instant,
    ) -> anyhow::Result<AddReaderSlotOutcome> {
        let _lock = self.guard.lock();
        let current = self.current(key)?;

        if current.live_writer(now).is_some() {
            tracing::debug!(key, owner_id, "reader acquire blocked by live writer");
            return Ok(AddReaderSlotOutcome { added: false, effective_limit: 0, current_slots: Slots::new() });
        }

        let (limit, mut slots) = if current.is_only_expired(now) {
            (requested_limit.max(1), Slots::new())
        } else {
            current.live_reader_slots(now).unwrap_or((1, Slots::new()))
        };

        let added = slots.contains_key(owner_id) || (slots.len() as u32) < limit;
        if added {
            slots.entry(owner_id.to_string()).or_insert(expires_at);
        }

        self.engine.put(key, LockRecord::Reader { limit, slots: slots.clone() })?;
        Ok(AddReaderSlotOutcome { added, effective_limit: limit, current_slots: slots })
    }

    async fn refresh_writer(
        &self,
        key: &str,
        owner_id: &str,
        new_expires_at: Expiry,
        now: Instant,
    ) -> anyhow::Result<bool> {
        let _lock = self.guard.lock();
        let current = self.current(key)?;
        let LockRecord::Writer { owner_id: existing, expires_at } = &current else { return Ok(false) };
        if existing != owner_id || expires_at.is_expired(now) || *expires_at == Expiry::Never {
            return Ok(false);
        }
        self.engine.put(key, LockRecord::Writer { owner_id: owner_id.to_string(), expires_at: new_expires_at })?;
        Ok(true)
    }

    async fn refresh_reader_slot(
        &self,
        key: &str,
        owner_id: &str,
        new_expires_at: Expiry,
        now: Instant,
    ) -> anyhow::Result<bool> {
        let _lock = self.guard.lock();
        let current = self.current(key)?;
        let LockRecord::Reader { limit, slots } = &current else { return Ok(false) };
        let Some(expiry) = slots.get(owner_id).copied() else { return Ok(false) };
        if expiry.is_expired(now) || expiry == Expiry::Never {
            return Ok(false);
        }
        let mut new_slots = slots.clone();
        new_slots.insert(owner_id.to_string(), new_expires_at);
        self.engine.put(key, LockRecord::Reader { limit: *limit, slots: new_slots })?;
        Ok(true)
    }

    async fn release_writer(&self, key: &str, owner_id: &str, now: Instant) -> anyhow::Result<bool> {
        let _lock = self.guard.lock();
        let current = self.current(key)?;
        if current.live_writer(now) == Some(owner_id) {
            self.engine.remove(key)?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn release_reader_slot(&self, key: &str, owner_id: &str, now: Instant) -> anyhow::Result<bool> {
        let _lock = self.guard.lock();
        let current = self.current(key)?;
        let LockRecord::Reader { limit, slots } = &current else { return Ok(false) };
        let Some(expiry) = slots.get(owner_id).copied() else { return Ok(false) };
        if expiry.is_expired(now) {
            return Ok(false);
        }
        let mut new_slots = slots.clone();
        new_slots.remove(owner_id);
        if new_slots.is_empty() {
            self.engine.remove(key)?;
        } else {
            self.engine.put(key, LockRecord::Reader { limit: *limit, slots: new_slots })?;
        }
        Ok(true)
    }

    async fn force_release_writer(&self, key: &str, now: Instant) -> anyhow::Result<bool> {
        let _lock = self.guard.lock();
        let current = self.current(key)?;
        if current.live_writer(now).is_some() {
            tracing::warn!(key, "writer force-released");
            self.engine.remove(key)?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn force_release_all_readers(&self, key: &str, now: Instant) -> anyhow::Result<bool> {
        let _lock = self.guard.lock();
        let current = self.current(key)?;
        if let Some((_, live)) = current.live_reader_slots(now) {
            if !live.is_empty() {
                tracing::warn!(key, count = live.len(), "all reader slots force-released");
                self.engine.remove(key)?;
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn read(&self, key: &str, now: Instant) -> anyhow::Result<LockRecord> {
        let _lock = self.guard.lock();
        let current = self.current(key)?;
        if current.is_only_expired(now) {
            return Ok(LockRecord::Absent);
        }
        Ok(current)
    }
}

/// Sweeps `store`'s backing engine once, evicting every key whose record is
/// only-expired as of `now` (§10.5 supplemented feature). Returns the number
/// of keys removed.
///
/// Reclamation is otherwise entirely lazy (every `StorageContract` method
/// above treats an only-expired record as absent); this exists purely to
/// bound memory held by keys nobody ever touches again.
pub fn sweep_expired(engine: &dyn KvEngine, now: Instant) -> anyhow::Result<usize> {
    let mut removed = 0;
    for (key, record) in engine.snapshot()? {
        if record.is_only_expired(now) {
            engine.remove(&key)?;
            removed += 1;
        }
    }
    Ok(removed)
}

/// Spawns a background task that calls [`sweep_expired`] every
/// `config.sweep_interval`, stopping silently if `engine` is ever dropped.
///
/// `sharedlock_core::StorageContract` deliberately has no enumeration
/// method (§4.1 keeps it to one-atomic-step-per-call), so this lives here,
/// one layer below the contract, against the concrete `KvEngine` instead of
/// against `Provider`. Returns `None` if `config.sweep_interval` is `None`.
pub fn spawn_periodic_sweeper(
    engine: Arc<dyn KvEngine>,
    clock: Arc<dyn sharedlock_core::Clock>,
    config: &crate::config::StoreConfig,
) -> Option<tokio::task::JoinHandle<()>> {
    let interval = config.sweep_interval?;
    Some(tokio::spawn(async move {
        loop {
            tokio::time::sleep(interval).await;
            match sweep_expired(&*engine, clock.now()) {
                Ok(removed) if removed > 0 => tracing::debug!(removed, "periodic sweep reclaimed keys"),
                Ok(_) => {}
                Err(err) => tracing::warn!(%err, "periodic sweep failed"),
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use sharedlock_core::clock::{Clock, SystemClock, Ttl};

    use super::*;
    use crate::engines::memory::MemoryEngine;

    fn store() -> MemoryLockStore {
        MemoryLockStore::in_memory()
    }

    #[tokio::test]
    async fn writer_excludes_foreign_writer() {
        let s = store();
        let clk = SystemClock;
        let now = clk.now();

        let outcome = s.try_put_writer("a", "h1", Ttl::Never.expires_at(now), now).await.unwrap();
        assert!(outcome.acquired);

        let blocked = s.try_put_writer("a", "h2", Ttl::Never.expires_at(now), now).await.unwrap();
        assert!(!blocked.acquired);
        assert_eq!(blocked.existing_writer_owner.as_deref(), Some("h1"));
    }

    #[tokio::test]
    async fn reader_slots_respect_limit_and_idempotent_reacquire() {
        let s = store();
        let clk = SystemClock;
        let now = clk.now();
        let expires = Ttl::Never.expires_at(now);

        assert!(s.try_add_reader_slot("a", "r1", expires, 2, now).await.unwrap().added);
        assert!(s.try_add_reader_slot("a", "r2", expires, 2, now).await.unwrap().added);
        assert!(!s.try_add_reader_slot("a", "r3", expires, 2, now).await.unwrap().added);

        // Idempotent: same owner re-acquiring does not consume a new slot.
        assert!(s.try_add_reader_slot("a", "r1", expires, 2, now).await.unwrap().added);
    }

    #[tokio::test]
    async fn release_writer_requires_matching_owner() {
        let s = store();
        let clk = SystemClock;
        let now = clk.now();
        s.try_put_writer("a", "h1", Ttl::Never.expires_at(now), now).await.unwrap();

        assert!(!s.release_writer("a", "h2", now).await.unwrap());
        assert!(s.release_writer("a", "h1", now).await.unwrap());
        assert_eq!(s.read("a", now).await.unwrap(), LockRecord::Absent);
    }

    #[tokio::test]
    async fn force_release_all_readers_drains_every_slot() {
        let s = store();
        let clk = SystemClock;
        let now = clk.now();
        let expires = Ttl::Never.expires_at(now);
        s.try_add_reader_slot("a", "r1", expires, 2, now).await.unwrap();
        s.try_add_reader_slot("a", "r2", expires, 2, now).await.unwrap();

        assert!(s.force_release_all_readers("a", now).await.unwrap());
        assert_eq!(s.read("a", now).await.unwrap(), LockRecord::Absent);
        assert!(!s.force_release_all_readers("a", now).await.unwrap());
    }

    #[tokio::test]
    async fn refresh_never_ttl_is_rejected() {
        let s = store();
        let clk = SystemClock;
        let now = clk.now();
        s.try_put_writer("a", "h1", Ttl::Never.expires_at(now), now).await.unwrap();
        assert!(!s.refresh_writer("a", "h1", Expiry::At(now + 10_000), now).await.unwrap());
    }

    #[test]
    fn sweep_expired_removes_only_expired_keys() {
        let engine = MemoryEngine::new();
        engine
            .put("live", LockRecord::Writer { owner_id: "h".into(), expires_at: Expiry::At(10_000) })
            .unwrap();
        engine
            .put("dead", LockRecord::Writer { owner_id: "h".into(), expires_at: Expiry::At(0) })
            .unwrap();

        let removed = sweep_expired(&engine, 5_000).unwrap();
        assert_eq!(removed, 1);
        assert!(engine.get("dead").unwrap().is_none());
        assert!(engine.get("live").unwrap().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn periodic_sweeper_reclaims_expired_keys_on_schedule() {
        let engine: Arc<dyn KvEngine> = Arc::new(MemoryEngine::new());
        engine
            .put("dead", LockRecord::Writer { owner_id: "h".into(), expires_at: Expiry::At(0) })
            .unwrap();

        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let config = crate::config::StoreConfig { sweep_interval: Some(Duration::from_millis(10)) };
        let handle = spawn_periodic_sweeper(Arc::clone(&engine), clock, &config).unwrap();

        tokio::task::yield_now().await;
        tokio::time::advance(Duration::from_millis(15)).await;
        tokio::task::yield_now().await;

        assert!(engine.get("dead").unwrap().is_none());
        handle.abort();
    }

    #[test]
    fn no_sweeper_spawned_when_interval_is_disabled() {
        let engine: Arc<dyn KvEngine> = Arc::new(MemoryEngine::new());
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let config = crate::config::StoreConfig::default();
        assert!(spawn_periodic_sweeper(engine, clock, &config).is_none());
    }
}
