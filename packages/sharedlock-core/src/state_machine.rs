//! Per-key transition rules (§4.2) and the read-model projection (§4.3).
//!
//! Each public operation composes exactly one [`StorageContract`] mutation
//! (plus, for `get_state`, one `read`), matching
//! `server-rust/src/storage/impls/default_record_store.rs`'s
//! `DefaultRecordStore` discipline of one storage call per public method.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::clock::{Clock, Expiry, Instant, Ttl};
use crate::error::{FailedRefresh, FailedRelease};
use crate::record::Slots;
use crate::storage::StorageContract;

/// The read-model projection returned by [`get_state`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum LockState {
    /// Absent, or all stored entries have expired.
    Expired,
    /// Live writer owned by the querying handle's owner id.
    WriterAcquired {
        /// Remaining time, or `None` for "never".
        remaining: Option<Duration>,
    },
    /// Live writer owned by a different id.
    WriterUnavailable {
        /// The owner currently holding the grant.
        owner: String,
    },
    /// The querying handle's owner id has a live reader slot.
    ReaderAcquired {
        /// Stored limit (not the handle's requested limit).
        limit: u32,
        /// Owner ids of all live slots.
        acquired_slots: Vec<String>,
        /// `acquired_slots.len()`.
        acquired_slots_count: u32,
        /// `limit - acquired_slots_count`.
        free_slots_count: u32,
        /// Remaining time on the querying handle's own slot, or `None` for "never".
        remaining: Option<Duration>,
    },
    /// Reader record exists with free capacity but no slot for this handle.
    ReaderUnacquired {
        /// Stored limit.
        limit: u32,
        /// Owner ids of all live slots.
        acquired_slots: Vec<String>,
        /// `acquired_slots.len()`.
        acquired_slots_count: u32,
        /// `limit - acquired_slots_count`.
        free_slots_count: u32,
    },
    /// Reader record exists, no slot for this handle, no free capacity.
    ReaderLimitReached {
        /// Stored limit.
        limit: u32,
        /// Owner ids of all live slots.
        acquired_slots: Vec<String>,
    },
}

fn slot_owners(slots: &Slots) -> Vec<String> {
    slots.keys().cloned().collect()
}

/// Computes the writer-acquire admission call against `storage`, returning
/// whether admission succeeded (§4.2 Writer-acquire).
///
/// A `false` result does not mutate the record -- `try_put_writer` itself
/// guarantees that for a blocked decision.
pub async fn try_acquire_writer(
    storage: &dyn StorageContract,
    clock: &dyn Clock,
    key: &str,
    owner_id: &str,
    ttl: Ttl,
) -> anyhow::Result<bool> {
    let now = clock.now();
    let expires_at = ttl.expires_at(now);
    let outcome = storage.try_put_writer(key, owner_id, expires_at, now).await?;
    Ok(outcome.acquired)
}

/// Releases a writer grant owned by `owner_id` (§4.2 Writer-release).
pub async fn release_writer(
    storage: &dyn StorageContract,
    clock: &dyn Clock,
    key: &str,
    owner_id: &str,
) -> anyhow::Result<Result<(), FailedRelease>> {
    let now = clock.now();
    if storage.release_writer(key, owner_id, now).await? {
        Ok(Ok(()))
    } else {
        Ok(Err(FailedRelease::Writer {
            key: key.to_string(),
            owner_id: owner_id.to_string(),
        }))
    }
}

/// Extends a writer grant's TTL (§4.2 Writer-refresh). Refreshing a
/// "never"-TTL grant is rejected by the storage contract itself, not here.
pub async fn refresh_writer(
    storage: &dyn StorageContract,
    clock: &dyn Clock,
    key: &str,
    owner_id: &str,
    new_ttl: Duration,
) -> anyhow::Result<Result<(), FailedRefresh>> {
    let now = clock.now();
    let new_expires_at = Expiry::At(now.saturating_add(
        i64::try_from(new_ttl.as_millis()).unwrap_or(i64::MAX),
    ));
    if storage.refresh_writer(key, owner_id, new_expires_at, now).await? {
        Ok(Ok(()))
    } else {
        Ok(Err(FailedRefresh::Writer {
            key: key.to_string(),
            owner_id: owner_id.to_string(),
        }))
    }
}

/// Removes a live writer grant regardless of owner (§4.2 Writer force-release).
pub async fn force_release_writer(
    storage: &dyn StorageContract,
    clock: &dyn Clock,
    key: &str,
) -> anyhow::Result<bool> {
    storage.force_release_writer(key, clock.now()).await
}

/// Attempts to add a reader slot for `owner_id` (§4.2 Reader-acquire).
pub async fn try_acquire_reader(
    storage: &dyn StorageContract,
    clock: &dyn Clock,
    key: &str,
    owner_id: &str,
    ttl: Ttl,
    requested_limit: u32,
) -> anyhow::Result<bool> {
    let now = clock.now();
    let expires_at = ttl.expires_at(now);
    let outcome = storage
        .try_add_reader_slot(key, owner_id, expires_at, requested_limit, now)
        .await?;
    Ok(outcome.added)
}

/// Releases `owner_id`'s reader slot (§4.2 Reader-release).
pub async fn release_reader(
    storage: &dyn StorageContract,
    clock: &dyn Clock,
    key: &str,
    owner_id: &str,
) -> anyhow::Result<Result<(), FailedRelease>> {
    let now = clock.now();
    if storage.release_reader_slot(key, owner_id, now).await? {
        Ok(Ok(()))
    } else {
        Ok(Err(FailedRelease::Reader {
            key: key.to_string(),
            owner_id: owner_id.to_string(),
        }))
    }
}

/// Extends `owner_id`'s reader slot TTL (§4.2 Reader-refresh).
pub async fn refresh_reader(
    storage: &dyn StorageContract,
    clock: &dyn Clock,
    key: &str,
    owner_id: &str,
    new_ttl: Duration,
) -> anyhow::Result<Result<(), FailedRefresh>> {
    let now = clock.now();
    let new_expires_at = Expiry::At(now.saturating_add(
        i64::try_from(new_ttl.as_millis()).unwrap_or(i64::MAX),
    ));
    if storage.refresh_reader_slot(key, owner_id, new_expires_at, now).await? {
        Ok(Ok(()))
    } else {
        Ok(Err(FailedRefresh::Reader {
            key: key.to_string(),
            owner_id: owner_id.to_string(),
        }))
    }
}

/// Removes all live reader slots regardless of owner (§4.2 Reader force-release-all).
pub async fn force_release_all_readers(
    storage: &dyn StorageContract,
    clock: &dyn Clock,
    key: &str,
) -> anyhow::Result<bool> {
    storage.force_release_all_readers(key, clock.now()).await
}

/// Deletes whichever live record (writer or reader-with-live-slots) exists
/// for `key` (§4.2 Cross-mode force-release).
pub async fn force_release(
    storage: &dyn StorageContract,
    clock: &dyn Clock,
    key: &str,
) -> anyhow::Result<bool> {
    let now = clock.now();
    if storage.force_release_writer(key, now).await? {
        return Ok(true);
    }
    storage.force_release_all_readers(key, now).await
}

/// Computes the projected state (§4.3) for the querying `owner_id` on `key`.
/// A pure read: never mutates the record.
pub async fn get_state(
    storage: &dyn StorageContract,
    clock: &dyn Clock,
    key: &str,
    owner_id: &str,
) -> anyhow::Result<LockState> {
    let now = clock.now();
    let record = storage.read(key, now).await?;

    if let Some(writer_owner) = record.live_writer(now) {
        return Ok(if writer_owner == owner_id {
            let expires_at = match &record {
                crate::record::LockRecord::Writer { expires_at, .. } => *expires_at,
                _ => unreachable!(),
            };
            LockState::WriterAcquired { remaining: expires_at.remaining(now) }
        } else {
            LockState::WriterUnavailable { owner: writer_owner.to_string() }
        });
    }

    if let Some((limit, live_slots)) = record.live_reader_slots(now) {
        if live_slots.is_empty() && record.is_only_expired(now) {
            return Ok(LockState::Expired);
        }
        let acquired_slots = slot_owners(&live_slots);
        #[allow(clippy::cast_possible_truncation)]
        let acquired_slots_count = acquired_slots.len() as u32;
        let free_slots_count = limit.saturating_sub(acquired_slots_count);

        return Ok(if let Some(expiry) = live_slots.get(owner_id) {
            LockState::ReaderAcquired {
                limit,
                acquired_slots,
                acquired_slots_count,
                free_slots_count,
                remaining: expiry.remaining(now),
            }
        } else if free_slots_count > 0 {
            LockState::ReaderUnacquired {
                limit,
                acquired_slots,
                acquired_slots_count,
                free_slots_count,
            }
        } else {
            LockState::ReaderLimitReached { limit, acquired_slots }
        });
    }

    Ok(LockState::Expired)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::clock::SystemClock;
    use crate::test_support::TestStorage;

    fn clock() -> Arc<SystemClock> {
        Arc::new(SystemClock)
    }

    #[tokio::test]
    async fn writer_exclusivity_scenario() {
        let storage = TestStorage::default();
        let clk = clock();

        assert!(try_acquire_writer(&storage, &*clk, "a", "h1", Ttl::Never).await.unwrap());
        assert!(!try_acquire_writer(&storage, &*clk, "a", "h2", Ttl::Never).await.unwrap());
        assert!(release_writer(&storage, &*clk, "a", "h1").await.unwrap().is_ok());
        assert!(try_acquire_writer(&storage, &*clk, "a", "h2", Ttl::Never).await.unwrap());
    }

    #[tokio::test]
    async fn reader_fan_in_with_limit_scenario() {
        let storage = TestStorage::default();
        let clk = clock();

        assert!(try_acquire_reader(&storage, &*clk, "a", "A", Ttl::Never, 2).await.unwrap());
        assert!(try_acquire_reader(&storage, &*clk, "a", "B", Ttl::Never, 2).await.unwrap());
        assert!(!try_acquire_reader(&storage, &*clk, "a", "C", Ttl::Never, 2).await.unwrap());

        let state = get_state(&storage, &*clk, "a", "C").await.unwrap();
        match state {
            LockState::ReaderLimitReached { limit, mut acquired_slots } => {
                acquired_slots.sort();
                assert_eq!(limit, 2);
                assert_eq!(acquired_slots, vec!["A".to_string(), "B".to_string()]);
            }
            other => panic!("unexpected state: {other:?}"),
        }

        assert!(release_reader(&storage, &*clk, "a", "A").await.unwrap().is_ok());
        assert!(try_acquire_reader(&storage, &*clk, "a", "C", Ttl::Never, 2).await.unwrap());
    }

    #[tokio::test]
    async fn writer_blocks_reader_and_drains_scenario() {
        let storage = TestStorage::default();
        let clk = clock();

        assert!(try_acquire_writer(&storage, &*clk, "a", "H1", Ttl::Never).await.unwrap());
        assert!(!try_acquire_reader(&storage, &*clk, "a", "H2", Ttl::Never, 3).await.unwrap());
        assert!(release_writer(&storage, &*clk, "a", "H1").await.unwrap().is_ok());
        assert!(try_acquire_reader(&storage, &*clk, "a", "H2", Ttl::Never, 3).await.unwrap());
        assert!(!try_acquire_writer(&storage, &*clk, "a", "H3", Ttl::Never).await.unwrap());
    }

    #[tokio::test]
    async fn ttl_expiry_reclamation_scenario() {
        let storage = TestStorage::default();
        let clk = clock();

        assert!(try_acquire_writer(&storage, &*clk, "a", "H1", Ttl::Finite(Duration::from_millis(50)))
            .await
            .unwrap());
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(try_acquire_writer(&storage, &*clk, "a", "H2", Ttl::Never).await.unwrap());
        assert!(release_writer(&storage, &*clk, "a", "H1").await.unwrap().is_err());
    }

    #[tokio::test]
    async fn idempotent_reacquire_scenario() {
        let storage = TestStorage::default();
        let clk = clock();

        assert!(try_acquire_writer(&storage, &*clk, "a", "H", Ttl::Finite(Duration::from_millis(50)))
            .await
            .unwrap());
        assert!(try_acquire_writer(&storage, &*clk, "a", "H", Ttl::Finite(Duration::from_millis(50)))
            .await
            .unwrap());
        assert!(release_writer(&storage, &*clk, "a", "H").await.unwrap().is_ok());
        assert!(release_writer(&storage, &*clk, "a", "H").await.unwrap().is_err());
    }

    #[tokio::test]
    async fn limit_increase_after_full_drain_scenario() {
        let storage = TestStorage::default();
        let clk = clock();

        assert!(try_acquire_reader(&storage, &*clk, "a", "A", Ttl::Never, 2).await.unwrap());
        assert!(try_acquire_reader(&storage, &*clk, "a", "B", Ttl::Never, 2).await.unwrap());
        assert!(release_reader(&storage, &*clk, "a", "A").await.unwrap().is_ok());
        assert!(release_reader(&storage, &*clk, "a", "B").await.unwrap().is_ok());

        assert!(try_acquire_reader(&storage, &*clk, "a", "C", Ttl::Never, 3).await.unwrap());
        let state = get_state(&storage, &*clk, "a", "C").await.unwrap();
        match state {
            LockState::ReaderAcquired { limit, .. } => assert_eq!(limit, 3),
            other => panic!("unexpected state: {other:?}"),
        }
    }

    #[tokio::test]
    async fn get_state_does_not_mutate() {
        let storage = TestStorage::default();
        let clk = clock();
        assert!(try_acquire_writer(&storage, &*clk, "a", "H", Ttl::Never).await.unwrap());

        let _ = get_state(&storage, &*clk, "a", "other").await.unwrap();
        let _ = get_state(&storage, &*clk, "a", "other").await.unwrap();

        // Still live and owned by H -- a read never altered the record.
        let state = get_state(&storage, &*clk, "a", "H").await.unwrap();
        assert!(matches!(state, LockState::WriterAcquired { .. }));
    }

    #[tokio::test]
    async fn force_release_permits_fresh_acquire() {
        let storage = TestStorage::default();
        let clk = clock();
        assert!(try_acquire_writer(&storage, &*clk, "a", "H1", Ttl::Never).await.unwrap());
        assert!(force_release(&storage, &*clk, "a").await.unwrap());
        assert!(try_acquire_writer(&storage, &*clk, "a", "H2", Ttl::Never).await.unwrap());
    }

    #[tokio::test]
    async fn refresh_never_ttl_rejected() {
        let storage = TestStorage::default();
        let clk = clock();
        assert!(try_acquire_writer(&storage, &*clk, "a", "H", Ttl::Never).await.unwrap());
        let res = refresh_writer(&storage, &*clk, "a", "H", Duration::from_secs(10)).await.unwrap();
        assert!(res.is_err());
    }
}
