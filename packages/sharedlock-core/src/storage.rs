//! The storage contract the state machine is expressed over.
//!
//! Mirrors `server-rust/src/storage/record_store.rs`'s `RecordStore` trait:
//! an `async_trait`, object-safe, `Send + Sync` interface where every method
//! is one atomic step. All atomicity for concurrent peers operating on the
//! same key lives in the implementation of this trait, not in the state
//! machine that drives it.

use async_trait::async_trait;

use crate::clock::{Expiry, Instant};
use crate::record::Slots;

/// Outcome of a writer-acquire attempt against the backing store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutWriterOutcome {
    /// Whether the writer grant was created or idempotently renewed.
    pub acquired: bool,
    /// The foreign live writer that blocked admission, if any.
    pub existing_writer_owner: Option<String>,
    /// The live reader slots that blocked admission, if any.
    pub existing_reader_slots: Option<Slots>,
}

impl PutWriterOutcome {
    /// An outcome representing a successful acquire (fresh or renewed).
    #[must_use]
    pub fn acquired() -> Self {
        Self {
            acquired: true,
            existing_writer_owner: None,
            existing_reader_slots: None,
        }
    }

    /// An outcome representing admission blocked by a foreign live writer.
    #[must_use]
    pub fn blocked_by_writer(owner: String) -> Self {
        Self {
            acquired: false,
            existing_writer_owner: Some(owner),
            existing_reader_slots: None,
        }
    }

    /// An outcome representing admission blocked by live reader slots.
    #[must_use]
    pub fn blocked_by_readers(slots: Slots) -> Self {
        Self {
            acquired: false,
            existing_writer_owner: None,
            existing_reader_slots: Some(slots),
        }
    }
}

/// Outcome of a reader-slot-acquire attempt against the backing store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddReaderSlotOutcome {
    /// Whether a slot was added (or already held idempotently).
    pub added: bool,
    /// The limit in effect after this call (stored limit, not the request).
    pub effective_limit: u32,
    /// Live slots after this call (empty if `added` is false and no record exists).
    pub current_slots: Slots,
}

/// The narrow, CAS-capable interface the state machine drives.
///
/// Implementations must provide atomicity at the granularity of one method
/// call: no method composes internal steps that a concurrent peer could
/// observe half-applied. All mutating methods treat expired entries as
/// absent for admission purposes but must clean them when they touch the
/// record (invariant I4).
#[async_trait]
pub trait StorageContract: Send + Sync {
    /// Attempts to install `owner_id` as the exclusive writer for `key`.
    ///
    /// Succeeds if the record is absent or only-expired (replacing it), or if
    /// a live writer with the same `owner_id` already holds it (idempotent
    /// renewal without moving `expires_at`). Fails against a foreign live
    /// writer or any live reader slot.
    async fn try_put_writer(
        &self,
        key: &str,
        owner_id: &str,
        expires_at: Expiry,
        now: Instant,
    ) -> anyhow::Result<PutWriterOutcome>;

    /// Attempts to add a reader slot for `owner_id` on `key`.
    ///
    /// If absent/only-expired, creates a reader record with `limit =
    /// requested_limit`. If a live reader record exists, `requested_limit` is
    /// ignored and the stored limit applies; the slot is added iff there is
    /// free capacity or `owner_id` already holds a live slot (idempotent).
    /// Fails against a live foreign writer.
    async fn try_add_reader_slot(
        &self,
        key: &str,
        owner_id: &str,
        expires_at: Expiry,
        requested_limit: u32,
        now: Instant,
    ) -> anyhow::Result<AddReaderSlotOutcome>;

    /// Extends a live writer grant's TTL. Fails if the record is not a live
    /// writer owned by `owner_id`, or if its current expiry is `Expiry::Never`.
    async fn refresh_writer(
        &self,
        key: &str,
        owner_id: &str,
        new_expires_at: Expiry,
        now: Instant,
    ) -> anyhow::Result<bool>;

    /// Extends a live reader slot's TTL. Fails if no live slot for `owner_id`
    /// exists, or if its current expiry is `Expiry::Never`.
    async fn refresh_reader_slot(
        &self,
        key: &str,
        owner_id: &str,
        new_expires_at: Expiry,
        now: Instant,
    ) -> anyhow::Result<bool>;

    /// Deletes the record iff it is a live writer owned by `owner_id`.
    async fn release_writer(&self, key: &str, owner_id: &str, now: Instant) -> anyhow::Result<bool>;

    /// Removes `owner_id`'s live slot. Deletes the record if that was the last slot.
    async fn release_reader_slot(
        &self,
        key: &str,
        owner_id: &str,
        now: Instant,
    ) -> anyhow::Result<bool>;

    /// Deletes the record iff it is a live writer (any owner).
    async fn force_release_writer(&self, key: &str, now: Instant) -> anyhow::Result<bool>;

    /// Deletes the record iff it is a reader record with at least one live slot.
    async fn force_release_all_readers(&self, key: &str, now: Instant) -> anyhow::Result<bool>;

    /// Returns the live record for `key`, never exposing expired entries.
    async fn read(&self, key: &str, now: Instant) -> anyhow::Result<crate::record::LockRecord>;
}

/// Reference decision tree shared by every [`StorageContract`] implementation
/// for `try_put_writer`, factored out so backends don't each re-derive it.
///
/// `current` is the raw stored record (possibly with expired entries still
/// present); the backend is responsible for actually persisting the
/// replacement this function recommends.
#[must_use]
pub fn decide_put_writer(
    current: &crate::record::LockRecord,
    owner_id: &str,
    now: Instant,
) -> PutWriterDecision {
    use crate::record::LockRecord;

    if current.is_only_expired(now) {
        return PutWriterDecision::Replace;
    }

    match current {
        LockRecord::Writer { owner_id: existing, .. } if existing == owner_id => {
            PutWriterDecision::RenewSameOwner
        }
        LockRecord::Writer { owner_id: existing, .. } => {
            PutWriterDecision::Blocked(PutWriterOutcome::blocked_by_writer(existing.clone()))
        }
        LockRecord::Reader { .. } => {
            let (_, live) = current.live_reader_slots(now).unwrap_or_default();
            PutWriterDecision::Blocked(PutWriterOutcome::blocked_by_readers(live))
        }
        LockRecord::Absent => unreachable!("is_only_expired already handled Absent"),
    }
}

/// Result of [`decide_put_writer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PutWriterDecision {
    /// Replace the record with a fresh writer grant.
    Replace,
    /// Renew the existing grant in place (no TTL change).
    RenewSameOwner,
    /// Admission denied; carries the blocker for the caller.
    Blocked(PutWriterOutcome),
}

impl PutWriterDecision {
    /// Convenience: the outcome for a successful (replace or renew) decision.
    #[must_use]
    pub fn accepted_outcome() -> PutWriterOutcome {
        PutWriterOutcome::acquired()
    }
}
