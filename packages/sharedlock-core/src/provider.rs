//! The [`Provider`]: handle factory and event dispatcher (§4.4).
//!
//! Grounded in `server-rust/src/storage/factory.rs`'s `RecordStoreFactory`:
//! a small struct holding shared collaborator references (here: storage +
//! event bus) that mints per-call objects. The provider borrows its
//! collaborators and never retains per-handle state -- handles are
//! disposable values with no back-pointer to the provider (§9 "Cycles and
//! ownership").

use std::sync::Arc;
use std::time::Duration;

use crate::clock::{Clock, SystemClock, Ttl};
use crate::error::{FailedRefresh, FailedRelease};
use crate::events::{EventBus, EventKind, LockEvent};
use crate::handle::Handle;
use crate::state_machine::{self, LockState};
use crate::storage::StorageContract;

/// Factory and dispatcher: mints [`Handle`]s, holds the storage and
/// event-bus references, and publishes exactly one event per committed
/// transition.
pub struct Provider {
    storage: Arc<dyn StorageContract>,
    events: Arc<dyn EventBus>,
    clock: Arc<dyn Clock>,
}

impl Provider {
    /// Creates a provider over the given storage and event bus, using the
    /// real system clock.
    #[must_use]
    pub fn new(storage: Arc<dyn StorageContract>, events: Arc<dyn EventBus>) -> Self {
        Self::with_clock(storage, events, Arc::new(SystemClock))
    }

    /// Creates a provider with an injected clock, for deterministic tests.
    #[must_use]
    pub fn with_clock(
        storage: Arc<dyn StorageContract>,
        events: Arc<dyn EventBus>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { storage, events, clock }
    }

    /// Mints a handle with a freshly generated owner id.
    #[must_use]
    pub fn create(&self, key: impl Into<String>, ttl: Ttl, limit: u32) -> Handle {
        Handle::new(key, ttl, limit)
    }

    /// Mints a handle addressing a caller-supplied owner id (federated case, §9).
    #[must_use]
    pub fn create_with_owner(
        &self,
        key: impl Into<String>,
        owner_id: impl Into<String>,
        ttl: Ttl,
        limit: u32,
    ) -> Handle {
        Handle::with_owner(key, owner_id, ttl, limit)
    }

    /// Registers `handler` for events of `kind`.
    pub fn add_listener(
        &self,
        kind: EventKind,
        handler: Arc<dyn Fn(&LockEvent) + Send + Sync>,
    ) {
        self.events.add_listener(kind, handler);
    }

    async fn publish_state(&self, kind: EventKind, handle: &Handle, has_released: Option<bool>) {
        let state = self
            .projected_state(handle)
            .await
            .unwrap_or(LockState::Expired);
        let event = LockEvent {
            key: handle.key().to_string(),
            owner_id: handle.owner_id().to_string(),
            requested_ttl: handle.requested_ttl(),
            state,
            has_released,
        };
        self.events.publish(kind, &event);
    }

    /// Pure projection of the current state for `handle`. Never mutates.
    pub async fn projected_state(&self, handle: &Handle) -> anyhow::Result<LockState> {
        state_machine::get_state(&*self.storage, &*self.clock, handle.key(), handle.owner_id()).await
    }

    /// The clock this provider was built with. Exposed crate-internally so
    /// the blocking-retry driver can measure deadlines against the same
    /// notion of "now" the state machine uses.
    pub(crate) fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    /// Attempts a writer acquire for `handle`, publishing `WRITER_ACQUIRED`
    /// or `UNAVAILABLE` on commit.
    pub async fn acquire_writer(&self, handle: &Handle) -> anyhow::Result<bool> {
        let acquired = state_machine::try_acquire_writer(
            &*self.storage,
            &*self.clock,
            handle.key(),
            handle.owner_id(),
            handle.requested_ttl(),
        )
        .await?;

        let kind = if acquired { EventKind::WriterAcquired } else { EventKind::Unavailable };
        if acquired {
            tracing::debug!(key = handle.key(), owner_id = handle.owner_id(), "writer acquired");
        } else {
            tracing::debug!(key = handle.key(), owner_id = handle.owner_id(), "writer acquire blocked");
        }
        self.publish_state(kind, handle, None).await;
        Ok(acquired)
    }

    /// Releases `handle`'s writer grant, publishing `WRITER_RELEASED` or
    /// `WRITER_FAILED_RELEASE`.
    pub async fn release_writer(&self, handle: &Handle) -> anyhow::Result<Result<(), FailedRelease>> {
        let result =
            state_machine::release_writer(&*self.storage, &*self.clock, handle.key(), handle.owner_id())
                .await?;
        let kind = if result.is_ok() { EventKind::WriterReleased } else { EventKind::WriterFailedRelease };
        self.publish_state(kind, handle, None).await;
        Ok(result)
    }

    /// Extends `handle`'s writer grant, publishing `WRITER_REFRESHED` or
    /// `WRITER_FAILED_REFRESH`.
    pub async fn refresh_writer(
        &self,
        handle: &Handle,
        new_ttl: Duration,
    ) -> anyhow::Result<Result<(), FailedRefresh>> {
        let result = state_machine::refresh_writer(
            &*self.storage,
            &*self.clock,
            handle.key(),
            handle.owner_id(),
            new_ttl,
        )
        .await?;
        let kind = if result.is_ok() { EventKind::WriterRefreshed } else { EventKind::WriterFailedRefresh };
        self.publish_state(kind, handle, None).await;
        Ok(result)
    }

    /// Force-releases any live writer for `handle`'s key, publishing
    /// `WRITER_FORCE_RELEASED` with `has_released` set.
    pub async fn force_release_writer(&self, handle: &Handle) -> anyhow::Result<bool> {
        let released = state_machine::force_release_writer(&*self.storage, &*self.clock, handle.key()).await?;
        if released {
            tracing::warn!(key = handle.key(), "writer force-released");
        }
        self.publish_state(EventKind::WriterForceReleased, handle, Some(released)).await;
        Ok(released)
    }

    /// Attempts a reader-slot acquire for `handle`, publishing `READER_ACQUIRED`
    /// or `UNAVAILABLE` on commit.
    pub async fn acquire_reader(&self, handle: &Handle) -> anyhow::Result<bool> {
        let added = state_machine::try_acquire_reader(
            &*self.storage,
            &*self.clock,
            handle.key(),
            handle.owner_id(),
            handle.requested_ttl(),
            handle.requested_limit(),
        )
        .await?;
        let kind = if added { EventKind::ReaderAcquired } else { EventKind::Unavailable };
        self.publish_state(kind, handle, None).await;
        Ok(added)
    }

    /// Releases `handle`'s reader slot, publishing `READER_RELEASED` or
    /// `READER_FAILED_RELEASE`.
    pub async fn release_reader(&self, handle: &Handle) -> anyhow::Result<Result<(), FailedRelease>> {
        let result =
            state_machine::release_reader(&*self.storage, &*self.clock, handle.key(), handle.owner_id())
                .await?;
        let kind = if result.is_ok() { EventKind::ReaderReleased } else { EventKind::ReaderFailedRelease };
        self.publish_state(kind, handle, None).await;
        Ok(result)
    }

    /// Extends `handle`'s reader-slot TTL, publishing `READER_REFRESHED` or
    /// `READER_FAILED_REFRESH`.
    pub async fn refresh_reader(
        &self,
        handle: &Handle,
        new_ttl: Duration,
    ) -> anyhow::Result<Result<(), FailedRefresh>> {
        let result = state_machine::refresh_reader(
            &*self.storage,
            &*self.clock,
            handle.key(),
            handle.owner_id(),
            new_ttl,
        )
        .await?;
        let kind = if result.is_ok() { EventKind::ReaderRefreshed } else { EventKind::ReaderFailedRefresh };
        self.publish_state(kind, handle, None).await;
        Ok(result)
    }

    /// Force-releases all live reader slots for `handle`'s key, publishing
    /// `READER_ALL_FORCE_RELEASED` with `has_released` set.
    pub async fn force_release_all_readers(&self, handle: &Handle) -> anyhow::Result<bool> {
        let released =
            state_machine::force_release_all_readers(&*self.storage, &*self.clock, handle.key()).await?;
        if released {
            tracing::warn!(key = handle.key(), "all reader slots force-released");
        }
        self.publish_state(EventKind::ReaderAllForceReleased, handle, Some(released)).await;
        Ok(released)
    }

    /// Deletes whichever live record (writer or reader) exists for `handle`'s key.
    pub async fn force_release(&self, handle: &Handle) -> anyhow::Result<bool> {
        state_machine::force_release(&*self.storage, &*self.clock, handle.key()).await
    }
}
