//! Event taxonomy and fan-out bus (§6.2).
//!
//! Grounded in `server-rust/src/storage/mutation_observer.rs`'s
//! `MutationObserver`/`CompositeMutationObserver` pair: a registry of
//! `Arc<dyn Fn>` handlers behind a lock, fanned out to every registered
//! listener per publish. Delivery is at-least-once to currently-registered
//! listeners; order within one key is emission order because the registry
//! lock serializes publishes.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::clock::Ttl;
use crate::state_machine::LockState;

/// The kind of lifecycle event emitted by the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Successful writer acquire (including idempotent same-owner).
    WriterAcquired,
    /// Any failed acquire attempt (reader or writer), including each retry.
    Unavailable,
    /// Successful same-owner writer release.
    WriterReleased,
    /// Release attempt that did not remove a live writer.
    WriterFailedRelease,
    /// Successful writer refresh.
    WriterRefreshed,
    /// Refresh attempt that did not update TTL.
    WriterFailedRefresh,
    /// Force-release attempted (payload carries whether anything was released).
    WriterForceReleased,
    /// Each successful reader-slot addition, including idempotent repeats.
    ReaderAcquired,
    /// Successful same-owner reader release.
    ReaderReleased,
    /// Reader release attempt that did not remove a live slot.
    ReaderFailedRelease,
    /// Successful reader-slot refresh.
    ReaderRefreshed,
    /// Reader-slot refresh that failed.
    ReaderFailedRefresh,
    /// Force-release-all attempted (payload carries whether anything was released).
    ReaderAllForceReleased,
}

/// All thirteen event kinds, in taxonomy order. Used to size/iterate registries.
pub const ALL_EVENT_KINDS: [EventKind; 13] = [
    EventKind::WriterAcquired,
    EventKind::Unavailable,
    EventKind::WriterReleased,
    EventKind::WriterFailedRelease,
    EventKind::WriterRefreshed,
    EventKind::WriterFailedRefresh,
    EventKind::WriterForceReleased,
    EventKind::ReaderAcquired,
    EventKind::ReaderReleased,
    EventKind::ReaderFailedRelease,
    EventKind::ReaderRefreshed,
    EventKind::ReaderFailedRefresh,
    EventKind::ReaderAllForceReleased,
];

/// Payload carried by every lifecycle event: a handle-view plus the
/// post-commit projected state (§9 open question, resolved as post-commit).
#[derive(Debug, Clone)]
pub struct LockEvent {
    /// The key the event concerns.
    pub key: String,
    /// The owner id of the handle that triggered the event.
    pub owner_id: String,
    /// The TTL that handle requested.
    pub requested_ttl: Ttl,
    /// The projected state observed immediately after the committing step.
    pub state: LockState,
    /// Set only for `WRITER_FORCE_RELEASED` / `READER_ALL_FORCE_RELEASED`:
    /// whether a live grant was actually removed.
    pub has_released: Option<bool>,
}

/// A registered event handler.
pub type Listener = Arc<dyn Fn(&LockEvent) + Send + Sync>;

/// Subscription + fan-out point for lifecycle events.
///
/// Used as `Arc<dyn EventBus>`. Implementations must tolerate concurrent
/// subscribe/publish (§5 shared-resource policy).
pub trait EventBus: Send + Sync {
    /// Registers `handler` to be invoked on every event of `kind`.
    fn add_listener(&self, kind: EventKind, handler: Listener);

    /// Publishes `event` of `kind` to every currently-registered listener.
    fn publish(&self, kind: EventKind, event: &LockEvent);

    /// Number of listeners currently registered for `kind`. Diagnostics only.
    fn listener_count(&self, kind: EventKind) -> usize;
}

/// In-process, synchronous fan-out [`EventBus`].
///
/// Mirrors `CompositeMutationObserver`: a `Vec` of listeners per event kind,
/// iterated in registration order on publish. Registration and publish both
/// take a short-lived lock; handlers run synchronously on the publishing
/// task, so a synchronous listener observes the new state before the public
/// operation returns to its caller (§5 ordering guarantees).
#[derive(Default)]
pub struct InProcessEventBus {
    listeners: Mutex<std::collections::HashMap<EventKind, Vec<Listener>>>,
}

impl InProcessEventBus {
    /// Creates an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl EventBus for InProcessEventBus {
    fn add_listener(&self, kind: EventKind, handler: Listener) {
        self.listeners.lock().entry(kind).or_default().push(handler);
    }

    fn publish(&self, kind: EventKind, event: &LockEvent) {
        let handlers = self.listeners.lock().get(&kind).cloned().unwrap_or_default();
        for handler in &handlers {
            handler(event);
        }
    }

    fn listener_count(&self, kind: EventKind) -> usize {
        self.listeners.lock().get(&kind).map_or(0, Vec::len)
    }
}
