//! `sharedlock` core -- storage contract, state machine, handle, provider,
//! blocking-retry driver, and scoped-execution helpers for a distributed
//! shared reader/writer lock.
//!
//! This crate provides the storage-agnostic layer of the lock service:
//!
//! - **Clock** ([`clock`]): monotonic time abstraction (`Clock`, `Ttl`, `Expiry`)
//! - **Record** ([`record`]): the authoritative per-key tagged union (`LockRecord`)
//! - **Storage** ([`storage`]): the narrow CAS-capable backend contract (`StorageContract`)
//! - **State machine** ([`state_machine`]): per-key transition rules and state projection
//! - **Handle** ([`handle`]): the caller-side `{key, owner_id, ttl, limit}` value
//! - **Events** ([`events`]): lifecycle event taxonomy and fan-out bus
//! - **Provider** ([`provider`]): handle factory and event dispatcher
//! - **Retry** ([`retry`]): blocking-retry acquire driver
//! - **Scoped** ([`scoped`]): run-scoped acquire/work/release helpers
//! - **Error** ([`error`]): domain error taxonomy for the `*_or_fail` helpers

pub mod clock;
pub mod error;
pub mod events;
pub mod handle;
pub mod provider;
pub mod record;
pub mod retry;
pub mod scoped;
pub mod state_machine;
pub mod storage;

#[cfg(test)]
pub(crate) mod test_support;

pub use clock::{Clock, Expiry, Instant, SystemClock, Ttl};
pub use error::{AcquireError, FailedAcquireWriter, FailedRefresh, FailedRelease, LimitReachedReader};
pub use events::{EventBus, EventKind, InProcessEventBus, LockEvent, Listener};
pub use handle::Handle;
pub use provider::Provider;
pub use record::{LockRecord, Slots};
pub use state_machine::LockState;
pub use storage::{AddReaderSlotOutcome, PutWriterOutcome, StorageContract};
