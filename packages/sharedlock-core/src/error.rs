//! Domain error taxonomy (§7).
//!
//! Mirrors `server-rust/src/service/operation.rs`'s
//! `OperationError`/`ClassifyError` shape: a `thiserror`-derived enum per
//! failure family, constructed only by the base (boolean-returning)
//! operations and surfaced as `Err` only from the `*_or_fail` helpers.
//! Storage-adapter failures are never wrapped here -- they propagate as
//! `anyhow::Error` straight through.

use thiserror::Error;

/// Writer acquisition did not succeed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("failed to acquire writer for key {key:?}")]
pub struct FailedAcquireWriter {
    /// The key acquisition was attempted against.
    pub key: String,
}

/// Reader acquisition did not succeed because the limit was reached or a
/// writer holds the key.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("reader limit reached for key {key:?}")]
pub struct LimitReachedReader {
    /// The key acquisition was attempted against.
    pub key: String,
}

/// A release attempted but no live grant matched the owner.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FailedRelease {
    /// No live writer grant matched the owner.
    #[error("no live writer grant for key {key:?} owned by {owner_id:?}")]
    Writer {
        /// The key release was attempted against.
        key: String,
        /// The owner id that attempted the release.
        owner_id: String,
    },
    /// No live reader slot matched the owner.
    #[error("no live reader slot for key {key:?} owned by {owner_id:?}")]
    Reader {
        /// The key release was attempted against.
        key: String,
        /// The owner id that attempted the release.
        owner_id: String,
    },
}

/// A refresh attempted but no refreshable grant matched.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FailedRefresh {
    /// No refreshable writer grant (unknown key, foreign owner, expired, or "never" TTL).
    #[error("cannot refresh writer grant for key {key:?} owned by {owner_id:?}")]
    Writer {
        /// The key refresh was attempted against.
        key: String,
        /// The owner id that attempted the refresh.
        owner_id: String,
    },
    /// No refreshable reader slot (unknown key, foreign owner, expired, or "never" TTL).
    #[error("cannot refresh reader slot for key {key:?} owned by {owner_id:?}")]
    Reader {
        /// The key refresh was attempted against.
        key: String,
        /// The owner id that attempted the refresh.
        owner_id: String,
    },
}

/// Errors raised by the `*_or_fail` scoped-execution and acquire helpers.
#[derive(Debug, Error)]
pub enum AcquireError<E: std::error::Error + 'static> {
    /// Writer acquisition did not succeed.
    #[error(transparent)]
    FailedAcquireWriter(#[from] FailedAcquireWriter),
    /// Reader acquisition did not succeed: the limit was reached or a writer
    /// holds the key.
    #[error(transparent)]
    LimitReachedReader(#[from] LimitReachedReader),
    /// The caller-supplied work function failed; propagated unchanged.
    #[error(transparent)]
    Work(E),
}
