//! Monotonic time abstraction for expiry math.
//!
//! Mirrors `core-rust/src/hlc.rs`'s `ClockSource`/`SystemClock` split:
//! production code drives everything off wall-clock time, but the state
//! machine and its tests depend only on the [`Clock`] trait so TTL expiry
//! can be tested without real sleeps.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// A point in time, expressed as milliseconds since the Unix epoch.
///
/// Comparable and totally ordered; the state machine never inspects the
/// wall-clock meaning of the value, only relative ordering and arithmetic.
pub type Instant = i64;

/// Abstraction over "now" for dependency injection.
///
/// Allows deterministic testing by swapping in a virtual clock. The default
/// [`SystemClock`] delegates to `std::time::SystemTime`.
pub trait Clock: Send + Sync {
    /// Returns the current time as milliseconds since the Unix epoch.
    fn now(&self) -> Instant;
}

/// Default clock that reads the real system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        #[allow(clippy::cast_possible_wrap)]
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as i64;
        millis
    }
}

/// A TTL as supplied by a caller: either a positive duration or "never expires".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ttl {
    /// Expires `Duration` after acquisition/refresh.
    Finite(Duration),
    /// Never expires; must be explicitly released or force-released.
    Never,
}

impl Ttl {
    /// Computes the absolute expiry instant for this TTL starting at `now`.
    #[must_use]
    pub fn expires_at(self, now: Instant) -> Expiry {
        match self {
            Ttl::Finite(d) => {
                #[allow(clippy::cast_possible_wrap, clippy::cast_possible_truncation)]
                let millis = d.as_millis() as i64;
                Expiry::At(now.saturating_add(millis))
            }
            Ttl::Never => Expiry::Never,
        }
    }
}

/// An absolute expiry: either a concrete instant or "never".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub enum Expiry {
    /// Expires at the given instant (milliseconds since epoch).
    At(Instant),
    /// Never expires.
    Never,
}

impl Expiry {
    /// Returns `true` if this expiry is in the past (or present) relative to `now`.
    ///
    /// `Never` is never expired.
    #[must_use]
    pub fn is_expired(self, now: Instant) -> bool {
        match self {
            Expiry::At(at) => at <= now,
            Expiry::Never => false,
        }
    }

    /// Remaining time until expiry, or `None` if this is `Never`.
    #[must_use]
    pub fn remaining(self, now: Instant) -> Option<Duration> {
        match self {
            Expiry::At(at) if at > now => {
                #[allow(clippy::cast_sign_loss)]
                Some(Duration::from_millis((at - now) as u64))
            }
            Expiry::At(_) => Some(Duration::ZERO),
            Expiry::Never => None,
        }
    }
}
