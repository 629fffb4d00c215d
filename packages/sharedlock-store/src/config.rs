//! Store-level configuration (§10.3 ambient configuration).
//!
//! Plain struct + `Default` impl, mirroring
//! `server-rust/src/service/config.rs`'s `ServerConfig` -- no environment
//! parsing lives in this crate; an embedder constructs `StoreConfig` directly
//! or loads it from whatever configuration layer it already uses.

use std::time::Duration;

/// Configuration for a [`MemoryLockStore`](crate::memory_store::MemoryLockStore).
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Interval between automatic background sweeps of expired records.
    /// `None` disables the periodic sweeper; expired entries are still
    /// reclaimed lazily on access either way (§10.5 supplemented feature).
    pub sweep_interval: Option<Duration>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { sweep_interval: None }
    }
}
