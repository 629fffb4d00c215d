//! Storage backends for the reader/writer lock service: a raw key-value
//! engine layer ([`engine`]) and the [`StorageContract`](sharedlock_core::StorageContract)
//! implementation ([`memory_store`]) an embedder actually wires a
//! [`Provider`](sharedlock_core::Provider) with.
//!
//! - **Engine** ([`engine`], [`engines`]): `KvEngine` trait plus a `DashMap`
//!   default and an optional `redb`-backed durable engine (feature `redb`).
//! - **Store** ([`memory_store`]): `MemoryLockStore`, the contract
//!   implementation orchestrating any `KvEngine`, plus the lazy-sweep helper.
//! - **Config** ([`config`]): `StoreConfig` for the optional periodic sweep.

pub mod config;
pub mod engine;
pub mod engines;
pub mod memory_store;

pub use config::StoreConfig;
pub use engine::KvEngine;
pub use engines::memory::MemoryEngine;
pub use memory_store::{spawn_periodic_sweeper, sweep_expired, MemoryLockStore};

#[cfg(feature = "redb")]
pub use engines::redb_engine::RedbEngine;

#[cfg(test)]
mod tests {
    #[test]
    fn crate_loads() {
        // Empty body: if this test runs, the crate compiles and loads.
    }

    #[test]
    fn reexports_accessible_from_crate_root() {
        let _store = crate::MemoryLockStore::in_memory();
        let _config = crate::StoreConfig::default();
    }
}
