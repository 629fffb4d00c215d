//! Concrete [`KvEngine`](crate::engine::KvEngine) implementations.

pub mod memory;

#[cfg(feature = "redb")]
pub mod redb_engine;
