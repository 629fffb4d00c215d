//! Durable [`KvEngine`] backed by [`redb`].
//!
//! Opt-in via the `redb` feature (`server-rust/Cargo.toml` carries `redb` as
//! an optional dependency behind a feature flag; this crate keeps that shape
//! but defaults it off, since the in-memory engine is this crate's default
//! backend). Records are stored JSON-encoded, one row per key, matching the
//! handle's own reference JSON serializer (§6.1/§10.6) rather than
//! introducing a second wire format.

use redb::{Database, ReadableTable, ReadableTableMetadata, TableDefinition};
use sharedlock_core::LockRecord;

use crate::engine::KvEngine;

const TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("lock_records");

/// Single-file `redb` database holding every lock record.
pub struct RedbEngine {
    db: Database,
}

impl RedbEngine {
    /// Opens (creating if absent) a database file at `path`.
    pub fn open(path: impl AsRef<std::path::Path>) -> anyhow::Result<Self> {
        let db = Database::create(path)?;
        // Ensure the table exists so `begin_read`-only paths never race its creation.
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(TABLE)?;
        }
        write_txn.commit()?;
        Ok(Self { db })
    }
}

impl KvEngine for RedbEngine {
    fn get(&self, key: &str) -> anyhow::Result<Option<LockRecord>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(TABLE)?;
        match table.get(key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(bytes.value())?)),
            None => Ok(None),
        }
    }

    fn put(&self, key: &str, record: LockRecord) -> anyhow::Result<()> {
        let bytes = serde_json::to_vec(&record)?;
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(TABLE)?;
            table.insert(key, bytes.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn remove(&self, key: &str) -> anyhow::Result<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(TABLE)?;
            table.remove(key)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn len(&self) -> anyhow::Result<usize> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(TABLE)?;
        Ok(usize::try_from(table.len()?).unwrap_or(usize::MAX))
    }

    fn snapshot(&self) -> anyhow::Result<Vec<(String, LockRecord)>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(TABLE)?;
        let mut out = Vec::new();
        for entry in table.iter()? {
            let (k, v) = entry?;
            let record: LockRecord = serde_json::from_slice(v.value())?;
            out.push((k.value().to_string(), record));
        }
        Ok(out)
    }
}
