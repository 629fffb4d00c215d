//! Shared `StorageContract` test double, used by both `state_machine` and
//! `provider` unit tests so they exercise identical admission logic.

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::clock::{Expiry, Instant};
use crate::record::{LockRecord, Slots};
use crate::storage::{decide_put_writer, AddReaderSlotOutcome, PutWriterDecision, PutWriterOutcome, StorageContract};

/// A minimal in-memory `StorageContract` used only to unit-test layers above
/// storage in isolation from any real backend.
#[derive(Default)]
pub struct TestStorage {
    record: Mutex<LockRecord>,
}

#[async_trait]
impl StorageContract for TestStorage {
    async fn try_put_writer(
        &self,
        _key: &str,
        owner_id: &str,
        expires_at: Expiry,
        now: Instant,
    ) -> anyhow::Result<PutWriterOutcome> {
        let mut record = self.record.lock();
        match decide_put_writer(&record, owner_id, now) {
            PutWriterDecision::Replace => {
                *record = LockRecord::Writer { owner_id: owner_id.to_string(), expires_at };
                Ok(PutWriterOutcome::acquired())
            }
            PutWriterDecision::RenewSameOwner => Ok(PutWriterOutcome::acquired()),
            PutWriterDecision::Blocked(o) => Ok(o),
        }
    }

    async fn try_add_reader_slot(
        &self,
        _key: &str,
        owner_id: &str,
        expires_at: Expiry,
        requested_limit: u32,
        now: Instant,
    ) -> anyhow::Result<AddReaderSlotOutcome> {
        let mut record = self.record.lock();
        if record.live_writer(now).is_some() {
            return Ok(AddReaderSlotOutcome {
                added: false,
                effective_limit: 0,
                current_slots: Slots::new(),
            });
        }
        let (limit, mut slots) = if record.is_only_expired(now) {
            (requested_limit.max(1), Slots::new())
        } else {
            record.live_reader_slots(now).unwrap_or((1, Slots::new()))
        };
        let added = slots.contains_key(owner_id) || (slots.len() as u32) < limit;
        if added {
            slots.entry(owner_id.to_string()).or_insert(expires_at);
        }
        *record = LockRecord::Reader { limit, slots: slots.clone() };
        Ok(AddReaderSlotOutcome { added, effective_limit: limit, current_slots: slots })
    }

    async fn refresh_writer(
        &self,
        _key: &str,
        owner_id: &str,
        new_expires_at: Expiry,
        now: Instant,
    ) -> anyhow::Result<bool> {
        let mut record = self.record.lock();
        match &*record {
            LockRecord::Writer { owner_id: o, expires_at } if o == owner_id && !expires_at.is_expired(now) => {
                if *expires_at == Expiry::Never {
                    return Ok(false);
                }
                *record = LockRecord::Writer { owner_id: owner_id.to_string(), expires_at: new_expires_at };
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn refresh_reader_slot(
        &self,
        _key: &str,
        owner_id: &str,
        new_expires_at: Expiry,
        now: Instant,
    ) -> anyhow::Result<bool> {
        let mut record = self.record.lock();
        let LockRecord::Reader { limit, slots } = &*record else { return Ok(false) };
        let Some(expiry) = slots.get(owner_id).copied() else { return Ok(false) };
        if expiry.is_expired(now) || expiry == Expiry::Never {
            return Ok(false);
        }
        let mut new_slots = slots.clone();
        new_slots.insert(owner_id.to_string(), new_expires_at);
        *record = LockRecord::Reader { limit: *limit, slots: new_slots };
        Ok(true)
    }

    async fn release_writer(&self, _key: &str, owner_id: &str, now: Instant) -> anyhow::Result<bool> {
        let mut record = self.record.lock();
        if record.live_writer(now) == Some(owner_id) {
            *record = LockRecord::Absent;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn release_reader_slot(&self, _key: &str, owner_id: &str, now: Instant) -> anyhow::Result<bool> {
        let mut record = self.record.lock();
        let LockRecord::Reader { limit, slots } = &*record else { return Ok(false) };
        let Some(expiry) = slots.get(owner_id).copied() else { return Ok(false) };
        if expiry.is_expired(now) {
            return Ok(false);
        }
        let mut new_slots = slots.clone();
        new_slots.remove(owner_id);
        if new_slots.is_empty() {
            *record = LockRecord::Absent;
        } else {
            *record = LockRecord::Reader { limit: *limit, slots: new_slots };
        }
        Ok(true)
    }

    async fn force_release_writer(&self, _key: &str, now: Instant) -> anyhow::Result<bool> {
        let mut record = self.record.lock();
        if record.live_writer(now).is_some() {
            *record = LockRecord::Absent;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn force_release_all_readers(&self, _key: &str, now: Instant) -> anyhow::Result<bool> {
        let mut record = self.record.lock();
        if let Some((_, live)) = record.live_reader_slots(now) {
            if !live.is_empty() {
                *record = LockRecord::Absent;
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn read(&self, _key: &str, now: Instant) -> anyhow::Result<LockRecord> {
        let record = self.record.lock();
        if record.is_only_expired(now) {
            return Ok(LockRecord::Absent);
        }
        Ok(record.clone())
    }
}
