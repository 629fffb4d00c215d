//! The authoritative per-key record.
//!
//! [`LockRecord`] is the tagged union persisted by a [`StorageContract`](crate::storage::StorageContract)
//! implementation: a key is either [`LockRecord::Absent`], held exclusively by
//! [`LockRecord::Writer`], or shared by up to `limit` concurrent
//! [`LockRecord::Reader`] slots. Server-internal -- storage backends decide how
//! (or whether) this is put on the wire; the core only requires the tagged-union
//! shape be recoverable.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::clock::{Expiry, Instant};

/// One reader's slot: owner id mapped to its expiry.
pub type Slots = BTreeMap<String, Expiry>;

/// The authoritative state for one key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum LockRecord {
    /// No record exists.
    Absent,
    /// Exclusive grant.
    Writer {
        /// Owner holding the grant. Always non-empty for a live writer.
        owner_id: String,
        /// "Never" or a future instant at commit time.
        expires_at: Expiry,
    },
    /// Semaphore state; `slots.len() <= limit`.
    Reader {
        /// Maximum concurrent slots. Fixed once any slot is live (invariant I5).
        limit: u32,
        /// Owner id -> expiry for each held slot.
        slots: Slots,
    },
}

impl Default for LockRecord {
    fn default() -> Self {
        LockRecord::Absent
    }
}

impl LockRecord {
    /// Returns `true` if this record has no live entries as of `now`.
    ///
    /// `Absent` is trivially "only expired"; a `Writer`/`Reader` counts as
    /// only-expired when every entry it holds has passed `now` (invariant I4).
    #[must_use]
    pub fn is_only_expired(&self, now: Instant) -> bool {
        match self {
            LockRecord::Absent => true,
            LockRecord::Writer { expires_at, .. } => expires_at.is_expired(now),
            LockRecord::Reader { slots, .. } => slots.values().all(|e| e.is_expired(now)),
        }
    }

    /// Returns the live writer owner, if this is a writer record with an
    /// unexpired grant.
    #[must_use]
    pub fn live_writer(&self, now: Instant) -> Option<&str> {
        match self {
            LockRecord::Writer { owner_id, expires_at } if !expires_at.is_expired(now) => {
                Some(owner_id.as_str())
            }
            _ => None,
        }
    }

    /// Returns the set of live reader slots (owner id -> expiry), dropping
    /// any that have expired as of `now`. Returns `None` if this is not a
    /// reader record.
    #[must_use]
    pub fn live_reader_slots(&self, now: Instant) -> Option<(u32, Slots)> {
        match self {
            LockRecord::Reader { limit, slots } => {
                let live: Slots = slots
                    .iter()
                    .filter(|(_, expiry)| !expiry.is_expired(now))
                    .map(|(owner, expiry)| (owner.clone(), *expiry))
                    .collect();
                Some((*limit, live))
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::Expiry;

    fn slots(pairs: &[(&str, Expiry)]) -> Slots {
        pairs.iter().map(|(o, e)| ((*o).to_string(), *e)).collect()
    }

    #[test]
    fn absent_is_only_expired() {
        assert!(LockRecord::Absent.is_only_expired(1_000));
    }

    #[test]
    fn writer_with_future_expiry_is_not_only_expired() {
        let r = LockRecord::Writer {
            owner_id: "a".into(),
            expires_at: Expiry::At(2_000),
        };
        assert!(!r.is_only_expired(1_000));
        assert!(r.is_only_expired(2_000));
    }

    #[test]
    fn writer_never_is_never_only_expired() {
        let r = LockRecord::Writer {
            owner_id: "a".into(),
            expires_at: Expiry::Never,
        };
        assert!(!r.is_only_expired(i64::MAX));
    }

    #[test]
    fn reader_only_expired_requires_all_slots_expired() {
        let r = LockRecord::Reader {
            limit: 2,
            slots: slots(&[("a", Expiry::At(1_000)), ("b", Expiry::At(2_000))]),
        };
        assert!(!r.is_only_expired(1_500));
        assert!(r.is_only_expired(2_000));
    }

    #[test]
    fn live_writer_excludes_expired() {
        let live = LockRecord::Writer {
            owner_id: "a".into(),
            expires_at: Expiry::At(2_000),
        };
        assert_eq!(live.live_writer(1_000), Some("a"));
        assert_eq!(live.live_writer(2_000), None);
    }

    #[test]
    fn live_reader_slots_filters_expired() {
        let r = LockRecord::Reader {
            limit: 3,
            slots: slots(&[("a", Expiry::At(500)), ("b", Expiry::At(2_000))]),
        };
        let (limit, live) = r.live_reader_slots(1_000).unwrap();
        assert_eq!(limit, 3);
        assert_eq!(live.len(), 1);
        assert!(live.contains_key("b"));
    }

    #[test]
    fn live_reader_slots_none_for_writer() {
        let r = LockRecord::Writer {
            owner_id: "a".into(),
            expires_at: Expiry::Never,
        };
        assert!(r.live_reader_slots(0).is_none());
    }

    #[test]
    fn serde_round_trip() {
        let r = LockRecord::Reader {
            limit: 2,
            slots: slots(&[("a", Expiry::At(1_000))]),
        };
        let json = serde_json::to_string(&r).unwrap();
        let back: LockRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(r, back);
    }
}
