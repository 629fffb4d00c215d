//! The caller-side [`Handle`] value.
//!
//! A `Handle` is opaque and caches no record state; two handles addressing
//! the same `{key, owner_id}` are interchangeable (§4.4). Serialize/deserialize
//! preserve this equivalence, matching how `core-rust/src/hlc.rs`'s
//! `Timestamp` derives `Serialize`/`Deserialize` for wire use without
//! depending on a transport.

use serde::{Deserialize, Serialize};

use crate::clock::Ttl;

/// Caller-side value bundling `{key, owner_id, ttl, limit}`.
///
/// Created by a [`Provider`](crate::provider::Provider); does not cache
/// record state. Cheap to recreate -- the provider keeps no back-pointer to
/// outstanding handles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Handle {
    key: String,
    owner_id: String,
    #[serde(with = "ttl_serde")]
    requested_ttl: Ttl,
    requested_limit: u32,
}

impl Handle {
    /// Creates a handle with an explicit owner id.
    pub fn with_owner(
        key: impl Into<String>,
        owner_id: impl Into<String>,
        requested_ttl: Ttl,
        requested_limit: u32,
    ) -> Self {
        Self {
            key: key.into(),
            owner_id: owner_id.into(),
            requested_ttl,
            requested_limit: requested_limit.max(1),
        }
    }

    /// Creates a handle with a freshly generated unique owner id.
    pub fn new(key: impl Into<String>, requested_ttl: Ttl, requested_limit: u32) -> Self {
        Self::with_owner(key, uuid::Uuid::new_v4().to_string(), requested_ttl, requested_limit)
    }

    /// The key this handle addresses.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The owner id scoping release/refresh rights.
    #[must_use]
    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    /// The TTL this handle requests on acquire.
    #[must_use]
    pub fn requested_ttl(&self) -> Ttl {
        self.requested_ttl
    }

    /// The reader limit this handle requests on acquire (ignored once a live
    /// reader record already exists for the key, per invariant I5).
    #[must_use]
    pub fn requested_limit(&self) -> u32 {
        self.requested_limit
    }

    /// Serializes this handle to a JSON string.
    ///
    /// Reference `Serializer` collaborator (§6.1); embedders may use any
    /// serde-compatible format instead.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Deserializes a handle from a JSON string produced by [`Handle::to_json`].
    pub fn from_json(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }
}

mod ttl_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use crate::clock::Ttl;

    #[derive(Serialize, Deserialize)]
    #[serde(rename_all = "camelCase", tag = "kind", content = "millis")]
    enum Wire {
        Finite(u64),
        Never,
    }

    pub fn serialize<S: Serializer>(ttl: &Ttl, s: S) -> Result<S::Ok, S::Error> {
        let wire = match ttl {
            #[allow(clippy::cast_possible_truncation)]
            Ttl::Finite(d) => Wire::Finite(d.as_millis() as u64),
            Ttl::Never => Wire::Never,
        };
        wire.serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Ttl, D::Error> {
        let wire = Wire::deserialize(d)?;
        Ok(match wire {
            Wire::Finite(millis) => Ttl::Finite(Duration::from_millis(millis)),
            Wire::Never => Ttl::Never,
        })
    }
}
