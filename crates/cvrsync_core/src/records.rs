//! Registry and client-view records.
//!
//! Client and client-group records are the durable counters of the
//! protocol. A [`CvrRecord`] is an immutable snapshot of what one client
//! group has been shown; it is persisted as CBOR.

use crate::error::{CoreError, CoreResult};
use crate::types::{ClientGroupId, ClientId, CvrId, UserId, VersionToken};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Per-client mutation bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientRecord {
    /// The client.
    pub id: ClientId,
    /// The group the client belongs to. Never changes.
    pub client_group_id: ClientGroupId,
    /// Id of the last mutation accounted for (applied or skipped).
    pub last_mutation_id: u64,
}

impl ClientRecord {
    /// Creates a record with a zero counter.
    pub fn new(id: ClientId, client_group_id: ClientGroupId) -> Self {
        Self {
            id,
            client_group_id,
            last_mutation_id: 0,
        }
    }

    /// Returns the id the next mutation from this client must carry.
    #[must_use]
    pub fn next_mutation_id(&self) -> u64 {
        self.last_mutation_id + 1
    }
}

/// Per-group ownership and CVR ordering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientGroupRecord {
    /// The group.
    pub id: ClientGroupId,
    /// The user all clients of the group act for.
    pub owner_user_id: UserId,
    /// Order of the newest CVR produced for the group.
    pub cvr_version: u64,
}

impl ClientGroupRecord {
    /// Creates a record with a zero version.
    pub fn new(id: ClientGroupId, owner_user_id: UserId) -> Self {
        Self {
            id,
            owner_user_id,
            cvr_version: 0,
        }
    }

    /// Returns true if `user` owns this group.
    #[must_use]
    pub fn is_owned_by(&self, user: &UserId) -> bool {
        &self.owner_user_id == user
    }
}

/// Entity id to version token, for one entity type.
pub type EntityVersions = BTreeMap<String, VersionToken>;

/// Client view record: what a client group has been shown at one order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CvrRecord {
    /// Opaque id carried in cookies.
    pub id: CvrId,
    /// Owning group.
    pub client_group_id: ClientGroupId,
    /// The cookie order this snapshot was produced at.
    pub order: u64,
    /// Entity type name to visible entities.
    pub entities: BTreeMap<String, EntityVersions>,
    /// Last mutation id per client of the group.
    pub client_last_mutation_ids: BTreeMap<ClientId, u64>,
}

impl CvrRecord {
    /// Returns the visible entities of one type (empty if none).
    pub fn entities_of(&self, entity_type: &str) -> Option<&EntityVersions> {
        self.entities.get(entity_type)
    }

    /// Returns the number of visible entities across all types.
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.entities.values().map(BTreeMap::len).sum()
    }

    /// Encodes the record as CBOR.
    pub fn to_cbor(&self) -> CoreResult<Vec<u8>> {
        let mut bytes = Vec::new();
        ciborium::into_writer(self, &mut bytes)
            .map_err(|e| CoreError::record_codec(format!("encode cvr {}: {e}", self.id)))?;
        Ok(bytes)
    }

    /// Decodes a record from CBOR.
    pub fn from_cbor(bytes: &[u8]) -> CoreResult<Self> {
        ciborium::from_reader(bytes)
            .map_err(|e| CoreError::record_codec(format!("decode cvr: {e}")))
    }
}
