//! Push messages.

use crate::error::{ProtocolError, ProtocolResult};
use crate::json;
use crate::version::{check_protocol_version, check_schema_version, VersionType, PUSH_VERSION};
use cvrsync_core::{ClientGroupId, ClientId};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// A client-originated intent.
///
/// `id` is strictly increasing per client with no gaps; the server applies
/// each id at most once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationRecord {
    /// Per-client sequence number, starting at 1.
    pub id: u64,
    /// Originating client.
    pub client_id: ClientId,
    /// Name of the registered mutator.
    pub name: String,
    /// Marshaled arguments, decoded by the mutator's argument codec.
    pub args: JsonValue,
    /// Client-side logical timestamp.
    pub timestamp: f64,
}

/// A batch of mutations from one client group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushRequest {
    /// Profile the client acts for.
    pub profile_id: String,
    /// The sending group.
    pub client_group_id: ClientGroupId,
    /// Push protocol version.
    pub push_version: u32,
    /// Client schema version.
    pub schema_version: String,
    /// Mutations in application order.
    pub mutations: Vec<MutationRecord>,
}

impl PushRequest {
    /// Creates a request at the current push version.
    pub fn new(
        profile_id: impl Into<String>,
        client_group_id: ClientGroupId,
        schema_version: impl Into<String>,
        mutations: Vec<MutationRecord>,
    ) -> Self {
        Self {
            profile_id: profile_id.into(),
            client_group_id,
            push_version: PUSH_VERSION,
            schema_version: schema_version.into(),
            mutations,
        }
    }

    /// Checks the push version, then the schema version.
    pub fn check_versions(&self, schema_version: &str) -> ProtocolResult<()> {
        check_protocol_version(VersionType::Push, PUSH_VERSION, self.push_version)?;
        check_schema_version(schema_version, &self.schema_version)
    }

    /// Rejects batches that cannot be meaningful.
    ///
    /// Within one client the ids must be strictly increasing; the server
    /// still detects gaps against its own counter.
    pub fn validate(&self, max_batch: usize) -> ProtocolResult<()> {
        if self.mutations.len() > max_batch {
            return Err(ProtocolError::malformed(format!(
                "push of {} mutations exceeds the limit of {max_batch}",
                self.mutations.len()
            )));
        }
        let mut last: std::collections::HashMap<&ClientId, u64> = Default::default();
        for mutation in &self.mutations {
            if mutation.id == 0 {
                return Err(ProtocolError::malformed("mutation ids start at 1"));
            }
            if let Some(prev) = last.insert(&mutation.client_id, mutation.id) {
                if mutation.id <= prev {
                    return Err(ProtocolError::malformed(format!(
                        "mutation {} of client {} is not after {prev}",
                        mutation.id, mutation.client_id
                    )));
                }
            }
        }
        Ok(())
    }

    /// Encodes to a JSON body.
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        json::encode(self)
    }

    /// Decodes from a JSON body.
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        json::decode(bytes)
    }
}
