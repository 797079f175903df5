//! Pull messages, cookies and patches.

use crate::error::ProtocolResult;
use crate::json;
use crate::response::ErrorResponse;
use crate::version::{check_protocol_version, check_schema_version, VersionType, PULL_VERSION};
use cvrsync_core::{ClientGroupId, ClientId, CvrId};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

/// Continuation token returned by pull and sent back by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cookie {
    /// CVR order; never decreases for a client group.
    pub order: u64,
    /// The CVR this cookie points at.
    pub cvr_id: CvrId,
}

impl Cookie {
    /// Creates a cookie.
    pub fn new(order: u64, cvr_id: CvrId) -> Self {
        Self { order, cvr_id }
    }
}

/// A request for changes since `cookie`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullRequest {
    /// Profile the client acts for.
    pub profile_id: String,
    /// The pulling group.
    pub client_group_id: ClientGroupId,
    /// Pull protocol version.
    pub pull_version: u32,
    /// Client schema version.
    pub schema_version: String,
    /// Last cookie received, `null` for a full sync.
    pub cookie: Option<Cookie>,
}

impl PullRequest {
    /// Creates a request at the current pull version.
    pub fn new(
        profile_id: impl Into<String>,
        client_group_id: ClientGroupId,
        schema_version: impl Into<String>,
        cookie: Option<Cookie>,
    ) -> Self {
        Self {
            profile_id: profile_id.into(),
            client_group_id,
            pull_version: PULL_VERSION,
            schema_version: schema_version.into(),
            cookie,
        }
    }

    /// Checks the pull version, then the schema version.
    pub fn check_versions(&self, schema_version: &str) -> ProtocolResult<()> {
        check_protocol_version(VersionType::Pull, PULL_VERSION, self.pull_version)?;
        check_schema_version(schema_version, &self.schema_version)
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

/// One step of a patch, applied in order to the client's replica.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum PatchOperation {
    /// Remove every key.
    Clear,
    /// Insert or replace a key.
    Put {
        /// Replica key.
        key: String,
        /// Marshaled value.
        value: JsonValue,
    },
    /// Remove a key.
    Del {
        /// Replica key.
        key: String,
    },
}

impl PatchOperation {
    /// Returns the key the operation touches, if any.
    pub fn key(&self) -> Option<&str> {
        match self {
            PatchOperation::Clear => None,
            PatchOperation::Put { key, .. } | PatchOperation::Del { key } => Some(key),
        }
    }
}

/// A successful pull.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullOk {
    /// Cookie for the next pull.
    pub cookie: Cookie,
    /// New last-mutation ids, only for clients whose value changed.
    pub last_mutation_id_changes: BTreeMap<ClientId, u64>,
    /// Changes to apply.
    pub patch: Vec<PatchOperation>,
}

impl PullOk {
    /// Returns true if the pull carries nothing to apply.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.patch.is_empty() && self.last_mutation_id_changes.is_empty()
    }
}

/// Body of a pull response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PullResponse {
    /// Patch and new cookie.
    Ok(PullOk),
    /// Structured failure.
    Error(ErrorResponse),
}

impl PullResponse {
    /// Encodes to a JSON body.
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        json::encode(self)
    }

    /// Decodes from a JSON body.
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        json::decode(bytes)
    }
}
