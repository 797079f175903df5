//! The client replica: confirmed state, pending mutations, optimistic view.
//!
//! ```text
//!   confirmed (server state as of the cookie)
//!       + pending mutations replayed through local mutators
//!       = optimistic view (what reads see)
//! ```
//!
//! A pull patches the confirmed state, drops the mutations the server has
//! acknowledged and replays the rest on top: the rebase.

use crate::config::ReplicaConfig;
use crate::error::{SyncError, SyncResult};
use crate::index::{scan_index, IndexEntry};
use cvrsync_core::{ClientGroupId, ClientId};
use cvrsync_protocol::{
    Cookie, ErrorResponse, MutationRecord, PatchOperation, PullRequest, PullResponse, PushRequest,
};
use cvrsync_schema::{EntitySchema, Record, SchemaError, SchemaRegistry};
use parking_lot::RwLock;
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Replica contents: key to marshaled value.
pub type KvState = BTreeMap<String, JsonValue>;

/// Write access to the optimistic view, handed to local mutators.
pub struct ReplicaTx<'a> {
    state: &'a mut KvState,
    schemas: &'a SchemaRegistry,
}

impl<'a> ReplicaTx<'a> {
    fn new(state: &'a mut KvState, schemas: &'a SchemaRegistry) -> Self {
        Self { state, schemas }
    }

    /// Looks up a registered schema.
    pub fn schema(&self, name: &str) -> SyncResult<&'a EntitySchema> {
        let schemas: &'a SchemaRegistry = self.schemas;
        schemas
            .get(name)
            .map(|schema| schema.as_ref())
            .ok_or_else(|| unknown_schema(format!("no schema named `{name}`")))
    }

    /// Loads an entity by its key fields.
    pub fn get(&self, schema: &EntitySchema, key_fields: &Record) -> SyncResult<Option<Record>> {
        let key = schema.interpolate_key(key_fields)?;
        self.state
            .get(&key)
            .map(|value| schema.unmarshal_entity(&key, value))
            .transpose()
            .map_err(SyncError::from)
    }

    /// Inserts or replaces an entity and returns its key.
    pub fn put(&mut self, schema: &EntitySchema, record: &Record) -> SyncResult<String> {
        let (key, value) = schema.marshal_entity(record)?;
        self.state.insert(key.clone(), value);
        Ok(key)
    }

    /// Removes an entity. Returns true if it existed.
    pub fn delete(&mut self, schema: &EntitySchema, key_fields: &Record) -> SyncResult<bool> {
        let key = schema.interpolate_key(key_fields)?;
        Ok(self.state.remove(&key).is_some())
    }

    /// Returns every entity of `schema`, in key order.
    pub fn scan(&self, schema: &EntitySchema) -> SyncResult<Vec<Record>> {
        self.state
            .range(schema.key_path().prefix().to_string()..)
            .take_while(|(key, _)| key.starts_with(schema.key_path().prefix()))
            .filter(|(key, _)| schema.owns_key(key))
            .map(|(key, value)| schema.unmarshal_entity(key, value).map_err(SyncError::from))
            .collect()
    }
}

/// Client-side twin of a server mutator, run optimistically.
///
/// Must be deterministic: it runs again on every rebase.
pub trait LocalMutator: Send + Sync {
    /// The mutation name.
    fn name(&self) -> &str;

    /// Applies the mutation to the optimistic view.
    fn apply(&self, tx: &mut ReplicaTx<'_>, args: &JsonValue) -> SyncResult<()>;
}

/// A [`LocalMutator`] backed by a closure.
pub struct FnLocalMutator<F> {
    name: String,
    apply: F,
}

impl<F> FnLocalMutator<F>
where
    F: Fn(&mut ReplicaTx<'_>, &JsonValue) -> SyncResult<()> + Send + Sync,
{
    /// Creates a local mutator.
    pub fn new(name: impl Into<String>, apply: F) -> Self {
        Self {
            name: name.into(),
            apply,
        }
    }
}

impl<F> LocalMutator for FnLocalMutator<F>
where
    F: Fn(&mut ReplicaTx<'_>, &JsonValue) -> SyncResult<()> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn apply(&self, tx: &mut ReplicaTx<'_>, args: &JsonValue) -> SyncResult<()> {
        (self.apply)(tx, args)
    }
}

/// Local mutators by name.
#[derive(Clone, Default)]
pub struct LocalMutators {
    mutators: BTreeMap<String, Arc<dyn LocalMutator>>,
}

impl LocalMutators {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a mutator, replacing any with the same name.
    #[must_use]
    pub fn with(mut self, mutator: impl LocalMutator + 'static) -> Self {
        self.mutators
            .insert(mutator.name().to_string(), Arc::new(mutator));
        self
    }

    fn get(&self, name: &str) -> Option<&Arc<dyn LocalMutator>> {
        self.mutators.get(name)
    }
}

impl fmt::Debug for LocalMutators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.mutators.keys()).finish()
    }
}

/// What a pull did to the replica.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PullOutcome {
    /// The patch was applied.
    Applied {
        /// Patch operations applied.
        operations: usize,
        /// Pending mutations the server acknowledged.
        acknowledged: usize,
    },
    /// The server had nothing new.
    Unchanged,
    /// The server no longer knows the cookie; pull again from scratch.
    ResyncRequired,
}

#[derive(Debug, Default)]
struct ReplicaState {
    confirmed: KvState,
    view: KvState,
    pending: Vec<MutationRecord>,
    cookie: Option<Cookie>,
    last_mutation_id: u64,
}

/// A local replica of one client.
///
/// All methods take `&self`; the state sits behind a lock so the replica can
/// be shared with a [`SyncEngine`](crate::SyncEngine).
pub struct Replica {
    config: ReplicaConfig,
    schemas: Arc<SchemaRegistry>,
    mutators: LocalMutators,
    state: RwLock<ReplicaState>,
}

impl Replica {
    /// Creates an empty replica.
    pub fn new(config: ReplicaConfig, schemas: Arc<SchemaRegistry>, mutators: LocalMutators) -> Self {
        Self {
            config,
            schemas,
            mutators,
            state: RwLock::new(ReplicaState::default()),
        }
    }

    /// Returns this replica's client id.
    pub fn client_id(&self) -> &ClientId {
        &self.config.client_id
    }

    /// Returns the client group id.
    pub fn client_group_id(&self) -> &ClientGroupId {
        &self.config.client_group_id
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ReplicaConfig {
        &self.config
    }

    /// Returns the id the next local mutation will get.
    pub fn next_mutation_id(&self) -> u64 {
        self.state.read().last_mutation_id + 1
    }

    /// Returns the cookie of the last applied pull.
    pub fn cookie(&self) -> Option<Cookie> {
        self.state.read().cookie
    }

    /// Returns the mutations not yet acknowledged by the server.
    pub fn pending(&self) -> Vec<MutationRecord> {
        self.state.read().pending.clone()
    }

    /// Returns the number of unacknowledged mutations.
    pub fn pending_count(&self) -> usize {
        self.state.read().pending.len()
    }

    /// Runs a local mutation and queues it for the server.
    ///
    /// The mutation is applied to the optimistic view right away. If the
    /// local mutator fails, nothing is queued.
    pub fn mutate(&self, name: &str, args: JsonValue) -> SyncResult<u64> {
        let mutator = self
            .mutators
            .get(name)
            .ok_or_else(|| SyncError::UnknownMutator(name.to_string()))?;

        let mut state = self.state.write();
        let mut view = state.view.clone();
        mutator.apply(&mut ReplicaTx::new(&mut view, &self.schemas), &args)?;

        let id = state.last_mutation_id + 1;
        state.last_mutation_id = id;
        state.view = view;
        state.pending.push(MutationRecord {
            id,
            client_id: self.config.client_id.clone(),
            name: name.to_string(),
            args,
            timestamp: now_millis(),
        });
        tracing::debug!(client = %self.config.client_id, id, name, "local mutation queued");
        Ok(id)
    }

    /// Reads a raw value from the optimistic view.
    pub fn get(&self, key: &str) -> Option<JsonValue> {
        self.state.read().view.get(key).cloned()
    }

    /// Reads an entity from the optimistic view.
    pub fn get_record(&self, schema: &EntitySchema, key_fields: &Record) -> SyncResult<Option<Record>> {
        let key = schema.interpolate_key(key_fields)?;
        let state = self.state.read();
        state
            .view
            .get(&key)
            .map(|value| schema.unmarshal_entity(&key, value))
            .transpose()
            .map_err(SyncError::from)
    }

    /// Returns a copy of the optimistic view.
    pub fn view(&self) -> KvState {
        self.state.read().view.clone()
    }

    /// Returns a copy of the confirmed state.
    pub fn confirmed(&self) -> KvState {
        self.state.read().confirmed.clone()
    }

    /// Scans a secondary index of `entity_type` over the optimistic view,
    /// ordered by indexed value, then key.
    pub fn scan_index(&self, entity_type: &str, index_name: &str) -> SyncResult<Vec<IndexEntry>> {
        let schema = self
            .schemas
            .get(entity_type)
            .ok_or_else(|| unknown_schema(format!("no schema named `{entity_type}`")))?;
        let index = schema
            .indexes()
            .iter()
            .find(|index| index.name == index_name)
            .ok_or_else(|| unknown_schema(format!("`{entity_type}` has no index `{index_name}`")))?;
        Ok(scan_index(&self.state.read().view, index))
    }

    /// Builds push requests covering every pending mutation, at most
    /// `max_batch` mutations each. Empty if nothing is pending.
    pub fn push_requests(&self, max_batch: usize) -> Vec<PushRequest> {
        let state = self.state.read();
        state
            .pending
            .chunks(max_batch.max(1))
            .map(|batch| {
                PushRequest::new(
                    self.config.profile_id.clone(),
                    self.config.client_group_id.clone(),
                    self.config.schema_version.clone(),
                    batch.to_vec(),
                )
            })
            .collect()
    }

    /// Builds a pull request carrying the held cookie.
    pub fn pull_request(&self) -> PullRequest {
        PullRequest::new(
            self.config.profile_id.clone(),
            self.config.client_group_id.clone(),
            self.config.schema_version.clone(),
            self.cookie(),
        )
    }

    /// Applies a pull response.
    ///
    /// `ClientStateNotFound` drops the cookie and asks for a full resync; a
    /// cookie older than the held one is rejected and changes nothing.
    pub fn apply_pull(&self, response: PullResponse) -> SyncResult<PullOutcome> {
        let ok = match response {
            PullResponse::Ok(ok) => ok,
            PullResponse::Error(ErrorResponse::ClientStateNotFound) => {
                tracing::warn!(client = %self.config.client_id, "server lost client state, resyncing");
                self.state.write().cookie = None;
                return Ok(PullOutcome::ResyncRequired);
            }
            PullResponse::Error(other) => return Err(SyncError::from_response(other)),
        };

        let mut state = self.state.write();
        if let Some(held) = state.cookie {
            if ok.cookie.order < held.order {
                return Err(SyncError::StaleCookie {
                    held: held.order,
                    received: ok.cookie.order,
                });
            }
            if held == ok.cookie && ok.is_empty() {
                return Ok(PullOutcome::Unchanged);
            }
        }

        for operation in &ok.patch {
            match operation {
                PatchOperation::Clear => state.confirmed.clear(),
                PatchOperation::Put { key, value } => {
                    state.confirmed.insert(key.clone(), value.clone());
                }
                PatchOperation::Del { key } => {
                    state.confirmed.remove(key);
                }
            }
        }

        let before = state.pending.len();
        if let Some(&acked) = ok.last_mutation_id_changes.get(&self.config.client_id) {
            state.pending.retain(|m| m.id > acked);
            state.last_mutation_id = state.last_mutation_id.max(acked);
        }
        let acknowledged = before - state.pending.len();
        state.cookie = Some(ok.cookie);

        self.rebase(&mut state);
        tracing::debug!(
            client = %self.config.client_id,
            order = ok.cookie.order,
            operations = ok.patch.len(),
            acknowledged,
            pending = state.pending.len(),
            "pull applied"
        );
        Ok(PullOutcome::Applied {
            operations: ok.patch.len(),
            acknowledged,
        })
    }

    /// Recomputes the view as confirmed state plus replayed pending
    /// mutations. A mutation that no longer applies is skipped; the server
    /// decides its fate.
    fn rebase(&self, state: &mut ReplicaState) {
        let mut view = state.confirmed.clone();
        for mutation in &state.pending {
            let Some(mutator) = self.mutators.get(&mutation.name) else {
                continue;
            };
            let mut scratch = view.clone();
            match mutator.apply(&mut ReplicaTx::new(&mut scratch, &self.schemas), &mutation.args) {
                Ok(()) => view = scratch,
                Err(e) => tracing::warn!(
                    id = mutation.id,
                    name = %mutation.name,
                    error = %e,
                    "pending mutation no longer applies"
                ),
            }
        }
        state.view = view;
    }
}

impl fmt::Debug for Replica {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read();
        f.debug_struct("Replica")
            .field("client_id", &self.config.client_id)
            .field("cookie", &state.cookie)
            .field("keys", &state.view.len())
            .field("pending", &state.pending.len())
            .finish()
    }
}

fn unknown_schema(message: String) -> SyncError {
    SyncError::Schema(SchemaError::invalid_schema(message))
}

fn now_millis() -> f64 {
    chrono::Utc::now().timestamp_millis() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use cvrsync_core::CvrId;
    use cvrsync_protocol::PullOk;
    use cvrsync_schema::{Field, FieldType, FieldValue};
    use serde_json::json;

    fn counter_schema() -> EntitySchema {
        EntitySchema::builder("counter", "c/[name]")
            .field(Field::new("name", FieldType::Text))
            .field(Field::new("value", FieldType::Integer).alias("v"))
            .build()
            .unwrap()
    }

    fn replica() -> Replica {
        let schemas = Arc::new(SchemaRegistry::new().register(counter_schema()).unwrap());
        let incr = FnLocalMutator::new("incr", |tx: &mut ReplicaTx<'_>, args: &JsonValue| {
            let schema = tx.schema("counter")?;
            let name = args["name"].as_str().unwrap_or_default().to_string();
            let key = Record::from([("name".to_string(), FieldValue::Text(name))]);
            let current = tx
                .get(schema, &key)?
                .and_then(|r| r.get("value").and_then(FieldValue::as_integer))
                .unwrap_or(0);
            let mut record = key;
            record.insert("value".into(), FieldValue::Integer(current + 1));
            tx.put(schema, &record)?;
            Ok(())
        });
        Replica::new(
            ReplicaConfig::new("u", "1").with_client_id("c1").with_client_group_id("g"),
            schemas,
            LocalMutators::new().with(incr),
        )
    }

    fn pull_ok(order: u64, lmid: Option<u64>, patch: Vec<PatchOperation>) -> PullResponse {
        PullResponse::Ok(PullOk {
            cookie: Cookie::new(order, CvrId::generate()),
            last_mutation_id_changes: lmid
                .map(|id| BTreeMap::from([(ClientId::new("c1"), id)]))
                .unwrap_or_default(),
            patch,
        })
    }

    #[test]
    fn mutate_applies_optimistically_and_queues() {
        let replica = replica();
        assert_eq!(replica.mutate("incr", json!({ "name": "a" })).unwrap(), 1);
        assert_eq!(replica.mutate("incr", json!({ "name": "a" })).unwrap(), 2);

        assert_eq!(replica.get("c/a"), Some(json!({ "v": 2 })));
        assert_eq!(replica.pending_count(), 2);
        assert_eq!(replica.next_mutation_id(), 3);
        assert!(replica.confirmed().is_empty());
    }

    #[test]
    fn unknown_mutator_queues_nothing() {
        let replica = replica();
        assert!(matches!(
            replica.mutate("nope", json!({})),
            Err(SyncError::UnknownMutator(_))
        ));
        assert_eq!(replica.pending_count(), 0);
        assert_eq!(replica.next_mutation_id(), 1);
    }

    #[test]
    fn pull_acknowledges_and_rebases() {
        let replica = replica();
        replica.mutate("incr", json!({ "name": "a" })).unwrap();
        replica.mutate("incr", json!({ "name": "a" })).unwrap();

        // Server applied only the first mutation, on top of a value of 10.
        let outcome = replica
            .apply_pull(pull_ok(
                1,
                Some(1),
                vec![
                    PatchOperation::Clear,
                    PatchOperation::Put {
                        key: "c/a".into(),
                        value: json!({ "v": 11 }),
                    },
                ],
            ))
            .unwrap();

        assert_eq!(
            outcome,
            PullOutcome::Applied {
                operations: 2,
                acknowledged: 1
            }
        );
        assert_eq!(replica.pending_count(), 1);
        assert_eq!(replica.confirmed()["c/a"], json!({ "v": 11 }));
        assert_eq!(replica.get("c/a"), Some(json!({ "v": 12 })));
    }

    #[test]
    fn client_state_not_found_drops_cookie() {
        let replica = replica();
        replica.apply_pull(pull_ok(4, None, vec![PatchOperation::Clear])).unwrap();
        assert!(replica.cookie().is_some());

        let outcome = replica
            .apply_pull(PullResponse::Error(ErrorResponse::ClientStateNotFound))
            .unwrap();
        assert_eq!(outcome, PullOutcome::ResyncRequired);
        assert!(replica.cookie().is_none());
        assert!(replica.pull_request().cookie.is_none());
    }

    #[test]
    fn older_cookie_is_rejected() {
        let replica = replica();
        replica.apply_pull(pull_ok(5, None, vec![PatchOperation::Clear])).unwrap();

        let err = replica
            .apply_pull(pull_ok(
                3,
                None,
                vec![PatchOperation::Del { key: "c/a".into() }],
            ))
            .unwrap_err();
        assert!(matches!(err, SyncError::StaleCookie { held: 5, received: 3 }));
        assert_eq!(replica.cookie().unwrap().order, 5);
    }

    #[test]
    fn push_requests_batch_pending() {
        let replica = replica();
        assert!(replica.push_requests(10).is_empty());
        for _ in 0..3 {
            replica.mutate("incr", json!({ "name": "a" })).unwrap();
        }
        let requests = replica.push_requests(2);
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].mutations.len(), 2);
        assert_eq!(requests[1].mutations[0].id, 3);
        assert_eq!(requests[0].profile_id, "u");
        assert_eq!(requests[0].client_group_id.as_str(), "g");
    }
}
