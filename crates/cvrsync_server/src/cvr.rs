//! Client view records: computing, diffing and pruning.
//!
//! A CVR maps every entity a client group can see to the version token it
//! was sent at. The next CVR is computed from the store; the diff against
//! the previous one is what a pull sends.

use crate::error::ServerResult;
use cvrsync_core::{ClientGroupId, ClientId, CvrId, EntityVersions, Transaction, UserId};
use cvrsync_schema::SchemaRegistry;
use std::collections::BTreeMap;

/// Visible state of a client group at one instant.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewState {
    /// Entity type name to visible entities. Types with nothing visible are
    /// omitted.
    pub entities: BTreeMap<String, EntityVersions>,
    /// Last mutation id of every client of the group.
    pub client_last_mutation_ids: BTreeMap<ClientId, u64>,
}

/// Changes of one entity type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntityDiff {
    /// Ids that are new or whose version token changed.
    pub puts: Vec<String>,
    /// Ids that are no longer visible.
    pub dels: Vec<String>,
}

impl EntityDiff {
    fn is_empty(&self) -> bool {
        self.puts.is_empty() && self.dels.is_empty()
    }
}

/// Per-type changes between two CVRs. Unchanged types are omitted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CvrDiff {
    /// Entity type name to its changes.
    pub entities: BTreeMap<String, EntityDiff>,
}

impl CvrDiff {
    /// Returns true if nothing was put or deleted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Returns the number of puts across all types.
    #[must_use]
    pub fn put_count(&self) -> usize {
        self.entities.values().map(|d| d.puts.len()).sum()
    }

    /// Returns the number of deletes across all types.
    #[must_use]
    pub fn del_count(&self) -> usize {
        self.entities.values().map(|d| d.dels.len()).sum()
    }
}

/// Reads the current view of `user` / `group` inside `tx`.
///
/// Every registered entity type contributes `id -> version token` of the
/// rows the user owns; every client of the group contributes its last
/// mutation id.
pub fn compute_view(
    tx: &mut Transaction<'_>,
    schemas: &SchemaRegistry,
    user: &UserId,
    group: &ClientGroupId,
) -> ServerResult<ViewState> {
    let mut entities = BTreeMap::new();
    for schema in schemas.schemas() {
        let versions = tx.row_versions(schema.name(), user)?;
        if !versions.is_empty() {
            entities.insert(schema.name().to_string(), versions);
        }
    }

    let client_last_mutation_ids = tx
        .clients_in_group(group)
        .into_iter()
        .map(|client| (client.id, client.last_mutation_id))
        .collect();

    Ok(ViewState {
        entities,
        client_last_mutation_ids,
    })
}

/// Diffs two entity maps. A missing type is an empty map.
///
/// Every id of `prev ∪ next` lands in exactly one of: puts (new or changed
/// token), dels (gone), or nowhere (unchanged).
pub fn diff_entities(
    prev: &BTreeMap<String, EntityVersions>,
    next: &BTreeMap<String, EntityVersions>,
) -> CvrDiff {
    let empty = EntityVersions::new();
    let mut entities = BTreeMap::new();

    for entity_type in prev.keys().chain(next.keys()) {
        if entities.contains_key(entity_type) {
            continue;
        }
        let before = prev.get(entity_type).unwrap_or(&empty);
        let after = next.get(entity_type).unwrap_or(&empty);

        let diff = EntityDiff {
            puts: after
                .iter()
                .filter(|(id, token)| before.get(*id) != Some(*token))
                .map(|(id, _)| id.clone())
                .collect(),
            dels: before
                .keys()
                .filter(|id| !after.contains_key(*id))
                .cloned()
                .collect(),
        };
        entities.insert(entity_type.clone(), diff);
    }

    entities.retain(|_, diff| !diff.is_empty());
    CvrDiff { entities }
}

/// Returns the clients whose last mutation id differs from `prev`.
pub fn last_mutation_id_changes(
    prev: &BTreeMap<ClientId, u64>,
    next: &BTreeMap<ClientId, u64>,
) -> BTreeMap<ClientId, u64> {
    next.iter()
        .filter(|(client, lmid)| prev.get(*client) != Some(*lmid))
        .map(|(client, lmid)| (client.clone(), *lmid))
        .collect()
}

/// Deletes all but the newest `keep` CVRs of a group. Returns the deleted ids.
pub fn prune(tx: &mut Transaction<'_>, group: &ClientGroupId, keep: usize) -> Vec<CvrId> {
    let existing = tx.cvrs_in_group(group);
    let excess = existing.len().saturating_sub(keep);
    let doomed: Vec<CvrId> = existing.into_iter().take(excess).map(|(_, id)| id).collect();
    for id in &doomed {
        tx.delete_cvr(id);
    }
    doomed
}
