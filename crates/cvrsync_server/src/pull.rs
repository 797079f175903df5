//! Pull handling: diffing the client group's view against its cookie.

use crate::cvr::{compute_view, diff_entities, last_mutation_id_changes, prune, CvrDiff};
use crate::error::{ServerError, ServerResult};
use crate::handler::HandlerContext;
use crate::txn::run_in_transaction;
use cvrsync_core::{ClientGroupRecord, CvrId, CvrRecord, Transaction, UserId};
use cvrsync_protocol::{Cookie, PatchOperation, PullOk, PullRequest};
use cvrsync_schema::SchemaRegistry;
use std::collections::BTreeMap;
use std::fmt;

/// Steps of a pull, used to tag trace events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PullPhase {
    LoadGroup,
    LoadPrevious,
    ComputeView,
    Patch,
    Store,
}

impl fmt::Display for PullPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PullPhase::LoadGroup => "load-group",
            PullPhase::LoadPrevious => "load-previous",
            PullPhase::ComputeView => "compute-view",
            PullPhase::Patch => "patch",
            PullPhase::Store => "store",
        };
        f.write_str(name)
    }
}

/// Handles a pull request for `user`.
pub(crate) fn handle_pull(
    ctx: &HandlerContext,
    user: &UserId,
    request: &PullRequest,
) -> ServerResult<PullOk> {
    request.check_versions(&ctx.config.schema_version)?;
    if request.profile_id != user.as_str() {
        return Err(ServerError::Unauthorized(format!(
            "profile {} does not belong to the caller",
            request.profile_id
        )));
    }

    let response = run_in_transaction(&ctx.store, ctx.config.max_transaction_attempts, |tx| {
        pull_once(ctx, tx, user, request)
    })?;

    tracing::debug!(
        group = %request.client_group_id,
        order = response.cookie.order,
        patch = response.patch.len(),
        lmids = response.last_mutation_id_changes.len(),
        "pull served"
    );
    Ok(response)
}

fn pull_once(
    ctx: &HandlerContext,
    tx: &mut Transaction<'_>,
    user: &UserId,
    request: &PullRequest,
) -> ServerResult<PullOk> {
    let group_id = &request.client_group_id;

    trace_phase(PullPhase::LoadGroup, request);
    let mut group = match tx.client_group(group_id) {
        Some(group) if !group.is_owned_by(user) => {
            return Err(ServerError::Unauthorized(format!(
                "client group {group_id} belongs to another user"
            )));
        }
        Some(group) => group,
        None => ClientGroupRecord::new(group_id.clone(), user.clone()),
    };

    trace_phase(PullPhase::LoadPrevious, request);
    let previous = match &request.cookie {
        None => None,
        Some(cookie) => match tx.cvr(&cookie.cvr_id)? {
            Some(cvr) if &cvr.client_group_id == group_id => Some(cvr),
            _ => return Err(ServerError::ClientStateNotFound),
        },
    };

    trace_phase(PullPhase::ComputeView, request);
    let view = compute_view(tx, &ctx.schemas, user, group_id)?;
    let empty_entities = BTreeMap::new();
    let empty_lmids = BTreeMap::new();
    let (prev_entities, prev_lmids) = match &previous {
        Some(cvr) => (&cvr.entities, &cvr.client_last_mutation_ids),
        None => (&empty_entities, &empty_lmids),
    };
    let diff = diff_entities(prev_entities, &view.entities);
    let lmid_changes = last_mutation_id_changes(prev_lmids, &view.client_last_mutation_ids);

    if let Some(cookie) = &request.cookie {
        if diff.is_empty() && lmid_changes.is_empty() {
            return Ok(PullOk {
                cookie: cookie.clone(),
                last_mutation_id_changes: lmid_changes,
                patch: Vec::new(),
            });
        }
    }

    let order = request
        .cookie
        .as_ref()
        .map_or(0, |cookie| cookie.order)
        .max(group.cvr_version)
        + 1;
    group.cvr_version = order;
    tx.put_client_group(group);

    trace_phase(PullPhase::Patch, request);
    let patch = build_patch(tx, &ctx.schemas, user, previous.is_none(), &diff)?;

    trace_phase(PullPhase::Store, request);
    let cvr = CvrRecord {
        id: CvrId::generate(),
        client_group_id: group_id.clone(),
        order,
        entities: view.entities,
        client_last_mutation_ids: view.client_last_mutation_ids,
    };
    tx.put_cvr(&cvr)?;
    let pruned = prune(tx, group_id, ctx.config.cvr_retention);
    if !pruned.is_empty() {
        tracing::debug!(group = %group_id, count = pruned.len(), "pruned old CVRs");
    }

    Ok(PullOk {
        cookie: Cookie::new(order, cvr.id),
        last_mutation_id_changes: lmid_changes,
        patch,
    })
}

/// Clear (first pull only), then deletes, then puts with marshaled values.
fn build_patch(
    tx: &mut Transaction<'_>,
    schemas: &SchemaRegistry,
    user: &UserId,
    first: bool,
    diff: &CvrDiff,
) -> ServerResult<Vec<PatchOperation>> {
    let mut patch = Vec::with_capacity(1 + diff.put_count() + diff.del_count());
    if first {
        patch.push(PatchOperation::Clear);
    }

    for changes in diff.entities.values() {
        patch.extend(
            changes
                .dels
                .iter()
                .map(|key| PatchOperation::Del { key: key.clone() }),
        );
    }

    for (entity_type, changes) in &diff.entities {
        let schema = schemas
            .get(entity_type)
            .ok_or_else(|| ServerError::Internal(format!("no schema for `{entity_type}`")))?;
        for (key, row) in tx.rows(entity_type, user, &changes.puts) {
            let value = schema.marshal_value(&row.record)?;
            patch.push(PatchOperation::Put { key, value });
        }
    }
    Ok(patch)
}

fn trace_phase(phase: PullPhase, request: &PullRequest) {
    tracing::trace!(group = %request.client_group_id, %phase, "pull");
}
