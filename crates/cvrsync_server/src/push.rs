//! Push handling: applying a batch of mutations.
//!
//! Each mutation runs in its own transaction:
//! 1. Load or create the client group; it must belong to the caller
//! 2. Load or create the client; it must belong to the group
//! 3. Ids below the next expected id are replays and change nothing
//! 4. Ids above it are gaps and stop the batch
//! 5. Otherwise the mutator runs; if it fails, the transaction is dropped
//!    and the mutation is replayed in error mode (bookkeeping only)
//! 6. The client's last mutation id advances in either mode

use crate::error::{ServerError, ServerResult};
use crate::handler::HandlerContext;
use crate::txn::run_in_transaction;
use cvrsync_core::{
    ClientGroupId, ClientGroupRecord, ClientRecord, DomainTx, Transaction, UserId,
};
use cvrsync_protocol::{MutationRecord, PushRequest};

/// Whether the mutator runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Normal,
    Error,
}

/// What happened to one mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationOutcome {
    /// The mutator ran and its writes were committed.
    Applied,
    /// Already accounted for by an earlier push.
    Replayed,
    /// The mutator failed; only the counter advanced.
    Failed,
}

/// Counts of mutation outcomes in one push.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PushSummary {
    /// Mutations applied.
    pub applied: usize,
    /// Mutations skipped as replays.
    pub replayed: usize,
    /// Mutations whose mutator failed.
    pub failed: usize,
}

impl PushSummary {
    fn record(&mut self, outcome: MutationOutcome) {
        match outcome {
            MutationOutcome::Applied => self.applied += 1,
            MutationOutcome::Replayed => self.replayed += 1,
            MutationOutcome::Failed => self.failed += 1,
        }
    }
}

/// Handles a push request for `user`.
///
/// Mutations before a failing one stay committed; an authorization or
/// sequencing error stops the batch.
pub(crate) fn handle_push(
    ctx: &HandlerContext,
    user: &UserId,
    request: &PushRequest,
) -> ServerResult<PushSummary> {
    request.check_versions(&ctx.config.schema_version)?;
    request.validate(ctx.config.max_push_batch)?;
    if request.profile_id != user.as_str() {
        return Err(ServerError::Unauthorized(format!(
            "profile {} does not belong to the caller",
            request.profile_id
        )));
    }

    let mut summary = PushSummary::default();
    for mutation in &request.mutations {
        let outcome = apply_one(ctx, user, &request.client_group_id, mutation)?;
        tracing::debug!(
            client = %mutation.client_id,
            id = mutation.id,
            name = %mutation.name,
            ?outcome,
            "mutation processed"
        );
        summary.record(outcome);
    }
    Ok(summary)
}

fn apply_one(
    ctx: &HandlerContext,
    user: &UserId,
    group: &ClientGroupId,
    mutation: &MutationRecord,
) -> ServerResult<MutationOutcome> {
    let attempts = ctx.config.max_transaction_attempts;
    let normal = run_in_transaction(&ctx.store, attempts, |tx| {
        process(ctx, tx, user, group, mutation, Mode::Normal)
    });

    match normal {
        Err(ServerError::MutatorFailed { name, message }) => {
            tracing::warn!(
                client = %mutation.client_id,
                id = mutation.id,
                mutator = %name,
                %message,
                "mutation failed, replaying in error mode"
            );
            run_in_transaction(&ctx.store, attempts, |tx| {
                process(ctx, tx, user, group, mutation, Mode::Error)
            })
        }
        other => other,
    }
}

fn process(
    ctx: &HandlerContext,
    tx: &mut Transaction<'_>,
    user: &UserId,
    group_id: &ClientGroupId,
    mutation: &MutationRecord,
    mode: Mode,
) -> ServerResult<MutationOutcome> {
    let group = match tx.client_group(group_id) {
        Some(group) if !group.is_owned_by(user) => {
            return Err(ServerError::Unauthorized(format!(
                "client group {group_id} belongs to another user"
            )));
        }
        Some(group) => group,
        None => ClientGroupRecord::new(group_id.clone(), user.clone()),
    };

    let mut client = match tx.client(&mutation.client_id) {
        Some(client) if &client.client_group_id != group_id => {
            return Err(ServerError::Unauthorized(format!(
                "client {} belongs to another client group",
                mutation.client_id
            )));
        }
        Some(client) => client,
        None => ClientRecord::new(mutation.client_id.clone(), group_id.clone()),
    };

    let expected = client.next_mutation_id();
    if mutation.id < expected {
        return Ok(MutationOutcome::Replayed);
    }
    if mutation.id > expected {
        return Err(ServerError::MutationOutOfOrder {
            client_id: mutation.client_id.clone(),
            expected,
            received: mutation.id,
        });
    }

    if mode == Mode::Normal {
        run_mutator(ctx, tx, user, mutation)?;
    }

    client.last_mutation_id = expected;
    tx.put_client(client);
    tx.put_client_group(group);

    Ok(match mode {
        Mode::Normal => MutationOutcome::Applied,
        Mode::Error => MutationOutcome::Failed,
    })
}

/// Decodes the arguments and runs the mutator. Every failure here, unknown
/// name included, is a business error.
fn run_mutator(
    ctx: &HandlerContext,
    tx: &mut Transaction<'_>,
    user: &UserId,
    mutation: &MutationRecord,
) -> ServerResult<()> {
    let mutator = ctx
        .mutators
        .get(&mutation.name)
        .ok_or_else(|| ServerError::mutator_failed(&mutation.name, "no such mutator"))?;
    let args = mutator
        .args()
        .unmarshal(&mutation.args)
        .map_err(|e| ServerError::mutator_failed(&mutation.name, e))?;

    let mut domain = DomainTx::new(tx, user.clone());
    mutator
        .apply(&mut domain, &args)
        .map_err(|e| ServerError::mutator_failed(&mutation.name, e))
}
