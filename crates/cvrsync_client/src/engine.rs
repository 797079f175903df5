//! Sync engine state machine.

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::replica::{PullOutcome, Replica};
use crate::transport::SyncTransport;
use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// The current state of the sync engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// Engine is idle, not syncing.
    Idle,
    /// Engine is pushing pending mutations.
    Pushing,
    /// Engine is pulling the patch since its cookie.
    Pulling,
    /// Engine has completed a sync cycle.
    Synced,
    /// Engine encountered an error.
    Error,
    /// Engine is waiting before retrying.
    RetryWait,
}

impl SyncState {
    /// Returns true if the engine is in an active sync state.
    pub fn is_active(&self) -> bool {
        matches!(self, SyncState::Pushing | SyncState::Pulling)
    }

    /// Returns true if the engine can start a new sync.
    pub fn can_start_sync(&self) -> bool {
        matches!(
            self,
            SyncState::Idle | SyncState::Synced | SyncState::Error | SyncState::RetryWait
        )
    }
}

/// Statistics about sync operations.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Total number of sync cycles completed.
    pub cycles_completed: u64,
    /// Total number of mutations sent (replays included).
    pub mutations_pushed: u64,
    /// Total number of patch operations applied.
    pub patch_operations_applied: u64,
    /// Total number of mutations the server acknowledged.
    pub mutations_acknowledged: u64,
    /// Number of full resyncs after the server lost the client's state.
    pub resyncs: u64,
    /// Total number of retries.
    pub retries: u64,
    /// Last sync time.
    pub last_sync_time: Option<Instant>,
    /// Last error message.
    pub last_error: Option<String>,
}

/// Result of a sync cycle.
#[derive(Debug, Clone)]
pub struct SyncCycleResult {
    /// Mutations sent.
    pub pushed: u64,
    /// Patch operations applied.
    pub applied: u64,
    /// Mutations acknowledged by this pull.
    pub acknowledged: u64,
    /// Whether the cycle needed a full resync.
    pub resynced: bool,
    /// Duration of the sync cycle.
    pub duration: Duration,
}

/// Drives a [`Replica`] against a server: push pending, then pull.
pub struct SyncEngine<T: SyncTransport> {
    config: SyncConfig,
    transport: Arc<T>,
    replica: Arc<Replica>,
    state: RwLock<SyncState>,
    stats: RwLock<SyncStats>,
    cancelled: AtomicBool,
}

impl<T: SyncTransport> SyncEngine<T> {
    /// Creates a new sync engine.
    pub fn new(config: SyncConfig, transport: T, replica: Arc<Replica>) -> Self {
        Self {
            config,
            transport: Arc::new(transport),
            replica,
            state: RwLock::new(SyncState::Idle),
            stats: RwLock::new(SyncStats::default()),
            cancelled: AtomicBool::new(false),
        }
    }

    /// Gets the current state.
    pub fn state(&self) -> SyncState {
        *self.state.read()
    }

    /// Gets the current stats.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    /// Returns the replica being synced.
    pub fn replica(&self) -> &Arc<Replica> {
        &self.replica
    }

    /// Returns the transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Cancels an ongoing sync at its next checkpoint.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    fn check_cancelled(&self) -> SyncResult<()> {
        if self.cancelled.load(Ordering::SeqCst) {
            Err(SyncError::Cancelled)
        } else {
            Ok(())
        }
    }

    fn set_state(&self, state: SyncState) {
        let previous = std::mem::replace(&mut *self.state.write(), state);
        if previous != state {
            tracing::trace!(from = ?previous, to = ?state, "sync state");
        }
    }

    /// Performs one sync cycle: push pending mutations, then pull.
    pub fn sync(&self) -> SyncResult<SyncCycleResult> {
        let start = Instant::now();
        self.cancelled.store(false, Ordering::SeqCst);

        let current = self.state();
        if !current.can_start_sync() {
            return Err(SyncError::InvalidStateTransition {
                from: format!("{current:?}"),
                to: "Pushing".into(),
            });
        }

        match self.run_cycle(start) {
            Ok(result) => {
                self.set_state(SyncState::Synced);
                let mut stats = self.stats.write();
                stats.cycles_completed += 1;
                stats.mutations_pushed += result.pushed;
                stats.patch_operations_applied += result.applied;
                stats.mutations_acknowledged += result.acknowledged;
                stats.resyncs += u64::from(result.resynced);
                stats.last_sync_time = Some(Instant::now());
                stats.last_error = None;
                tracing::debug!(
                    pushed = result.pushed,
                    applied = result.applied,
                    acknowledged = result.acknowledged,
                    resynced = result.resynced,
                    "sync cycle complete"
                );
                Ok(result)
            }
            Err(e) => {
                self.set_state(SyncState::Error);
                self.stats.write().last_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    fn run_cycle(&self, start: Instant) -> SyncResult<SyncCycleResult> {
        self.set_state(SyncState::Pushing);
        let pushed = self.push_pending()?;
        self.check_cancelled()?;

        self.set_state(SyncState::Pulling);
        let (applied, acknowledged, resynced) = self.pull()?;

        Ok(SyncCycleResult {
            pushed,
            applied,
            acknowledged,
            resynced,
            duration: start.elapsed(),
        })
    }

    /// Sends every pending mutation in batches. Pending mutations stay
    /// queued until a pull acknowledges them.
    fn push_pending(&self) -> SyncResult<u64> {
        let mut pushed = 0;
        for request in self.replica.push_requests(self.config.push_batch_size) {
            self.check_cancelled()?;
            self.transport.push(&request)?;
            pushed += request.mutations.len() as u64;
        }
        Ok(pushed)
    }

    /// Pulls and applies; on lost state, pulls once more from scratch.
    fn pull(&self) -> SyncResult<(u64, u64, bool)> {
        let mut resynced = false;
        loop {
            let response = self.transport.pull(&self.replica.pull_request())?;
            match self.replica.apply_pull(response)? {
                PullOutcome::Applied {
                    operations,
                    acknowledged,
                } => return Ok((operations as u64, acknowledged as u64, resynced)),
                PullOutcome::Unchanged => return Ok((0, 0, resynced)),
                PullOutcome::ResyncRequired if resynced => return Err(SyncError::ResyncFailed),
                PullOutcome::ResyncRequired => {
                    resynced = true;
                    self.check_cancelled()?;
                }
            }
        }
    }

    /// Performs a sync with exponential backoff on retryable errors.
    pub fn sync_with_retry(&self) -> SyncResult<SyncCycleResult> {
        let retry = &self.config.retry;
        let mut attempt = 0;

        loop {
            if attempt > 0 {
                self.set_state(SyncState::RetryWait);
                std::thread::sleep(retry.delay_for_attempt(attempt));
                self.stats.write().retries += 1;
            }

            match self.sync() {
                Ok(result) => return Ok(result),
                Err(e) if e.is_retryable() && attempt + 1 < retry.max_attempts => {
                    tracing::warn!(attempt, error = %e, "sync failed, retrying");
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl<T: SyncTransport> fmt::Debug for SyncEngine<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncEngine")
            .field("state", &self.state())
            .field("replica", &self.replica)
            .field("connected", &self.transport.is_connected())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ReplicaConfig, RetryConfig};
    use crate::replica::{FnLocalMutator, LocalMutators, ReplicaTx};
    use cvrsync_core::CvrId;
    use cvrsync_protocol::{Cookie, ErrorResponse, PullOk, PullRequest, PullResponse, PushRequest};
    use cvrsync_schema::SchemaRegistry;
    use parking_lot::Mutex;
    use serde_json::{json, Value as JsonValue};
    use std::collections::{BTreeMap, VecDeque};

    #[derive(Default)]
    struct ScriptedTransport {
        pulls: Mutex<VecDeque<SyncResult<PullResponse>>>,
        pushes: Mutex<Vec<PushRequest>>,
        push_failures: Mutex<VecDeque<SyncError>>,
    }

    impl ScriptedTransport {
        fn with_pulls(pulls: Vec<SyncResult<PullResponse>>) -> Self {
            Self {
                pulls: Mutex::new(pulls.into()),
                ..Self::default()
            }
        }
    }

    impl SyncTransport for ScriptedTransport {
        fn push(&self, request: &PushRequest) -> SyncResult<()> {
            if let Some(err) = self.push_failures.lock().pop_front() {
                return Err(err);
            }
            self.pushes.lock().push(request.clone());
            Ok(())
        }

        fn pull(&self, _request: &PullRequest) -> SyncResult<PullResponse> {
            self.pulls
                .lock()
                .pop_front()
                .unwrap_or_else(|| Err(SyncError::transport_fatal("no scripted pull")))
        }

        fn is_connected(&self) -> bool {
            true
        }

        fn close(&self) -> SyncResult<()> {
            Ok(())
        }
    }

    fn replica() -> Arc<Replica> {
        let noop = FnLocalMutator::new("noop", |_tx: &mut ReplicaTx<'_>, _args: &JsonValue| Ok(()));
        Arc::new(Replica::new(
            ReplicaConfig::new("u", "1").with_client_id("c1"),
            Arc::new(SchemaRegistry::new()),
            LocalMutators::new().with(noop),
        ))
    }

    fn ok(order: u64, acked: Option<u64>) -> SyncResult<PullResponse> {
        Ok(PullResponse::Ok(PullOk {
            cookie: Cookie::new(order, CvrId::generate()),
            last_mutation_id_changes: acked
                .map(|id| BTreeMap::from([("c1".into(), id)]))
                .unwrap_or_default(),
            patch: Vec::new(),
        }))
    }

    #[test]
    fn sync_state_checks() {
        assert!(SyncState::Idle.can_start_sync());
        assert!(SyncState::Synced.can_start_sync());
        assert!(SyncState::Error.can_start_sync());
        assert!(!SyncState::Pulling.can_start_sync());
        assert!(!SyncState::Pushing.can_start_sync());

        assert!(SyncState::Pulling.is_active());
        assert!(!SyncState::Idle.is_active());
    }

    #[test]
    fn push_then_pull_acknowledges() {
        let replica = replica();
        for _ in 0..3 {
            replica.mutate("noop", json!({})).unwrap();
        }
        let transport = ScriptedTransport::with_pulls(vec![ok(1, Some(3))]);
        let engine = SyncEngine::new(
            SyncConfig::new().with_push_batch_size(2),
            transport,
            Arc::clone(&replica),
        );

        let result = engine.sync().unwrap();
        assert_eq!(result.pushed, 3);
        assert_eq!(result.acknowledged, 3);
        assert_eq!(engine.state(), SyncState::Synced);
        assert_eq!(replica.pending_count(), 0);
        assert_eq!(engine.transport().pushes.lock().len(), 2);
        assert_eq!(engine.stats().cycles_completed, 1);
    }

    #[test]
    fn lost_state_triggers_one_resync() {
        let transport = ScriptedTransport::with_pulls(vec![
            Ok(PullResponse::Error(ErrorResponse::ClientStateNotFound)),
            ok(9, None),
        ]);
        let engine = SyncEngine::new(SyncConfig::new(), transport, replica());

        let result = engine.sync().unwrap();
        assert!(result.resynced);
        assert_eq!(engine.stats().resyncs, 1);
        assert_eq!(engine.replica().cookie().unwrap().order, 9);
    }

    #[test]
    fn repeated_state_loss_fails() {
        let lost = || Ok(PullResponse::Error(ErrorResponse::ClientStateNotFound));
        let transport = ScriptedTransport::with_pulls(vec![lost(), lost()]);
        let engine = SyncEngine::new(SyncConfig::new(), transport, replica());

        assert!(matches!(engine.sync(), Err(SyncError::ResyncFailed)));
        assert_eq!(engine.state(), SyncState::Error);
        assert!(engine.stats().last_error.is_some());
    }

    #[test]
    fn retry_recovers_from_transient_push_failure() {
        let replica = replica();
        replica.mutate("noop", json!({})).unwrap();
        let transport = ScriptedTransport::with_pulls(vec![ok(1, Some(1))]);
        transport
            .push_failures
            .lock()
            .push_back(SyncError::transport_retryable("reset"));

        let retry = RetryConfig::new(3)
            .with_initial_delay(Duration::from_millis(1))
            .with_jitter(false);
        let engine = SyncEngine::new(SyncConfig::new().with_retry(retry), transport, replica);

        let result = engine.sync_with_retry().unwrap();
        assert_eq!(result.acknowledged, 1);
        assert_eq!(engine.stats().retries, 1);
    }

    #[test]
    fn fatal_errors_are_not_retried() {
        let replica = replica();
        replica.mutate("noop", json!({})).unwrap();
        let transport = ScriptedTransport::default();
        transport
            .push_failures
            .lock()
            .push_back(SyncError::transport_fatal("bad certificate"));
        let engine = SyncEngine::new(SyncConfig::new(), transport, replica);

        assert!(engine.sync_with_retry().is_err());
        assert_eq!(engine.stats().retries, 0);
        assert_eq!(engine.state(), SyncState::Error);
    }
}
