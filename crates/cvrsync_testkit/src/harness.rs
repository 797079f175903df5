//! In-process sync harness: one server, many clients.
//!
//! ```rust,ignore
//! let harness = SyncHarness::new();
//! let phone = harness.client("alice", "phone");
//! phone.add_skill("kanji", at)?;
//! phone.sync()?;
//! harness.assert_converged("alice", &[&phone]);
//! ```

use crate::domain::{LearningDomain, ADD_SKILL, RATE_SKILL, REMOVE_SKILL};
use crate::generators::{step_time, SessionStep, SkillOp};
use crate::scheduler::Rating;
use chrono::{DateTime, Utc};
use cvrsync_client::{
    KvState, LoopbackTransport, Replica, ReplicaConfig, SyncConfig, SyncCycleResult, SyncEngine,
    SyncResult,
};
use cvrsync_core::{DomainTx, UserId};
use cvrsync_server::{ServerConfig, SyncServer};
use std::sync::Arc;

/// Schema version the harness server and clients agree on.
pub const SCHEMA_VERSION: &str = "1";

/// A client of the harness: a replica plus the engine syncing it.
#[derive(Debug)]
pub struct TestClient {
    domain: LearningDomain,
    /// The replica.
    pub replica: Arc<Replica>,
    /// Its sync engine.
    pub engine: SyncEngine<LoopbackTransport>,
}

impl TestClient {
    /// Runs `addSkill` locally.
    pub fn add_skill(&self, skill: &str, at: DateTime<Utc>) -> SyncResult<u64> {
        self.replica
            .mutate(ADD_SKILL, self.domain.add_skill_args(skill, at)?)
    }

    /// Runs `rateSkill` locally.
    pub fn rate_skill(&self, skill: &str, rating: Rating, at: DateTime<Utc>) -> SyncResult<u64> {
        self.replica
            .mutate(RATE_SKILL, self.domain.rate_skill_args(skill, rating, at)?)
    }

    /// Runs `removeSkill` locally.
    pub fn remove_skill(&self, skill: &str) -> SyncResult<u64> {
        self.replica
            .mutate(REMOVE_SKILL, self.domain.remove_skill_args(skill)?)
    }

    /// Runs a generated op locally.
    pub fn apply(&self, op: &SkillOp, at: DateTime<Utc>) -> SyncResult<u64> {
        match op {
            SkillOp::Add { skill } => self.add_skill(skill, at),
            SkillOp::Rate { skill, rating } => self.rate_skill(skill, *rating, at),
            SkillOp::Remove { skill } => self.remove_skill(skill),
        }
    }

    /// Runs one sync cycle.
    pub fn sync(&self) -> SyncResult<SyncCycleResult> {
        self.engine.sync()
    }
}

/// One in-process server running the learning-progress domain.
#[derive(Debug)]
pub struct SyncHarness {
    domain: LearningDomain,
    server: Arc<SyncServer>,
}

impl SyncHarness {
    /// Creates a harness with the default server configuration.
    pub fn new() -> Self {
        Self::with_config(ServerConfig::new(SCHEMA_VERSION))
    }

    /// Creates a harness with `config`.
    pub fn with_config(config: ServerConfig) -> Self {
        let domain = LearningDomain::fixture();
        let server = SyncServer::new(
            config,
            domain.schemas().expect("fixture schemas register"),
            domain.server_mutators().expect("fixture mutators register"),
        );
        Self {
            domain,
            server: Arc::new(server),
        }
    }

    /// Returns the domain.
    pub fn domain(&self) -> &LearningDomain {
        &self.domain
    }

    /// Returns the server.
    pub fn server(&self) -> &Arc<SyncServer> {
        &self.server
    }

    /// Creates a client of `user` in client group `group`. The client id is
    /// `<group>-client`.
    pub fn client(&self, user: &str, group: &str) -> TestClient {
        self.client_with_id(user, group, &format!("{group}-client"))
    }

    /// Creates a client with an explicit client id.
    pub fn client_with_id(&self, user: &str, group: &str, client_id: &str) -> TestClient {
        let replica = Arc::new(Replica::new(
            ReplicaConfig::new(user, SCHEMA_VERSION)
                .with_client_group_id(group)
                .with_client_id(client_id),
            Arc::new(self.domain.schemas().expect("fixture schemas register")),
            self.domain.local_mutators(),
        ));
        let engine = SyncEngine::new(
            SyncConfig::new(),
            LoopbackTransport::new(Arc::clone(&self.server), user),
            Arc::clone(&replica),
        );
        TestClient {
            domain: self.domain.clone(),
            replica,
            engine,
        }
    }

    /// Returns the marshaled server-side state of `user`, keyed like a
    /// replica.
    pub fn server_view(&self, user: &str) -> KvState {
        let mut tx = self.server.store().begin();
        let mut domain = DomainTx::new(&mut tx, UserId::new(user));
        let mut view = KvState::new();
        for schema in [self.domain.skill_state(), self.domain.skill_rating()] {
            for (key, record) in domain.scan(schema) {
                let value = schema
                    .marshal_value(&record)
                    .expect("stored rows always marshal");
                view.insert(key, value);
            }
        }
        tx.abort();
        view
    }

    /// Plays `session` against `clients`. Local mutations a replica refuses
    /// are dropped, like a UI would; sync failures abort the session.
    pub fn play(
        &self,
        clients: &[TestClient],
        start: DateTime<Utc>,
        session: &[SessionStep],
    ) -> SyncResult<()> {
        for (index, step) in session.iter().enumerate() {
            match step {
                SessionStep::Mutate { client, op } => {
                    let _ = clients[*client % clients.len()].apply(op, step_time(start, index));
                }
                SessionStep::Sync { client } => {
                    clients[*client % clients.len()].sync()?;
                }
            }
        }
        Ok(())
    }

    /// Syncs every client until a full round moves nothing. Returns the
    /// number of rounds.
    pub fn settle(&self, clients: &[&TestClient]) -> SyncResult<usize> {
        const MAX_ROUNDS: usize = 8;
        for round in 1..=MAX_ROUNDS {
            let mut moved = false;
            for client in clients {
                let result = client.sync()?;
                moved |= result.pushed > 0 || result.applied > 0;
            }
            if !moved {
                return Ok(round);
            }
        }
        panic!("clients did not settle within {MAX_ROUNDS} rounds");
    }

    /// Asserts that every client shows exactly the server state of `user`
    /// and has nothing pending.
    pub fn assert_converged(&self, user: &str, clients: &[&TestClient]) {
        let expected = self.server_view(user);
        for client in clients {
            assert_eq!(
                client.replica.pending_count(),
                0,
                "{} still has pending mutations",
                client.replica.client_id()
            );
            assert_eq!(
                client.replica.view(),
                expected,
                "{} diverged from the server",
                client.replica.client_id()
            );
        }
    }
}

impl Default for SyncHarness {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap()
    }

    #[test]
    fn a_lone_client_converges() {
        let harness = SyncHarness::new();
        let phone = harness.client("alice", "phone");
        phone.add_skill("kanji", at()).unwrap();
        phone.rate_skill("kanji", Rating::Good, at()).unwrap();

        harness.settle(&[&phone]).unwrap();
        harness.assert_converged("alice", &[&phone]);
        assert_eq!(harness.server_view("alice").len(), 2);
    }

    #[test]
    fn refused_local_ops_are_dropped() {
        let harness = SyncHarness::new();
        let phone = harness.client("alice", "phone");
        let session = [
            SessionStep::Mutate {
                client: 0,
                op: SkillOp::Remove {
                    skill: "kanji".into(),
                },
            },
            SessionStep::Sync { client: 0 },
        ];
        harness
            .play(std::slice::from_ref(&phone), at(), &session)
            .unwrap();
        assert_eq!(phone.replica.next_mutation_id(), 1);
    }
}
