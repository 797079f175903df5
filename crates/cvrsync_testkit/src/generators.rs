//! Property-based test generators using proptest.
//!
//! Sessions are scripts of local mutations and sync points spread over a
//! few clients. Skill names come from a small pool so that clients collide
//! on the same entities.

use crate::scheduler::Rating;
use chrono::{DateTime, Duration, Utc};
use proptest::prelude::*;

/// Skill names sessions draw from.
pub const SKILL_POOL: [&str; 5] = ["kanji", "verbs", "listening", "particles", "counters"];

/// Strategy for skill names.
pub fn skill_strategy() -> impl Strategy<Value = String> {
    prop::sample::select(SKILL_POOL.to_vec()).prop_map(str::to_string)
}

/// Strategy for ratings.
pub fn rating_strategy() -> impl Strategy<Value = Rating> {
    prop::sample::select(Rating::ALL.to_vec())
}

/// Strategy for millisecond-precision timestamps between 2020 and 2030.
pub fn timestamp_strategy() -> impl Strategy<Value = DateTime<Utc>> {
    (1_577_836_800_000i64..1_893_456_000_000i64).prop_filter_map("in range", |ms| {
        DateTime::<Utc>::from_timestamp_millis(ms)
    })
}

/// A local mutation in a generated session.
#[derive(Debug, Clone, PartialEq)]
pub enum SkillOp {
    /// `addSkill`.
    Add {
        /// Skill name.
        skill: String,
    },
    /// `rateSkill`.
    Rate {
        /// Skill name.
        skill: String,
        /// Rating given.
        rating: Rating,
    },
    /// `removeSkill`.
    Remove {
        /// Skill name.
        skill: String,
    },
}

/// Strategy for a single op, weighted towards reviews.
pub fn skill_op_strategy() -> impl Strategy<Value = SkillOp> {
    prop_oneof![
        3 => skill_strategy().prop_map(|skill| SkillOp::Add { skill }),
        5 => (skill_strategy(), rating_strategy())
            .prop_map(|(skill, rating)| SkillOp::Rate { skill, rating }),
        1 => skill_strategy().prop_map(|skill| SkillOp::Remove { skill }),
    ]
}

/// One step of a session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionStep {
    /// Client `client` runs `op` locally.
    Mutate {
        /// Index of the acting client.
        client: usize,
        /// The mutation.
        op: SkillOp,
    },
    /// Client `client` runs one sync cycle.
    Sync {
        /// Index of the syncing client.
        client: usize,
    },
}

/// Strategy for sessions of up to `max_steps` steps over `clients` clients.
pub fn session_strategy(clients: usize, max_steps: usize) -> impl Strategy<Value = Vec<SessionStep>> {
    let clients = clients.max(1);
    let step = prop_oneof![
        4 => (0..clients, skill_op_strategy())
            .prop_map(|(client, op)| SessionStep::Mutate { client, op }),
        1 => (0..clients).prop_map(|client| SessionStep::Sync { client }),
    ];
    prop::collection::vec(step, 1..=max_steps.max(1))
}

/// Timestamp of step `index` of a session starting at `start`: one minute
/// apart, so reviews never share a key.
pub fn step_time(start: DateTime<Utc>, index: usize) -> DateTime<Utc> {
    start + Duration::minutes(index as i64)
}
