//! The canonical push-then-pull scenario, at the protocol level.

use chrono::{TimeZone, Utc};
use cvrsync_core::{ClientGroupId, ClientId, UserId};
use cvrsync_protocol::{MutationRecord, PatchOperation, PullRequest, PullResponse, PushRequest};
use cvrsync_testkit::prelude::*;
use serde_json::json;

fn add_skill(harness: &SyncHarness, id: u64, skill: &str) -> MutationRecord {
    let at = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
    MutationRecord {
        id,
        client_id: ClientId::new("C"),
        name: ADD_SKILL.into(),
        args: harness.domain().add_skill_args(skill, at).unwrap(),
        timestamp: 1_714_550_400_000.0,
    }
}

#[test]
fn first_push_then_pull_from_null() {
    let harness = SyncHarness::new();
    let server = harness.server();
    let user = UserId::new("alice");

    let push = PushRequest::new("alice", "G".into(), SCHEMA_VERSION, vec![add_skill(&harness, 1, "kanji")]);
    server.handle_push(&user, &push).unwrap();

    let client = server
        .store()
        .begin()
        .client(&ClientId::new("C"))
        .expect("client record created");
    assert_eq!(client.last_mutation_id, 1);
    assert_eq!(client.client_group_id, ClientGroupId::new("G"));

    let pull = PullRequest::new("alice", "G".into(), SCHEMA_VERSION, None);
    let PullResponse::Ok(ok) = server.handle_pull(&user, &pull).unwrap() else {
        panic!("pull from null failed");
    };

    assert_eq!(ok.cookie.order, 1);
    assert_eq!(ok.last_mutation_id_changes[&ClientId::new("C")], 1);
    assert_eq!(
        ok.patch,
        vec![
            PatchOperation::Clear,
            PatchOperation::Put {
                key: "s/kanji".into(),
                value: json!({
                    "s": { "s": 0.0, "f": 5.0, "d": "2024-05-01T08:00:00.000Z", "r": 0 }
                }),
            },
        ]
    );
}

#[test]
fn review_writes_a_rating_row_and_reschedules() {
    let harness = SyncHarness::new();
    let phone = harness.client("alice", "phone");
    let at = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();

    phone.add_skill("kanji", at).unwrap();
    phone.rate_skill("kanji", Rating::Good, at).unwrap();
    phone.sync().unwrap();

    let confirmed = phone.replica.confirmed();
    let rating_key = format!("sr/kanji/{}", at.timestamp_millis());
    assert_eq!(confirmed[&rating_key], json!({ "r": "3" }));
    assert_eq!(confirmed["s/kanji"]["s"]["d"], json!("2024-05-03T08:00:00.000Z"));
    assert_eq!(confirmed["s/kanji"]["lr"], json!("3"));
}

#[test]
fn due_index_orders_skills_by_next_review() {
    let harness = SyncHarness::new();
    let phone = harness.client("alice", "phone");
    let at = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();

    for skill in ["kanji", "verbs", "particles"] {
        phone.add_skill(skill, at).unwrap();
    }
    phone.rate_skill("kanji", Rating::Easy, at).unwrap();
    phone.rate_skill("verbs", Rating::Hard, at).unwrap();
    phone.sync().unwrap();

    let order: Vec<String> = phone
        .replica
        .scan_index(SKILL_STATE, BY_DUE)
        .unwrap()
        .into_iter()
        .map(|entry| entry.key)
        .collect();
    assert_eq!(order, ["s/particles", "s/verbs", "s/kanji"]);
}

#[test]
fn removing_a_skill_drops_its_reviews_everywhere() {
    let harness = SyncHarness::new();
    let phone = harness.client("alice", "phone");
    let laptop = harness.client("alice", "laptop");
    let at = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();

    phone.add_skill("kanji", at).unwrap();
    phone.rate_skill("kanji", Rating::Again, at).unwrap();
    phone.add_skill("verbs", at).unwrap();
    harness.settle(&[&phone, &laptop]).unwrap();
    assert_eq!(laptop.replica.view().len(), 3);

    laptop.remove_skill("kanji").unwrap();
    harness.settle(&[&laptop, &phone]).unwrap();

    harness.assert_converged("alice", &[&phone, &laptop]);
    assert_eq!(phone.replica.view().keys().collect::<Vec<_>>(), ["s/verbs"]);
}

#[test]
fn concurrent_add_is_settled_by_the_server() {
    let harness = SyncHarness::new();
    let phone = harness.client("alice", "phone");
    let laptop = harness.client("alice", "laptop");
    let early = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
    let late = Utc.with_ymd_and_hms(2024, 5, 2, 8, 0, 0).unwrap();

    phone.add_skill("kanji", early).unwrap();
    laptop.add_skill("kanji", late).unwrap();
    phone.sync().unwrap();
    // The laptop's add runs in error mode on the server: acknowledged,
    // no write.
    laptop.sync().unwrap();

    harness.settle(&[&phone, &laptop]).unwrap();
    harness.assert_converged("alice", &[&phone, &laptop]);
    assert_eq!(
        laptop.replica.view()["s/kanji"]["s"]["d"],
        json!("2024-05-01T08:00:00.000Z")
    );
}

#[test]
fn two_learners_track_the_same_skill() {
    let harness = SyncHarness::new();
    let alice = harness.client("alice", "a-phone");
    let bob = harness.client("bob", "b-phone");
    let at = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();

    alice.add_skill("kanji", at).unwrap();
    alice.sync().unwrap();
    bob.add_skill("kanji", at).unwrap();
    bob.rate_skill("kanji", Rating::Easy, at).unwrap();
    bob.sync().unwrap();

    let stats = harness.server().stats();
    assert_eq!(stats.mutations_applied, 3);
    assert_eq!(stats.mutations_failed, 0);

    harness.settle(&[&alice]).unwrap();
    harness.assert_converged("alice", &[&alice]);
    harness.assert_converged("bob", &[&bob]);
    assert_eq!(alice.replica.confirmed()["s/kanji"]["s"]["r"], json!(0));
    assert_eq!(bob.replica.confirmed()["s/kanji"]["s"]["r"], json!(1));
    assert_eq!(harness.server_view("alice").len(), 1);
    assert_eq!(harness.server_view("bob").len(), 2);
}
