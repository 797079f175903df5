//! Replay command implementation.
//!
//! Plays a scripted push/pull session through the POST router of an
//! in-process server running the learning-progress fixture domain.
//!
//! ```json
//! {
//!   "schemaVersion": "1",
//!   "cvrRetention": 4,
//!   "steps": [
//!     { "op": "push", "user": "alice", "clientGroupId": "G",
//!       "mutations": [{ "id": 1, "clientId": "C", "name": "addSkill",
//!                       "args": { "skill": "kanji", "at": 1714550400000 },
//!                       "timestamp": 1714550400000 }] },
//!     { "op": "pull", "user": "alice", "clientGroupId": "G" }
//!   ]
//! }
//! ```
//!
//! A pull without a `cookie` field uses the last cookie the group received;
//! `"cookie": null` forces a full pull.

use crate::error::{CliError, CliResult};
use cvrsync_core::UserId;
use cvrsync_protocol::{
    Cookie, ErrorResponse, MutationRecord, PullRequest, PullResponse, PushRequest,
};
use cvrsync_server::{PostResponse, ServerConfig, SyncServer, PULL_PATH, PUSH_PATH};
use cvrsync_testkit::LearningDomain;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

fn default_schema_version() -> String {
    "1".to_string()
}

/// A replay script.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Script {
    /// Schema version of the server and of every request.
    #[serde(default = "default_schema_version")]
    pub schema_version: String,
    /// CVRs kept per client group.
    #[serde(default)]
    pub cvr_retention: Option<usize>,
    /// Steps, in order.
    pub steps: Vec<Step>,
}

/// One scripted request.
#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase", deny_unknown_fields)]
pub enum Step {
    /// Push mutations.
    Push {
        /// Authenticated user, also sent as the profile id.
        user: String,
        /// Client group.
        #[serde(rename = "clientGroupId")]
        client_group_id: String,
        /// Mutations to push.
        mutations: Vec<MutationRecord>,
    },
    /// Pull changes.
    Pull {
        /// Authenticated user, also sent as the profile id.
        user: String,
        /// Client group.
        #[serde(rename = "clientGroupId")]
        client_group_id: String,
        /// `None` when absent: reuse the group's last cookie.
        #[serde(default, deserialize_with = "explicit_cookie")]
        cookie: Option<Option<Cookie>>,
    },
}

fn explicit_cookie<'de, D>(deserializer: D) -> Result<Option<Option<Cookie>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<Cookie>::deserialize(deserializer).map(Some)
}

/// Outcome of one step.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepReport {
    /// Zero-based step index.
    pub step: usize,
    /// `push` or `pull`.
    pub op: &'static str,
    /// Acting user.
    pub user: String,
    /// Client group.
    pub client_group_id: String,
    /// HTTP status the router answered with.
    pub status: u16,
    /// One-line description.
    pub summary: String,
    /// Response body, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<JsonValue>,
}

/// Reads and replays the script at `path`.
pub fn run(path: &Path) -> CliResult<Vec<StepReport>> {
    let text = fs::read_to_string(path).map_err(|source| CliError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let script: Script = serde_json::from_str(&text)?;
    replay(&script)
}

/// Replays `script` against a fresh server.
pub fn replay(script: &Script) -> CliResult<Vec<StepReport>> {
    let domain = LearningDomain::fixture();
    let mut config = ServerConfig::new(script.schema_version.clone());
    if let Some(retention) = script.cvr_retention {
        config = config.with_cvr_retention(retention);
    }
    let server = SyncServer::new(config, domain.schemas()?, domain.server_mutators()?);

    let mut cookies: BTreeMap<String, Cookie> = BTreeMap::new();
    let mut reports = Vec::with_capacity(script.steps.len());

    for (step, request) in script.steps.iter().enumerate() {
        let report = match request {
            Step::Push {
                user,
                client_group_id,
                mutations,
            } => {
                let request = PushRequest::new(
                    user.clone(),
                    client_group_id.as_str().into(),
                    script.schema_version.clone(),
                    mutations.clone(),
                );
                let response = server.handle_post(PUSH_PATH, &UserId::new(user), &request.encode()?);
                let summary = if response.is_success() {
                    format!("{} mutation(s) accepted", mutations.len())
                } else {
                    describe_error(&response)
                };
                report(step, "push", user, client_group_id, summary, response)?
            }
            Step::Pull {
                user,
                client_group_id,
                cookie,
            } => {
                let cookie = match cookie {
                    Some(explicit) => *explicit,
                    None => cookies.get(client_group_id).copied(),
                };
                let request = PullRequest::new(
                    user.clone(),
                    client_group_id.as_str().into(),
                    script.schema_version.clone(),
                    cookie,
                );
                let response = server.handle_post(PULL_PATH, &UserId::new(user), &request.encode()?);
                let summary = if response.is_success() {
                    match PullResponse::decode(&response.body).map_err(|e| CliError::Script {
                        step,
                        message: e.to_string(),
                    })? {
                        PullResponse::Ok(ok) => {
                            cookies.insert(client_group_id.clone(), ok.cookie);
                            format!(
                                "order {}, {} patch op(s), {} client(s) advanced",
                                ok.cookie.order,
                                ok.patch.len(),
                                ok.last_mutation_id_changes.len()
                            )
                        }
                        PullResponse::Error(ErrorResponse::ClientStateNotFound) => {
                            cookies.remove(client_group_id);
                            "client state not found, cookie dropped".to_string()
                        }
                        PullResponse::Error(other) => format!("{other:?}"),
                    }
                } else {
                    describe_error(&response)
                };
                report(step, "pull", user, client_group_id, summary, response)?
            }
        };
        tracing::debug!(step, op = report.op, status = report.status, "step replayed");
        reports.push(report);
    }

    tracing::info!(steps = reports.len(), "replay finished");
    Ok(reports)
}

fn describe_error(response: &PostResponse) -> String {
    match ErrorResponse::decode(&response.body) {
        Ok(error) => format!("rejected: {error:?}"),
        Err(_) => "rejected".to_string(),
    }
}

fn report(
    step: usize,
    op: &'static str,
    user: &str,
    client_group_id: &str,
    summary: String,
    response: PostResponse,
) -> CliResult<StepReport> {
    let body = if response.body.is_empty() {
        None
    } else {
        Some(serde_json::from_slice(&response.body)?)
    };
    Ok(StepReport {
        step,
        op,
        user: user.to_string(),
        client_group_id: client_group_id.to_string(),
        status: response.status,
        summary,
        response: body,
    })
}

/// Renders reports as text, one line per step.
pub fn render_text(reports: &[StepReport]) -> String {
    reports
        .iter()
        .map(|r| {
            format!(
                "#{:<3} {:<4} {}/{} -> {} {}\n",
                r.step, r.op, r.user, r.client_group_id, r.status, r.summary
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const SCRIPT: &str = r#"{
        "steps": [
            { "op": "push", "user": "alice", "clientGroupId": "G",
              "mutations": [{ "id": 1, "clientId": "C", "name": "addSkill",
                              "args": { "skill": "kanji", "at": 1714550400000 },
                              "timestamp": 1714550400000 }] },
            { "op": "pull", "user": "alice", "clientGroupId": "G" },
            { "op": "pull", "user": "alice", "clientGroupId": "G" },
            { "op": "pull", "user": "alice", "clientGroupId": "G", "cookie": null },
            { "op": "push", "user": "alice", "clientGroupId": "G",
              "mutations": [{ "id": 3, "clientId": "C", "name": "removeSkill",
                              "args": { "skill": "kanji" }, "timestamp": 0 }] }
        ]
    }"#;

    fn script_file(text: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(text.as_bytes()).unwrap();
        file
    }

    #[test]
    fn replays_push_then_pulls() {
        let file = script_file(SCRIPT);
        let reports = run(file.path()).unwrap();
        assert_eq!(reports.len(), 5);

        assert_eq!(reports[0].status, 200);
        assert!(reports[0].response.is_none());

        let first = reports[1].response.as_ref().unwrap();
        assert_eq!(first["cookie"]["order"], 1);
        assert_eq!(first["patch"][0]["op"], "clear");
        assert_eq!(first["patch"][1]["key"], "s/kanji");
        assert_eq!(first["lastMutationIdChanges"]["C"], 1);

        // Second pull reuses the cookie and finds nothing new.
        let second = reports[2].response.as_ref().unwrap();
        assert_eq!(second["cookie"], first["cookie"]);
        assert_eq!(second["patch"].as_array().unwrap().len(), 0);

        // An explicit null cookie is a full pull again.
        let third = reports[3].response.as_ref().unwrap();
        assert_eq!(third["patch"][0]["op"], "clear");
        assert_eq!(third["cookie"]["order"], 2);

        // Skipping id 2 is out of order.
        assert_eq!(reports[4].status, 409);
        assert!(reports[4].summary.starts_with("rejected"));
    }

    #[test]
    fn text_rendering_is_one_line_per_step() {
        let file = script_file(SCRIPT);
        let text = render_text(&run(file.path()).unwrap());
        assert_eq!(text.lines().count(), 5);
        assert!(text.lines().next().unwrap().contains("alice/G -> 200"));
    }

    #[test]
    fn script_schema_version_applies_to_both_sides() {
        let script: Script = serde_json::from_str(
            r#"{ "schemaVersion": "2", "steps": [
                { "op": "pull", "user": "alice", "clientGroupId": "G" } ] }"#,
        )
        .unwrap();
        let mut reports = replay(&script).unwrap();
        // Client and server agree on "2", so the pull goes through.
        assert_eq!(reports.remove(0).status, 200);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let file = script_file(r#"{ "steps": [], "extra": true }"#);
        assert!(matches!(run(file.path()), Err(CliError::Json(_))));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = run(&dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, CliError::Io { .. }));
    }
}
