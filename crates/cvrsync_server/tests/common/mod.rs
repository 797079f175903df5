//! A small note-taking domain shared by the server suites.

#![allow(dead_code)]

use cvrsync_core::{ClientId, DomainTx};
use cvrsync_protocol::{MutationRecord, PullOk, PullRequest, PullResponse, PushRequest};
use cvrsync_schema::{
    EntitySchema, Field, FieldReader, FieldType, FieldValue, ObjectCodec, Record, SchemaRegistry,
};
use cvrsync_server::{
    FnMutator, MutatorError, MutatorRegistry, PushSummary, ServerConfig, ServerResult, SyncServer,
};
use serde_json::{json, Value};

pub const SCHEMA_VERSION: &str = "1";

pub fn note_schema() -> EntitySchema {
    EntitySchema::builder("note", "n/[id]")
        .field(Field::new("id", FieldType::Text))
        .field(Field::new("title", FieldType::Text).alias("t"))
        .field(Field::new("done", FieldType::Bool).alias("d"))
        .build()
        .unwrap()
}

fn key_of(args: &Record) -> Result<Record, MutatorError> {
    let id = FieldReader::new(args).text("id")?;
    Ok(Record::from([("id".to_string(), FieldValue::Text(id))]))
}

pub fn mutators() -> MutatorRegistry {
    let schema = note_schema();
    let id_only = ObjectCodec::new(vec![Field::new("id", FieldType::Text)]).unwrap();
    let with_title = ObjectCodec::new(vec![
        Field::new("id", FieldType::Text),
        Field::new("title", FieldType::Text),
    ])
    .unwrap();

    let create = {
        let schema = schema.clone();
        FnMutator::new("createNote", with_title, move |tx: &mut DomainTx<'_, '_>, args: &Record| {
            let mut record = key_of(args)?;
            record.insert("title".into(), args["title"].clone());
            record.insert("done".into(), FieldValue::Bool(false));
            tx.put(&schema, record)?;
            Ok(())
        })
    };
    let toggle = {
        let schema = schema.clone();
        FnMutator::new("toggleNote", id_only.clone(), move |tx: &mut DomainTx<'_, '_>, args: &Record| {
            let key = key_of(args)?;
            let mut record = tx
                .get(&schema, &key)?
                .ok_or_else(|| MutatorError::rejected("no such note"))?;
            let done = FieldReader::new(&record).bool("done")?;
            record.insert("done".into(), FieldValue::Bool(!done));
            tx.put(&schema, record)?;
            Ok(())
        })
    };
    let delete = FnMutator::new("deleteNote", id_only, move |tx: &mut DomainTx<'_, '_>, args: &Record| {
        tx.delete(&schema, &key_of(args)?)?;
        Ok(())
    });

    MutatorRegistry::new()
        .register(create)
        .unwrap()
        .register(toggle)
        .unwrap()
        .register(delete)
        .unwrap()
}

pub fn server_with(config: ServerConfig) -> SyncServer {
    let schemas = SchemaRegistry::new().register(note_schema()).unwrap();
    SyncServer::new(config, schemas, mutators())
}

pub fn server() -> SyncServer {
    server_with(ServerConfig::new(SCHEMA_VERSION))
}

pub fn mutation(client: &str, id: u64, name: &str, args: Value) -> MutationRecord {
    MutationRecord {
        id,
        client_id: ClientId::new(client),
        name: name.into(),
        args,
        timestamp: 1_700_000_000_000.0,
    }
}

pub fn create(client: &str, id: u64, note: &str) -> MutationRecord {
    mutation(client, id, "createNote", json!({ "id": note, "title": note }))
}

pub fn push(
    server: &SyncServer,
    user: &str,
    group: &str,
    mutations: Vec<MutationRecord>,
) -> ServerResult<PushSummary> {
    let request = PushRequest::new(user, group.into(), SCHEMA_VERSION, mutations);
    server.handle_push(&user.into(), &request)
}

pub fn pull(
    server: &SyncServer,
    user: &str,
    group: &str,
    cookie: Option<cvrsync_protocol::Cookie>,
) -> PullResponse {
    let request = PullRequest::new(user, group.into(), SCHEMA_VERSION, cookie);
    server.handle_pull(&user.into(), &request).unwrap()
}

pub fn pull_ok(
    server: &SyncServer,
    user: &str,
    group: &str,
    cookie: Option<cvrsync_protocol::Cookie>,
) -> PullOk {
    match pull(server, user, group, cookie) {
        PullResponse::Ok(ok) => ok,
        PullResponse::Error(e) => panic!("pull failed: {e:?}"),
    }
}

pub fn last_mutation_id(server: &SyncServer, client: &str) -> Option<u64> {
    server
        .store()
        .begin()
        .client(&ClientId::new(client))
        .map(|c| c.last_mutation_id)
}
