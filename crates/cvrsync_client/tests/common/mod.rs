//! A note-taking domain with server mutators and their local twins.

#![allow(dead_code)]

use cvrsync_client::{
    FnLocalMutator, LocalMutators, LoopbackTransport, Replica, ReplicaConfig, ReplicaTx,
    SyncConfig, SyncEngine, SyncError, SyncResult,
};
use cvrsync_core::DomainTx;
use cvrsync_schema::{
    EntitySchema, Field, FieldReader, FieldType, FieldValue, ObjectCodec, Record, SchemaRegistry,
};
use cvrsync_server::{FnMutator, MutatorError, MutatorRegistry, ServerConfig, SyncServer};
use serde_json::Value;
use std::sync::Arc;

pub const SCHEMA_VERSION: &str = "1";

pub fn note_schema() -> EntitySchema {
    EntitySchema::builder("note", "n/[id]")
        .field(Field::new("id", FieldType::Text))
        .field(Field::new("title", FieldType::Text).alias("t").indexed("byTitle"))
        .field(Field::new("done", FieldType::Bool).alias("d"))
        .build()
        .unwrap()
}

pub fn schemas() -> Arc<SchemaRegistry> {
    Arc::new(SchemaRegistry::new().register(note_schema()).unwrap())
}

fn note_key(id: &str) -> Record {
    Record::from([("id".to_string(), FieldValue::Text(id.to_string()))])
}

pub fn server_mutators() -> MutatorRegistry {
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
            let reader = FieldReader::new(args);
            let mut record = note_key(&reader.text("id")?);
            record.insert("title".into(), FieldValue::Text(reader.text("title")?));
            record.insert("done".into(), FieldValue::Bool(false));
            tx.put(&schema, record)?;
            Ok(())
        })
    };
    let toggle = FnMutator::new("toggleNote", id_only, move |tx: &mut DomainTx<'_, '_>, args: &Record| {
        let key = note_key(&FieldReader::new(args).text("id")?);
        let mut record = tx
            .get(&schema, &key)?
            .ok_or_else(|| MutatorError::rejected("no such note"))?;
        let done = FieldReader::new(&record).bool("done")?;
        record.insert("done".into(), FieldValue::Bool(!done));
        tx.put(&schema, record)?;
        Ok(())
    });

    MutatorRegistry::new()
        .register(create)
        .unwrap()
        .register(toggle)
        .unwrap()
}

fn text_arg(args: &Value, name: &str) -> SyncResult<String> {
    args[name]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| SyncError::mutator_failed("note", format!("missing `{name}`")))
}

pub fn local_mutators() -> LocalMutators {
    let create = FnLocalMutator::new("createNote", |tx: &mut ReplicaTx<'_>, args: &Value| {
        let schema = tx.schema("note")?;
        let mut record = note_key(&text_arg(args, "id")?);
        record.insert("title".into(), FieldValue::Text(text_arg(args, "title")?));
        record.insert("done".into(), FieldValue::Bool(false));
        tx.put(schema, &record)?;
        Ok(())
    });
    let toggle = FnLocalMutator::new("toggleNote", |tx: &mut ReplicaTx<'_>, args: &Value| {
        let schema = tx.schema("note")?;
        let mut record = tx
            .get(schema, &note_key(&text_arg(args, "id")?))?
            .ok_or_else(|| SyncError::mutator_failed("toggleNote", "no such note"))?;
        let done = record.get("done").and_then(FieldValue::as_bool).unwrap_or(false);
        record.insert("done".into(), FieldValue::Bool(!done));
        tx.put(schema, &record)?;
        Ok(())
    });
    LocalMutators::new().with(create).with(toggle)
}

pub fn server_with(config: ServerConfig) -> Arc<SyncServer> {
    Arc::new(SyncServer::new(
        config,
        SchemaRegistry::new().register(note_schema()).unwrap(),
        server_mutators(),
    ))
}

pub fn server() -> Arc<SyncServer> {
    server_with(ServerConfig::new(SCHEMA_VERSION))
}

pub fn replica(user: &str, group: &str, client: &str) -> Arc<Replica> {
    Arc::new(Replica::new(
        ReplicaConfig::new(user, SCHEMA_VERSION)
            .with_client_group_id(group)
            .with_client_id(client),
        schemas(),
        local_mutators(),
    ))
}

pub fn engine(server: &Arc<SyncServer>, replica: Arc<Replica>) -> SyncEngine<LoopbackTransport> {
    let user = replica.config().profile_id.clone();
    SyncEngine::new(
        SyncConfig::new(),
        LoopbackTransport::new(Arc::clone(server), user),
        replica,
    )
}

pub fn title_of(replica: &Replica, id: &str) -> Option<String> {
    replica
        .get_record(&note_schema(), &note_key(id))
        .unwrap()
        .and_then(|r| r.get("title").and_then(FieldValue::as_text).map(str::to_string))
}

pub fn is_done(replica: &Replica, id: &str) -> Option<bool> {
    replica
        .get_record(&note_schema(), &note_key(id))
        .unwrap()
        .and_then(|r| r.get("done").and_then(FieldValue::as_bool))
}
