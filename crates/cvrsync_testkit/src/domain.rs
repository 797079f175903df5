//! Learning-progress fixture domain.
//!
//! | Entity        | Key path                  | Value                              |
//! |---------------|---------------------------|------------------------------------|
//! | `skillState`  | `s/[skill]`               | scheduling state, last rating      |
//! | `skillRating` | `sr/[skill]/[createdAt]`  | one row per review                 |
//!
//! `skillState` declares the `byDue` index over its due date (`/s/d`).
//!
//! Mutations: `addSkill {skill, at}`, `rateSkill {skill, rating, at}` and
//! `removeSkill {skill}`. Server mutators and their local twins run the
//! same logic over [`DomainTx`] and [`ReplicaTx`] respectively.

use crate::scheduler::{FixtureScheduler, Rating, SrsScheduler, SrsState};
use chrono::{DateTime, Utc};
use cvrsync_client::{FnLocalMutator, LocalMutators, ReplicaTx, SyncError};
use cvrsync_core::DomainTx;
use cvrsync_schema::{
    Entity, EntitySchema, EnumTable, Field, FieldReader, FieldType, FieldValue, ObjectCodec,
    Record, SchemaError, SchemaRegistry, SchemaResult, TimestampEncoding,
};
use cvrsync_server::{FnMutator, MutatorError, MutatorRegistry, ServerResult};
use serde_json::Value as JsonValue;
use std::fmt;
use std::sync::Arc;

/// Schema name of skill states.
pub const SKILL_STATE: &str = "skillState";
/// Schema name of skill ratings.
pub const SKILL_RATING: &str = "skillRating";
/// Index of skill states by due date.
pub const BY_DUE: &str = "byDue";

/// Starts tracking a skill.
pub const ADD_SKILL: &str = "addSkill";
/// Records a review and reschedules the skill.
pub const RATE_SKILL: &str = "rateSkill";
/// Stops tracking a skill and drops its reviews.
pub const REMOVE_SKILL: &str = "removeSkill";

/// Scheduling state of one skill.
#[derive(Debug, Clone, PartialEq)]
pub struct SkillState {
    /// Skill identifier.
    pub skill: String,
    /// Scheduler output.
    pub srs: SrsState,
    /// Most recent rating, if the skill was ever reviewed.
    pub last_rating: Option<Rating>,
}

/// One review of a skill.
#[derive(Debug, Clone, PartialEq)]
pub struct SkillRating {
    /// Skill identifier.
    pub skill: String,
    /// Review time.
    pub created_at: DateTime<Utc>,
    /// How it went.
    pub rating: Rating,
}

fn rating_from(record: &Record, name: &str) -> SchemaResult<Rating> {
    let variant = FieldReader::new(record).variant(name)?;
    Rating::from_variant(&variant)
        .ok_or_else(|| SchemaError::decoding_failed(name, format!("unknown rating `{variant}`")))
}

impl Entity for SkillState {
    const NAME: &'static str = SKILL_STATE;

    fn to_record(&self) -> Record {
        let srs = Record::from([
            ("stability".to_string(), FieldValue::Float(self.srs.stability)),
            ("difficulty".to_string(), FieldValue::Float(self.srs.difficulty)),
            ("due".to_string(), FieldValue::Timestamp(self.srs.due)),
            ("reps".to_string(), FieldValue::Integer(self.srs.reps)),
        ]);
        Record::from([
            ("skill".to_string(), FieldValue::Text(self.skill.clone())),
            ("srs".to_string(), FieldValue::Object(srs)),
            (
                "lastRating".to_string(),
                self.last_rating
                    .map(|r| FieldValue::variant(r.variant()))
                    .unwrap_or(FieldValue::Null),
            ),
        ])
    }

    fn from_record(record: &Record) -> SchemaResult<Self> {
        let reader = FieldReader::new(record);
        let srs = FieldReader::new(reader.object("srs")?);
        let last_rating = match record.get("lastRating") {
            None | Some(FieldValue::Null) => None,
            Some(_) => Some(rating_from(record, "lastRating")?),
        };
        Ok(Self {
            skill: reader.text("skill")?,
            srs: SrsState {
                stability: srs.float("stability")?,
                difficulty: srs.float("difficulty")?,
                due: srs.timestamp("due")?,
                reps: srs.integer("reps")?,
            },
            last_rating,
        })
    }
}

impl Entity for SkillRating {
    const NAME: &'static str = SKILL_RATING;

    fn to_record(&self) -> Record {
        Record::from([
            ("skill".to_string(), FieldValue::Text(self.skill.clone())),
            ("createdAt".to_string(), FieldValue::Timestamp(self.created_at)),
            ("rating".to_string(), FieldValue::variant(self.rating.variant())),
        ])
    }

    fn from_record(record: &Record) -> SchemaResult<Self> {
        let reader = FieldReader::new(record);
        Ok(Self {
            skill: reader.text("skill")?,
            created_at: reader.timestamp("createdAt")?,
            rating: rating_from(record, "rating")?,
        })
    }
}

fn rating_table() -> SchemaResult<EnumTable> {
    EnumTable::new(
        "rating",
        &[("again", "1"), ("hard", "2"), ("good", "3"), ("easy", "4")],
    )
}

/// Builds the `skillState` schema.
pub fn skill_state_schema() -> SchemaResult<EntitySchema> {
    let srs = ObjectCodec::new(vec![
        Field::new("stability", FieldType::Float).alias("s"),
        Field::new("difficulty", FieldType::Float).alias("f"),
        Field::new("due", FieldType::Timestamp(TimestampEncoding::Iso8601))
            .alias("d")
            .indexed(BY_DUE),
        Field::new("reps", FieldType::Integer).alias("r"),
    ])?;
    EntitySchema::builder(SKILL_STATE, "s/[skill]")
        .field(Field::new("skill", FieldType::Text))
        .field(Field::new("srs", FieldType::Object(srs)).alias("s"))
        .field(
            Field::new(
                "lastRating",
                FieldType::optional(FieldType::enumeration(rating_table()?)),
            )
            .alias("lr"),
        )
        .build()
}

/// Builds the `skillRating` schema.
pub fn skill_rating_schema() -> SchemaResult<EntitySchema> {
    EntitySchema::builder(SKILL_RATING, "sr/[skill]/[createdAt]")
        .field(Field::new("skill", FieldType::Text))
        .field(Field::new(
            "createdAt",
            FieldType::Timestamp(TimestampEncoding::Millis),
        ))
        .field(Field::new("rating", FieldType::enumeration(rating_table()?)).alias("r"))
        .build()
}

fn skill_key(skill: &str) -> Record {
    Record::from([("skill".to_string(), FieldValue::Text(skill.to_string()))])
}

/// Storage the domain logic runs against: the server transaction or the
/// client's optimistic view.
trait SkillStore {
    type Error: From<SchemaError>;

    fn load(&mut self, schema: &EntitySchema, key_fields: &Record)
        -> Result<Option<Record>, Self::Error>;
    fn store(&mut self, schema: &EntitySchema, record: Record) -> Result<(), Self::Error>;
    fn remove(&mut self, schema: &EntitySchema, key_fields: &Record) -> Result<(), Self::Error>;
    fn all(&mut self, schema: &EntitySchema) -> Result<Vec<Record>, Self::Error>;
    fn rejected(message: String) -> Self::Error;
}

impl SkillStore for DomainTx<'_, '_> {
    type Error = MutatorError;

    fn load(&mut self, schema: &EntitySchema, key_fields: &Record) -> Result<Option<Record>, MutatorError> {
        Ok(self.get(schema, key_fields)?)
    }

    fn store(&mut self, schema: &EntitySchema, record: Record) -> Result<(), MutatorError> {
        self.put(schema, record)?;
        Ok(())
    }

    fn remove(&mut self, schema: &EntitySchema, key_fields: &Record) -> Result<(), MutatorError> {
        self.delete(schema, key_fields)?;
        Ok(())
    }

    fn all(&mut self, schema: &EntitySchema) -> Result<Vec<Record>, MutatorError> {
        Ok(self.scan(schema).into_iter().map(|(_, record)| record).collect())
    }

    fn rejected(message: String) -> MutatorError {
        MutatorError::rejected(message)
    }
}

impl SkillStore for ReplicaTx<'_> {
    type Error = SyncError;

    fn load(&mut self, schema: &EntitySchema, key_fields: &Record) -> Result<Option<Record>, SyncError> {
        self.get(schema, key_fields)
    }

    fn store(&mut self, schema: &EntitySchema, record: Record) -> Result<(), SyncError> {
        self.put(schema, &record).map(drop)
    }

    fn remove(&mut self, schema: &EntitySchema, key_fields: &Record) -> Result<(), SyncError> {
        self.delete(schema, key_fields).map(drop)
    }

    fn all(&mut self, schema: &EntitySchema) -> Result<Vec<Record>, SyncError> {
        self.scan(schema)
    }

    fn rejected(message: String) -> SyncError {
        SyncError::mutator_failed("skill", message)
    }
}

struct Inner {
    skill_state: EntitySchema,
    skill_rating: EntitySchema,
    add_args: ObjectCodec,
    rate_args: ObjectCodec,
    remove_args: ObjectCodec,
    scheduler: Arc<dyn SrsScheduler>,
}

/// The learning-progress domain: schemas, server mutators and local twins
/// wired to one scheduler.
#[derive(Clone)]
pub struct LearningDomain {
    inner: Arc<Inner>,
}

impl LearningDomain {
    /// Builds the domain around `scheduler`.
    pub fn new(scheduler: Arc<dyn SrsScheduler>) -> SchemaResult<Self> {
        let skill = || Field::new("skill", FieldType::Text);
        let at = || Field::new("at", FieldType::Timestamp(TimestampEncoding::Millis));
        Ok(Self {
            inner: Arc::new(Inner {
                skill_state: skill_state_schema()?,
                skill_rating: skill_rating_schema()?,
                add_args: ObjectCodec::new(vec![skill(), at()])?,
                rate_args: ObjectCodec::new(vec![
                    skill(),
                    Field::new("rating", FieldType::enumeration(rating_table()?)),
                    at(),
                ])?,
                remove_args: ObjectCodec::new(vec![skill()])?,
                scheduler,
            }),
        })
    }

    /// The domain with [`FixtureScheduler`].
    pub fn fixture() -> Self {
        Self::new(Arc::new(FixtureScheduler)).expect("fixture schemas are valid")
    }

    /// Returns the `skillState` schema.
    pub fn skill_state(&self) -> &EntitySchema {
        &self.inner.skill_state
    }

    /// Returns the `skillRating` schema.
    pub fn skill_rating(&self) -> &EntitySchema {
        &self.inner.skill_rating
    }

    /// Builds a registry of both schemas.
    pub fn schemas(&self) -> SchemaResult<SchemaRegistry> {
        SchemaRegistry::new()
            .register(self.inner.skill_state.clone())?
            .register(self.inner.skill_rating.clone())
    }

    /// Builds the server mutators.
    pub fn server_mutators(&self) -> ServerResult<MutatorRegistry> {
        let add = self.clone();
        let rate = self.clone();
        let remove = self.clone();
        MutatorRegistry::new()
            .register(FnMutator::new(
                ADD_SKILL,
                self.inner.add_args.clone(),
                move |tx: &mut DomainTx<'_, '_>, args: &Record| add.add_skill(tx, args),
            ))?
            .register(FnMutator::new(
                RATE_SKILL,
                self.inner.rate_args.clone(),
                move |tx: &mut DomainTx<'_, '_>, args: &Record| rate.rate_skill(tx, args),
            ))?
            .register(FnMutator::new(
                REMOVE_SKILL,
                self.inner.remove_args.clone(),
                move |tx: &mut DomainTx<'_, '_>, args: &Record| remove.remove_skill(tx, args),
            ))
    }

    /// Builds the client-side twins of the server mutators.
    pub fn local_mutators(&self) -> LocalMutators {
        let add = self.clone();
        let rate = self.clone();
        let remove = self.clone();
        LocalMutators::new()
            .with(FnLocalMutator::new(
                ADD_SKILL,
                move |tx: &mut ReplicaTx<'_>, args: &JsonValue| {
                    let args = add.inner.add_args.unmarshal(args)?;
                    add.add_skill(tx, &args)
                },
            ))
            .with(FnLocalMutator::new(
                RATE_SKILL,
                move |tx: &mut ReplicaTx<'_>, args: &JsonValue| {
                    let args = rate.inner.rate_args.unmarshal(args)?;
                    rate.rate_skill(tx, &args)
                },
            ))
            .with(FnLocalMutator::new(
                REMOVE_SKILL,
                move |tx: &mut ReplicaTx<'_>, args: &JsonValue| {
                    let args = remove.inner.remove_args.unmarshal(args)?;
                    remove.remove_skill(tx, &args)
                },
            ))
    }

    /// Wire arguments of `addSkill`.
    pub fn add_skill_args(&self, skill: &str, at: DateTime<Utc>) -> SchemaResult<JsonValue> {
        self.inner.add_args.marshal(&Record::from([
            ("skill".to_string(), FieldValue::Text(skill.to_string())),
            ("at".to_string(), FieldValue::Timestamp(at)),
        ]))
    }

    /// Wire arguments of `rateSkill`.
    pub fn rate_skill_args(
        &self,
        skill: &str,
        rating: Rating,
        at: DateTime<Utc>,
    ) -> SchemaResult<JsonValue> {
        self.inner.rate_args.marshal(&Record::from([
            ("skill".to_string(), FieldValue::Text(skill.to_string())),
            ("rating".to_string(), FieldValue::variant(rating.variant())),
            ("at".to_string(), FieldValue::Timestamp(at)),
        ]))
    }

    /// Wire arguments of `removeSkill`.
    pub fn remove_skill_args(&self, skill: &str) -> SchemaResult<JsonValue> {
        self.inner.remove_args.marshal(&skill_key(skill))
    }

    fn add_skill<S: SkillStore>(&self, store: &mut S, args: &Record) -> Result<(), S::Error> {
        let reader = FieldReader::new(args);
        let skill = reader.text("skill")?;
        let at = reader.timestamp("at")?;
        if store.load(&self.inner.skill_state, &skill_key(&skill))?.is_some() {
            return Err(S::rejected(format!("skill `{skill}` is already tracked")));
        }
        let state = SkillState {
            skill,
            srs: SrsState::new_at(at),
            last_rating: None,
        };
        store.store(&self.inner.skill_state, state.to_record())
    }

    fn rate_skill<S: SkillStore>(&self, store: &mut S, args: &Record) -> Result<(), S::Error> {
        let reader = FieldReader::new(args);
        let skill = reader.text("skill")?;
        let rating = rating_from(args, "rating")?;
        let at = reader.timestamp("at")?;

        let current = store
            .load(&self.inner.skill_state, &skill_key(&skill))?
            .ok_or_else(|| S::rejected(format!("skill `{skill}` is not tracked")))?;
        let mut state = SkillState::from_record(&current)?;
        state.srs = self.inner.scheduler.next(&state.srs, rating, at);
        state.last_rating = Some(rating);

        let review = SkillRating {
            skill,
            created_at: at,
            rating,
        };
        store.store(&self.inner.skill_rating, review.to_record())?;
        store.store(&self.inner.skill_state, state.to_record())
    }

    fn remove_skill<S: SkillStore>(&self, store: &mut S, args: &Record) -> Result<(), S::Error> {
        let skill = FieldReader::new(args).text("skill")?;
        let key = skill_key(&skill);
        if store.load(&self.inner.skill_state, &key)?.is_none() {
            return Err(S::rejected(format!("skill `{skill}` is not tracked")));
        }

        let reviews = store.all(&self.inner.skill_rating)?;
        for review in reviews
            .iter()
            .filter(|r| r.get("skill").and_then(FieldValue::as_text) == Some(skill.as_str()))
        {
            store.remove(&self.inner.skill_rating, review)?;
        }
        store.remove(&self.inner.skill_state, &key)
    }
}

impl fmt::Debug for LearningDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LearningDomain")
            .field("skill_state", &self.inner.skill_state.name())
            .field("skill_rating", &self.inner.skill_rating.name())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap()
    }

    #[test]
    fn schemas_register_side_by_side() {
        let domain = LearningDomain::fixture();
        let registry = domain.schemas().unwrap();
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.for_key("sr/kanji/1").unwrap().name(), SKILL_RATING);
        assert_eq!(registry.for_key("s/kanji").unwrap().name(), SKILL_STATE);
    }

    #[test]
    fn due_index_points_into_the_nested_object() {
        let domain = LearningDomain::fixture();
        let index = &domain.skill_state().indexes()[0];
        assert_eq!(index.name, BY_DUE);
        assert_eq!(index.key_prefix, "s/");
        assert_eq!(index.json_pointer(), "/s/d");
    }

    #[test]
    fn skill_state_marshals_compactly() {
        let domain = LearningDomain::fixture();
        let state = SkillState {
            skill: "kanji".into(),
            srs: SrsState::new_at(at()),
            last_rating: Some(Rating::Good),
        };
        let (key, value) = domain.skill_state().marshal_entity(&state.to_record()).unwrap();
        assert_eq!(key, "s/kanji");
        assert_eq!(
            value,
            json!({
                "s": { "s": 0.0, "f": 5.0, "d": "2024-05-01T08:00:00.000Z", "r": 0 },
                "lr": "3"
            })
        );

        let back = domain.skill_state().unmarshal_entity(&key, &value).unwrap();
        assert_eq!(SkillState::from_record(&back).unwrap(), state);
    }

    #[test]
    fn rating_key_embeds_the_review_time() {
        let domain = LearningDomain::fixture();
        let review = SkillRating {
            skill: "kanji".into(),
            created_at: at(),
            rating: Rating::Hard,
        };
        let (key, value) = domain.skill_rating().marshal_entity(&review.to_record()).unwrap();
        assert_eq!(key, format!("sr/kanji/{}", at().timestamp_millis()));
        assert_eq!(value, json!({ "r": "2" }));
    }

    #[test]
    fn args_use_wire_codes() {
        let domain = LearningDomain::fixture();
        assert_eq!(
            domain.rate_skill_args("kanji", Rating::Easy, at()).unwrap(),
            json!({ "skill": "kanji", "rating": "4", "at": at().timestamp_millis() })
        );
        assert_eq!(domain.remove_skill_args("kanji").unwrap(), json!({ "skill": "kanji" }));
    }

    #[test]
    fn registries_carry_every_mutation() {
        let domain = LearningDomain::fixture();
        let names: Vec<_> = domain.server_mutators().unwrap().names().map(str::to_string).collect();
        assert_eq!(names, [ADD_SKILL, RATE_SKILL, REMOVE_SKILL]);
    }
}
