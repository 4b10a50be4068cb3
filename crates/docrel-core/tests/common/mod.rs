//! Shared fixtures: the country/city/user/file world.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;

use docrel_core::catalog::{EntityDef, FieldDef, RelationDef, RelationSort, ScalarType, SchemaRegistry};
use docrel_core::storage::{MemoryStore, SledStore, StorageConfig};
use docrel_core::{Database, EngineConfig, RelationGraph, RelationRef, RequestContext};
use docrel_proto::{DocId, Value};

pub struct TestContext {
    pub db: Database,
    pub ctx: RequestContext,
    _storage_dir: Option<tempfile::TempDir>,
}

impl TestContext {
    /// World on a sled store in a fresh directory.
    pub fn sled() -> Self {
        let storage_dir = tempfile::tempdir().unwrap();
        let store = SledStore::open(StorageConfig::new(storage_dir.path())).unwrap();
        Self {
            db: Database::open(Arc::new(world()), Arc::new(store), EngineConfig::default()),
            ctx: RequestContext::new("tester"),
            _storage_dir: Some(storage_dir),
        }
    }

    /// World on an in-memory store.
    pub fn memory() -> Self {
        Self {
            db: Database::open(
                Arc::new(world()),
                Arc::new(MemoryStore::new()),
                EngineConfig::default(),
            ),
            ctx: RequestContext::system(),
            _storage_dir: None,
        }
    }

    pub fn country(&self, name: &str, population: i64) -> DocId {
        self.db
            .insert(
                &self.ctx,
                "country",
                fields(&[("name", Value::from(name)), ("population", Value::from(population))]),
                &[],
            )
            .unwrap()
            .id
    }

    pub fn city(&self, name: &str, population: i64, country: DocId) -> DocId {
        self.db
            .insert(
                &self.ctx,
                "city",
                fields(&[("name", Value::from(name)), ("population", Value::from(population))]),
                &[RelationRef::to("country", country)],
            )
            .unwrap()
            .id
    }

    pub fn user(&self, name: &str, lived: &[DocId], country: DocId) -> DocId {
        self.db
            .insert(
                &self.ctx,
                "user",
                fields(&[("name", Value::from(name)), ("age", Value::from(30i64))]),
                &[
                    RelationRef::new("livedCities", lived.iter().copied()),
                    RelationRef::to("country", country),
                ],
            )
            .unwrap()
            .id
    }

    /// Identifiers stored in a relation of a document.
    pub fn related(&self, entity: &str, id: DocId, relation: &str) -> Vec<DocId> {
        self.db
            .store()
            .get(entity, &id)
            .unwrap()
            .map(|doc| doc.relation_ids(relation))
            .unwrap_or_default()
    }

    pub fn exists(&self, entity: &str, id: DocId) -> bool {
        self.db.store().get(entity, &id).unwrap().is_some()
    }
}

pub fn fields(pairs: &[(&str, Value)]) -> BTreeMap<String, Value> {
    pairs
        .iter()
        .map(|(name, value)| (name.to_string(), value.clone()))
        .collect()
}

fn location(name: &str) -> EntityDef {
    EntityDef::new(name)
        .with_field(FieldDef::new("name", ScalarType::String))
        .with_field(FieldDef::optional("population", ScalarType::Int64))
        .with_field(FieldDef::optional("abb", ScalarType::String))
}

fn newest(name: &str, from: &str, to: &str, limit: usize) -> RelationDef {
    RelationDef::multiple(name, from, to).with_limit(limit)
}

pub fn world() -> RelationGraph {
    let mut registry = SchemaRegistry::new();
    registry.register(location("country")).unwrap();
    registry
        .register(
            location("city").with_relation(
                RelationDef::single("country", "city", "country")
                    .with_inverse(newest("cities", "country", "city", 3))
                    .with_inverse(
                        newest("mostPopulatedCities", "country", "city", 3)
                            .with_sort(RelationSort::desc("population")),
                    )
                    .with_inverse(RelationDef::single("capital", "country", "city").on_demand()),
            ),
        )
        .unwrap();
    registry
        .register(
            EntityDef::new("user")
                .with_field(FieldDef::new("name", ScalarType::String))
                .with_field(FieldDef::new("age", ScalarType::Int64))
                .with_field(FieldDef::optional("level", ScalarType::String))
                .with_relation(
                    RelationDef::multiple("livedCities", "user", "city")
                        .with_inverse(newest("users", "city", "user", 5))
                        .with_inverse(RelationDef::multiple("residents", "city", "user")),
                )
                .with_relation(
                    RelationDef::single("mostLovedCity", "user", "city")
                        .optional()
                        .with_inverse(newest("lovedByUsers", "city", "user", 3)),
                )
                .with_relation(
                    RelationDef::single("country", "user", "country")
                        .with_inverse(newest("users", "country", "user", 5)),
                ),
        )
        .unwrap();
    registry
        .register(
            EntityDef::new("file")
                .with_field(FieldDef::new("name", ScalarType::String))
                .with_field(FieldDef::new("type", ScalarType::String))
                .with_field(FieldDef::new("size", ScalarType::Int64))
                .with_relation(
                    RelationDef::single("uploader", "file", "user")
                        .with_inverse(newest("uploadedImages", "user", "file", 5)),
                ),
        )
        .unwrap();
    registry.build().unwrap()
}
