//! Schema registration and validation.

use std::collections::{BTreeMap, HashSet};

use docrel_proto::ID_FIELD;
use tracing::debug;

use super::entity::EntityDef;
use super::graph::RelationGraph;
use super::relation::{RelationDef, RelationRole};
use super::types::Cardinality;
use crate::error::Error;

/// Collects entity definitions until the relation graph is built.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    entities: BTreeMap<String, EntityDef>,
}

impl SchemaRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an entity with its fields and forward relations.
    ///
    /// Checks that only depend on the entity itself happen here; cross-entity
    /// checks wait for [`SchemaRegistry::build`].
    pub fn register(&mut self, entity: EntityDef) -> Result<&mut Self, Error> {
        if entity.name.is_empty() {
            return Err(Error::InvalidSchema("entity name cannot be empty".into()));
        }
        if self.entities.contains_key(&entity.name) {
            return Err(Error::InvalidSchema(format!(
                "entity {} registered twice",
                entity.name
            )));
        }

        let mut names = HashSet::new();
        let members = entity
            .fields
            .iter()
            .map(|f| &f.name)
            .chain(entity.relations.iter().map(|r| &r.name));
        for name in members {
            if name == ID_FIELD || name.is_empty() || name.contains('.') {
                return Err(Error::InvalidSchema(format!(
                    "{}: invalid member name {name:?}",
                    entity.name
                )));
            }
            if !names.insert(name.as_str()) {
                return Err(Error::InvalidSchema(format!(
                    "{}: duplicate member {name}",
                    entity.name
                )));
            }
        }

        for relation in &entity.relations {
            if relation.from_entity != entity.name {
                return Err(Error::InvalidSchema(format!(
                    "relation {} is declared on {} but starts at {}",
                    relation.name, entity.name, relation.from_entity
                )));
            }
            if !relation.is_forward() {
                return Err(Error::InvalidSchema(format!(
                    "{}.{}: only forward relations can be declared",
                    entity.name, relation.name
                )));
            }
        }

        debug!(
            entity = %entity.name,
            fields = entity.fields.len(),
            relations = entity.relations.len(),
            "registered entity"
        );
        self.entities.insert(entity.name.clone(), entity);
        Ok(self)
    }

    /// Validate every declaration and freeze the registry into a graph.
    ///
    /// Inverse declarations are moved onto their target entities.
    pub fn build(self) -> Result<RelationGraph, Error> {
        let mut entities = self.entities.clone();

        for entity in self.entities.values() {
            for relation in &entity.relations {
                self.check_relation(relation)?;

                for inverse in &relation.related {
                    if inverse.from_entity != relation.to_entity
                        || inverse.to_entity != relation.from_entity
                    {
                        return Err(Error::InvalidSchema(format!(
                            "inverse {} of {}.{} must point from {} to {}",
                            inverse.name,
                            entity.name,
                            relation.name,
                            relation.to_entity,
                            relation.from_entity
                        )));
                    }
                    if !inverse.related.is_empty() {
                        return Err(Error::InvalidSchema(format!(
                            "inverse {} cannot declare inverses of its own",
                            inverse.name
                        )));
                    }
                    if inverse.is_unbounded() && !inverse.tracked_by_default {
                        return Err(Error::InvalidSchema(format!(
                            "unbounded inverse {} must always be tracked",
                            inverse.name
                        )));
                    }
                    self.check_relation(inverse)?;

                    let target = entities.get_mut(&relation.to_entity).ok_or_else(|| {
                        Error::InvalidSchema(format!("unknown entity {}", relation.to_entity))
                    })?;
                    if target.has_member(&inverse.name) {
                        return Err(Error::InvalidSchema(format!(
                            "inverse {} collides with an existing member of {}",
                            inverse.name, target.name
                        )));
                    }

                    let mut materialized = inverse.clone();
                    materialized.role = RelationRole::Inverse {
                        of: relation.name.clone(),
                    };
                    materialized.optional = true;
                    target.relations.push(materialized);
                }
            }
        }

        debug!(entities = entities.len(), "relation graph built");
        Ok(RelationGraph::new(entities))
    }

    fn check_relation(&self, relation: &RelationDef) -> Result<(), Error> {
        let target = self.entities.get(&relation.to_entity).ok_or_else(|| {
            Error::InvalidSchema(format!(
                "{}.{} targets unknown entity {}",
                relation.from_entity, relation.name, relation.to_entity
            ))
        })?;

        match (relation.cardinality, relation.limit) {
            (_, Some(0)) => {
                return Err(Error::InvalidSchema(format!(
                    "{}.{}: limit must be positive",
                    relation.from_entity, relation.name
                )))
            }
            (Cardinality::Single, Some(_)) => {
                return Err(Error::InvalidSchema(format!(
                    "{}.{}: limit only applies to multiple relations",
                    relation.from_entity, relation.name
                )))
            }
            _ => {}
        }

        if !relation.sort.is_by_id() && target.get_field(&relation.sort.field).is_none() {
            return Err(Error::InvalidSchema(format!(
                "{}.{}: sort field {} is not a field of {}",
                relation.from_entity, relation.name, relation.sort.field, target.name
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{FieldDef, RelationSort, ScalarType};

    fn country() -> EntityDef {
        EntityDef::new("country").with_field(FieldDef::new("name", ScalarType::String))
    }

    fn city() -> EntityDef {
        EntityDef::new("city")
            .with_field(FieldDef::new("name", ScalarType::String))
            .with_field(FieldDef::optional("population", ScalarType::Int64))
    }

    #[test]
    fn test_duplicate_entity_rejected() {
        let mut registry = SchemaRegistry::new();
        registry.register(country()).unwrap();
        assert!(matches!(
            registry.register(country()),
            Err(Error::InvalidSchema(_))
        ));
    }

    #[test]
    fn test_member_names_checked() {
        let mut registry = SchemaRegistry::new();
        let bad = EntityDef::new("x").with_field(FieldDef::new("_id", ScalarType::Id));
        assert!(registry.register(bad).is_err());

        let dup = EntityDef::new("y")
            .with_field(FieldDef::new("name", ScalarType::String))
            .with_relation(RelationDef::single("name", "y", "y"));
        assert!(registry.register(dup).is_err());
    }

    #[test]
    fn test_relation_must_start_at_owner() {
        let mut registry = SchemaRegistry::new();
        let entity = city().with_relation(RelationDef::single("country", "town", "country"));
        assert!(registry.register(entity).is_err());
    }

    #[test]
    fn test_unknown_target_rejected() {
        let mut registry = SchemaRegistry::new();
        registry
            .register(city().with_relation(RelationDef::single("country", "city", "country")))
            .unwrap();
        assert!(matches!(registry.build(), Err(Error::InvalidSchema(_))));
    }

    #[test]
    fn test_bad_limits_rejected() {
        let mut registry = SchemaRegistry::new();
        registry.register(country()).unwrap();
        registry
            .register(city().with_relation(
                RelationDef::single("country", "city", "country").with_limit(2),
            ))
            .unwrap();
        assert!(registry.build().is_err());

        let mut registry = SchemaRegistry::new();
        registry.register(country()).unwrap();
        registry
            .register(city().with_relation(
                RelationDef::single("country", "city", "country")
                    .with_inverse(RelationDef::multiple("cities", "country", "city").with_limit(0)),
            ))
            .unwrap();
        assert!(registry.build().is_err());
    }

    #[test]
    fn test_sort_field_must_exist_on_target() {
        let mut registry = SchemaRegistry::new();
        registry.register(country()).unwrap();
        registry
            .register(city().with_relation(
                RelationDef::single("country", "city", "country").with_inverse(
                    RelationDef::multiple("cities", "country", "city")
                        .with_sort(RelationSort::desc("altitude")),
                ),
            ))
            .unwrap();
        assert!(registry.build().is_err());
    }

    #[test]
    fn test_inverse_collision_rejected() {
        let mut registry = SchemaRegistry::new();
        registry.register(country()).unwrap();
        registry
            .register(city().with_relation(
                RelationDef::single("country", "city", "country")
                    .with_inverse(RelationDef::multiple("name", "country", "city")),
            ))
            .unwrap();
        assert!(registry.build().is_err());
    }

    #[test]
    fn test_unbounded_inverse_cannot_be_on_demand() {
        let mut registry = SchemaRegistry::new();
        registry.register(country()).unwrap();
        registry
            .register(city().with_relation(
                RelationDef::single("country", "city", "country")
                    .with_inverse(RelationDef::multiple("cities", "country", "city").on_demand()),
            ))
            .unwrap();
        assert!(registry.build().is_err());
    }

    #[test]
    fn test_build_materializes_inverses() {
        let mut registry = SchemaRegistry::new();
        registry.register(country()).unwrap();
        registry
            .register(city().with_relation(
                RelationDef::single("country", "city", "country")
                    .with_inverse(RelationDef::multiple("cities", "country", "city").with_limit(3))
                    .with_inverse(RelationDef::single("capital", "country", "city").on_demand()),
            ))
            .unwrap();

        let graph = registry.build().unwrap();
        let cities = graph.relation("country", "cities").unwrap();
        assert_eq!(cities.inverse_of(), Some("country"));
        assert!(cities.optional);
        assert!(graph.relation("country", "capital").is_ok());
    }
}
