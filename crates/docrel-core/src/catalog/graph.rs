//! The frozen relation graph.

use std::collections::BTreeMap;

use super::entity::EntityDef;
use super::field::FieldDef;
use super::relation::RelationDef;
use crate::error::Error;

/// Immutable graph of entity types (nodes) and relations (edges).
///
/// Built by [`super::SchemaRegistry::build`]; every entity carries both its
/// declared forward relations and the inverses maintained on it.
#[derive(Debug, Clone)]
pub struct RelationGraph {
    entities: BTreeMap<String, EntityDef>,
}

impl RelationGraph {
    pub(crate) fn new(entities: BTreeMap<String, EntityDef>) -> Self {
        Self { entities }
    }

    /// Get an entity by name.
    pub fn entity(&self, name: &str) -> Result<&EntityDef, Error> {
        self.entities
            .get(name)
            .ok_or_else(|| Error::UnknownEntity(name.to_string()))
    }

    /// List all entity names.
    pub fn entity_names(&self) -> impl Iterator<Item = &str> {
        self.entities.keys().map(String::as_str)
    }

    /// Get a scalar field of an entity.
    pub fn field(&self, entity: &str, name: &str) -> Result<&FieldDef, Error> {
        self.entity(entity)?
            .get_field(name)
            .ok_or_else(|| Error::unknown_field(entity, name))
    }

    /// Get a relation (forward or inverse) of an entity.
    pub fn relation(&self, entity: &str, name: &str) -> Result<&RelationDef, Error> {
        self.entity(entity)?
            .get_relation(name)
            .ok_or_else(|| Error::unknown_relation(entity, name))
    }

    /// Get a relation callers may write to directly.
    pub fn forward_relation(&self, entity: &str, name: &str) -> Result<&RelationDef, Error> {
        let relation = self.relation(entity, name)?;
        match relation.inverse_of() {
            None => Ok(relation),
            Some(of) => Err(Error::InvalidRequest(format!(
                "{entity}.{name} is maintained from {}.{of} and cannot be written directly",
                relation.to_entity
            ))),
        }
    }

    /// All relations held by an entity.
    pub fn relations_from(&self, entity: &str) -> &[RelationDef] {
        self.entities
            .get(entity)
            .map(|e| e.relations.as_slice())
            .unwrap_or(&[])
    }

    /// Forward relations whose references point at an entity.
    pub fn relations_to(&self, entity: &str) -> Vec<&RelationDef> {
        self.entities
            .values()
            .flat_map(|e| e.forward_relations())
            .filter(|r| r.to_entity == entity)
            .collect()
    }

    /// Inverses maintained for a forward relation.
    pub fn inverses_of(&self, forward: &RelationDef) -> Vec<&RelationDef> {
        self.relations_from(&forward.to_entity)
            .iter()
            .filter(|r| r.to_entity == forward.from_entity && r.inverse_of() == Some(forward.name.as_str()))
            .collect()
    }

    /// Forward relation mirrored by an inverse.
    pub fn forward_of(&self, inverse: &RelationDef) -> Option<&RelationDef> {
        let of = inverse.inverse_of()?;
        self.entities.get(&inverse.to_entity)?.get_relation(of)
    }

    /// Relations on the other side of an edge: inverses for a forward
    /// relation, the forward relation for an inverse.
    pub fn counterparts(&self, relation: &RelationDef) -> Vec<&RelationDef> {
        if relation.is_forward() {
            self.inverses_of(relation)
        } else {
            self.forward_of(relation).into_iter().collect()
        }
    }
}
