//! Entity definitions.

use super::field::FieldDef;
use super::relation::RelationDef;

/// An entity type: scalar fields plus relations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityDef {
    /// Entity name (unique within the registry; also the collection name).
    pub name: String,
    /// Scalar field definitions.
    pub fields: Vec<FieldDef>,
    /// Relation definitions. Before the graph is built these are the
    /// declared forward relations; afterwards inverses are included.
    pub relations: Vec<RelationDef>,
}

impl EntityDef {
    /// Create a new entity definition.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            relations: Vec::new(),
        }
    }

    /// Add a field to the entity.
    pub fn with_field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    /// Add multiple fields.
    pub fn with_fields(mut self, fields: impl IntoIterator<Item = FieldDef>) -> Self {
        self.fields.extend(fields);
        self
    }

    /// Add a forward relation.
    pub fn with_relation(mut self, relation: RelationDef) -> Self {
        self.relations.push(relation);
        self
    }

    /// Get a field by name.
    pub fn get_field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Get a relation by name.
    pub fn get_relation(&self, name: &str) -> Option<&RelationDef> {
        self.relations.iter().find(|r| r.name == name)
    }

    /// Check if a name is taken by a field or a relation.
    pub fn has_member(&self, name: &str) -> bool {
        self.get_field(name).is_some() || self.get_relation(name).is_some()
    }

    /// Forward relations declared by this entity.
    pub fn forward_relations(&self) -> impl Iterator<Item = &RelationDef> {
        self.relations.iter().filter(|r| r.is_forward())
    }

    /// Inverse relations maintained on this entity.
    pub fn inverse_relations(&self) -> impl Iterator<Item = &RelationDef> {
        self.relations.iter().filter(|r| !r.is_forward())
    }
}
