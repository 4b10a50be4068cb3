//! Relation definitions between entities.

use super::types::{Cardinality, DeleteBehavior, EvictionPolicy, RelationSort};

/// Which side of a relation pair a definition describes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RelationRole {
    /// Declared by the owning entity; written explicitly by callers.
    Forward,
    /// Maintained by the engine as the mirror of a forward relation.
    Inverse {
        /// Name of the forward relation on `to_entity`.
        of: String,
    },
}

/// A relation definition between two entities.
///
/// Forward relations are declared on the owning entity and carry their
/// inverses in `related`. The registry moves each inverse onto its target
/// entity when the graph is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationDef {
    /// Relation name (unique within its entity).
    pub name: String,
    /// Entity holding the references.
    pub from_entity: String,
    /// Entity being referenced.
    pub to_entity: String,
    /// Relation cardinality.
    pub cardinality: Cardinality,
    /// Whether the relation may be empty.
    pub optional: bool,
    /// Maximum number of entries (multiple relations only).
    pub limit: Option<usize>,
    /// Entry ordering.
    pub sort: RelationSort,
    /// Behaviour when adding to a full relation.
    pub eviction: EvictionPolicy,
    /// Explicit delete behaviour; see [`RelationDef::delete_behavior`].
    pub on_delete: Option<DeleteBehavior>,
    /// Forward or inverse side.
    pub role: RelationRole,
    /// Whether writes update this inverse when the caller does not say.
    pub tracked_by_default: bool,
    /// Inverse declarations (forward relations only).
    pub related: Vec<RelationDef>,
}

impl RelationDef {
    fn new(
        name: impl Into<String>,
        from_entity: impl Into<String>,
        to_entity: impl Into<String>,
        cardinality: Cardinality,
    ) -> Self {
        Self {
            name: name.into(),
            from_entity: from_entity.into(),
            to_entity: to_entity.into(),
            cardinality,
            optional: false,
            limit: None,
            sort: RelationSort::default(),
            eviction: EvictionPolicy::Evict,
            on_delete: None,
            role: RelationRole::Forward,
            tracked_by_default: true,
            related: Vec::new(),
        }
    }

    /// Create a relation holding at most one reference.
    pub fn single(
        name: impl Into<String>,
        from_entity: impl Into<String>,
        to_entity: impl Into<String>,
    ) -> Self {
        Self::new(name, from_entity, to_entity, Cardinality::Single)
    }

    /// Create a relation holding many references.
    pub fn multiple(
        name: impl Into<String>,
        from_entity: impl Into<String>,
        to_entity: impl Into<String>,
    ) -> Self {
        Self::new(name, from_entity, to_entity, Cardinality::Multiple)
    }

    /// Allow the relation to be empty.
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Bound the number of entries.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Set the entry ordering.
    pub fn with_sort(mut self, sort: RelationSort) -> Self {
        self.sort = sort;
        self
    }

    /// Reject additions to a full relation instead of evicting.
    pub fn forbid_eviction(mut self) -> Self {
        self.eviction = EvictionPolicy::Forbid;
        self
    }

    /// Set delete behavior.
    pub fn with_on_delete(mut self, on_delete: DeleteBehavior) -> Self {
        self.on_delete = Some(on_delete);
        self
    }

    /// Declare an inverse to keep in sync.
    pub fn with_inverse(mut self, inverse: RelationDef) -> Self {
        self.related.push(inverse);
        self
    }

    /// Only update this inverse when a write asks for it.
    pub fn on_demand(mut self) -> Self {
        self.tracked_by_default = false;
        self
    }

    /// Check if this is a forward relation.
    pub fn is_forward(&self) -> bool {
        self.role == RelationRole::Forward
    }

    /// Name of the forward relation this inverse mirrors.
    pub fn inverse_of(&self) -> Option<&str> {
        match &self.role {
            RelationRole::Forward => None,
            RelationRole::Inverse { of } => Some(of),
        }
    }

    /// Maximum entries, if bounded.
    pub fn capacity(&self) -> Option<usize> {
        match self.cardinality {
            Cardinality::Single => Some(1),
            Cardinality::Multiple => self.limit,
        }
    }

    /// Check if the relation can hold every reference made to it.
    pub fn is_unbounded(&self) -> bool {
        self.capacity().is_none()
    }

    /// Delete behavior, defaulting by optionality.
    ///
    /// Required relations cascade, optional ones detach.
    pub fn delete_behavior(&self) -> DeleteBehavior {
        self.on_delete.unwrap_or(if self.optional {
            DeleteBehavior::Detach
        } else {
            DeleteBehavior::Cascade
        })
    }

    /// Get an inverse declaration by name.
    pub fn get_inverse(&self, name: &str) -> Option<&RelationDef> {
        self.related.iter().find(|r| r.name == name)
    }
}
