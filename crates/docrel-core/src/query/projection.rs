//! Projection resolution: selections become bounded fetch plans.

use docrel_proto::{Selection, ID_FIELD};

use crate::catalog::{Cardinality, EntityDef, RelationDef, RelationGraph, RelationSort};
use crate::error::Error;

/// What to read for one entity: scalar fields plus relation traversals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchPlan {
    /// Entity type being read.
    pub entity: String,
    /// Scalar fields to return; always starts with `_id`.
    pub fields: Vec<String>,
    /// Relations to follow, in output order.
    pub steps: Vec<TraversalStep>,
}

/// One relation hop in a fetch plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraversalStep {
    /// Relation name on the parent entity.
    pub relation: String,
    /// Entity type reached.
    pub target: String,
    /// Whether one or many documents come back.
    pub cardinality: Cardinality,
    /// Declared entry ordering.
    pub sort: RelationSort,
    /// Declared entry limit.
    pub limit: Option<usize>,
    /// What to read of the reached documents.
    pub plan: FetchPlan,
}

impl FetchPlan {
    /// Number of relation hops in the deepest branch.
    pub fn depth(&self) -> u32 {
        self.steps
            .iter()
            .map(|s| 1 + s.plan.depth())
            .max()
            .unwrap_or(0)
    }

    /// Get a step by relation name.
    pub fn step(&self, relation: &str) -> Option<&TraversalStep> {
        self.steps.iter().find(|s| s.relation == relation)
    }

    /// Check if a scalar field is requested.
    pub fn has_field(&self, field: &str) -> bool {
        self.fields.iter().any(|f| f == field)
    }
}

/// Compiles selections into fetch plans against the relation graph.
pub struct ProjectionResolver<'g> {
    graph: &'g RelationGraph,
    max_depth: u32,
}

impl<'g> ProjectionResolver<'g> {
    /// Create a resolver that refuses plans deeper than `max_depth` hops.
    pub fn new(graph: &'g RelationGraph, max_depth: u32) -> Self {
        Self { graph, max_depth }
    }

    /// Resolve a root selection for an entity.
    ///
    /// `Include` returns the entity's scalars; `Depth(n)` additionally
    /// follows every relation for up to `n` hops; a nested map selects
    /// explicitly.
    pub fn resolve(&self, entity: &str, selection: &Selection) -> Result<FetchPlan, Error> {
        let def = self.graph.entity(entity)?;
        match selection {
            Selection::Include => self.expand(def, 0, 0),
            Selection::Depth(0) => Err(Error::InvalidRequest("depth must be positive".into())),
            Selection::Depth(n) => self.expand(def, *n, 0),
            Selection::Nested(_) => self.select(def, selection, 0),
        }
    }

    /// All scalars, plus every relation while hops remain.
    fn expand(&self, def: &EntityDef, remaining: u32, hops: u32) -> Result<FetchPlan, Error> {
        let mut plan = Self::scalars(def);
        if remaining > 0 {
            for relation in &def.relations {
                if hops + 1 > self.max_depth {
                    return Err(Error::CycleDepthExceeded {
                        depth: hops + 1,
                        max: self.max_depth,
                    });
                }
                let target = self.graph.entity(&relation.to_entity)?;
                let sub = self.expand(target, remaining - 1, hops + 1)?;
                plan.steps.push(self.step(relation, sub, hops + 1)?);
            }
        }
        Ok(plan)
    }

    fn select(&self, def: &EntityDef, selection: &Selection, hops: u32) -> Result<FetchPlan, Error> {
        let Selection::Nested(map) = selection else {
            return self.expand(def, 0, hops);
        };

        let mut plan = FetchPlan {
            entity: def.name.clone(),
            fields: vec![ID_FIELD.to_string()],
            steps: Vec::new(),
        };

        for (key, sub) in map {
            if key == ID_FIELD || def.get_field(key).is_some() {
                match sub {
                    Selection::Depth(0) => {
                        return Err(Error::InvalidRequest(format!(
                            "{}.{key}: depth must be positive",
                            def.name
                        )))
                    }
                    Selection::Nested(_) => {
                        return Err(Error::InvalidRequest(format!(
                            "{}.{key} is a scalar and cannot take a nested selection",
                            def.name
                        )))
                    }
                    _ => {
                        if !plan.has_field(key) {
                            plan.fields.push(key.clone());
                        }
                    }
                }
                continue;
            }

            let Some(relation) = def.get_relation(key) else {
                return Err(match sub {
                    Selection::Include => Error::unknown_field(&def.name, key),
                    _ => Error::unknown_relation(&def.name, key),
                });
            };
            let target = self.graph.entity(&relation.to_entity)?;
            let hop = hops + 1;
            if hop > self.max_depth {
                return Err(Error::CycleDepthExceeded {
                    depth: hop,
                    max: self.max_depth,
                });
            }
            let sub_plan = match sub {
                Selection::Include => self.expand(target, 0, hop)?,
                Selection::Depth(0) => {
                    return Err(Error::InvalidRequest(format!(
                        "{}.{key}: depth must be positive",
                        def.name
                    )))
                }
                Selection::Depth(n) => self.expand(target, n - 1, hop)?,
                Selection::Nested(_) => self.select(target, sub, hop)?,
            };
            plan.steps.push(self.step(relation, sub_plan, hop)?);
        }
        Ok(plan)
    }

    fn step(&self, relation: &RelationDef, plan: FetchPlan, hop: u32) -> Result<TraversalStep, Error> {
        if hop > self.max_depth {
            return Err(Error::CycleDepthExceeded {
                depth: hop,
                max: self.max_depth,
            });
        }
        Ok(TraversalStep {
            relation: relation.name.clone(),
            target: relation.to_entity.clone(),
            cardinality: relation.cardinality,
            sort: relation.sort.clone(),
            limit: relation.capacity(),
            plan,
        })
    }

    fn scalars(def: &EntityDef) -> FetchPlan {
        let mut fields = Vec::with_capacity(def.fields.len() + 1);
        fields.push(ID_FIELD.to_string());
        fields.extend(def.fields.iter().map(|f| f.name.clone()));
        FetchPlan {
            entity: def.name.clone(),
            fields,
            steps: Vec::new(),
        }
    }
}
