//! Aggregation pipelines: validation, lowering and in-memory execution.

use std::collections::{BTreeSet, HashMap};

use docrel_proto::{Document, FilterExpr, OrderSpec, Pagination, Stage, ID_FIELD};

use super::executor::sort_documents;
use super::filter::{validate_filter, validate_path, FilterEvaluator};
use crate::catalog::RelationGraph;
use crate::error::Error;
use crate::storage::DocumentStore;

/// A pipeline stage resolved against the schema, ready for a store.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineOp {
    /// Keep matching documents.
    Match(FilterExpr),
    /// Reorder; ties fall back to identifier ascending.
    Sort(Vec<OrderSpec>),
    /// Drop leading documents.
    Skip(usize),
    /// Keep leading documents.
    Limit(usize),
    /// Attach full related documents to a relation's entries.
    Lookup {
        /// Relation on the current documents.
        relation: String,
        /// Collection the relation points into.
        collection: String,
    },
}

/// Validate stages for an entity and resolve lookup targets.
///
/// Returns the lowered operations and the set of relations joined by the
/// end of the pipeline. A filter or sort path may only reach past a
/// relation once that relation has been looked up.
pub fn lower(
    graph: &RelationGraph,
    entity: &str,
    stages: &[Stage],
) -> Result<(Vec<PipelineOp>, BTreeSet<String>), Error> {
    graph.entity(entity)?;
    let mut joined = BTreeSet::new();
    let mut ops = Vec::with_capacity(stages.len());

    for stage in stages {
        let op = match stage {
            Stage::Match(filter) => {
                validate_filter(graph, entity, filter, &joined)?;
                PipelineOp::Match(filter.clone())
            }
            Stage::Sort(order) => {
                for spec in order {
                    validate_path(graph, entity, &spec.field, &joined)?;
                }
                PipelineOp::Sort(order.clone())
            }
            Stage::Skip(n) => PipelineOp::Skip(*n),
            Stage::Limit(n) => PipelineOp::Limit(*n),
            Stage::Lookup { relation } => {
                let def = graph.relation(entity, relation)?;
                joined.insert(relation.clone());
                PipelineOp::Lookup {
                    relation: relation.clone(),
                    collection: def.to_entity.clone(),
                }
            }
        };
        ops.push(op);
    }
    Ok((ops, joined))
}

/// Run lowered operations over a collection by scanning it.
///
/// The input stream starts in the default order, identifier descending.
pub fn run_pipeline<S: DocumentStore + ?Sized>(
    store: &S,
    collection: &str,
    ops: &[PipelineOp],
) -> Result<Vec<Document>, Error> {
    let mut docs = store.scan(collection)?;
    sort_documents(&mut docs, &[OrderSpec::desc(ID_FIELD)]);

    for op in ops {
        match op {
            PipelineOp::Match(filter) => docs.retain(|doc| FilterEvaluator::evaluate(filter, doc)),
            PipelineOp::Sort(order) => sort_documents(&mut docs, order),
            PipelineOp::Skip(n) => {
                let n = (*n).min(docs.len());
                docs.drain(..n);
            }
            PipelineOp::Limit(n) => docs.truncate(*n),
            PipelineOp::Lookup {
                relation,
                collection,
            } => lookup(store, &mut docs, relation, collection)?,
        }
    }
    Ok(docs)
}

fn lookup<S: DocumentStore + ?Sized>(
    store: &S,
    docs: &mut [Document],
    relation: &str,
    collection: &str,
) -> Result<(), Error> {
    let ids: BTreeSet<_> = docs
        .iter()
        .flat_map(|doc| doc.relation(relation).iter().map(|e| e.id))
        .collect();
    if ids.is_empty() {
        return Ok(());
    }
    let ids: Vec<_> = ids.into_iter().collect();
    let targets: HashMap<_, _> = store
        .get_many(collection, &ids)?
        .into_iter()
        .map(|doc| (doc.id, doc))
        .collect();

    for doc in docs.iter_mut() {
        if let Some(entries) = doc.relations.get_mut(relation) {
            for entry in entries {
                entry.joined = targets.get(&entry.id).cloned().map(Box::new);
            }
        }
    }
    Ok(())
}

/// Where pagination lands relative to relation expansion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PaginationPlacement {
    /// Paginate base documents, then expand only the page.
    #[default]
    BeforeExpansion,
    /// Expand and filter on joined data first, then paginate.
    AfterExpansion,
}

/// Assembles a pipeline from base filters, lookups and joined filters.
///
/// With [`PaginationPlacement::BeforeExpansion`] the stages come out as
/// `match, sort, skip, limit, lookups, joined match`; with
/// [`PaginationPlacement::AfterExpansion`] as
/// `match, lookups, joined match, sort, skip, limit`.
#[derive(Debug, Clone, Default)]
pub struct PipelineBuilder {
    base: Vec<FilterExpr>,
    lookups: Vec<String>,
    joined: Vec<FilterExpr>,
    order: Vec<OrderSpec>,
    page: Pagination,
    placement: PaginationPlacement,
}

impl PipelineBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter on base-entity fields.
    pub fn matching(mut self, filter: FilterExpr) -> Self {
        self.base.push(filter);
        self
    }

    /// Expand a relation.
    pub fn lookup(mut self, relation: impl Into<String>) -> Self {
        let relation = relation.into();
        if !self.lookups.contains(&relation) {
            self.lookups.push(relation);
        }
        self
    }

    /// Filter on joined data; runs after the lookups.
    pub fn matching_joined(mut self, filter: FilterExpr) -> Self {
        self.joined.push(filter);
        self
    }

    /// Add a sort key.
    pub fn order_by(mut self, spec: OrderSpec) -> Self {
        self.order.push(spec);
        self
    }

    /// Set pagination and where it applies.
    pub fn paginate(mut self, page: Pagination, placement: PaginationPlacement) -> Self {
        self.page = page;
        self.placement = placement;
        self
    }

    /// Produce the stages.
    pub fn build(self) -> Vec<Stage> {
        let mut stages = Vec::new();
        stages.extend(Self::combined(self.base));

        let mut window = Vec::new();
        if !self.order.is_empty() {
            window.push(Stage::Sort(self.order));
        }
        if self.page.skip > 0 {
            window.push(Stage::Skip(self.page.skip));
        }
        if let Some(limit) = self.page.limit {
            window.push(Stage::Limit(limit));
        }

        let mut expansion: Vec<Stage> = self.lookups.into_iter().map(Stage::lookup).collect();
        expansion.extend(Self::combined(self.joined));

        match self.placement {
            PaginationPlacement::BeforeExpansion => {
                stages.extend(window);
                stages.extend(expansion);
            }
            PaginationPlacement::AfterExpansion => {
                stages.extend(expansion);
                stages.extend(window);
            }
        }
        stages
    }

    fn combined(mut filters: Vec<FilterExpr>) -> Option<Stage> {
        match filters.len() {
            0 => None,
            1 => filters.pop().map(Stage::Match),
            _ => Some(Stage::Match(FilterExpr::and(filters))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{EntityDef, FieldDef, RelationDef, ScalarType, SchemaRegistry};
    use crate::storage::{Batch, MemoryStore};
    use docrel_proto::{DocId, RelationEntry, Value};

    fn graph() -> RelationGraph {
        let mut registry = SchemaRegistry::new();
        registry
            .register(EntityDef::new("country").with_field(FieldDef::new("name", ScalarType::String)))
            .unwrap();
        registry
            .register(
                EntityDef::new("city")
                    .with_field(FieldDef::new("name", ScalarType::String))
                    .with_relation(
                        RelationDef::single("country", "city", "country")
                            .with_inverse(RelationDef::multiple("cities", "country", "city").with_limit(3)),
                    ),
            )
            .unwrap();
        registry.build().unwrap()
    }

    fn seed(store: &MemoryStore) -> (Document, Vec<Document>) {
        let mut country = Document::new(DocId::generate()).with_field("name", "Iran");
        let mut cities = Vec::new();
        for name in ["Tabriz", "Shiraz", "Yazd"] {
            let mut city = Document::new(DocId::generate()).with_field("name", name);
            city.relation_mut("country")
                .push(RelationEntry::with_snapshot(country.id, country.snapshot()));
            country
                .relation_mut("cities")
                .insert(0, RelationEntry::with_snapshot(city.id, city.snapshot()));
            cities.push(city);
        }
        let mut batch = Batch::new();
        batch.put("country", country.clone());
        for city in &cities {
            batch.put("city", city.clone());
        }
        store.apply(batch).unwrap();
        // Renaming the country after the fact leaves stale snapshots behind,
        // which only a lookup sees through.
        let renamed = country.clone().with_field("name", "Persia");
        let mut batch = Batch::new();
        batch.put("country", renamed.clone());
        store.apply(batch).unwrap();
        (renamed, cities)
    }

    #[test]
    fn test_lower_validates_paths() {
        let graph = graph();
        let stages = vec![Stage::Match(FilterExpr::eq("country.cities.name", "Yazd"))];
        assert!(matches!(lower(&graph, "city", &stages), Err(Error::InvalidRequest(_))));

        let stages = vec![
            Stage::lookup("country"),
            Stage::Match(FilterExpr::eq("country.cities", "x")),
        ];
        let (ops, joined) = lower(&graph, "city", &stages).unwrap();
        assert_eq!(joined.into_iter().collect::<Vec<_>>(), vec!["country"]);
        assert_eq!(
            ops[0],
            PipelineOp::Lookup {
                relation: "country".into(),
                collection: "country".into()
            }
        );

        let stages = vec![Stage::Sort(vec![OrderSpec::asc("altitude")])];
        assert!(matches!(lower(&graph, "city", &stages), Err(Error::UnknownField { .. })));
        let stages = vec![Stage::lookup("mayor")];
        assert!(matches!(lower(&graph, "city", &stages), Err(Error::UnknownRelation { .. })));
    }

    #[test]
    fn test_run_pipeline_default_order_and_paging() {
        let store = MemoryStore::new();
        let (_, cities) = seed(&store);

        let docs = run_pipeline(&store, "city", &[PipelineOp::Skip(1), PipelineOp::Limit(1)]).unwrap();
        // Newest first: Yazd, Shiraz, Tabriz.
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].id, cities[1].id);

        let docs = run_pipeline(&store, "city", &[PipelineOp::Skip(10)]).unwrap();
        assert!(docs.is_empty());
    }

    #[test]
    fn test_lookup_sees_current_target() {
        let store = MemoryStore::new();
        seed(&store);

        let stale = run_pipeline(
            &store,
            "city",
            &[PipelineOp::Match(FilterExpr::eq("country.name", "Persia"))],
        )
        .unwrap();
        assert!(stale.is_empty());

        let joined = run_pipeline(
            &store,
            "city",
            &[
                PipelineOp::Lookup {
                    relation: "country".into(),
                    collection: "country".into(),
                },
                PipelineOp::Match(FilterExpr::eq("country.name", "Persia")),
                PipelineOp::Sort(vec![OrderSpec::asc("name")]),
            ],
        )
        .unwrap();
        let names: Vec<Value> = joined.iter().filter_map(|d| d.get("name")).collect();
        assert_eq!(
            names,
            vec![Value::from("Shiraz"), Value::from("Tabriz"), Value::from("Yazd")]
        );
    }

    #[test]
    fn test_builder_placement() {
        let page = Pagination::new(2, 5);
        let before = PipelineBuilder::new()
            .matching(FilterExpr::eq("name", "Yazd"))
            .lookup("country")
            .matching_joined(FilterExpr::eq("country.name", "Iran"))
            .order_by(OrderSpec::asc("name"))
            .paginate(page, PaginationPlacement::BeforeExpansion)
            .build();
        assert_eq!(
            before,
            vec![
                Stage::Match(FilterExpr::eq("name", "Yazd")),
                Stage::Sort(vec![OrderSpec::asc("name")]),
                Stage::Skip(2),
                Stage::Limit(5),
                Stage::lookup("country"),
                Stage::Match(FilterExpr::eq("country.name", "Iran")),
            ]
        );

        let after = PipelineBuilder::new()
            .lookup("country")
            .lookup("country")
            .matching_joined(FilterExpr::eq("country.name", "Iran"))
            .matching_joined(FilterExpr::is_not_null("country._id"))
            .paginate(Pagination::limit(1), PaginationPlacement::AfterExpansion)
            .build();
        assert_eq!(
            after,
            vec![
                Stage::lookup("country"),
                Stage::Match(FilterExpr::and(vec![
                    FilterExpr::eq("country.name", "Iran"),
                    FilterExpr::is_not_null("country._id"),
                ])),
                Stage::Limit(1),
            ]
        );
    }
}
