//! Sample world: countries, cities, users and their uploaded files.

use docrel_core::catalog::{
    EntityDef, FieldDef, RelationDef, RelationGraph, RelationSort, ScalarType, SchemaRegistry,
};
use docrel_core::Error;

/// Fields shared by countries and cities.
fn location(name: &str) -> EntityDef {
    EntityDef::new(name)
        .with_field(FieldDef::new("name", ScalarType::String))
        .with_field(FieldDef::optional("population", ScalarType::Int64))
        .with_field(FieldDef::optional("abb", ScalarType::String))
}

/// A bounded inverse keeping the most recent referrers.
fn recent(name: &str, from: &str, to: &str, limit: usize) -> RelationDef {
    RelationDef::multiple(name, from, to).with_limit(limit)
}

fn city() -> EntityDef {
    location("city").with_relation(
        RelationDef::single("country", "city", "country")
            .with_inverse(recent("cities", "country", "city", 3))
            .with_inverse(
                recent("mostPopulatedCities", "country", "city", 3)
                    .with_sort(RelationSort::desc("population")),
            )
            .with_inverse(RelationDef::single("capital", "country", "city").on_demand()),
    )
}

fn user() -> EntityDef {
    EntityDef::new("user")
        .with_field(FieldDef::new("name", ScalarType::String))
        .with_field(FieldDef::new("age", ScalarType::Int64))
        .with_field(FieldDef::optional("level", ScalarType::String))
        .with_relation(
            RelationDef::multiple("livedCities", "user", "city")
                .with_inverse(recent("users", "city", "user", 5)),
        )
        .with_relation(
            RelationDef::single("mostLovedCity", "user", "city")
                .optional()
                .with_inverse(recent("lovedByUsers", "city", "user", 3)),
        )
        .with_relation(
            RelationDef::single("country", "user", "country")
                .with_inverse(recent("users", "country", "user", 5)),
        )
}

fn file() -> EntityDef {
    EntityDef::new("file")
        .with_field(FieldDef::new("name", ScalarType::String))
        .with_field(FieldDef::new("type", ScalarType::String))
        .with_field(FieldDef::new("size", ScalarType::Int64))
        .with_relation(
            RelationDef::single("uploader", "file", "user")
                .with_inverse(recent("uploadedImages", "user", "file", 5)),
        )
}

/// Register the sample entities and freeze them into a graph.
pub fn sample_world() -> Result<RelationGraph, Error> {
    let mut registry = SchemaRegistry::new();
    registry
        .register(location("country"))?
        .register(city())?
        .register(user())?
        .register(file())?;
    registry.build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_world_builds() {
        let graph = sample_world().unwrap();
        assert_eq!(
            graph.entity_names().collect::<Vec<_>>(),
            vec!["city", "country", "file", "user"]
        );

        let inverses: Vec<&str> = graph
            .inverses_of(graph.forward_relation("city", "country").unwrap())
            .into_iter()
            .map(|r| r.name.as_str())
            .collect();
        assert_eq!(inverses, vec!["cities", "mostPopulatedCities", "capital"]);
        assert!(!graph.relation("country", "capital").unwrap().tracked_by_default);
        assert_eq!(graph.relations_to("city").len(), 2);
    }
}
