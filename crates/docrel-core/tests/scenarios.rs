//! End-to-end scenarios over the sample world on a sled store.

mod common;

use common::{fields, TestContext};
use docrel_core::{Error, FindOptions, RelationRef};
use docrel_proto::{DocId, FilterExpr, OrderSpec, Selection, Stage, Value};

#[test]
fn test_city_insert_sets_capital() {
    let t = TestContext::sled();
    let country = t.country("A", 100);

    let city = t
        .db
        .insert(
            &t.ctx,
            "city",
            fields(&[("name", Value::from("X"))]),
            &[RelationRef::to("country", country).with_related("capital", true)],
        )
        .unwrap();

    assert_eq!(t.related("country", country, "capital"), vec![city.id]);
    assert_eq!(t.related("country", country, "cities"), vec![city.id]);
    assert_eq!(t.related("city", city.id, "country"), vec![country]);

    // Capital is only written when asked for.
    let other = t.city("Y", 10, country);
    assert_eq!(t.related("country", country, "capital"), vec![city.id]);
    assert_eq!(t.related("country", country, "cities"), vec![other, city.id]);
    assert!(t.db.audit().unwrap().is_clean());
}

#[test]
fn test_replace_most_loved_city() {
    let t = TestContext::sled();
    let country = t.country("A", 100);
    let x = t.city("X", 10, country);
    let y = t.city("Y", 20, country);
    let user = t.user("U", &[x], country);
    let filter = FilterExpr::id(user);

    t.db.add_relation(&t.ctx, "user", &filter, &RelationRef::to("mostLovedCity", x), true)
        .unwrap();
    assert_eq!(t.related("city", x, "lovedByUsers"), vec![user]);

    t.db.add_relation(&t.ctx, "user", &filter, &RelationRef::to("mostLovedCity", y), true)
        .unwrap();
    assert_eq!(t.related("user", user, "mostLovedCity"), vec![y]);
    assert!(t.related("city", x, "lovedByUsers").is_empty());
    assert_eq!(t.related("city", y, "lovedByUsers"), vec![user]);
    assert!(t.db.audit().unwrap().is_clean());
}

#[test]
fn test_filled_single_relation_needs_replace() {
    let t = TestContext::sled();
    let country = t.country("A", 100);
    let x = t.city("X", 10, country);
    let y = t.city("Y", 20, country);
    let user = t.user("U", &[x], country);
    let filter = FilterExpr::id(user);

    t.db.add_relation(&t.ctx, "user", &filter, &RelationRef::to("mostLovedCity", x), false)
        .unwrap();
    // Re-adding the same target is a no-op.
    t.db.add_relation(&t.ctx, "user", &filter, &RelationRef::to("mostLovedCity", x), false)
        .unwrap();

    let err = t
        .db
        .add_relation(&t.ctx, "user", &filter, &RelationRef::to("mostLovedCity", y), false)
        .unwrap_err();
    assert!(matches!(err, Error::CardinalityViolation { .. }));
    assert_eq!(t.related("user", user, "mostLovedCity"), vec![x]);
    assert!(t.related("city", y, "lovedByUsers").is_empty());
}

#[test]
fn test_hard_delete_cascades_to_cities_and_orphaned_users() {
    let t = TestContext::sled();
    let a = t.country("A", 100);
    let b = t.country("B", 50);
    let x = t.city("X", 10, a);
    let y = t.city("Y", 20, b);
    let only_x = t.user("U", &[x], b);
    let both = t.user("V", &[x, y], b);

    let outcome = t.db.delete(&t.ctx, "country", a, true).unwrap();
    assert_eq!(outcome.success, 1);

    assert!(!t.exists("country", a));
    assert!(!t.exists("city", x));
    assert!(!t.exists("user", only_x));
    assert!(t.exists("user", both));
    assert_eq!(t.related("user", both, "livedCities"), vec![y]);
    assert_eq!(t.related("city", y, "users"), vec![both]);
    assert_eq!(t.related("country", b, "users"), vec![both]);

    let deleted: Vec<DocId> = outcome.cascade.deleted.iter().map(|(_, id)| *id).collect();
    assert_eq!(deleted.len(), 3);
    assert!(deleted.contains(&x) && deleted.contains(&only_x));
    assert!(t.db.audit().unwrap().is_clean());
}

#[test]
fn test_soft_delete_keeps_referrers() {
    let t = TestContext::sled();
    let a = t.country("A", 100);
    let x = t.city("X", 10, a);

    let outcome = t.db.delete(&t.ctx, "country", a, false).unwrap();
    assert_eq!(outcome.success, 1);
    assert_eq!(outcome.cascade.deleted.len(), 1);
    assert!(t.exists("city", x));
    assert!(t.related("city", x, "country").is_empty());
    assert!(t.db.audit().unwrap().is_clean());
}

#[test]
fn test_fourth_city_evicts_oldest() {
    let t = TestContext::sled();
    let a = t.country("A", 100);
    let b = t.country("B", 50);
    let c1 = t.city("C1", 1, a);
    let c2 = t.city("C2", 2, a);
    let c3 = t.city("C3", 3, a);
    let d = t.city("D", 4, b);

    t.db.add_relation(&t.ctx, "city", &FilterExpr::id(d), &RelationRef::to("country", a), true)
        .unwrap();

    assert_eq!(t.related("country", a, "cities"), vec![d, c3, c2]);
    assert_eq!(t.related("country", a, "mostPopulatedCities"), vec![d, c3, c2]);
    assert!(t.related("country", b, "cities").is_empty());
    // Evicted from the window, still pointing at its country.
    assert_eq!(t.related("city", c1, "country"), vec![a]);
    assert!(t.db.audit().unwrap().is_clean());
}

#[test]
fn test_insert_failures_leave_nothing_behind() {
    let t = TestContext::sled();
    let a = t.country("A", 100);

    let err = t
        .db
        .insert(
            &t.ctx,
            "city",
            fields(&[("name", Value::from("X"))]),
            &[RelationRef::to("country", DocId::generate())],
        )
        .unwrap_err();
    assert!(matches!(err, Error::DanglingReference { .. }));

    let err = t
        .db
        .insert(&t.ctx, "city", fields(&[("name", Value::from("X"))]), &[RelationRef::to("mayor", a)])
        .unwrap_err();
    assert!(matches!(err, Error::UnknownRelation { .. }));

    let err = t
        .db
        .insert(&t.ctx, "city", fields(&[("name", Value::from("X"))]), &[])
        .unwrap_err();
    assert!(matches!(err, Error::MissingRequiredRelation { .. }));

    let err = t
        .db
        .insert(
            &t.ctx,
            "city",
            fields(&[("name", Value::from(3i64))]),
            &[RelationRef::to("country", a)],
        )
        .unwrap_err();
    assert!(matches!(err, Error::InvalidValue { .. }));

    assert_eq!(t.db.count("city", None).unwrap(), 0);
    assert!(t.related("country", a, "cities").is_empty());
}

#[test]
fn test_remove_relation_is_idempotent() {
    let t = TestContext::sled();
    let a = t.country("A", 100);
    let x = t.city("X", 10, a);
    let y = t.city("Y", 20, a);
    let user = t.user("U", &[x, y], a);
    let filter = FilterExpr::id(user);

    t.db.remove_relation(&t.ctx, "user", &filter, "livedCities", &[y]).unwrap();
    t.db.remove_relation(&t.ctx, "user", &filter, "livedCities", &[y]).unwrap();
    assert_eq!(t.related("user", user, "livedCities"), vec![x]);
    assert!(t.related("city", y, "users").is_empty());

    let err = t
        .db
        .remove_relation(&t.ctx, "user", &filter, "livedCities", &[x])
        .unwrap_err();
    assert!(matches!(err, Error::MissingRequiredRelation { .. }));
    assert_eq!(t.related("city", x, "users"), vec![user]);
}

#[test]
fn test_nested_projection() {
    let t = TestContext::sled();
    let a = t.country("A", 100);
    let x = t.city("X", 10, a);
    let y = t.city("Y", 20, a);
    let user = t.user("U", &[x, y], a);

    let selection = Selection::fields(["name"]).with(
        "livedCities",
        Selection::fields(["name"]).include("country"),
    );
    let found = t
        .db
        .find(
            "user",
            &FindOptions::new()
                .with_filter(FilterExpr::id(user))
                .with_selection(selection),
        )
        .unwrap();

    assert_eq!(found.len(), 1);
    let doc = &found[0];
    assert_eq!(doc.get("name"), Some(&Value::from("U")));
    assert!(doc.get("age").is_none());
    let lived = doc.many("livedCities");
    assert_eq!(lived.iter().map(|c| c.id).collect::<Vec<_>>(), vec![y, x]);
    for city in lived {
        assert!(city.get("population").is_none());
        assert_eq!(city.one("country").map(|c| c.id), Some(a));
    }

    // Cyclic chains stay within the requested depth.
    let deep = t
        .db
        .find_one("user", Some(&FilterExpr::id(user)), &Selection::Depth(3))
        .unwrap()
        .unwrap();
    let users_of_x = deep.many("livedCities")[1].many("users");
    assert_eq!(users_of_x.len(), 1);
    assert!(users_of_x[0].relations.values().all(|r| match r {
        docrel_core::ProjectedRelation::Many(docs) => docs.iter().all(|d| d.relations.is_empty()),
        docrel_core::ProjectedRelation::One(doc) => doc.iter().all(|d| d.relations.is_empty()),
    }));

    let err = t
        .db
        .find(
            "user",
            &FindOptions::new().with_selection(Selection::nested().include("friends")),
        )
        .unwrap_err();
    assert!(matches!(err, Error::UnknownField { .. } | Error::UnknownRelation { .. }));
}

#[test]
fn test_update_refreshes_snapshots() {
    let t = TestContext::sled();
    let a = t.country("A", 100);
    let small = t.city("Small", 10, a);
    let big = t.city("Big", 20, a);
    assert_eq!(t.related("country", a, "mostPopulatedCities"), vec![big, small]);

    t.db.update(
        &t.ctx,
        "country",
        &FilterExpr::id(a),
        &fields(&[("name", Value::from("Renamed"))]),
    )
    .unwrap();
    let found = t
        .db
        .find(
            "city",
            &FindOptions::new().with_filter(FilterExpr::eq("country.name", "Renamed")),
        )
        .unwrap();
    assert_eq!(found.len(), 2);

    t.db.update(
        &t.ctx,
        "city",
        &FilterExpr::id(small),
        &fields(&[("population", Value::from(30i64))]),
    )
    .unwrap();
    assert_eq!(t.related("country", a, "mostPopulatedCities"), vec![small, big]);
    assert!(t.db.audit().unwrap().is_clean());
}

#[test]
fn test_aggregate_lookup_match_sort() {
    let t = TestContext::sled();
    let big_country = t.country("Big", 1000);
    let small_country = t.country("Small", 10);
    let a = t.city("A", 5, big_country);
    let b = t.city("B", 50, big_country);
    t.city("C", 500, small_country);

    let stages = vec![
        Stage::lookup("country"),
        Stage::matching(FilterExpr::ge("country.population", 100i64)),
        Stage::Sort(vec![OrderSpec::desc("population")]),
    ];
    let selection = Selection::fields(["name"]).include("country");
    let found = t.db.aggregate("city", &stages, &selection, 0, None).unwrap();

    assert_eq!(found.iter().map(|c| c.id).collect::<Vec<_>>(), vec![b, a]);
    assert_eq!(
        found[0].one("country").and_then(|c| c.get("name")),
        Some(&Value::from("Big"))
    );

    let paged = t.db.aggregate("city", &stages, &selection, 1, Some(1)).unwrap();
    assert_eq!(paged.len(), 1);
    assert_eq!(paged[0].id, a);
}

#[test]
fn test_find_pages_newest_first() {
    let t = TestContext::sled();
    let a = t.country("A", 100);
    let ids: Vec<DocId> = (0..12).map(|i| t.city(&format!("C{i}"), i, a)).collect();

    let first = t.db.find("city", &FindOptions::new()).unwrap();
    assert_eq!(first.len(), 10);
    assert_eq!(first[0].id, ids[11]);

    let rest = t
        .db
        .find("city", &FindOptions::new().with_skip(10).with_limit(5))
        .unwrap();
    assert_eq!(rest.iter().map(|c| c.id).collect::<Vec<_>>(), vec![ids[1], ids[0]]);

    let by_population = t
        .db
        .find(
            "city",
            &FindOptions::new()
                .with_filter(FilterExpr::lt("population", 3i64))
                .with_order(OrderSpec::asc("population")),
        )
        .unwrap();
    assert_eq!(
        by_population.iter().map(|c| c.id).collect::<Vec<_>>(),
        vec![ids[0], ids[1], ids[2]]
    );
}

#[test]
fn test_concurrent_relation_writes_stay_symmetric() {
    let t = TestContext::sled();
    let a = t.country("A", 100);
    let cities: Vec<DocId> = (0..4).map(|i| t.city(&format!("C{i}"), i, a)).collect();
    let users: Vec<DocId> = (0..6).map(|i| t.user(&format!("U{i}"), &[cities[i % 4]], a)).collect();

    std::thread::scope(|scope| {
        for worker in 0..8usize {
            let t = &t;
            let (cities, users) = (&cities, &users);
            scope.spawn(move || {
                for step in 0..60usize {
                    let user = users[(worker * 5 + step) % users.len()];
                    let city = cities[(worker + step * 3) % cities.len()];
                    let filter = FilterExpr::id(user);
                    let result = match step % 3 {
                        0 => t
                            .db
                            .add_relation(&t.ctx, "user", &filter, &RelationRef::to("livedCities", city), false)
                            .map(drop),
                        1 => t
                            .db
                            .remove_relation(&t.ctx, "user", &filter, "livedCities", &[city])
                            .map(drop),
                        _ => t
                            .db
                            .add_relation(&t.ctx, "user", &filter, &RelationRef::to("mostLovedCity", city), true)
                            .map(drop),
                    };
                    // Removing the last lived city is refused; nothing else may fail.
                    assert!(
                        matches!(result, Ok(()) | Err(Error::MissingRequiredRelation { .. })),
                        "{result:?}"
                    );
                }
            });
        }
    });

    let report = t.db.audit().unwrap();
    assert!(report.is_clean(), "{:?}", report.violations);
    for city in &cities {
        let mut residents = t.related("city", *city, "residents");
        residents.sort();
        let mut expected: Vec<DocId> = users
            .iter()
            .copied()
            .filter(|u| t.related("user", *u, "livedCities").contains(city))
            .collect();
        expected.sort();
        assert_eq!(residents, expected);
        assert!(t.related("city", *city, "users").len() <= 5);
    }
}
