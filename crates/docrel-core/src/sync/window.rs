//! Ordered, optionally bounded entry lists.
//!
//! Every relation keeps its entries ranked by the declared sort, ties broken
//! by identifier ascending. A bounded relation keeps only the top entries;
//! whatever falls off the end is handed back to the caller.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use docrel_proto::{DocId, OrderDirection, RelationEntry, Value};

use crate::catalog::{Cardinality, EvictionPolicy, RelationDef, RelationSort};
use crate::error::Error;

/// Rank two entries under a sort. Missing values rank as null.
pub(crate) fn compare(sort: &RelationSort, a: &RelationEntry, b: &RelationEntry) -> Ordering {
    let left = a.field(&sort.field).unwrap_or(Value::Null);
    let right = b.field(&sort.field).unwrap_or(Value::Null);
    let ord = match sort.direction {
        OrderDirection::Asc => left.sort_cmp(&right),
        OrderDirection::Desc => right.sort_cmp(&left),
    };
    ord.then_with(|| a.id.cmp(&b.id))
}

/// Whether entries are in rank order.
pub(crate) fn is_ordered(sort: &RelationSort, entries: &[RelationEntry]) -> bool {
    entries
        .windows(2)
        .all(|pair| compare(sort, &pair[0], &pair[1]) != Ordering::Greater)
}

pub(crate) fn resort(sort: &RelationSort, entries: &mut [RelationEntry]) {
    entries.sort_by(|a, b| compare(sort, a, b));
}

/// Put an entry into a relation's list and return the entries pushed out.
///
/// An entry already present only has its snapshot refreshed. A single
/// relation keeps the newest entry; a bounded multiple relation keeps the
/// top `limit` by rank, so the returned entries may include the new one.
/// Under [`EvictionPolicy::Forbid`] a full relation rejects the entry.
pub(crate) fn place(
    def: &RelationDef,
    entries: &mut Vec<RelationEntry>,
    entry: RelationEntry,
) -> Result<Vec<RelationEntry>, Error> {
    if let Some(existing) = entries.iter_mut().find(|e| e.id == entry.id) {
        existing.snapshot = entry.snapshot;
        resort(&def.sort, entries);
        return Ok(Vec::new());
    }

    let full = def.capacity().is_some_and(|cap| entries.len() >= cap);
    if full && def.eviction == EvictionPolicy::Forbid {
        return Err(Error::cardinality(
            &def.from_entity,
            &def.name,
            format!("relation is full ({} entries)", entries.len()),
        ));
    }

    if def.cardinality == Cardinality::Single {
        let evicted = std::mem::take(entries);
        entries.push(entry);
        return Ok(evicted);
    }

    entries.push(entry);
    resort(&def.sort, entries);
    match def.capacity() {
        Some(cap) if entries.len() > cap => Ok(entries.split_off(cap)),
        _ => Ok(Vec::new()),
    }
}

/// Replace the snapshot of one entry and restore rank order.
///
/// Returns whether the entry was present.
pub(crate) fn refresh(
    sort: &RelationSort,
    entries: &mut [RelationEntry],
    id: &DocId,
    snapshot: &BTreeMap<String, Value>,
) -> bool {
    let Some(entry) = entries.iter_mut().find(|e| &e.id == id) else {
        return false;
    };
    entry.snapshot = snapshot.clone();
    resort(sort, entries);
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(population: i64) -> RelationEntry {
        let mut snapshot = BTreeMap::new();
        snapshot.insert("population".to_string(), Value::Int64(population));
        RelationEntry::with_snapshot(DocId::generate(), snapshot)
    }

    fn populations(entries: &[RelationEntry]) -> Vec<i64> {
        entries
            .iter()
            .filter_map(|e| e.field("population").and_then(|v| v.as_i64()))
            .collect()
    }

    fn by_population(limit: usize) -> RelationDef {
        RelationDef::multiple("mostPopulatedCities", "country", "city")
            .with_limit(limit)
            .with_sort(RelationSort::desc("population"))
    }

    #[test]
    fn test_bounded_keeps_top_entries() {
        let def = by_population(2);
        let mut entries = Vec::new();

        assert!(place(&def, &mut entries, entry(10)).unwrap().is_empty());
        assert!(place(&def, &mut entries, entry(30)).unwrap().is_empty());
        let evicted = place(&def, &mut entries, entry(20)).unwrap();
        assert_eq!(populations(&evicted), vec![10]);
        assert_eq!(populations(&entries), vec![30, 20]);

        // A lower-ranked entry falls straight out.
        let low = entry(5);
        let evicted = place(&def, &mut entries, low.clone()).unwrap();
        assert_eq!(evicted[0].id, low.id);
        assert_eq!(populations(&entries), vec![30, 20]);
    }

    #[test]
    fn test_id_sort_keeps_most_recent() {
        let def = RelationDef::multiple("cities", "country", "city").with_limit(2);
        let mut entries = Vec::new();
        let ids: Vec<DocId> = (0..3).map(|_| DocId::generate()).collect();
        for id in &ids {
            place(&def, &mut entries, RelationEntry::new(*id)).unwrap();
        }
        let kept: Vec<DocId> = entries.iter().map(|e| e.id).collect();
        assert_eq!(kept, vec![ids[2], ids[1]]);
    }

    #[test]
    fn test_ties_break_by_id_ascending() {
        let def = by_population(3);
        let mut entries = Vec::new();
        let first = entry(7);
        let second = entry(7);
        place(&def, &mut entries, second.clone()).unwrap();
        place(&def, &mut entries, first.clone()).unwrap();
        assert_eq!(entries[0].id, first.id);
        assert_eq!(entries[1].id, second.id);
        assert!(is_ordered(&def.sort, &entries));
    }

    #[test]
    fn test_single_newest_wins() {
        let def = RelationDef::single("capital", "country", "city").optional();
        let mut entries = Vec::new();
        let old = entry(1);
        let new = entry(2);
        place(&def, &mut entries, old.clone()).unwrap();
        let evicted = place(&def, &mut entries, new.clone()).unwrap();
        assert_eq!(evicted[0].id, old.id);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id, new.id);
    }

    #[test]
    fn test_forbid_rejects_when_full() {
        let def = by_population(1).forbid_eviction();
        let mut entries = Vec::new();
        place(&def, &mut entries, entry(1)).unwrap();
        assert!(matches!(
            place(&def, &mut entries, entry(2)),
            Err(Error::CardinalityViolation { .. })
        ));
        assert_eq!(populations(&entries), vec![1]);
    }

    #[test]
    fn test_existing_entry_refreshed_in_place() {
        let def = by_population(3);
        let mut entries = Vec::new();
        let a = entry(10);
        place(&def, &mut entries, a.clone()).unwrap();
        place(&def, &mut entries, entry(20)).unwrap();

        let mut bigger = BTreeMap::new();
        bigger.insert("population".to_string(), Value::Int64(50));
        assert!(place(&def, &mut entries, RelationEntry::with_snapshot(a.id, bigger.clone()))
            .unwrap()
            .is_empty());
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].id, a.id);

        let mut smaller = BTreeMap::new();
        smaller.insert("population".to_string(), Value::Int64(1));
        assert!(refresh(&def.sort, &mut entries, &a.id, &smaller));
        assert_eq!(entries[1].id, a.id);
        assert!(!refresh(&def.sort, &mut entries, &DocId::generate(), &smaller));
    }
}
