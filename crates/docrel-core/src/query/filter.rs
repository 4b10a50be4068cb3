//! Filter evaluation and path validation.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use docrel_proto::{Document, FilterExpr, Value, ID_FIELD};

use crate::catalog::RelationGraph;
use crate::error::Error;

/// Evaluates filter expressions against documents.
///
/// Paths resolve through [`Document::resolve_path`]; a predicate on a path
/// reaching several values holds when any of them satisfies it, except the
/// negative forms (`Ne`, `NotIn`) which require that none match.
pub struct FilterEvaluator;

impl FilterEvaluator {
    /// Check if a document matches a filter.
    pub fn evaluate(filter: &FilterExpr, doc: &Document) -> bool {
        match filter {
            FilterExpr::Eq { field, value } => Self::any(doc, field, |v| Self::equals(v, value)),
            FilterExpr::Ne { field, value } => !Self::any(doc, field, |v| Self::equals(v, value)),
            FilterExpr::Lt { field, value } => {
                Self::any(doc, field, |v| Self::ordered(v, value) == Some(Ordering::Less))
            }
            FilterExpr::Le { field, value } => Self::any(doc, field, |v| {
                matches!(Self::ordered(v, value), Some(Ordering::Less | Ordering::Equal))
            }),
            FilterExpr::Gt { field, value } => {
                Self::any(doc, field, |v| Self::ordered(v, value) == Some(Ordering::Greater))
            }
            FilterExpr::Ge { field, value } => Self::any(doc, field, |v| {
                matches!(Self::ordered(v, value), Some(Ordering::Greater | Ordering::Equal))
            }),
            FilterExpr::In { field, values } => {
                Self::any(doc, field, |v| values.iter().any(|c| Self::equals(v, c)))
            }
            FilterExpr::NotIn { field, values } => {
                !Self::any(doc, field, |v| values.iter().any(|c| Self::equals(v, c)))
            }
            FilterExpr::IsNull { field } => !Self::any(doc, field, |v| !v.is_null()),
            FilterExpr::IsNotNull { field } => Self::any(doc, field, |v| !v.is_null()),
            FilterExpr::Like { field, pattern } => Self::any(doc, field, |v| {
                v.as_str().is_some_and(|s| like_match(s, pattern))
            }),
            FilterExpr::And(exprs) => exprs.iter().all(|e| Self::evaluate(e, doc)),
            FilterExpr::Or(exprs) => exprs.iter().any(|e| Self::evaluate(e, doc)),
            FilterExpr::Not(inner) => !Self::evaluate(inner, doc),
        }
    }

    fn any(doc: &Document, path: &str, pred: impl Fn(&Value) -> bool) -> bool {
        doc.resolve_path(path).iter().any(pred)
    }

    fn equals(a: &Value, b: &Value) -> bool {
        a.compare(b) == Some(Ordering::Equal)
    }

    /// Ordering comparison; null never satisfies a range predicate.
    fn ordered(a: &Value, b: &Value) -> Option<Ordering> {
        if a.is_null() || b.is_null() {
            return None;
        }
        a.compare(b)
    }
}

/// SQL LIKE matching: `%` any run, `_` one character, `\` escapes.
pub fn like_match(value: &str, pattern: &str) -> bool {
    let text: Vec<char> = value.chars().collect();
    let mut tokens = Vec::new();
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        tokens.push(match c {
            '%' => LikeToken::Any,
            '_' => LikeToken::One,
            '\\' => LikeToken::Literal(chars.next().unwrap_or('\\')),
            other => LikeToken::Literal(other),
        });
    }

    // Greedy scan with a single backtrack point at the last `%`.
    let (mut t, mut p) = (0, 0);
    let mut star: Option<(usize, usize)> = None;
    while t < text.len() {
        match tokens.get(p) {
            Some(LikeToken::One) => {
                t += 1;
                p += 1;
            }
            Some(LikeToken::Literal(c)) if *c == text[t] => {
                t += 1;
                p += 1;
            }
            Some(LikeToken::Any) => {
                star = Some((p, t));
                p += 1;
            }
            _ => match star {
                Some((sp, st)) => {
                    p = sp + 1;
                    t = st + 1;
                    star = Some((sp, st + 1));
                }
                None => return false,
            },
        }
    }
    tokens[p..].iter().all(|tok| matches!(tok, LikeToken::Any))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LikeToken {
    Any,
    One,
    Literal(char),
}

/// Check that every path a filter mentions exists on the entity.
///
/// `joined` lists relations expanded by a lookup stage; paths may continue
/// past those into the related entity's own relations.
pub fn validate_filter(
    graph: &RelationGraph,
    entity: &str,
    filter: &FilterExpr,
    joined: &BTreeSet<String>,
) -> Result<(), Error> {
    for path in filter.fields() {
        validate_path(graph, entity, path, joined)?;
    }
    Ok(())
}

/// Check that a field path exists on the entity.
pub fn validate_path(
    graph: &RelationGraph,
    entity: &str,
    path: &str,
    joined: &BTreeSet<String>,
) -> Result<(), Error> {
    let def = graph.entity(entity)?;
    match path.split_once('.') {
        None => {
            if path == ID_FIELD || def.has_member(path) {
                Ok(())
            } else {
                Err(Error::unknown_field(entity, path))
            }
        }
        Some((head, rest)) => {
            let relation = graph.relation(entity, head)?;
            if joined.contains(head) {
                return validate_path(graph, &relation.to_entity, rest, &BTreeSet::new());
            }
            if rest.contains('.') {
                return Err(Error::InvalidRequest(format!(
                    "path {path} reaches past {entity}.{head}; add a lookup stage for {head}"
                )));
            }
            if rest == ID_FIELD || graph.entity(&relation.to_entity)?.get_field(rest).is_some() {
                Ok(())
            } else {
                Err(Error::unknown_field(&relation.to_entity, rest))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docrel_proto::{DocId, RelationEntry};

    fn country_with_cities(populations: &[i64]) -> Document {
        let mut doc = Document::new(DocId::generate()).with_field("name", "Iran");
        for population in populations {
            let city = Document::new(DocId::generate()).with_field("population", *population);
            doc.relation_mut("cities")
                .push(RelationEntry::with_snapshot(city.id, city.snapshot()));
        }
        doc
    }

    #[test]
    fn test_scalar_predicates() {
        let doc = Document::new(DocId::generate())
            .with_field("name", "Tehran")
            .with_field("population", 9_000_000i64)
            .with_field("area", Value::Null);

        assert!(FilterEvaluator::evaluate(&FilterExpr::eq("name", "Tehran"), &doc));
        assert!(FilterEvaluator::evaluate(&FilterExpr::ne("name", "Qom"), &doc));
        assert!(FilterEvaluator::evaluate(&FilterExpr::ge("population", 9_000_000), &doc));
        assert!(!FilterEvaluator::evaluate(&FilterExpr::lt("population", 10), &doc));
        assert!(FilterEvaluator::evaluate(&FilterExpr::is_null("area"), &doc));
        assert!(FilterEvaluator::evaluate(&FilterExpr::is_null("missing"), &doc));
        assert!(FilterEvaluator::evaluate(&FilterExpr::is_not_null("name"), &doc));
        assert!(!FilterEvaluator::evaluate(&FilterExpr::gt("area", 0), &doc));
    }

    #[test]
    fn test_id_predicate() {
        let doc = Document::new(DocId::generate());
        assert!(FilterEvaluator::evaluate(&FilterExpr::id(doc.id), &doc));
        assert!(FilterEvaluator::evaluate(
            &FilterExpr::eq("_id", doc.id.to_hex()),
            &doc
        ));
    }

    #[test]
    fn test_any_element_semantics() {
        let doc = country_with_cities(&[100, 2_000, 30_000]);

        assert!(FilterEvaluator::evaluate(&FilterExpr::ge("cities.population", 20_000), &doc));
        assert!(!FilterEvaluator::evaluate(&FilterExpr::gt("cities.population", 50_000), &doc));
        assert!(!FilterEvaluator::evaluate(&FilterExpr::ne("cities.population", 100), &doc));
        assert!(FilterEvaluator::evaluate(
            &FilterExpr::not_in_values("cities.population", vec![Value::Int64(5)]),
            &doc
        ));

        let empty = country_with_cities(&[]);
        assert!(!FilterEvaluator::evaluate(&FilterExpr::ge("cities.population", 0), &empty));
        assert!(FilterEvaluator::evaluate(&FilterExpr::is_null("cities._id"), &empty));
    }

    #[test]
    fn test_compound() {
        let doc = country_with_cities(&[5]);
        let filter = FilterExpr::and(vec![
            FilterExpr::eq("name", "Iran"),
            FilterExpr::or(vec![
                FilterExpr::eq("cities.population", 5),
                FilterExpr::eq("name", "Iraq"),
            ]),
            FilterExpr::not(FilterExpr::like("name", "Ir_q")),
        ]);
        assert!(FilterEvaluator::evaluate(&filter, &doc));
    }

    #[test]
    fn test_like_match() {
        assert!(like_match("hello", "hello"));
        assert!(like_match("hello", "h%"));
        assert!(like_match("hello", "%llo"));
        assert!(like_match("hello", "h_llo"));
        assert!(like_match("hello", "%"));
        assert!(like_match("", "%"));
        assert!(like_match("abcabc", "%b%c"));
        assert!(like_match("50%", "50\\%"));
        assert!(!like_match("500", "50\\%"));
        assert!(!like_match("hello", "h_lo"));
        assert!(!like_match("hello", "hello_"));
        assert!(!like_match("", "_"));
    }
}
