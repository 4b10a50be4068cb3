//! Filter, ordering and pagination IR.

use serde::{Deserialize, Serialize};

use crate::document::ID_FIELD;
use crate::error::Error;
use crate::value::Value;

/// Filter expression over document fields.
///
/// Field names may be dotted paths into relation entries
/// (`country._id`, `mostPopulatedCities.population`); a dotted predicate
/// holds when any entry satisfies it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FilterExpr {
    /// Field equals value.
    Eq { field: String, value: Value },
    /// Field not equals value.
    Ne { field: String, value: Value },
    /// Field less than value.
    Lt { field: String, value: Value },
    /// Field less than or equal to value.
    Le { field: String, value: Value },
    /// Field greater than value.
    Gt { field: String, value: Value },
    /// Field greater than or equal to value.
    Ge { field: String, value: Value },
    /// Field is in a set of values.
    In { field: String, values: Vec<Value> },
    /// Field is not in a set of values.
    NotIn { field: String, values: Vec<Value> },
    /// Field is null or absent.
    IsNull { field: String },
    /// Field is present and not null.
    IsNotNull { field: String },
    /// Field matches a LIKE pattern (`%` and `_` wildcards).
    Like { field: String, pattern: String },
    /// All conditions must be true.
    And(Vec<FilterExpr>),
    /// At least one condition must be true.
    Or(Vec<FilterExpr>),
    /// Condition must be false.
    Not(Box<FilterExpr>),
}

impl FilterExpr {
    /// Create an equality filter.
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        FilterExpr::Eq {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Create a not-equal filter.
    pub fn ne(field: impl Into<String>, value: impl Into<Value>) -> Self {
        FilterExpr::Ne {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Create a less-than filter.
    pub fn lt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        FilterExpr::Lt {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Create a less-than-or-equal filter.
    pub fn le(field: impl Into<String>, value: impl Into<Value>) -> Self {
        FilterExpr::Le {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Create a greater-than filter.
    pub fn gt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        FilterExpr::Gt {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Create a greater-than-or-equal filter.
    pub fn ge(field: impl Into<String>, value: impl Into<Value>) -> Self {
        FilterExpr::Ge {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Create an IN filter.
    pub fn in_values(field: impl Into<String>, values: Vec<Value>) -> Self {
        FilterExpr::In {
            field: field.into(),
            values,
        }
    }

    /// Create a NOT IN filter.
    pub fn not_in_values(field: impl Into<String>, values: Vec<Value>) -> Self {
        FilterExpr::NotIn {
            field: field.into(),
            values,
        }
    }

    /// Create an IS NULL filter.
    pub fn is_null(field: impl Into<String>) -> Self {
        FilterExpr::IsNull {
            field: field.into(),
        }
    }

    /// Create an IS NOT NULL filter.
    pub fn is_not_null(field: impl Into<String>) -> Self {
        FilterExpr::IsNotNull {
            field: field.into(),
        }
    }

    /// Create a LIKE filter.
    pub fn like(field: impl Into<String>, pattern: impl Into<String>) -> Self {
        FilterExpr::Like {
            field: field.into(),
            pattern: pattern.into(),
        }
    }

    /// Match a single document by identifier.
    pub fn id(id: crate::value::DocId) -> Self {
        FilterExpr::eq(ID_FIELD, Value::Id(id))
    }

    /// Combine expressions with AND.
    pub fn and(exprs: Vec<FilterExpr>) -> Self {
        FilterExpr::And(exprs)
    }

    /// Combine expressions with OR.
    pub fn or(exprs: Vec<FilterExpr>) -> Self {
        FilterExpr::Or(exprs)
    }

    /// Negate an expression.
    pub fn not(expr: FilterExpr) -> Self {
        FilterExpr::Not(Box::new(expr))
    }

    /// Every field path referenced by the expression, in order of appearance.
    pub fn fields(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_fields(&mut out);
        out
    }

    fn collect_fields<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            FilterExpr::Eq { field, .. }
            | FilterExpr::Ne { field, .. }
            | FilterExpr::Lt { field, .. }
            | FilterExpr::Le { field, .. }
            | FilterExpr::Gt { field, .. }
            | FilterExpr::Ge { field, .. }
            | FilterExpr::In { field, .. }
            | FilterExpr::NotIn { field, .. }
            | FilterExpr::IsNull { field }
            | FilterExpr::IsNotNull { field }
            | FilterExpr::Like { field, .. } => out.push(field),
            FilterExpr::And(exprs) | FilterExpr::Or(exprs) => {
                for expr in exprs {
                    expr.collect_fields(out);
                }
            }
            FilterExpr::Not(inner) => inner.collect_fields(out),
        }
    }

    /// Parse a document-style JSON filter.
    ///
    /// `{"name": "A", "population": {"$gte": 10}, "country._id": "<hex>"}`.
    /// Top-level keys are AND-ed; `$and`, `$or` and `$not` nest. Operators:
    /// `$eq $ne $lt $lte $gt $gte $in $nin $exists $like`.
    pub fn from_json(json: &serde_json::Value) -> Result<Self, Error> {
        let object = json
            .as_object()
            .ok_or_else(|| Error::InvalidFilter("filter must be an object".into()))?;

        let mut clauses = Vec::new();
        for (key, value) in object {
            match key.as_str() {
                "$and" | "$or" => {
                    let items = value.as_array().ok_or_else(|| {
                        Error::InvalidFilter(format!("{key} expects an array"))
                    })?;
                    let exprs = items
                        .iter()
                        .map(FilterExpr::from_json)
                        .collect::<Result<Vec<_>, _>>()?;
                    clauses.push(if key == "$and" {
                        FilterExpr::And(exprs)
                    } else {
                        FilterExpr::Or(exprs)
                    });
                }
                "$not" => clauses.push(FilterExpr::not(FilterExpr::from_json(value)?)),
                field => clauses.extend(Self::field_clauses(field, value)?),
            }
        }

        Ok(match clauses.len() {
            1 => clauses.remove(0),
            _ => FilterExpr::And(clauses),
        })
    }

    fn field_clauses(field: &str, value: &serde_json::Value) -> Result<Vec<Self>, Error> {
        let Some(ops) = value.as_object() else {
            return Ok(vec![FilterExpr::eq(field, Value::from_json(value)?)]);
        };

        let mut clauses = Vec::with_capacity(ops.len());
        for (op, operand) in ops {
            let clause = match op.as_str() {
                "$eq" => FilterExpr::eq(field, Value::from_json(operand)?),
                "$ne" => FilterExpr::ne(field, Value::from_json(operand)?),
                "$lt" => FilterExpr::lt(field, Value::from_json(operand)?),
                "$lte" => FilterExpr::le(field, Value::from_json(operand)?),
                "$gt" => FilterExpr::gt(field, Value::from_json(operand)?),
                "$gte" => FilterExpr::ge(field, Value::from_json(operand)?),
                "$in" | "$nin" => {
                    let values = operand
                        .as_array()
                        .ok_or_else(|| Error::InvalidFilter(format!("{op} expects an array")))?
                        .iter()
                        .map(Value::from_json)
                        .collect::<Result<Vec<_>, _>>()?;
                    if op == "$in" {
                        FilterExpr::in_values(field, values)
                    } else {
                        FilterExpr::not_in_values(field, values)
                    }
                }
                "$exists" => match operand.as_bool() {
                    Some(true) => FilterExpr::is_not_null(field),
                    Some(false) => FilterExpr::is_null(field),
                    None => {
                        return Err(Error::InvalidFilter("$exists expects a boolean".into()))
                    }
                },
                "$like" => {
                    let pattern = operand
                        .as_str()
                        .ok_or_else(|| Error::InvalidFilter("$like expects a string".into()))?;
                    FilterExpr::like(field, pattern)
                }
                other => return Err(Error::InvalidFilter(format!("unknown operator {other}"))),
            };
            clauses.push(clause);
        }
        Ok(clauses)
    }
}

/// Order specification for sorting results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSpec {
    /// Field to order by (may be a dotted path).
    pub field: String,
    /// Sort direction.
    pub direction: OrderDirection,
}

impl OrderSpec {
    /// Create an ascending order spec.
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: OrderDirection::Asc,
        }
    }

    /// Create a descending order spec.
    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: OrderDirection::Desc,
        }
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderDirection {
    /// Ascending order.
    Asc,
    /// Descending order.
    Desc,
}

/// Skip/limit pagination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Pagination {
    /// Number of results to skip.
    pub skip: usize,
    /// Maximum number of results to return; `None` means unbounded.
    pub limit: Option<usize>,
}

impl Pagination {
    /// Create pagination with skip and limit.
    pub fn new(skip: usize, limit: usize) -> Self {
        Self {
            skip,
            limit: Some(limit),
        }
    }

    /// Create pagination with just a limit.
    pub fn limit(limit: usize) -> Self {
        Self {
            skip: 0,
            limit: Some(limit),
        }
    }

    /// Apply to an already ordered list.
    pub fn apply<T>(&self, items: Vec<T>) -> Vec<T> {
        let iter = items.into_iter().skip(self.skip);
        match self.limit {
            Some(limit) => iter.take(limit).collect(),
            None => iter.collect(),
        }
    }
}
