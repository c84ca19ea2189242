//! Firestore queries
//!
//! A [`Query`] targets one collection with AND-ed field filters, ordering and
//! a limit. The same description is sent to the REST `:runQuery` endpoint and
//! evaluated in-process by the memory store.

use super::{Document, Fields};
use serde_json::Value;
use std::cmp::Ordering;

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Smallest first
    Ascending,
    /// Largest first
    Descending,
}

impl Direction {
    pub(crate) fn as_rest(&self) -> &'static str {
        match self {
            Self::Ascending => "ASCENDING",
            Self::Descending => "DESCENDING",
        }
    }
}

/// Filter operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    /// `==`
    Equal,
    /// `!=`
    NotEqual,
    /// `<`
    LessThan,
    /// `<=`
    LessThanOrEqual,
    /// `>`
    GreaterThan,
    /// `>=`
    GreaterThanOrEqual,
    /// `array-contains`
    ArrayContains,
}

impl FilterOp {
    pub(crate) fn as_rest(&self) -> &'static str {
        match self {
            Self::Equal => "EQUAL",
            Self::NotEqual => "NOT_EQUAL",
            Self::LessThan => "LESS_THAN",
            Self::LessThanOrEqual => "LESS_THAN_OR_EQUAL",
            Self::GreaterThan => "GREATER_THAN",
            Self::GreaterThanOrEqual => "GREATER_THAN_OR_EQUAL",
            Self::ArrayContains => "ARRAY_CONTAINS",
        }
    }
}

/// One field condition
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    /// Field path, dot-separated for nested maps
    pub field: String,
    /// Operator
    pub op: FilterOp,
    /// Operand
    pub value: Value,
}

impl Filter {
    /// Evaluate against document fields
    ///
    /// A missing field never matches, including for `!=`.
    pub fn matches(&self, data: &Fields) -> bool {
        let Some(actual) = field_value(data, &self.field) else {
            return false;
        };
        match self.op {
            FilterOp::Equal => compare(actual, &self.value) == Some(Ordering::Equal),
            FilterOp::NotEqual => {
                !actual.is_null() && compare(actual, &self.value) != Some(Ordering::Equal)
            }
            FilterOp::LessThan => compare(actual, &self.value) == Some(Ordering::Less),
            FilterOp::LessThanOrEqual => matches!(
                compare(actual, &self.value),
                Some(Ordering::Less | Ordering::Equal)
            ),
            FilterOp::GreaterThan => compare(actual, &self.value) == Some(Ordering::Greater),
            FilterOp::GreaterThanOrEqual => matches!(
                compare(actual, &self.value),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            FilterOp::ArrayContains => match actual {
                Value::Array(items) => items
                    .iter()
                    .any(|item| compare(item, &self.value) == Some(Ordering::Equal)),
                _ => false,
            },
        }
    }
}

/// Query over one collection
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    /// Collection ID
    pub collection: String,
    /// AND-ed filters
    pub filters: Vec<Filter>,
    /// Sort keys, applied in order
    pub order_by: Vec<(String, Direction)>,
    /// Maximum number of results
    pub limit: Option<usize>,
}

impl Query {
    /// Query every document of `collection`
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            filters: Vec::new(),
            order_by: Vec::new(),
            limit: None,
        }
    }

    /// Add a filter
    pub fn filter(mut self, field: impl Into<String>, op: FilterOp, value: impl Into<Value>) -> Self {
        self.filters.push(Filter {
            field: field.into(),
            op,
            value: value.into(),
        });
        self
    }

    /// Add an equality filter
    pub fn where_eq(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(field, FilterOp::Equal, value)
    }

    /// Add a sort key
    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order_by.push((field.into(), direction));
        self
    }

    /// Cap the number of results
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// True if the document passes every filter and has every sort field
    pub fn matches(&self, data: &Fields) -> bool {
        self.filters.iter().all(|f| f.matches(data))
            && self
                .order_by
                .iter()
                .all(|(field, _)| field_value(data, field).is_some())
    }

    /// Filter, sort and limit documents in-process
    pub fn apply(&self, documents: impl IntoIterator<Item = Document>) -> Vec<Document> {
        let mut matched: Vec<Document> = documents
            .into_iter()
            .filter(|doc| self.matches(&doc.data))
            .collect();

        matched.sort_by(|a, b| {
            for (field, direction) in &self.order_by {
                let ordering = total_order(field_value(&a.data, field), field_value(&b.data, field));
                let ordering = match direction {
                    Direction::Ascending => ordering,
                    Direction::Descending => ordering.reverse(),
                };
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            a.id.cmp(&b.id)
        });

        if let Some(limit) = self.limit {
            matched.truncate(limit);
        }
        matched
    }
}

/// Look up a dot-separated field path
pub(crate) fn field_value<'a>(data: &'a Fields, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = data.get(segments.next()?)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Compare two values of the same kind; `None` across kinds
fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Array(x), Value::Array(y)) => {
            for (l, r) in x.iter().zip(y.iter()) {
                match compare(l, r)? {
                    Ordering::Equal => continue,
                    other => return Some(other),
                }
            }
            Some(x.len().cmp(&y.len()))
        }
        (Value::Object(x), Value::Object(y)) => (x == y).then_some(Ordering::Equal),
        _ => None,
    }
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

fn total_order(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(x), Some(y)) => compare(x, y).unwrap_or_else(|| type_rank(x).cmp(&type_rank(y))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(id: &str, value: Value) -> Document {
        match value {
            Value::Object(map) => Document::new(id, map),
            _ => unreachable!(),
        }
    }

    fn listings() -> Vec<Document> {
        vec![
            doc("a", json!({"price": 120000, "propertyType": "apartment", "features": ["balcony"]})),
            doc("b", json!({"price": 350000, "propertyType": "house", "features": ["garden", "garage"]})),
            doc("c", json!({"price": 89000.5, "propertyType": "apartment"})),
            doc("d", json!({"propertyType": "land", "location": {"city": "Nitra"}})),
        ]
    }

    #[test]
    fn test_equality_and_range() {
        let query = Query::new("properties")
            .where_eq("propertyType", "apartment")
            .filter("price", FilterOp::LessThan, 100000);
        let ids: Vec<_> = query.apply(listings()).into_iter().map(|d| d.id).collect();
        assert_eq!(ids, vec!["c"]);
    }

    #[test]
    fn test_order_excludes_missing_fields_and_limits() {
        let query = Query::new("properties")
            .order_by("price", Direction::Descending)
            .limit(2);
        let ids: Vec<_> = query.apply(listings()).into_iter().map(|d| d.id).collect();
        assert_eq!(ids, vec!["b", "a"]);
    }

    #[test]
    fn test_array_contains_and_nested_path() {
        let garden = Query::new("properties").filter("features", FilterOp::ArrayContains, "garden");
        assert_eq!(garden.apply(listings())[0].id, "b");

        let nitra = Query::new("properties").where_eq("location.city", "Nitra");
        assert_eq!(nitra.apply(listings())[0].id, "d");
    }

    #[test]
    fn test_not_equal_skips_missing_field() {
        let query = Query::new("properties").filter("price", FilterOp::NotEqual, 120000);
        let ids: Vec<_> = query.apply(listings()).into_iter().map(|d| d.id).collect();
        assert_eq!(ids, vec!["b", "c"]);
    }
}
