//! Query expression evaluation for in-memory document filtering and sorting.
//!
//! Matching follows MongoDB conventions where they matter to callers: a missing field
//! compares equal to `null`, equality against an array field matches any element,
//! and sorting orders values of different types by a fixed type rank.

use std::{cmp::Ordering, collections::HashMap};
use bson::{Bson, Document, datetime::DateTime, spec::BinarySubtype};

use docgate_core::{
    query::{QueryVisitor, Expr, FieldOp, Sort, SortDirection},
    error::{DocumentStoreError, DocumentStoreResult},
};


/// Type-erased, comparable representation of BSON values.
///
/// Numeric types are normalized to f64 so `Int32(1)`, `Int64(1)` and `Double(1.0)`
/// compare equal.
#[derive(Debug)]
pub(crate) enum Comparable<'a> {
    Null,
    Number(f64),
    String(&'a str),
    Map(HashMap<&'a str, Comparable<'a>>),
    Array(Vec<Comparable<'a>>),
    Bytes(&'a [u8]),
    Bool(bool),
    DateTime(DateTime),
    /// Types the gateway never produces; they only equal themselves by rank.
    Other,
}

impl<'a> From<&'a Bson> for Comparable<'a> {
    fn from(bson: &'a Bson) -> Self {
        match bson {
            Bson::Null | Bson::Undefined => Comparable::Null,
            Bson::Boolean(value) => Comparable::Bool(*value),
            Bson::Int32(value) => Comparable::Number(*value as f64),
            Bson::Int64(value) => Comparable::Number(*value as f64),
            Bson::Double(value) => Comparable::Number(*value),
            Bson::DateTime(value) => Comparable::DateTime(*value),
            Bson::String(value) => Comparable::String(value),
            Bson::Binary(binary) if binary.subtype == BinarySubtype::Uuid => {
                Comparable::Bytes(&binary.bytes)
            }
            Bson::Array(arr) => Comparable::Array(
                arr
                    .iter()
                    .map(Comparable::from)
                    .collect::<Vec<_>>()
            ),
            Bson::Document(doc) => Comparable::Map(
                doc
                    .iter()
                    .map(|(k, v)| (k.as_str(), Comparable::from(v)))
                    .collect::<HashMap<_, _>>()
            ),
            _ => Comparable::Other,
        }
    }
}

impl<'a> Comparable<'a> {
    /// Position of the value's type in the cross-type sort order.
    fn rank(&self) -> u8 {
        match self {
            Comparable::Null => 0,
            Comparable::Number(_) => 1,
            Comparable::String(_) => 2,
            Comparable::Map(_) => 3,
            Comparable::Array(_) => 4,
            Comparable::Bytes(_) => 5,
            Comparable::Bool(_) => 6,
            Comparable::DateTime(_) => 7,
            Comparable::Other => 8,
        }
    }

    /// Total order used for sorting: by type rank first, then by value.
    pub(crate) fn sort_cmp(&self, other: &Self) -> Ordering {
        self.partial_cmp(other)
            .unwrap_or_else(|| self.rank().cmp(&other.rank()))
    }
}

impl<'a> PartialEq for Comparable<'a> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => true,
            (Comparable::Bool(a), Comparable::Bool(b)) => a == b,
            (Comparable::Number(a), Comparable::Number(b)) => a == b,
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a == b,
            (Comparable::String(a), Comparable::String(b)) => a == b,
            (Comparable::Bytes(a), Comparable::Bytes(b)) => a == b,
            (Comparable::Array(a), Comparable::Array(b)) => a == b,
            (Comparable::Map(a), Comparable::Map(b)) => a == b,
            _ => false,
        }
    }
}

impl<'a> PartialOrd for Comparable<'a> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => Some(Ordering::Equal),
            (Comparable::Bool(a), Comparable::Bool(b)) => a.partial_cmp(b),
            (Comparable::Number(a), Comparable::Number(b)) => a.partial_cmp(b),
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a.partial_cmp(b),
            (Comparable::String(a), Comparable::String(b)) => a.partial_cmp(b),
            (Comparable::Bytes(a), Comparable::Bytes(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

/// Compares two documents on a compound sort key.
///
/// Missing fields sort as `null`. Documents equal on every key compare `Equal`, so a
/// stable sort keeps their insertion order.
pub(crate) fn compare_documents(a: &Document, b: &Document, sort: &[Sort]) -> Ordering {
    for key in sort {
        let left = a.get(&key.field).map(Comparable::from).unwrap_or(Comparable::Null);
        let right = b.get(&key.field).map(Comparable::from).unwrap_or(Comparable::Null);

        let ordering = match key.direction {
            SortDirection::Asc => left.sort_cmp(&right),
            SortDirection::Desc => right.sort_cmp(&left),
        };

        if ordering != Ordering::Equal {
            return ordering;
        }
    }

    Ordering::Equal
}


pub(crate) struct DocumentEvaluator<'a> {
    document: &'a Document,
}

impl<'a> DocumentEvaluator<'a> {
    pub fn new(document: &'a Document) -> Self {
        Self { document }
    }

    pub fn evaluate(&mut self, expr: &Expr) -> DocumentStoreResult<bool> {
        self.visit_expr(expr)
    }

    /// Evaluates an optional filter; `None` matches every document.
    pub fn matches(document: &Document, filter: Option<&Expr>) -> bool {
        match filter {
            Some(expr) => DocumentEvaluator::new(document)
                .evaluate(expr)
                .unwrap_or(false),
            None => true,
        }
    }

    fn equals(field_value: &Comparable<'_>, value: &Comparable<'_>) -> bool {
        if field_value == value {
            return true;
        }

        match (field_value, value) {
            (Comparable::Array(items), single) if !matches!(single, Comparable::Array(_)) => {
                items.iter().any(|item| item == single)
            }
            _ => false,
        }
    }

    /// Range comparison. An array field matches when any element satisfies it,
    /// unless the operand is itself an array.
    fn compares(field_value: &Comparable<'_>, value: &Comparable<'_>, accept: fn(Ordering) -> bool) -> bool {
        if field_value.partial_cmp(value).is_some_and(accept) {
            return true;
        }

        match (field_value, value) {
            (Comparable::Array(items), single) if !matches!(single, Comparable::Array(_)) => items
                .iter()
                .any(|item| item.partial_cmp(single).is_some_and(accept)),
            _ => false,
        }
    }

    fn any_of(field_value: &Comparable<'_>, values: &Bson) -> DocumentStoreResult<bool> {
        match values {
            Bson::Array(values) => Ok(
                values
                    .iter()
                    .any(|value| Self::equals(field_value, &Comparable::from(value)))
            ),
            _ => Err(DocumentStoreError::InvalidQuery(
                "set membership expects an array of values".to_string(),
            )),
        }
    }
}

impl<'a> QueryVisitor for DocumentEvaluator<'a> {
    type Output = bool;
    type Error = DocumentStoreError;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        for expr in exprs {
            if !self.visit_expr(expr)? {
                return Ok(false);
            }
        }

        Ok(true)
    }

    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        for expr in exprs {
            if self.visit_expr(expr)? {
                return Ok(true);
            }
        }

        Ok(false)
    }

    fn visit_not(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error> {
        Ok(!self.visit_expr(expr)?)
    }

    fn visit_exists(&mut self, field: &str, should_exist: bool) -> Result<Self::Output, Self::Error> {
        Ok(self.document.contains_key(field) == should_exist)
    }

    fn visit_field(&mut self, field: &str, op: &FieldOp, value: &Bson) -> Result<Self::Output, Self::Error> {
        let field_value = self.document
            .get(field)
            .map(Comparable::from)
            .unwrap_or(Comparable::Null);

        match op {
            FieldOp::Eq => Ok(Self::equals(&field_value, &Comparable::from(value))),
            FieldOp::Ne => Ok(!Self::equals(&field_value, &Comparable::from(value))),
            FieldOp::Gt | FieldOp::Gte | FieldOp::Lt | FieldOp::Lte => {
                if self.document.get(field).is_none() {
                    return Ok(false);
                }

                let accept: fn(Ordering) -> bool = match op {
                    FieldOp::Gt => Ordering::is_gt,
                    FieldOp::Gte => Ordering::is_ge,
                    FieldOp::Lt => Ordering::is_lt,
                    _ => Ordering::is_le,
                };
                Ok(Self::compares(&field_value, &Comparable::from(value), accept))
            },
            FieldOp::AnyOf => Self::any_of(&field_value, value),
            FieldOp::NoneOf => Ok(!Self::any_of(&field_value, value)?),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use docgate_core::query::Filter;

    fn matches(document: &Document, expr: Expr) -> bool {
        DocumentEvaluator::matches(document, Some(&expr))
    }

    #[test]
    fn numbers_compare_across_widths() {
        let document = doc! { "score": 10_i64 };

        assert!(matches(&document, Filter::eq("score", 10)));
        assert!(matches(&document, Filter::gte("score", 9.5)));
        assert!(!matches(&document, Filter::lt("score", 10)));
    }

    #[test]
    fn missing_fields_behave_like_null() {
        let document = doc! { "name": "Alice" };

        assert!(matches(&document, Filter::eq("score", Bson::Null)));
        assert!(matches(&document, Filter::ne("score", 3)));
        assert!(!matches(&document, Filter::gt("score", 3)));
        assert!(matches(&document, Filter::not_exists("score")));
    }

    #[test]
    fn equality_reaches_into_arrays() {
        let document = doc! { "tags": ["pro", "eu"] };

        assert!(matches(&document, Filter::eq("tags", "eu")));
        assert!(matches(&document, Filter::any_of("tags", vec!["na", "pro"])));
        assert!(matches(&document, Filter::none_of("tags", vec!["na"])));
        assert!(!matches(&document, Filter::none_of("tags", vec!["eu"])));
    }

    #[test]
    fn ranges_match_any_array_element() {
        let document = doc! { "scores": [3, 12, 7] };

        assert!(matches(&document, Filter::gt("scores", 10)));
        assert!(matches(&document, Filter::lte("scores", 3)));
        assert!(!matches(&document, Filter::gt("scores", 12)));
        assert!(!matches(&document, Filter::lt("scores", 3)));
        assert!(matches(&document, Filter::and([Filter::gt("scores", 5), Filter::lt("scores", 4)])));
    }

    #[test]
    fn logical_operators_combine() {
        let document = doc! { "name": "Bob", "score": 20 };

        assert!(matches(&document, Filter::or([Filter::eq("name", "Alice"), Filter::gt("score", 15)])));
        assert!(!matches(&document, Filter::and([Filter::eq("name", "Bob"), Filter::lt("score", 15)])));
        assert!(!matches(&document, Filter::nor([Filter::eq("name", "Bob")])));
    }

    #[test]
    fn mixed_types_sort_by_rank() {
        let docs = [doc! { "v": "text" }, doc! { "v": 3 }, doc! {}, doc! { "v": true }];
        let sort = [Sort::new("v", SortDirection::Asc)];

        let mut sorted = docs.to_vec();
        sorted.sort_by(|a, b| compare_documents(a, b, &sort));

        assert_eq!(sorted, vec![doc! {}, doc! { "v": 3 }, doc! { "v": "text" }, doc! { "v": true }]);
    }

    #[test]
    fn compound_sort_breaks_ties_with_later_keys() {
        let docs = [
            doc! { "level": 1, "name": "b" },
            doc! { "level": 2, "name": "a" },
            doc! { "level": 1, "name": "a" },
        ];
        let sort = [Sort::new("level", SortDirection::Desc), Sort::new("name", SortDirection::Asc)];

        let mut sorted = docs.to_vec();
        sorted.sort_by(|a, b| compare_documents(a, b, &sort));

        assert_eq!(
            sorted,
            vec![
                doc! { "level": 2, "name": "a" },
                doc! { "level": 1, "name": "a" },
                doc! { "level": 1, "name": "b" },
            ]
        );
    }
}
