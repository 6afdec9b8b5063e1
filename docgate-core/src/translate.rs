//! Translation of request parameters and bodies into store queries.
//!
//! Caller filters use a MongoDB-like JSON syntax, but nothing is forwarded verbatim:
//! every filter is parsed against an allow-list of operators into an [`Expr`], which
//! each backend then evaluates or translates on its own terms.
//!
//! | Syntax | Meaning |
//! |---|---|
//! | `{"f": v}` | equality |
//! | `{"f": {"$eq"/"$ne"/"$gt"/"$gte"/"$lt"/"$lte": v}}` | comparison |
//! | `{"f": {"$in"/"$nin": [..]}}` | set membership |
//! | `{"f": {"$exists": bool}}` | existence |
//! | `{"f": {"$not": {..}}}` | negated operator object |
//! | `{"$and"/"$or"/"$nor": [{..}, ..]}` | logical combination |

use bson::{Bson, Document};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::{
    document::{ID_FIELD, json_kind, json_to_bson, json_to_document, parse_id, validate_field_name},
    error::{DocumentStoreError, DocumentStoreResult},
    query::{Expr, FieldOp, Filter, Query, Sort, SortDirection},
};

/// Raw list parameters as they appear in the query string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ListParams {
    pub filter: Option<String>,
    pub sort: Option<String>,
    pub select: Option<String>,
    pub limit: Option<String>,
    pub skip: Option<String>,
}

/// A parsed bulk update request.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkUpdate {
    /// `None` when the caller sent an empty filter (`{}`), which matches everything.
    pub filter: Option<Expr>,
    pub fields: Document,
}

/// Turns request input into backend-neutral queries.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryTranslator {
    filter_required: bool,
}

impl QueryTranslator {
    /// `filter_required` decides whether listing without a filter is rejected
    /// (`true`) or matches every document (`false`).
    pub fn new(filter_required: bool) -> Self {
        Self { filter_required }
    }

    pub fn filter_required(&self) -> bool {
        self.filter_required
    }

    /// Builds the query for a read-all request.
    pub fn list_query(&self, params: &ListParams) -> DocumentStoreResult<Query> {
        let filter = match params.filter.as_deref() {
            Some(raw) => parse_filter_str(raw)?,
            None if self.filter_required => {
                return Err(DocumentStoreError::invalid_query("filter is required"));
            }
            None => None,
        };

        let mut query = Query {
            filter,
            ..Query::default()
        };

        if let Some(raw) = params.sort.as_deref() {
            query.sort = parse_sort(raw)?;
        }
        if let Some(raw) = params.select.as_deref() {
            let fields = parse_projection(raw)?;
            if !fields.is_empty() {
                query.projection = Some(fields);
            }
        }
        query.limit = parse_window(params.limit.as_deref(), "limit")?;
        query.offset = parse_window(params.skip.as_deref(), "skip")?;

        Ok(query)
    }

    /// Parses a bulk update body of the form `{"filter": {..}, "update": {..}}`.
    pub fn bulk_update(&self, body: &Value) -> DocumentStoreResult<BulkUpdate> {
        let body = expect_object(body, "request body")?;
        let filter = required_filter(body)?;

        let update = body
            .get("update")
            .ok_or_else(|| DocumentStoreError::invalid_query("update is required"))?;

        Ok(BulkUpdate {
            filter,
            fields: parse_update_fields(update)?,
        })
    }

    /// Parses a bulk delete body of the form `{"filter": {..}}`.
    pub fn bulk_delete(&self, body: &Value) -> DocumentStoreResult<Option<Expr>> {
        required_filter(expect_object(body, "request body")?)
    }
}

fn required_filter(body: &Map<String, Value>) -> DocumentStoreResult<Option<Expr>> {
    match body.get("filter") {
        None | Some(Value::Null) => Err(DocumentStoreError::invalid_query("filter is required")),
        Some(Value::String(raw)) => parse_filter_str(raw),
        Some(value) => parse_filter(value),
    }
}

fn expect_object<'a>(value: &'a Value, what: &str) -> DocumentStoreResult<&'a Map<String, Value>> {
    value.as_object().ok_or_else(|| {
        DocumentStoreError::invalid_query(format!("{what} must be a JSON object, got {}", json_kind(value)))
    })
}

/// Parses a filter given as a JSON string.
pub fn parse_filter_str(raw: &str) -> DocumentStoreResult<Option<Expr>> {
    let value: Value = serde_json::from_str(raw)
        .map_err(|e| DocumentStoreError::invalid_query(format!("filter is not valid JSON: {e}")))?;

    parse_filter(&value)
}

/// Parses a filter object. An empty object yields `None` (match all).
pub fn parse_filter(value: &Value) -> DocumentStoreResult<Option<Expr>> {
    let object = expect_object(value, "filter")?;
    let mut clauses = parse_clauses(object)?;

    Ok(match clauses.len() {
        0 => None,
        1 => clauses.pop(),
        _ => Some(Expr::And(clauses)),
    })
}

fn parse_clauses(object: &Map<String, Value>) -> DocumentStoreResult<Vec<Expr>> {
    let mut clauses = Vec::with_capacity(object.len());

    for (key, value) in object {
        match key.as_str() {
            "$and" => clauses.push(Expr::And(parse_branches(key, value)?)),
            "$or" => clauses.push(Expr::Or(parse_branches(key, value)?)),
            "$nor" => clauses.push(Filter::nor(parse_branches(key, value)?)),
            op if op.starts_with('$') => {
                return Err(DocumentStoreError::invalid_query(format!(
                    "operator {op} is not supported"
                )));
            }
            field => {
                validate_field_name(field)?;
                clauses.extend(parse_condition(field, value)?);
            }
        }
    }

    Ok(clauses)
}

fn parse_branches(op: &str, value: &Value) -> DocumentStoreResult<Vec<Expr>> {
    let branches = match value {
        Value::Array(branches) if !branches.is_empty() => branches,
        _ => {
            return Err(DocumentStoreError::invalid_query(format!(
                "{op} expects a non-empty array of filters"
            )));
        }
    };

    branches
        .iter()
        .map(|branch| {
            let clauses = parse_clauses(expect_object(branch, op)?)?;
            Ok(match clauses.len() {
                1 => clauses.into_iter().next().unwrap_or(Expr::And(vec![])),
                _ => Expr::And(clauses),
            })
        })
        .collect()
}

fn is_operator_object(map: &Map<String, Value>) -> DocumentStoreResult<bool> {
    let operators = map.keys().filter(|key| key.starts_with('$')).count();

    match operators {
        0 => Ok(false),
        n if n == map.len() => Ok(true),
        _ => Err(DocumentStoreError::invalid_query(
            "operator objects cannot mix operators and plain fields",
        )),
    }
}

fn parse_condition(field: &str, value: &Value) -> DocumentStoreResult<Vec<Expr>> {
    match value {
        Value::Object(map) if !map.is_empty() && is_operator_object(map)? => map
            .iter()
            .map(|(op, operand)| parse_operator(field, op, operand))
            .collect(),
        _ => Ok(vec![Expr::field(field.to_string(), FieldOp::Eq, field_value(field, value)?)]),
    }
}

fn parse_operator(field: &str, op: &str, operand: &Value) -> DocumentStoreResult<Expr> {
    let comparison = |op: FieldOp| -> DocumentStoreResult<Expr> {
        Ok(Expr::field(field.to_string(), op, field_value(field, operand)?))
    };

    match op {
        "$eq" => comparison(FieldOp::Eq),
        "$ne" => comparison(FieldOp::Ne),
        "$gt" => comparison(FieldOp::Gt),
        "$gte" => comparison(FieldOp::Gte),
        "$lt" => comparison(FieldOp::Lt),
        "$lte" => comparison(FieldOp::Lte),
        "$in" | "$nin" => {
            if !operand.is_array() {
                return Err(DocumentStoreError::invalid_query(format!("{op} expects an array")));
            }
            let op = if op == "$in" { FieldOp::AnyOf } else { FieldOp::NoneOf };
            comparison(op)
        }
        "$exists" => match operand {
            Value::Bool(should_exist) => Ok(Expr::Exists(field.to_string(), *should_exist)),
            _ => Err(DocumentStoreError::invalid_query("$exists expects a boolean")),
        },
        "$not" => match operand {
            Value::Object(map) if !map.is_empty() && is_operator_object(map)? => {
                let mut inner = map
                    .iter()
                    .map(|(op, operand)| parse_operator(field, op, operand))
                    .collect::<DocumentStoreResult<Vec<_>>>()?;
                let inner = match inner.len() {
                    1 => inner.pop().unwrap_or(Expr::And(vec![])),
                    _ => Expr::And(inner),
                };
                Ok(inner.not())
            }
            _ => Err(DocumentStoreError::invalid_query("$not expects an operator object")),
        },
        other => Err(DocumentStoreError::invalid_query(format!(
            "operator {other} is not supported"
        ))),
    }
}

/// Converts a filter operand, reading strings compared against `_id` as UUIDs.
fn field_value(field: &str, value: &Value) -> DocumentStoreResult<Bson> {
    if field != ID_FIELD {
        return Ok(json_to_bson(value));
    }

    match value {
        Value::String(raw) => parse_id(raw)
            .map(Bson::from)
            .map_err(|e| DocumentStoreError::invalid_query(e.to_string())),
        Value::Array(values) => values
            .iter()
            .map(|value| field_value(field, value))
            .collect::<DocumentStoreResult<Vec<_>>>()
            .map(Bson::Array),
        other => Ok(json_to_bson(other)),
    }
}

/// Parses a comma-separated sort list; `-field` sorts descending.
pub fn parse_sort(raw: &str) -> DocumentStoreResult<Vec<Sort>> {
    raw.split(',')
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .map(|segment| {
            let (field, direction) = match segment.strip_prefix('-') {
                Some(field) => (field, SortDirection::Desc),
                None => (segment.strip_prefix('+').unwrap_or(segment), SortDirection::Asc),
            };
            validate_field_name(field)?;
            Ok(Sort::new(field, direction))
        })
        .collect()
}

/// Parses a comma-separated inclusion projection.
pub fn parse_projection(raw: &str) -> DocumentStoreResult<Vec<String>> {
    raw.split(',')
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .map(|field| {
            if field.starts_with('-') {
                return Err(DocumentStoreError::invalid_query(format!(
                    "select only supports included fields, got {field}"
                )));
            }
            validate_field_name(field)?;
            Ok(field.to_string())
        })
        .collect()
}

/// Parses a `limit`/`skip` value. Anything but a non-negative integer is rejected.
pub fn parse_window(raw: Option<&str>, name: &str) -> DocumentStoreResult<Option<usize>> {
    match raw.map(str::trim) {
        None => Ok(None),
        Some(value) => value.parse::<usize>().map(Some).map_err(|_| {
            DocumentStoreError::invalid_query(format!(
                "{name} must be a non-negative integer, got {value:?}"
            ))
        }),
    }
}

/// Parses the `update` part of a bulk update into `$set` fields.
///
/// A single `{"$set": {..}}` wrapper is unwrapped; any other operator is rejected.
/// `_id` is never updated.
pub fn parse_update_fields(update: &Value) -> DocumentStoreResult<Document> {
    let object = expect_object(update, "update")?;

    let fields = match object.get("$set") {
        Some(inner) if object.len() == 1 => expect_object(inner, "$set")?,
        _ => object,
    };

    if let Some(op) = fields.keys().find(|key| key.starts_with('$')) {
        return Err(DocumentStoreError::invalid_query(format!(
            "update operator {op} is not supported"
        )));
    }

    let mut document = json_to_document(&Value::Object(fields.clone()))?;
    document.remove(ID_FIELD);

    if document.is_empty() {
        return Err(DocumentStoreError::invalid_query("update must set at least one field"));
    }

    Ok(document)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use serde_json::json;

    fn params(pairs: &[(&str, &str)]) -> ListParams {
        let mut params = ListParams::default();
        for (key, value) in pairs {
            let value = Some(value.to_string());
            match *key {
                "filter" => params.filter = value,
                "sort" => params.sort = value,
                "select" => params.select = value,
                "limit" => params.limit = value,
                "skip" => params.skip = value,
                _ => unreachable!(),
            }
        }
        params
    }

    #[test]
    fn plain_fields_become_equality() {
        let expr = parse_filter(&json!({ "name": "Alice" })).unwrap();
        assert_eq!(expr, Some(Filter::eq("name", "Alice")));
    }

    #[test]
    fn several_fields_are_and_ed() {
        let expr = parse_filter(&json!({ "name": "Alice", "score": { "$gte": 10, "$lt": 20 } }))
            .unwrap()
            .unwrap();

        match expr {
            Expr::And(clauses) => {
                assert_eq!(clauses.len(), 3);
                assert!(clauses.contains(&Filter::gte("score", 10)));
                assert!(clauses.contains(&Filter::lt("score", 20)));
            }
            other => panic!("expected AND, got {other:?}"),
        }
    }

    #[test]
    fn logical_operators_nest() {
        let expr = parse_filter(&json!({
            "$or": [{ "name": "Alice" }, { "tags": { "$in": ["pro"] } }]
        }))
        .unwrap();

        assert_eq!(
            expr,
            Some(Filter::or([
                Filter::eq("name", "Alice"),
                Filter::any_of("tags", vec![Bson::String("pro".into())]),
            ]))
        );
    }

    #[test]
    fn not_wraps_operator_object() {
        let expr = parse_filter(&json!({ "score": { "$not": { "$gt": 5 } } })).unwrap();
        assert_eq!(expr, Some(Filter::gt("score", 5).not()));
    }

    #[test]
    fn empty_filter_matches_all() {
        assert_eq!(parse_filter(&json!({})).unwrap(), None);
    }

    #[test]
    fn rejects_operators_outside_the_allow_list() {
        for filter in [
            json!({ "$where": "this.a == 1" }),
            json!({ "name": { "$regex": ".*" } }),
            json!({ "name": { "$eq": 1, "plain": 2 } }),
            json!({ "$or": [] }),
            json!({ "score": { "$in": 5 } }),
            json!({ "a.b": 1 }),
            json!([1, 2]),
        ] {
            assert!(
                matches!(parse_filter(&filter), Err(DocumentStoreError::InvalidQuery(_))),
                "{filter}"
            );
        }
    }

    #[test]
    fn id_strings_become_uuids() {
        let id = crate::document::new_id();
        let expr = parse_filter(&json!({ "_id": id.to_string() })).unwrap();
        assert_eq!(expr, Some(Filter::eq("_id", id)));

        assert!(matches!(
            parse_filter(&json!({ "_id": "nope" })),
            Err(DocumentStoreError::InvalidQuery(_))
        ));
    }

    #[test]
    fn malformed_filter_json_is_a_query_error() {
        let err = QueryTranslator::default()
            .list_query(&params(&[("filter", "not-json")]))
            .unwrap_err();
        assert!(matches!(err, DocumentStoreError::InvalidQuery(_)));
    }

    #[test]
    fn absent_filter_follows_policy() {
        assert_eq!(QueryTranslator::new(false).list_query(&params(&[])).unwrap(), Query::new());
        assert!(QueryTranslator::new(true).list_query(&params(&[])).is_err());
    }

    #[test]
    fn list_query_reads_every_parameter() {
        let query = QueryTranslator::default()
            .list_query(&params(&[
                ("filter", r#"{"level":{"$gt":1}}"#),
                ("sort", "-score, name,+age,"),
                ("select", "name,score"),
                ("limit", "5"),
                ("skip", "10"),
            ]))
            .unwrap();

        assert_eq!(query.filter, Some(Filter::gt("level", 1)));
        assert_eq!(
            query.sort,
            vec![
                Sort::new("score", SortDirection::Desc),
                Sort::new("name", SortDirection::Asc),
                Sort::new("age", SortDirection::Asc),
            ]
        );
        assert_eq!(query.projection, Some(vec!["name".to_string(), "score".to_string()]));
        assert_eq!(query.limit, Some(5));
        assert_eq!(query.offset, Some(10));
    }

    #[test]
    fn non_numeric_windows_are_rejected() {
        for (key, value) in [("limit", "ten"), ("skip", "-1"), ("limit", "1.5")] {
            let err = QueryTranslator::default().list_query(&params(&[(key, value)])).unwrap_err();
            assert!(matches!(err, DocumentStoreError::InvalidQuery(_)), "{key}={value}");
        }
    }

    #[test]
    fn exclusion_projection_is_rejected() {
        assert!(parse_projection("-secret").is_err());
    }

    #[test]
    fn bulk_update_requires_both_parts() {
        let translator = QueryTranslator::default();

        assert!(translator.bulk_update(&json!({ "update": { "a": 1 } })).is_err());
        assert!(translator.bulk_update(&json!({ "filter": { "a": 1 } })).is_err());
        assert!(translator.bulk_update(&json!({ "filter": "{oops", "update": { "a": 1 } })).is_err());

        let parsed = translator
            .bulk_update(&json!({ "filter": "{\"level\":1}", "update": { "$set": { "level": 2 } } }))
            .unwrap();
        assert_eq!(parsed.filter, Some(Filter::eq("level", 1)));
        assert_eq!(parsed.fields, doc! { "level": 2 });
    }

    #[test]
    fn update_operators_other_than_set_are_rejected() {
        assert!(parse_update_fields(&json!({ "$inc": { "score": 1 } })).is_err());
        assert!(parse_update_fields(&json!({ "_id": "x" })).is_err());
    }

    #[test]
    fn bulk_delete_requires_filter() {
        let translator = QueryTranslator::default();
        assert!(translator.bulk_delete(&json!({})).is_err());
        assert_eq!(translator.bulk_delete(&json!({ "filter": {} })).unwrap(), None);
    }
}
