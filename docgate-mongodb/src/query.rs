//! Query translation from the docgate AST to MongoDB query syntax.
//!
//! Filters, sorts and projections are already allow-listed by the gateway's query
//! translator, so every field name that reaches this module is a plain top-level key.

use bson::{Document, Bson, doc};

use docgate_core::{
    query::{QueryVisitor, Expr, FieldOp, Sort, SortDirection},
    error::{DocumentStoreError, DocumentStoreResult},
};


/// Translates docgate query expressions into MongoDB query documents.
///
/// This struct implements the [`QueryVisitor`] trait to convert abstract
/// query expressions into MongoDB's native BSON query syntax.
pub(crate) struct MongoQueryTranslator;

impl MongoQueryTranslator {
    /// Builds the filter document for an optional expression; `None` matches everything.
    pub(crate) fn filter_document(filter: Option<&Expr>) -> DocumentStoreResult<Document> {
        match filter {
            Some(expr) => MongoQueryTranslator.visit_expr(expr),
            None => Ok(doc! {}),
        }
    }

    /// Builds a compound sort document, keeping key order.
    pub(crate) fn sort_document(sort: &[Sort]) -> Document {
        sort
            .iter()
            .map(|key| {
                let direction = match key.direction {
                    SortDirection::Asc => 1,
                    SortDirection::Desc => -1,
                };
                (key.field.clone(), Bson::Int32(direction))
            })
            .collect()
    }

    /// Builds an inclusion projection. `_id` is included by MongoDB unless excluded.
    pub(crate) fn projection_document(fields: &[String]) -> Document {
        fields
            .iter()
            .map(|field| (field.clone(), Bson::Int32(1)))
            .collect()
    }
}

impl QueryVisitor for MongoQueryTranslator {
    type Output = Document;
    type Error = DocumentStoreError;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        // MongoDB rejects an empty $and
        if exprs.is_empty() {
            return Ok(doc! {});
        }

        Ok(doc! {
            "$and": exprs
                .iter()
                .map(|expr| self.visit_expr(expr))
                .collect::<Result<Vec<_>, _>>()?,
        })
    }

    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        if exprs.is_empty() {
            return Ok(doc! { "$nor": [{}] });
        }

        Ok(doc! {
            "$or": exprs
                .iter()
                .map(|expr| self.visit_expr(expr))
                .collect::<Result<Vec<_>, _>>()?,
        })
    }

    fn visit_not(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error> {
        // $not is only valid on a field; $nor negates any expression
        Ok(doc! {
            "$nor": [self.visit_expr(expr)?],
        })
    }

    fn visit_exists(&mut self, field: &str, should_exist: bool) -> Result<Self::Output, Self::Error> {
        Ok(doc! {
            field: { "$exists": should_exist },
        })
    }

    fn visit_field(&mut self, field: &str, op: &FieldOp, value: &Bson) -> Result<Self::Output, Self::Error> {
        Ok(doc! {
            field: match op {
                FieldOp::Eq => doc! { "$eq": value },
                FieldOp::Ne => doc! { "$ne": value },
                FieldOp::Gt => doc! { "$gt": value },
                FieldOp::Gte => doc! { "$gte": value },
                FieldOp::Lt => doc! { "$lt": value },
                FieldOp::Lte => doc! { "$lte": value },
                FieldOp::AnyOf | FieldOp::NoneOf => {
                    if !matches!(value, Bson::Array(_)) {
                        return Err(DocumentStoreError::InvalidQuery(
                            "set membership expects an array of values".to_string(),
                        ));
                    }
                    match op {
                        FieldOp::AnyOf => doc! { "$in": value },
                        _ => doc! { "$nin": value },
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docgate_core::query::Filter;

    fn translate(expr: Expr) -> Document {
        MongoQueryTranslator::filter_document(Some(&expr)).unwrap()
    }

    #[test]
    fn comparisons_use_explicit_operators() {
        assert_eq!(translate(Filter::eq("name", "Alice")), doc! { "name": { "$eq": "Alice" } });
        assert_eq!(translate(Filter::gte("score", 10)), doc! { "score": { "$gte": 10 } });
        assert_eq!(
            translate(Filter::any_of("tags", vec!["pro", "eu"])),
            doc! { "tags": { "$in": ["pro", "eu"] } }
        );
    }

    #[test]
    fn negation_becomes_nor() {
        assert_eq!(
            translate(Filter::gt("score", 5).not()),
            doc! { "$nor": [{ "score": { "$gt": 5 } }] }
        );
        assert_eq!(
            translate(Filter::nor([Filter::eq("name", "Bob")])),
            doc! { "$nor": [{ "$or": [{ "name": { "$eq": "Bob" } }] }] }
        );
    }

    #[test]
    fn empty_conjunction_matches_everything() {
        assert_eq!(translate(Expr::And(vec![])), doc! {});
        assert_eq!(MongoQueryTranslator::filter_document(None).unwrap(), doc! {});
    }

    #[test]
    fn membership_requires_an_array() {
        let result = MongoQueryTranslator::filter_document(Some(&Filter::any_of("tags", "pro")));

        assert!(matches!(result, Err(DocumentStoreError::InvalidQuery(_))));
    }

    #[test]
    fn sort_and_projection_keep_order() {
        let sort = [Sort::new("level", SortDirection::Desc), Sort::new("name", SortDirection::Asc)];

        assert_eq!(MongoQueryTranslator::sort_document(&sort), doc! { "level": -1, "name": 1 });
        assert_eq!(
            MongoQueryTranslator::projection_document(&["name".to_string(), "score".to_string()]),
            doc! { "name": 1, "score": 1 }
        );
    }
}
