//! Query translation from docvault filter expressions to MongoDB query documents.
//!
//! String operators become anchored regular expressions over the escaped input, so a
//! caller's `.` or `*` is matched literally.

use bson::{Bson, Document, doc};

use docvault_core::{
    error::DocumentStoreError,
    query::{Expr, FieldOp, QueryVisitor},
};

/// Translates filter expressions into MongoDB query documents.
pub(crate) struct MongoQueryTranslator;

impl MongoQueryTranslator {
    /// Translates `filter`; `None` matches every document.
    pub fn translate(filter: Option<&Expr>) -> Result<Document, DocumentStoreError> {
        match filter {
            Some(expr) => MongoQueryTranslator.visit_expr(expr),
            None => Ok(doc! {}),
        }
    }

    fn translate_all(&mut self, exprs: &[Expr]) -> Result<Vec<Document>, DocumentStoreError> {
        exprs.iter().map(|expr| self.visit_expr(expr)).collect()
    }

    fn string_operand<'v>(op: &FieldOp, field: &str, value: &'v Bson) -> Result<&'v str, DocumentStoreError> {
        value.as_str().ok_or_else(|| {
            DocumentStoreError::Predicate(format!("operator {op:?} on {field:?} requires a string value"))
        })
    }
}

impl QueryVisitor for MongoQueryTranslator {
    type Output = Document;
    type Error = DocumentStoreError;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        // MongoDB rejects an empty `$and`.
        if exprs.is_empty() {
            return Ok(doc! {});
        }

        Ok(doc! { "$and": self.translate_all(exprs)? })
    }

    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        if exprs.is_empty() {
            return Ok(doc! { "_id": { "$in": [] } });
        }

        Ok(doc! { "$or": self.translate_all(exprs)? })
    }

    fn visit_not(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error> {
        // `$not` only applies to operator expressions, `$nor` negates a whole filter.
        Ok(doc! { "$nor": [self.visit_expr(expr)?] })
    }

    fn visit_exists(&mut self, field: &str, should_exist: bool) -> Result<Self::Output, Self::Error> {
        Ok(doc! { field: { "$exists": should_exist } })
    }

    fn visit_field(&mut self, field: &str, op: &FieldOp, value: &Bson) -> Result<Self::Output, Self::Error> {
        let condition = match op {
            FieldOp::Eq => doc! { "$eq": value },
            FieldOp::Ne => doc! { "$ne": value },
            FieldOp::Gt => doc! { "$gt": value },
            FieldOp::Gte => doc! { "$gte": value },
            FieldOp::Lt => doc! { "$lt": value },
            FieldOp::Lte => doc! { "$lte": value },
            FieldOp::Contains => match value {
                Bson::String(s) => doc! { "$regex": regex::escape(s) },
                Bson::Array(items) => doc! { "$all": items },
                _ => {
                    return Err(DocumentStoreError::Predicate(format!(
                        "operator Contains on {field:?} requires a string or array value"
                    )));
                }
            },
            FieldOp::NotContains => match value {
                Bson::String(s) => doc! { "$not": { "$regex": regex::escape(s) } },
                Bson::Array(items) => doc! { "$nin": items },
                _ => {
                    return Err(DocumentStoreError::Predicate(format!(
                        "operator NotContains on {field:?} requires a string or array value"
                    )));
                }
            },
            FieldOp::StartsWith => {
                let prefix = Self::string_operand(op, field, value)?;
                doc! { "$regex": format!("^{}", regex::escape(prefix)) }
            }
            FieldOp::EndsWith => {
                let suffix = Self::string_operand(op, field, value)?;
                doc! { "$regex": format!("{}$", regex::escape(suffix)) }
            }
            FieldOp::AnyOf | FieldOp::NoneOf => {
                let Bson::Array(items) = value else {
                    return Err(DocumentStoreError::Predicate(format!(
                        "operator {op:?} on {field:?} requires an array value"
                    )));
                };

                if *op == FieldOp::AnyOf {
                    doc! { "$in": items }
                } else {
                    doc! { "$nin": items }
                }
            }
        };

        Ok(doc! { field: condition })
    }
}
