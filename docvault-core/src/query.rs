//! Structured predicates and queries over a collection.
//!
//! Filters are a small expression tree ([`Expr`]) that each backend translates directly
//! into its own query form through a [`QueryVisitor`]. Dotted field names address nested
//! fields, e.g. `contents.plasma`.
//!
//! # Example
//!
//! ```ignore
//! use docvault::query::{Filter, Query, SortDirection};
//!
//! // key -> expected value, AND-ed together
//! let filter = Filter::matching([("blood_type", "AB"), ("blood_rh", "+")]);
//!
//! let query = Query::builder()
//!     .filter(filter.and(Filter::eq("eligible", true)))
//!     .sort("last_name", SortDirection::Asc)
//!     .limit(20)
//!     .build();
//! ```

use bson::Bson;

use crate::error::DocumentStoreError;

/// Sort direction for query results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

/// Sort specification: which field, which direction.
#[derive(Debug, Clone)]
pub struct Sort {
    pub field: String,
    pub direction: SortDirection,
}

/// Field comparison operators for filter expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    /// String contains a substring, or array contains an element.
    Contains,
    /// Negation of [`FieldOp::Contains`].
    NotContains,
    /// String prefix.
    StartsWith,
    /// String suffix.
    EndsWith,
    /// Field equals (or, for arrays, shares an element with) one of the given values.
    AnyOf,
    /// Negation of [`FieldOp::AnyOf`].
    NoneOf,
}

/// A filter expression.
///
/// An empty [`Expr::And`] matches every document; an empty [`Expr::Or`] matches none.
#[derive(Debug, Clone)]
pub enum Expr {
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Not(Box<Expr>),
    /// Field presence (`true`) or absence (`false`).
    Exists(String, bool),
    Field {
        field: String,
        op: FieldOp,
        value: Bson,
    },
}

impl Expr {
    /// Creates a field comparison expression.
    pub fn field(field: String, op: FieldOp, value: Bson) -> Self {
        Expr::Field { field, op, value }
    }

    /// Combines this expression with another using logical AND.
    ///
    /// If this expression is already an AND, the other expression is appended.
    pub fn and(self, other: Expr) -> Self {
        match self {
            Expr::And(mut list) => {
                list.push(other);
                Expr::And(list)
            }
            _ => Expr::And(vec![self, other]),
        }
    }

    /// Combines this expression with another using logical OR.
    ///
    /// If this expression is already an OR, the other expression is appended.
    pub fn or(self, other: Expr) -> Self {
        match self {
            Expr::Or(mut list) => {
                list.push(other);
                Expr::Or(list)
            }
            _ => Expr::Or(vec![self, other]),
        }
    }

    /// Negates this expression.
    pub fn not(self) -> Self {
        Expr::Not(Box::new(self))
    }

    /// Checks that every backend can translate this expression.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::Predicate`] describing the first offending node.
    pub fn validate(&self) -> Result<(), DocumentStoreError> {
        PredicateValidator.visit_expr(self)
    }
}

/// A filter plus ordering and paging.
#[derive(Debug, Clone, Default)]
pub struct Query {
    /// Documents must match this expression; `None` matches everything.
    pub filter: Option<Expr>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    pub sort: Option<Sort>,
}

impl Query {
    /// A query matching every document.
    pub fn new() -> Self {
        Query::default()
    }

    /// A query with only a filter.
    pub fn filtered(filter: Option<Expr>) -> Self {
        Query { filter, ..Query::default() }
    }

    pub fn builder() -> QueryBuilder {
        QueryBuilder::new()
    }
}

/// Constructors for filter expressions.
///
/// All methods accept field names as `Into<String>` and values as `Into<Bson>`.
pub struct Filter;

impl Filter {
    /// Equality on every `(field, value)` pair, AND-ed together.
    ///
    /// An empty iterator yields an empty AND, which matches every document.
    pub fn matching<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Expr
    where
        K: Into<String>,
        V: Into<Bson>,
    {
        Expr::And(
            pairs
                .into_iter()
                .map(|(field, value)| Filter::eq(field, value))
                .collect(),
        )
    }

    pub fn eq(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Eq, value.into())
    }

    pub fn ne(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Ne, value.into())
    }

    pub fn gt(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Gt, value.into())
    }

    pub fn gte(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Gte, value.into())
    }

    pub fn lt(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Lt, value.into())
    }

    pub fn lte(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Lte, value.into())
    }

    pub fn starts_with(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::StartsWith, value.into())
    }

    pub fn ends_with(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::EndsWith, value.into())
    }

    pub fn contains(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Contains, value.into())
    }

    pub fn not_contains(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::NotContains, value.into())
    }

    pub fn exists(field: impl Into<String>) -> Expr {
        Expr::Exists(field.into(), true)
    }

    pub fn not_exists(field: impl Into<String>) -> Expr {
        Expr::Exists(field.into(), false)
    }

    pub fn and(exprs: impl IntoIterator<Item = Expr>) -> Expr {
        Expr::And(exprs.into_iter().collect())
    }

    pub fn or(exprs: impl IntoIterator<Item = Expr>) -> Expr {
        Expr::Or(exprs.into_iter().collect())
    }

    /// `value` must be an array.
    pub fn any_of(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::AnyOf, value.into())
    }

    /// `value` must be an array.
    pub fn none_of(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::NoneOf, value.into())
    }
}

#[derive(Debug, Clone, Default)]
pub struct QueryBuilder {
    query: Query,
}

impl QueryBuilder {
    pub fn new() -> Self {
        QueryBuilder::default()
    }

    pub fn filter(mut self, filter: Expr) -> Self {
        self.query.filter = Some(filter);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.query.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.query.offset = Some(offset);
        self
    }

    pub fn sort(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.query.sort = Some(Sort { field: field.into(), direction });
        self
    }

    pub fn build(self) -> Query {
        self.query
    }
}

/// Walks an [`Expr`] tree; implemented by each backend's translator.
pub trait QueryVisitor {
    type Output;
    type Error: Into<DocumentStoreError>;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error>;
    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error>;
    fn visit_not(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error>;
    fn visit_exists(
        &mut self,
        field: &str,
        should_exist: bool,
    ) -> Result<Self::Output, Self::Error>;
    fn visit_field(
        &mut self,
        field: &str,
        op: &FieldOp,
        value: &Bson,
    ) -> Result<Self::Output, Self::Error>;

    fn visit_expr(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error> {
        match expr {
            Expr::And(exprs) => self.visit_and(exprs),
            Expr::Or(exprs) => self.visit_or(exprs),
            Expr::Not(expr) => self.visit_not(expr),
            Expr::Exists(field, should_exist) => self.visit_exists(field, *should_exist),
            Expr::Field { field, op, value } => self.visit_field(field, op, value),
        }
    }
}

/// Rejects expressions no backend can translate.
struct PredicateValidator;

impl PredicateValidator {
    fn check_field(field: &str) -> Result<(), DocumentStoreError> {
        if field.is_empty() {
            return Err(DocumentStoreError::Predicate("empty field name".into()));
        }

        for segment in field.split('.') {
            if segment.is_empty() {
                return Err(DocumentStoreError::Predicate(format!(
                    "field {field:?} has an empty path segment"
                )));
            }
            if segment.starts_with('$') {
                return Err(DocumentStoreError::Predicate(format!(
                    "field {field:?} uses a reserved `$` segment"
                )));
            }
        }

        Ok(())
    }
}

impl QueryVisitor for PredicateValidator {
    type Output = ();
    type Error = DocumentStoreError;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<(), DocumentStoreError> {
        exprs.iter().try_for_each(|expr| self.visit_expr(expr))
    }

    fn visit_or(&mut self, exprs: &[Expr]) -> Result<(), DocumentStoreError> {
        exprs.iter().try_for_each(|expr| self.visit_expr(expr))
    }

    fn visit_not(&mut self, expr: &Expr) -> Result<(), DocumentStoreError> {
        self.visit_expr(expr)
    }

    fn visit_exists(&mut self, field: &str, _should_exist: bool) -> Result<(), DocumentStoreError> {
        Self::check_field(field)
    }

    fn visit_field(&mut self, field: &str, op: &FieldOp, value: &Bson) -> Result<(), DocumentStoreError> {
        Self::check_field(field)?;

        let accepted = match op {
            FieldOp::Eq | FieldOp::Ne | FieldOp::Gt | FieldOp::Gte | FieldOp::Lt | FieldOp::Lte => true,
            FieldOp::Contains | FieldOp::NotContains => {
                matches!(value, Bson::String(_) | Bson::Array(_))
            }
            FieldOp::StartsWith | FieldOp::EndsWith => matches!(value, Bson::String(_)),
            FieldOp::AnyOf | FieldOp::NoneOf => matches!(value, Bson::Array(_)),
        };

        if accepted {
            Ok(())
        } else {
            Err(DocumentStoreError::Predicate(format!(
                "operator {op:?} on {field:?} does not accept a {:?} value",
                value.element_type()
            )))
        }
    }
}
