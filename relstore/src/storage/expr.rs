//! Query Expressions
//!
//! Predicates and orderings follow a compile/bind protocol: `compile_sql`
//! writes text with placeholders into a [`SqlBuilder`], then `bind_literals`
//! pushes the literal values in the same order into [`Params`]. They can also
//! be evaluated in memory against any [`Columns`] source, which is how the
//! simulation backend answers the same queries.
//!
//! In-memory evaluation uses SQL three-valued logic: any comparison with NULL
//! is unknown, and unknown rows do not match.
//!
//! ```rust
//! use relstore::storage::{asc, eq, gt, Dialect, Params, Predicate, PredicateExt, SqlBuilder, Order};
//!
//! let filter = eq("owner", "alice").and(gt("balance", 100_i64));
//! let mut sql = SqlBuilder::new(Dialect::Postgres);
//! filter.compile_sql(&mut sql);
//! assert_eq!(sql.as_str(), r#"("owner" = $1) AND ("balance" > $2)"#);
//!
//! let mut params = Params::new();
//! filter.bind_literals(&mut params);
//! assert_eq!(params.len(), 2);
//!
//! let order = asc("owner").then_desc("balance");
//! let mut sql = SqlBuilder::new(Dialect::MySql);
//! order.compile_sql(&mut sql);
//! assert_eq!(sql.as_str(), "`owner` ASC, `balance` DESC");
//! ```

use std::cmp::Ordering;
use std::fmt;

use relstore_core::constants::QUERY_IN_VALUES_COUNT_MAX;

use super::error::{StorageError, StorageResult};
use super::sql::{Params, SqlBuilder};
use super::value::SqlValue;

// =============================================================================
// Contracts
// =============================================================================

/// A source of named column values (an entity row, a test fixture, ...).
pub trait Columns {
    /// Value of `name`, or `None` if there is no such column.
    fn column(&self, name: &str) -> Option<SqlValue>;
}

/// A filter expression.
pub trait Predicate: Send + Sync + fmt::Debug {
    /// Write the SQL text, one placeholder per literal.
    fn compile_sql(&self, sql: &mut SqlBuilder);

    /// Bind the literals in the order `compile_sql` wrote their placeholders.
    fn bind_literals(&self, params: &mut Params);

    /// Evaluate against a row: `Some(true)`, `Some(false)` or `None` (unknown).
    ///
    /// # Errors
    /// Returns `StorageError::InvalidQuery` if a referenced column does not exist.
    fn evaluate(&self, row: &dyn Columns) -> StorageResult<Option<bool>>;

    /// True if the row definitely matches.
    ///
    /// # Errors
    /// Propagates errors from [`Predicate::evaluate`].
    fn matches(&self, row: &dyn Columns) -> StorageResult<bool> {
        Ok(self.evaluate(row)? == Some(true))
    }
}

/// A sort order.
pub trait Order: Send + Sync + fmt::Debug {
    /// Write the ORDER BY body (without the keywords).
    fn compile_sql(&self, sql: &mut SqlBuilder);

    /// Compare two rows.
    fn compare(&self, a: &dyn Columns, b: &dyn Columns) -> Ordering;
}

fn lookup(row: &dyn Columns, column: &str) -> StorageResult<SqlValue> {
    row.column(column)
        .ok_or_else(|| StorageError::invalid_query(format!("unknown column {column}")))
}

// =============================================================================
// Comparisons
// =============================================================================

/// Binary comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    /// `=`
    Eq,
    /// `<>`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
}

impl CmpOp {
    fn as_sql(self) -> &'static str {
        match self {
            Self::Eq => " = ",
            Self::Ne => " <> ",
            Self::Lt => " < ",
            Self::Le => " <= ",
            Self::Gt => " > ",
            Self::Ge => " >= ",
        }
    }

    fn holds(self, ordering: Ordering) -> bool {
        match self {
            Self::Eq => ordering == Ordering::Equal,
            Self::Ne => ordering != Ordering::Equal,
            Self::Lt => ordering == Ordering::Less,
            Self::Le => ordering != Ordering::Greater,
            Self::Gt => ordering == Ordering::Greater,
            Self::Ge => ordering != Ordering::Less,
        }
    }
}

/// `column <op> literal`
#[derive(Debug, Clone)]
pub struct Cmp {
    column: String,
    op: CmpOp,
    value: SqlValue,
}

impl Cmp {
    /// Compare `column` against `value`.
    #[must_use]
    pub fn new(column: impl Into<String>, op: CmpOp, value: impl Into<SqlValue>) -> Self {
        Self {
            column: column.into(),
            op,
            value: value.into(),
        }
    }
}

impl Predicate for Cmp {
    fn compile_sql(&self, sql: &mut SqlBuilder) {
        sql.push_ident(&self.column)
            .push(self.op.as_sql())
            .push_placeholder();
    }

    fn bind_literals(&self, params: &mut Params) {
        params.bind(self.value.clone());
    }

    fn evaluate(&self, row: &dyn Columns) -> StorageResult<Option<bool>> {
        let actual = lookup(row, &self.column)?;
        if actual.is_null() || self.value.is_null() {
            return Ok(None);
        }
        Ok(Some(self.op.holds(actual.sql_cmp(&self.value))))
    }
}

/// `column = value`
pub fn eq(column: impl Into<String>, value: impl Into<SqlValue>) -> Cmp {
    Cmp::new(column, CmpOp::Eq, value)
}

/// `column <> value`
pub fn ne(column: impl Into<String>, value: impl Into<SqlValue>) -> Cmp {
    Cmp::new(column, CmpOp::Ne, value)
}

/// `column < value`
pub fn lt(column: impl Into<String>, value: impl Into<SqlValue>) -> Cmp {
    Cmp::new(column, CmpOp::Lt, value)
}

/// `column <= value`
pub fn lte(column: impl Into<String>, value: impl Into<SqlValue>) -> Cmp {
    Cmp::new(column, CmpOp::Le, value)
}

/// `column > value`
pub fn gt(column: impl Into<String>, value: impl Into<SqlValue>) -> Cmp {
    Cmp::new(column, CmpOp::Gt, value)
}

/// `column >= value`
pub fn gte(column: impl Into<String>, value: impl Into<SqlValue>) -> Cmp {
    Cmp::new(column, CmpOp::Ge, value)
}

// =============================================================================
// NULL tests and IN
// =============================================================================

/// `column IS [NOT] NULL`
#[derive(Debug, Clone)]
pub struct IsNull {
    column: String,
    negated: bool,
}

impl Predicate for IsNull {
    fn compile_sql(&self, sql: &mut SqlBuilder) {
        sql.push_ident(&self.column).push(if self.negated {
            " IS NOT NULL"
        } else {
            " IS NULL"
        });
    }

    fn bind_literals(&self, _params: &mut Params) {}

    fn evaluate(&self, row: &dyn Columns) -> StorageResult<Option<bool>> {
        Ok(Some(lookup(row, &self.column)?.is_null() != self.negated))
    }
}

/// `column IS NULL`
pub fn is_null(column: impl Into<String>) -> IsNull {
    IsNull {
        column: column.into(),
        negated: false,
    }
}

/// `column IS NOT NULL`
pub fn not_null(column: impl Into<String>) -> IsNull {
    IsNull {
        column: column.into(),
        negated: true,
    }
}

/// `column IN (v1, v2, ...)`; an empty list matches nothing.
#[derive(Debug, Clone)]
pub struct In {
    column: String,
    values: Vec<SqlValue>,
}

impl Predicate for In {
    fn compile_sql(&self, sql: &mut SqlBuilder) {
        if self.values.is_empty() {
            sql.push("1 = 0");
            return;
        }
        sql.push_ident(&self.column).push(" IN (");
        sql.push_list(&self.values, |sql, _| {
            sql.push_placeholder();
        });
        sql.push(")");
    }

    fn bind_literals(&self, params: &mut Params) {
        for value in &self.values {
            params.bind(value.clone());
        }
    }

    fn evaluate(&self, row: &dyn Columns) -> StorageResult<Option<bool>> {
        let actual = lookup(row, &self.column)?;
        if self.values.is_empty() {
            return Ok(Some(false));
        }
        if actual.is_null() {
            return Ok(None);
        }
        if self.values.iter().any(|v| actual.sql_eq(v)) {
            return Ok(Some(true));
        }
        Ok(if self.values.iter().any(SqlValue::is_null) {
            None
        } else {
            Some(false)
        })
    }
}

/// `column IN (values...)`
///
/// # Panics
/// Panics if more than `QUERY_IN_VALUES_COUNT_MAX` values are given.
pub fn in_list<V: Into<SqlValue>>(
    column: impl Into<String>,
    values: impl IntoIterator<Item = V>,
) -> In {
    let values: Vec<SqlValue> = values.into_iter().map(Into::into).collect();
    // Precondition
    assert!(
        values.len() <= QUERY_IN_VALUES_COUNT_MAX,
        "IN list of {} exceeds {QUERY_IN_VALUES_COUNT_MAX}",
        values.len()
    );
    In {
        column: column.into(),
        values,
    }
}

// =============================================================================
// Boolean connectives
// =============================================================================

/// Conjunction; empty is always true.
#[derive(Debug, Default)]
pub struct And(pub Vec<Box<dyn Predicate>>);

/// Disjunction; empty is always false.
#[derive(Debug, Default)]
pub struct Or(pub Vec<Box<dyn Predicate>>);

/// Negation.
#[derive(Debug)]
pub struct Not(pub Box<dyn Predicate>);

fn compile_joined(parts: &[Box<dyn Predicate>], joiner: &str, empty: &str, sql: &mut SqlBuilder) {
    if parts.is_empty() {
        sql.push(empty);
        return;
    }
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            sql.push(joiner);
        }
        sql.push("(");
        part.compile_sql(sql);
        sql.push(")");
    }
}

impl Predicate for And {
    fn compile_sql(&self, sql: &mut SqlBuilder) {
        compile_joined(&self.0, " AND ", "1 = 1", sql);
    }

    fn bind_literals(&self, params: &mut Params) {
        for part in &self.0 {
            part.bind_literals(params);
        }
    }

    fn evaluate(&self, row: &dyn Columns) -> StorageResult<Option<bool>> {
        let mut unknown = false;
        for part in &self.0 {
            match part.evaluate(row)? {
                Some(false) => return Ok(Some(false)),
                None => unknown = true,
                Some(true) => {}
            }
        }
        Ok(if unknown { None } else { Some(true) })
    }
}

impl Predicate for Or {
    fn compile_sql(&self, sql: &mut SqlBuilder) {
        compile_joined(&self.0, " OR ", "1 = 0", sql);
    }

    fn bind_literals(&self, params: &mut Params) {
        for part in &self.0 {
            part.bind_literals(params);
        }
    }

    fn evaluate(&self, row: &dyn Columns) -> StorageResult<Option<bool>> {
        let mut unknown = false;
        for part in &self.0 {
            match part.evaluate(row)? {
                Some(true) => return Ok(Some(true)),
                None => unknown = true,
                Some(false) => {}
            }
        }
        Ok(if unknown { None } else { Some(false) })
    }
}

impl Predicate for Not {
    fn compile_sql(&self, sql: &mut SqlBuilder) {
        sql.push("NOT (");
        self.0.compile_sql(sql);
        sql.push(")");
    }

    fn bind_literals(&self, params: &mut Params) {
        self.0.bind_literals(params);
    }

    fn evaluate(&self, row: &dyn Columns) -> StorageResult<Option<bool>> {
        Ok(self.0.evaluate(row)?.map(|b| !b))
    }
}

/// Combinators available on every predicate.
pub trait PredicateExt: Predicate + Sized + 'static {
    /// `self AND other`
    fn and(self, other: impl Predicate + 'static) -> And {
        And(vec![Box::new(self), Box::new(other)])
    }

    /// `self OR other`
    fn or(self, other: impl Predicate + 'static) -> Or {
        Or(vec![Box::new(self), Box::new(other)])
    }

    /// `NOT self`
    fn not(self) -> Not {
        Not(Box::new(self))
    }
}

impl<P: Predicate + 'static> PredicateExt for P {}

// =============================================================================
// Ordering
// =============================================================================

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Ascending
    Asc,
    /// Descending
    Desc,
}

/// One or more sort keys, most significant first.
#[derive(Debug, Clone)]
pub struct OrderBy {
    terms: Vec<(String, Direction)>,
}

impl OrderBy {
    /// Add a less significant ascending key.
    #[must_use]
    pub fn then_asc(mut self, column: impl Into<String>) -> Self {
        self.terms.push((column.into(), Direction::Asc));
        self
    }

    /// Add a less significant descending key.
    #[must_use]
    pub fn then_desc(mut self, column: impl Into<String>) -> Self {
        self.terms.push((column.into(), Direction::Desc));
        self
    }
}

impl Order for OrderBy {
    fn compile_sql(&self, sql: &mut SqlBuilder) {
        sql.push_list(&self.terms, |sql, (column, direction)| {
            sql.push_ident(column).push(match direction {
                Direction::Asc => " ASC",
                Direction::Desc => " DESC",
            });
        });
    }

    fn compare(&self, a: &dyn Columns, b: &dyn Columns) -> Ordering {
        for (column, direction) in &self.terms {
            let left = a.column(column).unwrap_or(SqlValue::Null);
            let right = b.column(column).unwrap_or(SqlValue::Null);
            let ordering = match direction {
                Direction::Asc => left.sql_cmp(&right),
                Direction::Desc => right.sql_cmp(&left),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }
}

/// Order by `column` ascending.
pub fn asc(column: impl Into<String>) -> OrderBy {
    OrderBy {
        terms: vec![(column.into(), Direction::Asc)],
    }
}

/// Order by `column` descending.
pub fn desc(column: impl Into<String>) -> OrderBy {
    OrderBy {
        terms: vec![(column.into(), Direction::Desc)],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::sql::Dialect;
    use std::collections::HashMap;

    struct Row(HashMap<&'static str, SqlValue>);

    impl Columns for Row {
        fn column(&self, name: &str) -> Option<SqlValue> {
            self.0.get(name).cloned()
        }
    }

    fn row(pairs: &[(&'static str, SqlValue)]) -> Row {
        Row(pairs.iter().cloned().collect())
    }

    fn compile(p: &dyn Predicate, dialect: Dialect) -> (String, Params) {
        let mut sql = SqlBuilder::new(dialect);
        p.compile_sql(&mut sql);
        let mut params = Params::new();
        p.bind_literals(&mut params);
        assert_eq!(sql.placeholders(), params.len(), "compile/bind out of step");
        (sql.finish(), params)
    }

    #[test]
    fn test_nested_compile_numbers_placeholders_in_order() {
        let p = eq("a", 1_i64).and(in_list("b", ["x", "y"]).or(is_null("c")).not());
        let (sql, params) = compile(&p, Dialect::Postgres);
        assert_eq!(
            sql,
            r#"("a" = $1) AND (NOT (("b" IN ($2, $3)) OR ("c" IS NULL)))"#
        );
        assert_eq!(
            params.into_values(),
            vec![SqlValue::Int(1), SqlValue::from("x"), SqlValue::from("y")]
        );
    }

    #[test]
    fn test_empty_connectives_and_in() {
        assert_eq!(compile(&And::default(), Dialect::Sqlite).0, "1 = 1");
        assert_eq!(compile(&Or::default(), Dialect::Sqlite).0, "1 = 0");
        let empty = in_list::<i64>("a", []);
        assert_eq!(compile(&empty, Dialect::Sqlite).0, "1 = 0");
        assert!(!empty.matches(&row(&[("a", SqlValue::Int(1))])).unwrap());
    }

    #[test]
    fn test_evaluate_comparisons() {
        let r = row(&[("n", SqlValue::Int(5)), ("s", SqlValue::from("m"))]);
        assert!(gt("n", 4_i64).matches(&r).unwrap());
        assert!(lte("n", 5.0).matches(&r).unwrap());
        assert!(!ne("s", "m").matches(&r).unwrap());
        assert!(in_list("s", ["a", "m"]).matches(&r).unwrap());
    }

    #[test]
    fn test_three_valued_logic() {
        let r = row(&[("n", SqlValue::Null)]);
        assert_eq!(eq("n", 1_i64).evaluate(&r).unwrap(), None);
        assert_eq!(eq("n", 1_i64).not().evaluate(&r).unwrap(), None);
        assert!(!eq("n", 1_i64).not().matches(&r).unwrap());
        assert!(is_null("n").matches(&r).unwrap());
        assert_eq!(
            eq("n", 1_i64).or(is_null("n")).evaluate(&r).unwrap(),
            Some(true)
        );
    }

    #[test]
    fn test_unknown_column_is_invalid_query() {
        let err = eq("missing", 1_i64).matches(&row(&[])).unwrap_err();
        assert!(matches!(err, StorageError::InvalidQuery { .. }));
    }

    #[test]
    fn test_order_compare() {
        let a = row(&[("k", SqlValue::Int(1)), ("t", SqlValue::from("b"))]);
        let b = row(&[("k", SqlValue::Int(1)), ("t", SqlValue::from("a"))]);
        assert_eq!(asc("k").then_asc("t").compare(&a, &b), Ordering::Greater);
        assert_eq!(asc("k").then_desc("t").compare(&a, &b), Ordering::Less);
        assert_eq!(desc("k").compare(&a, &b), Ordering::Equal);
    }
}
