//! SQL Text and Parameters
//!
//! `SqlBuilder` assembles statement text for one operation, numbering
//! placeholders as it goes. `Params` is the matching bind cursor: values are
//! pushed in exactly the order their placeholders were written.
//!
//! Compile-then-bind: an expression first writes its text (which fixes the
//! placeholder count and order), then pushes its literal values. Nothing is
//! ever spliced into the text as a literal; identifiers are always quoted.

use serde::{Deserialize, Serialize};

use relstore_core::constants::{SQL_IDENTIFIER_BYTES_MAX, SQL_STATEMENT_BYTES_DEFAULT};

use super::value::{ColumnKind, SqlValue};

// =============================================================================
// Dialect
// =============================================================================

/// The SQL differences this crate cares about: placeholders, identifier
/// quoting, catalog lookup, upsert syntax and unbounded LIMIT.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// SQLite (`?`, double quotes, `ON CONFLICT`)
    #[default]
    Sqlite,
    /// PostgreSQL (`$n`, double quotes, `ON CONFLICT`)
    Postgres,
    /// MySQL / MariaDB (`?`, backticks, `ON DUPLICATE KEY UPDATE`)
    #[serde(rename = "mysql")]
    MySql,
}

impl Dialect {
    /// Infer the dialect from a connection URL scheme.
    ///
    /// ```
    /// use relstore::storage::Dialect;
    /// assert_eq!(Dialect::from_url("sqlite::memory:"), Some(Dialect::Sqlite));
    /// assert_eq!(Dialect::from_url("postgres://u@h/db"), Some(Dialect::Postgres));
    /// assert_eq!(Dialect::from_url("mysql://u@h/db"), Some(Dialect::MySql));
    /// assert_eq!(Dialect::from_url("redis://h"), None);
    /// ```
    #[must_use]
    pub fn from_url(url: &str) -> Option<Self> {
        let scheme = url.split(':').next()?.to_ascii_lowercase();
        match scheme.as_str() {
            "sqlite" => Some(Self::Sqlite),
            "postgres" | "postgresql" => Some(Self::Postgres),
            "mysql" | "mariadb" => Some(Self::MySql),
            _ => None,
        }
    }

    fn quote_char(self) -> char {
        match self {
            Self::Sqlite | Self::Postgres => '"',
            Self::MySql => '`',
        }
    }

    /// Catalog query returning a row when the named table exists.
    /// Takes the table name as its single parameter.
    pub(crate) fn table_exists_sql(self) -> &'static str {
        match self {
            Self::Sqlite => "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?",
            Self::Postgres => {
                "SELECT table_name FROM information_schema.tables \
                 WHERE table_schema = current_schema() AND table_name = $1"
            }
            Self::MySql => {
                "SELECT table_name FROM information_schema.tables \
                 WHERE table_schema = DATABASE() AND table_name = ?"
            }
        }
    }

    /// LIMIT operand meaning "no limit", for OFFSET without LIMIT.
    pub(crate) fn unbounded_limit(self) -> Option<&'static str> {
        match self {
            Self::Sqlite => Some("-1"),
            Self::MySql => Some("18446744073709551615"),
            Self::Postgres => None,
        }
    }

    /// SQLSTATE codes for "object already exists" on CREATE TABLE.
    pub(crate) fn is_duplicate_object(self, code: Option<&str>, message: &str) -> bool {
        let by_code = match (self, code) {
            (Self::Postgres, Some(code)) => code == "42P07",
            (Self::MySql, Some(code)) => code == "42S01" || code == "1050",
            _ => false,
        };
        by_code || message.contains("already exists")
    }
}

/// True if `name` is a plain identifier: ASCII letter or underscore first,
/// then letters, digits or underscores, at most `SQL_IDENTIFIER_BYTES_MAX`.
#[must_use]
pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    name.len() <= SQL_IDENTIFIER_BYTES_MAX
        && (first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

// =============================================================================
// SqlBuilder
// =============================================================================

/// Statement text under construction for one operation.
#[derive(Debug)]
pub struct SqlBuilder {
    dialect: Dialect,
    sql: String,
    placeholders: usize,
}

impl SqlBuilder {
    /// Empty builder with the default statement capacity.
    #[must_use]
    pub fn new(dialect: Dialect) -> Self {
        Self::with_capacity(dialect, SQL_STATEMENT_BYTES_DEFAULT)
    }

    /// Empty builder pre-sized to `capacity` bytes.
    #[must_use]
    pub fn with_capacity(dialect: Dialect, capacity: usize) -> Self {
        Self {
            dialect,
            sql: String::with_capacity(capacity),
            placeholders: 0,
        }
    }

    /// Dialect this text is written for.
    #[must_use]
    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Append raw SQL keywords or punctuation. Never pass user data here.
    pub fn push(&mut self, sql: &str) -> &mut Self {
        self.sql.push_str(sql);
        self
    }

    /// Append a quoted identifier, doubling any embedded quote character.
    pub fn push_ident(&mut self, ident: &str) -> &mut Self {
        let quote = self.dialect.quote_char();
        self.sql.push(quote);
        for c in ident.chars() {
            if c == quote {
                self.sql.push(quote);
            }
            self.sql.push(c);
        }
        self.sql.push(quote);
        self
    }

    /// Append the next positional placeholder (`?` or `$n`).
    pub fn push_placeholder(&mut self) -> &mut Self {
        self.placeholders += 1;
        match self.dialect {
            Dialect::Postgres => {
                self.sql.push('$');
                self.sql.push_str(&self.placeholders.to_string());
            }
            Dialect::Sqlite | Dialect::MySql => self.sql.push('?'),
        }
        self
    }

    /// Append an unsigned integer literal (LIMIT/OFFSET operands).
    pub fn push_u64(&mut self, n: u64) -> &mut Self {
        self.sql.push_str(&n.to_string());
        self
    }

    /// Append `items` separated by `", "`, rendering each with `f`.
    pub fn push_list<T>(&mut self, items: &[T], mut f: impl FnMut(&mut Self, &T)) -> &mut Self {
        for (i, item) in items.iter().enumerate() {
            if i > 0 {
                self.sql.push_str(", ");
            }
            f(self, item);
        }
        self
    }

    /// Placeholders written so far.
    #[must_use]
    pub fn placeholders(&self) -> usize {
        self.placeholders
    }

    /// The text so far.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.sql
    }

    /// Finish, returning the statement text.
    #[must_use]
    pub fn finish(self) -> String {
        self.sql
    }
}

// =============================================================================
// Params
// =============================================================================

/// Bind cursor: positional values in placeholder order.
///
/// Each value carries the column kind a NULL in that position is typed as.
/// Literals bound without a column default to text; they never match when
/// NULL, so their declared type is irrelevant.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params {
    values: Vec<SqlValue>,
    kinds: Vec<ColumnKind>,
}

impl Params {
    /// Empty cursor.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind the next literal; returns its 1-based parameter index.
    pub fn bind(&mut self, value: SqlValue) -> usize {
        self.bind_as(value, ColumnKind::Text)
    }

    /// Bind the next value destined for a column of `kind`.
    pub fn bind_as(&mut self, value: SqlValue, kind: ColumnKind) -> usize {
        self.values.push(value);
        self.kinds.push(kind);

        // Postcondition
        debug_assert_eq!(self.values.len(), self.kinds.len());
        self.values.len()
    }

    /// Number of values bound.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True if nothing is bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Bound values in order.
    #[must_use]
    pub fn values(&self) -> &[SqlValue] {
        &self.values
    }

    /// Null kinds in order.
    #[must_use]
    pub fn kinds(&self) -> &[ColumnKind] {
        &self.kinds
    }

    /// Take the bound values.
    #[must_use]
    pub fn into_values(self) -> Vec<SqlValue> {
        self.values
    }

    /// Take the bound values with their null kinds.
    pub fn into_typed(self) -> impl Iterator<Item = (SqlValue, ColumnKind)> {
        self.values.into_iter().zip(self.kinds)
    }
}
