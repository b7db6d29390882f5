//! Column Values
//!
//! `SqlValue` is the currency between entity fields, bind parameters and
//! result columns. `ColumnKind` is derived from a declared SQL type name and
//! decides how a result column is decoded.

use std::cmp::Ordering;
use std::fmt;

use super::error::{StorageError, StorageResult};

// =============================================================================
// SqlValue
// =============================================================================

/// A single column value.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// SQL NULL
    Null,
    /// Boolean
    Bool(bool),
    /// 64-bit signed integer
    Int(i64),
    /// Double precision float
    Real(f64),
    /// Text
    Text(String),
    /// Raw bytes
    Blob(Vec<u8>),
}

impl SqlValue {
    /// True for `SqlValue::Null`.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Name of the variant, for error messages.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Real(_) => "real",
            Self::Text(_) => "text",
            Self::Blob(_) => "blob",
        }
    }

    /// Compare two values the way a SQL engine would for ordering.
    ///
    /// Integers compare exactly; a real on either side compares numerically.
    /// Booleans compare as 0/1.
    /// NULL sorts first. Values of unrelated kinds (text vs. number) order by
    /// kind so sorting stays total.
    #[must_use]
    pub fn sql_cmp(&self, other: &Self) -> Ordering {
        if let (Some(a), Some(b)) = (self.as_integer(), other.as_integer()) {
            return a.cmp(&b);
        }
        if let (Some(a), Some(b)) = (self.as_number(), other.as_number()) {
            return a.partial_cmp(&b).unwrap_or(Ordering::Equal);
        }
        match (self, other) {
            (Self::Text(a), Self::Text(b)) => a.cmp(b),
            (Self::Blob(a), Self::Blob(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }

    /// Equality used by predicate evaluation. NULL never equals anything.
    #[must_use]
    pub fn sql_eq(&self, other: &Self) -> bool {
        !self.is_null() && !other.is_null() && self.sql_cmp(other) == Ordering::Equal
    }

    /// Exact integer view; only `Real` needs widening to compare.
    fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Bool(b) => Some(i64::from(*b)),
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    fn as_number(&self) -> Option<f64> {
        match self {
            Self::Bool(b) => Some(f64::from(u8::from(*b))),
            #[allow(clippy::cast_precision_loss)]
            Self::Int(i) => Some(*i as f64),
            Self::Real(r) => Some(*r),
            _ => None,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Null => 0,
            Self::Bool(_) | Self::Int(_) | Self::Real(_) => 1,
            Self::Text(_) => 2,
            Self::Blob(_) => 3,
        }
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("NULL"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Real(r) => write!(f, "{r}"),
            Self::Text(s) => write!(f, "{s:?}"),
            Self::Blob(b) => write!(f, "<{} bytes>", b.len()),
        }
    }
}

// =============================================================================
// Conversions into SqlValue
// =============================================================================

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        Self::Real(v)
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_owned())
    }
}

impl From<Vec<u8>> for SqlValue {
    fn from(v: Vec<u8>) -> Self {
        Self::Blob(v)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

// =============================================================================
// Conversions out of SqlValue
// =============================================================================

fn mismatch(expected: &str, got: &SqlValue) -> StorageError {
    StorageError::mapping(
        "<value>",
        format!("expected {expected}, got {}", got.type_name()),
    )
}

impl TryFrom<SqlValue> for bool {
    type Error = StorageError;

    fn try_from(v: SqlValue) -> StorageResult<Self> {
        match v {
            SqlValue::Bool(b) => Ok(b),
            SqlValue::Int(i) => Ok(i != 0),
            other => Err(mismatch("bool", &other)),
        }
    }
}

impl TryFrom<SqlValue> for i64 {
    type Error = StorageError;

    fn try_from(v: SqlValue) -> StorageResult<Self> {
        match v {
            SqlValue::Int(i) => Ok(i),
            SqlValue::Bool(b) => Ok(i64::from(b)),
            other => Err(mismatch("int", &other)),
        }
    }
}

impl TryFrom<SqlValue> for i32 {
    type Error = StorageError;

    fn try_from(v: SqlValue) -> StorageResult<Self> {
        let wide = i64::try_from(v)?;
        i32::try_from(wide).map_err(|_| {
            StorageError::mapping("<value>", format!("{wide} does not fit in i32"))
        })
    }
}

impl TryFrom<SqlValue> for f64 {
    type Error = StorageError;

    fn try_from(v: SqlValue) -> StorageResult<Self> {
        match v {
            SqlValue::Real(r) => Ok(r),
            #[allow(clippy::cast_precision_loss)]
            SqlValue::Int(i) => Ok(i as f64),
            other => Err(mismatch("real", &other)),
        }
    }
}

impl TryFrom<SqlValue> for String {
    type Error = StorageError;

    fn try_from(v: SqlValue) -> StorageResult<Self> {
        match v {
            SqlValue::Text(s) => Ok(s),
            other => Err(mismatch("text", &other)),
        }
    }
}

impl TryFrom<SqlValue> for Vec<u8> {
    type Error = StorageError;

    fn try_from(v: SqlValue) -> StorageResult<Self> {
        match v {
            SqlValue::Blob(b) => Ok(b),
            SqlValue::Text(s) => Ok(s.into_bytes()),
            other => Err(mismatch("blob", &other)),
        }
    }
}

/// Decode a nullable column: NULL becomes `None`.
///
/// # Errors
/// Returns a mapping error if a non-null value has the wrong type.
pub fn nullable<T>(v: SqlValue) -> StorageResult<Option<T>>
where
    T: TryFrom<SqlValue, Error = StorageError>,
{
    if v.is_null() {
        Ok(None)
    } else {
        T::try_from(v).map(Some)
    }
}

// =============================================================================
// ColumnKind
// =============================================================================

/// Storage class of a column, derived from its declared SQL type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    /// BOOLEAN / BOOL / BIT
    Bool,
    /// Any integer type
    Int,
    /// REAL / FLOAT / DOUBLE / NUMERIC / DECIMAL
    Real,
    /// CHAR / VARCHAR / TEXT / CLOB and anything unrecognized
    Text,
    /// BLOB / BINARY / BYTEA
    Blob,
}

impl ColumnKind {
    /// Classify a declared SQL type name, SQLite-affinity style.
    ///
    /// ```
    /// use relstore::storage::ColumnKind;
    /// assert_eq!(ColumnKind::from_sql_type("BIGINT"), ColumnKind::Int);
    /// assert_eq!(ColumnKind::from_sql_type("varchar(64)"), ColumnKind::Text);
    /// assert_eq!(ColumnKind::from_sql_type("DOUBLE PRECISION"), ColumnKind::Real);
    /// ```
    #[must_use]
    pub fn from_sql_type(sql_type: &str) -> Self {
        let t = sql_type.to_ascii_lowercase();
        if t.starts_with("bool") || t == "bit" {
            Self::Bool
        } else if t.contains("int") || t.contains("serial") {
            Self::Int
        } else if t.contains("char") || t.contains("clob") || t.contains("text") {
            Self::Text
        } else if t.contains("blob") || t.contains("binary") || t == "bytea" {
            Self::Blob
        } else if ["real", "floa", "doub", "numeric", "decimal"]
            .iter()
            .any(|p| t.contains(p))
        {
            Self::Real
        } else {
            Self::Text
        }
    }
}
