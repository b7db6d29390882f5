//! Storage Errors
//!
//! `TigerStyle`: Explicit error types with context.

use thiserror::Error;

/// Errors from storage operations.
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    /// The entity model could not be resolved or the table could not be
    /// materialized. Fatal to constructing an engine.
    #[error("initialization failed: {message}")]
    Initialization {
        /// What failed
        message: String,
    },

    /// A write affected zero rows or the backend rejected the statement.
    #[error("write failed: {message}")]
    Write {
        /// What failed
        message: String,
    },

    /// Query execution failed.
    #[error("read failed: {message}")]
    Read {
        /// What failed
        message: String,
    },

    /// Acquiring a connection or statement failed.
    #[error("resource error: {message}")]
    Resource {
        /// What failed
        message: String,
    },

    /// A column value could not be converted to or from an entity field.
    #[error("mapping error on column {column}: {message}")]
    Mapping {
        /// Column being mapped
        column: String,
        /// Conversion failure
        message: String,
    },

    /// A predicate or ordering cannot be compiled or evaluated.
    #[error("invalid query: {message}")]
    InvalidQuery {
        /// Why the query is invalid
        message: String,
    },

    /// Simulated fault (for DST)
    #[error("simulated fault: {fault_type}")]
    SimulatedFault {
        /// Type of simulated fault
        fault_type: String,
    },
}

impl StorageError {
    /// Create an initialization error.
    #[must_use]
    pub fn initialization(message: impl Into<String>) -> Self {
        Self::Initialization {
            message: message.into(),
        }
    }

    /// Create a write error.
    #[must_use]
    pub fn write(message: impl Into<String>) -> Self {
        Self::Write {
            message: message.into(),
        }
    }

    /// Create a read error.
    #[must_use]
    pub fn read(message: impl Into<String>) -> Self {
        Self::Read {
            message: message.into(),
        }
    }

    /// Create a resource error.
    #[must_use]
    pub fn resource(message: impl Into<String>) -> Self {
        Self::Resource {
            message: message.into(),
        }
    }

    /// Create a mapping error for `column`.
    #[must_use]
    pub fn mapping(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Mapping {
            column: column.into(),
            message: message.into(),
        }
    }

    /// Create an invalid query error.
    #[must_use]
    pub fn invalid_query(message: impl Into<String>) -> Self {
        Self::InvalidQuery {
            message: message.into(),
        }
    }

    /// Create a simulated fault error.
    #[must_use]
    pub fn simulated_fault(fault_type: impl Into<String>) -> Self {
        Self::SimulatedFault {
            fault_type: fault_type.into(),
        }
    }

    /// Check if this is a transient error (can be retried).
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Resource { .. } | Self::SimulatedFault { .. })
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Compatibility mode: collapse a failure into "absent".
///
/// The relational engine reports failures as errors. Callers that want the
/// older contract, where a failed operation and a missing row look the same,
/// call `collapse()`; the error is logged and dropped.
pub trait CollapseExt<T> {
    /// `Ok(v)` becomes `Some(v)`, `Err(_)` is logged and becomes `None`.
    fn collapse(self) -> Option<T>;
}

impl<T> CollapseExt<T> for StorageResult<T> {
    fn collapse(self) -> Option<T> {
        match self {
            Ok(value) => Some(value),
            Err(error) => {
                tracing::warn!(%error, "storage operation failed, collapsing to absent");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_constructors() {
        let err = StorageError::mapping("balance", "expected integer");
        assert!(matches!(
            err,
            StorageError::Mapping { ref column, .. } if column == "balance"
        ));
        assert_eq!(
            err.to_string(),
            "mapping error on column balance: expected integer"
        );

        let err = StorageError::write("zero rows affected");
        assert!(matches!(err, StorageError::Write { message } if message == "zero rows affected"));
    }

    #[test]
    fn test_is_transient() {
        assert!(StorageError::resource("pool timed out").is_transient());
        assert!(StorageError::simulated_fault("db_connection_fail").is_transient());

        assert!(!StorageError::write("rejected").is_transient());
        assert!(!StorageError::initialization("no primary key").is_transient());
    }

    #[test]
    fn test_collapse() {
        let ok: StorageResult<u32> = Ok(3);
        assert_eq!(ok.collapse(), Some(3));

        let failed: StorageResult<u32> = Err(StorageError::read("boom"));
        assert_eq!(failed.collapse(), None);

        let missing: StorageResult<Option<u32>> = Ok(None);
        assert_eq!(missing.collapse().flatten(), None);
    }
}
