//! Error types for change application.
//!
//! Callers classify failures through [`ApplyError::kind`], never by
//! message text.

use std::fmt;

/// How a driver failure should be classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverErrorKind {
    /// The engine rejected a write because of a constraint (duplicate key,
    /// foreign key, NOT NULL, CHECK).
    Constraint,
    /// The connection went away.
    ConnectionLost,
    /// The engine or driver aborted the statement on request.
    Cancelled,
    /// Anything else: syntax errors, engine errors, decoding failures.
    Other,
}

/// An error reported by a connection provider.
#[derive(Debug)]
pub struct DriverError {
    /// Classification used by the executor.
    pub kind: DriverErrorKind,
    /// Message reported by the engine or driver.
    pub message: String,
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl DriverError {
    /// Creates a driver error without an underlying cause.
    pub fn new(kind: DriverErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// Creates a driver error keeping the original cause.
    pub fn with_source<E>(kind: DriverErrorKind, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self {
            kind,
            message: source.to_string(),
            source: Some(Box::new(source)),
        }
    }
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for DriverError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// The kind of an [`ApplyError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A mutating request was refused on a read-only connection.
    ReadOnlyViolation,
    /// The dialect cannot express the requested operation.
    UnsupportedOperation,
    /// A key predicate does not identify a single row.
    AmbiguousTarget,
    /// A table, column or schema does not exist.
    NotFound,
    /// A write targets a column that cannot be written.
    InvalidColumn,
    /// A batch mixes data changes and structural changes.
    MixedOperation,
    /// The engine reported a constraint violation.
    ConstraintViolation,
    /// The connection was lost during execution.
    ConnectionLost,
    /// Execution was cancelled.
    Cancelled,
    /// Opaque engine error.
    SyntaxOrEngineError,
    /// Invalid configuration.
    Config,
}

impl ErrorKind {
    /// Returns true for errors raised before any statement reaches the
    /// connection.
    #[must_use]
    pub const fn is_validation(self) -> bool {
        matches!(
            self,
            Self::ReadOnlyViolation
                | Self::UnsupportedOperation
                | Self::AmbiguousTarget
                | Self::NotFound
                | Self::InvalidColumn
                | Self::MixedOperation
                | Self::Config
        )
    }
}

/// Errors that can occur while compiling or applying a batch.
#[derive(Debug, thiserror::Error)]
pub enum ApplyError {
    /// The connection is read-only.
    #[error("cannot {operation}: connection is read-only")]
    ReadOnlyViolation {
        /// What the caller tried to do.
        operation: String,
    },

    /// The dialect has no support for the operation.
    #[error("{operation} is not supported by the {dialect} dialect")]
    UnsupportedOperation {
        /// Dialect name.
        dialect: &'static str,
        /// The refused operation.
        operation: String,
    },

    /// The key columns supplied do not pin down a single row.
    #[error("key ({}) does not uniquely identify a row of {table}", .columns.join(", "))]
    AmbiguousTarget {
        /// Qualified table name.
        table: String,
        /// Key columns supplied by the caller.
        columns: Vec<String>,
    },

    /// A table, column or schema does not exist.
    #[error("{what} not found: {name}")]
    NotFound {
        /// Object kind ("table", "column", ...).
        what: &'static str,
        /// Object name.
        name: String,
    },

    /// A write targets a column that cannot be written.
    #[error("column {column} of {table} cannot be written: {reason}")]
    InvalidColumn {
        /// Qualified table name.
        table: String,
        /// Column name.
        column: String,
        /// Why the column is not writable.
        reason: String,
    },

    /// Data changes and structural changes in one batch.
    #[error("data changes and structural changes cannot be applied in one batch")]
    MixedOperation,

    /// Constraint violation reported by the engine.
    #[error("statement {index} violated a constraint: {source}")]
    ConstraintViolation {
        /// Position of the failing statement in the batch.
        index: usize,
        /// The failing SQL.
        sql: String,
        /// Driver error.
        #[source]
        source: DriverError,
    },

    /// The connection was lost.
    #[error("connection lost while running statement {index}: {source}")]
    ConnectionLost {
        /// Position of the failing statement in the batch.
        index: usize,
        /// Driver error.
        #[source]
        source: DriverError,
    },

    /// Execution was cancelled before the batch completed.
    #[error("execution cancelled before statement {index}")]
    Cancelled {
        /// Position of the first statement that did not run.
        index: usize,
    },

    /// Any other engine error, passed through.
    #[error("statement {index} failed: {source}")]
    Engine {
        /// Position of the failing statement in the batch.
        index: usize,
        /// The failing SQL.
        sql: String,
        /// Driver error.
        #[source]
        source: DriverError,
    },

    /// Schema introspection failed.
    #[error("failed to read schema metadata: {source}")]
    Catalog {
        /// Driver error.
        #[source]
        source: DriverError,
    },

    /// Invalid configuration or input document.
    #[error("configuration error: {0}")]
    Config(String),
}

impl ApplyError {
    /// Returns the structural kind of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::ReadOnlyViolation { .. } => ErrorKind::ReadOnlyViolation,
            Self::UnsupportedOperation { .. } => ErrorKind::UnsupportedOperation,
            Self::AmbiguousTarget { .. } => ErrorKind::AmbiguousTarget,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::InvalidColumn { .. } => ErrorKind::InvalidColumn,
            Self::MixedOperation => ErrorKind::MixedOperation,
            Self::ConstraintViolation { .. } => ErrorKind::ConstraintViolation,
            Self::ConnectionLost { .. } => ErrorKind::ConnectionLost,
            Self::Cancelled { .. } => ErrorKind::Cancelled,
            Self::Engine { .. } => ErrorKind::SyntaxOrEngineError,
            Self::Catalog { source } => match source.kind {
                DriverErrorKind::ConnectionLost => ErrorKind::ConnectionLost,
                DriverErrorKind::Cancelled => ErrorKind::Cancelled,
                DriverErrorKind::Constraint | DriverErrorKind::Other => {
                    ErrorKind::SyntaxOrEngineError
                }
            },
            Self::Config(_) => ErrorKind::Config,
        }
    }

    /// Wraps a driver error raised by statement `index`.
    pub(crate) fn from_driver(index: usize, sql: &str, source: DriverError) -> Self {
        match source.kind {
            DriverErrorKind::Constraint => Self::ConstraintViolation {
                index,
                sql: sql.to_string(),
                source,
            },
            DriverErrorKind::ConnectionLost => Self::ConnectionLost { index, source },
            DriverErrorKind::Cancelled => Self::Cancelled { index },
            DriverErrorKind::Other => Self::Engine {
                index,
                sql: sql.to_string(),
                source,
            },
        }
    }

    pub(crate) fn table_not_found(name: impl Into<String>) -> Self {
        Self::NotFound {
            what: "table",
            name: name.into(),
        }
    }

    pub(crate) fn column_not_found(table: &str, column: &str) -> Self {
        Self::NotFound {
            what: "column",
            name: format!("{table}.{column}"),
        }
    }
}

/// Result type for change application.
pub type Result<T> = std::result::Result<T, ApplyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_driver_errors_are_classified() {
        let err = ApplyError::from_driver(
            2,
            "INSERT INTO t VALUES (?)",
            DriverError::new(DriverErrorKind::Constraint, "UNIQUE constraint failed: t.id"),
        );
        assert_eq!(err.kind(), ErrorKind::ConstraintViolation);
        assert!(err.to_string().contains("statement 2"));
        assert!(err.to_string().contains("UNIQUE constraint failed"));

        let err = ApplyError::from_driver(
            0,
            "DELETE FROM t",
            DriverError::new(DriverErrorKind::ConnectionLost, "broken pipe"),
        );
        assert_eq!(err.kind(), ErrorKind::ConnectionLost);

        let err = ApplyError::from_driver(
            1,
            "SELEC",
            DriverError::new(DriverErrorKind::Other, "syntax error"),
        );
        assert_eq!(err.kind(), ErrorKind::SyntaxOrEngineError);
    }

    #[test]
    fn test_source_is_preserved() {
        use std::error::Error as _;

        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed");
        let err = ApplyError::from_driver(
            0,
            "DELETE FROM t",
            DriverError::with_source(DriverErrorKind::ConnectionLost, io),
        );
        let driver = err.source().unwrap();
        assert_eq!(driver.to_string(), "pipe closed");
        assert!(driver.source().is_some());
    }

    #[test]
    fn test_validation_kinds() {
        assert!(ErrorKind::ReadOnlyViolation.is_validation());
        assert!(ErrorKind::MixedOperation.is_validation());
        assert!(!ErrorKind::ConstraintViolation.is_validation());
        assert!(!ErrorKind::Cancelled.is_validation());
    }
}
