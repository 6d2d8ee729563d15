//! Error types for migration planning and execution.

use thiserror::Error;

use crate::dialect::Dialect;

/// A feature an index declaration may require from the target dialect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Feature {
    /// Index built over computed expressions.
    FunctionalIndex,
    /// Index with an explicit access-method tag (e.g. `HASH`).
    IndexType(String),
    /// `UNIQUE` on an index of the given access method.
    UniqueIndexType(String),
    /// More than one key part in an index of the given access method.
    MultiColumnIndexType(String),
}

impl std::fmt::Display for Feature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Feature::FunctionalIndex => write!(f, "functional indices"),
            Feature::IndexType(tag) => write!(f, "{} indices", tag),
            Feature::UniqueIndexType(tag) => write!(f, "unique {} indices", tag),
            Feature::MultiColumnIndexType(tag) => write!(f, "multi-column {} indices", tag),
        }
    }
}

/// Errors surfaced by the planner.
///
/// Nothing here is retried by the crate; callers decide what to do.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// A catalog query failed (connection or permission problem).
    #[error("failed to introspect indices of `{table}`: {source}")]
    IntrospectionFailure {
        table: String,
        #[source]
        source: sqlx::Error,
    },

    /// A declared index needs something the target dialect cannot express.
    #[error("{dialect} does not support {feature} (index `{index}` on `{table}`)")]
    UnsupportedFeature {
        dialect: Dialect,
        feature: Feature,
        table: String,
        index: String,
    },

    /// The database rejected a statement. Statements after it were not run.
    #[error("statement #{position} was rejected: {sql}: {source}")]
    ExecutionFailure {
        position: usize,
        sql: String,
        #[source]
        source: sqlx::Error,
    },

    /// The table declaration is inconsistent.
    #[error("invalid definition of table `{table}`: {reason}")]
    InvalidDefinition { table: String, reason: String },

    /// A dialect name or connection URL was not recognised.
    #[error("unknown dialect `{0}`")]
    UnknownDialect(String),
}

impl MigrationError {
    pub(crate) fn invalid(table: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidDefinition {
            table: table.into(),
            reason: reason.into(),
        }
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, MigrationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_feature_display() {
        let err = MigrationError::UnsupportedFeature {
            dialect: Dialect::Sqlite,
            feature: Feature::IndexType("HASH".to_string()),
            table: "test_table".to_string(),
            index: "test_table_by_name".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "SQLite does not support HASH indices (index `test_table_by_name` on `test_table`)"
        );
    }

    #[test]
    fn test_hash_restriction_display() {
        let err = MigrationError::UnsupportedFeature {
            dialect: Dialect::PostgreSql,
            feature: Feature::UniqueIndexType("HASH".to_string()),
            table: "t".to_string(),
            index: "u_hash".to_string(),
        };
        assert_eq!(err.to_string(), "PostgreSQL does not support unique HASH indices (index `u_hash` on `t`)");
        assert_eq!(Feature::MultiColumnIndexType("HASH".to_string()).to_string(), "multi-column HASH indices");
    }

    #[test]
    fn test_execution_failure_keeps_source() {
        let err = MigrationError::ExecutionFailure {
            position: 2,
            sql: "DROP INDEX missing".to_string(),
            source: sqlx::Error::Protocol("no such index: missing".to_string()),
        };
        assert!(err.to_string().starts_with("statement #2 was rejected: DROP INDEX missing"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
