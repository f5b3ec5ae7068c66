//! Error types for sqlscope

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for sqlscope operations that can fail operationally
/// (loading snapshots, strict dialect parsing).
pub type ScopeResult<T> = Result<T, ScopeError>;

/// Operational error type. Validation findings are never reported through
/// this type; see [`ValidationError`].
#[derive(Debug, Error)]
pub enum ScopeError {
    /// A dialect name that matches neither naming convention.
    #[error("Unknown dialect: {0}")]
    UnknownDialect(String),
    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// IO error (snapshot files).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Anything else.
    #[error("{0}")]
    Other(String),
}

/// A single validation finding.
///
/// Rendered to text only at the boundary (see [`crate::ValidationReport::message`]).
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidationError {
    #[error("Table \"{name}\" does not exist in schema")]
    TableNotFound { name: String },

    #[error("Column \"{column}\" does not exist in schema")]
    ColumnNotFoundInSchema { column: String },

    #[error("Column \"{column}\" does not exist in tables \"{}\"", .tables.join(", "))]
    ColumnNotFoundInTables { column: String, tables: Vec<String> },

    /// Forwarded verbatim from the parser.
    #[error("{message}")]
    ParserFailure { message: String },

    /// The parser produced no statement and the input is not a bare comment.
    #[error("Invalid query")]
    InvalidQuery,
}

/// Discriminant of [`ValidationError`], for matching on error kind without
/// comparing strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationErrorKind {
    TableNotFound,
    ColumnNotFoundInSchema,
    ColumnNotFoundInTables,
    ParserFailure,
    InvalidQuery,
}

impl ValidationError {
    pub fn table_not_found(name: impl Into<String>) -> Self {
        Self::TableNotFound { name: name.into() }
    }

    pub fn column_not_found_in_schema(column: impl Into<String>) -> Self {
        Self::ColumnNotFoundInSchema {
            column: column.into(),
        }
    }

    pub fn column_not_found_in_tables(column: impl Into<String>, tables: Vec<String>) -> Self {
        Self::ColumnNotFoundInTables {
            column: column.into(),
            tables,
        }
    }

    pub fn parser_failure(message: impl Into<String>) -> Self {
        Self::ParserFailure {
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ValidationErrorKind {
        match self {
            Self::TableNotFound { .. } => ValidationErrorKind::TableNotFound,
            Self::ColumnNotFoundInSchema { .. } => ValidationErrorKind::ColumnNotFoundInSchema,
            Self::ColumnNotFoundInTables { .. } => ValidationErrorKind::ColumnNotFoundInTables,
            Self::ParserFailure { .. } => ValidationErrorKind::ParserFailure,
            Self::InvalidQuery => ValidationErrorKind::InvalidQuery,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_messages() {
        assert_eq!(
            ValidationError::table_not_found("accounts").to_string(),
            r#"Table "accounts" does not exist in schema"#
        );
        assert_eq!(
            ValidationError::column_not_found_in_tables(
                "age",
                vec!["users".to_string(), "orders".to_string()]
            )
            .to_string(),
            r#"Column "age" does not exist in tables "users, orders""#
        );
        assert_eq!(ValidationError::InvalidQuery.to_string(), "Invalid query");
        assert_eq!(
            ValidationError::parser_failure("syntax error at or near \"FORM\"").to_string(),
            "syntax error at or near \"FORM\""
        );
    }

    #[test]
    fn serializes_with_kind_tag() {
        let json = serde_json::to_value(ValidationError::column_not_found_in_schema("x")).unwrap();
        assert_eq!(json["kind"], "column_not_found_in_schema");
        assert_eq!(json["column"], "x");
    }
}
