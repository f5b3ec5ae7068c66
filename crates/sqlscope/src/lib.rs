//! sqlscope
//!
//! Schema-aware SQL semantic validation: does this SQL only reference tables
//! and columns that exist in the connected database, and are its column
//! references in scope for the clause they appear in?
//!
//! Syntax is the parser's job. This crate works on whatever the parser accepts
//! and reports the *semantic* problems an editor should underline before the
//! query ever reaches the database.
//!
//! # Dialects
//!
//! - **PL/pgSQL** (default): validated on libpg_query's AST (feature `postgres`)
//! - **MySQL**, **T-SQL**, **PL/SQL**: validated from a `sqlparser` survey of
//!   tables, output columns and referenced identifiers
//!
//! # Example
//!
//! ```
//! use sqlscope::{Dialect, Schema, validate};
//!
//! let schema = Schema::new().with_table("users", ["id", "name"]);
//!
//! let report = validate("SELECT id FROM users", &schema, Dialect::PlPgSql);
//! assert!(report.is_valid());
//!
//! let report = validate("SELECT age FROM users", &schema, Dialect::MySql);
//! assert_eq!(
//!     report.message(),
//!     r#"Column "age" does not exist in tables "users""#
//! );
//! ```

pub mod dialect;
pub mod error;
pub mod report;
pub mod request;
pub mod resolve;
pub mod schema;
pub mod scope;
pub mod snapshot;
pub mod survey;
pub mod validate;

#[cfg(feature = "postgres")]
pub mod expr;

#[cfg(feature = "postgres")]
pub mod extract;

pub use dialect::{Dialect, resolve_dialect};
pub use error::{ScopeError, ScopeResult, ValidationError, ValidationErrorKind};
pub use report::{ValidationReport, aggregate};
pub use request::{ResponseBody, ValidateRequest, ValidateResponse, handle};
pub use resolve::{OutputColumnSource, ResolvedColumns, TextTargets, resolve_output_columns};
pub use schema::{ColumnMeta, NormalizedSchema, Schema, TableSchema};
pub use scope::{ColumnReference, RelationKind, Scope, ScopeRelation, WhereScope};
pub use snapshot::SchemaSnapshot;
pub use survey::{IdentifierSet, OutputColumn, Survey, SurveyedQuery, SurveyedTable, survey};
pub use validate::{StatementKind, ValidateOptions, validate, validate_normalized, validate_with};

#[cfg(feature = "postgres")]
pub use expr::{ExprFindings, validate_boolean_scope};

#[cfg(feature = "postgres")]
pub use resolve::AstTargets;
