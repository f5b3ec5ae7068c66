//! SQL dialects and dialect-name resolution.
//!
//! Callers hand us dialect names from two universes: the editor's internal
//! short codes (`PLpgSQL`, `MYSQL`, `TSQL`, `PLSQL`) and the lowercase names
//! an external service uses (`postgresql`, `mysql`, `mssql`, `oracle`).
//! [`resolve_dialect`] is total and falls back to the Postgres family;
//! [`Dialect::from_str`] is the strict variant.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ScopeError;

/// Supported SQL grammars, named after the parser taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Dialect {
    /// Postgres family.
    #[default]
    #[serde(rename = "PLpgSQL")]
    PlPgSql,
    #[serde(rename = "MYSQL")]
    MySql,
    /// SQL Server.
    #[serde(rename = "TSQL")]
    TSql,
    /// Oracle.
    #[serde(rename = "PLSQL")]
    PlSql,
}

impl Dialect {
    pub const ALL: [Dialect; 4] = [Dialect::PlPgSql, Dialect::MySql, Dialect::TSql, Dialect::PlSql];

    /// Internal short code.
    pub fn code(self) -> &'static str {
        match self {
            Dialect::PlPgSql => "PLpgSQL",
            Dialect::MySql => "MYSQL",
            Dialect::TSql => "TSQL",
            Dialect::PlSql => "PLSQL",
        }
    }

    /// External (service-side) lowercase name.
    pub fn service_name(self) -> &'static str {
        match self {
            Dialect::PlPgSql => "postgresql",
            Dialect::MySql => "mysql",
            Dialect::TSql => "mssql",
            Dialect::PlSql => "oracle",
        }
    }

    /// Markers that start a line comment in this dialect.
    pub fn line_comment_markers(self) -> &'static [&'static str] {
        match self {
            Dialect::MySql => &["--", "#"],
            _ => &["--"],
        }
    }

    /// True when `content` starts (after leading whitespace) with a line comment.
    pub fn starts_with_line_comment(self, content: &str) -> bool {
        let trimmed = content.trim_start();
        self.line_comment_markers()
            .iter()
            .any(|m| trimmed.starts_with(m))
    }

    /// Whether this dialect is validated through libpg_query's AST.
    pub fn uses_ast(self) -> bool {
        cfg!(feature = "postgres") && self == Dialect::PlPgSql
    }

    pub(crate) fn sqlparser_dialect(self) -> Box<dyn sqlparser::dialect::Dialect> {
        use sqlparser::dialect::{GenericDialect, MsSqlDialect, MySqlDialect, PostgreSqlDialect};

        match self {
            Dialect::PlPgSql => Box::new(PostgreSqlDialect {}),
            Dialect::MySql => Box::new(MySqlDialect {}),
            Dialect::TSql => Box::new(MsSqlDialect {}),
            Dialect::PlSql => Box::new(GenericDialect {}),
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Strict parse: accepts a short code or a service name (ASCII case-insensitive).
impl FromStr for Dialect {
    type Err = ScopeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Dialect::ALL
            .into_iter()
            .find(|d| s.eq_ignore_ascii_case(d.code()) || s.eq_ignore_ascii_case(d.service_name()))
            .or_else(|| match s.to_ascii_lowercase().as_str() {
                "postgres" | "pg" => Some(Dialect::PlPgSql),
                "sqlserver" => Some(Dialect::TSql),
                _ => None,
            })
            .ok_or_else(|| ScopeError::UnknownDialect(s.to_string()))
    }
}

/// Map a caller-supplied dialect identifier onto a [`Dialect`].
///
/// Never fails: anything unrecognized resolves to [`Dialect::PlPgSql`].
pub fn resolve_dialect(raw: &str, from_external_service: bool) -> Dialect {
    if from_external_service {
        return match raw {
            "mysql" => Dialect::MySql,
            "oracle" => Dialect::PlSql,
            "mssql" => Dialect::TSql,
            _ => Dialect::PlPgSql,
        };
    }

    Dialect::ALL
        .into_iter()
        .find(|d| raw == d.code())
        .unwrap_or_default()
}
