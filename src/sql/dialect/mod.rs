//! SQL Dialect definitions and formatting rules.
//!
//! This module provides a trait-based abstraction for SQL dialect differences.
//! Each dialect implements `SqlDialect` to handle its specific syntax:
//!
//! - Identifier quoting: `"` (PG/DuckDB), `` ` `` (ClickHouse)
//! - String literal escaping: `''` vs `\'`
//! - Timestamp literals: `TIMESTAMP '...'` vs `toDateTime64(...)`
//! - LIKE escaping: explicit `ESCAPE` clause vs implicit backslash
//!
//! # Usage
//!
//! ```ignore
//! use dashq::sql::{Dialect, SqlDialect};
//!
//! let dialect = Dialect::Postgres;
//! let quoted = dialect.quote_identifier("model");  // "model"
//! ```

mod clickhouse;
mod duckdb;
pub mod helpers;
mod postgres;

pub use clickhouse::ClickHouse;
pub use duckdb::DuckDb;
pub use postgres::Postgres;

use serde::{Deserialize, Serialize};

use super::token::TokenStream;

/// SQL dialect trait - defines how SQL constructs are rendered.
///
/// Implementations handle dialect-specific syntax differences.
/// The default implementations follow ANSI SQL where possible.
pub trait SqlDialect: std::fmt::Debug {
    /// Dialect name for display/logging.
    fn name(&self) -> &'static str;

    // =========================================================================
    // Identifier and Literal Quoting
    // =========================================================================

    /// Quote an identifier (table, column, alias).
    ///
    /// - PostgreSQL/DuckDB: `"identifier"`
    /// - ClickHouse: `` `identifier` ``
    fn quote_identifier(&self, ident: &str) -> String;

    /// Quote a string literal.
    ///
    /// Single quotes with `''` for escaping unless overridden.
    fn quote_string(&self, s: &str) -> String {
        helpers::quote_string_single(s)
    }

    /// Format a UTC timestamp literal from `YYYY-MM-DD HH:MM:SS.fff`.
    fn format_timestamp_literal(&self, ts: &str) -> String {
        helpers::timestamp_typed_literal(ts)
    }

    // =========================================================================
    // Pagination
    // =========================================================================

    /// Emit the LIMIT clause.
    fn emit_limit(&self, limit: u64) -> TokenStream {
        helpers::emit_limit_standard(limit)
    }

    // =========================================================================
    // Ordering
    // =========================================================================

    /// Whether this dialect supports NULLS FIRST/LAST in ORDER BY.
    fn supports_nulls_ordering(&self) -> bool {
        true
    }

    // =========================================================================
    // LIKE
    // =========================================================================

    /// Character used to escape `%` and `_` inside LIKE patterns.
    fn like_escape_char(&self) -> char {
        '!'
    }

    /// Whether LIKE takes an explicit `ESCAPE '<c>'` clause.
    fn supports_like_escape_clause(&self) -> bool {
        true
    }
}

/// Supported SQL dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    #[default]
    Postgres,
    DuckDb,
    ClickHouse,
}

impl Dialect {
    /// Get the dialect implementation.
    pub fn dialect(&self) -> &'static dyn SqlDialect {
        match self {
            Dialect::Postgres => &Postgres,
            Dialect::DuckDb => &DuckDb,
            Dialect::ClickHouse => &ClickHouse,
        }
    }
}

// Implement SqlDialect for Dialect enum by delegating to concrete types
impl SqlDialect for Dialect {
    fn name(&self) -> &'static str {
        self.dialect().name()
    }

    fn quote_identifier(&self, ident: &str) -> String {
        self.dialect().quote_identifier(ident)
    }

    fn quote_string(&self, s: &str) -> String {
        self.dialect().quote_string(s)
    }

    fn format_timestamp_literal(&self, ts: &str) -> String {
        self.dialect().format_timestamp_literal(ts)
    }

    fn emit_limit(&self, limit: u64) -> TokenStream {
        self.dialect().emit_limit(limit)
    }

    fn supports_nulls_ordering(&self) -> bool {
        self.dialect().supports_nulls_ordering()
    }

    fn like_escape_char(&self) -> char {
        self.dialect().like_escape_char()
    }

    fn supports_like_escape_clause(&self) -> bool {
        self.dialect().supports_like_escape_clause()
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.dialect().name())
    }
}

impl std::str::FromStr for Dialect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(Dialect::Postgres),
            "duckdb" => Ok(Dialect::DuckDb),
            "clickhouse" => Ok(Dialect::ClickHouse),
            other => Err(format!(
                "unknown dialect '{}' (expected postgres, duckdb or clickhouse)",
                other
            )),
        }
    }
}
