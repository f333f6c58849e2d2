//! DuckDB SQL dialect.
//!
//! DuckDB is PostgreSQL-compatible for everything the plan renderer emits:
//! - ANSI identifier quoting (`"`)
//! - NULLS FIRST/LAST in ORDER BY
//! - `TIMESTAMP '...'` typed literals

use super::helpers;
use super::SqlDialect;

/// DuckDB SQL dialect.
#[derive(Debug, Clone, Copy)]
pub struct DuckDb;

impl SqlDialect for DuckDb {
    fn name(&self) -> &'static str {
        "duckdb"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        helpers::quote_double(ident)
    }
}
