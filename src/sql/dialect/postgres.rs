//! PostgreSQL SQL dialect.
//!
//! PostgreSQL features used by the plan renderer:
//! - ANSI identifier quoting (`"`)
//! - NULLS FIRST/LAST in ORDER BY
//! - `LIKE ... ESCAPE '!'`
//! - `TIMESTAMP '...'` typed literals

use super::helpers;
use super::SqlDialect;

/// PostgreSQL SQL dialect.
#[derive(Debug, Clone, Copy)]
pub struct Postgres;

impl SqlDialect for Postgres {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        helpers::quote_double(ident)
    }

    // Uses default emit_limit (LIMIT n)
    // Uses default LIKE escape ('!' with explicit ESCAPE clause)
}
