//! Shared helper functions for SQL dialect implementations.
//!
//! This module provides reusable building blocks that dialects can compose
//! to implement the `SqlDialect` trait with minimal duplication.

use super::super::token::{Token, TokenStream};

// =============================================================================
// Identifier Quoting
// =============================================================================

/// Quote identifier with double quotes (ANSI style).
/// Used by: Postgres, DuckDB
pub fn quote_double(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Quote identifier with backticks.
/// Used by: ClickHouse
pub fn quote_backtick(ident: &str) -> String {
    format!("`{}`", ident.replace('`', "``"))
}

// =============================================================================
// String Quoting
// =============================================================================

/// Quote string with single quotes (standard SQL).
/// Used by: Postgres, DuckDB
pub fn quote_string_single(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

/// Quote string with backslash escapes.
/// Used by: ClickHouse, where `\` is an escape character inside literals.
pub fn quote_string_backslash(s: &str) -> String {
    format!("'{}'", s.replace('\\', "\\\\").replace('\'', "\\'"))
}

// =============================================================================
// Pagination
// =============================================================================

/// Emit LIMIT n (standard SQL).
/// Used by: Postgres, DuckDB, ClickHouse
pub fn emit_limit_standard(limit: u64) -> TokenStream {
    let mut ts = TokenStream::new();
    ts.push(Token::Limit)
        .space()
        .push(Token::LitInt(i64::try_from(limit).unwrap_or(i64::MAX)));
    ts
}

// =============================================================================
// Timestamps
// =============================================================================

/// `TIMESTAMP '...'` typed literal.
/// Used by: Postgres, DuckDB
pub fn timestamp_typed_literal(ts: &str) -> String {
    format!("TIMESTAMP {}", quote_string_single(ts))
}

/// `toDateTime64('...', 3, 'UTC')`.
/// Used by: ClickHouse
pub fn timestamp_clickhouse(ts: &str) -> String {
    format!("toDateTime64({}, 3, 'UTC')", quote_string_backslash(ts))
}

// =============================================================================
// LIKE Patterns
// =============================================================================

/// Escape LIKE metacharacters (`%`, `_`, and the escape character itself).
pub fn escape_like(value: &str, escape: char) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if c == '%' || c == '_' || c == escape {
            out.push(escape);
        }
        out.push(c);
    }
    out
}
