//! ClickHouse SQL dialect.
//!
//! ClickHouse differences from the ANSI defaults:
//! - Backtick identifier quoting
//! - Backslash escapes inside string literals
//! - `LIKE` has no `ESCAPE` clause; `\` is always the escape character
//! - Timestamps are built with `toDateTime64(..., 3, 'UTC')`

use super::helpers;
use super::SqlDialect;

/// ClickHouse SQL dialect.
#[derive(Debug, Clone, Copy)]
pub struct ClickHouse;

impl SqlDialect for ClickHouse {
    fn name(&self) -> &'static str {
        "clickhouse"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        helpers::quote_backtick(ident)
    }

    fn quote_string(&self, s: &str) -> String {
        helpers::quote_string_backslash(s)
    }

    fn format_timestamp_literal(&self, ts: &str) -> String {
        helpers::timestamp_clickhouse(ts)
    }

    fn like_escape_char(&self) -> char {
        '\\'
    }

    fn supports_like_escape_clause(&self) -> bool {
        false
    }
}
