//! Output column naming.

use crate::spec::AggregationKind;

/// Name under which a select item appears in result rows.
///
/// Dimensions keep their logical name. Measures become the lowercase
/// aggregation followed by the column with its first letter uppercased:
/// `SUM totalTokens` is `sumTotalTokens`, `COUNT traceId` is `countTraceId`.
pub fn output_name(column: &str, aggregation: Option<AggregationKind>) -> String {
    let Some(kind) = aggregation else {
        return column.to_string();
    };

    let prefix = kind.as_str().to_ascii_lowercase();
    let mut chars = column.chars();
    match chars.next() {
        Some(first) => format!("{}{}{}", prefix, first.to_uppercase(), chars.as_str()),
        None => prefix,
    }
}
