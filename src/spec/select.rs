//! Select, group and order entries of a query descriptor.

use serde::{Deserialize, Serialize};

use crate::registry::ValueType;

/// Aggregation applied to a measure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregationKind {
    Sum,
    Count,
    Avg,
    Min,
    Max,
}

impl AggregationKind {
    /// Wire/SQL spelling (`SUM`).
    pub fn as_str(&self) -> &'static str {
        match self {
            AggregationKind::Sum => "SUM",
            AggregationKind::Count => "COUNT",
            AggregationKind::Avg => "AVG",
            AggregationKind::Min => "MIN",
            AggregationKind::Max => "MAX",
        }
    }
}

impl std::fmt::Display for AggregationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AggregationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "SUM" => Ok(AggregationKind::Sum),
            "COUNT" => Ok(AggregationKind::Count),
            "AVG" => Ok(AggregationKind::Avg),
            "MIN" => Ok(AggregationKind::Min),
            "MAX" => Ok(AggregationKind::Max),
            other => Err(format!(
                "unknown aggregation '{}' (expected SUM, COUNT, AVG, MIN or MAX)",
                other
            )),
        }
    }
}

impl Serialize for AggregationKind {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for AggregationKind {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Whether a select item is grouped on or aggregated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnRole {
    Dimension,
    Measure(AggregationKind),
}

impl ColumnRole {
    pub fn aggregation(&self) -> Option<AggregationKind> {
        match self {
            ColumnRole::Dimension => None,
            ColumnRole::Measure(kind) => Some(*kind),
        }
    }

    pub fn is_measure(&self) -> bool {
        matches!(self, ColumnRole::Measure(_))
    }
}

/// One entry of `select`.
///
/// On the wire this is `{column, agg}` with `agg: null` for dimensions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawSelectItem", into = "RawSelectItem")]
pub struct SelectItem {
    pub column: String,
    pub role: ColumnRole,
}

impl SelectItem {
    pub fn dimension(column: &str) -> Self {
        Self {
            column: column.into(),
            role: ColumnRole::Dimension,
        }
    }

    pub fn measure(column: &str, kind: AggregationKind) -> Self {
        Self {
            column: column.into(),
            role: ColumnRole::Measure(kind),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct RawSelectItem {
    column: String,
    #[serde(default, alias = "aggregation")]
    agg: Option<AggregationKind>,
}

impl From<RawSelectItem> for SelectItem {
    fn from(raw: RawSelectItem) -> Self {
        Self {
            column: raw.column,
            role: raw.agg.map_or(ColumnRole::Dimension, ColumnRole::Measure),
        }
    }
}

impl From<SelectItem> for RawSelectItem {
    fn from(item: SelectItem) -> Self {
        Self {
            column: item.column,
            agg: item.role.aggregation(),
        }
    }
}

/// Type hint carried by `groupBy` entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupKind {
    String,
    Number,
    #[serde(alias = "timestamp")]
    Datetime,
}

impl GroupKind {
    /// Whether a column of `value_type` may carry this hint.
    pub fn accepts(&self, value_type: ValueType) -> bool {
        matches!(
            (self, value_type),
            (GroupKind::String, ValueType::String | ValueType::Enum)
                | (GroupKind::Number, ValueType::Number)
                | (GroupKind::Datetime, ValueType::Timestamp)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GroupKind::String => "string",
            GroupKind::Number => "number",
            GroupKind::Datetime => "datetime",
        }
    }
}

/// One entry of `groupBy`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupByItem {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<GroupKind>,
    pub column: String,
}

impl GroupByItem {
    pub fn new(column: &str) -> Self {
        Self {
            kind: None,
            column: column.into(),
        }
    }
}

/// Sort direction on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SortDirection {
    #[default]
    #[serde(rename = "ASC", alias = "asc")]
    Asc,
    #[serde(rename = "DESC", alias = "desc")]
    Desc,
}

/// One entry of `orderBy`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderByItem {
    pub column: String,
    #[serde(default)]
    pub direction: SortDirection,
    #[serde(default, alias = "aggregation")]
    pub agg: Option<AggregationKind>,
}

impl OrderByItem {
    pub fn asc(column: &str) -> Self {
        Self {
            column: column.into(),
            direction: SortDirection::Asc,
            agg: None,
        }
    }

    pub fn desc(column: &str) -> Self {
        Self {
            column: column.into(),
            direction: SortDirection::Desc,
            agg: None,
        }
    }

    pub fn with_agg(mut self, kind: AggregationKind) -> Self {
        self.agg = Some(kind);
        self
    }
}
