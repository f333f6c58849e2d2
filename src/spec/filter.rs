//! Filter entries of a query descriptor.
//!
//! Wire shape: `{column, operator, type, value}` where `type` names the
//! value kind (`number`, `string`, `datetime`, `stringOptions`,
//! `numberOptions`, `numberRange`, `datetimeRange`, `null`).

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::format::timestamp;
use crate::registry::ValueType;

/// Comparison operators accepted in filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterOperator {
    Eq,
    Ne,
    Gt,
    Lt,
    Gte,
    Lte,
    Contains,
    DoesNotContain,
    StartsWith,
    EndsWith,
    Between,
    AnyOf,
    NoneOf,
    IsNull,
    IsNotNull,
}

impl FilterOperator {
    pub const ALL: [FilterOperator; 15] = [
        FilterOperator::Eq,
        FilterOperator::Ne,
        FilterOperator::Gt,
        FilterOperator::Lt,
        FilterOperator::Gte,
        FilterOperator::Lte,
        FilterOperator::Contains,
        FilterOperator::DoesNotContain,
        FilterOperator::StartsWith,
        FilterOperator::EndsWith,
        FilterOperator::Between,
        FilterOperator::AnyOf,
        FilterOperator::NoneOf,
        FilterOperator::IsNull,
        FilterOperator::IsNotNull,
    ];

    /// Wire spelling.
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOperator::Eq => "=",
            FilterOperator::Ne => "!=",
            FilterOperator::Gt => ">",
            FilterOperator::Lt => "<",
            FilterOperator::Gte => ">=",
            FilterOperator::Lte => "<=",
            FilterOperator::Contains => "contains",
            FilterOperator::DoesNotContain => "does not contain",
            FilterOperator::StartsWith => "starts with",
            FilterOperator::EndsWith => "ends with",
            FilterOperator::Between => "between",
            FilterOperator::AnyOf => "any of",
            FilterOperator::NoneOf => "none of",
            FilterOperator::IsNull => "is null",
            FilterOperator::IsNotNull => "is not null",
        }
    }

    /// Whether the operator is meaningful for a column of `value_type`.
    pub fn supports(&self, value_type: ValueType) -> bool {
        use FilterOperator::*;
        match self {
            Eq | Ne | IsNull | IsNotNull => true,
            Gt | Lt | Gte | Lte | Between => {
                matches!(value_type, ValueType::Number | ValueType::Timestamp)
            }
            Contains | DoesNotContain | StartsWith | EndsWith => value_type == ValueType::String,
            AnyOf | NoneOf => value_type != ValueType::Timestamp,
        }
    }
}

impl std::fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for FilterOperator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        FilterOperator::ALL
            .into_iter()
            .find(|op| op.as_str() == normalized)
            .ok_or_else(|| format!("unknown filter operator '{}'", s))
    }
}

/// A single typed operand.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Number(f64),
    String(String),
    Timestamp(DateTime<Utc>),
    /// A string already checked against an enum column's variants.
    Enum(String),
}

impl FilterValue {
    /// Kind name used in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            FilterValue::Number(_) => "number",
            FilterValue::String(_) => "string",
            FilterValue::Timestamp(_) => "datetime",
            FilterValue::Enum(_) => "enum",
        }
    }

    /// Whether a value of this kind may be compared with a column of `value_type`.
    pub fn compatible_with(&self, value_type: ValueType) -> bool {
        matches!(
            (self, value_type),
            (FilterValue::Number(_), ValueType::Number)
                | (FilterValue::Timestamp(_), ValueType::Timestamp)
                | (FilterValue::String(_), ValueType::String | ValueType::Enum)
                | (FilterValue::Enum(_), ValueType::Enum)
        )
    }
}

/// The operand(s) of a filter, by arity.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterArgument {
    Empty,
    Single(FilterValue),
    Range { low: FilterValue, high: FilterValue },
    Set(Vec<FilterValue>),
}

impl FilterArgument {
    pub fn number(value: f64) -> Self {
        FilterArgument::Single(FilterValue::Number(value))
    }

    pub fn string(value: &str) -> Self {
        FilterArgument::Single(FilterValue::String(value.into()))
    }

    pub fn timestamp(value: DateTime<Utc>) -> Self {
        FilterArgument::Single(FilterValue::Timestamp(value))
    }

    pub fn strings(values: &[&str]) -> Self {
        FilterArgument::Set(
            values
                .iter()
                .map(|v| FilterValue::String(v.to_string()))
                .collect(),
        )
    }

    pub fn number_range(low: f64, high: f64) -> Self {
        FilterArgument::Range {
            low: FilterValue::Number(low),
            high: FilterValue::Number(high),
        }
    }

    pub fn timestamp_range(low: DateTime<Utc>, high: DateTime<Utc>) -> Self {
        FilterArgument::Range {
            low: FilterValue::Timestamp(low),
            high: FilterValue::Timestamp(high),
        }
    }

    /// Every operand, in order.
    pub fn values(&self) -> Vec<&FilterValue> {
        match self {
            FilterArgument::Empty => vec![],
            FilterArgument::Single(v) => vec![v],
            FilterArgument::Range { low, high } => vec![low, high],
            FilterArgument::Set(values) => values.iter().collect(),
        }
    }

    pub fn arity_name(&self) -> &'static str {
        match self {
            FilterArgument::Empty => "no value",
            FilterArgument::Single(_) => "a single value",
            FilterArgument::Range { .. } => "a range",
            FilterArgument::Set(_) => "a list of values",
        }
    }
}

/// One entry of `filter`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "RawFilterCondition")]
pub struct FilterCondition {
    pub column: String,
    pub operator: FilterOperator,
    pub argument: FilterArgument,
}

impl FilterCondition {
    pub fn new(column: &str, operator: FilterOperator, argument: FilterArgument) -> Self {
        Self {
            column: column.into(),
            operator,
            argument,
        }
    }
}

#[derive(Deserialize)]
struct RawFilterCondition {
    column: String,
    operator: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    value: Value,
}

impl TryFrom<RawFilterCondition> for FilterCondition {
    type Error = String;

    fn try_from(raw: RawFilterCondition) -> Result<Self, Self::Error> {
        let operator: FilterOperator = raw.operator.parse()?;
        let argument = parse_argument(&raw.kind, &raw.value)
            .map_err(|reason| format!("filter on '{}': {}", raw.column, reason))?;
        Ok(Self {
            column: raw.column,
            operator,
            argument,
        })
    }
}

fn parse_argument(kind: &str, value: &Value) -> Result<FilterArgument, String> {
    match kind {
        "null" => Ok(FilterArgument::Empty),
        "number" => Ok(FilterArgument::Single(parse_number(value)?)),
        "string" => Ok(FilterArgument::Single(parse_string(value)?)),
        "datetime" => Ok(FilterArgument::Single(parse_datetime(value)?)),
        "stringOptions" => parse_list(value, parse_string),
        "numberOptions" => parse_list(value, parse_number),
        "numberRange" => parse_range(value, parse_number),
        "datetimeRange" => parse_range(value, parse_datetime),
        other => Err(format!("unknown value type '{}'", other)),
    }
}

fn parse_number(value: &Value) -> Result<FilterValue, String> {
    value
        .as_f64()
        .filter(|n| n.is_finite())
        .map(FilterValue::Number)
        .ok_or_else(|| format!("expected a number, got {}", value))
}

fn parse_string(value: &Value) -> Result<FilterValue, String> {
    value
        .as_str()
        .map(|s| FilterValue::String(s.to_string()))
        .ok_or_else(|| format!("expected a string, got {}", value))
}

fn parse_datetime(value: &Value) -> Result<FilterValue, String> {
    timestamp::parse_json(value)
        .map(FilterValue::Timestamp)
        .ok_or_else(|| format!("expected a timestamp, got {}", value))
}

fn parse_list(
    value: &Value,
    item: fn(&Value) -> Result<FilterValue, String>,
) -> Result<FilterArgument, String> {
    let items = value
        .as_array()
        .ok_or_else(|| format!("expected a list, got {}", value))?;
    let values = items.iter().map(item).collect::<Result<Vec<_>, _>>()?;
    Ok(FilterArgument::Set(values))
}

/// `[low, high]` or `{"from": low, "to": high}`.
fn parse_range(
    value: &Value,
    item: fn(&Value) -> Result<FilterValue, String>,
) -> Result<FilterArgument, String> {
    let (low, high) = match value {
        Value::Array(bounds) if bounds.len() == 2 => (&bounds[0], &bounds[1]),
        Value::Object(map) => match (map.get("from"), map.get("to")) {
            (Some(low), Some(high)) => (low, high),
            _ => return Err("range object needs 'from' and 'to'".into()),
        },
        other => return Err(format!("expected a two-element range, got {}", other)),
    };
    Ok(FilterArgument::Range {
        low: item(low)?,
        high: item(high)?,
    })
}
