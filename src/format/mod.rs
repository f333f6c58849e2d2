//! Result shaping: raw backend rows into typed, named rows.

pub mod timestamp;

use chrono::{DateTime, Utc};
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use serde_json::Value;

use crate::error::FormattingError;
use crate::executor::RawRow;
use crate::planner::{CompiledPlan, OutputColumn};
use crate::registry::ValueType;

/// A typed result value.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Null,
    Number(f64),
    String(String),
    Timestamp(DateTime<Utc>),
}

impl CellValue {
    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CellValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            CellValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<&DateTime<Utc>> {
        match self {
            CellValue::Timestamp(at) => Some(at),
            _ => None,
        }
    }
}

impl Serialize for CellValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            CellValue::Null => serializer.serialize_none(),
            // Whole numbers serialize without a fraction (`15`, not `15.0`).
            CellValue::Number(n) if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 => {
                serializer.serialize_i64(*n as i64)
            }
            CellValue::Number(n) => serializer.serialize_f64(*n),
            CellValue::String(s) => serializer.serialize_str(s),
            CellValue::Timestamp(at) => serializer.serialize_str(&timestamp::to_rfc3339(at)),
        }
    }
}

/// One output row: output names to values, in select order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResultRow {
    cells: Vec<(String, CellValue)>,
}

impl ResultRow {
    pub fn get(&self, name: &str) -> Option<&CellValue> {
        self.cells.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &CellValue)> {
        self.cells.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

impl Serialize for ResultRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.cells.len()))?;
        for (name, value) in &self.cells {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Converts positional backend rows into [`ResultRow`]s.
pub struct ResultFormatter;

impl ResultFormatter {
    /// Shape every row of `rows` per the plan's outputs. Row order is kept.
    pub fn format(plan: &CompiledPlan, rows: Vec<RawRow>) -> Result<Vec<ResultRow>, FormattingError> {
        rows.into_iter()
            .enumerate()
            .map(|(index, raw)| format_row(plan, index, raw))
            .collect()
    }
}

fn format_row(plan: &CompiledPlan, row: usize, raw: RawRow) -> Result<ResultRow, FormattingError> {
    if raw.len() != plan.outputs.len() {
        return Err(FormattingError::Arity {
            row,
            expected: plan.outputs.len(),
            found: raw.len(),
        });
    }

    let cells = plan
        .outputs
        .iter()
        .zip(raw)
        .map(|(output, value)| Ok((output.name.clone(), convert(output, row, value)?)))
        .collect::<Result<Vec<_>, FormattingError>>()?;
    Ok(ResultRow { cells })
}

fn convert(output: &OutputColumn, row: usize, value: Value) -> Result<CellValue, FormattingError> {
    if value.is_null() {
        return Ok(CellValue::Null);
    }

    let expected = output.value_type();
    let converted = match (expected, &value) {
        (ValueType::Number, Value::Number(n)) => n.as_f64().map(CellValue::Number),
        // numeric/bigint arrive as strings from some drivers
        (ValueType::Number, Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|n| n.is_finite())
            .map(CellValue::Number),
        (ValueType::String, Value::String(s)) => Some(CellValue::String(s.clone())),
        (ValueType::Enum, Value::String(s)) if output.column.has_variant(s) => {
            Some(CellValue::String(s.clone()))
        }
        (ValueType::Timestamp, _) => timestamp::parse_json(&value).map(CellValue::Timestamp),
        _ => None,
    };

    converted.ok_or_else(|| FormattingError::ValueShape {
        row,
        column: output.name.clone(),
        expected,
        found: describe(&value),
    })
}

fn describe(value: &Value) -> String {
    let text = value.to_string();
    if text.chars().count() > 40 {
        format!("{}...", text.chars().take(40).collect::<String>())
    } else {
        text
    }
}
