//! In-process reference backend.
//!
//! Evaluates a [`CompiledPlan`] directly over JSON rows keyed by physical
//! column name, with SQL semantics: comparisons against NULL are false,
//! aggregates skip NULLs, and NULLs sort last. The rendered SQL text is
//! ignored.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::BackendError;
use crate::format::timestamp;
use crate::planner::{
    CompiledPlan, CompiledPredicate, Condition, LikeMatch, OrderTarget, OutputColumn,
};
use crate::registry::{ColumnDefinition, ValueType};
use crate::spec::{AggregationKind, ColumnRole, FilterValue, SortDirection};

use super::{BackendRequest, QueryBackend, RawRow};

type Record = Map<String, Value>;

/// A dataset held in memory.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    rows: Vec<Record>,
    latency: Option<Duration>,
    failure: Option<BackendError>,
    calls: AtomicUsize,
}

impl MemoryBackend {
    pub fn new(rows: Vec<Record>) -> Self {
        Self {
            rows,
            ..Self::default()
        }
    }

    /// Build from a JSON array of objects.
    pub fn from_json(rows: Value) -> Result<Self, BackendError> {
        let Value::Array(items) = rows else {
            return Err(BackendError::Failed("dataset must be a JSON array".into()));
        };
        let rows = items
            .into_iter()
            .map(|item| match item {
                Value::Object(map) => Ok(map),
                other => Err(BackendError::Failed(format!(
                    "dataset rows must be objects, got {}",
                    other
                ))),
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(rows))
    }

    /// Delay every fetch by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Fail every fetch with `error`.
    pub fn failing_with(mut self, error: BackendError) -> Self {
        self.failure = Some(error);
        self
    }

    /// Number of fetches started so far.
    pub fn calls(&self) -> usize {
        self.calls.load(AtomicOrdering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[async_trait]
impl QueryBackend for MemoryBackend {
    async fn fetch(&self, request: BackendRequest<'_>) -> Result<Vec<RawRow>, BackendError> {
        self.calls.fetch_add(1, AtomicOrdering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if let Some(err) = &self.failure {
            return Err(err.clone());
        }
        Ok(evaluate(request.plan, &self.rows))
    }
}

/// A projected row plus the row key used as the raw-listing tie-breaker.
struct Projected {
    values: RawRow,
    row_key: Value,
}

/// Run `plan` over `rows`.
pub fn evaluate(plan: &CompiledPlan, rows: &[Record]) -> Vec<RawRow> {
    let matching: Vec<&Record> = rows.iter().filter(|row| matches(plan, row)).collect();

    let mut projected = if plan.is_aggregated() {
        aggregate(plan, &matching)
    } else {
        let key = plan.order_by.iter().find_map(|o| match &o.target {
            OrderTarget::RowKey(key) => Some(key.as_str()),
            OrderTarget::Output(_) => None,
        });
        matching
            .iter()
            .map(|row| Projected {
                values: plan.outputs.iter().map(|o| cell(row, &o.column)).collect(),
                row_key: key
                    .and_then(|k| row.get(k))
                    .cloned()
                    .unwrap_or(Value::Null),
            })
            .collect()
    };

    projected.sort_by(|a, b| {
        for order in &plan.order_by {
            let (x, y, value_type) = match &order.target {
                OrderTarget::Output(i) => {
                    (&a.values[*i], &b.values[*i], Some(plan.outputs[*i].value_type()))
                }
                OrderTarget::RowKey(_) => (&a.row_key, &b.row_key, None),
            };
            let ordering = compare_nulls_last(x, y, value_type, order.direction);
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });

    projected
        .into_iter()
        .take(plan.limit as usize)
        .map(|p| p.values)
        .collect()
}

fn cell(row: &Record, column: &ColumnDefinition) -> Value {
    let (_, name) = column.physical_parts();
    row.get(name).cloned().unwrap_or(Value::Null)
}

fn matches(plan: &CompiledPlan, row: &Record) -> bool {
    if let Some(tenant) = &plan.tenant {
        if row.get(&tenant.column).and_then(Value::as_str) != Some(tenant.project_id.as_str()) {
            return false;
        }
    }
    plan.predicates.iter().all(|p| holds(p, row))
}

fn holds(predicate: &CompiledPredicate, row: &Record) -> bool {
    let value = cell(row, &predicate.column);
    if let Condition::IsNull { negated } = predicate.condition {
        return value.is_null() != negated;
    }
    if value.is_null() {
        return false;
    }

    match &predicate.condition {
        Condition::Compare(comparison, operand) => {
            compare_cell(&value, operand).is_some_and(|o| comparison.holds(o))
        }
        Condition::Like {
            mode,
            needle,
            negated,
        } => {
            let Some(text) = value.as_str() else {
                return false;
            };
            let found = match mode {
                LikeMatch::Contains => text.contains(needle.as_str()),
                LikeMatch::StartsWith => text.starts_with(needle.as_str()),
                LikeMatch::EndsWith => text.ends_with(needle.as_str()),
            };
            found != *negated
        }
        Condition::Between { low, high } => {
            compare_cell(&value, low).is_some_and(|o| o != Ordering::Less)
                && compare_cell(&value, high).is_some_and(|o| o != Ordering::Greater)
        }
        Condition::InSet { values, negated } => {
            let found = values
                .iter()
                .any(|v| compare_cell(&value, v) == Some(Ordering::Equal));
            found != *negated
        }
        Condition::IsNull { .. } => false,
    }
}

/// Order a stored cell relative to a filter operand.
fn compare_cell(cell: &Value, operand: &FilterValue) -> Option<Ordering> {
    match operand {
        FilterValue::Number(n) => as_number(cell)?.partial_cmp(n),
        FilterValue::String(s) | FilterValue::Enum(s) => Some(cell.as_str()?.cmp(s.as_str())),
        FilterValue::Timestamp(at) => Some(timestamp::parse_json(cell)?.cmp(at)),
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// A grouping value normalised by column type, so `1` and `1.0`, or one
/// instant written in two accepted timestamp shapes, fall into one group.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum GroupKey {
    Null,
    Number(u64),
    Timestamp(i64),
    Text(String),
}

impl GroupKey {
    fn new(value: &Value, value_type: ValueType) -> Self {
        if value.is_null() {
            return GroupKey::Null;
        }
        let typed = match value_type {
            ValueType::Number => as_number(value).map(|n| {
                // -0.0 and 0.0 are one value
                let n = if n == 0.0 { 0.0 } else { n };
                GroupKey::Number(n.to_bits())
            }),
            ValueType::Timestamp => timestamp::parse_json(value)
                .and_then(|at| at.timestamp_nanos_opt())
                .map(GroupKey::Timestamp),
            ValueType::String | ValueType::Enum => None,
        };
        typed.unwrap_or_else(|| match value {
            Value::String(s) => GroupKey::Text(s.clone()),
            other => GroupKey::Text(other.to_string()),
        })
    }
}

fn aggregate(plan: &CompiledPlan, rows: &[&Record]) -> Vec<Projected> {
    let group_columns: Vec<&OutputColumn> = plan.group_by.iter().map(|&i| &plan.outputs[i]).collect();

    // First-seen group order.
    let mut groups: Vec<Vec<&Record>> = Vec::new();
    let mut index: HashMap<Vec<GroupKey>, usize> = HashMap::new();
    for &row in rows {
        let key: Vec<GroupKey> = group_columns
            .iter()
            .map(|o| GroupKey::new(&cell(row, &o.column), o.value_type()))
            .collect();
        let slot = *index.entry(key).or_insert_with(|| {
            groups.push(Vec::new());
            groups.len() - 1
        });
        groups[slot].push(row);
    }

    // A global aggregate yields one row even over no input.
    if groups.is_empty() && group_columns.is_empty() {
        groups.push(Vec::new());
    }

    groups
        .into_iter()
        .map(|members| Projected {
            values: plan
                .outputs
                .iter()
                .map(|output| match output.role {
                    ColumnRole::Dimension => members
                        .first()
                        .map(|row| cell(row, &output.column))
                        .unwrap_or(Value::Null),
                    ColumnRole::Measure(kind) => measure(kind, &output.column, &members),
                })
                .collect(),
            row_key: Value::Null,
        })
        .collect()
}

fn measure(kind: AggregationKind, column: &ColumnDefinition, rows: &[&Record]) -> Value {
    let cells: Vec<Value> = rows
        .iter()
        .map(|row| cell(row, column))
        .filter(|v| !v.is_null())
        .collect();

    if kind == AggregationKind::Count {
        return Value::from(cells.len() as u64);
    }

    let numbers: Vec<f64> = cells.iter().filter_map(as_number).collect();
    if numbers.is_empty() {
        return Value::Null;
    }
    let result = match kind {
        AggregationKind::Sum => numbers.iter().sum(),
        AggregationKind::Avg => numbers.iter().sum::<f64>() / numbers.len() as f64,
        AggregationKind::Min => numbers.iter().copied().fold(f64::INFINITY, f64::min),
        AggregationKind::Max => numbers.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        AggregationKind::Count => numbers.len() as f64,
    };
    number_value(result)
}

fn number_value(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
        Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}

/// NULLs last in both directions; direction applies to non-null values only.
fn compare_nulls_last(
    a: &Value,
    b: &Value,
    value_type: Option<ValueType>,
    direction: SortDirection,
) -> Ordering {
    let ordering = match (a.is_null(), b.is_null()) {
        (true, true) => return Ordering::Equal,
        (true, false) => return Ordering::Greater,
        (false, true) => return Ordering::Less,
        (false, false) => compare_typed(a, b, value_type),
    };
    match direction {
        SortDirection::Asc => ordering,
        SortDirection::Desc => ordering.reverse(),
    }
}

/// Compare two non-null cells as values of `value_type`, the way the
/// formatter reads them. Cells that do not parse fall back to [`compare_json`].
fn compare_typed(a: &Value, b: &Value, value_type: Option<ValueType>) -> Ordering {
    let typed = match value_type {
        Some(ValueType::Number) => match (as_number(a), as_number(b)) {
            (Some(x), Some(y)) => x.partial_cmp(&y),
            _ => None,
        },
        Some(ValueType::Timestamp) => match (timestamp::parse_json(a), timestamp::parse_json(b)) {
            (Some(x), Some(y)) => Some(x.cmp(&y)),
            _ => None,
        },
        Some(ValueType::String | ValueType::Enum) | None => None,
    };
    typed.unwrap_or_else(|| compare_json(a, b))
}

/// Total order over raw JSON: numbers, then strings, then everything else.
fn compare_json(a: &Value, b: &Value) -> Ordering {
    fn rank(v: &Value) -> u8 {
        match v {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) => 4,
            Value::Object(_) => 5,
        }
    }
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.total_cmp(&y)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}
