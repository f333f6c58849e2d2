//! Filter compilation: caller filters to validated, typed predicates.

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::error::ValidationError;
use crate::registry::{ColumnDefinition, ColumnRegistry, ValueType};
use crate::spec::{FilterArgument, FilterCondition, FilterOperator, FilterValue};

/// Column substitution applied to every filter before validation.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum ColumnRewrite {
    #[default]
    None,
    /// Every predicate targets this column (e.g. date-range pickers forcing
    /// `timestamp`).
    Force(String),
    /// Rename individual columns; unmapped columns pass through.
    Rename(HashMap<String, String>),
}

impl ColumnRewrite {
    pub fn apply<'a>(&'a self, column: &'a str) -> &'a str {
        match self {
            ColumnRewrite::None => column,
            ColumnRewrite::Force(target) => target,
            ColumnRewrite::Rename(map) => map.get(column).map_or(column, |s| s.as_str()),
        }
    }
}

/// Scalar comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Eq,
    Ne,
    Gt,
    Lt,
    Gte,
    Lte,
}

impl Comparison {
    /// Whether `ordering` (column value relative to operand) satisfies the comparison.
    pub fn holds(&self, ordering: Ordering) -> bool {
        match self {
            Comparison::Eq => ordering == Ordering::Equal,
            Comparison::Ne => ordering != Ordering::Equal,
            Comparison::Gt => ordering == Ordering::Greater,
            Comparison::Lt => ordering == Ordering::Less,
            Comparison::Gte => ordering != Ordering::Less,
            Comparison::Lte => ordering != Ordering::Greater,
        }
    }
}

/// Substring position for LIKE-style operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LikeMatch {
    Contains,
    StartsWith,
    EndsWith,
}

/// A predicate whose operands are known to fit its operator.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Compare(Comparison, FilterValue),
    Like {
        mode: LikeMatch,
        needle: String,
        negated: bool,
    },
    Between {
        low: FilterValue,
        high: FilterValue,
    },
    InSet {
        values: Vec<FilterValue>,
        negated: bool,
    },
    IsNull {
        negated: bool,
    },
}

/// One validated filter, bound to its registry column.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledPredicate {
    pub column: ColumnDefinition,
    pub condition: Condition,
}

/// Compare two operands of the same kind.
pub fn compare_values(a: &FilterValue, b: &FilterValue) -> Option<Ordering> {
    match (a, b) {
        (FilterValue::Number(x), FilterValue::Number(y)) => x.partial_cmp(y),
        (FilterValue::Timestamp(x), FilterValue::Timestamp(y)) => Some(x.cmp(y)),
        (FilterValue::String(x) | FilterValue::Enum(x), FilterValue::String(y) | FilterValue::Enum(y)) => {
            Some(x.cmp(y))
        }
        _ => None,
    }
}

/// Validates filters against the registry.
pub struct FilterCompiler<'a> {
    registry: &'a ColumnRegistry,
}

impl<'a> FilterCompiler<'a> {
    pub fn new(registry: &'a ColumnRegistry) -> Self {
        Self { registry }
    }

    /// Compile every filter of `table`, in order. The first invalid filter
    /// fails the whole list.
    pub fn compile(
        &self,
        table: &str,
        filters: &[FilterCondition],
        rewrite: &ColumnRewrite,
    ) -> Result<Vec<CompiledPredicate>, ValidationError> {
        filters
            .iter()
            .map(|filter| self.compile_one(table, filter, rewrite))
            .collect()
    }

    fn compile_one(
        &self,
        table: &str,
        filter: &FilterCondition,
        rewrite: &ColumnRewrite,
    ) -> Result<CompiledPredicate, ValidationError> {
        let name = rewrite.apply(&filter.column);
        let column = self.registry.lookup(table, name)?;
        let operator = filter.operator;

        for value in filter.argument.values() {
            if !value.compatible_with(column.value_type) {
                return Err(ValidationError::TypeMismatch {
                    column: column.name.clone(),
                    expected: column.value_type,
                    found: value.kind().to_string(),
                });
            }
        }

        if !operator.supports(column.value_type) {
            return Err(ValidationError::UnsupportedOperator {
                column: column.name.clone(),
                operator: operator.to_string(),
                value_type: column.value_type,
            });
        }

        let argument = if column.value_type == ValueType::Enum {
            promote_enum(column, &filter.argument)?
        } else {
            filter.argument.clone()
        };

        let condition = build_condition(column, operator, argument)?;
        Ok(CompiledPredicate {
            column: column.clone(),
            condition,
        })
    }
}

/// Check string operands against the declared variants and retag them.
fn promote_enum(
    column: &ColumnDefinition,
    argument: &FilterArgument,
) -> Result<FilterArgument, ValidationError> {
    let promote = |value: &FilterValue| match value {
        FilterValue::String(s) | FilterValue::Enum(s) if column.has_variant(s) => {
            Ok(FilterValue::Enum(s.clone()))
        }
        FilterValue::String(s) | FilterValue::Enum(s) => Err(ValidationError::TypeMismatch {
            column: column.name.clone(),
            expected: ValueType::Enum,
            found: format!("'{}', not one of {}", s, column.variants.join(", ")),
        }),
        other => Err(ValidationError::TypeMismatch {
            column: column.name.clone(),
            expected: ValueType::Enum,
            found: other.kind().to_string(),
        }),
    };

    Ok(match argument {
        FilterArgument::Empty => FilterArgument::Empty,
        FilterArgument::Single(v) => FilterArgument::Single(promote(v)?),
        FilterArgument::Range { low, high } => FilterArgument::Range {
            low: promote(low)?,
            high: promote(high)?,
        },
        FilterArgument::Set(values) => {
            FilterArgument::Set(values.iter().map(promote).collect::<Result<_, _>>()?)
        }
    })
}

fn build_condition(
    column: &ColumnDefinition,
    operator: FilterOperator,
    argument: FilterArgument,
) -> Result<Condition, ValidationError> {
    let invalid = |reason: String| ValidationError::InvalidOperand {
        column: column.name.clone(),
        operator: operator.to_string(),
        reason,
    };
    let expects = |wanted: &str, got: &FilterArgument| {
        invalid(format!("expects {}, got {}", wanted, got.arity_name()))
    };

    use FilterOperator as Op;
    match (operator, argument) {
        (Op::IsNull, FilterArgument::Empty) => Ok(Condition::IsNull { negated: false }),
        (Op::IsNotNull, FilterArgument::Empty) => Ok(Condition::IsNull { negated: true }),
        (Op::IsNull | Op::IsNotNull, other) => Err(expects("no value", &other)),

        (Op::Between, FilterArgument::Range { low, high }) => {
            match compare_values(&low, &high) {
                Some(Ordering::Greater) => {
                    Err(invalid("lower bound is greater than upper bound".into()))
                }
                _ => Ok(Condition::Between { low, high }),
            }
        }
        (Op::Between, other) => Err(expects("a range", &other)),

        (Op::AnyOf | Op::NoneOf, FilterArgument::Set(values)) => {
            if values.is_empty() {
                Err(invalid("value list is empty".into()))
            } else {
                Ok(Condition::InSet {
                    values,
                    negated: operator == Op::NoneOf,
                })
            }
        }
        (Op::AnyOf | Op::NoneOf, other) => Err(expects("a list of values", &other)),

        (Op::Contains | Op::DoesNotContain | Op::StartsWith | Op::EndsWith, FilterArgument::Single(value)) => {
            let FilterValue::String(needle) = value else {
                return Err(invalid(format!("expects a string, got {}", value.kind())));
            };
            let mode = match operator {
                Op::StartsWith => LikeMatch::StartsWith,
                Op::EndsWith => LikeMatch::EndsWith,
                _ => LikeMatch::Contains,
            };
            Ok(Condition::Like {
                mode,
                needle,
                negated: operator == Op::DoesNotContain,
            })
        }

        (Op::Eq | Op::Ne | Op::Gt | Op::Lt | Op::Gte | Op::Lte, FilterArgument::Single(value)) => {
            let comparison = match operator {
                Op::Eq => Comparison::Eq,
                Op::Ne => Comparison::Ne,
                Op::Gt => Comparison::Gt,
                Op::Lt => Comparison::Lt,
                Op::Gte => Comparison::Gte,
                _ => Comparison::Lte,
            };
            Ok(Condition::Compare(comparison, value))
        }

        (_, other) => Err(expects("a single value", &other)),
    }
}
