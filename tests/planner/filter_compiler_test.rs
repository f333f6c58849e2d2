//! Integration tests for filter compilation from JSON descriptors.

use chrono::{TimeZone, Utc};
use dashq::error::ValidationError;
use dashq::planner::{ColumnRewrite, Comparison, Condition, FilterCompiler, LikeMatch};
use dashq::registry::{ColumnRegistry, ValueType};
use dashq::spec::{FilterValue, QuerySpec};
use serde_json::json;

fn spec(filters: serde_json::Value) -> QuerySpec {
    QuerySpec::from_json(
        &json!({
            "table": "traces_observations",
            "select": [{"column": "model", "agg": null}],
            "filter": filters,
        })
        .to_string(),
    )
    .unwrap()
}

fn compile(filters: serde_json::Value) -> Result<Vec<Condition>, ValidationError> {
    compile_with(filters, &ColumnRewrite::None)
}

fn compile_with(
    filters: serde_json::Value,
    rewrite: &ColumnRewrite,
) -> Result<Vec<Condition>, ValidationError> {
    let registry = ColumnRegistry::builtin();
    let spec = spec(filters);
    FilterCompiler::new(&registry)
        .compile(&spec.table, &spec.filter, rewrite)
        .map(|predicates| predicates.into_iter().map(|p| p.condition).collect())
}

#[test]
fn test_every_value_kind() {
    let conditions = compile(json!([
        {"column": "totalTokens", "operator": ">=", "type": "number", "value": 100},
        {"column": "model", "operator": "starts with", "type": "string", "value": "gpt-"},
        {"column": "timestamp", "operator": "<", "type": "datetime", "value": "2024-03-01T00:00:00Z"},
        {"column": "type", "operator": "any of", "type": "stringOptions", "value": ["GENERATION", "SPAN"]},
        {"column": "latency", "operator": "none of", "type": "numberOptions", "value": [0, 1]},
        {"column": "totalTokenCost", "operator": "between", "type": "numberRange", "value": [0.5, 2]},
        {"column": "startTime", "operator": "between", "type": "datetimeRange",
         "value": {"from": "2024-01-01T00:00:00Z", "to": "2024-02-01T00:00:00Z"}},
        {"column": "userId", "operator": "is not null", "type": "null"},
    ]))
    .unwrap();

    let jan = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let feb = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
    let mar = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();

    assert_eq!(
        conditions,
        vec![
            Condition::Compare(Comparison::Gte, FilterValue::Number(100.0)),
            Condition::Like {
                mode: LikeMatch::StartsWith,
                needle: "gpt-".into(),
                negated: false
            },
            Condition::Compare(Comparison::Lt, FilterValue::Timestamp(mar)),
            Condition::InSet {
                values: vec![
                    FilterValue::Enum("GENERATION".into()),
                    FilterValue::Enum("SPAN".into())
                ],
                negated: false
            },
            Condition::InSet {
                values: vec![FilterValue::Number(0.0), FilterValue::Number(1.0)],
                negated: true
            },
            Condition::Between {
                low: FilterValue::Number(0.5),
                high: FilterValue::Number(2.0)
            },
            Condition::Between {
                low: FilterValue::Timestamp(jan),
                high: FilterValue::Timestamp(feb)
            },
            Condition::IsNull { negated: true },
        ]
    );
}

#[test]
fn test_order_is_preserved() {
    let conditions = compile(json!([
        {"column": "level", "operator": "=", "type": "string", "value": "ERROR"},
        {"column": "model", "operator": "contains", "type": "string", "value": "mini"},
    ]))
    .unwrap();

    assert!(matches!(conditions[0], Condition::Compare(Comparison::Eq, FilterValue::Enum(_))));
    assert!(matches!(
        conditions[1],
        Condition::Like {
            mode: LikeMatch::Contains,
            ..
        }
    ));
}

#[test]
fn test_unknown_column() {
    let err = compile(json!([
        {"column": "cost", "operator": ">", "type": "number", "value": 1}
    ]))
    .unwrap_err();
    assert_eq!(
        err,
        ValidationError::UnknownColumn {
            table: "traces_observations".into(),
            column: "cost".into()
        }
    );
}

#[test]
fn test_first_failure_wins() {
    let err = compile(json!([
        {"column": "model", "operator": "=", "type": "string", "value": "a"},
        {"column": "totalTokens", "operator": "=", "type": "string", "value": "100"},
        {"column": "nope", "operator": "=", "type": "string", "value": "x"},
    ]))
    .unwrap_err();
    assert_eq!(
        err,
        ValidationError::TypeMismatch {
            column: "totalTokens".into(),
            expected: ValueType::Number,
            found: "string".into()
        }
    );
}

#[test]
fn test_operator_type_table() {
    let cases = [
        ("model", ">", json!({"type": "string", "value": "a"})),
        ("totalTokens", "contains", json!({"type": "number", "value": 1})),
        ("level", "starts with", json!({"type": "string", "value": "ERR"})),
        ("timestamp", "any of", json!({"type": "datetime", "value": "2024-01-01T00:00:00Z"})),
    ];

    for (column, operator, operand) in cases {
        let mut filter = operand;
        filter["column"] = json!(column);
        filter["operator"] = json!(operator);
        let err = compile(json!([filter])).unwrap_err();
        assert!(
            matches!(err, ValidationError::UnsupportedOperator { .. }),
            "{column} {operator}: {err}"
        );
    }
}

#[test]
fn test_invalid_operands() {
    let err = compile(json!([
        {"column": "latency", "operator": "between", "type": "numberRange", "value": [10, 1]}
    ]))
    .unwrap_err();
    assert_eq!(
        err.to_string(),
        "invalid operand for 'between' on column 'latency': lower bound is greater than upper bound"
    );

    let err = compile(json!([
        {"column": "model", "operator": "any of", "type": "stringOptions", "value": []}
    ]))
    .unwrap_err();
    assert!(matches!(err, ValidationError::InvalidOperand { ref reason, .. } if reason == "value list is empty"));

    let err = compile(json!([
        {"column": "latency", "operator": "=", "type": "numberRange", "value": [1, 2]}
    ]))
    .unwrap_err();
    assert!(matches!(err, ValidationError::InvalidOperand { .. }));

    let err = compile(json!([
        {"column": "model", "operator": "is null", "type": "string", "value": "x"}
    ]))
    .unwrap_err();
    assert!(matches!(err, ValidationError::InvalidOperand { .. }));
}

#[test]
fn test_enum_variants_checked() {
    let err = compile(json!([
        {"column": "level", "operator": "any of", "type": "stringOptions", "value": ["ERROR", "FATAL"]}
    ]))
    .unwrap_err();
    assert!(matches!(
        err,
        ValidationError::TypeMismatch { ref column, expected: ValueType::Enum, ref found }
            if column == "level" && found.starts_with("'FATAL'")
    ));
}

#[test]
fn test_force_rewrite_targets_timestamp() {
    // Date-range pickers send their own column name; the rewrite pins it.
    let conditions = compile_with(
        json!([
            {"column": "createdAt", "operator": ">=", "type": "datetime", "value": "2024-03-01T00:00:00Z"}
        ]),
        &ColumnRewrite::Force("timestamp".into()),
    )
    .unwrap();
    assert_eq!(conditions.len(), 1);

    let registry = ColumnRegistry::builtin();
    let spec = spec(json!([
        {"column": "createdAt", "operator": ">=", "type": "datetime", "value": "2024-03-01T00:00:00Z"}
    ]));
    let predicates = FilterCompiler::new(&registry)
        .compile(&spec.table, &spec.filter, &ColumnRewrite::Force("timestamp".into()))
        .unwrap();
    assert_eq!(predicates[0].column.physical, "start_time");
}

#[test]
fn test_malformed_filters_rejected_at_parse() {
    for filter in [
        json!({"column": "model", "operator": "resembles", "type": "string", "value": "a"}),
        json!({"column": "model", "operator": "=", "type": "blob", "value": "a"}),
        json!({"column": "latency", "operator": "=", "type": "number", "value": "fast"}),
        json!({"column": "latency", "operator": "between", "type": "numberRange", "value": [1]}),
        json!({"column": "timestamp", "operator": ">", "type": "datetime", "value": "yesterday"}),
    ] {
        let descriptor = json!({
            "table": "traces_observations",
            "select": [{"column": "model"}],
            "filter": [filter],
        });
        let err = QuerySpec::from_json(&descriptor.to_string()).unwrap_err();
        assert!(matches!(err, ValidationError::Malformed(_)), "{err}");
    }
}
