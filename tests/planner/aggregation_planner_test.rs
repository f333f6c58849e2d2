//! Integration tests for aggregation planning from JSON descriptors.

use dashq::error::ValidationError;
use dashq::planner::{
    AggregationPlanner, CompiledOrder, CompiledPlan, OrderTarget, DEFAULT_MAX_ROWS,
};
use dashq::registry::ColumnRegistry;
use dashq::spec::{AggregationKind, ColumnRole, QuerySpec, SortDirection};
use serde_json::{json, Value};

fn plan(descriptor: Value) -> Result<CompiledPlan, ValidationError> {
    let registry = ColumnRegistry::builtin();
    let spec = QuerySpec::from_json(&descriptor.to_string())?;
    AggregationPlanner::new(&registry).plan(&spec, vec![], "project-1")
}

#[test]
fn test_dashboard_widget_descriptor() {
    let plan = plan(json!({
        "from": "traces_observations",
        "select": [
            {"column": "model", "agg": null},
            {"column": "totalTokens", "agg": "SUM"},
            {"column": "latency", "agg": "AVG"},
            {"column": "latency", "agg": "MAX"},
        ],
        "groupBy": [{"type": "string", "column": "model"}],
        "orderBy": [{"column": "sumTotalTokens", "direction": "DESC"}],
        "limit": 20,
    }))
    .unwrap();

    assert_eq!(
        plan.output_names().collect::<Vec<_>>(),
        vec!["model", "sumTotalTokens", "avgLatency", "maxLatency"]
    );
    assert_eq!(
        plan.outputs[2].role,
        ColumnRole::Measure(AggregationKind::Avg)
    );
    assert!(plan.is_aggregated());
    assert_eq!(plan.group_by, vec![0]);
    assert_eq!(
        plan.order_by,
        vec![
            CompiledOrder {
                target: OrderTarget::Output(1),
                direction: SortDirection::Desc
            },
            CompiledOrder {
                target: OrderTarget::Output(0),
                direction: SortDirection::Asc
            },
        ]
    );
    assert_eq!(plan.limit, 20);
    assert_eq!(plan.physical_table, "observations");
}

#[test]
fn test_pass_through_measure_column_rejected() {
    let err = plan(json!({
        "table": "traces_observations",
        "select": [
            {"column": "model", "agg": null},
            {"column": "totalTokens", "agg": "SUM"},
            {"column": "totalTokenCost", "agg": null},
        ],
        "groupBy": [{"column": "model"}],
    }))
    .unwrap_err();

    assert_eq!(
        err,
        ValidationError::GroupByMismatch {
            column: "totalTokenCost".into(),
            reason: "selected without aggregation but missing from groupBy".into()
        }
    );
}

#[test]
fn test_multi_dimension_grouping() {
    let plan = plan(json!({
        "table": "traces_observations",
        "select": [
            {"column": "timestamp", "agg": null},
            {"column": "model", "agg": null},
            {"column": "traceId", "agg": null},
            {"column": "totalTokenCost", "agg": "sum"},
        ],
        "groupBy": [
            {"type": "datetime", "column": "timestamp"},
            {"type": "string", "column": "model"},
            {"type": "string", "column": "traceId"},
            {"column": "model"},
        ],
    }))
    .unwrap();

    // Duplicate groupBy entries collapse; every dimension gets a tie-breaker.
    assert_eq!(plan.group_by, vec![0, 1, 2]);
    let targets: Vec<_> = plan.order_by.iter().map(|o| o.target.clone()).collect();
    assert_eq!(
        targets,
        vec![
            OrderTarget::Output(0),
            OrderTarget::Output(1),
            OrderTarget::Output(2)
        ]
    );
}

#[test]
fn test_group_by_type_hint_mismatch() {
    let err = plan(json!({
        "table": "traces_observations",
        "select": [
            {"column": "timestamp", "agg": null},
            {"column": "totalTokens", "agg": "SUM"},
        ],
        "groupBy": [{"type": "number", "column": "timestamp"}],
    }))
    .unwrap_err();
    assert!(matches!(err, ValidationError::TypeMismatch { ref column, .. } if column == "timestamp"));
}

#[test]
fn test_count_requires_aggregatable_column() {
    let err = plan(json!({
        "table": "traces_observations",
        "select": [{"column": "traceId", "agg": "COUNT"}],
    }))
    .unwrap_err();
    assert_eq!(err.to_string(), "column 'traceId' cannot be aggregated with COUNT");

    let plan = plan(json!({
        "table": "traces_observations",
        "select": [{"column": "totalTokens", "agg": "COUNT"}],
    }))
    .unwrap();
    assert_eq!(plan.outputs[0].name, "countTotalTokens");
}

#[test]
fn test_order_by_with_agg_and_lowercase_direction() {
    let plan = plan(json!({
        "table": "traces_observations",
        "select": [
            {"column": "model", "agg": null},
            {"column": "latency", "agg": "AVG"},
        ],
        "groupBy": [{"column": "model"}],
        "orderBy": [
            {"column": "latency", "agg": "AVG", "direction": "desc"},
            {"column": "model"},
        ],
    }))
    .unwrap();
    assert_eq!(
        plan.order_by,
        vec![
            CompiledOrder {
                target: OrderTarget::Output(1),
                direction: SortDirection::Desc
            },
            CompiledOrder {
                target: OrderTarget::Output(0),
                direction: SortDirection::Asc
            },
        ]
    );
}

#[test]
fn test_order_by_unselected_aggregate() {
    let err = plan(json!({
        "table": "traces_observations",
        "select": [
            {"column": "model", "agg": null},
            {"column": "latency", "agg": "AVG"},
        ],
        "groupBy": [{"column": "model"}],
        "orderBy": [{"column": "latency", "agg": "MAX"}],
    }))
    .unwrap_err();
    assert_eq!(
        err,
        ValidationError::UnknownOrderColumn {
            column: "maxLatency".into()
        }
    );
}

#[test]
fn test_raw_listing_tie_breaks_on_row_key() {
    let plan = plan(json!({
        "table": "traces_observations",
        "select": [
            {"column": "timestamp", "agg": null},
            {"column": "model", "agg": null},
        ],
        "orderBy": [{"column": "timestamp", "direction": "DESC"}],
    }))
    .unwrap();

    assert!(!plan.is_aggregated());
    assert_eq!(
        plan.order_by,
        vec![
            CompiledOrder {
                target: OrderTarget::Output(0),
                direction: SortDirection::Desc
            },
            CompiledOrder {
                target: OrderTarget::Output(1),
                direction: SortDirection::Asc
            },
            CompiledOrder {
                target: OrderTarget::RowKey("id".into()),
                direction: SortDirection::Asc
            },
        ]
    );
}

#[test]
fn test_limit_resolution() {
    let select = json!([{"column": "model", "agg": null}]);

    let p = plan(json!({"table": "traces_observations", "select": select.clone(), "limit": null})).unwrap();
    assert_eq!(p.limit, DEFAULT_MAX_ROWS);

    let p = plan(json!({"table": "traces_observations", "select": select.clone(), "limit": 1_000_000})).unwrap();
    assert_eq!(p.limit, DEFAULT_MAX_ROWS);

    let p = plan(json!({"table": "traces_observations", "select": select.clone(), "limit": 1})).unwrap();
    assert_eq!(p.limit, 1);

    let err = plan(json!({"table": "traces_observations", "select": select.clone(), "limit": -3})).unwrap_err();
    assert_eq!(err, ValidationError::InvalidLimit { limit: -3 });
}

#[test]
fn test_tenant_scope_from_registry() {
    let p = plan(json!({
        "table": "traces_observations",
        "select": [{"column": "model"}],
    }))
    .unwrap();
    let tenant = p.tenant.unwrap();
    assert_eq!(tenant.column, "project_id");
    assert_eq!(tenant.project_id, "project-1");
}

#[test]
fn test_malformed_descriptors() {
    for descriptor in [
        json!({"select": [{"column": "model"}]}),
        json!({"table": "traces_observations", "select": [{"column": "latency", "agg": "MEDIAN"}]}),
        json!({"table": "traces_observations", "select": [{"column": "model"}], "limit": "ten"}),
        json!({"table": "traces_observations", "select": [{"column": "model"}],
               "orderBy": [{"column": "model", "direction": "sideways"}]}),
    ] {
        assert!(matches!(
            plan(descriptor).unwrap_err(),
            ValidationError::Malformed(_)
        ));
    }
}
