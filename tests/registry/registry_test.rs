//! Integration tests for the column registry.

use dashq::error::ValidationError;
use dashq::executor::memory;
use dashq::planner::AggregationPlanner;
use dashq::registry::{
    ColumnDefinition, ColumnRegistry, RegistryError, TableDefinition, ValueType,
    TRACES_OBSERVATIONS,
};
use dashq::spec::QuerySpec;
use dashq::sql::test_utils::validate_sql;
use dashq::sql::Dialect;
use serde_json::{json, Map, Value};

fn billing_events() -> TableDefinition {
    TableDefinition::new("billing_events", "analytics.billing_events")
        .with_tenant_column("project_id")
        .with_row_key("id")
        .with_columns([
            ColumnDefinition::string("customer", "customer_name"),
            ColumnDefinition::enumeration("plan", "plan", &["free", "pro", "team"]),
            ColumnDefinition::number("amount", "amount_cents").aggregatable(),
            ColumnDefinition::timestamp("billedAt", "billed_at"),
        ])
}

#[test]
fn test_builtin_observation_columns() {
    let registry = ColumnRegistry::builtin();

    let cost = registry
        .lookup(TRACES_OBSERVATIONS, "totalTokenCost")
        .unwrap();
    assert_eq!(cost.physical, "total_cost");
    assert_eq!(cost.value_type, ValueType::Number);
    assert!(cost.can_aggregate());

    let kind = registry.lookup(TRACES_OBSERVATIONS, "type").unwrap();
    assert_eq!(kind.value_type, ValueType::Enum);
    assert!(kind.has_variant("GENERATION"));
    assert!(!kind.has_variant("generation"));

    let trace = registry.lookup(TRACES_OBSERVATIONS, "traceId").unwrap();
    assert!(!trace.can_aggregate());
}

#[test]
fn test_unknown_names() {
    let registry = ColumnRegistry::builtin();

    assert_eq!(
        registry.lookup("traces", "model").unwrap_err(),
        ValidationError::UnknownTable {
            table: "traces".into()
        }
    );

    // Physical names are not logical names.
    assert_eq!(
        registry.lookup(TRACES_OBSERVATIONS, "total_tokens").unwrap_err(),
        ValidationError::UnknownColumn {
            table: TRACES_OBSERVATIONS.into(),
            column: "total_tokens".into()
        }
    );

    // Lookups are case-sensitive.
    assert!(registry.lookup(TRACES_OBSERVATIONS, "Model").is_err());
}

#[test]
fn test_list_columns_in_declaration_order() {
    let registry = ColumnRegistry::builtin().with_table(billing_events()).unwrap();

    let names: Vec<&str> = registry
        .list_columns("billing_events")
        .unwrap()
        .iter()
        .map(|c| c.name.as_str())
        .collect();
    assert_eq!(names, vec!["customer", "plan", "amount", "billedAt"]);

    assert_eq!(
        registry.table_names().collect::<Vec<_>>(),
        vec!["billing_events", TRACES_OBSERVATIONS]
    );
}

#[test]
fn test_table_from_json() {
    let table: TableDefinition = serde_json::from_str(
        r#"{
            "name": "sessions",
            "physical_table": "sessions",
            "tenant_column": "project_id",
            "columns": [
                {"name": "sessionId", "physical": "id", "type": "string"},
                {"name": "duration", "physical": "duration_ms", "type": "number", "aggregatable": true}
            ]
        }"#,
    )
    .unwrap();

    let registry = ColumnRegistry::new().with_table(table).unwrap();
    let duration = registry.lookup("sessions", "duration").unwrap();
    assert_eq!(duration.physical, "duration_ms");
    assert!(duration.can_aggregate());
    assert!(registry.table("sessions").unwrap().row_key.is_none());
}

#[test]
fn test_rejects_duplicate_table() {
    let err = ColumnRegistry::new()
        .with_table(billing_events())
        .unwrap()
        .with_table(billing_events())
        .unwrap_err();
    assert_eq!(err, RegistryError::DuplicateTable("billing_events".into()));
}

#[test]
fn test_rejects_duplicate_column() {
    let table = TableDefinition::new("t", "t").with_columns([
        ColumnDefinition::string("a", "a"),
        ColumnDefinition::number("a", "b"),
    ]);
    let err = ColumnRegistry::new().with_table(table).unwrap_err();
    assert!(matches!(err, RegistryError::DuplicateColumn { ref column, .. } if column == "a"));
}

#[test]
fn test_rejects_non_identifier_physical_expression() {
    for physical in ["total_tokens * 2", "a.b.c", "x; DROP TABLE t", "", "1col"] {
        let table =
            TableDefinition::new("t", "t").with_column(ColumnDefinition::number("x", physical));
        let err = ColumnRegistry::new().with_table(table).unwrap_err();
        assert!(
            matches!(err, RegistryError::InvalidPhysicalExpression { .. }),
            "{physical}: {err}"
        );
    }

    let table = TableDefinition::new("t", "t").with_tenant_column("project id");
    assert!(ColumnRegistry::new().with_table(table).is_err());
}

#[test]
fn test_rejects_inconsistent_columns() {
    let table = TableDefinition::new("t", "t").with_column(ColumnDefinition::new(
        "level",
        "level",
        ValueType::Enum,
    ));
    assert!(matches!(
        ColumnRegistry::new().with_table(table).unwrap_err(),
        RegistryError::EmptyVariants { .. }
    ));

    let table = TableDefinition::new("t", "t")
        .with_column(ColumnDefinition::string("name", "name").aggregatable());
    assert!(matches!(
        ColumnRegistry::new().with_table(table).unwrap_err(),
        RegistryError::AggregatableNonNumber { .. }
    ));
}

#[test]
fn test_qualified_columns_render_and_evaluate() {
    let events = TableDefinition::new("events", "analytics.events")
        .with_tenant_column("project_id")
        .with_row_key("id")
        .with_column(ColumnDefinition::enumeration("plan", "events.plan", &["free", "pro"]));
    let registry = ColumnRegistry::new().with_table(events).unwrap();
    let plan = AggregationPlanner::new(&registry)
        .plan(&QuerySpec::new("events").dimension("plan"), vec![], "p1")
        .unwrap();

    let sql = plan.to_sql(Dialect::Postgres);
    assert!(sql.contains("\"events\".\"plan\" AS \"plan\""), "{sql}");
    assert!(sql.contains("FROM \"analytics\".\"events\""), "{sql}");
    assert!(sql.contains("WHERE \"project_id\" = 'p1'"), "{sql}");
    assert!(
        sql.contains("ORDER BY \"events\".\"plan\" ASC NULLS LAST, \"id\" ASC NULLS LAST"),
        "{sql}"
    );
    validate_sql(&sql, Dialect::Postgres).unwrap();

    let records: Vec<Map<String, Value>> = [
        json!({"project_id": "p1", "id": 2, "plan": "pro"}),
        json!({"project_id": "p2", "id": 3, "plan": "free"}),
        json!({"project_id": "p1", "id": 1, "plan": "free"}),
    ]
    .iter()
    .filter_map(|r| r.as_object().cloned())
    .collect();
    assert_eq!(
        memory::evaluate(&plan, &records),
        vec![vec![json!("free")], vec![json!("pro")]]
    );

    // Selecting the row key through a qualified column needs no extra tie-breaker.
    let events = TableDefinition::new("events", "events")
        .with_row_key("id")
        .with_column(ColumnDefinition::string("eventId", "events.id"));
    let registry = ColumnRegistry::new().with_table(events).unwrap();
    let plan = AggregationPlanner::new(&registry)
        .plan(&QuerySpec::new("events").dimension("eventId"), vec![], "p1")
        .unwrap();
    assert_eq!(plan.order_by.len(), 1);
}

#[test]
fn test_rejects_qualified_scope_columns() {
    let table = TableDefinition::new("events", "events")
        .with_tenant_column("ev.project_id")
        .with_column(ColumnDefinition::string("plan", "plan"));
    assert_eq!(
        ColumnRegistry::new().with_table(table).unwrap_err(),
        RegistryError::QualifiedScopeColumn {
            table: "events".into(),
            column: "ev.project_id".into()
        }
    );

    let table = TableDefinition::new("events", "events").with_row_key("ev.id");
    assert!(matches!(
        ColumnRegistry::new().with_table(table).unwrap_err(),
        RegistryError::QualifiedScopeColumn { .. }
    ));
}

#[test]
fn test_rejects_qualifier_for_other_table() {
    let table = TableDefinition::new("t", "observations")
        .with_column(ColumnDefinition::number("cost", "o.total_cost").aggregatable());
    assert_eq!(
        ColumnRegistry::new().with_table(table).unwrap_err(),
        RegistryError::ForeignQualifier {
            table: "t".into(),
            column: "cost".into(),
            qualifier: "o".into()
        }
    );
}
