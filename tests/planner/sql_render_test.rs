//! SQL emission for compiled plans, checked against snapshots and sqlparser.

use dashq::planner::{AggregationPlanner, ColumnRewrite, CompiledPlan, FilterCompiler};
use dashq::registry::ColumnRegistry;
use dashq::spec::QuerySpec;
use dashq::sql::test_utils::validate_sql;
use dashq::sql::Dialect;
use insta::assert_snapshot;
use serde_json::{json, Value};

fn compile(descriptor: Value, project: &str) -> CompiledPlan {
    let registry = ColumnRegistry::builtin();
    let spec = QuerySpec::from_json(&descriptor.to_string()).unwrap();
    let predicates = FilterCompiler::new(&registry)
        .compile(&spec.table, &spec.filter, &ColumnRewrite::None)
        .unwrap();
    AggregationPlanner::new(&registry)
        .plan(&spec, predicates, project)
        .unwrap()
}

fn tokens_by_model() -> CompiledPlan {
    compile(
        json!({
            "table": "traces_observations",
            "select": [
                {"column": "model", "agg": null},
                {"column": "totalTokens", "agg": "SUM"},
            ],
            "filter": [
                {"column": "level", "operator": "=", "type": "string", "value": "ERROR"},
            ],
            "groupBy": [{"type": "string", "column": "model"}],
            "orderBy": [{"column": "sumTotalTokens", "direction": "DESC"}],
            "limit": 10,
        }),
        "p1",
    )
}

fn filtered_listing() -> CompiledPlan {
    compile(
        json!({
            "table": "traces_observations",
            "select": [
                {"column": "timestamp", "agg": null},
                {"column": "model", "agg": null},
            ],
            "filter": [
                {"column": "model", "operator": "starts with", "type": "string", "value": "gpt"},
                {"column": "type", "operator": "any of", "type": "stringOptions", "value": ["GENERATION"]},
                {"column": "latency", "operator": "between", "type": "numberRange", "value": [100, 250.5]},
                {"column": "userId", "operator": "is null", "type": "null"},
            ],
            "orderBy": [{"column": "timestamp", "direction": "DESC"}],
            "limit": 50,
        }),
        "p1",
    )
}

#[test]
fn test_grouped_query_postgres() {
    assert_snapshot!(tokens_by_model().to_sql(Dialect::Postgres), @r#"
    SELECT
      "model" AS "model",
      SUM("total_tokens") AS "sumTotalTokens"
    FROM "observations"
    WHERE "project_id" = 'p1' AND "level" = 'ERROR'
    GROUP BY "model"
    ORDER BY SUM("total_tokens") DESC NULLS LAST, "model" ASC NULLS LAST
    LIMIT 10
    "#);
}

#[test]
fn test_filtered_listing_postgres() {
    assert_snapshot!(filtered_listing().to_sql(Dialect::Postgres), @r#"
    SELECT
      "start_time" AS "timestamp",
      "model" AS "model"
    FROM "observations"
    WHERE "project_id" = 'p1' AND "model" LIKE 'gpt%' ESCAPE '!' AND "type" IN ('GENERATION') AND "latency_ms" BETWEEN 100 AND 250.5 AND "user_id" IS NULL
    ORDER BY "start_time" DESC NULLS LAST, "model" ASC NULLS LAST, "id" ASC NULLS LAST
    LIMIT 50
    "#);
}

#[test]
fn test_emitted_sql_parses() {
    for plan in [tokens_by_model(), filtered_listing()] {
        for dialect in [Dialect::Postgres, Dialect::DuckDb] {
            let sql = plan.to_sql(dialect);
            validate_sql(&sql, dialect).unwrap();
        }
    }
}

#[test]
fn test_timestamp_filters_render_as_typed_literals() {
    let plan = compile(
        json!({
            "table": "traces_observations",
            "select": [{"column": "model", "agg": null}],
            "filter": [
                {"column": "timestamp", "operator": ">=", "type": "datetime", "value": "2024-03-01T12:30:00Z"},
            ],
        }),
        "p1",
    );

    let sql = plan.to_sql(Dialect::Postgres);
    assert!(
        sql.contains("\"start_time\" >= TIMESTAMP '2024-03-01 12:30:00.000'"),
        "{sql}"
    );
    validate_sql(&sql, Dialect::Postgres).unwrap();

    let sql = plan.to_sql(Dialect::ClickHouse);
    assert!(
        sql.contains("`start_time` >= toDateTime64('2024-03-01 12:30:00.000', 3, 'UTC')"),
        "{sql}"
    );
}

#[test]
fn test_tenant_predicate_always_first() {
    for descriptor in [
        json!({"table": "traces_observations", "select": [{"column": "model"}]}),
        json!({
            "table": "traces_observations",
            "select": [{"column": "latency", "agg": "MAX"}],
            "filter": [{"column": "model", "operator": "=", "type": "string", "value": "x"}],
        }),
    ] {
        let sql = compile(descriptor, "tenant-42").to_sql(Dialect::Postgres);
        assert!(
            sql.contains("WHERE \"project_id\" = 'tenant-42'"),
            "{sql}"
        );
    }
}

#[test]
fn test_user_values_never_reach_sql_unescaped() {
    let plan = compile(
        json!({
            "table": "traces_observations",
            "select": [{"column": "model"}],
            "filter": [
                {"column": "model", "operator": "=", "type": "string", "value": "x'; DROP TABLE observations; --"},
            ],
        }),
        "p'1",
    );

    let sql = plan.to_sql(Dialect::Postgres);
    assert!(sql.contains("\"project_id\" = 'p''1'"), "{sql}");
    assert!(
        sql.contains("\"model\" = 'x''; DROP TABLE observations; --'"),
        "{sql}"
    );
    validate_sql(&sql, Dialect::Postgres).unwrap();
}

#[test]
fn test_clickhouse_quoting() {
    let sql = tokens_by_model().to_sql(Dialect::ClickHouse);
    assert!(sql.contains("SUM(`total_tokens`) AS `sumTotalTokens`"), "{sql}");
    assert!(sql.contains("GROUP BY `model`"), "{sql}");
}
