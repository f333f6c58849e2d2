//! End-to-end tests through `QueryEngine`.

use std::sync::Arc;
use std::time::Duration;

use dashq::access::{AllowAll, ProjectGrants, QueryContext, Subject, DASHBOARD_READ};
use dashq::config::Settings;
use dashq::engine::QueryEngine;
use dashq::error::{ExecutionError, QueryError, Stage, ValidationError};
use dashq::executor::{MemoryBackend, QueryExecutor};
use dashq::planner::ColumnRewrite;
use dashq::registry::ColumnRegistry;
use dashq::spec::QuerySpec;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

fn observations() -> Value {
    json!([
        {"project_id": "p1", "id": "o1", "model": "gpt-4", "type": "GENERATION", "level": "DEFAULT",
         "start_time": "2024-03-01 09:00:00", "total_tokens": 120, "total_cost": 0.5, "latency_ms": 800},
        {"project_id": "p1", "id": "o2", "model": "gpt-4", "type": "GENERATION", "level": "ERROR",
         "start_time": "2024-03-02 09:00:00", "total_tokens": 80, "total_cost": 0.25, "latency_ms": 1200},
        {"project_id": "p1", "id": "o3", "model": "claude", "type": "GENERATION", "level": "DEFAULT",
         "start_time": "2024-03-03 09:00:00", "total_tokens": 300, "total_cost": 1.5, "latency_ms": 400},
        {"project_id": "p1", "id": "o4", "model": null, "type": "SPAN", "level": "DEFAULT",
         "start_time": "2024-03-04 09:00:00", "total_tokens": null, "total_cost": null, "latency_ms": 50},
        {"project_id": "p2", "id": "o5", "model": "gpt-4", "type": "GENERATION", "level": "DEFAULT",
         "start_time": "2024-03-01 10:00:00", "total_tokens": 9999, "total_cost": 9.0, "latency_ms": 10},
    ])
}

fn backend() -> Arc<MemoryBackend> {
    Arc::new(MemoryBackend::from_json(observations()).unwrap())
}

fn engine(backend: Arc<MemoryBackend>) -> QueryEngine {
    QueryEngine::new(
        Arc::new(ColumnRegistry::builtin()),
        Arc::new(AllowAll),
        QueryExecutor::new(backend),
    )
}

fn ctx(project: &str) -> QueryContext {
    QueryContext::new(Subject::new("analyst"), project)
}

fn spec(descriptor: Value) -> QuerySpec {
    QuerySpec::from_json(&descriptor.to_string()).unwrap()
}

async fn run(engine: &QueryEngine, project: &str, descriptor: Value) -> Result<Value, QueryError> {
    let rows = engine
        .run(
            &ctx(project),
            &spec(descriptor),
            &ColumnRewrite::None,
            &CancellationToken::new(),
        )
        .await?;
    Ok(serde_json::to_value(rows).unwrap())
}

#[tokio::test]
async fn test_generations_by_model() {
    let engine = engine(backend());
    let rows = run(
        &engine,
        "p1",
        json!({
            "table": "traces_observations",
            "select": [
                {"column": "model", "agg": null},
                {"column": "totalTokens", "agg": "SUM"},
                {"column": "latency", "agg": "MAX"},
            ],
            "filter": [
                {"column": "type", "operator": "=", "type": "string", "value": "GENERATION"},
            ],
            "groupBy": [{"type": "string", "column": "model"}],
            "orderBy": [{"column": "sumTotalTokens", "direction": "DESC"}],
        }),
    )
    .await
    .unwrap();

    assert_eq!(
        rows,
        json!([
            {"model": "claude", "sumTotalTokens": 300, "maxLatency": 400},
            {"model": "gpt-4", "sumTotalTokens": 200, "maxLatency": 1200},
        ])
    );
}

#[tokio::test]
async fn test_null_dimension_groups_sort_last() {
    let engine = engine(backend());
    let rows = run(
        &engine,
        "p1",
        json!({
            "table": "traces_observations",
            "select": [
                {"column": "model", "agg": null},
                {"column": "totalTokenCost", "agg": "SUM"},
            ],
            "groupBy": [{"column": "model"}],
        }),
    )
    .await
    .unwrap();

    assert_eq!(
        rows,
        json!([
            {"model": "claude", "sumTotalTokenCost": 1.5},
            {"model": "gpt-4", "sumTotalTokenCost": 0.75},
            {"model": null, "sumTotalTokenCost": null},
        ])
    );
}

#[tokio::test]
async fn test_date_range_with_forced_timestamp_column() {
    let engine = engine(backend());
    let rows = engine
        .run(
            &ctx("p1"),
            &spec(json!({
                "table": "traces_observations",
                "select": [{"column": "observationId", "agg": null}],
                "filter": [
                    {"column": "createdAt", "operator": "between", "type": "datetimeRange",
                     "value": ["2024-03-02T00:00:00Z", "2024-03-03T23:59:59Z"]},
                ],
                "orderBy": [{"column": "observationId", "direction": "DESC"}],
            })),
            &ColumnRewrite::Force("timestamp".into()),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(
        serde_json::to_value(rows).unwrap(),
        json!([{"observationId": "o3"}, {"observationId": "o2"}])
    );
}

#[tokio::test]
async fn test_global_aggregate_over_no_rows() {
    let engine = engine(backend());
    let rows = run(
        &engine,
        "p1",
        json!({
            "table": "traces_observations",
            "select": [
                {"column": "totalTokens", "agg": "SUM"},
                {"column": "totalTokens", "agg": "COUNT"},
            ],
            "filter": [
                {"column": "model", "operator": "=", "type": "string", "value": "nonexistent"},
            ],
        }),
    )
    .await
    .unwrap();

    assert_eq!(rows, json!([{"sumTotalTokens": null, "countTotalTokens": 0}]));
}

#[tokio::test]
async fn test_grants_scope_projects() {
    let backend = backend();
    let gate = ProjectGrants::new().grant("analyst", "p1", DASHBOARD_READ);
    let engine = QueryEngine::new(
        Arc::new(ColumnRegistry::builtin()),
        Arc::new(gate),
        QueryExecutor::new(backend.clone()),
    );
    let descriptor = json!({
        "table": "traces_observations",
        "select": [{"column": "totalTokens", "agg": "SUM"}],
    });

    let rows = run(&engine, "p1", descriptor.clone()).await.unwrap();
    assert_eq!(rows, json!([{"sumTotalTokens": 500}]));

    let err = run(&engine, "p2", descriptor).await.unwrap_err();
    assert_eq!(err.stage(), Stage::Access);
    assert!(!err.is_retriable());
    assert_eq!(backend.calls(), 1);
}

#[tokio::test]
async fn test_errors_carry_stage() {
    let engine = engine(backend());

    let err = run(
        &engine,
        "p1",
        json!({
            "table": "traces_observations",
            "select": [{"column": "model", "agg": "SUM"}],
        }),
    )
    .await
    .unwrap_err();
    assert_eq!(err.stage(), Stage::Validation);
    assert!(matches!(
        err,
        QueryError::Validation(ValidationError::NotAggregatable { .. })
    ));

    let slow = Arc::new(
        MemoryBackend::from_json(observations())
            .unwrap()
            .with_latency(Duration::from_millis(200)),
    );
    let engine = QueryEngine::new(
        Arc::new(ColumnRegistry::builtin()),
        Arc::new(AllowAll),
        QueryExecutor::new(slow).with_options(dashq::executor::ExecutorOptions {
            timeout: Duration::from_millis(10),
            ..Default::default()
        }),
    );
    let err = run(
        &engine,
        "p1",
        json!({"table": "traces_observations", "select": [{"column": "model"}]}),
    )
    .await
    .unwrap_err();
    assert_eq!(err.stage(), Stage::Execution);
    assert_eq!(
        err,
        QueryError::Execution(ExecutionError::ExecutionTimeout { timeout_ms: 10 })
    );
}

#[tokio::test]
async fn test_configured_table_end_to_end() {
    let settings = Settings::from_toml(
        r#"
[query]
max_rows = 2

[tables.billing_events]
physical_table = "analytics.billing_events"
tenant_column = "project_id"
row_key = "id"

[[tables.billing_events.columns]]
name = "plan"
physical = "plan"
type = "enum"
variants = ["free", "pro"]

[[tables.billing_events.columns]]
name = "amount"
physical = "amount_cents"
type = "number"
aggregatable = true
"#,
    )
    .unwrap();

    let backend = Arc::new(
        MemoryBackend::from_json(json!([
            {"project_id": "p1", "id": 1, "plan": "pro", "amount_cents": 2000},
            {"project_id": "p1", "id": 2, "plan": "free", "amount_cents": 0},
            {"project_id": "p1", "id": 3, "plan": "pro", "amount_cents": 2000},
        ]))
        .unwrap(),
    );
    let engine = QueryEngine::from_settings(
        &settings,
        Arc::new(settings.registry().unwrap()),
        Arc::new(AllowAll),
        backend,
    );

    let rows = run(
        &engine,
        "p1",
        json!({
            "table": "billing_events",
            "select": [{"column": "plan"}, {"column": "amount"}],
            "limit": 100,
        }),
    )
    .await
    .unwrap();

    // max_rows clamps the caller's limit; the row key breaks ties.
    assert_eq!(
        rows,
        json!([
            {"plan": "free", "amount": 0},
            {"plan": "pro", "amount": 2000},
        ])
    );
}
