//! Per-request orchestration.
//!
//! A request moves through `Received → Validated → Planned → Executed →
//! Formatted`. Any failure short-circuits with a [`QueryError`] tagged by
//! the stage that produced it. Nothing is persisted between requests.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info_span, Instrument};

use crate::access::{AccessGate, QueryContext, ResourceScope};
use crate::config::Settings;
use crate::error::{QueryError, QueryResult};
use crate::executor::{QueryBackend, QueryExecutor};
use crate::format::{ResultFormatter, ResultRow};
use crate::planner::{AggregationPlanner, ColumnRewrite, CompiledPlan, FilterCompiler, DEFAULT_MAX_ROWS};
use crate::registry::ColumnRegistry;
use crate::spec::QuerySpec;

/// Lifecycle of a single dashboard query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryState {
    Received,
    /// Access granted and every filter compiled against the registry.
    Validated,
    Planned,
    Executed,
    Formatted,
}

/// Entry point for dashboard queries.
#[derive(Clone)]
pub struct QueryEngine {
    registry: Arc<ColumnRegistry>,
    gate: Arc<dyn AccessGate>,
    executor: QueryExecutor,
    max_rows: u64,
}

impl QueryEngine {
    pub fn new(
        registry: Arc<ColumnRegistry>,
        gate: Arc<dyn AccessGate>,
        executor: QueryExecutor,
    ) -> Self {
        Self {
            registry,
            gate,
            executor,
            max_rows: DEFAULT_MAX_ROWS,
        }
    }

    /// Wire an engine from loaded settings.
    pub fn from_settings(
        settings: &Settings,
        registry: Arc<ColumnRegistry>,
        gate: Arc<dyn AccessGate>,
        backend: Arc<dyn QueryBackend>,
    ) -> Self {
        let executor = QueryExecutor::new(backend).with_options(settings.query.executor_options());
        Self::new(registry, gate, executor).with_max_rows(settings.query.max_rows)
    }

    pub fn with_max_rows(mut self, max_rows: u64) -> Self {
        self.max_rows = max_rows.max(1);
        self
    }

    pub fn registry(&self) -> &ColumnRegistry {
        &self.registry
    }

    pub fn executor(&self) -> &QueryExecutor {
        &self.executor
    }

    /// Authorize, validate and plan without touching the backend.
    pub fn compile(
        &self,
        ctx: &QueryContext,
        spec: &QuerySpec,
        rewrite: &ColumnRewrite,
    ) -> QueryResult<CompiledPlan> {
        let span = info_span!("dashboard_query", table = %spec.table, project = %ctx.project_id);
        let _guard = span.enter();
        self.compile_in_span(ctx, spec, rewrite)
    }

    /// Run the full pipeline and return formatted rows.
    pub async fn run(
        &self,
        ctx: &QueryContext,
        spec: &QuerySpec,
        rewrite: &ColumnRewrite,
        cancel: &CancellationToken,
    ) -> QueryResult<Vec<ResultRow>> {
        let span = info_span!("dashboard_query", table = %spec.table, project = %ctx.project_id);
        async move {
            let plan = self.compile_in_span(ctx, spec, rewrite)?;

            let raw = self.executor.execute(&plan, cancel).await?;
            debug!(state = ?QueryState::Executed, rows = raw.len());

            let rows = ResultFormatter::format(&plan, raw)?;
            debug!(state = ?QueryState::Formatted, rows = rows.len());
            Ok(rows)
        }
        .instrument(span)
        .await
    }

    fn compile_in_span(
        &self,
        ctx: &QueryContext,
        spec: &QuerySpec,
        rewrite: &ColumnRewrite,
    ) -> QueryResult<CompiledPlan> {
        debug!(state = ?QueryState::Received, subject = %ctx.subject.id);

        self.gate
            .authorize(&ctx.subject, &ResourceScope::dashboard_read(&ctx.project_id))
            .map_err(|denied| QueryError::AccessDenied {
                reason: denied.to_string(),
            })?;

        let predicates =
            FilterCompiler::new(&self.registry).compile(&spec.table, &spec.filter, rewrite)?;
        debug!(state = ?QueryState::Validated, predicates = predicates.len());

        let plan = AggregationPlanner::new(&self.registry)
            .with_max_rows(self.max_rows)
            .plan(spec, predicates, &ctx.project_id)?;
        debug!(state = ?QueryState::Planned, outputs = plan.outputs.len(), limit = plan.limit);
        Ok(plan)
    }
}
