//! Aggregation planning: dimensions, measures, grouping, ordering and limits.

use std::collections::HashSet;

use tracing::debug;

use crate::error::ValidationError;
use crate::registry::{ColumnRegistry, TableDefinition};
use crate::spec::{ColumnRole, OrderByItem, QuerySpec, SortDirection};

use super::filter::CompiledPredicate;
use super::naming::output_name;
use super::plan::{CompiledOrder, CompiledPlan, OrderTarget, OutputColumn, TenantScope};

/// Row limit applied when the caller gives none.
pub const DEFAULT_MAX_ROWS: u64 = 1000;

/// Turns a validated descriptor plus compiled filters into a [`CompiledPlan`].
pub struct AggregationPlanner<'a> {
    registry: &'a ColumnRegistry,
    max_rows: u64,
}

impl<'a> AggregationPlanner<'a> {
    pub fn new(registry: &'a ColumnRegistry) -> Self {
        Self {
            registry,
            max_rows: DEFAULT_MAX_ROWS,
        }
    }

    /// Server-side cap on returned rows.
    pub fn with_max_rows(mut self, max_rows: u64) -> Self {
        self.max_rows = max_rows.max(1);
        self
    }

    /// Plan `spec` for `project_id`.
    ///
    /// `predicates` are the caller filters, already compiled; the tenant
    /// scope predicate is added ahead of them.
    pub fn plan(
        &self,
        spec: &QuerySpec,
        predicates: Vec<CompiledPredicate>,
        project_id: &str,
    ) -> Result<CompiledPlan, ValidationError> {
        let table = self.registry.table(&spec.table)?;

        let outputs = self.resolve_outputs(table, spec)?;
        let group_by = self.resolve_group_by(table, spec, &outputs)?;
        let order_by = self.resolve_order_by(table, &spec.order_by, &outputs)?;
        let limit = self.resolve_limit(spec.limit)?;

        let tenant = table.tenant_column.as_ref().map(|column| TenantScope {
            column: column.clone(),
            project_id: project_id.to_string(),
        });

        let plan = CompiledPlan {
            table: table.name.clone(),
            physical_table: table.physical_table.clone(),
            outputs,
            tenant,
            predicates,
            group_by,
            order_by,
            limit,
        };
        debug!(
            table = %plan.table,
            outputs = plan.outputs.len(),
            predicates = plan.predicates.len(),
            aggregated = plan.is_aggregated(),
            limit = plan.limit,
            "planned query"
        );
        Ok(plan)
    }

    fn resolve_outputs(
        &self,
        table: &TableDefinition,
        spec: &QuerySpec,
    ) -> Result<Vec<OutputColumn>, ValidationError> {
        if spec.select.is_empty() {
            return Err(ValidationError::EmptySelect);
        }

        let mut outputs: Vec<OutputColumn> = Vec::with_capacity(spec.select.len());
        for item in &spec.select {
            let column = lookup(table, &item.column)?;
            if let ColumnRole::Measure(kind) = item.role {
                if !column.can_aggregate() {
                    return Err(ValidationError::NotAggregatable {
                        column: column.name.clone(),
                        aggregation: kind.to_string(),
                    });
                }
            }

            let name = output_name(&column.name, item.role.aggregation());
            if outputs.iter().any(|o| o.name == name) {
                return Err(ValidationError::DuplicateOutput { name });
            }
            outputs.push(OutputColumn {
                name,
                column: column.clone(),
                role: item.role,
            });
        }
        Ok(outputs)
    }

    fn resolve_group_by(
        &self,
        table: &TableDefinition,
        spec: &QuerySpec,
        outputs: &[OutputColumn],
    ) -> Result<Vec<usize>, ValidationError> {
        let mut grouped: Vec<&str> = Vec::new();
        for item in &spec.group_by {
            let column = lookup(table, &item.column)?;
            if let Some(kind) = item.kind {
                if !kind.accepts(column.value_type) {
                    return Err(ValidationError::TypeMismatch {
                        column: column.name.clone(),
                        expected: column.value_type,
                        found: kind.as_str().to_string(),
                    });
                }
            }
            if !grouped.contains(&column.name.as_str()) {
                grouped.push(column.name.as_str());
            }
        }

        let aggregated = outputs.iter().any(|o| o.role.is_measure());
        if !aggregated {
            return match grouped.first() {
                Some(column) => Err(ValidationError::GroupByMismatch {
                    column: column.to_string(),
                    reason: "groupBy requires at least one aggregated measure".into(),
                }),
                None => Ok(vec![]),
            };
        }

        let dimension_index = |name: &str| {
            outputs
                .iter()
                .position(|o| o.role == ColumnRole::Dimension && o.column.name == name)
        };

        for output in outputs.iter().filter(|o| o.role == ColumnRole::Dimension) {
            if !grouped.contains(&output.column.name.as_str()) {
                return Err(ValidationError::GroupByMismatch {
                    column: output.column.name.clone(),
                    reason: "selected without aggregation but missing from groupBy".into(),
                });
            }
        }

        grouped
            .into_iter()
            .map(|name| {
                dimension_index(name).ok_or_else(|| ValidationError::GroupByMismatch {
                    column: name.to_string(),
                    reason: "grouped but not selected as a dimension".into(),
                })
            })
            .collect()
    }

    fn resolve_order_by(
        &self,
        table: &TableDefinition,
        items: &[OrderByItem],
        outputs: &[OutputColumn],
    ) -> Result<Vec<CompiledOrder>, ValidationError> {
        let mut order: Vec<CompiledOrder> = Vec::new();
        let mut ordered: HashSet<usize> = HashSet::new();

        for item in items {
            let index = resolve_order_target(table, item, outputs)?;
            if ordered.insert(index) {
                order.push(CompiledOrder {
                    target: OrderTarget::Output(index),
                    direction: item.direction,
                });
            }
        }

        if order.is_empty() {
            let first_dimension = outputs.iter().position(|o| o.role == ColumnRole::Dimension);
            let default = match first_dimension {
                Some(i) => (i, SortDirection::Asc),
                // resolve_outputs guarantees at least one output
                None => (0, SortDirection::Desc),
            };
            ordered.insert(default.0);
            order.push(CompiledOrder {
                target: OrderTarget::Output(default.0),
                direction: default.1,
            });
        }

        for (i, output) in outputs.iter().enumerate() {
            if output.role == ColumnRole::Dimension && ordered.insert(i) {
                order.push(CompiledOrder {
                    target: OrderTarget::Output(i),
                    direction: SortDirection::Asc,
                });
            }
        }

        let aggregated = outputs.iter().any(|o| o.role.is_measure());
        if !aggregated {
            if let Some(key) = &table.row_key {
                let already = outputs.iter().any(|o| o.column.physical_parts().1 == key);
                if !already {
                    order.push(CompiledOrder {
                        target: OrderTarget::RowKey(key.clone()),
                        direction: SortDirection::Asc,
                    });
                }
            }
        }

        Ok(order)
    }

    fn resolve_limit(&self, limit: Option<i64>) -> Result<u64, ValidationError> {
        match limit {
            None => Ok(self.max_rows),
            Some(limit) if limit <= 0 => Err(ValidationError::InvalidLimit { limit }),
            Some(limit) => {
                let requested = limit as u64;
                if requested > self.max_rows {
                    debug!(requested, max_rows = self.max_rows, "clamped limit");
                    Ok(self.max_rows)
                } else {
                    Ok(requested)
                }
            }
        }
    }
}

fn lookup<'t>(
    table: &'t TableDefinition,
    column: &str,
) -> Result<&'t crate::registry::ColumnDefinition, ValidationError> {
    table
        .column(column)
        .ok_or_else(|| ValidationError::UnknownColumn {
            table: table.name.clone(),
            column: column.into(),
        })
}

/// A registry column resolves through the naming rule with the entry's
/// aggregation. Any other name may only be a measure's output name.
fn resolve_order_target(
    table: &TableDefinition,
    item: &OrderByItem,
    outputs: &[OutputColumn],
) -> Result<usize, ValidationError> {
    if let Some(column) = table.column(&item.column) {
        let name = output_name(&column.name, item.agg);
        return outputs
            .iter()
            .position(|o| o.name == name)
            .ok_or(ValidationError::UnknownOrderColumn { column: name });
    }

    if item.agg.is_none() {
        if let Some(i) = outputs
            .iter()
            .position(|o| o.role.is_measure() && o.name == item.column)
        {
            return Ok(i);
        }
    }

    Err(ValidationError::UnknownColumn {
        table: table.name.clone(),
        column: item.column.clone(),
    })
}
