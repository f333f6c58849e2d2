//! The compiled plan and its SQL rendering.

use crate::registry::{ColumnDefinition, ValueType};
use crate::spec::{AggregationKind, ColumnRole, FilterValue, SortDirection};
use crate::sql::dialect::helpers::escape_like;
use crate::sql::{
    avg, col, count, lit_float, lit_int, lit_str, lit_timestamp, max, min, sum, table_col, Dialect,
    Expr, ExprExt, OrderByExpr, Query, SelectExpr, SqlDialect, TableRef,
};

use super::filter::{Comparison, CompiledPredicate, Condition, LikeMatch};

/// Largest magnitude at which every integer is exactly representable in an f64.
const MAX_EXACT_INT: f64 = 9_007_199_254_740_992.0;

/// One column of the result, in select order.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputColumn {
    pub name: String,
    pub column: ColumnDefinition,
    pub role: ColumnRole,
}

impl OutputColumn {
    /// Type of the values this output produces.
    pub fn value_type(&self) -> ValueType {
        match self.role {
            ColumnRole::Dimension => self.column.value_type,
            ColumnRole::Measure(_) => ValueType::Number,
        }
    }

    /// SQL expression producing this output.
    pub fn expr(&self) -> Expr {
        let base = physical_expr(&self.column);
        match self.role {
            ColumnRole::Dimension => base,
            ColumnRole::Measure(kind) => aggregate(kind, base),
        }
    }
}

/// Project scoping predicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantScope {
    /// Physical tenant column.
    pub column: String,
    pub project_id: String,
}

/// What an ORDER BY entry sorts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderTarget {
    /// Index into [`CompiledPlan::outputs`].
    Output(usize),
    /// The table's physical row key, used as the last tie-breaker.
    RowKey(String),
}

/// One ORDER BY entry. NULLs always sort last.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledOrder {
    pub target: OrderTarget,
    pub direction: SortDirection,
}

/// A fully validated query, ready for a backend.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledPlan {
    /// Logical table name.
    pub table: String,
    pub physical_table: String,
    pub outputs: Vec<OutputColumn>,
    pub tenant: Option<TenantScope>,
    pub predicates: Vec<CompiledPredicate>,
    /// Output indices grouped on; empty for raw listings.
    pub group_by: Vec<usize>,
    pub order_by: Vec<CompiledOrder>,
    pub limit: u64,
}

impl CompiledPlan {
    /// Whether the plan aggregates (has at least one measure).
    pub fn is_aggregated(&self) -> bool {
        self.outputs.iter().any(|o| o.role.is_measure())
    }

    pub fn output_names(&self) -> impl Iterator<Item = &str> {
        self.outputs.iter().map(|o| o.name.as_str())
    }

    /// Index of the output called `name`.
    pub fn output_index(&self, name: &str) -> Option<usize> {
        self.outputs.iter().position(|o| o.name == name)
    }

    /// Build the SQL query for `dialect`.
    pub fn to_query(&self, dialect: Dialect) -> Query {
        let select: Vec<SelectExpr> = self
            .outputs
            .iter()
            .map(|output| output.expr().alias(&output.name))
            .collect();

        let mut query = Query::new()
            .select(select)
            .from(TableRef::parse(&self.physical_table));

        if let Some(tenant) = &self.tenant {
            query = query.filter(col(&tenant.column).eq(lit_str(&tenant.project_id)));
        }
        for predicate in &self.predicates {
            query = query.filter(predicate_expr(predicate, dialect));
        }

        if !self.group_by.is_empty() {
            query = query.group_by(
                self.group_by
                    .iter()
                    .map(|&i| physical_expr(&self.outputs[i].column))
                    .collect(),
            );
        }

        let order_by = self
            .order_by
            .iter()
            .map(|order| {
                let expr = match &order.target {
                    OrderTarget::Output(i) => self.outputs[*i].expr(),
                    OrderTarget::RowKey(key) => col(key),
                };
                let entry = match order.direction {
                    SortDirection::Asc => OrderByExpr::asc(expr),
                    SortDirection::Desc => OrderByExpr::desc(expr),
                };
                entry.nulls_last()
            })
            .collect();

        query.order_by(order_by).limit(self.limit)
    }

    /// Render the SQL text for `dialect`.
    pub fn to_sql(&self, dialect: Dialect) -> String {
        self.to_query(dialect).to_sql(dialect)
    }
}

fn physical_expr(column: &ColumnDefinition) -> Expr {
    match column.physical_parts() {
        (Some(table), name) => table_col(table, name),
        (None, name) => col(name),
    }
}

fn aggregate(kind: AggregationKind, expr: Expr) -> Expr {
    match kind {
        AggregationKind::Sum => sum(expr),
        AggregationKind::Count => count(expr),
        AggregationKind::Avg => avg(expr),
        AggregationKind::Min => min(expr),
        AggregationKind::Max => max(expr),
    }
}

fn value_expr(value: &FilterValue) -> Expr {
    match value {
        FilterValue::Number(n) if n.fract() == 0.0 && n.abs() <= MAX_EXACT_INT => {
            lit_int(*n as i64)
        }
        FilterValue::Number(n) => lit_float(*n),
        FilterValue::String(s) | FilterValue::Enum(s) => lit_str(s),
        FilterValue::Timestamp(at) => lit_timestamp(*at),
    }
}

fn predicate_expr(predicate: &CompiledPredicate, dialect: Dialect) -> Expr {
    let column = physical_expr(&predicate.column);
    match &predicate.condition {
        Condition::Compare(comparison, value) => {
            let value = value_expr(value);
            match comparison {
                Comparison::Eq => column.eq(value),
                Comparison::Ne => column.ne(value),
                Comparison::Gt => column.gt(value),
                Comparison::Lt => column.lt(value),
                Comparison::Gte => column.gte(value),
                Comparison::Lte => column.lte(value),
            }
        }
        Condition::Like {
            mode,
            needle,
            negated,
        } => {
            let escape = dialect.like_escape_char();
            let escaped = escape_like(needle, escape);
            let pattern = match mode {
                LikeMatch::Contains => format!("%{}%", escaped),
                LikeMatch::StartsWith => format!("{}%", escaped),
                LikeMatch::EndsWith => format!("%{}", escaped),
            };
            if *negated {
                column.not_like_escape(lit_str(&pattern), escape)
            } else {
                column.like_escape(lit_str(&pattern), escape)
            }
        }
        Condition::Between { low, high } => column.between(value_expr(low), value_expr(high)),
        Condition::InSet { values, negated } => {
            let values = values.iter().map(value_expr).collect();
            if *negated {
                column.not_in_list(values)
            } else {
                column.in_list(values)
            }
        }
        Condition::IsNull { negated: false } => column.is_null(),
        Condition::IsNull { negated: true } => column.is_not_null(),
    }
}
