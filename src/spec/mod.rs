//! Query descriptors: the caller-composed, declarative description of one
//! dashboard query.
//!
//! A [`QuerySpec`] is parsed from camelCase JSON, validated once by the
//! planner, and discarded after the request completes.

mod filter;
mod select;

use serde::Deserialize;

use crate::error::ValidationError;

pub use filter::{FilterArgument, FilterCondition, FilterOperator, FilterValue};
pub use select::{
    AggregationKind, ColumnRole, GroupByItem, GroupKind, OrderByItem, SelectItem, SortDirection,
};

/// One dashboard query, as sent by the caller.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuerySpec {
    #[serde(alias = "from")]
    pub table: String,
    #[serde(default)]
    pub select: Vec<SelectItem>,
    #[serde(default)]
    pub filter: Vec<FilterCondition>,
    #[serde(default)]
    pub group_by: Vec<GroupByItem>,
    #[serde(default)]
    pub order_by: Vec<OrderByItem>,
    #[serde(default)]
    pub limit: Option<i64>,
}

impl QuerySpec {
    pub fn new(table: &str) -> Self {
        Self {
            table: table.into(),
            select: vec![],
            filter: vec![],
            group_by: vec![],
            order_by: vec![],
            limit: None,
        }
    }

    /// Parse a JSON descriptor.
    pub fn from_json(json: &str) -> Result<Self, ValidationError> {
        serde_json::from_str(json).map_err(|e| ValidationError::Malformed(e.to_string()))
    }

    pub fn select(mut self, item: SelectItem) -> Self {
        self.select.push(item);
        self
    }

    pub fn dimension(self, column: &str) -> Self {
        self.select(SelectItem::dimension(column))
    }

    pub fn measure(self, column: &str, kind: AggregationKind) -> Self {
        self.select(SelectItem::measure(column, kind))
    }

    pub fn filter(mut self, condition: FilterCondition) -> Self {
        self.filter.push(condition);
        self
    }

    pub fn group_by(mut self, column: &str) -> Self {
        self.group_by.push(GroupByItem::new(column));
        self
    }

    pub fn order_by(mut self, item: OrderByItem) -> Self {
        self.order_by.push(item);
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether any select item aggregates.
    pub fn has_measures(&self) -> bool {
        self.select.iter().any(|item| item.role.is_measure())
    }
}
