//! Table definitions and the built-in observation table.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::column::ColumnDefinition;

/// Logical name of the built-in observation fact table.
pub const TRACES_OBSERVATIONS: &str = "traces_observations";

/// A logical table: its storage location and the columns callers may use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDefinition {
    pub name: String,
    pub physical_table: String,
    /// Physical column that scopes every query to one project.
    #[serde(default)]
    pub tenant_column: Option<String>,
    /// Physical column used as the final tie-breaker for raw listings.
    #[serde(default)]
    pub row_key: Option<String>,
    pub columns: Vec<ColumnDefinition>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl TableDefinition {
    pub fn new(name: &str, physical_table: &str) -> Self {
        Self {
            name: name.into(),
            physical_table: physical_table.into(),
            tenant_column: None,
            row_key: None,
            columns: vec![],
            index: HashMap::new(),
        }
    }

    pub fn with_tenant_column(mut self, column: &str) -> Self {
        self.tenant_column = Some(column.into());
        self
    }

    pub fn with_row_key(mut self, column: &str) -> Self {
        self.row_key = Some(column.into());
        self
    }

    pub fn with_column(mut self, column: ColumnDefinition) -> Self {
        self.columns.push(column);
        self.reindex();
        self
    }

    pub fn with_columns(mut self, columns: impl IntoIterator<Item = ColumnDefinition>) -> Self {
        self.columns.extend(columns);
        self.reindex();
        self
    }

    /// Rebuild the name index. First definition wins on duplicates;
    /// registry construction rejects duplicates before that matters.
    pub(crate) fn reindex(&mut self) {
        self.index.clear();
        for (i, col) in self.columns.iter().enumerate() {
            self.index.entry(col.name.clone()).or_insert(i);
        }
    }

    /// Look up a logical column.
    pub fn column(&self, name: &str) -> Option<&ColumnDefinition> {
        self.index.get(name).map(|&i| &self.columns[i])
    }
}

/// Built-in definition of `traces_observations`.
pub fn traces_observations() -> TableDefinition {
    TableDefinition::new(TRACES_OBSERVATIONS, "observations")
        .with_tenant_column("project_id")
        .with_row_key("id")
        .with_columns([
            ColumnDefinition::string("traceId", "trace_id"),
            ColumnDefinition::string("traceName", "trace_name"),
            ColumnDefinition::string("observationId", "id"),
            ColumnDefinition::string("observationName", "name"),
            ColumnDefinition::enumeration("type", "type", &["GENERATION", "SPAN", "EVENT"]),
            ColumnDefinition::enumeration(
                "level",
                "level",
                &["DEBUG", "DEFAULT", "WARNING", "ERROR"],
            ),
            ColumnDefinition::string("model", "model"),
            ColumnDefinition::string("userId", "user_id"),
            ColumnDefinition::string("release", "release"),
            ColumnDefinition::string("version", "version"),
            ColumnDefinition::timestamp("timestamp", "start_time"),
            ColumnDefinition::timestamp("startTime", "start_time"),
            ColumnDefinition::timestamp("endTime", "end_time"),
            ColumnDefinition::number("promptTokens", "prompt_tokens").aggregatable(),
            ColumnDefinition::number("completionTokens", "completion_tokens").aggregatable(),
            ColumnDefinition::number("totalTokens", "total_tokens").aggregatable(),
            ColumnDefinition::number("inputCost", "input_cost").aggregatable(),
            ColumnDefinition::number("outputCost", "output_cost").aggregatable(),
            ColumnDefinition::number("totalTokenCost", "total_cost").aggregatable(),
            ColumnDefinition::number("latency", "latency_ms").aggregatable(),
        ])
}
