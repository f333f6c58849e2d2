//! Column registry: the per-table allow-list every query is validated against.
//!
//! A registry is built once at startup and then only read, so it can be
//! shared behind an `Arc` by any number of concurrent requests.

mod column;
mod tables;

use std::collections::{BTreeMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

use crate::error::ValidationError;

pub use column::{ColumnDefinition, ValueType};
pub use tables::{traces_observations, TableDefinition, TRACES_OBSERVATIONS};

/// Plain identifier, optionally qualified once (`table.column`).
static PHYSICAL_IDENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)?$").unwrap()
});

/// Problems found while building a registry.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegistryError {
    #[error("table '{0}' is defined twice")]
    DuplicateTable(String),

    #[error("column '{column}' is defined twice in table '{table}'")]
    DuplicateColumn { table: String, column: String },

    #[error("'{expression}' in table '{table}' is not a plain identifier")]
    InvalidPhysicalExpression { table: String, expression: String },

    #[error("scope column '{column}' in table '{table}' must be an unqualified identifier")]
    QualifiedScopeColumn { table: String, column: String },

    #[error("column '{column}' in table '{table}' is qualified by '{qualifier}', not by the table it reads from")]
    ForeignQualifier {
        table: String,
        column: String,
        qualifier: String,
    },

    #[error("enum column '{column}' in table '{table}' declares no variants")]
    EmptyVariants { table: String, column: String },

    #[error("column '{column}' in table '{table}' is aggregatable but not a number")]
    AggregatableNonNumber { table: String, column: String },
}

/// Immutable map from logical table name to its definition.
#[derive(Debug, Clone, Default)]
pub struct ColumnRegistry {
    tables: BTreeMap<String, TableDefinition>,
}

impl ColumnRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry containing the built-in `traces_observations` table.
    pub fn builtin() -> Self {
        let table = traces_observations();
        let mut tables = BTreeMap::new();
        tables.insert(table.name.clone(), table);
        Self { tables }
    }

    /// Add a table after checking every column definition.
    pub fn with_table(mut self, table: TableDefinition) -> Result<Self, RegistryError> {
        self.register(table)?;
        Ok(self)
    }

    fn register(&mut self, mut table: TableDefinition) -> Result<(), RegistryError> {
        if self.tables.contains_key(&table.name) {
            return Err(RegistryError::DuplicateTable(table.name));
        }

        check_physical(&table.name, &table.physical_table)?;
        for column in [&table.tenant_column, &table.row_key].into_iter().flatten() {
            check_physical(&table.name, column)?;
            if column.contains('.') {
                return Err(RegistryError::QualifiedScopeColumn {
                    table: table.name.clone(),
                    column: column.clone(),
                });
            }
        }

        // `analytics.events` is addressed as `events` in column qualifiers.
        let (_, physical_name) = table
            .physical_table
            .rsplit_once('.')
            .unwrap_or(("", table.physical_table.as_str()));

        let mut seen = HashSet::new();
        for col in &table.columns {
            if !seen.insert(col.name.as_str()) {
                return Err(RegistryError::DuplicateColumn {
                    table: table.name.clone(),
                    column: col.name.clone(),
                });
            }
            check_physical(&table.name, &col.physical)?;
            if let (Some(qualifier), _) = col.physical_parts() {
                if qualifier != physical_name {
                    return Err(RegistryError::ForeignQualifier {
                        table: table.name.clone(),
                        column: col.name.clone(),
                        qualifier: qualifier.to_string(),
                    });
                }
            }
            if col.value_type == ValueType::Enum && col.variants.is_empty() {
                return Err(RegistryError::EmptyVariants {
                    table: table.name.clone(),
                    column: col.name.clone(),
                });
            }
            if col.aggregatable && col.value_type != ValueType::Number {
                return Err(RegistryError::AggregatableNonNumber {
                    table: table.name.clone(),
                    column: col.name.clone(),
                });
            }
        }

        table.reindex();
        tracing::debug!(
            table = %table.name,
            columns = table.columns.len(),
            "registered table"
        );
        self.tables.insert(table.name.clone(), table);
        Ok(())
    }

    /// Resolve a logical table.
    pub fn table(&self, name: &str) -> Result<&TableDefinition, ValidationError> {
        self.tables
            .get(name)
            .ok_or_else(|| ValidationError::UnknownTable { table: name.into() })
    }

    /// Resolve a logical column of a logical table.
    pub fn lookup(&self, table: &str, column: &str) -> Result<&ColumnDefinition, ValidationError> {
        self.table(table)?
            .column(column)
            .ok_or_else(|| ValidationError::UnknownColumn {
                table: table.into(),
                column: column.into(),
            })
    }

    /// All columns of a table, in declaration order.
    pub fn list_columns(&self, table: &str) -> Result<&[ColumnDefinition], ValidationError> {
        Ok(&self.table(table)?.columns)
    }

    /// Logical table names, sorted.
    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(|k| k.as_str())
    }
}

fn check_physical(table: &str, expression: &str) -> Result<(), RegistryError> {
    if PHYSICAL_IDENT.is_match(expression) {
        Ok(())
    } else {
        Err(RegistryError::InvalidPhysicalExpression {
            table: table.into(),
            expression: expression.into(),
        })
    }
}
