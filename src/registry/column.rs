//! Column definitions: the unit of the allow-list.

use serde::{Deserialize, Serialize};

/// Value type of a logical column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    Number,
    String,
    Timestamp,
    Enum,
}

impl ValueType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueType::Number => "number",
            ValueType::String => "string",
            ValueType::Timestamp => "timestamp",
            ValueType::Enum => "enum",
        }
    }
}

impl std::fmt::Display for ValueType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A logical column the caller may reference, and how it maps to storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDefinition {
    /// Logical name used in query descriptors (`totalTokens`).
    pub name: String,
    /// Physical column, optionally table-qualified (`total_tokens`).
    pub physical: String,
    #[serde(rename = "type")]
    pub value_type: ValueType,
    #[serde(default)]
    pub aggregatable: bool,
    /// Allowed values for [`ValueType::Enum`] columns.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub variants: Vec<String>,
}

impl ColumnDefinition {
    pub fn new(name: &str, physical: &str, value_type: ValueType) -> Self {
        Self {
            name: name.into(),
            physical: physical.into(),
            value_type,
            aggregatable: false,
            variants: vec![],
        }
    }

    pub fn number(name: &str, physical: &str) -> Self {
        Self::new(name, physical, ValueType::Number)
    }

    pub fn string(name: &str, physical: &str) -> Self {
        Self::new(name, physical, ValueType::String)
    }

    pub fn timestamp(name: &str, physical: &str) -> Self {
        Self::new(name, physical, ValueType::Timestamp)
    }

    pub fn enumeration(name: &str, physical: &str, variants: &[&str]) -> Self {
        Self {
            variants: variants.iter().map(|v| v.to_string()).collect(),
            ..Self::new(name, physical, ValueType::Enum)
        }
    }

    /// Mark the column as usable inside SUM/COUNT/AVG/MIN/MAX.
    pub fn aggregatable(mut self) -> Self {
        self.aggregatable = true;
        self
    }

    /// Whether a measure may be built on this column.
    pub fn can_aggregate(&self) -> bool {
        self.aggregatable && self.value_type == ValueType::Number
    }

    pub fn has_variant(&self, value: &str) -> bool {
        self.variants.iter().any(|v| v == value)
    }

    /// Split the physical expression into `(table, column)`.
    pub fn physical_parts(&self) -> (Option<&str>, &str) {
        match self.physical.split_once('.') {
            Some((table, column)) => (Some(table), column),
            None => (None, self.physical.as_str()),
        }
    }
}
