//! Serde descriptions of a database layout.
//!
//! A schema can be kept next to its data (usually as JSON) and turned into
//! an empty [`Database`](super::Database) with `Database::from_schema`.

use serde::{Deserialize, Serialize};

use crate::column::FieldType;
use crate::error::{FormatError, Result};
use crate::value::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseSchema {
    pub name: String,
    #[serde(default)]
    pub tables: Vec<TableSchema>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    #[serde(default)]
    pub columns: Vec<ColumnSchema>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl ColumnSchema {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            default: None,
        }
    }

    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }
}

impl TableSchema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
        }
    }

    pub fn column(mut self, column: ColumnSchema) -> Self {
        self.columns.push(column);
        self
    }
}

impl DatabaseSchema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tables: Vec::new(),
        }
    }

    pub fn table(mut self, table: TableSchema) -> Self {
        self.tables.push(table);
        self
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| FormatError::from(e).into())
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| FormatError::from(e).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_json() {
        let json = r#"{
            "name": "People",
            "tables": [{
                "name": "Person",
                "columns": [
                    {"name": "Age", "type": "I32", "default": {"I32": -1}},
                    {"name": "Name", "type": "String"},
                    {"name": "Friends", "type": {"RefList": "Person"}}
                ]
            }]
        }"#;
        let schema = DatabaseSchema::from_json(json).unwrap();
        let expected = DatabaseSchema::new("People").table(
            TableSchema::new("Person")
                .column(ColumnSchema::new("Age", FieldType::I32).with_default(-1i32))
                .column(ColumnSchema::new("Name", FieldType::String))
                .column(ColumnSchema::new("Friends", FieldType::RefList("Person".into()))),
        );
        assert_eq!(schema, expected);

        let back = DatabaseSchema::from_json(&schema.to_json().unwrap()).unwrap();
        assert_eq!(back, schema);
    }

    #[test]
    fn test_invalid_schema_is_format_error() {
        assert!(matches!(
            DatabaseSchema::from_json(r#"{"tables": []}"#),
            Err(crate::error::Error::Format(FormatError::Json(_)))
        ));
    }
}
