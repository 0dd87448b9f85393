use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::expression::EXPRESSION_SIZE_CEILING;
use crate::path::Substitutions;
use crate::transport::Record;

/// Table identity and limits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSettings {
    /// Table name
    pub table_name: String,
    /// Primary key attribute name
    pub primary_key_name: String,
    /// Update expression size ceiling in bytes
    pub size_ceiling: usize,
}

impl TableSettings {
    /// Settings with the store's expression size ceiling.
    pub fn new(table_name: impl Into<String>, primary_key_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            primary_key_name: primary_key_name.into(),
            size_ceiling: EXPRESSION_SIZE_CEILING,
        }
    }

    /// Override the size ceiling.
    pub fn with_size_ceiling(mut self, size_ceiling: usize) -> Self {
        self.size_ceiling = size_ceiling;
        self
    }
}

/// Named read of one field path.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldGetter {
    /// Field path
    pub field_path: String,
    /// Placeholder values
    #[serde(default)]
    pub substitutions: Substitutions,
}

impl FieldGetter {
    /// Getter without substitutions.
    pub fn new(field_path: impl Into<String>) -> Self {
        Self {
            field_path: field_path.into(),
            substitutions: Substitutions::new(),
        }
    }

    /// Add a placeholder value.
    pub fn substitute(mut self, name: impl Into<String>, value: Value) -> Self {
        let _ = self.substitutions.insert(name.into(), value);
        self
    }
}

/// Write of one field path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldSetter {
    /// Field path
    pub field_path: String,
    /// Placeholder values
    #[serde(default)]
    pub substitutions: Substitutions,
    /// Value to write, an object keyed by member for a selector group
    pub value_to_set: Value,
}

impl FieldSetter {
    /// Setter without substitutions.
    pub fn new(field_path: impl Into<String>, value_to_set: Value) -> Self {
        Self {
            field_path: field_path.into(),
            substitutions: Substitutions::new(),
            value_to_set,
        }
    }

    /// Add a placeholder value.
    pub fn substitute(mut self, name: impl Into<String>, value: Value) -> Self {
        let _ = self.substitutions.insert(name.into(), value);
        self
    }
}

/// Removal of one field path.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldRemover {
    /// Field path
    pub field_path: String,
    /// Placeholder values
    #[serde(default)]
    pub substitutions: Substitutions,
}

impl FieldRemover {
    /// Remover without substitutions.
    pub fn new(field_path: impl Into<String>) -> Self {
        Self {
            field_path: field_path.into(),
            substitutions: Substitutions::new(),
        }
    }

    /// Add a placeholder value.
    pub fn substitute(mut self, name: impl Into<String>, value: Value) -> Self {
        let _ = self.substitutions.insert(name.into(), value);
        self
    }
}

/// Query against a secondary index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexQuery {
    /// Index name
    pub index_name: String,
    /// Partition key attribute of the index
    pub key_name: String,
    /// Value to match
    pub key_value: Value,
    /// Page size
    #[serde(default)]
    pub limit: Option<u16>,
    /// Token from the previous page's [`QueryMetadata`]
    #[serde(default)]
    pub continuation_token: Option<Record>,
}

impl IndexQuery {
    /// Query the first page of `index_name` where `key_name == key_value`.
    pub fn new(index_name: impl Into<String>, key_name: impl Into<String>, key_value: Value) -> Self {
        Self {
            index_name: index_name.into(),
            key_name: key_name.into(),
            key_value,
            limit: None,
            continuation_token: None,
        }
    }

    /// Limit the page size.
    pub fn limit(mut self, limit: u16) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Continue after a previous page.
    pub fn continue_from(mut self, metadata: &QueryMetadata) -> Self {
        self.continuation_token = metadata.continuation_token.clone();
        self
    }
}

/// Pagination state of a query page.
#[must_use = "query metadata carries the continuation token for the next page"]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryMetadata {
    /// Rows in this page
    pub count: usize,
    /// Whether no further page exists
    pub has_reached_end: bool,
    /// Opaque token for the next page
    pub continuation_token: Option<Record>,
}
