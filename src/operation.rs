//! Typed request envelope for executing table operations remotely.
//!
//! An [`Operation`] travels as `{"operationType": "...", ...fields}` and is
//! answered with an [`OperationOutput`] `{"success": .., "data": ..}`.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;

use crate::error::Error;
use crate::path::Substitutions;
use crate::table::{FieldGetter, FieldRemover, FieldSetter, IndexQuery, QueryMetadata, Table};
use crate::transport::{Record, Transport};

/// One table operation with its arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "operationType",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum Operation {
    /// [`Table::get_field`]
    GetField {
        /// Record key
        key: String,
        /// Field path
        field_path: String,
        /// Placeholder values
        #[serde(default)]
        substitutions: Substitutions,
    },
    /// [`Table::get_multiple_fields`]
    GetMultipleFields {
        /// Record key
        key: String,
        /// Named getters
        getters: HashMap<String, FieldGetter>,
    },
    /// [`Table::update_field`]
    UpdateField {
        /// Record key
        key: String,
        /// Field path
        field_path: String,
        /// Placeholder values
        #[serde(default)]
        substitutions: Substitutions,
        /// Value to write
        value_to_set: Value,
    },
    /// [`Table::update_multiple_fields`]
    UpdateMultipleFields {
        /// Record key
        key: String,
        /// Writes to apply
        setters: Vec<FieldSetter>,
    },
    /// [`Table::update_field_return_old`]
    UpdateFieldReturnOld {
        /// Record key
        key: String,
        /// Field path
        field_path: String,
        /// Placeholder values
        #[serde(default)]
        substitutions: Substitutions,
        /// Value to write
        value_to_set: Value,
    },
    /// [`Table::remove_field`]
    RemoveField {
        /// Record key
        key: String,
        /// Field path
        field_path: String,
        /// Placeholder values
        #[serde(default)]
        substitutions: Substitutions,
    },
    /// [`Table::remove_multiple_fields`]
    RemoveMultipleFields {
        /// Record key
        key: String,
        /// Removals to apply
        removers: Vec<FieldRemover>,
    },
    /// [`Table::delete_field`]
    DeleteField {
        /// Record key
        key: String,
        /// Field path
        field_path: String,
        /// Placeholder values
        #[serde(default)]
        substitutions: Substitutions,
    },
    /// [`Table::put_record`]
    PutRecord {
        /// Full record, primary key included
        record: Record,
    },
    /// [`Table::get_record`]
    GetRecord {
        /// Record key
        key: String,
    },
    /// [`Table::delete_record`]
    DeleteRecord {
        /// Record key
        key: String,
    },
    /// [`Table::query_field`]
    QueryField {
        /// Index query
        query: IndexQuery,
        /// Field path
        field_path: String,
        /// Placeholder values
        #[serde(default)]
        substitutions: Substitutions,
    },
}

/// Answer to an [`Operation`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationOutput {
    /// Whether the operation succeeded
    pub success: bool,
    /// Operation result, `null` when there is none
    pub data: Value,
    /// Pagination state of a query
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_metadata: Option<QueryMetadata>,
    /// Error message of a failed operation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl OperationOutput {
    fn done(success: bool) -> Self {
        Self {
            success,
            ..Self::default()
        }
    }

    fn data(data: Value) -> Self {
        Self {
            success: true,
            data,
            ..Self::default()
        }
    }

    fn failure(error: &Error) -> Self {
        Self {
            error: Some(error.to_string()),
            ..Self::default()
        }
    }
}

impl<S: Transport> Table<S> {
    /// Execute an envelope operation; errors are reported in the output.
    pub async fn dispatch(&self, operation: Operation) -> OperationOutput {
        match self.run(operation).await {
            Ok(output) => output,
            Err(error) => OperationOutput::failure(&error),
        }
    }

    async fn run(&self, operation: Operation) -> Result<OperationOutput, Error> {
        let output = match operation {
            Operation::GetField {
                key,
                field_path,
                substitutions,
            } => {
                let value = self.get_field(&key, &field_path, &substitutions).await?;
                OperationOutput::data(value.unwrap_or(Value::Null))
            }
            Operation::GetMultipleFields { key, getters } => {
                let values = self.get_multiple_fields(&key, &getters).await?;
                OperationOutput::data(json!(values))
            }
            Operation::UpdateField {
                key,
                field_path,
                substitutions,
                value_to_set,
            } => OperationOutput::done(
                self.update_field(&key, &field_path, &substitutions, value_to_set)
                    .await?,
            ),
            Operation::UpdateMultipleFields { key, setters } => {
                OperationOutput::done(self.update_multiple_fields(&key, setters).await?)
            }
            Operation::UpdateFieldReturnOld {
                key,
                field_path,
                substitutions,
                value_to_set,
            } => {
                let (success, old) = self
                    .update_field_return_old(&key, &field_path, &substitutions, value_to_set)
                    .await?;
                OperationOutput {
                    data: old.unwrap_or(Value::Null),
                    ..OperationOutput::done(success)
                }
            }
            Operation::RemoveField {
                key,
                field_path,
                substitutions,
            } => OperationOutput::done(self.remove_field(&key, &field_path, &substitutions).await?),
            Operation::RemoveMultipleFields { key, removers } => {
                OperationOutput::done(self.remove_multiple_fields(&key, removers).await?)
            }
            Operation::DeleteField {
                key,
                field_path,
                substitutions,
            } => {
                let removed = self.delete_field(&key, &field_path, &substitutions).await?;
                OperationOutput::data(removed.unwrap_or(Value::Null))
            }
            Operation::PutRecord { record } => OperationOutput::done(self.put_record(record).await?),
            Operation::GetRecord { key } => {
                let record = self.get_record(&key).await?;
                OperationOutput::data(record.map(Value::Object).unwrap_or(Value::Null))
            }
            Operation::DeleteRecord { key } => {
                OperationOutput::done(self.delete_record(&key).await?)
            }
            Operation::QueryField {
                query,
                field_path,
                substitutions,
            } => {
                let (values, metadata) = self.query_field(query, &field_path, &substitutions).await?;
                OperationOutput {
                    query_metadata: Some(metadata),
                    ..OperationOutput::data(values.map(|v| json!(v)).unwrap_or(Value::Null))
                }
            }
        };

        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_is_tagged_by_type() {
        let operation: Operation = serde_json::from_value(json!({
            "operationType": "updateField",
            "key": "acct1",
            "fieldPath": "profile.name",
            "valueToSet": "Alice"
        }))
        .unwrap();

        assert_eq!(
            operation,
            Operation::UpdateField {
                key: "acct1".to_string(),
                field_path: "profile.name".to_string(),
                substitutions: Substitutions::new(),
                value_to_set: json!("Alice"),
            }
        );
    }

    #[test]
    fn test_unknown_operation_type_is_rejected() {
        let result = serde_json::from_value::<Operation>(json!({
            "operationType": "dropTable",
            "key": "acct1"
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_output_omits_empty_optionals() {
        let output = serde_json::to_value(OperationOutput::done(true)).unwrap();
        assert_eq!(output, json!({"success": true, "data": null}));
    }

    #[test]
    fn test_query_field_payload() {
        let operation: Operation = serde_json::from_value(json!({
            "operationType": "queryField",
            "query": {"indexName": "by-email", "keyName": "email", "keyValue": "a@b.c", "limit": 5},
            "fieldPath": "profile.(name, age)"
        }))
        .unwrap();

        match operation {
            Operation::QueryField { query, .. } => {
                assert_eq!(query.limit, Some(5));
                assert!(query.continuation_token.is_none());
            }
            other => panic!("unexpected operation {other:?}"),
        }
    }
}
