use serde_json::Value;
use std::collections::HashMap;
use tracing::warn;

use super::{IndexQuery, QueryMetadata, Table};
use crate::error::TransportError;
use crate::schema::{Chain, ContainerType, ElementKey, PathElement};
use crate::transport::{QueryRequest, Record, StoreRequest, StoreResponse, Transport};

/// Queries a secondary index and regroups rows by primary key.
///
/// The primary key attribute is always projected, whether requested or not.
#[derive(Debug)]
pub struct SecondaryIndexAdapter<'a, S> {
    table: &'a Table<S>,
}

impl<'a, S: Transport> SecondaryIndexAdapter<'a, S> {
    /// Adapter over `table`.
    pub fn new(table: &'a Table<S>) -> Self {
        Self { table }
    }

    /// Run `query`, reading `chains` from every matching row.
    ///
    /// Returns `None` instead of a map when nothing matched.
    pub async fn query(
        &self,
        query: IndexQuery,
        chains: &[Chain],
    ) -> Result<(Option<HashMap<String, Record>>, QueryMetadata), TransportError> {
        let primary_key_name = &self.table.settings.primary_key_name;
        let mut chains: Vec<&Chain> = chains.iter().collect();

        let primary_key_chain = Chain::new(vec![PathElement::named(
            primary_key_name.clone(),
            ContainerType::Scalar,
        )]);
        let has_primary_key = chains.iter().any(|chain| {
            chain.elements().first().map(|element| element.key())
                == Some(&ElementKey::Name(primary_key_name.clone()))
        });
        if !has_primary_key {
            chains.push(&primary_key_chain);
        }

        let request = StoreRequest::Query(QueryRequest {
            table: self.table.settings.table_name.clone(),
            index_name: query.index_name,
            key_name: query.key_name,
            key_value: query.key_value,
            projection: self.table.builder.build_projection(chains),
            limit: query.limit,
            exclusive_start_key: query.continuation_token,
        });

        let (rows, count, last_evaluated_key) = match self.table.execute(request).await? {
            StoreResponse::Rows {
                rows,
                count,
                last_evaluated_key,
            } => (rows, count, last_evaluated_key),
            other => {
                warn!(
                    table = %self.table.settings.table_name,
                    response = ?other,
                    "query answered without rows"
                );
                return Err(TransportError::service("query answered without rows"));
            }
        };

        let metadata = QueryMetadata {
            count,
            has_reached_end: last_evaluated_key.is_none(),
            continuation_token: last_evaluated_key,
        };

        if rows.is_empty() {
            return Ok((None, metadata));
        }

        let mut grouped = HashMap::with_capacity(rows.len());
        for row in rows {
            match row.get(primary_key_name).map(key_text) {
                Some(key) => {
                    let _ = grouped.insert(key, row);
                }
                None => warn!(
                    table = %self.table.settings.table_name,
                    "index row without primary key skipped"
                ),
            }
        }

        Ok((Some(grouped), metadata))
    }
}

fn key_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
