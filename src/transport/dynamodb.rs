use aws_sdk_dynamodb::error::ProvideErrorMetadata;
use aws_sdk_dynamodb::types::{AttributeValue, ReturnConsumedCapacity, ReturnValue};
use aws_sdk_dynamodb::Client;
use aws_smithy_runtime_api::client::orchestrator::HttpResponse;
use aws_smithy_runtime_api::client::result::SdkError;
use serde_dynamo::{from_item, from_items, to_attribute_value, to_item};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use tracing::debug;

use super::{PrimaryKey, QueryRequest, Record, StoreRequest, StoreResponse, Transport};
use crate::error::{TransportError, TransportErrorKind};

type Item = HashMap<String, AttributeValue>;

/// [`Transport`] backed by `aws-sdk-dynamodb`.
#[derive(Debug, Clone)]
pub struct DynamoDbTransport {
    client: Client,
}

impl DynamoDbTransport {
    /// Wrap a client.
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Underlying client
    pub fn client(&self) -> &Client {
        &self.client
    }

    async fn get_item(
        &self,
        table: String,
        key: PrimaryKey,
        projection: Option<crate::expression::Projection>,
    ) -> Result<StoreResponse, TransportError> {
        let mut builder = self
            .client
            .get_item()
            .table_name(table)
            .set_return_consumed_capacity(None)
            .key(key.name, AttributeValue::S(key.value));

        if let Some(projection) = projection {
            builder = builder
                .projection_expression(projection.expression)
                .set_expression_attribute_names(Some(projection.alias_table));
        }

        let output = builder.send().await.map_err(classify)?;
        let item = output.item.map(from_item::<_, Record>).transpose()?;

        Ok(StoreResponse::Item(item))
    }

    async fn put_item(&self, table: String, item: Record) -> Result<StoreResponse, TransportError> {
        let item: Item = to_item(item)?;

        let _ = self.client
            .put_item()
            .table_name(table)
            .return_values(ReturnValue::None)
            .return_consumed_capacity(ReturnConsumedCapacity::None)
            .set_item(Some(item))
            .send()
            .await
            .map_err(classify)?;

        Ok(StoreResponse::Done)
    }

    async fn update_item(
        &self,
        table: String,
        key: PrimaryKey,
        batch: crate::expression::WriteBatch,
        return_old: bool,
    ) -> Result<StoreResponse, TransportError> {
        let return_values = if return_old {
            ReturnValue::UpdatedOld
        } else {
            ReturnValue::None
        };

        let mut builder = self
            .client
            .update_item()
            .table_name(table)
            .set_return_consumed_capacity(None)
            .return_values(return_values)
            .key(key.name, AttributeValue::S(key.value))
            .update_expression(batch.expression)
            .set_expression_attribute_names(Some(batch.alias_table));

        // The store rejects an empty value map, removals carry none
        for (placeholder, value) in batch.value_table {
            builder = builder.expression_attribute_values(placeholder, to_attribute_value(value)?);
        }

        let output = builder.send().await.map_err(classify)?;
        let attributes = output.attributes.map(from_item::<_, Record>).transpose()?;

        Ok(StoreResponse::Attributes(attributes))
    }

    async fn delete_item(&self, table: String, key: PrimaryKey) -> Result<StoreResponse, TransportError> {
        let _ = self.client
            .delete_item()
            .table_name(table)
            .set_return_consumed_capacity(None)
            .key(key.name, AttributeValue::S(key.value))
            .send()
            .await
            .map_err(classify)?;

        Ok(StoreResponse::Done)
    }

    async fn query(&self, query: QueryRequest) -> Result<StoreResponse, TransportError> {
        let exclusive_start_key = query
            .exclusive_start_key
            .map(to_item::<_, Item>)
            .transpose()?;

        let mut builder = self
            .client
            .query()
            .table_name(query.table)
            .index_name(query.index_name)
            .key_condition_expression("#index_pk = :index_pk")
            .expression_attribute_names("#index_pk", query.key_name)
            .expression_attribute_values(":index_pk", to_attribute_value(query.key_value)?)
            .projection_expression(query.projection.expression)
            .set_limit(query.limit.map(i32::from))
            .set_exclusive_start_key(exclusive_start_key);

        for (alias, name) in query.projection.alias_table {
            builder = builder.expression_attribute_names(alias, name);
        }

        let output = builder.send().await.map_err(classify)?;
        let rows: Vec<Record> = match output.items {
            Some(items) => from_items(items)?,
            None => Vec::new(),
        };
        let last_evaluated_key = output
            .last_evaluated_key
            .map(from_item::<_, Record>)
            .transpose()?;

        Ok(StoreResponse::Rows {
            count: usize::try_from(output.count).unwrap_or(rows.len()),
            rows,
            last_evaluated_key,
        })
    }
}

impl Transport for DynamoDbTransport {
    fn execute(
        &self,
        request: StoreRequest,
    ) -> impl Future<Output = Result<StoreResponse, TransportError>> + Send {
        async move {
            debug!(operation = request.name(), "dynamodb request");

            match request {
                StoreRequest::GetItem {
                    table,
                    key,
                    projection,
                } => self.get_item(table, key, projection).await,
                StoreRequest::PutItem { table, item } => self.put_item(table, item).await,
                StoreRequest::UpdateItem {
                    table,
                    key,
                    batch,
                    return_old,
                } => self.update_item(table, key, batch, return_old).await,
                StoreRequest::DeleteItem { table, key } => self.delete_item(table, key).await,
                StoreRequest::Query(query) => self.query(query).await,
            }
        }
    }
}

/// Map an SDK failure onto the kinds the core acts upon.
fn classify<E>(error: SdkError<E, HttpResponse>) -> TransportError
where
    E: ProvideErrorMetadata + fmt::Debug,
{
    let code = error.code().unwrap_or_default().to_string();
    let message = error
        .message()
        .map(str::to_string)
        .unwrap_or_else(|| format!("{error:?}"));

    TransportError::new(classify_code(&code, &message), message)
}

/// Message of the store when an update addresses a path below a missing parent
const MISSING_PATH_MESSAGE: &str = "document path provided in the update expression is invalid";

fn classify_code(code: &str, message: &str) -> TransportErrorKind {
    match code {
        "ValidationException" if message.contains(MISSING_PATH_MESSAGE) => TransportErrorKind::MissingPath,
        "ConditionalCheckFailedException" => TransportErrorKind::ConditionFailed,
        _ => TransportErrorKind::Service,
    }
}
