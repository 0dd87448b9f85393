//! Store access capability.
//!
//! The core describes every store call as a [`StoreRequest`] and hands it to
//! a [`Transport`]. [`DynamoDbTransport`] talks to DynamoDB; tests plug in an
//! in-memory store.

mod dynamodb;
mod pool;

pub use dynamodb::DynamoDbTransport;
pub use pool::{ClientPool, ClientSettings, ENDPOINT_URL_ENV, LOCALSTACK_ENDPOINT};

use serde_json::{Map, Value};
use std::future::Future;
use std::sync::Arc;

use crate::error::TransportError;
use crate::expression::{Projection, WriteBatch};

/// A record as native values, attribute name to value.
pub type Record = Map<String, Value>;

/// Primary key of one record. Key values travel as strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PrimaryKey {
    /// Attribute name
    pub name: String,
    /// Attribute value
    pub value: String,
}

impl PrimaryKey {
    /// Build a primary key.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Query against a secondary index.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRequest {
    /// Table name
    pub table: String,
    /// Index name
    pub index_name: String,
    /// Partition key attribute of the index
    pub key_name: String,
    /// Partition key value to match
    pub key_value: Value,
    /// Attributes to return
    pub projection: Projection,
    /// Page size
    pub limit: Option<u16>,
    /// Continuation from a previous page
    pub exclusive_start_key: Option<Record>,
}

/// One store call.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreRequest {
    /// Read one record, optionally projected
    GetItem {
        /// Table name
        table: String,
        /// Record key
        key: PrimaryKey,
        /// Attributes to return, all when `None`
        projection: Option<Projection>,
    },
    /// Replace a whole record
    PutItem {
        /// Table name
        table: String,
        /// Full record, primary key included
        item: Record,
    },
    /// Apply an update or removal expression
    UpdateItem {
        /// Table name
        table: String,
        /// Record key
        key: PrimaryKey,
        /// Expression, aliases and values
        batch: WriteBatch,
        /// Whether to return the previous values of the updated attributes
        return_old: bool,
    },
    /// Delete a whole record
    DeleteItem {
        /// Table name
        table: String,
        /// Record key
        key: PrimaryKey,
    },
    /// Query a secondary index
    Query(QueryRequest),
}

impl StoreRequest {
    /// Short operation name, used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::GetItem { .. } => "GetItem",
            Self::PutItem { .. } => "PutItem",
            Self::UpdateItem { .. } => "UpdateItem",
            Self::DeleteItem { .. } => "DeleteItem",
            Self::Query(_) => "Query",
        }
    }
}

/// Result of a store call.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreResponse {
    /// `GetItem` result, `None` when the record does not exist
    Item(Option<Record>),
    /// `UpdateItem` previous values, when requested
    Attributes(Option<Record>),
    /// `Query` page
    Rows {
        /// Matching rows, in store order
        rows: Vec<Record>,
        /// Number of rows in this page
        count: usize,
        /// Continuation key, `None` on the last page
        last_evaluated_key: Option<Record>,
    },
    /// Call without a payload
    Done,
}

impl StoreResponse {
    /// Record or attributes carried by the response.
    pub fn into_record(self) -> Option<Record> {
        match self {
            Self::Item(record) | Self::Attributes(record) => record,
            Self::Rows { .. } | Self::Done => None,
        }
    }
}

/// Executes store calls.
///
/// Timeouts and retries belong to the implementation; every failure the core
/// sees is terminal for that call.
pub trait Transport: Send + Sync {
    /// Execute one store call
    fn execute(
        &self,
        request: StoreRequest,
    ) -> impl Future<Output = Result<StoreResponse, TransportError>> + Send;
}

impl<T: Transport> Transport for Arc<T> {
    fn execute(
        &self,
        request: StoreRequest,
    ) -> impl Future<Output = Result<StoreResponse, TransportError>> + Send {
        (**self).execute(request)
    }
}
