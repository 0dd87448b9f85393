#![allow(dead_code, unused_imports)]

/// Test helpers and fixtures for the integration tests
///
/// Every test runs against [`MemoryTransport`], an in-memory store that
/// executes the generated expressions with DynamoDB's missing-path rules.
pub mod fixtures;
pub mod memory;

pub use dynamo_fields::{
    CachingTable, Error, FieldGetter, FieldRemover, FieldSetter, IndexQuery, Operation,
    StoreRequest, Table, TableSettings, TransportError,
};
pub use fixtures::{account_schema, none, subs, EMAIL_INDEX, PRIMARY_KEY, TABLE};
pub use memory::MemoryTransport;
pub use serde_json::{json, Value};

use std::sync::Arc;

/// Shared store handle, inspected by tests after the table took ownership
pub type Store = Arc<MemoryTransport>;

/// Empty store for the accounts table
pub fn store() -> Store {
    Arc::new(MemoryTransport::new(PRIMARY_KEY))
}

/// Accounts table over `store`
pub fn table(store: &Store) -> Table<Store> {
    Table::new(
        Arc::clone(store),
        account_schema(),
        TableSettings::new(TABLE, PRIMARY_KEY),
    )
}

/// Accounts table with a custom expression size ceiling
pub fn table_with_ceiling(store: &Store, ceiling: usize) -> Table<Store> {
    Table::new(
        Arc::clone(store),
        account_schema(),
        TableSettings::new(TABLE, PRIMARY_KEY).with_size_ceiling(ceiling),
    )
}

/// Caching accounts table over `store`
pub fn caching_table(store: &Store) -> CachingTable<Store> {
    CachingTable::new(table(store))
}

/// Matches update requests whose expression contains `fragment`
pub fn update_containing(fragment: &'static str) -> impl Fn(&StoreRequest) -> bool + Send {
    move |request| match request {
        StoreRequest::UpdateItem { batch, .. } => batch.expression.contains(fragment),
        _ => false,
    }
}

/// Matches any request with the given operation name
pub fn request_named(name: &'static str) -> impl Fn(&StoreRequest) -> bool + Send {
    move |request| request.name() == name
}

/// Number of recorded requests with the given operation name
pub fn count_named(store: &Store, name: &str) -> usize {
    store
        .requests()
        .iter()
        .filter(|request| request.name() == name)
        .count()
}
