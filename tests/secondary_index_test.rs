/// Secondary index queries regrouped by primary key
mod helpers;
use helpers::*;

use dynamo_fields::{
    Chain, ContainerType, PathElement, SecondaryIndexAdapter, StoreResponse, Transport,
};
use std::future::Future;

/// Answers every call as if it were a write
#[derive(Debug)]
struct WriteAnswers;

impl Transport for WriteAnswers {
    fn execute(
        &self,
        _request: StoreRequest,
    ) -> impl Future<Output = Result<StoreResponse, TransportError>> + Send {
        std::future::ready(Ok(StoreResponse::Done))
    }
}

fn seeded() -> Store {
    let store = store();
    for (key, name) in [("acct1", "Alice"), ("acct2", "Bob"), ("acct3", "Carol")] {
        store.seed(
            TABLE,
            json!({
                "accountId": key,
                "email": "shared@example.com",
                "profile": {"name": name, "age": 20}
            }),
        );
    }
    store.seed(
        TABLE,
        json!({"accountId": "acct4", "email": "other@example.com", "profile": {"name": "Dan"}}),
    );
    store
}

fn by_email() -> IndexQuery {
    IndexQuery::new(EMAIL_INDEX, "email", json!("shared@example.com"))
}

#[tokio::test]
async fn test_query_field_groups_by_primary_key() {
    let store = seeded();
    let table = table(&store);

    let (values, metadata) = table
        .query_field(by_email(), "profile.name", &none())
        .await
        .unwrap();

    let values = values.expect("three accounts share the email");
    assert_eq!(values.len(), 3);
    assert_eq!(values["acct1"], json!("Alice"));
    assert_eq!(values["acct3"], json!("Carol"));
    assert!(!values.contains_key("acct4"));
    assert_eq!(metadata.count, 3);
    assert!(metadata.has_reached_end);
    assert!(metadata.continuation_token.is_none());
}

#[tokio::test]
async fn test_primary_key_is_always_projected() {
    let store = seeded();
    let table = table(&store);

    let chains = vec![Chain::new(vec![PathElement::named("email", ContainerType::Scalar)])];
    let (rows, _) = SecondaryIndexAdapter::new(&table)
        .query(by_email(), &chains)
        .await
        .unwrap();

    let rows = rows.unwrap();
    assert_eq!(rows.len(), 3, "rows are keyed by primary key without requesting it");
    assert_eq!(rows["acct2"]["accountId"], json!("acct2"));

    let StoreRequest::Query(query) = &store.requests()[0] else {
        panic!("expected a query");
    };
    assert!(query.projection.alias_table.values().any(|name| name == PRIMARY_KEY));
    assert_eq!(query.index_name, EMAIL_INDEX);
}

#[tokio::test]
async fn test_query_pages_with_continuation() {
    let store = seeded();
    let table = table(&store);

    let (first, metadata) = table
        .query_field(by_email().limit(2), "profile.name", &none())
        .await
        .unwrap();
    assert_eq!(first.unwrap().len(), 2);
    assert_eq!(metadata.count, 2);
    assert!(!metadata.has_reached_end);

    let (second, metadata) = table
        .query_field(by_email().limit(2).continue_from(&metadata), "profile.name", &none())
        .await
        .unwrap();
    let second = second.unwrap();
    assert_eq!(second.len(), 1);
    assert_eq!(second["acct3"], json!("Carol"));
    assert!(metadata.has_reached_end);
}

#[tokio::test]
async fn test_query_selector_group() {
    let store = seeded();
    let table = table(&store);

    let (values, _) = table
        .query_field(by_email(), "profile.(name, age)", &none())
        .await
        .unwrap();
    assert_eq!(values.unwrap()["acct2"], json!({"name": "Bob", "age": 20}));
}

#[tokio::test]
async fn test_query_without_matches_is_none() {
    let store = seeded();
    let table = table(&store);

    let query = IndexQuery::new(EMAIL_INDEX, "email", json!("nobody@example.com"));
    let (values, metadata) = table.query_field(query, "profile.name", &none()).await.unwrap();
    assert!(values.is_none());
    assert_eq!(metadata.count, 0);
    assert!(metadata.has_reached_end);
}

#[tokio::test]
async fn test_query_failure_is_absence() {
    let store = seeded();
    store.fail_when(request_named("Query"), TransportError::service("throttled"));
    let table = table(&store);

    let (values, metadata) = table
        .query_field(by_email(), "profile.name", &none())
        .await
        .unwrap();
    assert!(values.is_none());
    assert_eq!(metadata.count, 0);
}

#[tokio::test]
async fn test_query_answered_without_rows_is_a_failure() {
    let table = Table::new(
        WriteAnswers,
        account_schema(),
        TableSettings::new(TABLE, PRIMARY_KEY),
    );

    let chains = vec![Chain::new(vec![PathElement::named("email", ContainerType::Scalar)])];
    let result = SecondaryIndexAdapter::new(&table).query(by_email(), &chains).await;
    assert!(result.is_err(), "a response without rows is not an empty page");

    let (values, metadata) = table
        .query_field(by_email(), "profile.name", &none())
        .await
        .unwrap();
    assert!(values.is_none());
    assert_eq!(metadata.count, 0);
}
