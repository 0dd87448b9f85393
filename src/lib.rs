//! # DynamoDB Field Access
//!
//! Schema-aware access to deeply nested fields of DynamoDB documents:
//! - Field paths with `{{placeholders}}`, list indices and `(a, b)` selector groups
//! - Partial updates and removals split under the 4000 byte expression ceiling
//! - Automatic creation of missing ancestor maps, safe against concurrent writers
//! - A write-behind cache with a pending operation ledger
//! - Secondary index queries regrouped by primary key
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use dynamo_fields::{
//!     CachingTable, ClientPool, ClientSettings, Error, FieldNode, FieldSchema, Substitutions,
//!     Table, TableSettings,
//! };
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Error> {
//!     let schema = FieldSchema::builder()
//!         .field(FieldNode::scalar("accountId"))
//!         .field(FieldNode::map(
//!             "profile",
//!             FieldSchema::builder()
//!                 .field(FieldNode::scalar("name"))
//!                 .field(FieldNode::scalar("age"))
//!                 .build()?,
//!         ))
//!         .field(FieldNode::dict("items", "itemId", FieldNode::scalar("")))
//!         .build()?;
//!
//!     let pool = ClientPool::new(ClientSettings::from_env());
//!     let transport = pool.transport("eu-west-1").await;
//!     let table = Table::new(transport, schema, TableSettings::new("accounts", "accountId"));
//!
//!     // Missing ancestors are created on the fly
//!     let none = Substitutions::new();
//!     table.update_field("acct1", "profile.name", &none, json!("Alice")).await?;
//!
//!     let mut substitutions = Substitutions::new();
//!     substitutions.insert("itemId".to_string(), json!("sku-1"));
//!     table.update_field("acct1", "items.{{itemId}}", &substitutions, json!(2)).await?;
//!
//!     // Several fields at once
//!     let profile = table.get_field("acct1", "profile.(name, age)", &none).await?;
//!     println!("{profile:?}");
//!
//!     // Deferred writes
//!     let mut cached = CachingTable::new(table);
//!     cached.update_field("acct1", "profile.age", &none, json!(31))?;
//!     cached.commit_operations("acct1").await?;
//!
//!     Ok(())
//! }
//! ```
#![deny(
    warnings,
    bad_style,
    dead_code,
    improper_ctypes,
    non_shorthand_field_patterns,
    no_mangle_generic_items,
    overflowing_literals,
    path_statements,
    patterns_in_fns_without_body,
    unconditional_recursion,
    unused,
    unused_allocation,
    unused_comparisons,
    unused_parens,
    while_true,
    missing_debug_implementations,
    missing_docs,
    trivial_casts,
    trivial_numeric_casts,
    unreachable_pub,
    unused_extern_crates,
    unused_import_braces,
    unused_qualifications,
    unused_results,
    deprecated,
    unknown_lints,
    unreachable_code,
    unused_mut
)]

mod error;
pub use error::{Error, TransportError, TransportErrorKind};

/// Write-behind cache and pending operation ledger
pub mod cache;

/// Update, removal and projection expressions
pub mod expression;

/// Remote operation envelope
pub mod operation;

/// Field path resolution
pub mod path;

/// Field declarations and path elements
pub mod schema;

/// Schema-aware table engine
pub mod table;

/// Store access
pub mod transport;

// Re-export main types for convenience
pub use cache::{CacheStore, CachingTable, PendingLedger};
pub use expression::{ExpressionBuilder, UpdateTarget, WriteBatch, EXPRESSION_SIZE_CEILING};
pub use operation::{Operation, OperationOutput};
pub use path::{resolve, ResolvedField, ResolvedTarget, Substitutions};
pub use schema::{
    Chain, ContainerType, ElementKey, FieldHandle, FieldNode, FieldSchema, FieldShape,
    FieldValidator, PassThrough, PathElement,
};
pub use table::{
    FieldGetter, FieldRemover, FieldSetter, IndexQuery, QueryMetadata, SecondaryIndexAdapter,
    Table, TableSettings,
};
pub use transport::{
    ClientPool, ClientSettings, DynamoDbTransport, PrimaryKey, Record, StoreRequest,
    StoreResponse, Transport,
};

// Re-export aws-config types for configuration
pub use aws_config::{BehaviorVersion, Region, SdkConfig};
