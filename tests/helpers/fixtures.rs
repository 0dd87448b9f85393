/// Account schema shared by the integration tests
///
/// Covers every field shape: nested maps, a dict keyed by item id, a list,
/// a set and a validated scalar.
use dynamo_fields::{FieldNode, FieldSchema, FieldValidator, Substitutions};
use serde_json::Value;
use std::sync::Arc;

pub const TABLE: &str = "accounts";
pub const PRIMARY_KEY: &str = "accountId";
pub const EMAIL_INDEX: &str = "by-email";

/// Rejects negative or non-numeric values on write, negative values on read
#[derive(Debug)]
pub struct NonNegative;

impl FieldValidator for NonNegative {
    fn validate_on_read(&self, raw: Value) -> (Value, bool) {
        let valid = raw.as_i64().map(|n| n >= 0).unwrap_or(false);
        (raw, valid)
    }

    fn validate_on_write(&self, raw: Value) -> (Value, bool) {
        let valid = raw.as_i64().map(|n| n >= 0).unwrap_or(false);
        (raw, valid)
    }
}

pub fn account_schema() -> FieldSchema {
    let address = FieldSchema::builder()
        .field(FieldNode::scalar("city"))
        .field(FieldNode::scalar("zip"))
        .build()
        .unwrap();

    let profile = FieldSchema::builder()
        .field(FieldNode::scalar("name"))
        .field(FieldNode::scalar("age").validator(Arc::new(NonNegative)))
        .field(FieldNode::map("address", address))
        .build()
        .unwrap();

    let container = FieldSchema::builder()
        .field(FieldNode::scalar("a"))
        .field(FieldNode::scalar("b"))
        .build()
        .unwrap();

    let item = FieldSchema::builder()
        .field(FieldNode::scalar("name"))
        .field(FieldNode::scalar("qty").validator(Arc::new(NonNegative)))
        .build()
        .unwrap();

    FieldSchema::builder()
        .field(FieldNode::scalar(PRIMARY_KEY))
        .field(FieldNode::scalar("status"))
        .field(FieldNode::scalar("email"))
        .field(FieldNode::map("profile", profile))
        .field(FieldNode::map("container", container))
        .field(FieldNode::dict("items", "itemId", FieldNode::map("", item)))
        .field(FieldNode::list("scores", "index", FieldNode::scalar("")))
        .field(FieldNode::set("tags"))
        .build()
        .unwrap()
}

/// Substitutions from `(name, value)` pairs
pub fn subs(pairs: &[(&str, Value)]) -> Substitutions {
    pairs
        .iter()
        .map(|(name, value)| (name.to_string(), value.clone()))
        .collect()
}

/// No substitutions
pub fn none() -> Substitutions {
    Substitutions::new()
}
