use serde_json::Value;
use std::{fmt, sync::Arc};

use super::element::ContainerType;
use crate::error::Error;

/// Characters with a meaning in path expressions, never allowed in field names.
pub const RESERVED_CHARACTERS: [char; 7] = ['[', ']', '{', '}', '(', ')', '|'];

/// Validation and transformation capability of a declared field.
///
/// The core never type-checks values itself; it hands every value read from or
/// written to the store to the field's validator and honours the verdict.
pub trait FieldValidator: Send + Sync + fmt::Debug {
    /// Validate a value read from the store. Returns the (possibly
    /// transformed) value and whether it is valid.
    fn validate_on_read(&self, raw: Value) -> (Value, bool);

    /// Validate a value about to be written.
    fn validate_on_write(&self, raw: Value) -> (Value, bool);
}

/// Validator accepting every value unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassThrough;

impl FieldValidator for PassThrough {
    fn validate_on_read(&self, raw: Value) -> (Value, bool) {
        (raw, true)
    }

    fn validate_on_write(&self, raw: Value) -> (Value, bool) {
        (raw, true)
    }
}

/// Opaque, cheaply cloneable handle on a field's validator.
#[derive(Clone)]
pub struct FieldHandle(Arc<dyn FieldValidator>);

impl FieldHandle {
    /// Wrap a validator.
    pub fn new(validator: Arc<dyn FieldValidator>) -> Self {
        Self(validator)
    }

    /// See [`FieldValidator::validate_on_read`].
    pub fn validate_on_read(&self, raw: Value) -> (Value, bool) {
        self.0.validate_on_read(raw)
    }

    /// See [`FieldValidator::validate_on_write`].
    pub fn validate_on_write(&self, raw: Value) -> (Value, bool) {
        self.0.validate_on_write(raw)
    }
}

impl Default for FieldHandle {
    fn default() -> Self {
        Self(Arc::new(PassThrough))
    }
}

impl fmt::Debug for FieldHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("FieldHandle").field(&self.0).finish()
    }
}

/// Shape of a declared field.
#[derive(Debug, Clone)]
pub enum FieldShape {
    /// Leaf value
    Scalar,
    /// Set of scalars
    Set,
    /// Map with fixed, declared children
    Map(FieldSchema),
    /// Map with caller chosen keys, addressed as `{{key_name}}`
    Dict {
        /// Placeholder name for the dynamic key
        key_name: String,
        /// Declaration shared by every value
        value: Box<FieldNode>,
    },
    /// List addressed by integer position, `{{key_name}}` or a literal number
    List {
        /// Placeholder name for the index
        key_name: String,
        /// Declaration shared by every item
        item: Box<FieldNode>,
    },
}

/// A declared field.
#[derive(Debug, Clone)]
pub struct FieldNode {
    name: String,
    shape: FieldShape,
    handle: FieldHandle,
    default_value: Option<Value>,
}

impl FieldNode {
    fn new(name: impl Into<String>, shape: FieldShape) -> Self {
        Self {
            name: name.into(),
            shape,
            handle: FieldHandle::default(),
            default_value: None,
        }
    }

    /// Declare a scalar field.
    pub fn scalar(name: impl Into<String>) -> Self {
        Self::new(name, FieldShape::Scalar)
    }

    /// Declare a set field.
    pub fn set(name: impl Into<String>) -> Self {
        Self::new(name, FieldShape::Set)
    }

    /// Declare a map field with fixed children.
    pub fn map(name: impl Into<String>, children: FieldSchema) -> Self {
        Self::new(name, FieldShape::Map(children))
    }

    /// Declare a map field with dynamic keys.
    ///
    /// The value node is renamed to `key_name`.
    pub fn dict(name: impl Into<String>, key_name: impl Into<String>, value: FieldNode) -> Self {
        let key_name = key_name.into();
        let value = FieldNode {
            name: key_name.clone(),
            ..value
        };
        Self::new(
            name,
            FieldShape::Dict {
                key_name,
                value: Box::new(value),
            },
        )
    }

    /// Declare a list field.
    ///
    /// The item node is renamed to `key_name`.
    pub fn list(name: impl Into<String>, key_name: impl Into<String>, item: FieldNode) -> Self {
        let key_name = key_name.into();
        let item = FieldNode {
            name: key_name.clone(),
            ..item
        };
        Self::new(
            name,
            FieldShape::List {
                key_name,
                item: Box::new(item),
            },
        )
    }

    /// Attach a validator.
    pub fn validator(mut self, validator: Arc<dyn FieldValidator>) -> Self {
        self.handle = FieldHandle::new(validator);
        self
    }

    /// Override the value used when this field is auto-initialised.
    pub fn default_value(mut self, value: Value) -> Self {
        self.default_value = Some(value);
        self
    }

    /// Declared name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared shape
    pub fn shape(&self) -> &FieldShape {
        &self.shape
    }

    /// Validation handle
    pub fn handle(&self) -> &FieldHandle {
        &self.handle
    }

    /// Custom default, if declared
    pub fn custom_default(&self) -> Option<&Value> {
        self.default_value.as_ref()
    }

    /// Container type written for this field.
    pub fn container(&self) -> ContainerType {
        match self.shape {
            FieldShape::Scalar => ContainerType::Scalar,
            FieldShape::Set => ContainerType::Set,
            FieldShape::Map(_) | FieldShape::Dict { .. } => ContainerType::Map,
            FieldShape::List { .. } => ContainerType::List,
        }
    }

    fn check_reserved(&self) -> Result<(), Error> {
        check_name(&self.name)?;
        match &self.shape {
            FieldShape::Scalar | FieldShape::Set => Ok(()),
            FieldShape::Map(children) => children.fields.iter().try_for_each(Self::check_reserved),
            FieldShape::Dict { key_name, value } => {
                check_name(key_name)?;
                value.check_reserved()
            }
            FieldShape::List { key_name, item } => {
                check_name(key_name)?;
                item.check_reserved()
            }
        }
    }
}

fn check_name(name: &str) -> Result<(), Error> {
    match name.chars().find(|c| RESERVED_CHARACTERS.contains(c)) {
        Some(character) => Err(Error::ReservedCharacter {
            field: name.to_string(),
            character,
        }),
        None => Ok(()),
    }
}

/// Declared fields of a record or of a nested map, in declaration order.
#[derive(Debug, Clone, Default)]
pub struct FieldSchema {
    fields: Vec<FieldNode>,
}

impl FieldSchema {
    /// Start declaring a schema.
    pub fn builder() -> FieldSchemaBuilder {
        FieldSchemaBuilder::default()
    }

    /// Look up a direct child by name.
    pub fn field(&self, name: &str) -> Option<&FieldNode> {
        self.fields.iter().find(|field| field.name == name)
    }

    /// All direct children
    pub fn fields(&self) -> &[FieldNode] {
        &self.fields
    }
}

/// Builder for [`FieldSchema`]; field names are checked on [`build`](Self::build).
#[derive(Debug, Default)]
pub struct FieldSchemaBuilder {
    fields: Vec<FieldNode>,
}

impl FieldSchemaBuilder {
    /// Declare a field. A later declaration with the same name replaces the earlier one.
    pub fn field(mut self, node: FieldNode) -> Self {
        self.fields.retain(|existing| existing.name != node.name);
        self.fields.push(node);
        self
    }

    /// Finish the declaration.
    ///
    /// Fails with [`Error::ReservedCharacter`] when any name in the tree
    /// contains one of [`RESERVED_CHARACTERS`].
    pub fn build(self) -> Result<FieldSchema, Error> {
        for field in &self.fields {
            field.check_reserved()?;
        }
        Ok(FieldSchema {
            fields: self.fields,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug)]
    struct RejectNegative;

    impl FieldValidator for RejectNegative {
        fn validate_on_read(&self, raw: Value) -> (Value, bool) {
            (raw, true)
        }

        fn validate_on_write(&self, raw: Value) -> (Value, bool) {
            let valid = raw.as_i64().map(|n| n >= 0).unwrap_or(false);
            (raw, valid)
        }
    }

    #[test]
    fn test_reserved_character_rejected_at_declaration() {
        let err = FieldSchema::builder()
            .field(FieldNode::scalar("bad(name"))
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            Error::ReservedCharacter { character: '(', .. }
        ));
    }

    #[test]
    fn test_reserved_character_rejected_in_nested_item() {
        let err = FieldSchema::builder()
            .field(FieldNode::dict(
                "items",
                "itemId",
                FieldNode::map(
                    "",
                    FieldSchema {
                        fields: vec![FieldNode::scalar("na|me")],
                    },
                ),
            ))
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::ReservedCharacter { character: '|', .. }));
    }

    #[test]
    fn test_dots_and_spaces_are_allowed() {
        let schema = FieldSchema::builder()
            .field(FieldNode::scalar("first name"))
            .field(FieldNode::scalar("a-b"))
            .build()
            .unwrap();
        assert!(schema.field("first name").is_some());
    }

    #[test]
    fn test_redeclaring_replaces_field() {
        let schema = FieldSchema::builder()
            .field(FieldNode::scalar("tags"))
            .field(FieldNode::set("tags"))
            .build()
            .unwrap();
        assert_eq!(schema.fields().len(), 1);
        assert_eq!(
            schema.field("tags").unwrap().container(),
            ContainerType::Set
        );
    }

    #[test]
    fn test_handle_delegates_to_validator() {
        let node = FieldNode::scalar("age").validator(Arc::new(RejectNegative));
        assert!(node.handle().validate_on_write(json!(3)).1);
        assert!(!node.handle().validate_on_write(json!(-3)).1);
        assert!(FieldHandle::default().validate_on_write(json!(-3)).1);
    }

    #[test]
    fn test_dict_value_takes_key_name() {
        let node = FieldNode::dict("items", "itemId", FieldNode::scalar("ignored"));
        match node.shape() {
            FieldShape::Dict { value, .. } => assert_eq!(value.name(), "itemId"),
            other => panic!("unexpected shape {other:?}"),
        }
    }
}
