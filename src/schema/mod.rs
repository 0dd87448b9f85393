//! Field declarations and the path elements resolved against them.

mod element;
mod field;

pub use element::{Chain, ContainerType, ElementKey, PathElement};
pub use field::{
    FieldHandle, FieldNode, FieldSchema, FieldSchemaBuilder, FieldShape, FieldValidator,
    PassThrough, RESERVED_CHARACTERS,
};
