//! Update, removal and projection expressions, and navigation of fetched records.

mod builder;
mod navigate;

pub use builder::{
    attribute_alias, value_placeholder, ExpressionBuilder, Projection, UpdateTarget, WriteBatch,
    EXPRESSION_SIZE_CEILING,
};
pub use navigate::navigate;
