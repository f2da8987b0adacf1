//! Survey domain: the immutable schema and the answer records built from it.

mod record;
mod schema;

pub use record::Record;
pub use schema::{
    ButtonOption, Question, SchemaError, Section, Survey, CALLBACK_SEPARATOR, RESERVED_KEY_PREFIX,
};
