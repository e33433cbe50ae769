//! Document model for logdoc
//!
//! A document is an open-ended JSON object with three reserved fields:
//!
//! - `_id`: opaque unique identifier, assigned at insert, immutable
//! - `_created`: timestamp set once at insert
//! - `_modified`: timestamp refreshed on every mutation
//!
//! Documents handed out by a table are owned copies; mutating one never
//! changes the table's state.

mod record;
mod value;

pub use record::{Document, CREATED_FIELD, ID_FIELD, MODIFIED_FIELD};
pub use value::{
    compare_ordered, compare_values, format_timestamp, number_value, parse_date,
};
