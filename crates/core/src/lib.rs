//! `shopkit-core`: shared building blocks for the record store and event channel.
//!
//! This crate contains **pure** primitives (no IO): the error taxonomy, column
//! values/rows and the `Record` mapping trait.

pub mod error;
pub mod record;
pub mod value;

pub use error::{DataError, DataResult};
pub use record::Record;
pub use value::{Row, Value};
