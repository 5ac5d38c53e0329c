//! Log records and sources
//!
//! - [`LogItem`]: one record (file, member, position, line, message, fields)
//! - [`Value`] / [`ValueType`]: dynamically typed field values
//! - [`LogSource`]: seam through which records reach the query engine

mod source;
mod types;

pub use source::{LogSource, MemoryLog};
pub use types::{Attribute, Fields, LogItem, Value, ValueType, DISPLAY_TIME_FORMAT};
