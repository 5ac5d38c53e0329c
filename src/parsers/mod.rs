//! Field Parsers
//!
//! Reshape one field (usually the message) into a new field set. Used by the
//! `parse <field> with <parser>` query stage.
//!
//! - **csv**: `;` delimited rows with an auto-detected sticky header
//! - **json**: objects flattened into dot-separated keys
//! - **kv**: whitespace-separated `key=value` pairs

mod csv;
mod json;
mod kv;

pub use self::csv::CsvParser;
pub use self::json::JsonParser;
pub use self::kv::KvParser;

use crate::log::Fields;
use std::sync::Arc;

/// Contract for field parsers
///
/// `try_parse` returns `None` when the input does not fit the format; the
/// record is then left untouched.
pub trait FieldParser: Send + Sync + std::fmt::Debug {
    /// Name used in queries
    fn name(&self) -> &'static str;

    /// Parse the input into a fresh field set
    fn try_parse(&self, input: &str) -> Option<Fields>;
}

/// Names accepted by `parser_by_name`
pub const PARSER_NAMES: &[&str] = &["csv", "json", "kv"];

/// Instantiate a parser by name
///
/// Every call returns a fresh instance, so stateful parsers (CSV header
/// detection) are scoped to one query.
pub fn parser_by_name(name: &str) -> Option<Arc<dyn FieldParser>> {
    match name.to_lowercase().as_str() {
        "csv" => Some(Arc::new(CsvParser::new())),
        "json" => Some(Arc::new(JsonParser)),
        "kv" | "keyvalue" => Some(Arc::new(KvParser)),
        _ => None,
    }
}
