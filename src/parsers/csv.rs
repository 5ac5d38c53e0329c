//! CSV Field Parser
//!
//! Parses `;` delimited records. The first row whose cells are all
//! identifier-like (letters, digits, `_`) and not numbers becomes the header;
//! it stays in place for the lifetime of the parser. Rows seen before any
//! header get positional names `column1..N`.

use super::FieldParser;
use crate::log::{Fields, Value};
use std::sync::OnceLock;

/// CSV parser with auto-detected header
#[derive(Debug)]
pub struct CsvParser {
    /// Field delimiter
    delimiter: u8,
    /// Column names, set once
    header: OnceLock<Vec<String>>,
}

impl Default for CsvParser {
    fn default() -> Self {
        Self::new()
    }
}

impl CsvParser {
    /// Create a parser for `;` delimited input
    pub fn new() -> Self {
        Self {
            delimiter: b';',
            header: OnceLock::new(),
        }
    }

    /// Set the delimiter
    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Use a fixed header instead of detecting one
    pub fn with_header(self, columns: &[&str]) -> Self {
        let _ = self
            .header
            .set(columns.iter().map(|c| c.to_string()).collect());
        self
    }

    /// Detected or configured header
    pub fn header(&self) -> Option<&[String]> {
        self.header.get().map(|h| h.as_slice())
    }

    /// Split one record into trimmed cells
    fn split(&self, input: &str) -> Option<Vec<String>> {
        let mut reader = ::csv::ReaderBuilder::new()
            .delimiter(self.delimiter)
            .has_headers(false)
            .flexible(true)
            .from_reader(input.as_bytes());

        let record = reader.records().next()?.ok()?;
        Some(record.iter().map(|cell| cell.trim().to_string()).collect())
    }
}

fn is_header_row(cells: &[String]) -> bool {
    !cells.is_empty()
        && cells.iter().all(|cell| {
            !cell.is_empty()
                && cell.chars().all(|c| c.is_alphanumeric() || c == '_')
                && cell.parse::<f64>().is_err()
        })
}

impl FieldParser for CsvParser {
    fn name(&self) -> &'static str {
        "csv"
    }

    fn try_parse(&self, input: &str) -> Option<Fields> {
        let cells = self.split(input)?;

        if self.header.get().is_none() && is_header_row(&cells) {
            // Concurrent callers may race here; the first header wins
            let _ = self.header.set(cells);
            return None;
        }

        let header = self.header.get();
        let mut fields = Fields::with_capacity(cells.len());
        for (idx, cell) in cells.into_iter().enumerate() {
            let name = header
                .and_then(|h| h.get(idx).cloned())
                .unwrap_or_else(|| format!("column{}", idx + 1));
            fields.insert(name, Value::String(cell));
        }

        Some(fields)
    }
}
