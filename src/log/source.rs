//! Log sources
//!
//! A [`LogSource`] yields records; the provided `query` method compiles and
//! runs a query over them. [`MemoryLog`] splits text into one record per
//! line, keeping 1-based line numbers and byte offsets.

use super::types::LogItem;
use crate::config::Config;
use crate::query::{compile, Cancellation, Executor, QueryResult, ResultSet};
use std::path::Path;
use tracing::debug;

/// Anything that can produce log records
pub trait LogSource {
    /// All records, in source order
    fn read(&self) -> Vec<LogItem>;

    /// Compile `text` and run it over the records of this source
    fn query(
        &self,
        text: &str,
        config: &Config,
        cancellation: &Cancellation,
    ) -> QueryResult<ResultSet> {
        let plan = compile(text, &config.query)?;
        Executor::new(config.execution.clone()).execute(&plan, self.read(), cancellation)
    }
}

/// Records held in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryLog {
    items: Vec<LogItem>,
}

impl MemoryLog {
    pub fn new(items: Vec<LogItem>) -> Self {
        Self { items }
    }

    /// Split text into line records
    ///
    /// `\n` and `\r\n` both end a line; positions are byte offsets of the
    /// line start.
    pub fn from_text(file: impl Into<String>, text: &str) -> Self {
        let file = file.into();
        let mut items = Vec::new();
        let mut position = 0u64;

        for (idx, raw) in text.split_inclusive('\n').enumerate() {
            let line = raw.trim_end_matches('\n').trim_end_matches('\r');
            items.push(LogItem::new(file.clone(), idx as u64 + 1, position, line));
            position += raw.len() as u64;
        }

        Self { items }
    }

    /// Read a file from disk
    pub fn load(path: &Path) -> std::io::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let log = Self::from_text(path.display().to_string(), &text);
        debug!(path = %path.display(), records = log.len(), "Loaded log file");
        Ok(log)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[LogItem] {
        &self.items
    }
}

impl LogSource for MemoryLog {
    fn read(&self) -> Vec<LogItem> {
        self.items.clone()
    }
}

/// Several sources read one after another
impl<S: LogSource> LogSource for Vec<S> {
    fn read(&self) -> Vec<LogItem> {
        self.iter().flat_map(|source| source.read()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::Value;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_from_text_positions() {
        let log = MemoryLog::from_text("app.log", "first\r\nsecond\n\nlast");
        let items = log.items();

        assert_eq!(items.len(), 4);
        assert_eq!(items[0].message, "first");
        assert_eq!(items[1].message, "second");
        assert_eq!(items[1].position, 7);
        assert_eq!(items[2].message, "");
        assert_eq!(items[3].line, 4);
        assert_eq!(items[3].position, 15);
        assert_eq!(items[3].file, "app.log");
    }

    #[test]
    fn test_query_through_source() {
        let log = MemoryLog::from_text("app.log", "error 500\nok\nerror 404\n");
        let result = log
            .query(
                r#""error {code:number}" | aggregate count() as n, max(code) as worst"#,
                &Config::default(),
                &Cancellation::new(),
            )
            .unwrap();

        assert_eq!(result.records_scanned, 3);
        assert_eq!(result.value(0, "n"), Some(&Value::Integer(2)));
        assert_eq!(result.value(0, "worst"), Some(&Value::Number(500.0)));
    }

    #[test]
    fn test_load_and_concatenate() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "a\nb\n").unwrap();

        let first = MemoryLog::load(file.path()).unwrap();
        let second = MemoryLog::from_text("other.log", "c");
        let all = vec![first, second].read();

        assert_eq!(all.len(), 3);
        assert_eq!(all[2].file, "other.log");
        assert_eq!(all[1].position, 2);
    }
}
