//! # LogViewer
//!
//! Log query engine: phrase patterns with typed captures, boolean filters,
//! field parsers, projections and streaming aggregation over log records.
//!
//! ## Modules
//!
//! - [`log`]: Log records, dynamic values and log sources
//! - [`pattern`]: Phrase pattern compilation and token extraction
//! - [`index`]: Trigram index used to pre-filter records
//! - [`parsers`]: CSV / JSON / key-value field parsers
//! - [`query`]: Query language parser, compiler and executor
//! - [`config`]: Configuration loading
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use logviewer::{Cancellation, Config, LogSource, MemoryLog};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let log = MemoryLog::load(std::path::Path::new("app.log"))?;
//!
//!     let result = log.query(
//!         r#""GET {path} took {ms:number}ms" | group by path compute count(), median(ms)"#,
//!         &Config::default(),
//!         &Cancellation::new(),
//!     )?;
//!
//!     println!("{} groups", result.len());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod index;
pub mod log;
pub mod parsers;
pub mod pattern;
pub mod query;

// Re-export top-level types for convenience
pub use config::{Config, ConfigError, ExecutionConfig, LoggingConfig, QueryConfig};

pub use log::{LogItem, LogSource, MemoryLog, Value, ValueType};

pub use pattern::{Pattern, PatternError};

pub use query::{compile, Cancellation, Executor, Node, QueryError, QueryResult, ResultSet};
