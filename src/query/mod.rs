//! Log Query Engine
//!
//! Compiles query text into a plan of match and pipeline nodes and executes
//! it over log records:
//!
//! - **AST / Parser**: query text → syntax tree (nom)
//! - **Compiler**: syntax tree → typed [`Node`] plan
//! - **Expr**: typed expressions over record fields and attributes
//! - **Aggregate**: mergeable aggregate states
//! - **Executor**: runs a plan with index pre-filtering and partitioned aggregation
//!
//! # Query Language
//!
//! ```text
//! "pattern {capture:type}" [predicate] not "other" or (...)
//!   | parse <field|@attr> with csv|json|kv
//!   | select expr [as name], ...
//!   | aggregate fn(expr) [as name], ...
//!   | group by expr [as name], ... compute fn(expr) [as name], ...
//!   | order by expr [asc|desc], ...
//!   | limit n
//! ```
//!
//! # Examples
//!
//! ```rust,ignore
//! use logviewer::config::Config;
//! use logviewer::log::{LogSource, MemoryLog};
//! use logviewer::query::Cancellation;
//!
//! let log = MemoryLog::from_text("app.log", "error 500\nok\nerror 404\n");
//! let result = log.query(
//!     r#""error {code:number}" | aggregate count(), max(code)"#,
//!     &Config::default(),
//!     &Cancellation::new(),
//! )?;
//! ```

mod aggregate;
mod ast;
mod compiler;
mod error;
mod executor;
mod expr;
mod parser;
mod plan;

pub use aggregate::{AggregateFunction, AggregateState};
pub use ast::{
    AggregateSyntax, ExprSyntax, FilterSyntax, ProjectionSyntax, QueryText, Stage,
};
pub use compiler::{compile, Compiler};
pub use error::{QueryError, QueryResult};
pub use executor::{Cancellation, Executor, ResultSet};
pub use expr::{cast, compare, BinaryOp, Expr, UnaryOp};
pub use parser::parse_query;
pub use plan::{AggregateCall, Column, Node, OrderKey, PhraseNode, Projection};
