//! Query Syntax Tree
//!
//! Unbound output of the parser. Names (fields, attributes, aggregates,
//! parsers, type annotations) are kept as written; the compiler resolves
//! them and reports unknown ones.
//!
//! # Example Queries
//!
//! ```text
//! "error {code:number}" [code >= 500]
//! "GET" or "POST" | parse @message with kv | group by status compute count()
//! * | parse @message with json | select level, req.ms:number as ms | order by ms desc | limit 10
//! ```

use super::expr::{BinaryOp, UnaryOp};
use crate::log::Value;

/// A parsed query: optional filter followed by pipeline stages
#[derive(Debug, Clone, PartialEq)]
pub struct QueryText {
    pub filter: Option<FilterSyntax>,
    pub stages: Vec<Stage>,
}

/// Filter part of a query
#[derive(Debug, Clone, PartialEq)]
pub enum FilterSyntax {
    /// `*`
    All,
    /// `"pattern"` or `"pattern" set name = literal`; a bare word is a
    /// phrase of that word
    Phrase {
        pattern: String,
        marker: Option<(String, Value)>,
    },
    /// `[expression]`
    Predicate(ExprSyntax),
    And(Vec<FilterSyntax>),
    Or(Vec<FilterSyntax>),
    Not(Box<FilterSyntax>),
}

/// Expression as written
#[derive(Debug, Clone, PartialEq)]
pub enum ExprSyntax {
    Literal(Value),
    /// `name` or `name:type`
    Field {
        name: String,
        annotation: Option<String>,
    },
    /// `@name`
    Attribute(String),
    Unary(UnaryOp, Box<ExprSyntax>),
    Binary(BinaryOp, Box<ExprSyntax>, Box<ExprSyntax>),
}

impl ExprSyntax {
    pub fn field(name: impl Into<String>) -> Self {
        ExprSyntax::Field {
            name: name.into(),
            annotation: None,
        }
    }

    pub fn binary(op: BinaryOp, left: ExprSyntax, right: ExprSyntax) -> Self {
        ExprSyntax::Binary(op, Box::new(left), Box::new(right))
    }
}

/// `expr [as alias]`
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectionSyntax {
    pub expr: ExprSyntax,
    pub alias: Option<String>,
}

/// `function([expr]) [as alias]`
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateSyntax {
    pub function: String,
    pub argument: Option<ExprSyntax>,
    pub alias: Option<String>,
}

/// A pipeline stage following `|`
#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    /// `parse <field|@attribute> with <parser>`
    Parse { source: ExprSyntax, parser: String },
    /// `select expr [as name], ...`
    Select(Vec<ProjectionSyntax>),
    /// `aggregate agg(...) [as name], ...`
    Aggregate(Vec<AggregateSyntax>),
    /// `group by expr [as name], ... compute agg(...), ...`
    GroupBy {
        keys: Vec<ProjectionSyntax>,
        aggregates: Vec<AggregateSyntax>,
    },
    /// `order by expr [asc|desc], ...`; the flag is `true` for descending
    OrderBy(Vec<(ExprSyntax, bool)>),
    /// `limit n`
    Limit(usize),
}
