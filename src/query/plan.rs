//! Query Plan
//!
//! A compiled query is a tree of [`Node`]s. Match nodes decide whether a
//! record is kept; pipeline nodes wrap an inner node and transform the
//! stream it produces:
//!
//! ```text
//! Limit ← OrderBy ← GroupBy ← Parse ← And ─┬─ Phrase "error {code:number}"
//!                                          └─ Predicate [code >= 500]
//! ```
//!
//! Match nodes can be folded into a single [`Expr`] with [`Node::predicate`]
//! and evaluated record by record, or pre-filtered with the token index
//! using the phrases' token sets.

use super::aggregate::{AggregateFunction, AggregateState};
use super::expr::Expr;
use crate::log::{LogItem, Value, ValueType};
use crate::parsers::FieldParser;
use crate::pattern::{extract_tokens, parse_time, CaptureKind, Pattern, TokenSet};
use serde::Serialize;
use std::sync::Arc;
use tracing::trace;

/// Output column of a plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Column {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: ValueType,
}

impl Column {
    pub fn new(name: impl Into<String>, ty: ValueType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// A phrase filter: pattern, index tokens and capture conversion
#[derive(Debug)]
pub struct PhraseNode {
    pattern: Pattern,
    tokens: TokenSet,
    /// Default format for `:time` captures
    time_format: String,
    /// Field set on every matching record (`"..." set name = value`)
    marker: Option<(String, Value)>,
}

impl PhraseNode {
    pub fn new(
        pattern: Pattern,
        time_format: impl Into<String>,
        marker: Option<(String, Value)>,
    ) -> Self {
        let tokens = extract_tokens(&pattern, marker.is_some());
        Self {
            pattern,
            tokens,
            time_format: time_format.into(),
            marker,
        }
    }

    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    pub fn tokens(&self) -> &TokenSet {
        &self.tokens
    }

    pub fn marker(&self) -> Option<&(String, Value)> {
        self.marker.as_ref()
    }

    /// Match a message and convert its captures
    ///
    /// Returns `None` when the pattern does not match or any typed capture
    /// fails to convert; both count as "no match".
    pub fn capture_values(&self, message: &str) -> Option<Vec<Value>> {
        let matched = self.pattern.matches(message);
        if !matched.success {
            return None;
        }

        self.pattern
            .captures()
            .iter()
            .zip(matched.captures)
            .map(|(capture, text)| {
                let value = match &capture.kind {
                    CaptureKind::String => return Some(Value::String(text)),
                    CaptureKind::Number => text.trim().parse::<f64>().ok().map(Value::Number),
                    kind => {
                        parse_time(&text, kind.time_format(&self.time_format)).map(Value::Time)
                    }
                };
                if value.is_none() {
                    trace!(
                        capture = %capture.name,
                        kind = %capture.kind,
                        text = %text,
                        "Capture conversion failed"
                    );
                }
                value
            })
            .collect()
    }

    /// Test a record without modifying it
    pub fn is_match(&self, item: &LogItem) -> bool {
        if self.pattern.captures().is_empty() {
            return self.pattern.is_match(&item.message);
        }
        self.capture_values(&item.message).is_some()
    }

    /// Test a record and store captures and the marker on success
    pub fn apply(&self, item: &mut LogItem) -> bool {
        let Some(values) = self.capture_values(&item.message) else {
            return false;
        };

        for (capture, value) in self.pattern.captures().iter().zip(values) {
            item.fields.insert(capture.name.clone(), value);
        }
        if let Some((name, value)) = &self.marker {
            item.fields.insert(name.clone(), value.clone());
        }
        true
    }

    /// Fields a match produces
    pub fn columns(&self) -> Vec<Column> {
        let mut columns: Vec<Column> = self
            .pattern
            .captures()
            .iter()
            .map(|capture| {
                let ty = match capture.kind {
                    CaptureKind::String => ValueType::String,
                    CaptureKind::Number => ValueType::Number,
                    CaptureKind::Time | CaptureKind::Format(_) => ValueType::Time,
                };
                Column::new(capture.name.clone(), ty)
            })
            .collect();

        if let Some((name, value)) = &self.marker {
            columns.push(Column::new(name.clone(), value.value_type()));
        }
        columns
    }
}

/// A named expression in `select` or `group by`
#[derive(Debug, Clone)]
pub struct Projection {
    pub name: String,
    pub expr: Expr,
}

/// One `order by` key
#[derive(Debug, Clone)]
pub struct OrderKey {
    pub expr: Expr,
    pub descending: bool,
}

/// An aggregate function applied to an optional argument
#[derive(Debug, Clone)]
pub struct AggregateCall {
    pub function: AggregateFunction,
    pub argument: Option<Expr>,
    /// Output column name
    pub name: String,
}

impl AggregateCall {
    pub fn new(function: AggregateFunction, argument: Option<Expr>) -> Self {
        let name = match &argument {
            Some(arg) => format!("{}({})", function, arg),
            None => format!("{}()", function),
        };
        Self {
            function,
            argument,
            name,
        }
    }

    /// Builder method: rename the output column
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Input value for one record; calls without argument count records
    pub fn input(&self, item: &LogItem) -> Value {
        match &self.argument {
            Some(arg) => arg.eval(item),
            None => Value::Bool(true),
        }
    }

    pub fn initialize(&self) -> AggregateState {
        self.function.initialize()
    }

    pub fn result_type(&self) -> ValueType {
        let input = self
            .argument
            .as_ref()
            .map(|arg| arg.result_type())
            .unwrap_or(ValueType::Any);
        self.function.result_type(input)
    }

    pub fn column(&self) -> Column {
        Column::new(self.name.clone(), self.result_type())
    }
}

/// A node of the query plan
#[derive(Debug, Clone)]
pub enum Node {
    /// Every record
    Scan,
    And(Vec<Node>),
    Or(Vec<Node>),
    Not(Box<Node>),
    Predicate(Expr),
    Phrase(Arc<PhraseNode>),
    /// Replace each record's fields with what the parser extracts from `field`
    Parse {
        inner: Box<Node>,
        field: Expr,
        parser: Arc<dyn FieldParser>,
    },
    Project {
        inner: Box<Node>,
        columns: Vec<Projection>,
    },
    GroupBy {
        inner: Box<Node>,
        keys: Vec<Projection>,
        aggregates: Vec<AggregateCall>,
    },
    /// Whole-input aggregation producing one row
    Aggregate {
        inner: Box<Node>,
        aggregates: Vec<AggregateCall>,
    },
    OrderBy {
        inner: Box<Node>,
        keys: Vec<OrderKey>,
    },
    Limit {
        inner: Box<Node>,
        count: usize,
    },
}

impl Node {
    /// Conjunction; nested `And` children are flattened and a single child
    /// stands for itself
    pub fn and(children: Vec<Node>) -> Node {
        let mut flat = Vec::with_capacity(children.len());
        for child in children {
            match child {
                Node::And(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        match flat.len() {
            0 => Node::Scan,
            1 => flat.remove(0),
            _ => Node::And(flat),
        }
    }

    /// Disjunction; nested `Or` children are flattened
    pub fn or(children: Vec<Node>) -> Node {
        let mut flat = Vec::with_capacity(children.len());
        for child in children {
            match child {
                Node::Or(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        if flat.len() == 1 {
            flat.remove(0)
        } else {
            Node::Or(flat)
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(child: Node) -> Node {
        Node::Not(Box::new(child))
    }

    pub fn phrase(phrase: PhraseNode) -> Node {
        Node::Phrase(Arc::new(phrase))
    }

    /// Builder method: add a parse stage
    pub fn parse(self, field: Expr, parser: Arc<dyn FieldParser>) -> Node {
        Node::Parse {
            inner: Box::new(self),
            field,
            parser,
        }
    }

    /// Builder method: add a projection
    pub fn project(self, columns: Vec<Projection>) -> Node {
        Node::Project {
            inner: Box::new(self),
            columns,
        }
    }

    /// Builder method: add a grouping
    pub fn group_by(self, keys: Vec<Projection>, aggregates: Vec<AggregateCall>) -> Node {
        Node::GroupBy {
            inner: Box::new(self),
            keys,
            aggregates,
        }
    }

    /// Builder method: add a whole-input aggregation
    pub fn aggregate(self, aggregates: Vec<AggregateCall>) -> Node {
        Node::Aggregate {
            inner: Box::new(self),
            aggregates,
        }
    }

    /// Builder method: add an ordering
    pub fn order_by(self, keys: Vec<OrderKey>) -> Node {
        Node::OrderBy {
            inner: Box::new(self),
            keys,
        }
    }

    /// Builder method: keep the first `count` rows
    pub fn limit(self, count: usize) -> Node {
        Node::Limit {
            inner: Box::new(self),
            count,
        }
    }

    /// Whether this node decides record membership (as opposed to a
    /// pipeline stage)
    pub fn is_match(&self) -> bool {
        matches!(
            self,
            Node::Scan
                | Node::And(_)
                | Node::Or(_)
                | Node::Not(_)
                | Node::Predicate(_)
                | Node::Phrase(_)
        )
    }

    /// Stage input, for pipeline nodes
    pub fn inner(&self) -> Option<&Node> {
        match self {
            Node::Parse { inner, .. }
            | Node::Project { inner, .. }
            | Node::GroupBy { inner, .. }
            | Node::Aggregate { inner, .. }
            | Node::OrderBy { inner, .. }
            | Node::Limit { inner, .. } => Some(inner),
            _ => None,
        }
    }

    /// Fold a match tree into one expression
    ///
    /// `And` and `Or` children are combined left to right. Pipeline nodes
    /// have no predicate.
    pub fn predicate(&self) -> Option<Expr> {
        match self {
            Node::Scan => Some(Expr::Literal(Value::Bool(true))),
            Node::Predicate(expr) => Some(expr.clone()),
            Node::Phrase(phrase) => Some(Expr::Phrase(phrase.clone())),
            Node::Not(child) => child.predicate().map(Expr::not),
            Node::And(children) => Some(
                children
                    .iter()
                    .map(Node::predicate)
                    .collect::<Option<Vec<_>>>()?
                    .into_iter()
                    .reduce(Expr::and)
                    .unwrap_or(Expr::Literal(Value::Bool(true))),
            ),
            Node::Or(children) => Some(
                children
                    .iter()
                    .map(Node::predicate)
                    .collect::<Option<Vec<_>>>()?
                    .into_iter()
                    .reduce(Expr::or)
                    .unwrap_or(Expr::Literal(Value::Bool(false))),
            ),
            _ => None,
        }
    }

    /// Output columns
    ///
    /// For match nodes these are the fields their phrases capture. A parse
    /// stage produces fields only known at run time, so it reports none.
    pub fn columns(&self) -> Vec<Column> {
        match self {
            Node::Scan | Node::Predicate(_) | Node::Not(_) | Node::Parse { .. } => Vec::new(),
            Node::Phrase(phrase) => phrase.columns(),
            Node::And(children) | Node::Or(children) => {
                let mut columns: Vec<Column> = Vec::new();
                for column in children.iter().flat_map(Node::columns) {
                    if !columns.iter().any(|c| c.name == column.name) {
                        columns.push(column);
                    }
                }
                columns
            }
            Node::Project { columns, .. } => columns
                .iter()
                .map(|p| Column::new(p.name.clone(), p.expr.result_type()))
                .collect(),
            Node::GroupBy {
                keys, aggregates, ..
            } => keys
                .iter()
                .map(|p| Column::new(p.name.clone(), p.expr.result_type()))
                .chain(aggregates.iter().map(AggregateCall::column))
                .collect(),
            Node::Aggregate { aggregates, .. } => {
                aggregates.iter().map(AggregateCall::column).collect()
            }
            Node::OrderBy { inner, .. } | Node::Limit { inner, .. } => inner.columns(),
        }
    }

    /// Whether any phrase reachable through `And`/`Or` can use the index
    pub fn uses_index(&self) -> bool {
        match self {
            Node::Phrase(phrase) => !phrase.tokens().exact,
            Node::And(children) | Node::Or(children) => children.iter().any(Node::uses_index),
            _ => false,
        }
    }
}

impl std::fmt::Display for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fn list<T: std::fmt::Display>(items: &[T]) -> String {
            items
                .iter()
                .map(|i| i.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        }

        match self {
            Node::Scan => write!(f, "scan"),
            Node::And(children) => write!(f, "and({})", list(children)),
            Node::Or(children) => write!(f, "or({})", list(children)),
            Node::Not(child) => write!(f, "not({})", child),
            Node::Predicate(expr) => write!(f, "[{}]", expr),
            Node::Phrase(phrase) => match phrase.marker() {
                Some((name, value)) => {
                    write!(f, "\"{}\" set {} = {}", phrase.pattern(), name, value)
                }
                None => write!(f, "\"{}\"", phrase.pattern()),
            },
            Node::Parse {
                inner,
                field,
                parser,
            } => write!(f, "{} | parse {} with {}", inner, field, parser.name()),
            Node::Project { inner, columns } => {
                let cols: Vec<String> = columns.iter().map(|p| p.name.clone()).collect();
                write!(f, "{} | select {}", inner, cols.join(", "))
            }
            Node::GroupBy {
                inner,
                keys,
                aggregates,
            } => {
                let keys: Vec<String> = keys.iter().map(|p| p.name.clone()).collect();
                let aggs: Vec<String> = aggregates.iter().map(|a| a.name.clone()).collect();
                write!(
                    f,
                    "{} | group by {} compute {}",
                    inner,
                    keys.join(", "),
                    aggs.join(", ")
                )
            }
            Node::Aggregate { inner, aggregates } => {
                let aggs: Vec<String> = aggregates.iter().map(|a| a.name.clone()).collect();
                write!(f, "{} | aggregate {}", inner, aggs.join(", "))
            }
            Node::OrderBy { inner, keys } => {
                let keys: Vec<String> = keys
                    .iter()
                    .map(|k| {
                        if k.descending {
                            format!("{} desc", k.expr)
                        } else {
                            k.expr.to_string()
                        }
                    })
                    .collect();
                write!(f, "{} | order by {}", inner, keys.join(", "))
            }
            Node::Limit { inner, count } => write!(f, "{} | limit {}", inner, count),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::expr::BinaryOp;

    fn phrase(source: &str) -> PhraseNode {
        PhraseNode::new(Pattern::new(source).unwrap(), "%Y-%m-%d %H:%M:%S", None)
    }

    fn pred(name: &str) -> Node {
        Node::Predicate(Expr::field(name))
    }

    fn names(node: &Node) -> Vec<String> {
        match node {
            Node::And(children) | Node::Or(children) => {
                children.iter().map(|c| c.to_string()).collect()
            }
            other => vec![other.to_string()],
        }
    }

    #[test]
    fn test_and_flattens() {
        let nested = Node::and(vec![Node::and(vec![pred("a"), pred("b")]), pred("c")]);
        assert!(matches!(nested, Node::And(ref c) if c.len() == 3));
        assert_eq!(names(&nested), ["[a]", "[b]", "[c]"]);
    }

    #[test]
    fn test_or_flattens_only_or() {
        let node = Node::or(vec![
            pred("a"),
            Node::or(vec![pred("b"), pred("c")]),
            Node::and(vec![pred("d"), pred("e")]),
        ]);
        assert!(matches!(node, Node::Or(ref c) if c.len() == 4));
        assert_eq!(names(&node)[3], "and([d], [e])");
    }

    #[test]
    fn test_single_child_collapses() {
        assert!(matches!(Node::and(vec![pred("a")]), Node::Predicate(_)));
        assert!(matches!(Node::and(Vec::new()), Node::Scan));
    }

    #[test]
    fn test_predicate_fold() {
        let node = Node::and(vec![pred("a"), Node::or(vec![pred("b"), pred("c")])]);
        let expr = node.predicate().unwrap();
        assert_eq!(expr.to_string(), "a and (b or c)");

        let mut item = LogItem::message("x").field("a", true).field("c", true);
        assert!(expr.test(&mut item));

        let mut item = LogItem::message("x").field("a", true);
        assert!(!expr.test(&mut item));

        assert!(Node::Scan.limit(3).predicate().is_none());
    }

    #[test]
    fn test_phrase_captures_number() {
        let node = phrase("error {code:number}");

        let mut item = LogItem::message("error 42");
        assert!(node.apply(&mut item));
        assert_eq!(item.get("code"), Some(&Value::Number(42.0)));

        // Conversion failure is a non-match
        let mut item = LogItem::message("error abc");
        assert!(!node.apply(&mut item));
        assert!(item.fields.is_empty());
        assert!(!node.is_match(&item));
    }

    #[test]
    fn test_phrase_marker_and_columns() {
        let node = PhraseNode::new(
            Pattern::new("login {user} from {ip}").unwrap(),
            "%Y-%m-%d %H:%M:%S",
            Some(("event".to_string(), Value::from("login"))),
        );
        assert!(node.tokens().exact);

        let mut item = LogItem::message("login alice from 10.0.0.1");
        assert!(node.apply(&mut item));
        assert_eq!(item.get("event"), Some(&Value::from("login")));
        assert_eq!(item.get("ip"), Some(&Value::from("10.0.0.1")));

        let columns: Vec<String> = node.columns().into_iter().map(|c| c.name).collect();
        assert_eq!(columns, ["user", "ip", "event"]);
    }

    #[test]
    fn test_phrase_time_capture() {
        let node = phrase("at {when:%d/%m/%Y} ok");
        let mut item = LogItem::message("at 15/01/2024 ok");
        assert!(node.apply(&mut item));
        assert_eq!(item.get("when").map(Value::value_type), Some(ValueType::Time));
        assert!(!node.is_match(&LogItem::message("at 2024-01-15 ok")));
    }

    #[test]
    fn test_columns_through_pipeline() {
        let filter = Node::and(vec![
            Node::phrase(phrase("took {ms:number} ms")),
            Node::Predicate(Expr::binary(
                BinaryOp::Gt,
                Expr::field("ms"),
                Expr::literal(10i64),
            )),
        ]);
        assert_eq!(filter.columns(), vec![Column::new("ms", ValueType::Number)]);

        let plan = filter
            .aggregate(vec![
                AggregateCall::new(AggregateFunction::Count, None),
                AggregateCall::new(AggregateFunction::Mean, Some(Expr::field("ms")))
                    .with_name("avg_ms"),
            ])
            .limit(1);
        let columns = plan.columns();
        assert_eq!(columns[0], Column::new("count()", ValueType::Integer));
        assert_eq!(columns[1], Column::new("avg_ms", ValueType::Number));
        assert!(!plan.uses_index());
        assert!(plan.inner().unwrap().inner().unwrap().uses_index());
    }
}
