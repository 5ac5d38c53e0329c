//! Query Compiler
//!
//! Binds a [`QueryText`] into an executable [`Node`] tree:
//!
//! 1. phrase patterns are compiled and tokenized
//! 2. names are resolved (attributes, aggregates, parsers, type annotations)
//! 3. field types are tracked stage by stage, so `[code > 400]` after
//!    `"error {code:number}"` sees a number
//!
//! Every unknown name is a compile error; nothing is deferred to execution.

use super::aggregate::AggregateFunction;
use super::ast::*;
use super::error::{QueryError, QueryResult};
use super::expr::{Expr, UnaryOp};
use super::parser::parse_query;
use super::plan::{AggregateCall, Node, OrderKey, PhraseNode, Projection};
use crate::config::QueryConfig;
use crate::log::{Attribute, ValueType};
use crate::parsers::{parser_by_name, PARSER_NAMES};
use crate::pattern::Pattern;
use std::collections::HashMap;
use tracing::debug;

/// Parse and compile query text
pub fn compile(text: &str, config: &QueryConfig) -> QueryResult<Node> {
    let syntax = parse_query(text)?;
    let node = Compiler::new(config).compile(&syntax)?;
    debug!(query = text, plan = %node, "Compiled query");
    Ok(node)
}

/// Binds syntax to plan nodes, tracking the fields known at each stage
pub struct Compiler<'a> {
    config: &'a QueryConfig,
    schema: HashMap<String, ValueType>,
}

impl<'a> Compiler<'a> {
    pub fn new(config: &'a QueryConfig) -> Self {
        Self {
            config,
            schema: HashMap::new(),
        }
    }

    pub fn compile(mut self, query: &QueryText) -> QueryResult<Node> {
        let mut node = match &query.filter {
            Some(filter) => self.filter(filter)?,
            None => Node::Scan,
        };

        for stage in &query.stages {
            node = self.stage(node, stage)?;
        }

        Ok(node)
    }

    fn filter(&mut self, filter: &FilterSyntax) -> QueryResult<Node> {
        match filter {
            FilterSyntax::All => Ok(Node::Scan),
            FilterSyntax::Phrase { pattern, marker } => {
                let pattern = Pattern::new(pattern)?;
                let phrase = PhraseNode::new(pattern, &self.config.time_format, marker.clone());
                for column in phrase.columns() {
                    self.schema.insert(column.name, column.ty);
                }
                Ok(Node::phrase(phrase))
            }
            FilterSyntax::Predicate(expr) => Ok(Node::Predicate(self.expr(expr)?)),
            FilterSyntax::And(items) => Ok(Node::and(self.filters(items)?)),
            FilterSyntax::Or(items) => Ok(Node::or(self.filters(items)?)),
            FilterSyntax::Not(inner) => Ok(Node::not(self.filter(inner)?)),
        }
    }

    fn filters(&mut self, items: &[FilterSyntax]) -> QueryResult<Vec<Node>> {
        items.iter().map(|item| self.filter(item)).collect()
    }

    fn stage(&mut self, node: Node, stage: &Stage) -> QueryResult<Node> {
        match stage {
            Stage::Parse { source, parser } => {
                let source = self.expr(source)?;
                let parser = parser_by_name(parser).ok_or_else(|| {
                    QueryError::UnknownParser(format!(
                        "{} (expected one of: {})",
                        parser,
                        PARSER_NAMES.join(", ")
                    ))
                })?;
                // Parsed fields replace the record's fields; their types are unknown
                self.schema.clear();
                Ok(node.parse(source, parser))
            }
            Stage::Select(items) => {
                let columns = self.projections(items)?;
                self.replace_schema(columns.iter().map(|p| (p.name.clone(), p.expr.result_type())));
                Ok(node.project(columns))
            }
            Stage::Aggregate(items) => {
                let aggregates = self.aggregates(items)?;
                self.replace_schema(aggregates.iter().map(|a| (a.name.clone(), a.result_type())));
                Ok(node.aggregate(aggregates))
            }
            Stage::GroupBy { keys, aggregates } => {
                let keys = self.projections(keys)?;
                let aggregates = self.aggregates(aggregates)?;
                self.replace_schema(
                    keys.iter()
                        .map(|p| (p.name.clone(), p.expr.result_type()))
                        .chain(aggregates.iter().map(|a| (a.name.clone(), a.result_type()))),
                );
                Ok(node.group_by(keys, aggregates))
            }
            Stage::OrderBy(keys) => {
                let keys = keys
                    .iter()
                    .map(|(expr, descending)| {
                        Ok(OrderKey {
                            expr: self.expr(expr)?,
                            descending: *descending,
                        })
                    })
                    .collect::<QueryResult<Vec<_>>>()?;
                Ok(node.order_by(keys))
            }
            Stage::Limit(count) => Ok(node.limit(*count)),
        }
    }

    fn replace_schema(&mut self, columns: impl Iterator<Item = (String, ValueType)>) {
        self.schema = columns.collect();
    }

    fn projections(&self, items: &[ProjectionSyntax]) -> QueryResult<Vec<Projection>> {
        items
            .iter()
            .map(|item| {
                let expr = self.expr(&item.expr)?;
                let name = item.alias.clone().unwrap_or_else(|| column_name(&expr));
                Ok(Projection { name, expr })
            })
            .collect()
    }

    fn aggregates(&self, items: &[AggregateSyntax]) -> QueryResult<Vec<AggregateCall>> {
        items.iter().map(|item| self.aggregate(item)).collect()
    }

    fn aggregate(&self, item: &AggregateSyntax) -> QueryResult<AggregateCall> {
        let function = AggregateFunction::from_name(&item.function)
            .ok_or_else(|| QueryError::UnknownAggregate(item.function.clone()))?;

        let argument = match &item.argument {
            Some(arg) => Some(self.expr(arg)?),
            None if function.argument_optional() => None,
            None => {
                return Err(QueryError::Parse(format!(
                    "{}() requires an argument",
                    function
                )))
            }
        };

        let call = AggregateCall::new(function, argument);
        Ok(match &item.alias {
            Some(alias) => call.with_name(alias.clone()),
            None => call,
        })
    }

    fn expr(&self, expr: &ExprSyntax) -> QueryResult<Expr> {
        match expr {
            ExprSyntax::Literal(value) => Ok(Expr::Literal(value.clone())),
            ExprSyntax::Field { name, annotation } => {
                let ty = self.schema.get(name).copied().unwrap_or(ValueType::Any);
                let field = Expr::Field {
                    name: name.clone(),
                    ty,
                };
                match annotation {
                    None => Ok(field),
                    Some(annotation) => {
                        let ty = ValueType::from_name(annotation).ok_or_else(|| {
                            QueryError::InvalidType(format!("{}:{}", name, annotation))
                        })?;
                        Ok(Expr::Cast {
                            inner: Box::new(field),
                            ty,
                            format: self.config.time_format.clone(),
                        })
                    }
                }
            }
            ExprSyntax::Attribute(name) => Attribute::from_name(name)
                .map(Expr::Attribute)
                .ok_or_else(|| QueryError::Parse(format!("Unknown attribute: @{}", name))),
            ExprSyntax::Unary(op, inner) => Ok(Expr::Unary {
                op: *op,
                inner: Box::new(self.expr(inner)?),
            }),
            ExprSyntax::Binary(op, left, right) => {
                Ok(Expr::binary(*op, self.expr(left)?, self.expr(right)?))
            }
        }
    }
}

/// Default output name of a projected expression
fn column_name(expr: &Expr) -> String {
    match expr {
        Expr::Field { name, .. } => name.clone(),
        Expr::Attribute(attribute) => attribute.to_string().trim_start_matches('@').to_string(),
        Expr::Cast { inner, .. } => column_name(inner),
        Expr::Unary {
            op: UnaryOp::Neg,
            inner,
        } => format!("-{}", column_name(inner)),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::{LogItem, Value};

    fn config() -> QueryConfig {
        QueryConfig::default()
    }

    fn names(node: &Node) -> Vec<String> {
        node.columns().into_iter().map(|c| c.name).collect()
    }

    #[test]
    fn test_compile_phrase_and_predicate() {
        let node = compile(r#""error {code:number}" [code >= 500]"#, &config()).unwrap();
        let Node::And(children) = &node else {
            panic!("expected conjunction, got {}", node);
        };
        assert!(matches!(children[0], Node::Phrase(_)));

        // The predicate sees the capture's type
        let Node::Predicate(Expr::Binary { left, .. }) = &children[1] else {
            panic!("expected predicate");
        };
        assert_eq!(left.result_type(), ValueType::Number);

        let mut hit = LogItem::message("error 503");
        let mut miss = LogItem::message("error 404");
        let predicate = node.predicate().unwrap();
        assert!(predicate.test(&mut hit));
        assert!(!predicate.test(&mut miss));
    }

    #[test]
    fn test_compile_nested_and_is_flat() {
        let node = compile(r#"("a" "b") "c""#, &config()).unwrap();
        assert!(matches!(&node, Node::And(children) if children.len() == 3));
    }

    #[test]
    fn test_compile_pipeline_columns() {
        let node = compile(
            r#""took {ms:number}ms" | group by @file compute count() as n, max(ms) | order by n desc | limit 3"#,
            &config(),
        )
        .unwrap();

        assert_eq!(names(&node), ["file", "n", "max(ms)"]);
        let columns = node.columns();
        assert_eq!(columns[0].ty, ValueType::String);
        assert_eq!(columns[1].ty, ValueType::Integer);
        assert_eq!(columns[2].ty, ValueType::Number);
    }

    #[test]
    fn test_compile_cast_and_select_names() {
        let node = compile("* | select status:int, -ms as neg, @line", &config()).unwrap();
        assert_eq!(names(&node), ["status", "neg", "line"]);
        assert_eq!(node.columns()[0].ty, ValueType::Integer);

        let Node::Project { columns, .. } = &node else {
            panic!("expected projection");
        };
        let item = LogItem::message("x").field("status", "404");
        assert_eq!(columns[0].expr.eval(&item), Value::Integer(404));
    }

    #[test]
    fn test_parse_stage_clears_types() {
        let node = compile(
            r#""id {id:number}" | parse @message with kv | select id"#,
            &config(),
        )
        .unwrap();
        assert_eq!(node.columns()[0].ty, ValueType::Any);
    }

    #[test]
    fn test_unknown_names_are_errors() {
        let err = compile("* | aggregate stddev(x)", &config()).unwrap_err();
        assert_eq!(err, QueryError::UnknownAggregate("stddev".to_string()));

        let err = compile("* | parse @message with xml", &config()).unwrap_err();
        assert!(matches!(err, QueryError::UnknownParser(_)));

        let err = compile("[x:color = 1]", &config()).unwrap_err();
        assert!(matches!(err, QueryError::InvalidType(_)));

        let err = compile("[@nope = 1]", &config()).unwrap_err();
        assert!(matches!(err, QueryError::Parse(_)));

        let err = compile(r#""{a} {a}""#, &config()).unwrap_err();
        assert!(matches!(err, QueryError::InvalidPattern(_)));

        let err = compile("* | aggregate sum()", &config()).unwrap_err();
        assert!(matches!(err, QueryError::Parse(_)));
    }

    #[test]
    fn test_time_format_from_config() {
        let config = QueryConfig {
            time_format: "%d.%m.%Y".to_string(),
        };
        let node = compile(r#""at {t:time}""#, &config).unwrap();
        let mut item = LogItem::message("at 15.01.2024");
        assert!(node.predicate().unwrap().test(&mut item));
        assert_eq!(item.get("t").map(Value::value_type), Some(ValueType::Time));
    }
}
