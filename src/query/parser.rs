//! Query Parser
//!
//! Parses query text into a [`QueryText`] syntax tree using nom combinators.
//!
//! # Grammar
//!
//! ```text
//! query      := filter? ('|' stage)*
//! filter     := conj ('or' conj)*
//! conj       := negation (('and')? negation)*        -- juxtaposition is `and`
//! negation   := 'not' negation | atom
//! atom       := '(' filter ')' | "pattern" ('set' ident '=' literal)?
//!             | '[' expr ']' | '*' | word
//! stage      := 'parse' operand 'with' ident
//!             | 'select' projection (',' projection)*
//!             | 'aggregate' agg (',' agg)*
//!             | 'group' 'by' projection (',' projection)* 'compute' agg (',' agg)*
//!             | 'order' 'by' expr ('asc'|'desc')? (',' ...)*
//!             | 'limit' digits
//! expr       := and_expr ('or' and_expr)*
//! and_expr   := not_expr ('and' not_expr)*
//! not_expr   := 'not' not_expr | compare
//! compare    := sum (('=' | '!=' | '<' | '<=' | '>' | '>=' | 'contains') sum)?
//! sum        := product (('+' | '-') product)*
//! product    := unary (('*' | '/') unary)*
//! unary      := '-' unary | operand
//! operand    := '(' expr ')' | literal | '@' ident | ident (':' ident)?
//! ```
//!
//! Keywords are case-insensitive. String literals use single quotes,
//! patterns use double quotes; both accept backslash escapes of the quote.

use nom::{
    branch::alt,
    bytes::complete::{tag, tag_no_case, take_while, take_while1},
    character::complete::{char, digit1, multispace0, multispace1, one_of, satisfy},
    combinator::{map, map_res, not, opt, recognize, value, verify},
    error::{Error, ErrorKind},
    multi::{many0, separated_list1},
    sequence::{delimited, pair, preceded, terminated, tuple},
    IResult,
};

use super::ast::*;
use super::error::{QueryError, QueryResult};
use super::expr::{BinaryOp, UnaryOp};
use crate::log::Value;

/// Words that cannot stand alone as a bare phrase
const RESERVED: &[&str] = &["and", "or", "not"];

/// Parse a query string into a syntax tree
pub fn parse_query(input: &str) -> QueryResult<QueryText> {
    let input = input.trim();

    match parse_full_query(input) {
        Ok((remaining, query)) => {
            if remaining.trim().is_empty() {
                Ok(query)
            } else {
                Err(QueryError::Parse(format!(
                    "Unexpected input after query: '{}'",
                    remaining.trim()
                )))
            }
        }
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => Err(QueryError::Parse(format!(
            "Unexpected input at '{}'",
            snippet(e.input)
        ))),
        Err(nom::Err::Incomplete(_)) => {
            Err(QueryError::Parse("Incomplete query".to_string()))
        }
    }
}

fn snippet(input: &str) -> String {
    let trimmed = input.trim();
    if trimmed.chars().count() > 24 {
        format!("{}...", trimmed.chars().take(24).collect::<String>())
    } else {
        trimmed.to_string()
    }
}

/// Parse the full query
fn parse_full_query(input: &str) -> IResult<&str, QueryText> {
    let (input, _) = multispace0(input)?;
    let (input, filter) = opt(parse_filter)(input)?;
    let (input, stages) = many0(preceded(ws(char('|')), parse_stage))(input)?;
    let (input, _) = multispace0(input)?;

    Ok((input, QueryText { filter, stages }))
}

/// Surround a parser with optional whitespace
fn ws<'a, O, F>(inner: F) -> impl FnMut(&'a str) -> IResult<&'a str, O>
where
    F: FnMut(&'a str) -> IResult<&'a str, O>,
{
    delimited(multispace0, inner, multispace0)
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '.'
}

/// Case-insensitive keyword that is not the prefix of a longer word
fn keyword<'a>(word: &'static str) -> impl FnMut(&'a str) -> IResult<&'a str, &'a str> {
    terminated(tag_no_case(word), not(satisfy(is_ident_char)))
}

// ---------------------------------------------------------------------------
// Filter
// ---------------------------------------------------------------------------

fn parse_filter(input: &str) -> IResult<&str, FilterSyntax> {
    let (input, first) = parse_conjunction(input)?;
    let (input, rest) = many0(preceded(ws(keyword("or")), parse_conjunction))(input)?;

    if rest.is_empty() {
        Ok((input, first))
    } else {
        let mut items = vec![first];
        items.extend(rest);
        Ok((input, FilterSyntax::Or(items)))
    }
}

fn parse_conjunction(input: &str) -> IResult<&str, FilterSyntax> {
    let (input, first) = parse_negation(input)?;
    let (input, rest) = many0(preceded(
        pair(multispace0, opt(terminated(keyword("and"), multispace0))),
        parse_negation,
    ))(input)?;

    if rest.is_empty() {
        Ok((input, first))
    } else {
        let mut items = vec![first];
        items.extend(rest);
        Ok((input, FilterSyntax::And(items)))
    }
}

fn parse_negation(input: &str) -> IResult<&str, FilterSyntax> {
    alt((
        map(
            preceded(terminated(keyword("not"), multispace0), parse_negation),
            |inner| FilterSyntax::Not(Box::new(inner)),
        ),
        parse_atom,
    ))(input)
}

fn parse_atom(input: &str) -> IResult<&str, FilterSyntax> {
    alt((
        delimited(
            terminated(char('('), multispace0),
            parse_filter,
            preceded(multispace0, char(')')),
        ),
        parse_phrase,
        map(
            delimited(
                terminated(char('['), multispace0),
                parse_expr,
                preceded(multispace0, char(']')),
            ),
            FilterSyntax::Predicate,
        ),
        value(FilterSyntax::All, char('*')),
        map(
            verify(parse_identifier, |word: &str| {
                !RESERVED.contains(&word.to_lowercase().as_str())
            }),
            |word: &str| FilterSyntax::Phrase {
                pattern: word.to_string(),
                marker: None,
            },
        ),
    ))(input)
}

/// Parse `"pattern"` with an optional `set name = literal` marker
fn parse_phrase(input: &str) -> IResult<&str, FilterSyntax> {
    let (input, pattern) = parse_double_quoted(input)?;
    let (input, marker) = opt(preceded(
        tuple((multispace1, keyword("set"), multispace1)),
        parse_marker,
    ))(input)?;

    Ok((input, FilterSyntax::Phrase { pattern, marker }))
}

fn parse_marker(input: &str) -> IResult<&str, (String, Value)> {
    let (input, name) = parse_identifier(input)?;
    let (input, _) = ws(char('='))(input)?;
    let (input, literal) = parse_literal(input)?;
    Ok((input, (name.to_string(), literal)))
}

/// Parse a double-quoted pattern
///
/// `\"` yields a quote; every other escape is kept for the pattern compiler.
fn parse_double_quoted(input: &str) -> IResult<&str, String> {
    let (body, _) = char('"')(input)?;
    let mut out = String::new();
    let mut chars = body.char_indices();

    while let Some((idx, c)) = chars.next() {
        match c {
            '"' => return Ok((&body[idx + 1..], out)),
            '\\' => match chars.next() {
                Some((_, '"')) => out.push('"'),
                Some((_, other)) => {
                    out.push('\\');
                    out.push(other);
                }
                None => break,
            },
            other => out.push(other),
        }
    }

    Err(nom::Err::Failure(Error::new(input, ErrorKind::Char)))
}

// ---------------------------------------------------------------------------
// Stages
// ---------------------------------------------------------------------------

fn parse_stage(input: &str) -> IResult<&str, Stage> {
    alt((
        parse_parse_stage,
        parse_select_stage,
        parse_aggregate_stage,
        parse_group_stage,
        parse_order_stage,
        parse_limit_stage,
    ))(input)
}

fn comma(input: &str) -> IResult<&str, char> {
    ws(char(','))(input)
}

fn parse_parse_stage(input: &str) -> IResult<&str, Stage> {
    let (input, _) = terminated(keyword("parse"), multispace1)(input)?;
    let (input, source) = alt((parse_attribute, parse_field))(input)?;
    let (input, _) = tuple((multispace1, keyword("with"), multispace1))(input)?;
    let (input, parser) = parse_identifier(input)?;

    Ok((
        input,
        Stage::Parse {
            source,
            parser: parser.to_string(),
        },
    ))
}

fn parse_select_stage(input: &str) -> IResult<&str, Stage> {
    let (input, _) = terminated(keyword("select"), multispace1)(input)?;
    map(separated_list1(comma, parse_projection), Stage::Select)(input)
}

fn parse_aggregate_stage(input: &str) -> IResult<&str, Stage> {
    let (input, _) = terminated(keyword("aggregate"), multispace1)(input)?;
    map(separated_list1(comma, parse_aggregate_call), Stage::Aggregate)(input)
}

fn parse_group_stage(input: &str) -> IResult<&str, Stage> {
    let (input, _) = tuple((keyword("group"), multispace1, keyword("by"), multispace1))(input)?;
    let (input, keys) = separated_list1(comma, parse_projection)(input)?;
    let (input, _) = tuple((multispace1, keyword("compute"), multispace1))(input)?;
    let (input, aggregates) = separated_list1(comma, parse_aggregate_call)(input)?;

    Ok((input, Stage::GroupBy { keys, aggregates }))
}

fn parse_order_stage(input: &str) -> IResult<&str, Stage> {
    let (input, _) = tuple((keyword("order"), multispace1, keyword("by"), multispace1))(input)?;
    let order_key = pair(
        parse_expr,
        map(
            opt(preceded(
                multispace1,
                alt((value(false, keyword("asc")), value(true, keyword("desc")))),
            )),
            |descending| descending.unwrap_or(false),
        ),
    );
    map(separated_list1(comma, order_key), Stage::OrderBy)(input)
}

fn parse_limit_stage(input: &str) -> IResult<&str, Stage> {
    let (input, _) = terminated(keyword("limit"), multispace1)(input)?;
    map(map_res(digit1, |s: &str| s.parse::<usize>()), Stage::Limit)(input)
}

fn parse_alias(input: &str) -> IResult<&str, String> {
    map(
        preceded(
            tuple((multispace1, keyword("as"), multispace1)),
            parse_identifier,
        ),
        |s: &str| s.to_string(),
    )(input)
}

fn parse_projection(input: &str) -> IResult<&str, ProjectionSyntax> {
    let (input, expr) = parse_expr(input)?;
    let (input, alias) = opt(parse_alias)(input)?;
    Ok((input, ProjectionSyntax { expr, alias }))
}

/// Parse an aggregate call like `mean(ms)` or `count()`
fn parse_aggregate_call(input: &str) -> IResult<&str, AggregateSyntax> {
    let (input, function) = parse_identifier(input)?;
    let (input, _) = ws(char('('))(input)?;
    let (input, argument) = opt(parse_expr)(input)?;
    let (input, _) = preceded(multispace0, char(')'))(input)?;
    let (input, alias) = opt(parse_alias)(input)?;

    Ok((
        input,
        AggregateSyntax {
            function: function.to_string(),
            argument,
            alias,
        },
    ))
}

// ---------------------------------------------------------------------------
// Expressions
// ---------------------------------------------------------------------------

fn fold(first: ExprSyntax, rest: Vec<(BinaryOp, ExprSyntax)>) -> ExprSyntax {
    rest.into_iter()
        .fold(first, |left, (op, right)| ExprSyntax::binary(op, left, right))
}

fn parse_expr(input: &str) -> IResult<&str, ExprSyntax> {
    let (input, first) = parse_and_expr(input)?;
    let (input, rest) = many0(pair(
        value(BinaryOp::Or, ws(keyword("or"))),
        parse_and_expr,
    ))(input)?;
    Ok((input, fold(first, rest)))
}

fn parse_and_expr(input: &str) -> IResult<&str, ExprSyntax> {
    let (input, first) = parse_not_expr(input)?;
    let (input, rest) = many0(pair(
        value(BinaryOp::And, ws(keyword("and"))),
        parse_not_expr,
    ))(input)?;
    Ok((input, fold(first, rest)))
}

fn parse_not_expr(input: &str) -> IResult<&str, ExprSyntax> {
    alt((
        map(
            preceded(terminated(keyword("not"), multispace0), parse_not_expr),
            |inner| ExprSyntax::Unary(UnaryOp::Not, Box::new(inner)),
        ),
        parse_comparison,
    ))(input)
}

fn parse_comparison(input: &str) -> IResult<&str, ExprSyntax> {
    let (input, left) = parse_sum(input)?;
    let (input, right) = opt(pair(ws(parse_operator), parse_sum))(input)?;

    match right {
        Some((op, right)) => Ok((input, ExprSyntax::binary(op, left, right))),
        None => Ok((input, left)),
    }
}

/// Parse comparison operator
fn parse_operator(input: &str) -> IResult<&str, BinaryOp> {
    alt((
        value(BinaryOp::Ge, tag(">=")),
        value(BinaryOp::Le, tag("<=")),
        value(BinaryOp::Ne, alt((tag("!="), tag("<>")))),
        value(BinaryOp::Gt, tag(">")),
        value(BinaryOp::Lt, tag("<")),
        value(BinaryOp::Eq, alt((tag("=="), tag("=")))),
        value(BinaryOp::Contains, keyword("contains")),
    ))(input)
}

fn parse_sum(input: &str) -> IResult<&str, ExprSyntax> {
    let (input, first) = parse_product(input)?;
    let (input, rest) = many0(pair(
        ws(alt((
            value(BinaryOp::Add, char('+')),
            value(BinaryOp::Sub, char('-')),
        ))),
        parse_product,
    ))(input)?;
    Ok((input, fold(first, rest)))
}

fn parse_product(input: &str) -> IResult<&str, ExprSyntax> {
    let (input, first) = parse_unary(input)?;
    let (input, rest) = many0(pair(
        ws(alt((
            value(BinaryOp::Mul, char('*')),
            value(BinaryOp::Div, char('/')),
        ))),
        parse_unary,
    ))(input)?;
    Ok((input, fold(first, rest)))
}

fn parse_unary(input: &str) -> IResult<&str, ExprSyntax> {
    alt((
        map(
            preceded(terminated(char('-'), multispace0), parse_unary),
            |inner| ExprSyntax::Unary(UnaryOp::Neg, Box::new(inner)),
        ),
        parse_operand,
    ))(input)
}

fn parse_operand(input: &str) -> IResult<&str, ExprSyntax> {
    alt((
        delimited(
            terminated(char('('), multispace0),
            parse_expr,
            preceded(multispace0, char(')')),
        ),
        map(parse_literal, ExprSyntax::Literal),
        parse_attribute,
        parse_field,
    ))(input)
}

fn parse_attribute(input: &str) -> IResult<&str, ExprSyntax> {
    map(preceded(char('@'), parse_identifier), |name: &str| {
        ExprSyntax::Attribute(name.to_string())
    })(input)
}

/// Parse `name` or `name:type`
fn parse_field(input: &str) -> IResult<&str, ExprSyntax> {
    let (input, name) = parse_identifier(input)?;
    let (input, annotation) = opt(preceded(char(':'), parse_identifier))(input)?;

    Ok((
        input,
        ExprSyntax::Field {
            name: name.to_string(),
            annotation: annotation.map(str::to_string),
        },
    ))
}

/// Parse identifier (field name, function name, parser name)
fn parse_identifier(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        take_while1(|c: char| c.is_alphabetic() || c == '_'),
        take_while(is_ident_char),
    ))(input)
}

fn parse_literal(input: &str) -> IResult<&str, Value> {
    alt((
        parse_number,
        map(parse_quoted_string, Value::String),
        value(Value::Bool(true), keyword("true")),
        value(Value::Bool(false), keyword("false")),
        value(Value::Null, keyword("null")),
    ))(input)
}

/// Parse integer or floating point number
fn parse_number(input: &str) -> IResult<&str, Value> {
    map_res(
        recognize(tuple((
            opt(char('-')),
            digit1,
            opt(pair(char('.'), digit1)),
            opt(tuple((one_of("eE"), opt(one_of("+-")), digit1))),
        ))),
        |s: &str| {
            if s.contains(['.', 'e', 'E']) {
                s.parse::<f64>().map(Value::Number)
            } else {
                Ok(s
                    .parse::<i64>()
                    .map(Value::Integer)
                    .unwrap_or_else(|_| Value::Number(s.parse::<f64>().unwrap_or(f64::NAN))))
            }
        },
    )(input)
}

/// Parse single-quoted string; `\'` and `\\` are unescaped
fn parse_quoted_string(input: &str) -> IResult<&str, String> {
    let (body, _) = char('\'')(input)?;
    let mut out = String::new();
    let mut chars = body.char_indices();

    while let Some((idx, c)) = chars.next() {
        match c {
            '\'' => return Ok((&body[idx + 1..], out)),
            '\\' => match chars.next() {
                Some((_, escaped @ ('\'' | '\\'))) => out.push(escaped),
                Some((_, other)) => {
                    out.push('\\');
                    out.push(other);
                }
                None => break,
            },
            other => out.push(other),
        }
    }

    Err(nom::Err::Failure(Error::new(input, ErrorKind::Char)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn phrase(pattern: &str) -> FilterSyntax {
        FilterSyntax::Phrase {
            pattern: pattern.to_string(),
            marker: None,
        }
    }

    #[test]
    fn test_parse_single_phrase() {
        let query = parse_query(r#""error {code:number}""#).unwrap();
        assert_eq!(query.filter, Some(phrase("error {code:number}")));
        assert!(query.stages.is_empty());
    }

    #[test]
    fn test_parse_juxtaposition_is_and() {
        let query = parse_query(r#""a" "b" and "c" or "d""#).unwrap();
        assert_eq!(
            query.filter,
            Some(FilterSyntax::Or(vec![
                FilterSyntax::And(vec![phrase("a"), phrase("b"), phrase("c")]),
                phrase("d"),
            ]))
        );
    }

    #[test]
    fn test_parse_not_and_grouping() {
        let query = parse_query(r#"not ("x" or timeout) *"#).unwrap();
        assert_eq!(
            query.filter,
            Some(FilterSyntax::And(vec![
                FilterSyntax::Not(Box::new(FilterSyntax::Or(vec![
                    phrase("x"),
                    phrase("timeout"),
                ]))),
                FilterSyntax::All,
            ]))
        );
    }

    #[test]
    fn test_parse_marker() {
        let query = parse_query(r#""disk full" set severity = 'high'"#).unwrap();
        assert_eq!(
            query.filter,
            Some(FilterSyntax::Phrase {
                pattern: "disk full".to_string(),
                marker: Some(("severity".to_string(), Value::from("high"))),
            })
        );
    }

    #[test]
    fn test_parse_escaped_quote_keeps_other_escapes() {
        let query = parse_query(r#""say \"hi\" \* now""#).unwrap();
        assert_eq!(query.filter, Some(phrase(r#"say "hi" \* now"#)));
    }

    #[test]
    fn test_parse_predicate_precedence() {
        let query = parse_query("[a + 2 * b >= 10 and not c or d]").unwrap();
        let Some(FilterSyntax::Predicate(expr)) = query.filter else {
            panic!("expected predicate");
        };

        let product = ExprSyntax::binary(
            BinaryOp::Mul,
            ExprSyntax::Literal(Value::Integer(2)),
            ExprSyntax::field("b"),
        );
        let sum = ExprSyntax::binary(BinaryOp::Add, ExprSyntax::field("a"), product);
        let cmp = ExprSyntax::binary(BinaryOp::Ge, sum, ExprSyntax::Literal(Value::Integer(10)));
        let not_c = ExprSyntax::Unary(UnaryOp::Not, Box::new(ExprSyntax::field("c")));
        let and = ExprSyntax::binary(BinaryOp::And, cmp, not_c);
        let expected = ExprSyntax::binary(BinaryOp::Or, and, ExprSyntax::field("d"));

        assert_eq!(expr, expected);
    }

    #[test]
    fn test_parse_operand_forms() {
        let query = parse_query("[@line > 3 and ms:number < 1.5e3 and msg contains 'it\\'s']").unwrap();
        let Some(FilterSyntax::Predicate(ExprSyntax::Binary(BinaryOp::And, left, right))) =
            query.filter
        else {
            panic!("expected conjunction");
        };

        assert_eq!(
            *right,
            ExprSyntax::binary(
                BinaryOp::Contains,
                ExprSyntax::field("msg"),
                ExprSyntax::Literal(Value::from("it's")),
            )
        );
        let ExprSyntax::Binary(BinaryOp::And, line, ms) = *left else {
            panic!("expected conjunction");
        };
        assert_eq!(
            *line,
            ExprSyntax::binary(
                BinaryOp::Gt,
                ExprSyntax::Attribute("line".to_string()),
                ExprSyntax::Literal(Value::Integer(3)),
            )
        );
        assert_eq!(
            *ms,
            ExprSyntax::binary(
                BinaryOp::Lt,
                ExprSyntax::Field {
                    name: "ms".to_string(),
                    annotation: Some("number".to_string()),
                },
                ExprSyntax::Literal(Value::Number(1500.0)),
            )
        );
    }

    #[test]
    fn test_parse_stages() {
        let query = parse_query(
            "* | parse @message with json \
             | select level, req.ms as ms \
             | group by level compute count(), mean(ms) as avg \
             | order by avg desc, level \
             | limit 5",
        )
        .unwrap();

        assert_eq!(query.filter, Some(FilterSyntax::All));
        assert_eq!(query.stages.len(), 5);
        assert_eq!(
            query.stages[0],
            Stage::Parse {
                source: ExprSyntax::Attribute("message".to_string()),
                parser: "json".to_string(),
            }
        );
        assert_eq!(
            query.stages[1],
            Stage::Select(vec![
                ProjectionSyntax {
                    expr: ExprSyntax::field("level"),
                    alias: None,
                },
                ProjectionSyntax {
                    expr: ExprSyntax::field("req.ms"),
                    alias: Some("ms".to_string()),
                },
            ])
        );

        let Stage::GroupBy { keys, aggregates } = &query.stages[2] else {
            panic!("expected group by");
        };
        assert_eq!(keys.len(), 1);
        assert_eq!(aggregates[0].function, "count");
        assert!(aggregates[0].argument.is_none());
        assert_eq!(aggregates[1].alias.as_deref(), Some("avg"));

        assert_eq!(
            query.stages[3],
            Stage::OrderBy(vec![
                (ExprSyntax::field("avg"), true),
                (ExprSyntax::field("level"), false),
            ])
        );
        assert_eq!(query.stages[4], Stage::Limit(5));
    }

    #[test]
    fn test_parse_stages_without_filter() {
        let query = parse_query("| aggregate count()").unwrap();
        assert!(query.filter.is_none());
        assert_eq!(query.stages.len(), 1);
    }

    #[test]
    fn test_keywords_case_insensitive() {
        let query = parse_query(r#""x" OR "y" | LIMIT 2"#).unwrap();
        assert!(matches!(query.filter, Some(FilterSyntax::Or(_))));
        assert_eq!(query.stages, vec![Stage::Limit(2)]);
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_query(r#""unterminated"#).is_err());
        assert!(parse_query("[a >]").is_err());
        assert!(parse_query(r#""x" | limit"#).is_err());
        assert!(parse_query(r#""x" | frobnicate"#).is_err());
        assert!(parse_query("and").is_err());
    }
}
