//! Expressions
//!
//! Typed expression trees evaluated against a single record. Field types are
//! bound at compile time from what earlier stages produce (phrase captures,
//! projections, aggregates); unknown fields are `Any` and evaluate to `Null`.
//!
//! Comparison rules:
//! - a number compares numerically with anything that coerces to a number,
//!   so `[status >= 500]` works on text fields from parsers
//! - values of the same kind compare by their natural order
//! - anything else, and any ordering against `Null`, is false
//! - `=` and `!=` treat two nulls as equal

use super::plan::PhraseNode;
use crate::log::{Attribute, LogItem, Value, ValueType};
use crate::pattern::parse_time;
use std::cmp::Ordering;
use std::sync::Arc;

/// Binary operators, lowest precedence first in the grammar
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    /// Substring test for text, membership test for lists
    Contains,
    Add,
    Sub,
    Mul,
    Div,
}

impl BinaryOp {
    /// Whether the operator yields a boolean
    pub fn is_logical(&self) -> bool {
        !matches!(self, Self::Add | Self::Sub | Self::Mul | Self::Div)
    }

    fn symbol(&self) -> &'static str {
        match self {
            Self::Or => "or",
            Self::And => "and",
            Self::Eq => "=",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Contains => "contains",
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
        }
    }
}

impl std::fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

/// A compiled expression
#[derive(Debug, Clone)]
pub enum Expr {
    Literal(Value),
    /// User field with the type bound at compile time
    Field { name: String, ty: ValueType },
    Attribute(Attribute),
    /// Explicit `field:type` conversion; `format` is used for time casts
    Cast {
        inner: Box<Expr>,
        ty: ValueType,
        format: String,
    },
    Unary { op: UnaryOp, inner: Box<Expr> },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// Pattern test; captures are written to the record under `test`
    Phrase(Arc<PhraseNode>),
}

impl Expr {
    /// Untyped field reference
    pub fn field(name: impl Into<String>) -> Self {
        Expr::Field {
            name: name.into(),
            ty: ValueType::Any,
        }
    }

    pub fn literal(value: impl Into<Value>) -> Self {
        Expr::Literal(value.into())
    }

    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Self {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn and(left: Expr, right: Expr) -> Self {
        Self::binary(BinaryOp::And, left, right)
    }

    pub fn or(left: Expr, right: Expr) -> Self {
        Self::binary(BinaryOp::Or, left, right)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(inner: Expr) -> Self {
        Expr::Unary {
            op: UnaryOp::Not,
            inner: Box::new(inner),
        }
    }

    /// Evaluate without touching the record
    ///
    /// Phrases only report whether they match here; use [`Expr::test`] to
    /// also store their captures.
    pub fn eval(&self, item: &LogItem) -> Value {
        match self {
            Expr::Literal(value) => value.clone(),
            Expr::Field { name, .. } => item.get(name).cloned().unwrap_or(Value::Null),
            Expr::Attribute(attribute) => item.attribute(*attribute),
            Expr::Cast { inner, ty, format } => cast(inner.eval(item), *ty, format),
            Expr::Unary { op, inner } => match op {
                UnaryOp::Not => Value::Bool(!inner.eval(item).is_truthy()),
                UnaryOp::Neg => negate(inner.eval(item)),
            },
            Expr::Binary { op, left, right } => match op {
                BinaryOp::And => {
                    Value::Bool(left.eval(item).is_truthy() && right.eval(item).is_truthy())
                }
                BinaryOp::Or => {
                    Value::Bool(left.eval(item).is_truthy() || right.eval(item).is_truthy())
                }
                _ => apply(*op, &left.eval(item), &right.eval(item)),
            },
            Expr::Phrase(phrase) => Value::Bool(phrase.is_match(item)),
        }
    }

    /// Evaluate as a filter condition
    ///
    /// `and`/`or`/`not` short-circuit; phrases that match store their
    /// captures on the record, so later conjuncts can read them. An `or`
    /// branch that fails leaves the record's fields as they were, and a
    /// negated condition never leaves captures behind.
    pub fn test(&self, item: &mut LogItem) -> bool {
        match self {
            Expr::Binary {
                op: BinaryOp::And,
                left,
                right,
            } => left.test(item) && right.test(item),
            Expr::Binary {
                op: BinaryOp::Or,
                left,
                right,
            } => left.try_branch(item) || right.try_branch(item),
            Expr::Unary {
                op: UnaryOp::Not,
                inner,
            } => {
                if !inner.has_phrase() {
                    return !inner.test(item);
                }
                let snapshot = item.fields.clone();
                let matched = inner.test(item);
                item.fields = snapshot;
                !matched
            }
            Expr::Phrase(phrase) => phrase.apply(item),
            _ => self.eval(item).is_truthy(),
        }
    }

    /// `test`, rolling back stored captures when the condition fails
    fn try_branch(&self, item: &mut LogItem) -> bool {
        if !self.has_phrase() {
            return self.test(item);
        }
        let snapshot = item.fields.clone();
        let matched = self.test(item);
        if !matched {
            item.fields = snapshot;
        }
        matched
    }

    /// Whether testing can write captures to the record
    fn has_phrase(&self) -> bool {
        match self {
            Expr::Phrase(_) => true,
            Expr::Binary { left, right, .. } => left.has_phrase() || right.has_phrase(),
            Expr::Unary { inner, .. } | Expr::Cast { inner, .. } => inner.has_phrase(),
            Expr::Literal(_) | Expr::Field { .. } | Expr::Attribute(_) => false,
        }
    }

    /// Static type of the result
    pub fn result_type(&self) -> ValueType {
        match self {
            Expr::Literal(value) => value.value_type(),
            Expr::Field { ty, .. } => *ty,
            Expr::Attribute(attribute) => attribute.value_type(),
            Expr::Cast { ty, .. } => *ty,
            Expr::Unary { op: UnaryOp::Not, .. } => ValueType::Bool,
            Expr::Unary { inner, .. } => match inner.result_type() {
                ValueType::Integer => ValueType::Integer,
                ValueType::Any => ValueType::Any,
                _ => ValueType::Number,
            },
            Expr::Binary { op, left, right } => {
                if op.is_logical() {
                    return ValueType::Bool;
                }
                match (*op, left.result_type(), right.result_type()) {
                    (BinaryOp::Div, _, _) => ValueType::Number,
                    (_, ValueType::Integer, ValueType::Integer) => ValueType::Integer,
                    (BinaryOp::Add, ValueType::String, ValueType::String) => ValueType::String,
                    (_, ValueType::Any, _) | (_, _, ValueType::Any) => ValueType::Any,
                    _ => ValueType::Number,
                }
            }
            Expr::Phrase(_) => ValueType::Bool,
        }
    }
}

/// Compare two values, `None` when they are not comparable
pub fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    if left.is_null() || right.is_null() {
        return None;
    }

    let numeric = |v: &Value| matches!(v, Value::Integer(_) | Value::Number(_));
    if numeric(left) || numeric(right) {
        if let (Some(a), Some(b)) = (left.as_f64(), right.as_f64()) {
            return a.partial_cmp(&b);
        }
    }

    if std::mem::discriminant(left) == std::mem::discriminant(right) {
        Some(left.cmp(right))
    } else {
        None
    }
}

fn equals(left: &Value, right: &Value) -> bool {
    match (left.is_null(), right.is_null()) {
        (true, true) => true,
        (false, false) => compare(left, right) == Some(Ordering::Equal),
        _ => false,
    }
}

fn apply(op: BinaryOp, left: &Value, right: &Value) -> Value {
    match op {
        BinaryOp::Eq => Value::Bool(equals(left, right)),
        BinaryOp::Ne => Value::Bool(!equals(left, right)),
        BinaryOp::Lt => Value::Bool(compare(left, right) == Some(Ordering::Less)),
        BinaryOp::Le => Value::Bool(matches!(
            compare(left, right),
            Some(Ordering::Less | Ordering::Equal)
        )),
        BinaryOp::Gt => Value::Bool(compare(left, right) == Some(Ordering::Greater)),
        BinaryOp::Ge => Value::Bool(matches!(
            compare(left, right),
            Some(Ordering::Greater | Ordering::Equal)
        )),
        BinaryOp::Contains => Value::Bool(match (left, right) {
            (Value::String(text), Value::String(needle)) => text.contains(needle.as_str()),
            (Value::List(items), needle) => items.iter().any(|item| equals(item, needle)),
            _ => false,
        }),
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div => {
            arithmetic(op, left, right)
        }
        BinaryOp::And => Value::Bool(left.is_truthy() && right.is_truthy()),
        BinaryOp::Or => Value::Bool(left.is_truthy() || right.is_truthy()),
    }
}

fn arithmetic(op: BinaryOp, left: &Value, right: &Value) -> Value {
    match (op, left, right) {
        (BinaryOp::Add, Value::String(a), Value::String(b)) => {
            return Value::String(format!("{}{}", a, b))
        }
        (BinaryOp::Add, Value::Integer(a), Value::Integer(b)) => {
            return a.checked_add(*b).map(Value::Integer).unwrap_or(Value::Null)
        }
        (BinaryOp::Sub, Value::Integer(a), Value::Integer(b)) => {
            return a.checked_sub(*b).map(Value::Integer).unwrap_or(Value::Null)
        }
        (BinaryOp::Mul, Value::Integer(a), Value::Integer(b)) => {
            return a.checked_mul(*b).map(Value::Integer).unwrap_or(Value::Null)
        }
        _ => {}
    }

    let (Some(a), Some(b)) = (left.as_f64(), right.as_f64()) else {
        return Value::Null;
    };

    match op {
        BinaryOp::Add => Value::Number(a + b),
        BinaryOp::Sub => Value::Number(a - b),
        BinaryOp::Mul => Value::Number(a * b),
        BinaryOp::Div if b == 0.0 => Value::Null,
        BinaryOp::Div => Value::Number(a / b),
        _ => Value::Null,
    }
}

fn negate(value: Value) -> Value {
    match value {
        Value::Integer(i) => i.checked_neg().map(Value::Integer).unwrap_or(Value::Null),
        other => other.as_f64().map(|n| Value::Number(-n)).unwrap_or(Value::Null),
    }
}

/// Convert a value to the requested type, `Null` when it does not convert
pub fn cast(value: Value, ty: ValueType, format: &str) -> Value {
    if value.is_null() {
        return Value::Null;
    }

    match ty {
        ValueType::Any => value,
        ValueType::Number => value.as_f64().map(Value::Number).unwrap_or(Value::Null),
        ValueType::Integer => match value {
            Value::Integer(i) => Value::Integer(i),
            Value::String(s) => match s.trim().parse::<i64>() {
                Ok(i) => Value::Integer(i),
                Err(_) => Value::String(s).as_f64().map(truncate).unwrap_or(Value::Null),
            },
            other => other.as_f64().map(truncate).unwrap_or(Value::Null),
        },
        ValueType::Bool => match value {
            Value::String(s) => match s.trim().to_lowercase().as_str() {
                "true" | "yes" | "1" => Value::Bool(true),
                "false" | "no" | "0" => Value::Bool(false),
                _ => Value::Null,
            },
            other => Value::Bool(other.is_truthy()),
        },
        ValueType::String => match value {
            Value::String(s) => Value::String(s),
            other => Value::String(other.to_string()),
        },
        ValueType::Time => match value {
            Value::Time(t) => Value::Time(t),
            Value::String(s) => parse_time(&s, format).map(Value::Time).unwrap_or(Value::Null),
            _ => Value::Null,
        },
        ValueType::List => match value {
            Value::List(items) => Value::List(items),
            other => Value::List(vec![other]),
        },
    }
}

fn truncate(n: f64) -> Value {
    if n.is_finite() && n.abs() < i64::MAX as f64 {
        Value::Integer(n.trunc() as i64)
    } else {
        Value::Null
    }
}

impl std::fmt::Display for Expr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Expr::Literal(Value::String(s)) => write!(f, "'{}'", s.replace('\'', "\\'")),
            Expr::Literal(value) => write!(f, "{}", value),
            Expr::Field { name, .. } => write!(f, "{}", name),
            Expr::Attribute(attribute) => write!(f, "{}", attribute),
            Expr::Cast { inner, ty, .. } => write!(f, "{}:{}", inner, ty),
            Expr::Unary {
                op: UnaryOp::Not,
                inner,
            } => write!(f, "not {}", Operand(inner)),
            Expr::Unary {
                op: UnaryOp::Neg,
                inner,
            } => write!(f, "-{}", Operand(inner)),
            Expr::Binary { op, left, right } => {
                write!(f, "{} {} {}", Operand(left), op, Operand(right))
            }
            Expr::Phrase(phrase) => write!(f, "\"{}\"", phrase.pattern()),
        }
    }
}

/// Parenthesize nested operators when printing
struct Operand<'a>(&'a Expr);

impl std::fmt::Display for Operand<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.0 {
            Expr::Binary { .. } | Expr::Unary { .. } => write!(f, "({})", self.0),
            other => write!(f, "{}", other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::Pattern;

    fn item() -> LogItem {
        LogItem::new("app.log", 3, 120, "GET /index 200")
            .field("status", "503")
            .field("ms", 12.5)
            .field("user", "bob")
    }

    #[test]
    fn test_numeric_comparison_coerces_text() {
        let expr = Expr::binary(BinaryOp::Ge, Expr::field("status"), Expr::literal(500i64));
        assert_eq!(expr.eval(&item()), Value::Bool(true));

        let expr = Expr::binary(BinaryOp::Lt, Expr::field("ms"), Expr::literal(10.0));
        assert_eq!(expr.eval(&item()), Value::Bool(false));
    }

    #[test]
    fn test_missing_field_is_null() {
        let missing = Expr::field("nope");
        assert!(missing.eval(&item()).is_null());

        let gt = Expr::binary(BinaryOp::Gt, missing.clone(), Expr::literal(1i64));
        assert_eq!(gt.eval(&item()), Value::Bool(false));

        let eq = Expr::binary(BinaryOp::Eq, missing, Expr::Literal(Value::Null));
        assert_eq!(eq.eval(&item()), Value::Bool(true));
    }

    #[test]
    fn test_string_comparison_and_contains() {
        let eq = Expr::binary(BinaryOp::Eq, Expr::field("user"), Expr::literal("bob"));
        assert!(eq.eval(&item()).is_truthy());

        let contains = Expr::binary(
            BinaryOp::Contains,
            Expr::Attribute(Attribute::Message),
            Expr::literal("/index"),
        );
        assert!(contains.eval(&item()).is_truthy());

        // Text that is not a number is not ordered against numbers
        let mixed = Expr::binary(BinaryOp::Lt, Expr::field("user"), Expr::literal(1i64));
        assert_eq!(mixed.eval(&item()), Value::Bool(false));
    }

    #[test]
    fn test_arithmetic() {
        let sum = Expr::binary(BinaryOp::Add, Expr::literal(2i64), Expr::literal(3i64));
        assert_eq!(sum.eval(&item()), Value::Integer(5));
        assert_eq!(sum.result_type(), ValueType::Integer);

        let scaled = Expr::binary(BinaryOp::Mul, Expr::field("ms"), Expr::literal(2i64));
        assert_eq!(scaled.eval(&item()), Value::Number(25.0));

        let div = Expr::binary(BinaryOp::Div, Expr::literal(1i64), Expr::literal(0i64));
        assert!(div.eval(&item()).is_null());
        assert_eq!(div.result_type(), ValueType::Number);
    }

    #[test]
    fn test_cast() {
        let cast_int = Expr::Cast {
            inner: Box::new(Expr::field("status")),
            ty: ValueType::Integer,
            format: String::new(),
        };
        assert_eq!(cast_int.eval(&item()), Value::Integer(503));
        assert_eq!(cast_int.result_type(), ValueType::Integer);

        let time = cast(Value::from("2024-01-15 10:30:00"), ValueType::Time, "%Y-%m-%d %H:%M:%S");
        assert_eq!(time.value_type(), ValueType::Time);
        assert!(cast(Value::from("garbage"), ValueType::Time, "%Y-%m-%d").is_null());
        assert_eq!(cast(Value::from("no"), ValueType::Bool, ""), Value::Bool(false));
    }

    #[test]
    fn test_logical_short_circuit_applies_captures() {
        let phrase = PhraseNode::new(
            Pattern::new("GET {path} {code:number}").unwrap(),
            "%Y-%m-%d %H:%M:%S",
            None,
        );
        let check = Expr::binary(BinaryOp::Eq, Expr::field("code"), Expr::literal(200i64));
        let expr = Expr::and(Expr::Phrase(Arc::new(phrase)), check);

        let mut record = item();
        assert!(expr.test(&mut record));
        assert_eq!(record.get("path"), Some(&Value::from("/index")));

        // A pure eval neither stores captures nor sees them
        let mut fresh = item();
        assert!(!expr.eval(&fresh).is_truthy());
        assert!(fresh.get("path").is_none());
        assert!(!Expr::not(expr).test(&mut fresh));
    }

    #[test]
    fn test_failed_or_branch_leaves_no_captures() {
        let phrase = Arc::new(PhraseNode::new(
            Pattern::new("error {code:number}").unwrap(),
            "%Y-%m-%d %H:%M:%S",
            None,
        ));
        let warn = PhraseNode::new(Pattern::new("warn").unwrap(), "%Y-%m-%d %H:%M:%S", None);
        let check = Expr::binary(BinaryOp::Gt, Expr::field("code"), Expr::literal(500i64));
        let expr = Expr::or(
            Expr::and(Expr::Phrase(Arc::clone(&phrase)), check),
            Expr::Phrase(Arc::new(warn)),
        );

        let mut record = LogItem::message("error 42 warn");
        assert!(expr.test(&mut record));
        assert!(record.get("code").is_none());

        let mut record = LogItem::message("error 503 warn");
        assert!(expr.test(&mut record));
        assert_eq!(record.get("code"), Some(&Value::Number(503.0)));

        let negated = Expr::not(Expr::Phrase(phrase));
        let mut record = LogItem::message("error 42");
        assert!(!negated.test(&mut record));
        assert!(record.fields.is_empty());
    }

    #[test]
    fn test_display() {
        let expr = Expr::and(
            Expr::binary(BinaryOp::Gt, Expr::field("a"), Expr::literal(1i64)),
            Expr::not(Expr::Attribute(Attribute::Line)),
        );
        assert_eq!(expr.to_string(), "(a > 1) and (not @line)");
    }
}
