//! Core data types for log records
//!
//! This module defines the fundamental types flowing through the query engine:
//! - `LogItem`: A single log record with its parsed fields
//! - `Value`: A dynamically typed field value
//! - `ValueType`: Static type of a value or an output column
//! - `Attribute`: Built-in record attributes addressable from queries

use chrono::NaiveDateTime;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

/// Field name → value mapping of a record
pub type Fields = HashMap<String, Value>;

/// Format used when rendering time values as text
pub const DISPLAY_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// A single log record
///
/// Produced by a log source; pattern matches add or overwrite captured
/// fields and parse stages replace the whole field set. Records are moved
/// through a query pipeline, so each evaluation owns its records exclusively.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct LogItem {
    /// File the record was read from
    pub file: String,
    /// Archive entry name (empty for plain files)
    pub member: String,
    /// Byte offset of the record within the file or member
    pub position: u64,
    /// 1-based line number
    pub line: u64,
    /// Raw message text
    pub message: String,
    /// Parsed or captured fields
    pub fields: Fields,
}

impl LogItem {
    /// Create a record without fields
    pub fn new(file: impl Into<String>, line: u64, position: u64, message: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            member: String::new(),
            position,
            line,
            message: message.into(),
            fields: Fields::new(),
        }
    }

    /// Create a record holding only a message (convenient in tests and demos)
    pub fn message(message: impl Into<String>) -> Self {
        Self::new("", 0, 0, message)
    }

    /// Builder method: set the archive member
    pub fn member(mut self, member: impl Into<String>) -> Self {
        self.member = member.into();
        self
    }

    /// Builder method: set a field
    pub fn field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Look up a user field
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Read a built-in attribute as a value
    pub fn attribute(&self, attribute: Attribute) -> Value {
        match attribute {
            Attribute::File => Value::String(self.file.clone()),
            Attribute::Member => Value::String(self.member.clone()),
            Attribute::Position => Value::Integer(self.position as i64),
            Attribute::Line => Value::Integer(self.line as i64),
            Attribute::Message => Value::String(self.message.clone()),
        }
    }
}

/// Built-in record attributes, written `@name` in queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Attribute {
    File,
    Member,
    Position,
    Line,
    Message,
}

impl Attribute {
    /// Parse from the name used after `@`
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "file" => Some(Self::File),
            "member" => Some(Self::Member),
            "position" | "pos" => Some(Self::Position),
            "line" => Some(Self::Line),
            "message" | "msg" => Some(Self::Message),
            _ => None,
        }
    }

    /// Static type of the attribute
    pub fn value_type(&self) -> ValueType {
        match self {
            Self::Position | Self::Line => ValueType::Integer,
            Self::File | Self::Member | Self::Message => ValueType::String,
        }
    }
}

impl std::fmt::Display for Attribute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::File => write!(f, "@file"),
            Self::Member => write!(f, "@member"),
            Self::Position => write!(f, "@position"),
            Self::Line => write!(f, "@line"),
            Self::Message => write!(f, "@message"),
        }
    }
}

/// Static type of a value or result column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    /// Unknown until evaluated
    Any,
    Bool,
    Integer,
    Number,
    String,
    Time,
    List,
}

impl ValueType {
    /// Parse a type annotation (`field:number`)
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "any" => Some(Self::Any),
            "bool" | "boolean" => Some(Self::Bool),
            "int" | "integer" => Some(Self::Integer),
            "number" | "float" => Some(Self::Number),
            "string" | "text" => Some(Self::String),
            "time" | "datetime" => Some(Self::Time),
            "list" => Some(Self::List),
            _ => None,
        }
    }
}

impl std::fmt::Display for ValueType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Any => write!(f, "any"),
            Self::Bool => write!(f, "bool"),
            Self::Integer => write!(f, "integer"),
            Self::Number => write!(f, "number"),
            Self::String => write!(f, "string"),
            Self::Time => write!(f, "time"),
            Self::List => write!(f, "list"),
        }
    }
}

/// A dynamically typed field value
///
/// Values are totally ordered and hashable so they can serve as sort keys,
/// group keys and set members. `Integer` and `Number` compare numerically
/// with each other; NaN sorts after every other number.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Integer(i64),
    Number(f64),
    String(String),
    Time(NaiveDateTime),
    List(Vec<Value>),
}

impl Value {
    /// Check for null
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Truthiness used by predicates and `count`: anything but null and `false`
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            _ => true,
        }
    }

    /// Numeric coercion
    ///
    /// Strings are parsed as plain floats (`.` decimal separator, no
    /// grouping); times and lists are not numeric.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Number(n) => Some(*n),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            Value::Null | Value::Time(_) | Value::List(_) => None,
        }
    }

    /// Runtime type of this value
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Null => ValueType::Any,
            Value::Bool(_) => ValueType::Bool,
            Value::Integer(_) => ValueType::Integer,
            Value::Number(_) => ValueType::Number,
            Value::String(_) => ValueType::String,
            Value::Time(_) => ValueType::Time,
            Value::List(_) => ValueType::List,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Integer(_) | Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Time(_) => 4,
            Value::List(_) => 5,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Integer(a), Value::Integer(b)) => a.cmp(b),
            (Value::Integer(a), Value::Number(b)) => cmp_integer_number(*a, *b),
            (Value::Number(a), Value::Integer(b)) => cmp_integer_number(*b, *a).reverse(),
            (Value::Number(a), Value::Number(b)) => a.total_cmp(b),
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (Value::Time(a), Value::Time(b)) => a.cmp(b),
            (Value::List(a), Value::List(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

/// Exact order between an integer and a float
///
/// `i as f64` rounds above 2^53, so a tie after conversion is settled in
/// integer space. NaN and signed zeros order as in `f64::total_cmp`.
fn cmp_integer_number(i: i64, n: f64) -> Ordering {
    match (i as f64).total_cmp(&n) {
        Ordering::Equal => {}
        ord => return ord,
    }
    // A tie means `n` is integral and within [-2^63, 2^63]
    if n >= 9_223_372_036_854_775_808.0 {
        return Ordering::Less;
    }
    i.cmp(&(n as i64))
}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.rank().hash(state);
        match self {
            Value::Null => {}
            Value::Bool(b) => b.hash(state),
            // Integers hash through f64 so that Integer(2) == Number(2.0) hash alike
            Value::Integer(i) => (*i as f64).to_bits().hash(state),
            Value::Number(n) => n.to_bits().hash(state),
            Value::String(s) => s.hash(state),
            Value::Time(t) => t.hash(state),
            Value::List(items) => items.hash(state),
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Number(n) => write!(f, "{}", n),
            Value::String(s) => write!(f, "{}", s),
            Value::Time(t) => write!(f, "{}", t.format(DISPLAY_TIME_FORMAT)),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(t: NaiveDateTime) -> Self {
        Value::Time(t)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}
