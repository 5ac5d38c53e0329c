//! Aggregate Library
//!
//! Stateful reducers following an initialize / update / join / complete
//! contract, so that partitions of the input can be aggregated independently
//! and merged afterwards:
//!
//! ```text
//! partition A: initialize → update × n ─┐
//!                                        ├─ join → complete → values
//! partition B: initialize → update × m ─┘
//! ```
//!
//! `join` keeps the left-to-right order of partitions: `First` prefers the
//! left state and `Last` the right one, `List` concatenates.
//!
//! Numeric aggregates coerce their input through `Value::as_f64`; inputs that
//! do not coerce (or coerce to NaN) are skipped without error.

use crate::log::{Value, ValueType};
use std::collections::{HashMap, HashSet};

/// Aggregation functions available in queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregateFunction {
    /// Number of truthy inputs (or records when called without argument)
    Count,
    Sum,
    /// Arithmetic mean
    Mean,
    /// Element at `len / 2` of the sorted values
    Median,
    Min,
    Max,
    /// First non-null input
    First,
    /// Most recent non-null input
    Last,
    /// All non-null inputs in arrival order
    List,
    /// Unique non-null inputs in first-seen order
    Distinct,
    /// Least frequent input
    Least,
}

impl AggregateFunction {
    /// Parse from string
    pub fn from_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "count" => Some(Self::Count),
            "sum" => Some(Self::Sum),
            "mean" | "avg" | "average" => Some(Self::Mean),
            "median" => Some(Self::Median),
            "min" => Some(Self::Min),
            "max" => Some(Self::Max),
            "first" => Some(Self::First),
            "last" => Some(Self::Last),
            "list" => Some(Self::List),
            "distinct" => Some(Self::Distinct),
            "least" => Some(Self::Least),
            _ => None,
        }
    }

    /// Name used in queries and default column names
    pub fn name(&self) -> &'static str {
        match self {
            Self::Count => "count",
            Self::Sum => "sum",
            Self::Mean => "mean",
            Self::Median => "median",
            Self::Min => "min",
            Self::Max => "max",
            Self::First => "first",
            Self::Last => "last",
            Self::List => "list",
            Self::Distinct => "distinct",
            Self::Least => "least",
        }
    }

    /// Whether the function can be called without an argument
    pub fn argument_optional(&self) -> bool {
        matches!(self, Self::Count)
    }

    /// Static result type given the input type
    pub fn result_type(&self, input: ValueType) -> ValueType {
        match self {
            Self::Count => ValueType::Integer,
            Self::Sum | Self::Mean | Self::Median | Self::Min | Self::Max => ValueType::Number,
            Self::First | Self::Last | Self::Least => input,
            Self::List | Self::Distinct => ValueType::List,
        }
    }

    /// Create the empty state
    pub fn initialize(&self) -> AggregateState {
        match self {
            Self::Count => AggregateState::Count(0),
            Self::Sum => AggregateState::Sum(0.0),
            Self::Mean => AggregateState::Mean { sum: 0.0, count: 0 },
            Self::Median => AggregateState::Median(Vec::new()),
            Self::Min => AggregateState::Min(None),
            Self::Max => AggregateState::Max(None),
            Self::First => AggregateState::First(None),
            Self::Last => AggregateState::Last(None),
            Self::List => AggregateState::List(Vec::new()),
            Self::Distinct => AggregateState::Distinct {
                seen: HashSet::new(),
                order: Vec::new(),
            },
            Self::Least => AggregateState::Least {
                index: HashMap::new(),
                counts: Vec::new(),
            },
        }
    }
}

impl std::fmt::Display for AggregateFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Accumulator of one aggregate over one partition or group
#[derive(Debug, Clone, PartialEq)]
pub enum AggregateState {
    Count(i64),
    Sum(f64),
    Mean { sum: f64, count: u64 },
    Median(Vec<f64>),
    Min(Option<f64>),
    Max(Option<f64>),
    First(Option<Value>),
    Last(Option<Value>),
    List(Vec<Value>),
    Distinct {
        seen: HashSet<Value>,
        order: Vec<Value>,
    },
    /// Frequencies in first-seen order; `index` maps a value to its slot
    Least {
        index: HashMap<Value, usize>,
        counts: Vec<(Value, u64)>,
    },
}

/// Numeric input, or `None` when the value must be skipped
fn numeric(value: &Value) -> Option<f64> {
    value.as_f64().filter(|n| !n.is_nan())
}

impl AggregateState {
    /// Fold one input value into the state
    pub fn update(&mut self, value: &Value) {
        match self {
            AggregateState::Count(count) => {
                if value.is_truthy() {
                    *count += 1;
                }
            }
            AggregateState::Sum(sum) => {
                if let Some(n) = numeric(value) {
                    *sum += n;
                }
            }
            AggregateState::Mean { sum, count } => {
                if let Some(n) = numeric(value) {
                    *sum += n;
                    *count += 1;
                }
            }
            AggregateState::Median(values) => {
                if let Some(n) = numeric(value) {
                    values.push(n);
                }
            }
            AggregateState::Min(min) => {
                if let Some(n) = numeric(value) {
                    *min = Some(min.map_or(n, |m| m.min(n)));
                }
            }
            AggregateState::Max(max) => {
                if let Some(n) = numeric(value) {
                    *max = Some(max.map_or(n, |m| m.max(n)));
                }
            }
            AggregateState::First(first) => {
                if first.is_none() && !value.is_null() {
                    *first = Some(value.clone());
                }
            }
            AggregateState::Last(last) => {
                if !value.is_null() {
                    *last = Some(value.clone());
                }
            }
            AggregateState::List(items) => {
                if !value.is_null() {
                    items.push(value.clone());
                }
            }
            AggregateState::Distinct { seen, order } => {
                if !value.is_null() && seen.insert(value.clone()) {
                    order.push(value.clone());
                }
            }
            AggregateState::Least { index, counts } => {
                if !value.is_null() {
                    bump(index, counts, value, 1);
                }
            }
        }
    }

    /// Merge the state of the partition that follows this one
    ///
    /// Mismatched states (different functions) keep `self`.
    pub fn join(self, other: AggregateState) -> AggregateState {
        match (self, other) {
            (AggregateState::Count(a), AggregateState::Count(b)) => AggregateState::Count(a + b),
            (AggregateState::Sum(a), AggregateState::Sum(b)) => AggregateState::Sum(a + b),
            (
                AggregateState::Mean { sum: s1, count: c1 },
                AggregateState::Mean { sum: s2, count: c2 },
            ) => AggregateState::Mean {
                sum: s1 + s2,
                count: c1 + c2,
            },
            (AggregateState::Median(mut a), AggregateState::Median(b)) => {
                a.extend(b);
                AggregateState::Median(a)
            }
            (AggregateState::Min(a), AggregateState::Min(b)) => AggregateState::Min(match (a, b) {
                (Some(x), Some(y)) => Some(x.min(y)),
                (x, y) => x.or(y),
            }),
            (AggregateState::Max(a), AggregateState::Max(b)) => AggregateState::Max(match (a, b) {
                (Some(x), Some(y)) => Some(x.max(y)),
                (x, y) => x.or(y),
            }),
            (AggregateState::First(a), AggregateState::First(b)) => AggregateState::First(a.or(b)),
            (AggregateState::Last(a), AggregateState::Last(b)) => AggregateState::Last(b.or(a)),
            (AggregateState::List(mut a), AggregateState::List(b)) => {
                a.extend(b);
                AggregateState::List(a)
            }
            (
                AggregateState::Distinct {
                    mut seen,
                    mut order,
                },
                AggregateState::Distinct { order: other, .. },
            ) => {
                for value in other {
                    if seen.insert(value.clone()) {
                        order.push(value);
                    }
                }
                AggregateState::Distinct { seen, order }
            }
            (
                AggregateState::Least {
                    mut index,
                    mut counts,
                },
                AggregateState::Least { counts: other, .. },
            ) => {
                for (value, n) in other {
                    bump(&mut index, &mut counts, &value, n);
                }
                AggregateState::Least { index, counts }
            }
            (left, _) => left,
        }
    }

    /// Produce the output values
    ///
    /// `List` and `Distinct` emit zero or many values; every other state
    /// emits exactly one (possibly `Null`).
    pub fn complete(self) -> Vec<Value> {
        match self {
            AggregateState::Count(count) => vec![Value::Integer(count)],
            AggregateState::Sum(sum) => vec![Value::Number(sum)],
            AggregateState::Mean { sum, count } => {
                if count == 0 {
                    vec![Value::Null]
                } else {
                    vec![Value::Number(sum / count as f64)]
                }
            }
            AggregateState::Median(mut values) => {
                if values.is_empty() {
                    return vec![Value::Null];
                }
                values.sort_by(|a, b| a.total_cmp(b));
                vec![Value::Number(values[values.len() / 2])]
            }
            AggregateState::Min(min) => vec![min.map(Value::Number).unwrap_or(Value::Null)],
            AggregateState::Max(max) => vec![max.map(Value::Number).unwrap_or(Value::Null)],
            AggregateState::First(v) | AggregateState::Last(v) => vec![v.unwrap_or(Value::Null)],
            AggregateState::List(items) => items,
            AggregateState::Distinct { order, .. } => order,
            AggregateState::Least { counts, .. } => {
                let mut least: Option<(Value, u64)> = None;
                for (value, n) in counts {
                    if least.as_ref().map_or(true, |(_, best)| n < *best) {
                        least = Some((value, n));
                    }
                }
                vec![least.map(|(v, _)| v).unwrap_or(Value::Null)]
            }
        }
    }

    /// Complete into one result cell
    ///
    /// `List` and `Distinct` always give a `Value::List`, empty when nothing
    /// was collected. Every other state gives its single value.
    pub fn into_cell(self) -> Value {
        match self {
            AggregateState::List(_) | AggregateState::Distinct { .. } => {
                Value::List(self.complete())
            }
            _ => self.complete().into_iter().next().unwrap_or(Value::Null),
        }
    }
}

fn bump(index: &mut HashMap<Value, usize>, counts: &mut Vec<(Value, u64)>, value: &Value, n: u64) {
    match index.get(value) {
        Some(&slot) => counts[slot].1 += n,
        None => {
            index.insert(value.clone(), counts.len());
            counts.push((value.clone(), n));
        }
    }
}
