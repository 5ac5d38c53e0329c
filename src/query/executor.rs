//! Query Executor
//!
//! Runs a compiled [`Node`] tree over a batch of records:
//! 1. Index lookup to shortlist records for phrase searches
//! 2. Filtering with the folded match predicate
//! 3. Pipeline stages (parse, select, group, aggregate, order, limit)
//!
//! # Execution Pipeline
//!
//! ```text
//! records → TokenIndex shortlist → predicate → stages → ResultSet
//! ```
//!
//! Aggregations split their input into partitions of
//! `ExecutionConfig::partition_size` records. Each partition folds into its
//! own states; states are joined left to right, so order-sensitive
//! aggregates (`first`, `last`, `list`) give the same answer on one thread or
//! many. Inputs of at least `parallel_threshold` records are aggregated on
//! the rayon pool.

use super::aggregate::AggregateState;
use super::error::{QueryError, QueryResult};
use super::plan::{AggregateCall, Column, Node, OrderKey, Projection};
use crate::config::ExecutionConfig;
use crate::index::{intersect, union, TokenIndex};
use crate::log::{Fields, LogItem, Value};
use rayon::prelude::*;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, trace};

/// Cooperative cancellation flag shared between a query and its caller
#[derive(Debug, Clone, Default)]
pub struct Cancellation(Arc<AtomicBool>);

impl Cancellation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation; running queries stop at the next partition
    pub fn cancel(&self) {
        self.0.store(true, AtomicOrdering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(AtomicOrdering::Relaxed)
    }

    fn check(&self) -> QueryResult<()> {
        if self.is_cancelled() {
            Err(QueryError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Result of a query execution
#[derive(Debug, Clone, Serialize)]
pub struct ResultSet {
    /// Statically known output columns
    pub columns: Vec<Column>,
    /// Matching records, or computed rows for select / aggregate stages
    pub rows: Vec<LogItem>,
    /// Number of input records
    pub records_scanned: usize,
    /// Execution time in milliseconds
    pub elapsed_ms: u64,
}

impl ResultSet {
    /// Get the number of rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Column names, in output order
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Cell value of one row
    pub fn value(&self, row: usize, column: &str) -> Option<&Value> {
        self.rows.get(row).and_then(|r| r.get(column))
    }
}

/// Query executor
#[derive(Debug, Clone, Default)]
pub struct Executor {
    config: ExecutionConfig,
}

impl Executor {
    /// Create a new query executor
    pub fn new(config: ExecutionConfig) -> Self {
        Self { config }
    }

    /// Execute a plan over the given records
    pub fn execute(
        &self,
        plan: &Node,
        items: Vec<LogItem>,
        cancellation: &Cancellation,
    ) -> QueryResult<ResultSet> {
        let start = Instant::now();
        let records_scanned = items.len();

        let rows = self.run(plan, items, cancellation)?;

        let elapsed_ms = start.elapsed().as_millis() as u64;
        debug!(
            records_scanned,
            rows = rows.len(),
            elapsed_ms,
            "Query executed"
        );

        Ok(ResultSet {
            columns: plan.columns(),
            rows,
            records_scanned,
            elapsed_ms,
        })
    }

    fn partition_size(&self) -> usize {
        self.config.partition_size.max(1)
    }

    fn run(
        &self,
        node: &Node,
        items: Vec<LogItem>,
        cancellation: &Cancellation,
    ) -> QueryResult<Vec<LogItem>> {
        match node {
            Node::Scan
            | Node::And(_)
            | Node::Or(_)
            | Node::Not(_)
            | Node::Predicate(_)
            | Node::Phrase(_) => self.filter(node, items, cancellation),
            Node::Parse {
                inner,
                field,
                parser,
            } => {
                let mut rows = self.run(inner, items, cancellation)?;
                for item in &mut rows {
                    if let Value::String(text) = field.eval(item) {
                        match parser.try_parse(&text) {
                            Some(fields) => item.fields = fields,
                            None => trace!(
                                line = item.line,
                                parser = parser.name(),
                                "Record left unparsed"
                            ),
                        }
                    }
                }
                Ok(rows)
            }
            Node::Project { inner, columns } => {
                let rows = self.run(inner, items, cancellation)?;
                Ok(rows.into_iter().map(|item| project(item, columns)).collect())
            }
            Node::GroupBy {
                inner,
                keys,
                aggregates,
            } => {
                let rows = self.run(inner, items, cancellation)?;
                self.group(&rows, keys, aggregates, cancellation)
            }
            Node::Aggregate { inner, aggregates } => {
                let rows = self.run(inner, items, cancellation)?;
                self.aggregate(&rows, aggregates, cancellation)
            }
            Node::OrderBy { inner, keys } => {
                let rows = self.run(inner, items, cancellation)?;
                Ok(order(rows, keys))
            }
            Node::Limit { inner, count } => {
                let mut rows = self.run(inner, items, cancellation)?;
                rows.truncate(*count);
                Ok(rows)
            }
        }
    }

    /// Keep the records the match tree accepts
    fn filter(
        &self,
        node: &Node,
        items: Vec<LogItem>,
        cancellation: &Cancellation,
    ) -> QueryResult<Vec<LogItem>> {
        cancellation.check()?;
        if matches!(node, Node::Scan) {
            return Ok(items);
        }

        let predicate = node
            .predicate()
            .ok_or_else(|| QueryError::Execution(format!("not a filter: {}", node)))?;

        let shortlist = if self.config.use_index && node.uses_index() {
            let index = TokenIndex::build(&items);
            let ids = candidates(node, &index);
            trace!(
                trigrams = index.trigram_count(),
                shortlisted = ids.as_ref().map(Vec::len),
                "Token index lookup"
            );
            ids.map(|ids| {
                let mut mask = vec![false; items.len()];
                for id in ids {
                    mask[id] = true;
                }
                mask
            })
        } else {
            None
        };

        let size = self.partition_size();
        let mut kept = Vec::new();
        for (id, mut item) in items.into_iter().enumerate() {
            if id % size == 0 {
                cancellation.check()?;
            }
            if shortlist.as_ref().map_or(true, |mask| mask[id]) && predicate.test(&mut item) {
                kept.push(item);
            }
        }

        Ok(kept)
    }

    /// Fold records partition by partition and join the partial results in order
    fn fold_partitions<T, I, F, J>(
        &self,
        items: &[LogItem],
        cancellation: &Cancellation,
        init: I,
        fold: F,
        join: J,
    ) -> QueryResult<T>
    where
        T: Send,
        I: Fn() -> T + Sync + Send,
        F: Fn(T, &[LogItem]) -> T + Sync + Send,
        J: Fn(T, T) -> T + Sync + Send,
    {
        let size = self.partition_size();

        if items.len() >= self.config.parallel_threshold {
            debug!(
                records = items.len(),
                partitions = items.len().div_ceil(size),
                "Parallel aggregation"
            );
            items
                .par_chunks(size)
                .map(|chunk| -> QueryResult<T> {
                    cancellation.check()?;
                    Ok(fold(init(), chunk))
                })
                .try_reduce(&init, |a, b| Ok(join(a, b)))
        } else {
            let mut acc = init();
            for chunk in items.chunks(size) {
                cancellation.check()?;
                acc = fold(acc, chunk);
            }
            Ok(acc)
        }
    }

    fn aggregate(
        &self,
        items: &[LogItem],
        calls: &[AggregateCall],
        cancellation: &Cancellation,
    ) -> QueryResult<Vec<LogItem>> {
        let states = self.fold_partitions(
            items,
            cancellation,
            || initial_states(calls),
            |mut states, chunk| {
                for item in chunk {
                    update_states(&mut states, calls, item);
                }
                states
            },
            join_states,
        )?;

        Ok(vec![LogItem {
            fields: finish(calls, states),
            ..LogItem::default()
        }])
    }

    fn group(
        &self,
        items: &[LogItem],
        keys: &[Projection],
        calls: &[AggregateCall],
        cancellation: &Cancellation,
    ) -> QueryResult<Vec<LogItem>> {
        let table = self.fold_partitions(
            items,
            cancellation,
            GroupTable::default,
            |mut table, chunk| {
                for item in chunk {
                    let key: Vec<Value> = keys.iter().map(|k| k.expr.eval(item)).collect();
                    table.update(key, item, calls);
                }
                table
            },
            GroupTable::join,
        )?;

        debug!(groups = table.groups.len(), "Grouped records");

        Ok(table
            .groups
            .into_iter()
            .map(|(key, states)| {
                let mut fields: Fields = keys
                    .iter()
                    .zip(key)
                    .map(|(k, value)| (k.name.clone(), value))
                    .collect();
                fields.extend(finish(calls, states));
                LogItem {
                    fields,
                    ..LogItem::default()
                }
            })
            .collect())
    }
}

/// Candidate record ids for the match tree, `None` when every record is a candidate
///
/// `And` narrows with each restricted child; `Or` is restricted only when
/// every child is.
fn candidates(node: &Node, index: &TokenIndex) -> Option<Vec<usize>> {
    match node {
        Node::Phrase(phrase) => index.candidates_for(phrase.tokens()),
        Node::And(children) => children
            .iter()
            .filter_map(|child| candidates(child, index))
            .reduce(|a, b| intersect(&a, &b)),
        Node::Or(children) => {
            let mut ids = Vec::new();
            for child in children {
                ids = union(&ids, &candidates(child, index)?);
            }
            Some(ids)
        }
        _ => None,
    }
}

fn project(item: LogItem, columns: &[Projection]) -> LogItem {
    let fields = columns
        .iter()
        .map(|p| (p.name.clone(), p.expr.eval(&item)))
        .collect();
    LogItem { fields, ..item }
}

/// Stable sort on precomputed keys
fn order(rows: Vec<LogItem>, keys: &[OrderKey]) -> Vec<LogItem> {
    let mut keyed: Vec<(Vec<Value>, LogItem)> = rows
        .into_iter()
        .map(|item| (keys.iter().map(|k| k.expr.eval(&item)).collect(), item))
        .collect();

    keyed.sort_by(|(a, _), (b, _)| {
        for ((x, y), key) in a.iter().zip(b).zip(keys) {
            let ord = if key.descending { y.cmp(x) } else { x.cmp(y) };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });

    keyed.into_iter().map(|(_, item)| item).collect()
}

fn initial_states(calls: &[AggregateCall]) -> Vec<AggregateState> {
    calls.iter().map(AggregateCall::initialize).collect()
}

fn update_states(states: &mut [AggregateState], calls: &[AggregateCall], item: &LogItem) {
    for (state, call) in states.iter_mut().zip(calls) {
        state.update(&call.input(item));
    }
}

fn join_states(left: Vec<AggregateState>, right: Vec<AggregateState>) -> Vec<AggregateState> {
    left.into_iter()
        .zip(right)
        .map(|(a, b)| a.join(b))
        .collect()
}

fn finish(calls: &[AggregateCall], states: Vec<AggregateState>) -> Fields {
    calls
        .iter()
        .zip(states)
        .map(|(call, state)| (call.name.clone(), state.into_cell()))
        .collect()
}

/// Aggregation states per group key, in first-seen order
#[derive(Debug, Default)]
struct GroupTable {
    index: HashMap<Vec<Value>, usize>,
    groups: Vec<(Vec<Value>, Vec<AggregateState>)>,
}

impl GroupTable {
    fn update(&mut self, key: Vec<Value>, item: &LogItem, calls: &[AggregateCall]) {
        let slot = match self.index.get(&key) {
            Some(&slot) => slot,
            None => {
                let slot = self.groups.len();
                self.index.insert(key.clone(), slot);
                self.groups.push((key, initial_states(calls)));
                slot
            }
        };
        update_states(&mut self.groups[slot].1, calls, item);
    }

    fn join(mut self, other: GroupTable) -> GroupTable {
        for (key, states) in other.groups {
            match self.index.get(&key) {
                Some(&slot) => {
                    let current = std::mem::take(&mut self.groups[slot].1);
                    self.groups[slot].1 = join_states(current, states);
                }
                None => {
                    self.index.insert(key.clone(), self.groups.len());
                    self.groups.push((key, states));
                }
            }
        }
        self
    }
}
