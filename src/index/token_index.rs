//! Token Index - Inverted trigram index over record messages
//!
//! Maps every 3-char window of a message → sorted record ids, so that any
//! pattern token of `MIN_TOKEN_LENGTH` chars or more can be resolved to a
//! candidate set by intersecting the postings of its trigrams.
//!
//! # Example
//! ```ignore
//! let index = TokenIndex::build(&items);
//! // Records whose message may contain "refused"
//! let candidates = index.candidates("refused");
//! ```
//!
//! # Design Notes
//! - Candidates are a superset: trigrams may occur non-contiguously, so a
//!   hit still goes through the pattern matcher
//! - Built per query over the records being evaluated

use crate::log::LogItem;
use crate::pattern::{Token, TokenSet, MIN_TOKEN_LENGTH};
use std::collections::{HashMap, HashSet};

type Trigram = [char; 3];

/// Inverted index over message trigrams
#[derive(Debug, Default)]
pub struct TokenIndex {
    /// trigram → ascending record ids
    postings: HashMap<Trigram, Vec<usize>>,
    /// Number of records indexed
    records: usize,
}

impl TokenIndex {
    /// Create an empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Index a slice of records; record ids are slice positions
    pub fn build(items: &[LogItem]) -> Self {
        let mut index = Self::new();
        for item in items {
            index.add(&item.message);
        }
        index
    }

    /// Add the next record and return its id
    pub fn add(&mut self, message: &str) -> usize {
        let id = self.records;
        self.records += 1;

        let mut seen = HashSet::new();
        for trigram in trigrams(message) {
            if seen.insert(trigram) {
                self.postings.entry(trigram).or_default().push(id);
            }
        }

        id
    }

    /// Number of records indexed
    pub fn len(&self) -> usize {
        self.records
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.records == 0
    }

    /// Number of distinct trigrams
    pub fn trigram_count(&self) -> usize {
        self.postings.len()
    }

    /// Records that may contain `data`
    ///
    /// Returns `None` when the text is too short to narrow the search.
    pub fn candidates(&self, data: &str) -> Option<Vec<usize>> {
        let grams: HashSet<Trigram> = trigrams(data).collect();
        if grams.is_empty() {
            return None;
        }

        let mut lists: Vec<&Vec<usize>> = Vec::with_capacity(grams.len());
        for gram in &grams {
            match self.postings.get(gram) {
                Some(list) => lists.push(list),
                None => return Some(Vec::new()),
            }
        }

        // Intersect starting from the rarest trigram
        lists.sort_by_key(|list| list.len());
        let mut result = lists[0].clone();
        for list in &lists[1..] {
            result = intersect(&result, list);
            if result.is_empty() {
                break;
            }
        }

        Some(result)
    }

    /// Records that may match every token of a set
    ///
    /// Returns `None` for exact sets: those are evaluated on every record.
    pub fn candidates_for(&self, set: &TokenSet) -> Option<Vec<usize>> {
        if set.exact {
            return None;
        }

        let mut result: Option<Vec<usize>> = None;
        for token in &set.tokens {
            if let Some(ids) = self.candidates(&token.data) {
                result = Some(match result {
                    Some(acc) => intersect(&acc, &ids),
                    None => ids,
                });
            }
        }
        result
    }

    /// Concrete occurrences of a pattern token in the indexed records
    ///
    /// Each returned token carries the record's file and member and the byte
    /// position of the occurrence within the source.
    pub fn locate(&self, items: &[LogItem], token: &Token) -> Vec<Token> {
        let ids = match self.candidates(&token.data) {
            Some(ids) => ids,
            None => (0..items.len().min(self.records)).collect(),
        };

        let mut found = Vec::new();
        for id in ids {
            let Some(item) = items.get(id) else { continue };
            for (offset, _) in item.message.match_indices(token.data.as_str()) {
                found.push(Token {
                    kind: token.kind,
                    data: token.data.clone(),
                    file: item.file.clone(),
                    member: item.member.clone(),
                    position: item.position + offset as u64,
                    exact: token.exact,
                });
            }
        }
        found
    }
}

fn trigrams(text: &str) -> impl Iterator<Item = Trigram> + '_ {
    let chars: Vec<char> = text.chars().collect();
    let count = chars.len().saturating_sub(MIN_TOKEN_LENGTH - 1);
    (0..count).map(move |i| [chars[i], chars[i + 1], chars[i + 2]])
}

/// Intersect two ascending id lists
pub fn intersect(a: &[usize], b: &[usize]) -> Vec<usize> {
    let mut result = Vec::with_capacity(a.len().min(b.len()));
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                result.push(a[i]);
                i += 1;
                j += 1;
            }
        }
    }
    result
}

/// Union two ascending id lists
pub fn union(a: &[usize], b: &[usize]) -> Vec<usize> {
    let mut result = Vec::with_capacity(a.len() + b.len());
    let (mut i, mut j) = (0, 0);
    while i < a.len() || j < b.len() {
        let next = match (a.get(i), b.get(j)) {
            (Some(&x), Some(&y)) if x == y => {
                i += 1;
                j += 1;
                x
            }
            (Some(&x), Some(&y)) if x < y => {
                i += 1;
                x
            }
            (_, Some(&y)) => {
                j += 1;
                y
            }
            (Some(&x), None) => {
                i += 1;
                x
            }
            (None, None) => break,
        };
        result.push(next);
    }
    result
}
