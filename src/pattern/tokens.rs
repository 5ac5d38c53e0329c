//! Token extraction for index pre-filtering
//!
//! Literal runs of a pattern (at least `MIN_TOKEN_LENGTH` chars) are looked
//! up in the inverted token index before the full matcher runs. A record
//! that lacks any token cannot match the pattern.
//!
//! # Exactness
//!
//! A token is exact when nothing of variable width (wildcard or capture)
//! precedes it, so its offset from the start of a match is fixed.
//!
//! A `TokenSet` is exact when the index cannot narrow the search: no token
//! could be extracted, more than one typed capture must be converted, or a
//! marker field is rewritten on match. Exact sets are evaluated against every
//! record.

use super::matcher::{Pattern, Segment};

/// Shortest literal run worth indexing
pub const MIN_TOKEN_LENGTH: usize = 3;

/// Kind of token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// The token is the whole pattern: any occurrence is a match
    Line,
    /// A fragment of the pattern
    Characters,
}

/// A literal unit used for index lookups
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub data: String,
    /// Source file (empty for tokens taken from a pattern)
    pub file: String,
    /// Archive member (empty for tokens taken from a pattern)
    pub member: String,
    /// Char position in the pattern, or byte position in the source file
    pub position: u64,
    pub exact: bool,
}

/// Tokens of one pattern plus the exactness verdict
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenSet {
    pub tokens: Vec<Token>,
    pub exact: bool,
}

/// Extract index tokens from a compiled pattern
pub fn extract_tokens(pattern: &Pattern, has_marker: bool) -> TokenSet {
    let segments = pattern.segments();
    let whole_line = pattern.is_literal();

    let mut tokens = Vec::new();
    let mut shifted = false;

    for segment in segments {
        match segment {
            Segment::Literal { text, position } => {
                if text.chars().count() >= MIN_TOKEN_LENGTH {
                    tokens.push(Token {
                        kind: if whole_line {
                            TokenKind::Line
                        } else {
                            TokenKind::Characters
                        },
                        data: text.clone(),
                        file: String::new(),
                        member: String::new(),
                        position: *position as u64,
                        exact: !shifted,
                    });
                }
            }
            Segment::Wildcard | Segment::Capture(_) => shifted = true,
        }
    }

    let typed_captures = pattern
        .captures()
        .iter()
        .filter(|c| c.kind.is_typed())
        .count();

    let exact = tokens.is_empty() || typed_captures > 1 || has_marker;

    TokenSet { tokens, exact }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens_of(source: &str) -> TokenSet {
        extract_tokens(&Pattern::new(source).unwrap(), false)
    }

    #[test]
    fn test_literal_pattern_yields_line_token() {
        let set = tokens_of("disk full");

        assert_eq!(set.tokens.len(), 1);
        assert_eq!(set.tokens[0].kind, TokenKind::Line);
        assert_eq!(set.tokens[0].data, "disk full");
        assert!(set.tokens[0].exact);
        assert!(!set.exact);
    }

    #[test]
    fn test_tokens_after_wildcard_are_not_exact() {
        let set = tokens_of("connection*refused by {host}");

        let data: Vec<_> = set.tokens.iter().map(|t| t.data.as_str()).collect();
        assert_eq!(data, vec!["connection", "refused by "]);
        assert!(set.tokens[0].exact);
        assert!(!set.tokens[1].exact);
        assert_eq!(set.tokens[1].position, 11);
        assert_eq!(set.tokens[1].kind, TokenKind::Characters);
    }

    #[test]
    fn test_short_runs_are_skipped() {
        let set = tokens_of("{a}={b}");
        assert!(set.tokens.is_empty());
        assert!(set.exact);
    }

    #[test]
    fn test_capture_interiors_are_not_tokens() {
        let set = tokens_of("@{timestamp:time} done");
        let data: Vec<_> = set.tokens.iter().map(|t| t.data.as_str()).collect();
        assert_eq!(data, vec![" done"]);
    }

    #[test]
    fn test_multiple_typed_captures_force_exact() {
        assert!(!tokens_of("error {code:number} in {module}").exact);
        assert!(tokens_of("error {code:number} after {ms:number}").exact);
    }

    #[test]
    fn test_marker_forces_exact() {
        let pattern = Pattern::new("disk full").unwrap();
        assert!(extract_tokens(&pattern, true).exact);
    }
}
