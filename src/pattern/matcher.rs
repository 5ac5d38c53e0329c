//! Pattern compilation and matching
//!
//! A pattern is split into literal, wildcard and capture segments, then
//! compiled into an unanchored regular expression:
//!
//! ```text
//! "error {code:number} in *"  →  error (.*?) in .*?
//! "user {name}"               →  user (\S+)
//! "{n:number} bytes"          →  (\S+?) bytes
//! ```
//!
//! The leftmost occurrence wins. A capture followed by literal text binds
//! lazily up to that text; a capture with no literal after it binds one
//! whitespace-free word. A leading capture has nothing to anchor its start,
//! so it binds the word directly before the following literal. `\` escapes
//! the next character.

use super::error::{PatternError, PatternResult};
use chrono::format::{Item, StrftimeItems};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use regex::{Regex, RegexBuilder};
use std::collections::HashSet;
use std::fmt::Write;

/// Declared type of a capture placeholder
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureKind {
    /// `{name:number}` - parsed as a float
    Number,
    /// `{name}` or `{name:string}`
    String,
    /// `{name:time}` - parsed with the query's default time format
    Time,
    /// `{name:%d/%m/%Y}` - parsed with its own strftime format
    Format(String),
}

impl CaptureKind {
    /// Parse a type suffix
    ///
    /// Anything other than `number`, `string` or `time` must be a strftime
    /// format that renders the current time cleanly.
    pub fn from_suffix(suffix: &str) -> Option<Self> {
        match suffix {
            "number" => Some(Self::Number),
            "string" => Some(Self::String),
            "time" => Some(Self::Time),
            fmt if is_time_format(fmt) => Some(Self::Format(fmt.to_string())),
            _ => None,
        }
    }

    /// Whether captured text needs conversion (anything but `string`)
    pub fn is_typed(&self) -> bool {
        !matches!(self, Self::String)
    }

    /// Format to parse a time capture with, given the query default
    pub fn time_format<'a>(&'a self, default: &'a str) -> &'a str {
        match self {
            Self::Format(fmt) => fmt,
            _ => default,
        }
    }
}

impl std::fmt::Display for CaptureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number => write!(f, "number"),
            Self::String => write!(f, "string"),
            Self::Time => write!(f, "time"),
            Self::Format(fmt) => write!(f, "{}", fmt),
        }
    }
}

/// A named capture placeholder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capture {
    pub name: String,
    pub kind: CaptureKind,
}

/// One piece of a parsed pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Unescaped literal text and its char position in the pattern source
    Literal { text: String, position: usize },
    /// `*`; consecutive wildcards collapse into one
    Wildcard,
    Capture(Capture),
}

/// Outcome of matching a pattern against a message
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PatternMatch {
    pub success: bool,
    /// Captured substrings, aligned with `Pattern::captures`
    pub captures: Vec<String>,
}

impl PatternMatch {
    fn failed() -> Self {
        Self::default()
    }
}

/// A compiled phrase pattern
///
/// Immutable after construction and safe to share between threads.
#[derive(Debug, Clone)]
pub struct Pattern {
    source: String,
    segments: Vec<Segment>,
    captures: Vec<Capture>,
    regex: Regex,
    /// Set when the pattern has no wildcard or capture
    literal: Option<String>,
}

impl Pattern {
    /// Compile a pattern
    pub fn new(source: &str) -> PatternResult<Self> {
        let segments = parse_segments(source)?;

        let captures: Vec<Capture> = segments
            .iter()
            .filter_map(|s| match s {
                Segment::Capture(c) => Some(c.clone()),
                _ => None,
            })
            .collect();

        let mut seen = HashSet::new();
        for capture in &captures {
            if !seen.insert(capture.name.as_str()) {
                return Err(PatternError::DuplicateCapture(capture.name.clone()));
            }
        }

        let regex = build_regex(&segments)?;

        let literal = match segments.as_slice() {
            [] => Some(String::new()),
            [Segment::Literal { text, .. }] => Some(text.clone()),
            _ => None,
        };

        Ok(Self {
            source: source.to_string(),
            segments,
            captures,
            regex,
            literal,
        })
    }

    /// The pattern as written
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Parsed segments in order
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Capture placeholders in declaration order
    pub fn captures(&self) -> &[Capture] {
        &self.captures
    }

    /// Capture names in declaration order
    pub fn capture_names(&self) -> impl Iterator<Item = &str> {
        self.captures.iter().map(|c| c.name.as_str())
    }

    /// True when the pattern is plain text
    pub fn is_literal(&self) -> bool {
        self.literal.is_some()
    }

    /// Match against a message
    pub fn matches(&self, input: &str) -> PatternMatch {
        if let Some(literal) = &self.literal {
            return PatternMatch {
                success: input.contains(literal.as_str()),
                captures: Vec::new(),
            };
        }

        match self.regex.captures(input) {
            Some(caps) => PatternMatch {
                success: true,
                captures: (1..caps.len())
                    .map(|i| {
                        caps.get(i)
                            .map(|m| m.as_str().to_string())
                            .unwrap_or_default()
                    })
                    .collect(),
            },
            None => PatternMatch::failed(),
        }
    }

    /// Match without collecting captures
    pub fn is_match(&self, input: &str) -> bool {
        match &self.literal {
            Some(literal) => input.contains(literal.as_str()),
            None => self.regex.is_match(input),
        }
    }
}

impl std::fmt::Display for Pattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.source)
    }
}

/// Parse time text with a strftime format
///
/// Date-only formats give midnight. Time-only formats are placed on
/// 1970-01-01 so the same text always converts to the same value.
pub fn parse_time(text: &str, format: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    if let Ok(dt) = NaiveDateTime::parse_from_str(text, format) {
        return Some(dt);
    }
    if let Some(dt) = NaiveDate::parse_from_str(text, format)
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
    {
        return Some(dt);
    }
    let time = NaiveTime::parse_from_str(text, format).ok()?;
    NaiveDate::from_ymd_opt(1970, 1, 1).map(|d| d.and_time(time))
}

/// A custom format must contain a specifier and render the current time
fn is_time_format(fmt: &str) -> bool {
    if !fmt.contains('%') {
        return false;
    }
    if StrftimeItems::new(fmt).any(|item| matches!(item, Item::Error)) {
        return false;
    }
    let now = chrono::Local::now().naive_local();
    let mut rendered = String::new();
    write!(rendered, "{}", now.format(fmt)).is_ok()
}

fn parse_segments(source: &str) -> PatternResult<Vec<Segment>> {
    let chars: Vec<char> = source.chars().collect();
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut literal_start = 0;
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '\\' if i + 1 < chars.len() => {
                if literal.is_empty() {
                    literal_start = i;
                }
                literal.push(chars[i + 1]);
                i += 2;
            }
            '*' => {
                flush_literal(&mut segments, &mut literal, literal_start);
                if !matches!(segments.last(), Some(Segment::Wildcard)) {
                    segments.push(Segment::Wildcard);
                }
                i += 1;
            }
            '{' => {
                flush_literal(&mut segments, &mut literal, literal_start);
                let close = chars[i + 1..]
                    .iter()
                    .position(|&c| c == '}')
                    .map(|p| i + 1 + p)
                    .ok_or(PatternError::Unterminated(i))?;
                let body: String = chars[i + 1..close].iter().collect();
                segments.push(Segment::Capture(parse_capture(&body, i)?));
                i = close + 1;
            }
            c => {
                if literal.is_empty() {
                    literal_start = i;
                }
                literal.push(c);
                i += 1;
            }
        }
    }
    flush_literal(&mut segments, &mut literal, literal_start);

    Ok(segments)
}

fn flush_literal(segments: &mut Vec<Segment>, literal: &mut String, position: usize) {
    if !literal.is_empty() {
        segments.push(Segment::Literal {
            text: std::mem::take(literal),
            position,
        });
    }
}

fn parse_capture(body: &str, position: usize) -> PatternResult<Capture> {
    let (name, suffix) = match body.split_once(':') {
        Some((name, suffix)) => (name.trim(), Some(suffix)),
        None => (body.trim(), None),
    };

    let valid_name = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '.' || c == '-');
    if !valid_name {
        return Err(PatternError::InvalidName(position));
    }

    let kind = match suffix {
        None => CaptureKind::String,
        Some(suffix) => {
            CaptureKind::from_suffix(suffix).ok_or_else(|| PatternError::InvalidType {
                name: name.to_string(),
                kind: suffix.to_string(),
            })?
        }
    };

    Ok(Capture {
        name: name.to_string(),
        kind,
    })
}

fn build_regex(segments: &[Segment]) -> PatternResult<Regex> {
    let mut expr = String::new();

    for (i, segment) in segments.iter().enumerate() {
        match segment {
            Segment::Literal { text, .. } => expr.push_str(&regex::escape(text)),
            Segment::Wildcard => expr.push_str(".*?"),
            Segment::Capture(_) => match segments.get(i + 1) {
                Some(Segment::Literal { .. }) if i == 0 => expr.push_str(r"(\S+?)"),
                Some(Segment::Literal { .. }) => expr.push_str("(.*?)"),
                _ => expr.push_str(r"(\S+)"),
            },
        }
    }

    Ok(RegexBuilder::new(&expr).dot_matches_new_line(true).build()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_pattern_is_substring_search() {
        let pattern = Pattern::new("disk full").unwrap();
        assert!(pattern.is_literal());

        assert!(pattern.matches("disk full").success);
        assert!(pattern.matches("warning: disk full on /var").success);
        assert!(!pattern.matches("Disk Full").success);
        assert!(!pattern.matches("disk  full").success);
    }

    #[test]
    fn test_wildcard_between_literals() {
        let pattern = Pattern::new("connection*refused").unwrap();

        assert!(pattern.is_match("connection refused"));
        assert!(pattern.is_match("connection to db:5432 was refused"));
        assert!(pattern.is_match("connectionrefused"));
        assert!(!pattern.is_match("refused connection"));
    }

    #[test]
    fn test_typed_captures_in_declaration_order() {
        let pattern = Pattern::new("error {code:number} after {elapsed:number}ms").unwrap();
        let m = pattern.matches("[db] error 42 after 130ms, retrying");

        assert!(m.success);
        assert_eq!(m.captures, vec!["42", "130"]);
        assert_eq!(
            pattern.capture_names().collect::<Vec<_>>(),
            vec!["code", "elapsed"]
        );
    }

    #[test]
    fn test_trailing_capture_binds_one_word() {
        let pattern = Pattern::new("user {name}").unwrap();

        let m = pattern.matches("login ok for user alice from 10.0.0.1");
        assert_eq!(m.captures, vec!["alice"]);

        assert!(!pattern.matches("user ").success);
    }

    #[test]
    fn test_capture_before_literal_is_lazy() {
        let pattern = Pattern::new("{level}: {text} (code").unwrap();
        let m = pattern.matches("WARN: low memory (code 7) (code 8)");

        assert!(m.success);
        assert_eq!(m.captures, vec!["WARN", "low memory"]);

        let m = pattern.matches("2024-03-01 ERROR: disk (code 5)");
        assert_eq!(m.captures, vec!["ERROR", "disk"]);
    }

    #[test]
    fn test_leading_capture_binds_word_before_literal() {
        let pattern = Pattern::new("{n:number} bytes").unwrap();

        let m = pattern.matches("sent 512 bytes");
        assert!(m.success);
        assert_eq!(m.captures, vec!["512"]);

        let m = pattern.matches("read 64 bytes, wrote 128 bytes");
        assert_eq!(m.captures, vec!["64"]);

        assert!(!pattern.matches("sent  bytes").success);
    }

    #[test]
    fn test_failed_match_is_not_an_error() {
        let pattern = Pattern::new("timeout {ms:number}").unwrap();
        let m = pattern.matches("all good");
        assert!(!m.success);
        assert!(m.captures.is_empty());
    }

    #[test]
    fn test_escapes() {
        let pattern = Pattern::new(r"a\*b \{x\}").unwrap();
        assert!(pattern.is_literal());
        assert!(pattern.is_match("a*b {x}"));
        assert!(!pattern.is_match("aXb {x}"));
    }

    #[test]
    fn test_regex_metacharacters_are_literal() {
        let pattern = Pattern::new("GET /api?id=* (200)").unwrap();
        assert!(pattern.is_match("GET /api?id=7 (200)"));
        assert!(!pattern.is_match("GET /apiid=7 200"));
    }

    #[test]
    fn test_custom_time_format_suffix() {
        let pattern = Pattern::new("{ts:%Y-%m-%d %H:%M:%S} WARN {text}").unwrap();
        assert_eq!(
            pattern.captures()[0].kind,
            CaptureKind::Format("%Y-%m-%d %H:%M:%S".to_string())
        );

        let m = pattern.matches("2024-03-01 12:30:00 WARN slow");
        assert_eq!(m.captures, vec!["2024-03-01 12:30:00", "slow"]);
    }

    #[test]
    fn test_invalid_type_suffix() {
        let err = Pattern::new("took {ms:duration}").unwrap_err();
        assert_eq!(
            err,
            PatternError::InvalidType {
                name: "ms".to_string(),
                kind: "duration".to_string()
            }
        );

        assert!(Pattern::new("at {ts:%Q}").is_err());
    }

    #[test]
    fn test_malformed_captures() {
        assert!(matches!(
            Pattern::new("value {x"),
            Err(PatternError::Unterminated(6))
        ));
        assert!(matches!(
            Pattern::new("value {}"),
            Err(PatternError::InvalidName(_))
        ));
        assert!(matches!(
            Pattern::new("{a} and {a}"),
            Err(PatternError::DuplicateCapture(_))
        ));
    }

    #[test]
    fn test_consecutive_wildcards_collapse() {
        let pattern = Pattern::new("a**b").unwrap();
        assert_eq!(pattern.segments().len(), 3);
    }

    #[test]
    fn test_parse_time() {
        let dt = parse_time("2024-03-01 12:30:00", "%Y-%m-%d %H:%M:%S").unwrap();
        assert_eq!(dt.to_string(), "2024-03-01 12:30:00");

        let date_only = parse_time("01/03/2024", "%d/%m/%Y").unwrap();
        assert_eq!(date_only.to_string(), "2024-03-01 00:00:00");

        assert!(parse_time("yesterday", "%Y-%m-%d").is_none());
    }

    #[test]
    fn test_parse_time_only_format() {
        let dt = parse_time("12:30:00", "%H:%M:%S").unwrap();
        assert_eq!(dt.to_string(), "1970-01-01 12:30:00");

        assert!(parse_time("12:61:00", "%H:%M:%S").is_none());

        let pattern = Pattern::new("at {t:%H:%M:%S} done").unwrap();
        let m = pattern.matches("at 12:30:00 done");
        assert_eq!(m.captures, vec!["12:30:00"]);
    }
}
