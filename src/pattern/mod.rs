//! Phrase Patterns
//!
//! A phrase pattern mixes literal text, `*` wildcards and typed capture
//! placeholders:
//!
//! ```text
//! connection from {ip} refused*
//! error {code:number} after {elapsed:number}ms
//! {ts:%Y-%m-%d %H:%M:%S} WARN *
//! ```
//!
//! - **matcher**: compiles a pattern and matches it against message text
//! - **tokens**: extracts literal tokens for inverted-index pre-filtering
//! - **error**: compilation errors

mod error;
mod matcher;
mod tokens;

pub use error::{PatternError, PatternResult};
pub use matcher::{parse_time, Capture, CaptureKind, Pattern, PatternMatch, Segment};
pub use tokens::{extract_tokens, Token, TokenKind, TokenSet, MIN_TOKEN_LENGTH};
