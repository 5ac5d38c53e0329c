//! Index Structures
//!
//! - **TokenIndex**: Inverted trigram index used to pre-filter records
//!   before phrase patterns are evaluated
//!
//! # Architecture
//!
//! ```text
//! Query: "connection*refused"
//!        ↓
//! Tokens: ["connection", "refused"]
//!        ↓
//! TokenIndex: intersect postings → [rec 0, rec 17, rec 42]
//!        ↓
//! Pattern matcher on candidates only
//! ```

mod token_index;

pub use token_index::{intersect, union, TokenIndex};
