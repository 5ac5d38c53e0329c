//! Key/value field parser for `key=value key2="quoted value"` messages

use super::FieldParser;
use crate::log::{Fields, Value};

/// Parser for whitespace-separated `key=value` pairs
#[derive(Debug, Default, Clone, Copy)]
pub struct KvParser;

impl FieldParser for KvParser {
    fn name(&self) -> &'static str {
        "kv"
    }

    fn try_parse(&self, input: &str) -> Option<Fields> {
        let mut fields = Fields::new();
        let mut rest = input.trim_start();

        while !rest.is_empty() {
            let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
            let (word, tail) = rest.split_at(end);

            match word.split_once('=') {
                Some((key, value)) if !key.is_empty() => {
                    if let Some(quoted) = value.strip_prefix('"') {
                        // Quoted values may contain spaces: read up to the closing quote
                        let full = &rest[key.len() + 2..];
                        match full.find('"') {
                            Some(close) => {
                                fields.insert(key.to_string(), Value::from(&full[..close]));
                                rest = full[close + 1..].trim_start();
                                continue;
                            }
                            None => {
                                fields.insert(key.to_string(), Value::from(quoted));
                            }
                        }
                    } else {
                        fields.insert(key.to_string(), Value::from(value));
                    }
                }
                _ => {}
            }

            rest = tail.trim_start();
        }

        if fields.is_empty() {
            None
        } else {
            Some(fields)
        }
    }
}
