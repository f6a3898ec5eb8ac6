//! Tokenization and offset helpers.

use std::ops::Range;

use avi_protocol::SlotRange;

/// A normalized token with its byte range in the source text.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub value: String,
    pub range: Range<usize>,
}

/// Split on anything that is not a letter or digit, lowercasing each token.
pub fn tokenize(text: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut start: Option<usize> = None;

    for (idx, ch) in text.char_indices() {
        if ch.is_alphanumeric() {
            if start.is_none() {
                start = Some(idx);
            }
        } else if let Some(s) = start.take() {
            tokens.push(make_token(text, s..idx));
        }
    }
    if let Some(s) = start {
        tokens.push(make_token(text, s..text.len()));
    }
    tokens
}

fn make_token(text: &str, range: Range<usize>) -> Token {
    Token {
        value: text[range.clone()].to_lowercase(),
        range,
    }
}

/// Normalized form used as gazetteer and lookup keys: lowercase tokens
/// joined by single spaces.
pub fn normalize(text: &str) -> String {
    tokenize(text)
        .into_iter()
        .map(|t| t.value)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Convert a byte range into a character range.
pub fn char_range(text: &str, bytes: &Range<usize>) -> SlotRange {
    let start = text[..bytes.start].chars().count();
    let len = text[bytes.start..bytes.end].chars().count();
    SlotRange {
        start,
        end: start + len,
    }
}
