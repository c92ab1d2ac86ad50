//! Markup tokenizer.
//!
//! Splits a document into atomic [`Token::Tag`]s and divisible
//! [`Token::Text`] spans, in document order.

use crate::error::{EncodeError, Result};

/// Default outer wrapper tag name.
pub const DEFAULT_WRAPPER: &str = "stm";

/// One unit of a markup document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token<'a> {
    /// A `<...>` tag, verbatim including delimiters. Never divided.
    Tag(&'a str),
    /// Free text between tags. May be split at any character boundary.
    Text(&'a str),
}

impl<'a> Token<'a> {
    /// The verbatim text of this token.
    pub fn as_str(&self) -> &'a str {
        match self {
            Token::Tag(raw) | Token::Text(raw) => raw,
        }
    }

    /// Whether this token is a tag.
    pub fn is_tag(&self) -> bool {
        matches!(self, Token::Tag(_))
    }
}

/// Tokenize a document.
///
/// A tag starts at `<` and ends at the next `>` that is not inside a
/// double-quoted attribute value. Empty text spans are never emitted.
pub fn tokenize(document: &str) -> Result<Vec<Token<'_>>> {
    let bytes = document.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0usize;

    while i < bytes.len() {
        if bytes[i] == b'<' {
            let end = tag_end(bytes, i).ok_or(EncodeError::UnterminatedTag { offset: i })?;
            tokens.push(Token::Tag(&document[i..end]));
            i = end;
        } else {
            let end = bytes[i..]
                .iter()
                .position(|&b| b == b'<')
                .map_or(bytes.len(), |p| i + p);
            tokens.push(Token::Text(&document[i..end]));
            i = end;
        }
    }

    Ok(tokens)
}

/// Byte offset one past the `>` closing the tag opened at `start`.
fn tag_end(bytes: &[u8], start: usize) -> Option<usize> {
    let mut in_quote = false;
    for (offset, &b) in bytes[start + 1..].iter().enumerate() {
        match b {
            b'"' => in_quote = !in_quote,
            b'>' if !in_quote => return Some(start + 1 + offset + 1),
            _ => {}
        }
    }
    None
}

/// Lowercased tag name and whether the tag is a closing tag.
///
/// `<Frame a b>` yields `("frame", false)`, `</stm>` yields `("stm", true)`.
pub fn tag_name(raw: &str) -> (String, bool) {
    let inner = raw
        .strip_prefix('<')
        .unwrap_or(raw)
        .trim_end_matches('>')
        .trim_start();
    let (closing, inner) = match inner.strip_prefix('/') {
        Some(rest) => (true, rest.trim_start()),
        None => (false, inner),
    };
    let name: String = inner
        .chars()
        .take_while(|c| !c.is_whitespace() && *c != '/' && *c != '>')
        .flat_map(char::to_lowercase)
        .collect();
    (name, closing)
}

/// Drop the outer wrapper tags, keeping only what they enclose.
///
/// When an opening wrapper tag is present, everything before it and after
/// the last closing wrapper tag is discarded; a missing closing tag keeps the
/// rest of the document. Wrapper tags found anywhere else are dropped. A
/// document without a wrapper is returned whole.
pub fn strip_wrapper<'a>(tokens: Vec<Token<'a>>, wrapper: &str) -> Vec<Token<'a>> {
    let is_wrapper = |token: &Token<'_>, want_closing: bool| match token {
        Token::Tag(raw) => {
            let (name, closing) = tag_name(raw);
            closing == want_closing && name.eq_ignore_ascii_case(wrapper)
        }
        Token::Text(_) => false,
    };

    let range = match tokens.iter().position(|t| is_wrapper(t, false)) {
        Some(open) => {
            let close = tokens
                .iter()
                .rposition(|t| is_wrapper(t, true))
                .filter(|&close| close > open)
                .unwrap_or(tokens.len());
            open + 1..close
        }
        None => 0..tokens.len(),
    };

    tokens[range]
        .iter()
        .copied()
        .filter(|t| !is_wrapper(t, false) && !is_wrapper(t, true))
        .collect()
}
