//! Percent escaping for command arguments.
//!
//! Compatible with the engine's `sp_sc_cvar_unescape`: `%` becomes `%25`,
//! `"` becomes `%22`, a line feed becomes `%0A`. Every other byte outside
//! printable ASCII is escaped the same way, so arbitrary binary payloads can
//! cross the channel. Escaped output is always printable ASCII.
//!
//! Callers that reserve further characters on the wire pass them to
//! [`escape_with`]. Escaped text may be cut anywhere, including inside a
//! `%XX` sequence; [`Unescaper`] decodes such pieces one at a time.

use crate::error::{ChannelError, Result};

const HEX_UPPER: &[u8; 16] = b"0123456789ABCDEF";

fn needs_escape(byte: u8, extra: &[u8]) -> bool {
    !(0x20..=0x7e).contains(&byte) || byte == b'%' || byte == b'"' || extra.contains(&byte)
}

/// Percent-escape a byte slice.
pub fn escape(bytes: &[u8]) -> String {
    escape_with(bytes, &[])
}

/// Percent-escape a byte slice, also escaping every byte in `extra`.
pub fn escape_with(bytes: &[u8], extra: &[u8]) -> String {
    let mut out = String::with_capacity(escaped_len_with(bytes, extra));
    for &byte in bytes {
        if needs_escape(byte, extra) {
            out.push('%');
            out.push(HEX_UPPER[usize::from(byte >> 4)] as char);
            out.push(HEX_UPPER[usize::from(byte & 0x0f)] as char);
        } else {
            out.push(byte as char);
        }
    }
    out
}

/// Percent-escape a string.
pub fn escape_str(text: &str) -> String {
    escape(text.as_bytes())
}

/// Length of `escape(bytes)` without allocating.
pub fn escaped_len(bytes: &[u8]) -> usize {
    escaped_len_with(bytes, &[])
}

/// Length of `escape_with(bytes, extra)` without allocating.
pub fn escaped_len_with(bytes: &[u8], extra: &[u8]) -> usize {
    bytes
        .iter()
        .map(|&b| if needs_escape(b, extra) { 3 } else { 1 })
        .sum()
}

/// Reverse [`escape`].
///
/// Accepts lowercase hex digits as well. A `%` not followed by two hex digits
/// is an error.
pub fn unescape(text: &str) -> Result<Vec<u8>> {
    let mut decoder = Unescaper::new();
    let out = decoder.feed(text)?;
    decoder.finish()?;
    Ok(out)
}

/// Reverse [`escape_str`], requiring the result to be UTF-8.
pub fn unescape_str(text: &str) -> Result<String> {
    String::from_utf8(unescape(text)?).map_err(|_| ChannelError::InvalidUtf8)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Pending {
    #[default]
    None,
    /// Offset of a `%` still waiting for both digits.
    Percent(usize),
    /// Offset of a `%` and its high digit.
    High(usize, u8),
}

/// Incremental [`unescape`] over text arriving in pieces.
///
/// A `%XX` sequence cut between two pieces is carried over; error offsets
/// count from the start of the first piece.
#[derive(Debug, Clone, Default)]
pub struct Unescaper {
    pending: Pending,
    offset: usize,
}

impl Unescaper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode the next piece. Bytes of an unfinished escape are held back.
    pub fn feed(&mut self, text: &str) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(text.len());
        for &byte in text.as_bytes() {
            self.pending = match self.pending {
                Pending::None if byte == b'%' => Pending::Percent(self.offset),
                Pending::None => {
                    out.push(byte);
                    Pending::None
                }
                Pending::Percent(start) => {
                    let hi = hex_value(byte).ok_or(ChannelError::MalformedEscape { offset: start })?;
                    Pending::High(start, hi)
                }
                Pending::High(start, hi) => {
                    let lo = hex_value(byte).ok_or(ChannelError::MalformedEscape { offset: start })?;
                    out.push((hi << 4) | lo);
                    Pending::None
                }
            };
            self.offset += 1;
        }
        Ok(out)
    }

    /// Whether an escape sequence is still incomplete.
    pub fn is_pending(&self) -> bool {
        self.pending != Pending::None
    }

    /// Fail if the text seen so far ended inside an escape sequence.
    pub fn finish(&self) -> Result<()> {
        match self.pending {
            Pending::None => Ok(()),
            Pending::Percent(start) | Pending::High(start, _) => {
                Err(ChannelError::MalformedEscape { offset: start })
            }
        }
    }
}

fn hex_value(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn escapes_engine_specials() {
        assert_eq!(escape_str("50% \"off\"\n"), "50%25 %22off%22%0A");
    }

    #[test]
    fn plain_text_is_unchanged() {
        let text = "<text>Hello world</text>";
        assert_eq!(escape_str(text), text);
        assert_eq!(escaped_len(text.as_bytes()), text.len());
    }

    #[test]
    fn escapes_non_ascii_bytes() {
        assert_eq!(escape_str("é"), "%C3%A9");
        assert_eq!(escape(&[0x00, 0xff]), "%00%FF");
    }

    #[test]
    fn unescape_accepts_lowercase_hex() {
        assert_eq!(unescape("%0a%22").unwrap(), b"\n\"");
    }

    #[test]
    fn unescape_rejects_truncated_sequence() {
        assert!(matches!(
            unescape("abc%4"),
            Err(ChannelError::MalformedEscape { offset: 3 })
        ));
        assert!(matches!(
            unescape("%zz"),
            Err(ChannelError::MalformedEscape { offset: 0 })
        ));
    }

    #[test]
    fn unescape_str_rejects_invalid_utf8() {
        assert!(matches!(unescape_str("%FF"), Err(ChannelError::InvalidUtf8)));
    }

    #[test]
    fn escape_with_reserves_extra_bytes() {
        assert_eq!(escape_with(b"#tag 50%", b"#"), "%23tag 50%25");
        assert_eq!(escaped_len_with(b"#tag", b"#"), 6);
        assert_eq!(escape(b"#tag"), "#tag");
    }

    #[test]
    fn unescaper_carries_escapes_across_pieces() {
        let mut decoder = Unescaper::new();
        assert_eq!(decoder.feed("a%").unwrap(), b"a");
        assert!(decoder.is_pending());
        assert_eq!(decoder.feed("2").unwrap(), b"");
        assert_eq!(decoder.feed("2b").unwrap(), b"\"b");
        assert!(!decoder.is_pending());
        decoder.finish().unwrap();
    }

    #[test]
    fn unescaper_reports_offsets_across_pieces() {
        let mut decoder = Unescaper::new();
        decoder.feed("abc").unwrap();
        decoder.feed("d%4").unwrap();
        assert!(matches!(
            decoder.finish(),
            Err(ChannelError::MalformedEscape { offset: 4 })
        ));
        assert!(matches!(
            decoder.feed("x"),
            Err(ChannelError::MalformedEscape { offset: 4 })
        ));
    }

    proptest! {
        #[test]
        fn pieces_decode_like_the_whole(
            bytes in proptest::collection::vec(any::<u8>(), 0..256),
            size in 1usize..8,
        ) {
            let escaped = escape(&bytes);
            let mut decoder = Unescaper::new();
            let mut out = Vec::new();
            for piece in escaped.as_bytes().chunks(size) {
                out.extend(decoder.feed(std::str::from_utf8(piece).unwrap()).unwrap());
            }
            decoder.finish().unwrap();
            prop_assert_eq!(out, bytes);
        }

        #[test]
        fn escape_is_reversible(bytes in proptest::collection::vec(any::<u8>(), 0..512)) {
            let escaped = escape(&bytes);
            prop_assert_eq!(escaped.len(), escaped_len(&bytes));
            prop_assert!(escaped.bytes().all(|b| (0x20..=0x7e).contains(&b) && b != b'"'));
            prop_assert_eq!(unescape(&escaped).unwrap(), bytes);
        }
    }
}
